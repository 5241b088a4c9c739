mod item;
mod metrics;

pub use item::{Item, ItemStatus, NewItem};
pub use metrics::{metric, Counters, RankingSource, ShareCounts, SortColumn};
