mod view;

pub use view::{RankingPage, RankingRow, RankingView, RANKING_WINDOW};
