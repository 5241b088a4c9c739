mod events;
mod queue;
mod refresh;
mod staleness;

pub use events::MetricsObserver;
pub use refresh::RefreshScheduler;
pub use staleness::is_stale;
