use crate::models::Counters;

/// Observer notified after every completed refresh with the freshly computed
/// counters. Callbacks run synchronously on the job worker and must not
/// block; return values are not consumed.
pub trait MetricsObserver: Send + Sync {
    fn metrics_refreshed(&self, item_id: i64, counters: &Counters);
}
