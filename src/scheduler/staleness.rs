use chrono::{DateTime, Duration, Utc};

/// Decide whether a cached metric record is due for a refresh.
///
/// A record with no timestamp has never been refreshed and is always stale.
/// A zero or negative ttl disables caching entirely.
pub fn is_stale(last_updated: Option<DateTime<Utc>>, ttl: Duration, now: DateTime<Utc>) -> bool {
    if ttl <= Duration::zero() {
        return true;
    }
    match last_updated {
        None => true,
        Some(last) => now - last > ttl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_refreshed_is_stale() {
        assert!(is_stale(None, Duration::hours(24), Utc::now()));
    }

    #[test]
    fn older_than_ttl_is_stale() {
        let now = Utc::now();
        let last = now - Duration::hours(25);
        assert!(is_stale(Some(last), Duration::hours(24), now));
    }

    #[test]
    fn within_ttl_is_fresh() {
        let now = Utc::now();
        let last = now - Duration::hours(1);
        assert!(!is_stale(Some(last), Duration::hours(24), now));
    }

    #[test]
    fn exactly_at_ttl_is_fresh() {
        let now = Utc::now();
        let last = now - Duration::hours(24);
        assert!(!is_stale(Some(last), Duration::hours(24), now));
    }

    #[test]
    fn zero_or_negative_ttl_is_always_stale() {
        let now = Utc::now();
        assert!(is_stale(Some(now), Duration::zero(), now));
        assert!(is_stale(Some(now), Duration::hours(-1), now));
    }
}
