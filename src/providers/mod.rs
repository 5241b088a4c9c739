mod analytics;
mod sharedcount;

pub use analytics::AnalyticsClient;
pub use sharedcount::SharedCountClient;

use crate::error::Result;
use crate::models::ShareCounts;

/// Queries the external metric providers for one canonical URL.
///
/// Every fetch is best-effort: a provider outage surfaces as an `Err` that
/// callers downgrade to "metric absent this cycle". No retries happen here;
/// the next staleness-triggered refresh retries naturally.
pub struct ProviderAggregator {
    sharedcount: SharedCountClient,
    analytics: AnalyticsClient,
}

impl ProviderAggregator {
    pub fn new() -> Self {
        Self {
            sharedcount: SharedCountClient::new(),
            analytics: AnalyticsClient::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_endpoints(sharedcount_url: String, analytics_url: String) -> Self {
        Self {
            sharedcount: SharedCountClient::with_base_url(sharedcount_url),
            analytics: AnalyticsClient::with_base_url(analytics_url),
        }
    }

    pub async fn fetch_share_counts(&self, url: &str) -> Result<ShareCounts> {
        self.sharedcount.fetch_counts(url).await
    }

    pub async fn fetch_pageviews(&self, url: &str, credential: &str) -> Result<i64> {
        self.analytics.fetch_pageviews(url, credential).await
    }
}

impl Default for ProviderAggregator {
    fn default() -> Self {
        Self::new()
    }
}
