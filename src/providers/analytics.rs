use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::error::{AppError, Result};

const ANALYTICS_API_URL: &str = "https://plausible.io/api/v1/stats/aggregate";

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    results: AggregateResults,
}

#[derive(Debug, Deserialize)]
struct AggregateResults {
    pageviews: MetricValue,
}

#[derive(Debug, Deserialize)]
struct MetricValue {
    value: i64,
}

pub struct AnalyticsClient {
    client: Client,
    base_url: String,
}

impl AnalyticsClient {
    pub fn new() -> Self {
        Self::with_base_url(ANALYTICS_API_URL.to_string())
    }

    pub(crate) fn with_base_url(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("social-insight/1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url }
    }

    /// Fetch the pageview count for a single page. The site is derived from
    /// the page URL's host; the credential is used as a bearer token.
    pub async fn fetch_pageviews(&self, page_url: &str, credential: &str) -> Result<i64> {
        let parsed = url::Url::parse(page_url)
            .map_err(|e| anyhow::anyhow!("Invalid page URL {}: {}", page_url, e))?;
        let site_id = parsed
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("Page URL has no host: {}", page_url))?;
        let filters = format!("event:page=={}", parsed.path());

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("site_id", site_id),
                ("period", "12mo"),
                ("metrics", "pageviews"),
                ("filters", filters.as_str()),
            ])
            .bearer_auth(credential)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AppError::AnalyticsApi(format!("API error: {}", error_text)));
        }

        let body: AggregateResponse = response.json().await?;
        Ok(body.results.pageviews.value)
    }
}

impl Default for AnalyticsClient {
    fn default() -> Self {
        Self::new()
    }
}
