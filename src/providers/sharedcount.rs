use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::error::Result;
use crate::models::{metric, Counters, ShareCounts};

const SHAREDCOUNT_API_URL: &str = "https://api.sharedcount.com/";

/// One SharedCount response covers every share provider. Fields the service
/// did not report deserialize to `None` and stay absent from the counts.
#[derive(Debug, Deserialize)]
struct SharedCountResponse {
    #[serde(rename = "Facebook")]
    facebook: Option<FacebookCounts>,
    #[serde(rename = "Twitter")]
    twitter: Option<i64>,
    #[serde(rename = "GooglePlusOne")]
    googleplus: Option<i64>,
    #[serde(rename = "LinkedIn")]
    linkedin: Option<i64>,
    #[serde(rename = "Pinterest")]
    pinterest: Option<i64>,
    #[serde(rename = "Diggs")]
    diggs: Option<i64>,
    #[serde(rename = "Delicious")]
    delicious: Option<i64>,
    #[serde(rename = "Reddit")]
    reddit: Option<i64>,
    #[serde(rename = "StumbleUpon")]
    stumbleupon: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FacebookCounts {
    total_count: Option<i64>,
}

impl SharedCountResponse {
    fn into_counts(self) -> ShareCounts {
        let mut counts = Counters::new();
        let mut put = |name, value: Option<i64>| {
            if let Some(value) = value {
                counts.insert(name, value);
            }
        };

        put(metric::FACEBOOK, self.facebook.and_then(|f| f.total_count));
        put(metric::TWITTER, self.twitter);
        put(metric::GOOGLEPLUS, self.googleplus);
        put(metric::LINKEDIN, self.linkedin);
        put(metric::PINTEREST, self.pinterest);
        put(metric::DIGGS, self.diggs);
        put(metric::DELICIOUS, self.delicious);
        put(metric::REDDIT, self.reddit);
        put(metric::STUMBLEUPON, self.stumbleupon);

        ShareCounts { counts }
    }
}

pub struct SharedCountClient {
    client: Client,
    base_url: String,
}

impl SharedCountClient {
    pub fn new() -> Self {
        Self::with_base_url(SHAREDCOUNT_API_URL.to_string())
    }

    pub(crate) fn with_base_url(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("social-insight/1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url }
    }

    /// Fetch share counts for a URL across all providers in one request.
    pub async fn fetch_counts(&self, url: &str) -> Result<ShareCounts> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("url", url)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(
                anyhow::anyhow!("Share count request failed: HTTP {}", response.status()).into(),
            );
        }

        let parsed: SharedCountResponse = response.json().await?;
        Ok(parsed.into_counts())
    }
}

impl Default for SharedCountClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_response_sums_only_reported_providers() {
        let body = r#"{"Facebook":{"total_count":150},"Twitter":42}"#;
        let parsed: SharedCountResponse = serde_json::from_str(body).unwrap();
        let counts = parsed.into_counts();

        assert_eq!(counts.counts.get(metric::FACEBOOK), Some(&150));
        assert_eq!(counts.counts.get(metric::TWITTER), Some(&42));
        assert_eq!(counts.counts.get(metric::REDDIT), None);
        assert_eq!(counts.total(), 192);
    }

    #[test]
    fn empty_response_yields_no_counts() {
        let parsed: SharedCountResponse = serde_json::from_str("{}").unwrap();
        let counts = parsed.into_counts();

        assert!(counts.counts.is_empty());
        assert_eq!(counts.total(), 0);
    }

    #[test]
    fn facebook_without_total_count_is_absent() {
        let body = r#"{"Facebook":{"comment_count":3},"Reddit":7}"#;
        let parsed: SharedCountResponse = serde_json::from_str(body).unwrap();
        let counts = parsed.into_counts();

        assert_eq!(counts.counts.get(metric::FACEBOOK), None);
        assert_eq!(counts.total(), 7);
    }
}
