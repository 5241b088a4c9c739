use std::time::Duration;

use feed_rs::parser;
use regex::Regex;
use reqwest::Client;

use crate::db::Repository;
use crate::error::Result;
use crate::models::{ItemStatus, NewItem};

/// Imports content items from a site's RSS/Atom feed. The feed is the item
/// source; the metrics layer never creates items on its own.
pub struct ItemImporter {
    client: Client,
}

impl ItemImporter {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("social-insight/1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Resolve a page or feed URL to a feed, fetch it, and upsert its
    /// entries as items. Returns the number of entries imported.
    pub async fn import(&self, repository: &Repository, url: &str) -> Result<usize> {
        let feed_url = self.resolve_feed_url(url).await?;
        let items = self.fetch_items(&feed_url).await?;

        let mut imported = 0;
        for item in items {
            match repository.insert_item(item).await {
                Ok(_) => imported += 1,
                Err(e) => tracing::warn!("Failed to insert item: {}", e),
            }
        }

        tracing::info!("Imported {} items from {}", imported, feed_url);
        Ok(imported)
    }

    /// Fetch a feed URL and map its entries to new items. Entries without a
    /// link are skipped since the canonical URL is the provider lookup key.
    pub async fn fetch_items(&self, url: &str) -> Result<Vec<NewItem>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        let feed = parser::parse(&bytes[..])?;

        let items: Vec<NewItem> = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let url = entry.links.first().map(|l| l.href.clone())?;
                Some(NewItem {
                    title: entry
                        .title
                        .map(|t| t.content)
                        .unwrap_or_else(|| "Untitled".to_string()),
                    url,
                    status: ItemStatus::Published,
                    comment_count: 0,
                    published_at: entry.published.or(entry.updated),
                })
            })
            .collect();

        Ok(items)
    }

    /// If the URL already serves a feed, use it as-is. If it serves HTML,
    /// discover the feed from <link rel="alternate"> tags.
    async fn resolve_feed_url(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch URL: HTTP {}", response.status()).into());
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let bytes = response.bytes().await?;

        if parser::parse(&bytes[..]).is_ok() {
            return Ok(final_url);
        }

        if content_type.contains("html") || bytes.starts_with(b"<!") || bytes.starts_with(b"<html")
        {
            let html = String::from_utf8_lossy(&bytes);
            if let Some(feed_url) = find_feed_link(&html, &final_url) {
                return Ok(feed_url);
            }
        }

        Err(anyhow::anyhow!("Could not find an RSS/Atom feed at this URL").into())
    }
}

impl Default for ItemImporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Search HTML for an RSS/Atom feed link, trying both attribute orders of
/// <link rel="alternate" type="application/rss+xml" href="...">.
fn find_feed_link(html: &str, base_url: &str) -> Option<String> {
    let patterns = [
        r#"<link[^>]*rel=["']alternate["'][^>]*type=["']application/(rss|atom)\+xml["'][^>]*href=["']([^"']+)["']"#,
        r#"<link[^>]*type=["']application/(rss|atom)\+xml["'][^>]*href=["']([^"']+)["']"#,
    ];

    for pattern in patterns {
        let re = Regex::new(pattern).ok()?;
        if let Some(href) = re.captures(html).and_then(|cap| cap.get(2)) {
            return Some(resolve_url(href.as_str(), base_url));
        }
    }
    None
}

/// Resolve a potentially relative URL against a base URL.
fn resolve_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    if let Ok(base) = url::Url::parse(base_url) {
        if let Ok(resolved) = base.join(href) {
            return resolved.to_string();
        }
    }

    href.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_feed_link_in_either_attribute_order() {
        let rel_first = r#"<head><link rel="alternate" type="application/rss+xml" href="/feed.xml"></head>"#;
        assert_eq!(
            find_feed_link(rel_first, "https://example.com/blog"),
            Some("https://example.com/feed.xml".to_string())
        );

        let type_first = r#"<head><link type="application/atom+xml" rel="alternate" href="https://example.com/atom"></head>"#;
        assert_eq!(
            find_feed_link(type_first, "https://example.com/"),
            Some("https://example.com/atom".to_string())
        );

        assert_eq!(find_feed_link("<p>no feed here</p>", "https://example.com/"), None);
    }

    #[test]
    fn resolves_relative_hrefs_against_the_page_url() {
        assert_eq!(
            resolve_url("/feed", "https://example.com/a/b"),
            "https://example.com/feed"
        );
        assert_eq!(
            resolve_url("https://other.com/feed", "https://example.com/"),
            "https://other.com/feed"
        );
    }
}
