use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked content item. Items are created by the importer (or a host
/// integration writing to the database directly); the metrics layer only ever
/// reads them and attaches counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub status: ItemStatus,
    pub comment_count: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Item {
    pub fn is_published(&self) -> bool {
        self.status == ItemStatus::Published
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Published,
    Draft,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Published => "published",
            ItemStatus::Draft => "draft",
        }
    }

    /// Anything other than a known draft marker is treated as published.
    pub fn from_db(s: &str) -> Self {
        match s {
            "draft" => ItemStatus::Draft,
            _ => ItemStatus::Published,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub title: String,
    pub url: String,
    pub status: ItemStatus,
    pub comment_count: i64,
    pub published_at: Option<DateTime<Utc>>,
}
