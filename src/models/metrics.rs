use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metric names used as keys in the counter store.
pub mod metric {
    pub const FACEBOOK: &str = "facebook";
    pub const TWITTER: &str = "twitter";
    pub const GOOGLEPLUS: &str = "googleplus";
    pub const LINKEDIN: &str = "linkedin";
    pub const PINTEREST: &str = "pinterest";
    pub const DIGGS: &str = "diggs";
    pub const DELICIOUS: &str = "delicious";
    pub const REDDIT: &str = "reddit";
    pub const STUMBLEUPON: &str = "stumbleupon";
    pub const TOTAL: &str = "total";
    pub const PAGEVIEWS: &str = "pageviews";
    pub const LAST_UPDATED: &str = "last_updated";
}

/// Counters keyed by metric name, as written in one refresh cycle.
pub type Counters = HashMap<&'static str, i64>;

/// Share counts fetched from the aggregation provider. A provider that did
/// not return a value is absent from the map, which is distinct from zero.
#[derive(Debug, Clone, Default)]
pub struct ShareCounts {
    pub counts: Counters,
}

impl ShareCounts {
    /// Sum of all fetched share counts, substituting 0 for absent providers.
    pub fn total(&self) -> i64 {
        self.counts.values().sum()
    }
}

/// Raw per-item counters backing one ranking row, before normalization.
#[derive(Debug, Clone)]
pub struct RankingSource {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub total: i64,
    pub facebook: i64,
    pub twitter: i64,
    pub views: i64,
    pub comments: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortColumn {
    Recency,
    Views,
    Comments,
    #[default]
    SocialTotal,
}

impl SortColumn {
    pub fn cycle(&self) -> Self {
        match self {
            SortColumn::SocialTotal => SortColumn::Views,
            SortColumn::Views => SortColumn::Comments,
            SortColumn::Comments => SortColumn::Recency,
            SortColumn::Recency => SortColumn::SocialTotal,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortColumn::Recency => "Recency",
            SortColumn::Views => "Views",
            SortColumn::Comments => "Comments",
            SortColumn::SocialTotal => "Social Score",
        }
    }
}
