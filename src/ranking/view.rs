use std::sync::Arc;

use chrono::{DateTime, Months, Utc};

use crate::db::Repository;
use crate::error::Result;
use crate::models::{RankingSource, SortColumn};

/// Number of items the ranking considers. Pagination slices within this
/// window and maxima are computed over the whole window, so bar widths stay
/// comparable across pages.
pub const RANKING_WINDOW: usize = 6;

/// One row of the ranking: raw counters plus normalized render widths.
#[derive(Debug, Clone)]
pub struct RankingRow {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub total: i64,
    pub facebook: i64,
    pub twitter: i64,
    pub views: i64,
    pub comments: i64,
    /// Social bar width relative to the window maximum, 0-100.
    pub total_pct_of_max: u32,
    /// Within-row share of the social bar attributed to facebook.
    pub facebook_pct: u32,
    /// Within-row share of the social bar attributed to twitter.
    pub twitter_pct: u32,
    /// Everything not individually broken out; the three sum to 100 for any
    /// row with a positive total.
    pub other_pct: u32,
    pub views_pct_of_max: u32,
    pub comments_pct_of_max: u32,
}

#[derive(Debug, Clone, Default)]
pub struct RankingPage {
    pub rows: Vec<RankingRow>,
    /// 1-based page number this slice represents.
    pub page: usize,
    pub per_page: usize,
    /// Row count of the whole top-N window, across all pages.
    pub total_rows: usize,
}

impl RankingPage {
    pub fn total_pages(&self) -> usize {
        if self.per_page == 0 {
            return 0;
        }
        self.total_rows.div_ceil(self.per_page)
    }
}

/// Builds the ranked, paginated projection of the counter store.
pub struct RankingView {
    repository: Arc<Repository>,
}

impl RankingView {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    /// Build one page of the ranking for a sort key and a trailing
    /// date-range filter in months (0 = unbounded). A page past the end of
    /// the window comes back empty.
    pub async fn build(
        &self,
        sort: SortColumn,
        range_months: u32,
        page: usize,
        per_page: usize,
    ) -> Result<RankingPage> {
        let cutoff = if range_months > 0 {
            Utc::now().checked_sub_months(Months::new(range_months))
        } else {
            None
        };

        let source = self
            .repository
            .top_items(sort, cutoff, RANKING_WINDOW)
            .await?;

        // Maxima are fixed to the full window, floored at 1, so pagination
        // never changes a bar width.
        let max_total = window_max(&source, |r| r.total);
        let max_views = window_max(&source, |r| r.views);
        let max_comments = window_max(&source, |r| r.comments);

        let total_rows = source.len();
        let page = page.max(1);
        let rows = source
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .map(|r| normalize(r, max_total, max_views, max_comments))
            .collect();

        Ok(RankingPage {
            rows,
            page,
            per_page,
            total_rows,
        })
    }
}

fn window_max(source: &[RankingSource], key: impl Fn(&RankingSource) -> i64) -> i64 {
    source.iter().map(key).max().unwrap_or(0).max(1)
}

fn normalize(source: RankingSource, max_total: i64, max_views: i64, max_comments: i64) -> RankingRow {
    let (facebook_pct, twitter_pct, other_pct) =
        provider_split(source.facebook, source.twitter, source.total);

    RankingRow {
        total_pct_of_max: pct_of_max(source.total, max_total),
        views_pct_of_max: pct_of_max(source.views, max_views),
        comments_pct_of_max: pct_of_max(source.comments, max_comments),
        facebook_pct,
        twitter_pct,
        other_pct,
        id: source.id,
        title: source.title,
        url: source.url,
        published_at: source.published_at,
        total: source.total,
        facebook: source.facebook,
        twitter: source.twitter,
        views: source.views,
        comments: source.comments,
    }
}

/// Cross-row width: the value as a rounded percentage of the window maximum.
/// A zero or negative value always renders a zero-width bar.
fn pct_of_max(value: i64, max: i64) -> u32 {
    if value <= 0 {
        return 0;
    }
    ((value as f64 / max.max(1) as f64) * 100.0).round() as u32
}

/// Within-row split of the social bar. Facebook and twitter are floored
/// percentages of the row total; the remainder covers every provider not
/// individually broken out, so the three sum to exactly 100 whenever the
/// total is positive. Each share is clamped to keep stale per-provider
/// counters from pushing a segment past the bar.
fn provider_split(facebook: i64, twitter: i64, total: i64) -> (u32, u32, u32) {
    if total <= 0 {
        return (0, 0, 0);
    }

    let facebook_pct = ((facebook.max(0).saturating_mul(100) / total) as u32).min(100);
    let twitter_pct = ((twitter.max(0).saturating_mul(100) / total) as u32).min(100 - facebook_pct);
    let other_pct = 100 - facebook_pct - twitter_pct;

    (facebook_pct, twitter_pct, other_pct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{metric, ItemStatus, NewItem};

    #[test]
    fn bar_widths_scale_to_window_max() {
        assert_eq!(pct_of_max(100, 100), 100);
        assert_eq!(pct_of_max(50, 100), 50);
        assert_eq!(pct_of_max(0, 100), 0);
        // Empty window: the max floor of 1 avoids dividing by zero.
        assert_eq!(pct_of_max(0, 1), 0);
    }

    #[test]
    fn provider_split_sums_to_exactly_one_hundred() {
        let (fb, tw, other) = provider_split(150, 42, 192);
        assert_eq!(fb, 78);
        assert_eq!(tw, 21);
        assert_eq!(other, 1);
        assert_eq!(fb + tw + other, 100);

        // All shares from unbroken-out providers.
        let (fb, tw, other) = provider_split(0, 0, 57);
        assert_eq!((fb, tw, other), (0, 0, 100));
    }

    #[test]
    fn zero_total_renders_a_zero_bar() {
        assert_eq!(provider_split(0, 0, 0), (0, 0, 0));
        assert_eq!(pct_of_max(0, 1), 0);
    }

    #[test]
    fn stale_provider_counter_cannot_overflow_the_bar() {
        // A preserved facebook=300 against a recomputed total=5.
        let (fb, tw, other) = provider_split(300, 0, 5);
        assert_eq!(fb, 100);
        assert_eq!(tw, 0);
        assert_eq!(other, 0);
    }

    async fn seeded_view(totals: &[i64]) -> RankingView {
        let repo = Arc::new(Repository::new(":memory:").await.unwrap());
        for (n, &total) in totals.iter().enumerate() {
            let id = repo
                .insert_item(NewItem {
                    title: format!("item {n}"),
                    url: format!("https://example.com/{n}"),
                    status: ItemStatus::Published,
                    comment_count: 0,
                    published_at: Some(Utc::now() - chrono::Duration::days(n as i64 + 1)),
                })
                .await
                .unwrap();
            repo.set_metric(id, metric::TOTAL, total).await.unwrap();
        }
        RankingView::new(repo)
    }

    #[tokio::test]
    async fn ranking_normalizes_against_window_max() {
        let view = seeded_view(&[100, 50, 0]).await;
        let page = view.build(SortColumn::SocialTotal, 0, 1, 10).await.unwrap();

        let widths: Vec<u32> = page.rows.iter().map(|r| r.total_pct_of_max).collect();
        assert_eq!(widths, vec![100, 50, 0]);
    }

    #[tokio::test]
    async fn window_caps_the_ranking_at_six_rows() {
        let view = seeded_view(&[70, 60, 50, 40, 30, 20, 10]).await;
        let page = view.build(SortColumn::SocialTotal, 0, 1, 10).await.unwrap();

        assert_eq!(page.total_rows, RANKING_WINDOW);
        assert_eq!(page.rows.len(), RANKING_WINDOW);
        // The smallest total fell outside the window.
        assert!(page.rows.iter().all(|r| r.total >= 20));
    }

    #[tokio::test]
    async fn page_past_the_window_is_empty_not_an_error() {
        let view = seeded_view(&[100, 50, 0]).await;
        let page = view.build(SortColumn::SocialTotal, 0, 2, 10).await.unwrap();

        assert!(page.rows.is_empty());
        assert_eq!(page.total_rows, 3);
        assert_eq!(page.total_pages(), 1);
    }

    #[tokio::test]
    async fn pagination_within_the_window_keeps_maxima_fixed() {
        let view = seeded_view(&[100, 80, 60, 40, 20, 10]).await;

        let first = view.build(SortColumn::SocialTotal, 0, 1, 3).await.unwrap();
        let second = view.build(SortColumn::SocialTotal, 0, 2, 3).await.unwrap();

        assert_eq!(first.rows.len(), 3);
        assert_eq!(second.rows.len(), 3);
        // Page two widths are still relative to the window max of 100.
        assert_eq!(second.rows[0].total_pct_of_max, 40);
        assert_eq!(second.rows[2].total_pct_of_max, 10);
        assert_eq!(first.total_pages(), 2);
    }
}
