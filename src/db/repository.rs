use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{metric, Item, ItemStatus, NewItem, RankingSource, SortColumn};

use super::schema::SCHEMA;

/// SQLite-backed store for items and their metric counters. The metrics
/// table is the counter store: values are keyed by (item, metric name) and a
/// missing row is "never recorded", distinct from zero.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Item operations

    pub async fn insert_item(&self, item: NewItem) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO items (title, url, status, comment_count, published_at)
                       VALUES (?1, ?2, ?3, ?4, ?5)
                       ON CONFLICT(url) DO UPDATE SET
                           title = excluded.title,
                           status = excluded.status,
                           comment_count = excluded.comment_count,
                           published_at = excluded.published_at"#,
                    params![
                        item.title,
                        item.url,
                        item.status.as_str(),
                        item.comment_count,
                        item.published_at.map(|dt| dt.to_rfc3339()),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn get_item(&self, id: i64) -> Result<Option<Item>> {
        let item = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, title, url, status, comment_count, published_at, created_at FROM items WHERE id = ?1",
                )?;
                let item = stmt
                    .query_row(params![id], |row| Ok(item_from_row(row)))
                    .optional()?;
                Ok(item)
            })
            .await?;
        Ok(item)
    }

    pub async fn get_published_items(&self) -> Result<Vec<Item>> {
        let items = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, title, url, status, comment_count, published_at, created_at
                     FROM items WHERE status = 'published'
                     ORDER BY published_at DESC NULLS LAST",
                )?;
                let items = stmt
                    .query_map([], |row| Ok(item_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    /// Host integration point: comment counts are owned by the system that
    /// hosts the discussion, not by the refresh cycle.
    #[allow(dead_code)]
    pub async fn set_comment_count(&self, id: i64, count: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE items SET comment_count = ?1 WHERE id = ?2",
                    params![count, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Counter store operations

    pub async fn get_metric(&self, item_id: i64, name: &str) -> Result<Option<i64>> {
        let name = name.to_string();
        let value = self
            .conn
            .call(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM metrics WHERE item_id = ?1 AND metric = ?2",
                        params![item_id, name],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }

    pub async fn set_metric(&self, item_id: i64, name: &str, value: i64) -> Result<()> {
        let name = name.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO metrics (item_id, metric, value)
                       VALUES (?1, ?2, ?3)
                       ON CONFLICT(item_id, metric) DO UPDATE SET
                           value = excluded.value,
                           updated_at = datetime('now')"#,
                    params![item_id, name, value],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn last_updated(&self, item_id: i64) -> Result<Option<DateTime<Utc>>> {
        let ts = self.get_metric(item_id, metric::LAST_UPDATED).await?;
        Ok(ts.and_then(|secs| DateTime::from_timestamp(secs, 0)))
    }

    pub async fn set_last_updated(&self, item_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.set_metric(item_id, metric::LAST_UPDATED, at.timestamp())
            .await
    }

    /// Drop every stored counter. Part of subsystem teardown; items are left
    /// untouched since they belong to the host.
    pub async fn clear_metrics(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute("DELETE FROM metrics", [])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Backfill queries

    /// Published items with no refresh on record, most recent first.
    pub async fn items_never_refreshed(&self) -> Result<Vec<Item>> {
        self.items_by_refresh_state(false).await
    }

    /// Published items refreshed at least once, most recent first.
    pub async fn items_previously_refreshed(&self) -> Result<Vec<Item>> {
        self.items_by_refresh_state(true).await
    }

    async fn items_by_refresh_state(&self, refreshed: bool) -> Result<Vec<Item>> {
        let items = self
            .conn
            .call(move |conn| {
                let exists = if refreshed { "EXISTS" } else { "NOT EXISTS" };
                let sql = format!(
                    "SELECT id, title, url, status, comment_count, published_at, created_at
                     FROM items i
                     WHERE i.status = 'published'
                       AND {exists} (SELECT 1 FROM metrics
                                     WHERE item_id = i.id AND metric = 'last_updated')
                     ORDER BY i.published_at DESC NULLS LAST"
                );
                let mut stmt = conn.prepare(&sql)?;
                let items = stmt
                    .query_map([], |row| Ok(item_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    // Ranking query

    /// The top `limit` published items for a sort key, restricted to those
    /// published after `cutoff` when one is given. Sorting by views or social
    /// total only considers items where that metric has been recorded.
    pub async fn top_items(
        &self,
        sort: SortColumn,
        cutoff: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<RankingSource>> {
        let cutoff_str = cutoff.map(|dt| dt.to_rfc3339()).unwrap_or_default();
        let now_str = Utc::now().to_rfc3339();

        let rows = self
            .conn
            .call(move |conn| {
                let (extra_where, order_by) = match sort {
                    SortColumn::Views => (
                        "AND EXISTS (SELECT 1 FROM metrics
                                     WHERE item_id = i.id AND metric = 'pageviews')",
                        "ORDER BY views DESC",
                    ),
                    SortColumn::SocialTotal => (
                        "AND EXISTS (SELECT 1 FROM metrics
                                     WHERE item_id = i.id AND metric = 'total')",
                        "ORDER BY total DESC",
                    ),
                    SortColumn::Comments => ("", "ORDER BY i.comment_count DESC"),
                    SortColumn::Recency => ("", "ORDER BY i.published_at DESC NULLS LAST"),
                };

                let sql = format!(
                    r#"SELECT i.id, i.title, i.url, i.published_at, i.comment_count,
                          COALESCE((SELECT value FROM metrics
                                    WHERE item_id = i.id AND metric = 'total'), 0) AS total,
                          COALESCE((SELECT value FROM metrics
                                    WHERE item_id = i.id AND metric = 'facebook'), 0) AS facebook,
                          COALESCE((SELECT value FROM metrics
                                    WHERE item_id = i.id AND metric = 'twitter'), 0) AS twitter,
                          COALESCE((SELECT value FROM metrics
                                    WHERE item_id = i.id AND metric = 'pageviews'), 0) AS views
                       FROM items i
                       WHERE i.status = 'published'
                         AND (?1 = '' OR (i.published_at >= ?1 AND i.published_at <= ?2))
                         {extra_where}
                       {order_by}
                       LIMIT ?3"#
                );

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![cutoff_str, now_str, limit as i64], |row| {
                        Ok(ranking_from_row(row))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn item_from_row(row: &Row) -> Item {
    Item {
        id: row.get(0).unwrap(),
        title: row.get(1).unwrap(),
        url: row.get(2).unwrap(),
        status: ItemStatus::from_db(&row.get::<_, String>(3).unwrap()),
        comment_count: row.get(4).unwrap(),
        published_at: row
            .get::<_, Option<String>>(5)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        created_at: row
            .get::<_, String>(6)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

fn ranking_from_row(row: &Row) -> RankingSource {
    RankingSource {
        id: row.get(0).unwrap(),
        title: row.get(1).unwrap(),
        url: row.get(2).unwrap(),
        published_at: row
            .get::<_, Option<String>>(3)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        comments: row.get(4).unwrap(),
        total: row.get(5).unwrap(),
        facebook: row.get(6).unwrap(),
        twitter: row.get(7).unwrap(),
        views: row.get(8).unwrap(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn memory_repo() -> Repository {
        Repository::new(":memory:").await.unwrap()
    }

    fn new_item(title: &str, url: &str, published_days_ago: i64) -> NewItem {
        NewItem {
            title: title.to_string(),
            url: url.to_string(),
            status: ItemStatus::Published,
            comment_count: 0,
            published_at: Some(Utc::now() - Duration::days(published_days_ago)),
        }
    }

    #[tokio::test]
    async fn opens_a_file_backed_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.db");
        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();

        let id = repo.insert_item(new_item("a", "https://e.com/a", 1)).await.unwrap();
        assert!(repo.get_item(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn metric_absence_is_distinct_from_zero() {
        let repo = memory_repo().await;
        let id = repo.insert_item(new_item("a", "https://e.com/a", 1)).await.unwrap();

        assert_eq!(repo.get_metric(id, metric::FACEBOOK).await.unwrap(), None);

        repo.set_metric(id, metric::FACEBOOK, 0).await.unwrap();
        assert_eq!(repo.get_metric(id, metric::FACEBOOK).await.unwrap(), Some(0));

        repo.set_metric(id, metric::FACEBOOK, 42).await.unwrap();
        assert_eq!(repo.get_metric(id, metric::FACEBOOK).await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn last_updated_round_trips() {
        let repo = memory_repo().await;
        let id = repo.insert_item(new_item("a", "https://e.com/a", 1)).await.unwrap();

        assert_eq!(repo.last_updated(id).await.unwrap(), None);

        let now = Utc::now();
        repo.set_last_updated(id, now).await.unwrap();
        let stored = repo.last_updated(id).await.unwrap().unwrap();
        assert_eq!(stored.timestamp(), now.timestamp());
    }

    #[tokio::test]
    async fn backfill_queries_split_by_refresh_state() {
        let repo = memory_repo().await;
        let cold = repo.insert_item(new_item("cold", "https://e.com/cold", 1)).await.unwrap();
        let warm = repo.insert_item(new_item("warm", "https://e.com/warm", 2)).await.unwrap();
        repo.set_last_updated(warm, Utc::now()).await.unwrap();

        let never = repo.items_never_refreshed().await.unwrap();
        assert_eq!(never.iter().map(|i| i.id).collect::<Vec<_>>(), vec![cold]);

        let seen = repo.items_previously_refreshed().await.unwrap();
        assert_eq!(seen.iter().map(|i| i.id).collect::<Vec<_>>(), vec![warm]);
    }

    #[tokio::test]
    async fn top_items_orders_by_total_and_respects_window() {
        let repo = memory_repo().await;
        for (n, total) in [(1, 50), (2, 200), (3, 100)] {
            let id = repo
                .insert_item(new_item(&format!("i{n}"), &format!("https://e.com/{n}"), n))
                .await
                .unwrap();
            repo.set_metric(id, metric::TOTAL, total).await.unwrap();
        }

        let rows = repo
            .top_items(SortColumn::SocialTotal, None, 2)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].total, 200);
        assert_eq!(rows[1].total, 100);
    }

    #[tokio::test]
    async fn views_sort_requires_recorded_pageviews() {
        let repo = memory_repo().await;
        let with_views = repo.insert_item(new_item("a", "https://e.com/a", 1)).await.unwrap();
        let _without = repo.insert_item(new_item("b", "https://e.com/b", 2)).await.unwrap();
        repo.set_metric(with_views, metric::PAGEVIEWS, 9).await.unwrap();

        let rows = repo.top_items(SortColumn::Views, None, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, with_views);
        assert_eq!(rows[0].views, 9);
    }

    #[tokio::test]
    async fn date_range_cutoff_filters_old_items() {
        let repo = memory_repo().await;
        let recent = repo.insert_item(new_item("new", "https://e.com/new", 5)).await.unwrap();
        let _old = repo.insert_item(new_item("old", "https://e.com/old", 400)).await.unwrap();

        let cutoff = Some(Utc::now() - Duration::days(30));
        let rows = repo.top_items(SortColumn::Recency, cutoff, 10).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![recent]);
    }

    #[tokio::test]
    async fn clear_metrics_leaves_items_alone() {
        let repo = memory_repo().await;
        let id = repo.insert_item(new_item("a", "https://e.com/a", 1)).await.unwrap();
        repo.set_metric(id, metric::TOTAL, 7).await.unwrap();

        repo.clear_metrics().await.unwrap();

        assert_eq!(repo.get_metric(id, metric::TOTAL).await.unwrap(), None);
        assert!(repo.get_item(id).await.unwrap().is_some());
    }
}
