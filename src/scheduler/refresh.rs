use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::models::{metric, Counters, Item, ShareCounts};
use crate::providers::ProviderAggregator;

use super::events::MetricsObserver;
use super::queue::{self, Job, QueueMessage, ScheduledJob};
use super::staleness::is_stale;

/// Spacing between backfill jobs for items that have never been refreshed.
const BACKFILL_COLD_STAGGER: Duration = Duration::from_secs(5);
/// Spacing between backfill jobs for items refreshed at least once.
const BACKFILL_WARM_STAGGER: Duration = Duration::from_secs(30);

/// Turns staleness signals into deduplicated background refresh jobs.
///
/// At most one job per item is ever pending: the pending set is checked and
/// marked under one lock before a job is handed to the worker, and the mark
/// is dropped only when the job finishes, however it finishes.
pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

pub(crate) struct SchedulerInner {
    repository: Arc<Repository>,
    aggregator: ProviderAggregator,
    config: Config,
    observers: Vec<Arc<dyn MetricsObserver>>,
    pending: Mutex<HashSet<i64>>,
    seq: AtomicU64,
    tx: mpsc::UnboundedSender<QueueMessage>,
}

impl RefreshScheduler {
    pub fn new(
        repository: Arc<Repository>,
        aggregator: ProviderAggregator,
        config: Config,
        observers: Vec<Arc<dyn MetricsObserver>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(SchedulerInner {
            repository,
            aggregator,
            config,
            observers,
            pending: Mutex::new(HashSet::new()),
            seq: AtomicU64::new(0),
            tx,
        });
        let worker = tokio::spawn(queue::run(Arc::clone(&inner), rx));

        Self {
            inner,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Read-trigger hook, called whenever a content item is viewed.
    /// Non-published items are ignored.
    pub async fn on_item_view(&self, item: &Item) -> Result<bool> {
        if !item.is_published() {
            return Ok(false);
        }
        self.request_refresh(item.id).await
    }

    /// Queue a background refresh if the item's cached metrics are stale.
    /// Returns immediately; the fetch happens later on the job worker.
    /// Repeated calls within one staleness window create at most one job;
    /// unknown or non-positive ids are a no-op returning `false`.
    pub async fn request_refresh(&self, item_id: i64) -> Result<bool> {
        if item_id <= 0 {
            return Ok(false);
        }
        if self.inner.repository.get_item(item_id).await?.is_none() {
            return Ok(false);
        }

        let last_updated = self.inner.repository.last_updated(item_id).await?;
        if !is_stale(last_updated, self.inner.config.ttl(), Utc::now()) {
            return Ok(false);
        }

        Ok(self.inner.enqueue(item_id, Instant::now()))
    }

    /// Schedule a staggered refresh of the whole corpus: never-refreshed
    /// items first at a short interval, then previously refreshed items at a
    /// longer one, continuing from the last offset of the first group.
    /// Returns the number of jobs scheduled.
    pub async fn schedule_backfill(&self) -> Result<usize> {
        let cold = self.inner.repository.items_never_refreshed().await?;
        let warm = self.inner.repository.items_previously_refreshed().await?;

        let base = Instant::now();
        let mut scheduled = 0;
        for (item_id, offset) in stagger_plan(&cold, &warm) {
            if self.inner.enqueue(item_id, base + offset) {
                scheduled += 1;
            }
        }

        tracing::info!(
            "Backfill scheduled {} refresh jobs ({} cold, {} warm)",
            scheduled,
            cold.len(),
            warm.len()
        );
        Ok(scheduled)
    }

    /// Number of items with a refresh queued or executing.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().unwrap().len()
    }

    /// Block until every queued refresh has executed. Used by the headless
    /// CLI modes.
    pub async fn wait_idle(&self) {
        while self.pending_count() > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Cancel every not-yet-executed job and stop the worker. Jobs already
    /// executing run to completion.
    pub async fn shutdown(&self) {
        let _ = self.inner.tx.send(QueueMessage::Shutdown);
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.inner.pending.lock().unwrap().clear();
    }
}

impl SchedulerInner {
    /// Atomically check-and-mark the pending state for an item, then hand
    /// the job to the worker. Returns false when a job is already pending.
    fn enqueue(&self, item_id: i64, run_at: Instant) -> bool {
        if !self.pending.lock().unwrap().insert(item_id) {
            return false;
        }

        let job = ScheduledJob {
            run_at,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            job: Job::RefreshItem { item_id },
        };
        if self.tx.send(QueueMessage::Schedule(job)).is_err() {
            // Worker is gone (teardown); undo the mark.
            self.pending.lock().unwrap().remove(&item_id);
            return false;
        }
        true
    }

    /// Job body. Errors are contained here so one failing refresh never
    /// affects the worker or other queued jobs; the item simply stays stale
    /// until the ttl triggers a retry.
    pub(crate) async fn execute(&self, item_id: i64) {
        if let Err(e) = self.refresh_item(item_id).await {
            tracing::warn!("Refresh failed for item {}: {}", item_id, e);
        }
        self.pending.lock().unwrap().remove(&item_id);
    }

    async fn refresh_item(&self, item_id: i64) -> Result<()> {
        let Some(item) = self.repository.get_item(item_id).await? else {
            tracing::warn!("Refresh requested for unknown item {}", item_id);
            return Ok(());
        };

        let mut counters = Counters::new();

        if self.config.enable_social {
            let shares = match self.aggregator.fetch_share_counts(&item.url).await {
                Ok(shares) => shares,
                Err(e) => {
                    tracing::warn!("Share count fetch failed for {}: {}", item.url, e);
                    ShareCounts::default()
                }
            };

            // A zero or missing provider response must not clobber a
            // previously recorded positive count.
            for (&name, &value) in &shares.counts {
                if value > 0 {
                    self.repository.set_metric(item_id, name, value).await?;
                }
                counters.insert(name, value);
            }

            // The total is recomputed from this cycle's values and written
            // even when zero.
            let total = shares.total();
            self.repository.set_metric(item_id, metric::TOTAL, total).await?;
            counters.insert(metric::TOTAL, total);
        }

        if self.config.enable_analytics {
            if let Some(credential) = self.config.analytics_credential() {
                match self.aggregator.fetch_pageviews(&item.url, credential).await {
                    Ok(views) if views > 0 => {
                        self.repository
                            .set_metric(item_id, metric::PAGEVIEWS, views)
                            .await?;
                        counters.insert(metric::PAGEVIEWS, views);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Pageview fetch failed for {}: {}", item.url, e),
                }
            }
        }

        // Stamped unconditionally so a failed or disabled fetch still honors
        // the ttl instead of re-querying on every read.
        self.repository.set_last_updated(item_id, Utc::now()).await?;

        for observer in &self.observers {
            observer.metrics_refreshed(item_id, &counters);
        }

        Ok(())
    }
}

/// Run-at offsets for a full backfill. Cold items go first, 5 seconds apart
/// starting at zero. The warm tier continues from the last cold offset
/// rather than advancing past it, then spaces out at 30 seconds.
fn stagger_plan(cold: &[Item], warm: &[Item]) -> Vec<(i64, Duration)> {
    let mut plan = Vec::with_capacity(cold.len() + warm.len());
    let mut offset = Duration::ZERO;

    for (i, item) in cold.iter().enumerate() {
        if i > 0 {
            offset += BACKFILL_COLD_STAGGER;
        }
        plan.push((item.id, offset));
    }
    for (i, item) in warm.iter().enumerate() {
        if i > 0 {
            offset += BACKFILL_WARM_STAGGER;
        }
        plan.push((item.id, offset));
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemStatus, NewItem};
    use chrono::Duration as ChronoDuration;

    fn test_item(id: i64) -> Item {
        Item {
            id,
            title: format!("item {id}"),
            url: format!("https://example.com/{id}"),
            status: ItemStatus::Published,
            comment_count: 0,
            published_at: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }

    fn test_config() -> Config {
        Config {
            ttl_hours: 24,
            enable_social: true,
            enable_analytics: false,
            ..Config::default()
        }
    }

    /// Aggregator pointed at an unroutable loopback port: every fetch fails
    /// fast, exercising the provider-unavailable path.
    fn dead_aggregator() -> ProviderAggregator {
        ProviderAggregator::with_endpoints(
            "http://127.0.0.1:9/sharedcount".to_string(),
            "http://127.0.0.1:9/analytics".to_string(),
        )
    }

    async fn seed_repo(urls: usize) -> (Arc<Repository>, Vec<i64>) {
        let repo = Arc::new(Repository::new(":memory:").await.unwrap());
        let mut ids = Vec::new();
        for n in 0..urls {
            let id = repo
                .insert_item(NewItem {
                    title: format!("item {n}"),
                    url: format!("https://example.com/{n}"),
                    status: ItemStatus::Published,
                    comment_count: 0,
                    published_at: Some(Utc::now() - ChronoDuration::days(n as i64)),
                })
                .await
                .unwrap();
            ids.push(id);
        }
        (repo, ids)
    }

    #[test]
    fn stagger_plan_continues_warm_tier_from_last_cold_offset() {
        let cold: Vec<Item> = (1..=3).map(test_item).collect();
        let warm: Vec<Item> = (4..=5).map(test_item).collect();

        let offsets: Vec<u64> = stagger_plan(&cold, &warm)
            .iter()
            .map(|(_, offset)| offset.as_secs())
            .collect();

        assert_eq!(offsets, vec![0, 5, 10, 10, 40]);
    }

    #[test]
    fn stagger_plan_with_no_cold_items_starts_warm_at_zero() {
        let warm: Vec<Item> = (1..=3).map(test_item).collect();
        let offsets: Vec<u64> = stagger_plan(&[], &warm)
            .iter()
            .map(|(_, offset)| offset.as_secs())
            .collect();

        assert_eq!(offsets, vec![0, 30, 60]);
    }

    #[tokio::test]
    async fn enqueue_is_deduplicated_per_item() {
        let (repo, _) = seed_repo(0).await;
        let scheduler =
            RefreshScheduler::new(repo, dead_aggregator(), test_config(), Vec::new());

        // Far-future run-at keeps the job queued while we poke at the mark.
        let later = Instant::now() + Duration::from_secs(3600);
        assert!(scheduler.inner.enqueue(7, later));
        assert!(!scheduler.inner.enqueue(7, later));
        assert!(scheduler.inner.enqueue(8, later));
        assert_eq!(scheduler.pending_count(), 2);

        scheduler.shutdown().await;
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn invalid_and_unknown_items_are_no_ops() {
        let (repo, _) = seed_repo(0).await;
        let scheduler =
            RefreshScheduler::new(repo, dead_aggregator(), test_config(), Vec::new());

        assert!(!scheduler.request_refresh(0).await.unwrap());
        assert!(!scheduler.request_refresh(-3).await.unwrap());
        assert!(!scheduler.request_refresh(999).await.unwrap());

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn failed_fetch_still_stamps_last_updated_and_total() {
        let (repo, ids) = seed_repo(1).await;
        let scheduler = RefreshScheduler::new(
            Arc::clone(&repo),
            dead_aggregator(),
            test_config(),
            Vec::new(),
        );

        assert!(scheduler.request_refresh(ids[0]).await.unwrap());
        scheduler.wait_idle().await;

        assert!(repo.last_updated(ids[0]).await.unwrap().is_some());
        assert_eq!(repo.get_metric(ids[0], metric::TOTAL).await.unwrap(), Some(0));
        assert_eq!(repo.get_metric(ids[0], metric::FACEBOOK).await.unwrap(), None);

        // Freshly stamped, so another request within the ttl is a no-op.
        assert!(!scheduler.request_refresh(ids[0]).await.unwrap());

        scheduler.shutdown().await;
    }

    /// Minimal HTTP/1.1 stub serving one canned JSON body on every request.
    async fn stub_provider(body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn positive_counts_are_written_and_totaled() {
        let (repo, ids) = seed_repo(1).await;
        let base = stub_provider(r#"{"Facebook":{"total_count":150},"Twitter":42}"#).await;
        let aggregator =
            ProviderAggregator::with_endpoints(base, "http://127.0.0.1:9/".to_string());
        let scheduler =
            RefreshScheduler::new(Arc::clone(&repo), aggregator, test_config(), Vec::new());

        assert!(scheduler.request_refresh(ids[0]).await.unwrap());
        scheduler.wait_idle().await;

        assert_eq!(
            repo.get_metric(ids[0], metric::FACEBOOK).await.unwrap(),
            Some(150)
        );
        assert_eq!(
            repo.get_metric(ids[0], metric::TWITTER).await.unwrap(),
            Some(42)
        );
        // Providers missing from the response are never written.
        assert_eq!(repo.get_metric(ids[0], metric::REDDIT).await.unwrap(), None);
        assert_eq!(
            repo.get_metric(ids[0], metric::TOTAL).await.unwrap(),
            Some(192)
        );

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn zero_cycle_preserves_prior_positive_counts() {
        let (repo, ids) = seed_repo(1).await;
        repo.set_metric(ids[0], metric::FACEBOOK, 300).await.unwrap();

        let scheduler = RefreshScheduler::new(
            Arc::clone(&repo),
            dead_aggregator(),
            test_config(),
            Vec::new(),
        );

        assert!(scheduler.request_refresh(ids[0]).await.unwrap());
        scheduler.wait_idle().await;

        // The dead provider reported nothing: facebook keeps its old value
        // while the total reflects this cycle's sum.
        assert_eq!(
            repo.get_metric(ids[0], metric::FACEBOOK).await.unwrap(),
            Some(300)
        );
        assert_eq!(repo.get_metric(ids[0], metric::TOTAL).await.unwrap(), Some(0));

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn observers_fire_after_refresh() {
        struct Recorder(Mutex<Vec<(i64, Counters)>>);
        impl MetricsObserver for Recorder {
            fn metrics_refreshed(&self, item_id: i64, counters: &Counters) {
                self.0.lock().unwrap().push((item_id, counters.clone()));
            }
        }

        let (repo, ids) = seed_repo(1).await;
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let scheduler = RefreshScheduler::new(
            Arc::clone(&repo),
            dead_aggregator(),
            test_config(),
            vec![Arc::clone(&recorder) as Arc<dyn MetricsObserver>],
        );

        assert!(scheduler.request_refresh(ids[0]).await.unwrap());
        scheduler.wait_idle().await;

        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, ids[0]);
        assert_eq!(seen[0].1.get(metric::TOTAL), Some(&0));

        drop(seen);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn on_item_view_ignores_drafts() {
        let (repo, _) = seed_repo(0).await;
        let draft_id = repo
            .insert_item(NewItem {
                title: "draft".to_string(),
                url: "https://example.com/draft".to_string(),
                status: ItemStatus::Draft,
                comment_count: 0,
                published_at: None,
            })
            .await
            .unwrap();
        let draft = repo.get_item(draft_id).await.unwrap().unwrap();

        let scheduler =
            RefreshScheduler::new(repo, dead_aggregator(), test_config(), Vec::new());

        assert!(!scheduler.on_item_view(&draft).await.unwrap());
        assert_eq!(scheduler.pending_count(), 0);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn backfill_schedules_cold_items_for_immediate_execution() {
        let (repo, ids) = seed_repo(2).await;
        let scheduler = RefreshScheduler::new(
            Arc::clone(&repo),
            dead_aggregator(),
            test_config(),
            Vec::new(),
        );

        let scheduled = scheduler.schedule_backfill().await.unwrap();
        assert_eq!(scheduled, 2);

        // Cold offsets are 0 and 5 seconds; only the first is due now. Wait
        // for it and confirm the second is still pending.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let first_done = repo.last_updated(ids[0]).await.unwrap().is_some()
            || repo.last_updated(ids[1]).await.unwrap().is_some();
        assert!(first_done);
        assert_eq!(scheduler.pending_count(), 1);

        scheduler.shutdown().await;
    }
}
