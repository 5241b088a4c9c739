use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::import::ItemImporter;
use crate::models::{Counters, SortColumn};
use crate::providers::ProviderAggregator;
use crate::ranking::{RankingPage, RankingView};
use crate::scheduler::{MetricsObserver, RefreshScheduler};
use crate::tui::AppAction;

/// Date-range presets cycled by the dashboard, in months (0 = all time).
const RANGE_PRESETS: [u32; 5] = [0, 1, 3, 6, 12];

const PER_PAGE: usize = 10;

/// Forwards refresh notifications into the UI event loop so the dashboard
/// reloads once fresh counters have landed.
struct RefreshNotifier {
    tx: mpsc::Sender<i64>,
}

impl MetricsObserver for RefreshNotifier {
    fn metrics_refreshed(&self, item_id: i64, _counters: &Counters) {
        // Dropped sends are fine; any one event triggers a full reload.
        let _ = self.tx.try_send(item_id);
    }
}

pub struct App {
    // Data
    pub ranking: RankingPage,
    pub sort: SortColumn,
    pub range_months: u32,
    pub page: usize,

    // UI state
    pub selected_index: usize,
    pub show_help: bool,
    pub import_input_active: bool,
    pub import_input: String,
    pub status_message: Option<String>,

    // Async state
    refresh_rx: mpsc::Receiver<i64>,

    // Services
    pub repository: Arc<Repository>,
    pub scheduler: RefreshScheduler,
    view: RankingView,
    importer: ItemImporter,
    pub config: Config,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Arc::new(Repository::new(&config.db_path).await?);

        let (refresh_tx, refresh_rx) = mpsc::channel(64);
        let notifier: Arc<dyn MetricsObserver> = Arc::new(RefreshNotifier { tx: refresh_tx });

        let scheduler = RefreshScheduler::new(
            Arc::clone(&repository),
            ProviderAggregator::new(),
            config.clone(),
            vec![notifier],
        );

        let view = RankingView::new(Arc::clone(&repository));
        let sort = config.default_sort_column;
        let range_months = config.default_date_range_months;
        let ranking = view.build(sort, range_months, 1, PER_PAGE).await?;

        Ok(Self {
            ranking,
            sort,
            range_months,
            page: 1,
            selected_index: 0,
            show_help: false,
            import_input_active: false,
            import_input: String::new(),
            status_message: None,
            refresh_rx,
            repository,
            scheduler,
            view,
            importer: ItemImporter::new(),
            config: config.clone(),
        })
    }

    pub fn selected_row(&self) -> Option<&crate::ranking::RankingRow> {
        self.ranking.rows.get(self.selected_index)
    }

    pub async fn handle_action(&mut self, action: AppAction) -> Result<bool> {
        match action {
            AppAction::Quit => return Ok(true),

            AppAction::MoveUp => {
                if self.selected_index > 0 {
                    self.selected_index -= 1;
                    self.on_selection_changed().await?;
                }
            }

            AppAction::MoveDown => {
                let len = self.ranking.rows.len();
                if len > 0 && self.selected_index < len - 1 {
                    self.selected_index += 1;
                    self.on_selection_changed().await?;
                }
            }

            AppAction::NextPage => {
                if self.page < self.ranking.total_pages() {
                    self.page += 1;
                    self.selected_index = 0;
                    self.reload_ranking().await?;
                }
            }

            AppAction::PrevPage => {
                if self.page > 1 {
                    self.page -= 1;
                    self.selected_index = 0;
                    self.reload_ranking().await?;
                }
            }

            AppAction::CycleSort => {
                self.sort = self.sort.cycle();
                self.page = 1;
                self.selected_index = 0;
                self.reload_ranking().await?;
            }

            AppAction::CycleRange => {
                let next = RANGE_PRESETS
                    .iter()
                    .position(|&r| r == self.range_months)
                    .map(|i| RANGE_PRESETS[(i + 1) % RANGE_PRESETS.len()])
                    .unwrap_or(RANGE_PRESETS[0]);
                self.range_months = next;
                self.page = 1;
                self.selected_index = 0;
                self.reload_ranking().await?;
            }

            AppAction::RefreshSelected => {
                if let Some(row) = self.selected_row() {
                    let id = row.id;
                    let title = row.title.clone();
                    let queued = self.scheduler.request_refresh(id).await?;
                    self.status_message = Some(if queued {
                        format!("Refresh queued for \"{}\"", title)
                    } else {
                        format!("Metrics for \"{}\" are fresh", title)
                    });
                }
            }

            AppAction::Backfill => {
                let scheduled = self.scheduler.schedule_backfill().await?;
                self.status_message = Some(format!("Scheduled {} refresh jobs", scheduled));
            }

            AppAction::OpenInBrowser => {
                if let Some(row) = self.selected_row() {
                    let url = row.url.clone();
                    let _ = open::that(&url);
                }
            }

            AppAction::ShowHelp => {
                self.show_help = true;
            }

            AppAction::HideHelp => {
                self.show_help = false;
            }

            AppAction::ImportStart => {
                self.import_input_active = true;
                self.import_input.clear();
            }

            AppAction::ImportInputChar(c) => {
                self.import_input.push(c);
            }

            AppAction::ImportInputBackspace => {
                self.import_input.pop();
            }

            AppAction::ImportInputConfirm => {
                let url = self.import_input.trim().to_string();
                self.import_input_active = false;
                self.import_input.clear();
                if !url.is_empty() {
                    match self.importer.import(&self.repository, &url).await {
                        Ok(imported) => {
                            self.status_message =
                                Some(format!("Imported {} items (B to backfill metrics)", imported));
                            self.reload_ranking().await?;
                        }
                        Err(e) => {
                            self.status_message = Some(format!("Import failed: {}", e));
                        }
                    }
                }
            }

            AppAction::ImportInputCancel => {
                self.import_input_active = false;
                self.import_input.clear();
            }
        }

        Ok(false)
    }

    /// Read trigger: landing on a row counts as viewing that item, which may
    /// queue a staleness refresh behind the scenes.
    async fn on_selection_changed(&mut self) -> Result<()> {
        let Some(row) = self.ranking.rows.get(self.selected_index) else {
            return Ok(());
        };
        if let Some(item) = self.repository.get_item(row.id).await? {
            self.scheduler.on_item_view(&item).await?;
        }
        Ok(())
    }

    /// Poll for completed refreshes (non-blocking) and reload the ranking
    /// when any landed.
    pub async fn poll_refresh_events(&mut self) -> Result<()> {
        let mut dirty = false;
        while self.refresh_rx.try_recv().is_ok() {
            dirty = true;
        }
        if dirty {
            self.reload_ranking().await?;
        }
        Ok(())
    }

    async fn reload_ranking(&mut self) -> Result<()> {
        self.ranking = self
            .view
            .build(self.sort, self.range_months, self.page, PER_PAGE)
            .await?;
        if self.selected_index >= self.ranking.rows.len() {
            self.selected_index = self.ranking.rows.len().saturating_sub(1);
        }
        Ok(())
    }

    // Headless entry points

    pub async fn import_feed(&mut self, url: &str) -> Result<usize> {
        self.importer.import(&self.repository, url).await
    }

    /// Queue a refresh for every stale published item and wait for the queue
    /// to drain.
    pub async fn refresh_stale_blocking(&self) -> Result<usize> {
        let mut queued = 0;
        for item in self.repository.get_published_items().await? {
            if self.scheduler.request_refresh(item.id).await? {
                queued += 1;
            }
        }
        self.scheduler.wait_idle().await;
        Ok(queued)
    }

    /// Run a full staggered backfill and wait for the queue to drain.
    pub async fn backfill_blocking(&self) -> Result<usize> {
        let scheduled = self.scheduler.schedule_backfill().await?;
        self.scheduler.wait_idle().await;
        Ok(scheduled)
    }

    /// Full subsystem teardown: cancel pending jobs, drop all stored
    /// counters, and delete the saved configuration.
    pub async fn teardown(&self) -> Result<()> {
        self.scheduler.shutdown().await;
        self.repository.clear_metrics().await?;
        Config::delete()?;
        Ok(())
    }
}
