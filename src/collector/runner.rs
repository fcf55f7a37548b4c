use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::cache::{self, CacheWriter, ONLINE_TTL, RECORD_TTL};
use crate::collector::limiter::{RateLimiters, RequestClass};
use crate::collector::pool::WorkerPool;
use crate::collector::task::PhaseReport;
use crate::collector::{locale, news};
use crate::config::CollectorConfig;
use crate::error::{CollectError, CollectResult};
use crate::metrics::{METRICS, RuntimeMetrics};
use crate::schema::{CatalogEntry, PlayerCountSample, Probe, RecordSnapshot};
use crate::store::{CatalogStore, Reconciler, RetentionPolicy};
use crate::upstream::CatalogProvider;
use crate::util::generate_id;

/// The two kinds of scheduled cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// Canonical records, then announcements.
    Info,
    /// Player-count samples.
    Players,
}

impl CycleKind {
    pub fn label(self) -> &'static str {
        match self {
            CycleKind::Info => "info",
            CycleKind::Players => "players",
        }
    }
}

/// Collaborators handed to the collector at startup.
pub struct Collaborators {
    pub provider: Arc<dyn CatalogProvider>,
    pub store: Arc<dyn CatalogStore>,
    pub cache: CacheWriter,
}

/// Orchestrates collection cycles.
///
/// DESIGN:
/// - One long-lived instance, shared (via `Arc`) by both schedules.
/// - Each cycle loads the catalog, then fans out one task per game per
///   phase on the shared worker pool.
/// - The info cycle has two phases (records, then announcements) with a
///   fence in between.
/// - Failures stay inside the entity task that hit them; a cycle always
///   runs to completion (or cancellation) and reports counts.
///
/// NOT RESPONSIBLE FOR:
/// - HTTP details (adapter)
/// - SQL (store backend)
/// - Rate-shaping policy (limiter)
///
pub struct Collector {
    provider: Arc<dyn CatalogProvider>,
    store: Arc<dyn CatalogStore>,
    cache: CacheWriter,
    reconciler: Reconciler,
    retention: RetentionPolicy,
    limiters: RateLimiters,
    pool: WorkerPool,
    probes: Vec<Probe>,
    news_count: usize,
}

impl Collector {
    pub fn new(parts: Collaborators, cfg: &CollectorConfig) -> Self {
        Self {
            reconciler: Reconciler::new(parts.store.clone()),
            retention: RetentionPolicy::new(parts.store.clone(), cfg.retention_threshold),
            limiters: RateLimiters::new(&cfg.limiter),
            pool: WorkerPool::new(cfg.workers),
            probes: cfg.probes.clone(),
            news_count: cfg.news_count,
            provider: parts.provider,
            store: parts.store,
            cache: parts.cache,
        }
    }

    pub async fn run_cycle(
        self: &Arc<Self>,
        kind: CycleKind,
        cancel: &CancellationToken,
    ) -> CollectResult<Vec<PhaseReport>> {
        match kind {
            CycleKind::Info => self.run_info_cycle(cancel).await,
            CycleKind::Players => self.run_player_cycle(cancel).await,
        }
    }

    // --------------------------------------------------------
    // Info cycle
    // --------------------------------------------------------

    /// Records phase, fence, announcements phase.
    ///
    /// Returns an error only if the catalog itself cannot be loaded.
    pub async fn run_info_cycle(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> CollectResult<Vec<PhaseReport>> {
        let entries = self.begin(CycleKind::Info).await?;

        let records = self
            .fan_out("records", &entries, cancel, |c, entry, cancel| async move {
                c.collect_records(entry, &cancel).await
            })
            .await;

        let announcements = self
            .fan_out("news", &entries, cancel, |c, entry, cancel| async move {
                c.collect_announcements(entry, &cancel).await
            })
            .await;

        let reports = vec![records, announcements];
        self.finish(CycleKind::Info, &reports);
        Ok(reports)
    }

    async fn collect_records(&self, entry: CatalogEntry, cancel: &CancellationToken) -> CollectResult<()> {
        let records =
            locale::collect_records(self.provider.as_ref(), &self.limiters, cancel, entry, &self.probes)
                .await?;

        let collect_date = Utc::now();
        let mut first_err = None;

        for record in records {
            // A store failure leaves both the row and its cached
            // snapshot as they were.
            let record = match self.reconciler.upsert(record).await {
                Ok((_, saved)) => saved,
                Err(e) => {
                    first_err.get_or_insert(e);
                    continue;
                }
            };

            let key = cache::record_key(record.lang, record.game_id);
            let snapshot = RecordSnapshot { record: &record, collect_date };
            if let Err(e) = self.cache.publish(&key, &snapshot, RECORD_TTL).await {
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    async fn collect_announcements(
        &self,
        entry: CatalogEntry,
        cancel: &CancellationToken,
    ) -> CollectResult<()> {
        let items = news::collect_announcements(
            self.provider.as_ref(),
            &self.limiters,
            cancel,
            entry,
            self.news_count,
        )
        .await?;

        let mut first_err = None;

        for item in items {
            let item = match self.reconciler.upsert(item).await {
                Ok((_, saved)) => saved,
                Err(e) => {
                    first_err.get_or_insert(e);
                    continue;
                }
            };

            let key = cache::news_key(item.lang, item.game_id, item.index);
            if let Err(e) = self.cache.publish(&key, &item, RECORD_TTL).await {
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    // --------------------------------------------------------
    // Player cycle
    // --------------------------------------------------------

    pub async fn run_player_cycle(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> CollectResult<Vec<PhaseReport>> {
        let entries = self.begin(CycleKind::Players).await?;

        let report = self
            .fan_out("players", &entries, cancel, |c, entry, cancel| async move {
                c.collect_players(entry, &cancel).await
            })
            .await;

        let reports = vec![report];
        self.finish(CycleKind::Players, &reports);
        Ok(reports)
    }

    /// A failed fetch stores nothing; no zero sample is recorded.
    async fn collect_players(&self, entry: CatalogEntry, cancel: &CancellationToken) -> CollectResult<()> {
        self.limiters.acquire(RequestClass::PublicStats, cancel).await?;
        RuntimeMetrics::incr(&METRICS.upstream_requests);
        let count = self.provider.current_players(entry.app_id).await?;

        let sample = PlayerCountSample {
            id: generate_id(),
            game_id: entry.id,
            count,
            create_time: Utc::now(),
        };

        let admitted = self.retention.admit(&sample).await;
        let published = self
            .cache
            .publish(&cache::online_key(entry.id), &sample, ONLINE_TTL)
            .await;

        admitted.and(published)
    }

    // --------------------------------------------------------
    // Shared cycle plumbing
    // --------------------------------------------------------

    async fn begin(&self, kind: CycleKind) -> CollectResult<Vec<CatalogEntry>> {
        RuntimeMetrics::incr(&METRICS.cycles_started);

        let entries = self.store.list_catalog().await.map_err(|e| {
            error!("[{}] cycle aborted: catalog unavailable: {e}", kind.label());
            CollectError::from(e)
        })?;

        info!(
            "[{}] cycle started: {} games, {} workers, provider {}",
            kind.label(),
            entries.len(),
            self.pool.size(),
            self.provider.name()
        );
        Ok(entries)
    }

    fn finish(&self, kind: CycleKind, reports: &[PhaseReport]) {
        for report in reports {
            info!("{report}");
        }
        let faulted: usize = reports.iter().map(|r| r.faulted).sum();
        if faulted > 0 {
            warn!("[{}] cycle finished with {faulted} faulted tasks", kind.label());
        } else {
            info!("[{}] cycle finished", kind.label());
        }
    }

    /// Submits one task per game and waits for all of them.
    async fn fan_out<F, Fut>(
        self: &Arc<Self>,
        phase: &'static str,
        entries: &[CatalogEntry],
        cancel: &CancellationToken,
        work: F,
    ) -> PhaseReport
    where
        F: Fn(Arc<Self>, CatalogEntry, CancellationToken) -> Fut,
        Fut: Future<Output = CollectResult<()>> + Send + 'static,
    {
        let mut group = self.pool.phase(phase);
        for &entry in entries {
            group.submit(entry.id, work(self.clone(), entry, cancel.clone()));
        }
        group.join().await
    }
}

// ------------------------------------------------------------
// Schedules
// ------------------------------------------------------------

/// Runs `kind` cycles every `every`, starting immediately.
///
/// GUARANTEES:
/// - Cycles of the same kind never overlap: a tick that comes due while
///   a cycle is still running is skipped, not queued.
/// - Returns once `shutdown` fires; an in-flight cycle observes the same
///   token and winds down first.
///
pub async fn run_schedule(
    collector: Arc<Collector>,
    kind: CycleKind,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // The error is already logged where it happened.
        let cycle = shutdown.child_token();
        let _ = collector.run_cycle(kind, &cycle).await;
    }

    info!("[{}] schedule stopped", kind.label());
}
