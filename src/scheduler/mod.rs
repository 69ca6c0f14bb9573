//! Drives the four periodic jobs of spec §4.10 and the continuous
//! queue-worker tick, one instance per `{scope, job}` pair so US_EU and
//! AFRICA progress independently (spec §5). Grounded on the teacher's
//! `job_scheduler_service.rs` (`tokio_cron_scheduler`, per-job
//! tracking), generalized from a fixed job list to the four jobs named
//! in spec §4.10 and parameterized by `MarketScope`. Per spec §9's
//! design note, scheduler callbacks are single-shot async tasks rather
//! than blocking callbacks, and shutdown is driven by a
//! `tokio::sync::watch` cancellation channel rather than signal
//! handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::domain::job::{JobMode, JobType};
use crate::domain::scope::MarketScope;
use crate::errors::{AppError, Result};
use crate::jobs::JobRunner;
use crate::store::RelationalStore;
use crate::universe::UniverseBuilder;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub rotation_minutes: u64,
    pub gating_hours: u64,
    pub universe_days: u64,
    pub max_jobs_per_tick: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { rotation_minutes: 15, gating_hours: 6, universe_days: 7, max_jobs_per_tick: 10 }
    }
}

/// Everything a scheduled run needs, assembled by the caller (`main.rs`
/// `worker` command) from a `Config` + `RelationalStore` +
/// per-scope `JobRunner`/`UniverseBuilder` (spec §9 explicit-DI `Core`).
pub struct SchedulerContext {
    pub store: RelationalStore,
    pub runners: HashMap<MarketScope, Arc<JobRunner>>,
    pub universe_builders: HashMap<MarketScope, Arc<UniverseBuilder>>,
    pub config: SchedulerConfig,
}

type ExclusivityMap = Arc<DashMap<(MarketScope, &'static str), Arc<AsyncMutex<()>>>>;

pub struct SchedulerHandle {
    cron: JobScheduler,
    cancel_tx: watch::Sender<bool>,
    worker_tick: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops the worker tick loop and every cron timer; in-flight runs
    /// finish (cooperative cancellation happens at the next batch
    /// boundary inside `JobRunner`, not here).
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel_tx.send(true).ok();
        self.worker_tick.abort();
        self.cron.shutdown().await.map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(())
    }
}

fn exclusivity_lock(map: &ExclusivityMap, scope: MarketScope, job: &'static str) -> Arc<AsyncMutex<()>> {
    map.entry((scope, job)).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
}

/// Skips (coalesces) a firing if the previous one for this `{scope,
/// job}` pair hasn't finished yet, rather than queuing it up (spec
/// §4.10 "Each job instance is exclusive... missed executions are
/// coalesced").
async fn run_exclusive<F>(lock: Arc<AsyncMutex<()>>, scope: MarketScope, job: &'static str, fut: F)
where
    F: std::future::Future<Output = Result<crate::jobs::JobReport>>,
{
    let Ok(_guard) = lock.try_lock() else {
        warn!(scope = %scope, job, "previous run still in progress, coalescing this tick");
        return;
    };
    match fut.await {
        Ok(report) => info!(
            scope = %scope,
            job,
            processed = report.assets_processed,
            success = report.assets_success,
            failed = report.assets_failed,
            "scheduled job completed"
        ),
        Err(e) => error!(scope = %scope, job, error = %e, "scheduled job failed"),
    }
}

pub struct Scheduler;

impl Scheduler {
    /// Starts every periodic job plus the queue worker tick and
    /// returns a handle that can stop them all.
    pub async fn start(ctx: SchedulerContext) -> Result<SchedulerHandle> {
        let cron = JobScheduler::new().await.map_err(|e| AppError::Internal(e.to_string()))?;
        let exclusivity: ExclusivityMap = Arc::new(DashMap::new());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        for (&scope, runner) in &ctx.runners {
            schedule_rotation(&cron, scope, runner.clone(), &exclusivity, ctx.config.rotation_minutes).await?;
            schedule_gating(&cron, scope, runner.clone(), &exclusivity, ctx.config.gating_hours).await?;
        }
        for (&scope, builder) in &ctx.universe_builders {
            schedule_universe_rebuild(&cron, scope, builder.clone(), &exclusivity, ctx.config.universe_days).await?;
        }

        cron.start().await.map_err(|e| AppError::Internal(e.to_string()))?;

        let worker_tick = spawn_worker_tick(ctx.store.clone(), ctx.runners.clone(), ctx.universe_builders.clone(), ctx.config.max_jobs_per_tick, cancel_rx);

        Ok(SchedulerHandle { cron, cancel_tx, worker_tick })
    }
}

async fn schedule_rotation(
    cron: &JobScheduler,
    scope: MarketScope,
    runner: Arc<JobRunner>,
    exclusivity: &ExclusivityMap,
    minutes: u64,
) -> Result<()> {
    let lock = exclusivity_lock(exclusivity, scope, "rotation");
    let job = Job::new_repeated_async(Duration::from_secs(minutes.max(1) * 60), move |_uuid, _l| {
        let runner = runner.clone();
        let lock = lock.clone();
        Box::pin(async move {
            run_exclusive(lock, scope, "rotation", async {
                runner.run(JobType::Rotation, JobMode::HourlyOverlay, "scheduler", None).await
            })
            .await;
        })
    })
    .map_err(|e| AppError::Internal(e.to_string()))?;
    cron.add(job).await.map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(())
}

async fn schedule_gating(
    cron: &JobScheduler,
    scope: MarketScope,
    runner: Arc<JobRunner>,
    exclusivity: &ExclusivityMap,
    hours: u64,
) -> Result<()> {
    let lock = exclusivity_lock(exclusivity, scope, "gating");
    let job = Job::new_repeated_async(Duration::from_secs(hours.max(1) * 3600), move |_uuid, _l| {
        let runner = runner.clone();
        let lock = lock.clone();
        Box::pin(async move {
            run_exclusive(lock, scope, "gating", async {
                runner.run(JobType::Gating, JobMode::DailyFull, "scheduler", None).await
            })
            .await;
        })
    })
    .map_err(|e| AppError::Internal(e.to_string()))?;
    cron.add(job).await.map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(())
}

async fn schedule_universe_rebuild(
    cron: &JobScheduler,
    scope: MarketScope,
    builder: Arc<UniverseBuilder>,
    exclusivity: &ExclusivityMap,
    days: u64,
) -> Result<()> {
    let lock = exclusivity_lock(exclusivity, scope, "universe_rebuild");
    let job = Job::new_repeated_async(Duration::from_secs(days.max(1) * 86_400), move |_uuid, _l| {
        let builder = builder.clone();
        let lock = lock.clone();
        Box::pin(async move {
            let Ok(_guard) = lock.try_lock() else {
                warn!(scope = %scope, job = "universe_rebuild", "previous run still in progress, coalescing this tick");
                return;
            };
            match builder.rebuild(scope).await {
                Ok(report) => info!(scope = %scope, assets = report.assets_upserted, "universe rebuild completed"),
                Err(e) => error!(scope = %scope, error = %e, "universe rebuild failed"),
            }
        })
    })
    .map_err(|e| AppError::Internal(e.to_string()))?;
    cron.add(job).await.map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(())
}

/// Claims up to `max_jobs` PENDING queue items (optionally restricted
/// to one scope) and dispatches each; returns how many were claimed.
/// Shared by the background scheduler's tick and the CLI `worker`
/// command (spec §6 `worker [--scope X] [--max-jobs N]`).
pub async fn drain_queue_once(
    store: &RelationalStore,
    runners: &HashMap<MarketScope, Arc<JobRunner>>,
    universe_builders: &HashMap<MarketScope, Arc<UniverseBuilder>>,
    scope: Option<MarketScope>,
    max_jobs: i64,
) -> Result<usize> {
    let mut claimed = 0usize;
    for _ in 0..max_jobs.max(0) {
        match store.fetch_next_job_atomic(scope).await {
            Ok(Some(item)) => {
                dispatch_queue_item(store, runners, universe_builders, item).await;
                claimed += 1;
            }
            Ok(None) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(claimed)
}

/// Polls `job_queue` for at most `max_jobs_per_tick` PENDING rows per
/// iteration, dispatching each to `SCORE_TICKERS` / `REFRESH_UNIVERSE`
/// / `FULL_GATING` (spec §4.10). Runs continuously until the
/// cancellation channel fires.
fn spawn_worker_tick(
    store: RelationalStore,
    runners: HashMap<MarketScope, Arc<JobRunner>>,
    universe_builders: HashMap<MarketScope, Arc<UniverseBuilder>>,
    max_jobs_per_tick: i64,
    mut cancel_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(2));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for _ in 0..max_jobs_per_tick {
                        if *cancel_rx.borrow() {
                            return;
                        }
                        match store.fetch_next_job_atomic(None).await {
                            Ok(Some(item)) => {
                                dispatch_queue_item(&store, &runners, &universe_builders, item).await;
                            }
                            Ok(None) => break,
                            Err(e) => {
                                error!(error = %e, "worker tick: failed to claim next job");
                                break;
                            }
                        }
                    }
                }
                _ = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        return;
                    }
                }
            }
        }
    })
}

async fn dispatch_queue_item(
    store: &RelationalStore,
    runners: &HashMap<MarketScope, Arc<JobRunner>>,
    universe_builders: &HashMap<MarketScope, Arc<UniverseBuilder>>,
    item: crate::domain::job::QueueItem,
) {
    let result = handle_queue_item(runners, universe_builders, &item).await;
    match result {
        Ok(()) => {
            if let Err(e) = store.mark_job_done(&item.id).await {
                error!(job_id = %item.id, error = %e, "failed to mark queue item done");
            }
        }
        Err(e) => {
            warn!(job_id = %item.id, job_type = %item.job_type, error = %e, "queue item failed");
            if let Err(mark_err) = store.mark_job_failed(&item.id, &e.to_string()).await {
                error!(job_id = %item.id, error = %mark_err, "failed to mark queue item failed");
            }
        }
    }
}

fn asset_ids_from_payload(payload: &Value) -> Option<Vec<String>> {
    payload
        .get("asset_ids")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
}

async fn handle_queue_item(
    runners: &HashMap<MarketScope, Arc<JobRunner>>,
    universe_builders: &HashMap<MarketScope, Arc<UniverseBuilder>>,
    item: &crate::domain::job::QueueItem,
) -> Result<()> {
    let scope: MarketScope = item
        .market_scope
        .as_deref()
        .ok_or_else(|| AppError::Validation("queue item missing market_scope".to_string()))?
        .parse()
        .map_err(AppError::Validation)?;

    match item.job_type.as_str() {
        "SCORE_TICKERS" => {
            let runner = runners.get(&scope).ok_or_else(|| AppError::Internal(format!("no runner for scope {scope}")))?;
            let asset_ids = asset_ids_from_payload(&item.payload);
            runner.run(JobType::Scoring, JobMode::OnDemand, &item.requested_by, asset_ids).await?;
            Ok(())
        }
        "FULL_GATING" => {
            let runner = runners.get(&scope).ok_or_else(|| AppError::Internal(format!("no runner for scope {scope}")))?;
            runner.run(JobType::Gating, JobMode::DailyFull, &item.requested_by, None).await?;
            Ok(())
        }
        "REFRESH_UNIVERSE" => {
            let builder = universe_builders
                .get(&scope)
                .ok_or_else(|| AppError::Internal(format!("no universe builder for scope {scope}")))?;
            builder.rebuild(scope).await?;
            Ok(())
        }
        other => Err(AppError::Validation(format!("unknown queue job_type: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_ids_from_payload_extracts_string_array() {
        let payload = serde_json::json!({ "asset_ids": ["AAPL.US", "MSFT.US"] });
        let ids = asset_ids_from_payload(&payload).unwrap();
        assert_eq!(ids, vec!["AAPL.US".to_string(), "MSFT.US".to_string()]);
    }

    #[test]
    fn asset_ids_from_payload_missing_key_is_none() {
        let payload = serde_json::json!({});
        assert!(asset_ids_from_payload(&payload).is_none());
    }
}
