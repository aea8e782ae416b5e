// src/ingest/scheduler.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::FutureExt;
use metrics::counter;
use tokio::task::JoinHandle;

use crate::ingest::store::DocumentStore;
use crate::ingest::{persist_run, Pipeline};
use crate::metrics::Metrics;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval: Duration,
}

impl SchedulerCfg {
    pub fn from_secs(secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(secs.max(1)),
        }
    }
}

/// Spawn a loop that runs the full pipeline on every tick and persists the
/// results. The first tick fires immediately. Runs never overlap.
pub fn spawn_scheduler(
    cfg: SchedulerCfg,
    pipeline: Arc<Pipeline>,
    store: Arc<dyn DocumentStore>,
    snapshot: Option<(Metrics, PathBuf)>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cfg.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;

            let report = pipeline.run_once().await;
            counter!("ingest_runs_total").increment(1);

            if let Err(e) = persist_run(store.as_ref(), &report).boxed().await {
                tracing::error!(error = ?e, "persisting run failed");
            }
            if let Some((metrics, dir)) = &snapshot {
                if let Err(e) = metrics.write_snapshot(dir).await {
                    tracing::warn!(error = ?e, "metrics snapshot failed");
                }
            }

            tracing::info!(
                target: "ingest",
                indexed = report.index.count,
                next_in_secs = cfg.interval.as_secs(),
                "scheduled run complete"
            );
        }
    })
}
