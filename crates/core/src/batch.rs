//! Batch driver: runs the sync engine over every configured target with a
//! bounded worker pool.
//!
//! Targets are fed through an mpsc queue and consumed by `concurrency`
//! worker tasks, so at most that many syncs run at once (default 1, i.e.
//! sequential). Each run owns its clone directory; no current-directory or
//! environment state is shared between workers. Cancellation is
//! cooperative: a shared flag is checked before each target starts, so
//! in-flight runs finish at a well-defined checkpoint and queued targets
//! are reported as skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::models::{BatchReport, SyncTarget, TargetResult};
use crate::sync_engine::SyncEngine;

/// Runs a batch of sync targets through the engine.
pub struct BatchDriver {
    engine: Arc<SyncEngine>,
    config: Arc<AppConfig>,
    cancel: Arc<AtomicBool>,
}

impl BatchDriver {
    pub fn new(engine: Arc<SyncEngine>, config: Arc<AppConfig>) -> Self {
        Self {
            engine,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared cancellation flag. Setting it stops the batch at the next
    /// per-target checkpoint without interrupting an in-flight run.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Run every target, at most `batch.concurrency` at a time, and collect
    /// a per-target discriminated result. Target failures never abort
    /// sibling targets.
    pub async fn run(&self, targets: Vec<SyncTarget>) -> BatchReport {
        let started_at = Utc::now();
        let total = targets.len();
        let concurrency = self.config.batch.concurrency.max(1).min(total.max(1));

        info!(total, concurrency, "starting batch");

        let (task_tx, task_rx) = mpsc::channel::<SyncTarget>(total.max(1));
        for target in targets {
            // Capacity equals the target count, so feeding never blocks.
            let _ = task_tx.send(target).await;
        }
        drop(task_tx);
        let task_rx = Arc::new(Mutex::new(task_rx));

        let (result_tx, mut result_rx) = mpsc::channel::<TargetResult>(total.max(1));

        let mut workers = Vec::with_capacity(concurrency);
        for _ in 0..concurrency {
            let engine = self.engine.clone();
            let config = self.config.clone();
            let cancel = self.cancel.clone();
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    let target = {
                        let mut rx = task_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(target) = target else { break };

                    let result = run_target(&engine, &config, &cancel, target).await;
                    if result_tx.send(result).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        let mut results = Vec::with_capacity(total);
        while let Some(result) = result_rx.recv().await {
            results.push(result);
        }
        for worker in workers {
            let _ = worker.await;
        }

        let report = BatchReport {
            started_at,
            completed_at: Utc::now(),
            targets: results,
        };

        let completed = report
            .targets
            .iter()
            .filter(|t| matches!(t, TargetResult::Completed(_)))
            .count();
        info!(
            total,
            completed,
            failed = report
                .targets
                .iter()
                .filter(|t| matches!(t, TargetResult::Failed { .. }))
                .count(),
            "batch finished"
        );

        report
    }
}

/// Run one target, honoring the cancellation checkpoint and the optional
/// post-success cleanup of the clone directory.
async fn run_target(
    engine: &SyncEngine,
    config: &AppConfig,
    cancel: &AtomicBool,
    target: SyncTarget,
) -> TargetResult {
    if cancel.load(Ordering::SeqCst) {
        info!(lang = %target.language, "batch cancelled, skipping target");
        return TargetResult::Skipped {
            language: target.language,
        };
    }

    match engine.sync_language(&target).await {
        Ok(result) => {
            if config.batch.cleanup {
                let handle = engine.handle_for(&target.language);
                match std::fs::remove_dir_all(&handle.local_path) {
                    Ok(()) => info!(
                        lang = %target.language,
                        path = %handle.local_path.display(),
                        "removed local clone"
                    ),
                    Err(e) => warn!(
                        lang = %target.language,
                        error = %e,
                        "failed to remove local clone"
                    ),
                }
            }
            TargetResult::Completed(result)
        }
        Err(e) => {
            error!(lang = %target.language, error = %e, "sync failed");
            TargetResult::Failed {
                language: target.language,
                error: e.to_string(),
            }
        }
    }
}
