//! Aggregate reconciliation: self-healing per-user totals.
//!
//! A user's aggregate total is maintained incrementally when takes are
//! approved, but that write can be missed (a crash between the review
//! and the total update, or manual edits to stored data). Reconciliation
//! recomputes every total from the approved takes and fixes drift.
//!
//! The computation runs inside the registry actor so it sees a consistent
//! snapshot; this module provides the report type, the startup pass, and
//! the periodic background task.

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use takes_core::{TakesConfig, UserId};

use crate::registry::TakesHandle;

/// One corrected aggregate total.
#[derive(Debug, Clone, Serialize)]
pub struct FixedTotal {
    pub user_id: UserId,
    /// What the user record said before the fix.
    pub stored_secs: i64,
    /// What the approved takes add up to.
    pub computed_secs: i64,
}

/// Outcome of one reconciliation pass.
///
/// `errors` carries per-user failures; a failed user is skipped, never
/// "fixed" from incomplete data.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Number of users examined.
    pub checked: usize,
    /// Totals that drifted and were corrected.
    pub fixed: Vec<FixedTotal>,
    /// Per-user failures, described for the log.
    pub errors: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.fixed.is_empty() && self.errors.is_empty()
    }
}

/// Runs one reconciliation pass and logs its outcome.
///
/// Called once at daemon startup before the server accepts commands, and
/// then periodically by the background task.
pub async fn run_reconciliation(handle: &TakesHandle) {
    match handle.reconcile().await {
        Ok(report) if report.is_clean() => {
            info!(checked = report.checked, "Aggregate totals verified");
        }
        Ok(report) => {
            for fix in &report.fixed {
                warn!(
                    user_id = %fix.user_id,
                    stored_secs = fix.stored_secs,
                    computed_secs = fix.computed_secs,
                    "Corrected aggregate total"
                );
            }
            for err in &report.errors {
                error!(error = %err, "Reconciliation error");
            }
        }
        Err(e) => error!(error = %e, "Reconciliation pass failed"),
    }
}

/// Spawns the periodic reconciliation task.
///
/// The first tick of `interval` fires immediately, which would duplicate
/// the startup pass, so it is consumed before the loop.
pub fn spawn_reconcile_task(
    handle: TakesHandle,
    config: &TakesConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let period = config.reconcile_interval;
    tokio::spawn(async move {
        info!(interval_secs = period.as_secs(), "Reconciliation task starting");
        let mut ticker = interval(period);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Reconciliation task stopping: shutdown requested");
                    break;
                }

                _ = ticker.tick() => {
                    if !handle.is_connected() {
                        break;
                    }
                    run_reconciliation(&handle).await;
                }
            }
        }
    })
}
