//! Auto-resolution sweep
//!
//! A timer task periodically resolves every escalation whose deadline has
//! passed. Sweeps never overlap: a second request while one is running
//! (timer tick or `POST /api/sweep`) is refused instead of queued.

use modvote_common::events::EscalationEvent;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{EscalationError, Result};
use crate::processor::{EscalationProcessor, ResolutionRequest};

/// Counts from one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct AutoResolutionScheduler {
    processor: Arc<EscalationProcessor>,
    running: AtomicBool,
}

/// Clears the running flag when a sweep ends, even on panic
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AutoResolutionScheduler {
    pub fn new(processor: Arc<EscalationProcessor>) -> Self {
        Self {
            processor,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one sweep; `None` if another sweep is in progress
    pub async fn try_sweep(&self) -> Result<Option<SweepReport>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sweep already running, skipping");
            return Ok(None);
        }
        let _guard = SweepGuard(&self.running);

        self.run_sweep().await.map(Some)
    }

    /// Resolve due escalations one at a time
    ///
    /// Per-item failures are counted and logged; only failing to list due
    /// escalations aborts the sweep.
    async fn run_sweep(&self) -> Result<SweepReport> {
        let service = self.processor.service();
        let due = service.due_escalations().await?;
        let mut report = SweepReport::default();

        for escalation in due {
            report.processed += 1;

            match self
                .processor
                .process(&escalation.id, ResolutionRequest::timeout())
                .await
            {
                Ok(resolved) => {
                    report.succeeded += 1;
                    debug!(
                        escalation_id = %resolved.id,
                        resolution = ?resolved.resolution,
                        "Sweep resolved escalation"
                    );
                }
                Err(EscalationError::AlreadyResolved { escalation_id, .. }) => {
                    report.failed += 1;
                    info!(escalation_id = %escalation_id, "Escalation resolved elsewhere during sweep");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        escalation_id = %escalation.id,
                        error = %e,
                        "Failed to auto-resolve escalation, will retry next sweep"
                    );
                }
            }
        }

        if report.processed > 0 {
            info!(
                processed = report.processed,
                succeeded = report.succeeded,
                failed = report.failed,
                "Sweep complete"
            );
        }

        service.events().emit_lossy(EscalationEvent::SweepCompleted {
            processed: report.processed,
            succeeded: report.succeeded,
            failed: report.failed,
            timestamp: service.now(),
        });

        Ok(report)
    }

    /// Start the periodic sweep task
    pub fn spawn(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = every.as_secs(), "Auto-resolution scheduler started");

            let mut tick = interval(every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tick.tick().await;

                if let Err(e) = self.try_sweep().await {
                    error!(error = %e, "Sweep failed");
                }
            }
        })
    }
}
