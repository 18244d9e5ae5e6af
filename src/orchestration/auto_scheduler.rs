//! # PM Auto-Scheduler
//!
//! Low-frequency timer task that turns queued [`NextPmOccurrence`]s into PM
//! tasks. Each occurrence is scheduled through [`PmConflictGuard::schedule`]
//! as the system actor, so the simultaneous-PM check applies exactly as it
//! does for interactive calls.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::CassetteError;
use crate::orchestration::pm_guard::PmConflictGuard;
use crate::services::{Actor, NextPmOccurrence, PmQueue, PmScheduler};
use crate::state_machine::states::CassetteStatus;

/// Outcome of one drain cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingCycle {
    pub scheduled: usize,
    /// Another PM already holds a cassette, or the cassette is gone; not retried
    pub dropped: usize,
    /// A cassette is temporarily out of `OK` (faulty, in repair, in transit);
    /// retried on a later tick
    pub deferred: usize,
    /// Failed for a non-client reason; put back on the queue
    pub requeued: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Drop,
    Defer,
    Retry,
}

/// What to do with an occurrence whose scheduling failed
fn disposition(error: &CassetteError) -> Disposition {
    match error {
        CassetteError::IllegalCassetteTransition { status, .. }
            if status != CassetteStatus::Scrapped.as_str() =>
        {
            Disposition::Defer
        }
        e if e.is_client_error() => Disposition::Drop,
        _ => Disposition::Retry,
    }
}

pub struct AutoScheduler {
    guard: PmConflictGuard,
    queue: Arc<PmQueue>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl AutoScheduler {
    pub fn new(guard: PmConflictGuard, queue: Arc<PmQueue>, interval: Duration) -> Self {
        Self {
            guard,
            queue,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle that stops the spawned loop when notified
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Drain the queue once and schedule every occurrence
    pub async fn run_cycle(&self) -> SchedulingCycle {
        let mut cycle = SchedulingCycle::default();
        let system = Actor::system();

        for occurrence in self.queue.drain().await {
            match self.guard.schedule(&system, occurrence.to_request()).await {
                Ok(pm) => {
                    cycle.scheduled += 1;
                    info!(
                        previous_pm_id = %occurrence.previous_pm_id,
                        pm_id = %pm.pm_id,
                        scheduled_date = %pm.scheduled_date,
                        "Auto-scheduled next PM occurrence"
                    );
                }
                Err(e) => match disposition(&e) {
                    Disposition::Drop => {
                        cycle.dropped += 1;
                        warn!(
                            previous_pm_id = %occurrence.previous_pm_id,
                            error = %e,
                            "Dropped PM occurrence"
                        );
                    }
                    Disposition::Defer => {
                        cycle.deferred += 1;
                        debug!(
                            previous_pm_id = %occurrence.previous_pm_id,
                            error = %e,
                            "Cassette busy, deferring PM occurrence"
                        );
                        self.requeue(occurrence).await;
                    }
                    Disposition::Retry => {
                        cycle.requeued += 1;
                        warn!(
                            previous_pm_id = %occurrence.previous_pm_id,
                            error = %e,
                            "PM occurrence failed, requeueing"
                        );
                        self.requeue(occurrence).await;
                    }
                },
            }
        }

        if cycle != SchedulingCycle::default() {
            debug!(?cycle, "Auto-scheduler cycle finished");
        }
        cycle
    }

    async fn requeue(&self, occurrence: NextPmOccurrence) {
        if let Err(e) = self.queue.enqueue(occurrence).await {
            warn!(error = %e, "Could not requeue PM occurrence");
        }
    }

    /// Run cycles every `interval` until the shutdown handle is notified
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "PM auto-scheduler started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {
                        self.run_cycle().await;
                    }
                    _ = self.shutdown.notified() => {
                        info!("PM auto-scheduler shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn illegal(status: CassetteStatus) -> CassetteError {
        CassetteError::IllegalCassetteTransition {
            cassette_id: Uuid::new_v4(),
            status: status.as_str().to_string(),
            event: "schedule_pm".to_string(),
        }
    }

    #[test]
    fn test_busy_cassettes_defer_the_occurrence() {
        for status in [
            CassetteStatus::Bad,
            CassetteStatus::InTransit,
            CassetteStatus::InRepair,
            CassetteStatus::ReadyForPickup,
        ] {
            assert_eq!(disposition(&illegal(status)), Disposition::Defer);
        }
    }

    #[test]
    fn test_permanent_failures_drop_the_occurrence() {
        assert_eq!(disposition(&illegal(CassetteStatus::Scrapped)), Disposition::Drop);
        assert_eq!(
            disposition(&CassetteError::conflict("cannot create simultaneous PM")),
            Disposition::Drop
        );
        assert_eq!(
            disposition(&CassetteError::not_found("cassette", Uuid::new_v4())),
            Disposition::Drop
        );
    }

    #[test]
    fn test_storage_failures_are_retried() {
        assert_eq!(
            disposition(&CassetteError::Database("connection reset".to_string())),
            Disposition::Retry
        );
    }
}
