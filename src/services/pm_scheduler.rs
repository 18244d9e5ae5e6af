//! PM scheduling collaborator.
//!
//! Completing a routine PM with auto-scheduling on hands the next occurrence
//! to a [`PmScheduler`]. [`PmQueue`] is the in-process implementation the
//! auto-scheduler drains.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::error::{CassetteError, Result};
use crate::models::{NewPreventiveMaintenance, PreventiveMaintenance};
use crate::state_machine::states::PmType;

/// Follow-up routine PM derived from a completed one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextPmOccurrence {
    pub previous_pm_id: Uuid,
    pub cassette_ids: Vec<Uuid>,
    pub scheduled_date: NaiveDate,
    pub interval_days: u32,
    pub engineer_id: Option<Uuid>,
    pub location: Option<String>,
}

impl NextPmOccurrence {
    /// Next occurrence of a completed routine PM, if it auto-schedules
    pub fn following(pm: &PreventiveMaintenance) -> Option<Self> {
        if pm.pm_type != PmType::Routine || !pm.auto_schedule {
            return None;
        }
        let interval_days = pm.interval_days?;
        let scheduled_date = pm
            .scheduled_date
            .checked_add_days(chrono::Days::new(u64::from(interval_days)))?;

        Some(Self {
            previous_pm_id: pm.pm_id,
            cassette_ids: pm.cassette_ids(),
            scheduled_date,
            interval_days,
            engineer_id: pm.engineer_id,
            location: pm.location.clone(),
        })
    }

    /// Request for the regular scheduling entry point
    pub fn to_request(&self) -> NewPreventiveMaintenance {
        NewPreventiveMaintenance {
            cassette_ids: self.cassette_ids.clone(),
            scheduled_date: self.scheduled_date,
            pm_type: PmType::Routine,
            engineer_id: self.engineer_id,
            location: self.location.clone(),
            notes: Some(format!("Auto-scheduled after PM {}", self.previous_pm_id)),
            interval_days: Some(self.interval_days),
            auto_schedule: true,
        }
    }
}

#[async_trait]
pub trait PmScheduler: Send + Sync {
    async fn enqueue(&self, occurrence: NextPmOccurrence) -> Result<()>;
}

/// Unbounded in-process queue of pending occurrences
#[derive(Debug)]
pub struct PmQueue {
    sender: mpsc::UnboundedSender<NextPmOccurrence>,
    receiver: Mutex<mpsc::UnboundedReceiver<NextPmOccurrence>>,
}

impl PmQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Take every occurrence queued so far
    pub async fn drain(&self) -> Vec<NextPmOccurrence> {
        let mut receiver = self.receiver.lock().await;
        let mut drained = Vec::new();
        while let Ok(occurrence) = receiver.try_recv() {
            drained.push(occurrence);
        }
        drained
    }
}

impl Default for PmQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PmScheduler for PmQueue {
    async fn enqueue(&self, occurrence: NextPmOccurrence) -> Result<()> {
        self.sender
            .send(occurrence)
            .map_err(|_| CassetteError::Internal("PM scheduler queue is closed".to_string()))
    }
}
