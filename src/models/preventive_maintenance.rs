//! # Preventive Maintenance Model
//!
//! A scheduled or on-demand maintenance job covering one or more cassettes.
//! Each cassette gets a detail row carrying its checklist, findings and
//! sub-status; the PM can only complete once every detail has completed.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::state_machine::states::{PmDetailStatus, PmStatus, PmType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreventiveMaintenance {
    pub pm_id: Uuid,
    pub pm_number: String,
    pub pm_type: PmType,
    pub status: PmStatus,
    pub scheduled_date: NaiveDate,
    pub engineer_id: Option<Uuid>,
    pub location: Option<String>,
    pub notes: Option<String>,
    /// Routine PMs enqueue their next occurrence on completion while this is set
    pub auto_schedule: bool,
    pub interval_days: Option<u32>,
    pub details: Vec<PmDetail>,
    pub cancel_reason: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmDetail {
    pub detail_id: Uuid,
    pub pm_id: Uuid,
    pub cassette_id: Uuid,
    pub status: PmDetailStatus,
    pub checklist: Value,
    pub findings: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPreventiveMaintenance {
    pub cassette_ids: Vec<Uuid>,
    pub scheduled_date: NaiveDate,
    pub pm_type: PmType,
    pub engineer_id: Option<Uuid>,
    pub location: Option<String>,
    pub notes: Option<String>,
    /// Only honoured for routine PMs; falls back to the configured default
    pub interval_days: Option<u32>,
    #[serde(default = "default_auto_schedule")]
    pub auto_schedule: bool,
}

fn default_auto_schedule() -> bool {
    true
}

/// PATCH payload. Status changes go through the dedicated operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PmUpdate {
    pub engineer_id: Option<Uuid>,
    pub location: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub details: Vec<PmDetailUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PmDetailUpdate {
    pub cassette_id: Uuid,
    pub status: Option<PmDetailStatus>,
    pub checklist: Option<Value>,
    pub findings: Option<String>,
}

impl PreventiveMaintenance {
    pub fn schedule(
        request: &NewPreventiveMaintenance,
        pm_number: String,
        created_by: Uuid,
        default_interval: u32,
    ) -> Self {
        let now = Utc::now();
        let pm_id = Uuid::new_v4();
        let routine = request.pm_type == PmType::Routine;
        let details = request
            .cassette_ids
            .iter()
            .map(|cassette_id| PmDetail {
                detail_id: Uuid::new_v4(),
                pm_id,
                cassette_id: *cassette_id,
                status: PmDetailStatus::Pending,
                checklist: Value::Object(Default::default()),
                findings: None,
            })
            .collect();

        Self {
            pm_id,
            pm_number,
            pm_type: request.pm_type,
            status: PmStatus::Scheduled,
            scheduled_date: request.scheduled_date,
            engineer_id: request.engineer_id,
            location: request.location.clone(),
            notes: request.notes.clone(),
            auto_schedule: routine && request.auto_schedule,
            interval_days: routine.then(|| request.interval_days.unwrap_or(default_interval)),
            details,
            cancel_reason: None,
            started_at: None,
            completed_at: None,
            deleted_at: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn cassette_ids(&self) -> Vec<Uuid> {
        self.details.iter().map(|d| d.cassette_id).collect()
    }

    pub fn all_details_completed(&self) -> bool {
        self.details
            .iter()
            .all(|d| d.status == PmDetailStatus::Completed)
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none() && !self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(pm_type: PmType) -> NewPreventiveMaintenance {
        NewPreventiveMaintenance {
            cassette_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            scheduled_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            pm_type,
            engineer_id: None,
            location: None,
            notes: None,
            interval_days: None,
            auto_schedule: true,
        }
    }

    #[test]
    fn test_routine_pm_gets_default_interval() {
        let pm = PreventiveMaintenance::schedule(
            &request(PmType::Routine),
            "PM-20260301-000001".to_string(),
            Uuid::new_v4(),
            90,
        );
        assert!(pm.auto_schedule);
        assert_eq!(pm.interval_days, Some(90));
        assert_eq!(pm.details.len(), 2);
    }

    #[test]
    fn test_on_demand_pm_never_auto_schedules() {
        let pm = PreventiveMaintenance::schedule(
            &request(PmType::OnDemand),
            "PM-20260301-000002".to_string(),
            Uuid::new_v4(),
            90,
        );
        assert!(!pm.auto_schedule);
        assert_eq!(pm.interval_days, None);
        assert!(!pm.all_details_completed());
    }
}
