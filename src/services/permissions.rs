//! Role/permission collaborator.
//!
//! Authentication happens upstream; the core only receives an [`Actor`] and
//! asks a [`PermissionCheck`] once per operation, before reading anything.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    /// Repair-center staff and engineers
    RcStaff,
    /// Third-party operator reporting faults and collecting cassettes
    Pengelola,
    /// Background tasks inside the core
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::RcStaff => "RC_STAFF",
            Self::Pengelola => "PENGELOLA",
            Self::System => "SYSTEM",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" | "SUPER_ADMIN" => Ok(Self::Admin),
            "RC_STAFF" | "RC_MANAGER" | "ENGINEER" => Ok(Self::RcStaff),
            "PENGELOLA" => Ok(Self::Pengelola),
            "SYSTEM" => Ok(Self::System),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

/// Authenticated caller of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub actor_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(actor_id: Uuid, role: Role) -> Self {
        Self { actor_id, role }
    }

    /// Identity used by background tasks
    pub fn system() -> Self {
        Self {
            actor_id: Uuid::nil(),
            role: Role::System,
        }
    }
}

/// Every externally callable operation of the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    OpenOrder,
    ReadOrder,
    AdvanceOrder,
    CancelOrder,
    RequestOnSite,
    ApproveOnSite,
    RejectOnSite,
    CreateReplacement,
    CreateDelivery,
    ReceiveDelivery,
    ConfirmPickup,
    ReadCassette,
    CreateRepairTickets,
    TakeRepair,
    StartRepair,
    CompleteRepair,
    ReadRepair,
    SchedulePm,
    UpdatePm,
    TakePm,
    ReschedulePm,
    CompletePm,
    CancelPm,
    DeletePm,
    DisableAutoSchedule,
    ReadPm,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenOrder => "open_order",
            Self::ReadOrder => "read_order",
            Self::AdvanceOrder => "advance_order",
            Self::CancelOrder => "cancel_order",
            Self::RequestOnSite => "request_on_site",
            Self::ApproveOnSite => "approve_on_site",
            Self::RejectOnSite => "reject_on_site",
            Self::CreateReplacement => "create_replacement",
            Self::CreateDelivery => "create_delivery",
            Self::ReceiveDelivery => "receive_delivery",
            Self::ConfirmPickup => "confirm_pickup",
            Self::ReadCassette => "read_cassette",
            Self::CreateRepairTickets => "create_repair_tickets",
            Self::TakeRepair => "take_repair",
            Self::StartRepair => "start_repair",
            Self::CompleteRepair => "complete_repair",
            Self::ReadRepair => "read_repair",
            Self::SchedulePm => "schedule_pm",
            Self::UpdatePm => "update_pm",
            Self::TakePm => "take_pm",
            Self::ReschedulePm => "reschedule_pm",
            Self::CompletePm => "complete_pm",
            Self::CancelPm => "cancel_pm",
            Self::DeletePm => "delete_pm",
            Self::DisableAutoSchedule => "disable_auto_schedule",
            Self::ReadPm => "read_pm",
        }
    }

    fn is_read(&self) -> bool {
        matches!(
            self,
            Self::ReadOrder | Self::ReadCassette | Self::ReadRepair | Self::ReadPm
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Allow,
    Deny,
}

#[async_trait]
pub trait PermissionCheck: Send + Sync {
    async fn check(&self, actor: &Actor, action: Action) -> Permission;
}

/// Grants everything; for tests and trusted local runs
#[derive(Debug, Default, Clone)]
pub struct AllowAll;

#[async_trait]
impl PermissionCheck for AllowAll {
    async fn check(&self, _actor: &Actor, _action: Action) -> Permission {
        Permission::Allow
    }
}

/// Static role table used when no external policy service is wired in
#[derive(Debug, Default, Clone)]
pub struct RolePolicy;

impl RolePolicy {
    pub fn permits(role: Role, action: Action) -> bool {
        use Action::*;

        if action.is_read() {
            return true;
        }

        match role {
            Role::Admin => true,
            Role::RcStaff => !matches!(action, OpenOrder),
            Role::Pengelola => matches!(
                action,
                OpenOrder | RequestOnSite | CreateDelivery | CancelOrder
            ),
            Role::System => matches!(action, SchedulePm),
        }
    }
}

#[async_trait]
impl PermissionCheck for RolePolicy {
    async fn check(&self, actor: &Actor, action: Action) -> Permission {
        if Self::permits(actor.role, action) {
            Permission::Allow
        } else {
            Permission::Deny
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_accepts_aliases() {
        assert_eq!("engineer".parse::<Role>().unwrap(), Role::RcStaff);
        assert_eq!("PENGELOLA".parse::<Role>().unwrap(), Role::Pengelola);
        assert!("courier".parse::<Role>().is_err());
    }

    #[tokio::test]
    async fn test_role_policy() {
        let policy = RolePolicy;
        let pengelola = Actor::new(Uuid::new_v4(), Role::Pengelola);
        let staff = Actor::new(Uuid::new_v4(), Role::RcStaff);

        assert_eq!(
            policy.check(&pengelola, Action::OpenOrder).await,
            Permission::Allow
        );
        assert_eq!(
            policy.check(&pengelola, Action::CompleteRepair).await,
            Permission::Deny
        );
        assert_eq!(
            policy.check(&staff, Action::ApproveOnSite).await,
            Permission::Allow
        );
        assert_eq!(
            policy.check(&Actor::system(), Action::SchedulePm).await,
            Permission::Allow
        );
        assert_eq!(
            policy.check(&Actor::system(), Action::CancelOrder).await,
            Permission::Deny
        );
    }
}
