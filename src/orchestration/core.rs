//! # Orchestration Core
//!
//! Shared context and bootstrap for the six lifecycle components.
//!
//! ## Architecture
//!
//! [`OrchestrationContext`] bundles everything an operation needs: the
//! [`Store`], the permission check, the audit sink, the event publisher and
//! the PM scheduler. Every component holds a clone of it and runs each
//! operation the same way:
//!
//! 1. `authorize` the actor for the action
//! 2. `begin` a unit of work and lock the rows the decision depends on
//! 3. plan effects through the state machines
//! 4. `commit`, which applies the plan, commits, then audits and publishes
//!
//! Locks are always taken in the order service order → PM task → cassettes →
//! repair tickets, so two operations never wait on each other in a cycle.
//!
//! [`OrchestrationCore`] wires the components together from a [`CoreConfig`].

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::{CoreConfig, StorageBackend};
use crate::database::{DatabaseConnection, InMemoryStore, PostgresStore, Store, UnitOfWork};
use crate::error::{CassetteError, Result};
use crate::events::{DomainEvent, EventPublisher};
use crate::logging::log_error;
use crate::models::Cassette;
use crate::orchestration::{
    AutoScheduler, DeliveryReturnCoordinator, OnSiteApprovalGate, PmConflictGuard,
    RepairOrchestrator, ServiceOrderManager,
};
use crate::services::{
    Action, Actor, AuditEntry, AuditSink, Permission, PermissionCheck, PmQueue, PmScheduler,
    RolePolicy, TracingAuditSink,
};
use crate::state_machine::effects::{apply_effects, EffectPlan};
use crate::state_machine::events::CassetteEvent;
use crate::state_machine::states::CassetteStatus;
use crate::state_machine::CassetteStateTracker;

/// Collaborators shared by every lifecycle component
#[derive(Clone)]
pub struct OrchestrationContext {
    pub store: Arc<dyn Store>,
    pub events: EventPublisher,
    pub audit: Arc<dyn AuditSink>,
    pub permissions: Arc<dyn PermissionCheck>,
    pub scheduler: Arc<dyn PmScheduler>,
    pub config: Arc<CoreConfig>,
}

impl std::fmt::Debug for OrchestrationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationContext")
            .field("backend", &self.store.backend())
            .field("subscribers", &self.events.subscriber_count())
            .finish()
    }
}

impl OrchestrationContext {
    /// Context with the role policy, tracing audit sink and an unattached
    /// PM queue
    pub fn new(store: Arc<dyn Store>, config: CoreConfig) -> Self {
        Self {
            store,
            events: EventPublisher::new(config.events.channel_capacity),
            audit: Arc::new(TracingAuditSink),
            permissions: Arc::new(RolePolicy),
            scheduler: Arc::new(PmQueue::new()),
            config: Arc::new(config),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionCheck>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn PmScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Reject the call unless the permission collaborator allows it
    pub async fn authorize(&self, actor: &Actor, action: Action) -> Result<()> {
        match self.permissions.check(actor, action).await {
            Permission::Allow => Ok(()),
            Permission::Deny => {
                let error = CassetteError::Forbidden {
                    action: action.to_string(),
                };
                log_error(action.as_str(), &error);
                Err(error)
            }
        }
    }

    pub async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        self.store.begin().await
    }

    /// Apply `plan`, commit, then emit one audit entry and one event per
    /// effect. Nothing is audited or published if the commit fails.
    pub async fn commit(
        &self,
        mut uow: Box<dyn UnitOfWork>,
        plan: &EffectPlan,
        actor: &Actor,
    ) -> Result<()> {
        apply_effects(uow.as_mut(), plan, actor.actor_id, Utc::now()).await?;
        uow.commit().await?;

        for effect in plan.effects() {
            let entry = AuditEntry::new(
                effect.entity_type(),
                effect.entity_id(),
                effect.action(),
                actor.actor_id,
            );
            if let Err(e) = self.audit.record(entry).await {
                log_error("audit.record", &e);
            }
            self.events
                .publish(DomainEvent::from_effect(effect, actor.actor_id));
        }

        Ok(())
    }
}

/// Cassette rows locked by the current operation, updated in place as the
/// operation plans cassette events
#[derive(Debug, Default)]
pub struct LockedCassettes {
    rows: BTreeMap<Uuid, Cassette>,
}

impl LockedCassettes {
    /// Lock `ids` (deduplicated) in the unit of work
    pub async fn lock(uow: &mut dyn UnitOfWork, ids: &[Uuid]) -> Result<Self> {
        let mut sorted: Vec<Uuid> = ids.to_vec();
        sorted.sort();
        sorted.dedup();

        let rows = uow
            .lock_cassettes(&sorted)
            .await?
            .into_iter()
            .map(|c| (c.cassette_id, c))
            .collect();
        Ok(Self { rows })
    }

    pub fn get(&self, id: Uuid) -> Result<&Cassette> {
        self.rows
            .get(&id)
            .ok_or_else(|| CassetteError::not_found("cassette", id))
    }

    pub fn status(&self, id: Uuid) -> Result<CassetteStatus> {
        Ok(self.get(id)?.status)
    }

    /// Run `event` through the tracker for one locked cassette
    pub fn apply(
        &mut self,
        id: Uuid,
        event: CassetteEvent,
        plan: &mut EffectPlan,
    ) -> Result<CassetteStatus> {
        let cassette = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| CassetteError::not_found("cassette", id))?;
        CassetteStateTracker::apply(cassette, event, plan)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The lifecycle core with every component bootstrapped from one config
pub struct OrchestrationCore {
    pub context: OrchestrationContext,
    pub orders: ServiceOrderManager,
    pub repairs: RepairOrchestrator,
    pub deliveries: DeliveryReturnCoordinator,
    pub preventive_maintenance: PmConflictGuard,
    pub on_site: OnSiteApprovalGate,
    /// Queue fed by routine PM completions and drained by the auto-scheduler
    pub pm_queue: Arc<PmQueue>,
}

impl OrchestrationCore {
    /// Bootstrap over an existing store with default collaborators
    pub fn new(store: Arc<dyn Store>, config: CoreConfig) -> Self {
        Self::from_context(OrchestrationContext::new(store, config))
    }

    /// Bootstrap from a context; the context's scheduler is replaced by the
    /// core's own PM queue
    pub fn from_context(context: OrchestrationContext) -> Self {
        let pm_queue = Arc::new(PmQueue::new());
        let context = context.with_scheduler(pm_queue.clone());

        info!(
            backend = context.store.backend(),
            auto_schedule = context.config.preventive_maintenance.auto_schedule_enabled,
            "Orchestration core initialized"
        );

        Self {
            orders: ServiceOrderManager::new(context.clone()),
            repairs: RepairOrchestrator::new(context.clone()),
            deliveries: DeliveryReturnCoordinator::new(context.clone()),
            preventive_maintenance: PmConflictGuard::new(context.clone()),
            on_site: OnSiteApprovalGate::new(context.clone()),
            context,
            pm_queue,
        }
    }

    /// Connect the configured storage backend and bootstrap the core
    pub async fn from_config(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn Store> = match config.storage.backend {
            StorageBackend::Postgres => {
                let connection = DatabaseConnection::new(&config.database).await?;
                if config.database.run_migrations {
                    connection.run_migrations().await?;
                }
                Arc::new(PostgresStore::new(connection.pool().clone()))
            }
            StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        };

        Ok(Self::new(store, config))
    }

    /// Auto-scheduler over this core's PM queue
    pub fn auto_scheduler(&self) -> AutoScheduler {
        AutoScheduler::new(
            self.preventive_maintenance.clone(),
            self.pm_queue.clone(),
            self.context.config.auto_schedule_poll_interval(),
        )
    }

    pub fn config(&self) -> &CoreConfig {
        &self.context.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewCassette;
    use crate::services::{AllowAll, InMemoryAuditSink, Role};
    use crate::state_machine::effects::Effect;

    async fn store_with(status: CassetteStatus) -> (InMemoryStore, Uuid) {
        let store = InMemoryStore::new();
        let cassette = Cassette::register(NewCassette {
            serial_number: "CST-9".to_string(),
            type_code: "RJC".to_string(),
            bank_id: Uuid::new_v4(),
            machine_id: None,
            status: Some(status),
        });
        let id = cassette.cassette_id;
        store.insert_cassette(cassette).await;
        (store, id)
    }

    #[tokio::test]
    async fn test_commit_audits_and_publishes_after_commit() {
        let (store, id) = store_with(CassetteStatus::Ok).await;
        let audit = Arc::new(InMemoryAuditSink::new());
        let context = OrchestrationContext::new(Arc::new(store.clone()), CoreConfig::for_tests())
            .with_audit(audit.clone());
        let mut events = context.events.subscribe();
        let actor = Actor::new(Uuid::new_v4(), Role::RcStaff);

        let mut uow = context.begin().await.unwrap();
        let mut cassettes = LockedCassettes::lock(uow.as_mut(), &[id, id]).await.unwrap();
        assert_eq!(cassettes.len(), 1);
        let mut plan = EffectPlan::new();
        cassettes
            .apply(id, CassetteEvent::ReportFault, &mut plan)
            .unwrap();
        context.commit(uow, &plan, &actor).await.unwrap();

        let mut uow = context.begin().await.unwrap();
        let stored = uow.find_cassette(id).await.unwrap().unwrap();
        assert_eq!(stored.status, CassetteStatus::Bad);

        assert_eq!(audit.actions_for(id).await, vec!["cassette.status_changed"]);
        let event = events.recv().await.unwrap();
        assert_eq!(event.entity_id, id);
        assert_eq!(event.actor_id, actor.actor_id);
    }

    #[tokio::test]
    async fn test_failed_apply_emits_nothing() {
        let (store, id) = store_with(CassetteStatus::Ok).await;
        let audit = Arc::new(InMemoryAuditSink::new());
        let context = OrchestrationContext::new(Arc::new(store), CoreConfig::for_tests())
            .with_audit(audit.clone());

        let mut plan = EffectPlan::new();
        plan.push(Effect::CassetteStatusChanged {
            cassette_id: id,
            from: CassetteStatus::Ok,
            to: CassetteStatus::Bad,
            event: CassetteEvent::ReportFault,
        });
        plan.push(Effect::RepairTicketsVoided {
            order_id: Uuid::new_v4(),
        });
        plan.push(Effect::OrderStatusChanged {
            order_id: Uuid::new_v4(),
            from: crate::state_machine::states::OrderStatus::Open,
            to: crate::state_machine::states::OrderStatus::InDelivery,
            event: crate::state_machine::events::OrderEvent::Ship,
        });

        let uow = context.begin().await.unwrap();
        assert!(context.commit(uow, &plan, &Actor::system()).await.is_err());
        assert!(audit.entries().await.is_empty());

        let mut uow = context.begin().await.unwrap();
        let stored = uow.find_cassette(id).await.unwrap().unwrap();
        assert_eq!(stored.status, CassetteStatus::Ok);
    }

    #[tokio::test]
    async fn test_authorize_maps_deny_to_forbidden() {
        let (store, _) = store_with(CassetteStatus::Ok).await;
        let context = OrchestrationContext::new(Arc::new(store), CoreConfig::for_tests());

        let pengelola = Actor::new(Uuid::new_v4(), Role::Pengelola);
        assert!(context.authorize(&pengelola, Action::OpenOrder).await.is_ok());
        assert!(matches!(
            context.authorize(&pengelola, Action::CompleteRepair).await,
            Err(CassetteError::Forbidden { .. })
        ));

        let open = context.with_permissions(Arc::new(AllowAll));
        assert!(open.authorize(&pengelola, Action::CompleteRepair).await.is_ok());
    }
}
