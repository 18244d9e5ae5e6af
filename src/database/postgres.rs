//! # PostgreSQL Store
//!
//! [`Store`] backed by `sqlx` transactions. `lock_*` methods issue
//! `SELECT ... FOR UPDATE`, so two operations racing on the same cassette or
//! order serialise on the row lock, and the connection's
//! `statement_timeout` bounds how long either can wait.
//!
//! Queries are built at runtime with `sqlx::query_as` and bound parameters;
//! status columns travel as text and are parsed through the enums' `FromStr`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use super::{Store, UnitOfWork};
use crate::error::{CassetteError, Result};
use crate::models::{
    Cassette, CourierInfo, Delivery, OrderDetail, OrderTransition, PmDetail,
    PreventiveMaintenance, RepairTicket, ReturnItem, ReturnRecord, ServiceOrder,
};
use crate::state_machine::states::{CassetteStatus, OrderStatus, RepairLocation};

const CASSETTE_COLUMNS: &str =
    "cassette_id, serial_number, type_code, status, machine_id, bank_id, created_at, updated_at";

const ORDER_COLUMNS: &str = "order_id, ticket_number, status, repair_location, priority, \
     reporter_id, description, rejection_reason, rejected_by, cancel_reason, cancelled_by, \
     deleted_at, created_at, updated_at";

const DETAIL_COLUMNS: &str = "detail_id, order_id, cassette_id, request_replacement, \
     replacement_cassette_id, problem_notes";

const TICKET_COLUMNS: &str = "repair_id, order_id, cassette_id, status, qc_outcome, engineer_id, \
     parts_replaced, findings, started_at, completed_at, deleted_at, created_at, updated_at";

const PM_COLUMNS: &str = "pm_id, pm_number, pm_type, status, scheduled_date, engineer_id, \
     location, notes, auto_schedule, interval_days, cancel_reason, started_at, completed_at, \
     deleted_at, created_by, created_at, updated_at";

const PM_DETAIL_COLUMNS: &str = "detail_id, pm_id, cassette_id, status, checklist, findings";

fn parse_column<T: FromStr<Err = String>>(value: &str) -> Result<T> {
    value.parse::<T>().map_err(CassetteError::Database)
}

#[derive(Debug, FromRow)]
struct CassetteRow {
    cassette_id: Uuid,
    serial_number: String,
    type_code: String,
    status: String,
    machine_id: Option<Uuid>,
    bank_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CassetteRow> for Cassette {
    type Error = CassetteError;

    fn try_from(row: CassetteRow) -> Result<Self> {
        Ok(Cassette {
            cassette_id: row.cassette_id,
            serial_number: row.serial_number,
            type_code: row.type_code,
            status: parse_column(&row.status)?,
            machine_id: row.machine_id,
            bank_id: row.bank_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    order_id: Uuid,
    ticket_number: String,
    status: String,
    repair_location: String,
    priority: String,
    reporter_id: Uuid,
    description: Option<String>,
    rejection_reason: Option<String>,
    rejected_by: Option<Uuid>,
    cancel_reason: Option<String>,
    cancelled_by: Option<Uuid>,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, details: Vec<OrderDetail>) -> Result<ServiceOrder> {
        Ok(ServiceOrder {
            order_id: self.order_id,
            ticket_number: self.ticket_number,
            status: parse_column(&self.status)?,
            repair_location: parse_column(&self.repair_location)?,
            priority: parse_column(&self.priority)?,
            reporter_id: self.reporter_id,
            description: self.description,
            details,
            rejection_reason: self.rejection_reason,
            rejected_by: self.rejected_by,
            cancel_reason: self.cancel_reason,
            cancelled_by: self.cancelled_by,
            deleted_at: self.deleted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DetailRow {
    detail_id: Uuid,
    order_id: Uuid,
    cassette_id: Uuid,
    request_replacement: bool,
    replacement_cassette_id: Option<Uuid>,
    problem_notes: Option<String>,
}

impl From<DetailRow> for OrderDetail {
    fn from(row: DetailRow) -> Self {
        OrderDetail {
            detail_id: row.detail_id,
            order_id: row.order_id,
            cassette_id: row.cassette_id,
            request_replacement: row.request_replacement,
            replacement_cassette_id: row.replacement_cassette_id,
            problem_notes: row.problem_notes,
        }
    }
}

#[derive(Debug, FromRow)]
struct TransitionRow {
    transition_id: Uuid,
    order_id: Uuid,
    from_state: Option<String>,
    to_state: String,
    event: Option<String>,
    sort_key: i32,
    most_recent: bool,
    actor_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransitionRow> for OrderTransition {
    type Error = CassetteError;

    fn try_from(row: TransitionRow) -> Result<Self> {
        Ok(OrderTransition {
            transition_id: row.transition_id,
            order_id: row.order_id,
            from_state: row.from_state.as_deref().map(parse_column).transpose()?,
            to_state: parse_column(&row.to_state)?,
            event: row.event.as_deref().map(parse_column).transpose()?,
            sort_key: row.sort_key,
            most_recent: row.most_recent,
            actor_id: row.actor_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TicketRow {
    repair_id: Uuid,
    order_id: Uuid,
    cassette_id: Uuid,
    status: String,
    qc_outcome: String,
    engineer_id: Option<Uuid>,
    parts_replaced: Vec<String>,
    findings: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for RepairTicket {
    type Error = CassetteError;

    fn try_from(row: TicketRow) -> Result<Self> {
        Ok(RepairTicket {
            repair_id: row.repair_id,
            order_id: row.order_id,
            cassette_id: row.cassette_id,
            status: parse_column(&row.status)?,
            qc_outcome: parse_column(&row.qc_outcome)?,
            engineer_id: row.engineer_id,
            parts_replaced: row.parts_replaced,
            findings: row.findings,
            started_at: row.started_at,
            completed_at: row.completed_at,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DeliveryRow {
    delivery_id: Uuid,
    order_id: Uuid,
    cassette_id: Option<Uuid>,
    courier_name: Option<String>,
    tracking_number: Option<String>,
    sender_name: Option<String>,
    courier_notes: Option<String>,
    self_delivery: bool,
    shipped_at: DateTime<Utc>,
    received_at: Option<DateTime<Utc>>,
    received_by: Option<Uuid>,
    received_notes: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl From<DeliveryRow> for Delivery {
    fn from(row: DeliveryRow) -> Self {
        let courier = row.courier_name.map(|courier_name| CourierInfo {
            courier_name,
            tracking_number: row.tracking_number,
            sender_name: row.sender_name,
            notes: row.courier_notes,
        });
        Delivery {
            delivery_id: row.delivery_id,
            order_id: row.order_id,
            cassette_id: row.cassette_id,
            courier,
            self_delivery: row.self_delivery,
            shipped_at: row.shipped_at,
            received_at: row.received_at,
            received_by: row.received_by,
            received_notes: row.received_notes,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ReturnRow {
    return_id: Uuid,
    order_id: Uuid,
    items: Json<Vec<ReturnItem>>,
    recipient_name: Option<String>,
    recipient_signature: Option<String>,
    confirmed_by: Uuid,
    notes: Option<String>,
    confirmed_at: DateTime<Utc>,
}

impl From<ReturnRow> for ReturnRecord {
    fn from(row: ReturnRow) -> Self {
        ReturnRecord {
            return_id: row.return_id,
            order_id: row.order_id,
            items: row.items.0,
            recipient_name: row.recipient_name,
            recipient_signature: row.recipient_signature,
            confirmed_by: row.confirmed_by,
            notes: row.notes,
            confirmed_at: row.confirmed_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct PmRow {
    pm_id: Uuid,
    pm_number: String,
    pm_type: String,
    status: String,
    scheduled_date: NaiveDate,
    engineer_id: Option<Uuid>,
    location: Option<String>,
    notes: Option<String>,
    auto_schedule: bool,
    interval_days: Option<i32>,
    cancel_reason: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PmRow {
    fn into_pm(self, details: Vec<PmDetail>) -> Result<PreventiveMaintenance> {
        Ok(PreventiveMaintenance {
            pm_id: self.pm_id,
            pm_number: self.pm_number,
            pm_type: parse_column(&self.pm_type)?,
            status: parse_column(&self.status)?,
            scheduled_date: self.scheduled_date,
            engineer_id: self.engineer_id,
            location: self.location,
            notes: self.notes,
            auto_schedule: self.auto_schedule,
            interval_days: self.interval_days.and_then(|d| u32::try_from(d).ok()),
            details,
            cancel_reason: self.cancel_reason,
            started_at: self.started_at,
            completed_at: self.completed_at,
            deleted_at: self.deleted_at,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PmDetailRow {
    detail_id: Uuid,
    pm_id: Uuid,
    cassette_id: Uuid,
    status: String,
    checklist: Value,
    findings: Option<String>,
}

impl TryFrom<PmDetailRow> for PmDetail {
    type Error = CassetteError;

    fn try_from(row: PmDetailRow) -> Result<Self> {
        Ok(PmDetail {
            detail_id: row.detail_id,
            pm_id: row.pm_id,
            cassette_id: row.cassette_id,
            status: parse_column(&row.status)?,
            checklist: row.checklist,
            findings: row.findings,
        })
    }
}

/// PostgreSQL-backed store
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PostgresUnitOfWork {
    async fn load_orders(&mut self, rows: Vec<OrderRow>) -> Result<Vec<ServiceOrder>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<Uuid> = rows.iter().map(|r| r.order_id).collect();
        let detail_rows = sqlx::query_as::<_, DetailRow>(&format!(
            "SELECT {DETAIL_COLUMNS} FROM service_order_details \
             WHERE order_id = ANY($1) ORDER BY order_id, position"
        ))
        .bind(&order_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut details: HashMap<Uuid, Vec<OrderDetail>> = HashMap::new();
        for row in detail_rows {
            details.entry(row.order_id).or_default().push(row.into());
        }

        rows.into_iter()
            .map(|row| {
                let order_details = details.remove(&row.order_id).unwrap_or_default();
                row.into_order(order_details)
            })
            .collect()
    }

    async fn load_order(&mut self, row: Option<OrderRow>) -> Result<Option<ServiceOrder>> {
        match row {
            Some(row) => Ok(self.load_orders(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn load_pms(&mut self, rows: Vec<PmRow>) -> Result<Vec<PreventiveMaintenance>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let pm_ids: Vec<Uuid> = rows.iter().map(|r| r.pm_id).collect();
        let detail_rows = sqlx::query_as::<_, PmDetailRow>(&format!(
            "SELECT {PM_DETAIL_COLUMNS} FROM pm_details \
             WHERE pm_id = ANY($1) ORDER BY pm_id, position"
        ))
        .bind(&pm_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut details: HashMap<Uuid, Vec<PmDetail>> = HashMap::new();
        for row in detail_rows {
            let pm_id = row.pm_id;
            details.entry(pm_id).or_default().push(row.try_into()?);
        }

        rows.into_iter()
            .map(|row| {
                let pm_details = details.remove(&row.pm_id).unwrap_or_default();
                row.into_pm(pm_details)
            })
            .collect()
    }

    async fn select_pm(&mut self, id: Uuid, lock: bool) -> Result<Option<PreventiveMaintenance>> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let row = sqlx::query_as::<_, PmRow>(&format!(
            "SELECT {PM_COLUMNS} FROM preventive_maintenances \
             WHERE pm_id = $1 AND deleted_at IS NULL{suffix}"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(self.load_pms(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn select_ticket(&mut self, id: Uuid, lock: bool) -> Result<Option<RepairTicket>> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM repair_tickets \
             WHERE repair_id = $1 AND deleted_at IS NULL{suffix}"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(RepairTicket::try_from)
        .transpose()
    }

    async fn select_order(&mut self, id: Uuid, lock: bool) -> Result<Option<ServiceOrder>> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM service_orders \
             WHERE order_id = $1 AND deleted_at IS NULL{suffix}"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        self.load_order(row).await
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn next_document_sequence(&mut self, prefix: &str, day: NaiveDate) -> Result<u32> {
        let value: i32 = sqlx::query_scalar(
            "INSERT INTO document_sequences (prefix, day, last_value) VALUES ($1, $2, 1) \
             ON CONFLICT (prefix, day) \
             DO UPDATE SET last_value = document_sequences.last_value + 1 \
             RETURNING last_value",
        )
        .bind(prefix)
        .bind(day)
        .fetch_one(&mut *self.tx)
        .await?;

        u32::try_from(value)
            .map_err(|_| CassetteError::Internal(format!("Invalid {prefix} sequence value {value}")))
    }

    async fn lock_cassettes(&mut self, ids: &[Uuid]) -> Result<Vec<Cassette>> {
        let mut sorted = ids.to_vec();
        sorted.sort();
        sorted.dedup();

        let rows = sqlx::query_as::<_, CassetteRow>(&format!(
            "SELECT {CASSETTE_COLUMNS} FROM cassettes \
             WHERE cassette_id = ANY($1) ORDER BY cassette_id FOR UPDATE"
        ))
        .bind(&sorted)
        .fetch_all(&mut *self.tx)
        .await?;

        if let Some(missing) = sorted
            .iter()
            .find(|id| !rows.iter().any(|r| r.cassette_id == **id))
        {
            return Err(CassetteError::not_found("cassette", *missing));
        }

        rows.into_iter().map(Cassette::try_from).collect()
    }

    async fn find_cassette(&mut self, id: Uuid) -> Result<Option<Cassette>> {
        sqlx::query_as::<_, CassetteRow>(&format!(
            "SELECT {CASSETTE_COLUMNS} FROM cassettes WHERE cassette_id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(Cassette::try_from)
        .transpose()
    }

    async fn update_cassette_status(
        &mut self,
        id: Uuid,
        status: CassetteStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE cassettes SET status = $2, updated_at = $3 WHERE cassette_id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CassetteError::not_found("cassette", id));
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &ServiceOrder) -> Result<()> {
        sqlx::query(
            "INSERT INTO service_orders \
             (order_id, ticket_number, status, repair_location, priority, reporter_id, \
              description, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(order.order_id)
        .bind(&order.ticket_number)
        .bind(order.status.as_str())
        .bind(order.repair_location.as_str())
        .bind(order.priority.as_str())
        .bind(order.reporter_id)
        .bind(&order.description)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for (position, detail) in order.details.iter().enumerate() {
            sqlx::query(
                "INSERT INTO service_order_details \
                 (detail_id, order_id, position, cassette_id, request_replacement, \
                  replacement_cassette_id, problem_notes) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(detail.detail_id)
            .bind(order.order_id)
            .bind(position as i32)
            .bind(detail.cassette_id)
            .bind(detail.request_replacement)
            .bind(detail.replacement_cassette_id)
            .bind(&detail.problem_notes)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn lock_order(&mut self, id: Uuid) -> Result<Option<ServiceOrder>> {
        self.select_order(id, true).await
    }

    async fn find_order(&mut self, id: Uuid) -> Result<Option<ServiceOrder>> {
        self.select_order(id, false).await
    }

    async fn open_orders_for_cassettes(
        &mut self,
        cassette_ids: &[Uuid],
    ) -> Result<Vec<ServiceOrder>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM service_orders o \
             WHERE o.deleted_at IS NULL AND o.status <> 'CLOSED' \
               AND EXISTS ( \
                 SELECT 1 FROM service_order_details d \
                 WHERE d.order_id = o.order_id \
                   AND (d.cassette_id = ANY($1) OR d.replacement_cassette_id = ANY($1))) \
             ORDER BY o.created_at"
        ))
        .bind(cassette_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        self.load_orders(rows).await
    }

    async fn update_order_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE service_orders SET status = $2, updated_at = $3 \
             WHERE order_id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CassetteError::not_found("service_order", id));
        }
        Ok(())
    }

    async fn update_order_location(
        &mut self,
        id: Uuid,
        location: RepairLocation,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE service_orders SET repair_location = $2, updated_at = $3 \
             WHERE order_id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(location.as_str())
        .bind(at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CassetteError::not_found("service_order", id));
        }
        Ok(())
    }

    async fn record_on_site_rejection(
        &mut self,
        id: Uuid,
        reason: Option<&str>,
        rejected_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE service_orders \
             SET rejection_reason = $2, rejected_by = $3, updated_at = $4 \
             WHERE order_id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(reason)
        .bind(rejected_by)
        .bind(at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CassetteError::not_found("service_order", id));
        }
        Ok(())
    }

    async fn soft_delete_order(
        &mut self,
        id: Uuid,
        reason: &str,
        actor_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE service_orders \
             SET deleted_at = $2, cancel_reason = $3, cancelled_by = $4, updated_at = $2 \
             WHERE order_id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .bind(reason)
        .bind(actor_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CassetteError::not_found("service_order", id));
        }
        Ok(())
    }

    async fn bind_replacement(&mut self, detail_id: Uuid, replacement_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE service_order_details SET replacement_cassette_id = $2 WHERE detail_id = $1",
        )
        .bind(detail_id)
        .bind(replacement_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CassetteError::not_found("service_order_detail", detail_id));
        }
        Ok(())
    }

    async fn insert_order_transition(&mut self, transition: &OrderTransition) -> Result<()> {
        let sort_key: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sort_key), 0) + 1 \
             FROM service_order_transitions WHERE order_id = $1",
        )
        .bind(transition.order_id)
        .fetch_one(&mut *self.tx)
        .await?;

        sqlx::query(
            "UPDATE service_order_transitions SET most_recent = false \
             WHERE order_id = $1 AND most_recent",
        )
        .bind(transition.order_id)
        .execute(&mut *self.tx)
        .await?;

        sqlx::query(
            "INSERT INTO service_order_transitions \
             (transition_id, order_id, from_state, to_state, event, sort_key, most_recent, \
              actor_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, true, $7, $8)",
        )
        .bind(transition.transition_id)
        .bind(transition.order_id)
        .bind(transition.from_state.map(|s| s.as_str()))
        .bind(transition.to_state.as_str())
        .bind(transition.event.map(|e| e.event_type()))
        .bind(sort_key)
        .bind(transition.actor_id)
        .bind(transition.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn order_transitions(&mut self, order_id: Uuid) -> Result<Vec<OrderTransition>> {
        sqlx::query_as::<_, TransitionRow>(
            "SELECT transition_id, order_id, from_state, to_state, event, sort_key, \
                    most_recent, actor_id, created_at \
             FROM service_order_transitions WHERE order_id = $1 ORDER BY sort_key",
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(OrderTransition::try_from)
        .collect()
    }

    async fn insert_repair_ticket(&mut self, ticket: &RepairTicket) -> Result<()> {
        sqlx::query(
            "INSERT INTO repair_tickets \
             (repair_id, order_id, cassette_id, status, qc_outcome, engineer_id, \
              parts_replaced, findings, started_at, completed_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(ticket.repair_id)
        .bind(ticket.order_id)
        .bind(ticket.cassette_id)
        .bind(ticket.status.as_str())
        .bind(ticket.qc_outcome.as_str())
        .bind(ticket.engineer_id)
        .bind(&ticket.parts_replaced)
        .bind(&ticket.findings)
        .bind(ticket.started_at)
        .bind(ticket.completed_at)
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_repair_ticket(&mut self, id: Uuid) -> Result<Option<RepairTicket>> {
        self.select_ticket(id, true).await
    }

    async fn find_repair_ticket(&mut self, id: Uuid) -> Result<Option<RepairTicket>> {
        self.select_ticket(id, false).await
    }

    async fn repair_tickets_for_order(&mut self, order_id: Uuid) -> Result<Vec<RepairTicket>> {
        sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM repair_tickets \
             WHERE order_id = $1 AND deleted_at IS NULL ORDER BY created_at"
        ))
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(RepairTicket::try_from)
        .collect()
    }

    async fn active_repair_tickets_for_cassettes(
        &mut self,
        cassette_ids: &[Uuid],
    ) -> Result<Vec<RepairTicket>> {
        sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM repair_tickets \
             WHERE cassette_id = ANY($1) AND deleted_at IS NULL AND status <> 'COMPLETED'"
        ))
        .bind(cassette_ids)
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(RepairTicket::try_from)
        .collect()
    }

    async fn update_repair_ticket(&mut self, ticket: &RepairTicket) -> Result<()> {
        let result = sqlx::query(
            "UPDATE repair_tickets \
             SET status = $2, qc_outcome = $3, engineer_id = $4, parts_replaced = $5, \
                 findings = $6, started_at = $7, completed_at = $8, updated_at = $9 \
             WHERE repair_id = $1 AND deleted_at IS NULL",
        )
        .bind(ticket.repair_id)
        .bind(ticket.status.as_str())
        .bind(ticket.qc_outcome.as_str())
        .bind(ticket.engineer_id)
        .bind(&ticket.parts_replaced)
        .bind(&ticket.findings)
        .bind(ticket.started_at)
        .bind(ticket.completed_at)
        .bind(ticket.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CassetteError::not_found("repair_ticket", ticket.repair_id));
        }
        Ok(())
    }

    async fn void_repair_tickets(&mut self, order_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE repair_tickets SET deleted_at = $2, updated_at = $2 \
             WHERE order_id = $1 AND deleted_at IS NULL",
        )
        .bind(order_id)
        .bind(at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_delivery(&mut self, order_id: Uuid) -> Result<Option<Delivery>> {
        let row = sqlx::query_as::<_, DeliveryRow>(
            "SELECT delivery_id, order_id, cassette_id, courier_name, tracking_number, \
                    sender_name, courier_notes, self_delivery, shipped_at, received_at, \
                    received_by, received_notes, created_by, created_at \
             FROM deliveries WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Delivery::from))
    }

    async fn save_delivery(&mut self, delivery: &Delivery) -> Result<()> {
        let courier = delivery.courier.as_ref();
        sqlx::query(
            "INSERT INTO deliveries \
             (delivery_id, order_id, cassette_id, courier_name, tracking_number, sender_name, \
              courier_notes, self_delivery, shipped_at, received_at, received_by, \
              received_notes, created_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (order_id) DO UPDATE SET \
               received_at = EXCLUDED.received_at, \
               received_by = EXCLUDED.received_by, \
               received_notes = EXCLUDED.received_notes",
        )
        .bind(delivery.delivery_id)
        .bind(delivery.order_id)
        .bind(delivery.cassette_id)
        .bind(courier.map(|c| c.courier_name.clone()))
        .bind(courier.and_then(|c| c.tracking_number.clone()))
        .bind(courier.and_then(|c| c.sender_name.clone()))
        .bind(courier.and_then(|c| c.notes.clone()))
        .bind(delivery.self_delivery)
        .bind(delivery.shipped_at)
        .bind(delivery.received_at)
        .bind(delivery.received_by)
        .bind(&delivery.received_notes)
        .bind(delivery.created_by)
        .bind(delivery.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_return(&mut self, order_id: Uuid) -> Result<Option<ReturnRecord>> {
        let row = sqlx::query_as::<_, ReturnRow>(
            "SELECT return_id, order_id, items, recipient_name, recipient_signature, \
                    confirmed_by, notes, confirmed_at \
             FROM returns WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(ReturnRecord::from))
    }

    async fn insert_return(&mut self, record: &ReturnRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO returns \
             (return_id, order_id, items, recipient_name, recipient_signature, confirmed_by, \
              notes, confirmed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.return_id)
        .bind(record.order_id)
        .bind(Json(&record.items))
        .bind(&record.recipient_name)
        .bind(&record.recipient_signature)
        .bind(record.confirmed_by)
        .bind(&record.notes)
        .bind(record.confirmed_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_pm(&mut self, pm: &PreventiveMaintenance) -> Result<()> {
        sqlx::query(
            "INSERT INTO preventive_maintenances \
             (pm_id, pm_number, pm_type, status, scheduled_date, engineer_id, location, notes, \
              auto_schedule, interval_days, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(pm.pm_id)
        .bind(&pm.pm_number)
        .bind(pm.pm_type.as_str())
        .bind(pm.status.as_str())
        .bind(pm.scheduled_date)
        .bind(pm.engineer_id)
        .bind(&pm.location)
        .bind(&pm.notes)
        .bind(pm.auto_schedule)
        .bind(pm.interval_days.map(|d| d as i32))
        .bind(pm.created_by)
        .bind(pm.created_at)
        .bind(pm.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for (position, detail) in pm.details.iter().enumerate() {
            sqlx::query(
                "INSERT INTO pm_details \
                 (detail_id, pm_id, position, cassette_id, status, checklist, findings) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(detail.detail_id)
            .bind(pm.pm_id)
            .bind(position as i32)
            .bind(detail.cassette_id)
            .bind(detail.status.as_str())
            .bind(&detail.checklist)
            .bind(&detail.findings)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn lock_pm(&mut self, id: Uuid) -> Result<Option<PreventiveMaintenance>> {
        self.select_pm(id, true).await
    }

    async fn find_pm(&mut self, id: Uuid) -> Result<Option<PreventiveMaintenance>> {
        self.select_pm(id, false).await
    }

    async fn active_pms_for_cassettes(
        &mut self,
        cassette_ids: &[Uuid],
    ) -> Result<Vec<PreventiveMaintenance>> {
        let rows = sqlx::query_as::<_, PmRow>(&format!(
            "SELECT {PM_COLUMNS} FROM preventive_maintenances pm \
             WHERE pm.deleted_at IS NULL \
               AND pm.status NOT IN ('COMPLETED', 'CANCELLED') \
               AND EXISTS ( \
                 SELECT 1 FROM pm_details d \
                 WHERE d.pm_id = pm.pm_id AND d.cassette_id = ANY($1)) \
             ORDER BY pm.created_at"
        ))
        .bind(cassette_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        self.load_pms(rows).await
    }

    async fn update_pm(&mut self, pm: &PreventiveMaintenance) -> Result<()> {
        let result = sqlx::query(
            "UPDATE preventive_maintenances \
             SET status = $2, scheduled_date = $3, engineer_id = $4, location = $5, notes = $6, \
                 auto_schedule = $7, interval_days = $8, cancel_reason = $9, started_at = $10, \
                 completed_at = $11, deleted_at = $12, updated_at = $13 \
             WHERE pm_id = $1",
        )
        .bind(pm.pm_id)
        .bind(pm.status.as_str())
        .bind(pm.scheduled_date)
        .bind(pm.engineer_id)
        .bind(&pm.location)
        .bind(&pm.notes)
        .bind(pm.auto_schedule)
        .bind(pm.interval_days.map(|d| d as i32))
        .bind(&pm.cancel_reason)
        .bind(pm.started_at)
        .bind(pm.completed_at)
        .bind(pm.deleted_at)
        .bind(pm.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CassetteError::not_found("preventive_maintenance", pm.pm_id));
        }

        for detail in &pm.details {
            sqlx::query(
                "UPDATE pm_details SET status = $2, checklist = $3, findings = $4 \
                 WHERE detail_id = $1",
            )
            .bind(detail.detail_id)
            .bind(detail.status.as_str())
            .bind(&detail.checklist)
            .bind(&detail.findings)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
