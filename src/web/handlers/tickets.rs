//! Service order ("ticket") endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{
    Cassette, Delivery, DeliveryRequest, NewOrderDetail, NewServiceOrder, OrderTransition,
    PickupConfirmation, RepairTicket, ReturnRecord, ServiceOrder,
};
use crate::services::Actor;
use crate::state_machine::states::{OrderPriority, OrderStatus, RepairLocation};
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

/// Body of `POST /tickets`; the reporter is the calling actor
#[derive(Debug, Deserialize)]
pub struct OpenTicketRequest {
    #[serde(default)]
    pub repair_location: RepairLocation,
    #[serde(default)]
    pub priority: OrderPriority,
    pub description: Option<String>,
    pub cassettes: Vec<NewOrderDetail>,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub target: OrderStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplacementRequest {
    pub detail_id: Uuid,
    pub replacement_cassette_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReceiveDeliveryRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnRequest {
    pub order_id: Uuid,
    #[serde(flatten)]
    pub confirmation: PickupConfirmation,
}

/// Open a service order: POST /tickets
pub async fn open_ticket(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<OpenTicketRequest>,
) -> ApiResult<(StatusCode, Json<ServiceOrder>)> {
    let order = state
        .core
        .orders
        .open(
            &actor,
            NewServiceOrder {
                reporter_id: actor.actor_id,
                repair_location: request.repair_location,
                priority: request.priority,
                description: request.description,
                cassettes: request.cassettes,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /tickets/:id
pub async fn get_ticket(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<ServiceOrder>> {
    Ok(Json(state.core.orders.get_order(&actor, order_id).await?))
}

/// GET /tickets/:id/history
pub async fn ticket_history(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<Vec<OrderTransition>>> {
    Ok(Json(state.core.orders.order_history(&actor, order_id).await?))
}

/// GET /tickets/:id/repairs
pub async fn ticket_repairs(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<Vec<RepairTicket>>> {
    Ok(Json(
        state
            .core
            .repairs
            .repair_tickets_for_order(&actor, order_id)
            .await?,
    ))
}

/// POST /tickets/:id/advance
pub async fn advance_ticket(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
    Json(request): Json<AdvanceRequest>,
) -> ApiResult<Json<ServiceOrder>> {
    Ok(Json(
        state
            .core
            .orders
            .advance(&actor, order_id, request.target)
            .await?,
    ))
}

/// POST /tickets/:id/reconcile
pub async fn reconcile_ticket(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<ServiceOrder>> {
    Ok(Json(state.core.orders.reconcile(&actor, order_id).await?))
}

/// POST /tickets/:id/request-on-site
pub async fn request_on_site(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<ServiceOrder>> {
    Ok(Json(
        state.core.on_site.request_on_site(&actor, order_id).await?,
    ))
}

/// POST /tickets/:id/approve-on-site
pub async fn approve_on_site(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<ServiceOrder>> {
    Ok(Json(state.core.on_site.approve(&actor, order_id).await?))
}

/// POST /tickets/:id/reject-on-site
pub async fn reject_on_site(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
    body: Option<Json<ReasonRequest>>,
) -> ApiResult<Json<ServiceOrder>> {
    let reason = body.and_then(|Json(b)| b.reason);
    Ok(Json(
        state.core.on_site.reject(&actor, order_id, reason).await?,
    ))
}

/// POST /tickets/:id/replacement
pub async fn create_replacement(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
    Json(request): Json<ReplacementRequest>,
) -> ApiResult<Json<ServiceOrder>> {
    Ok(Json(
        state
            .core
            .orders
            .create_replacement(
                &actor,
                order_id,
                request.detail_id,
                request.replacement_cassette_id,
            )
            .await?,
    ))
}

/// POST /tickets/delivery
pub async fn create_delivery(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<DeliveryRequest>,
) -> ApiResult<(StatusCode, Json<Delivery>)> {
    let delivery = state
        .core
        .deliveries
        .create_delivery(&actor, request)
        .await?;
    Ok((StatusCode::CREATED, Json(delivery)))
}

/// GET /tickets/:id/delivery
pub async fn get_delivery(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<Delivery>> {
    Ok(Json(
        state.core.deliveries.get_delivery(&actor, order_id).await?,
    ))
}

/// POST /tickets/:id/receive-delivery
pub async fn receive_delivery(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
    body: Option<Json<ReceiveDeliveryRequest>>,
) -> ApiResult<Json<Delivery>> {
    let notes = body.and_then(|Json(b)| b.notes);
    Ok(Json(
        state
            .core
            .deliveries
            .receive_delivery(&actor, order_id, notes)
            .await?,
    ))
}

/// POST /tickets/return
pub async fn create_return(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<ReturnRequest>,
) -> ApiResult<(StatusCode, Json<ReturnRecord>)> {
    let record = state
        .core
        .orders
        .confirm_pickup(&actor, request.order_id, request.confirmation)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /tickets/:id/return
pub async fn get_return(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<ReturnRecord>> {
    Ok(Json(
        state.core.deliveries.get_return(&actor, order_id).await?,
    ))
}

/// DELETE /tickets/:id: cancel (soft delete) the order
pub async fn cancel_ticket(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
    body: Option<Json<ReasonRequest>>,
) -> ApiResult<Json<ServiceOrder>> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .ok_or_else(|| ApiError::bad_request("A cancellation reason is required"))?;
    Ok(Json(
        state.core.orders.cancel(&actor, order_id, &reason).await?,
    ))
}

/// GET /cassettes/:id
pub async fn get_cassette(
    State(state): State<AppState>,
    actor: Actor,
    Path(cassette_id): Path<Uuid>,
) -> ApiResult<Json<Cassette>> {
    Ok(Json(
        state.core.orders.get_cassette(&actor, cassette_id).await?,
    ))
}
