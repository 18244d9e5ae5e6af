//! Repair ticket endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{RepairCompletion, RepairTicket};
use crate::services::Actor;
use crate::web::errors::ApiResult;
use crate::web::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TakeRequest {
    pub engineer_id: Option<Uuid>,
}

/// POST /repairs/bulk-from-ticket/:id
pub async fn create_bulk_from_ticket(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Vec<RepairTicket>>)> {
    let tickets = state
        .core
        .repairs
        .create_bulk_from_order(&actor, order_id)
        .await?;
    Ok((StatusCode::CREATED, Json(tickets)))
}

/// GET /repairs/:id
pub async fn get_repair(
    State(state): State<AppState>,
    actor: Actor,
    Path(repair_id): Path<Uuid>,
) -> ApiResult<Json<RepairTicket>> {
    Ok(Json(
        state
            .core
            .repairs
            .get_repair_ticket(&actor, repair_id)
            .await?,
    ))
}

/// POST /repairs/:id/take
pub async fn take_repair(
    State(state): State<AppState>,
    actor: Actor,
    Path(repair_id): Path<Uuid>,
    body: Option<Json<TakeRequest>>,
) -> ApiResult<Json<RepairTicket>> {
    let engineer_id = body.and_then(|Json(b)| b.engineer_id);
    Ok(Json(
        state
            .core
            .repairs
            .take(&actor, repair_id, engineer_id)
            .await?,
    ))
}

/// POST /repairs/:id/start
pub async fn start_repair(
    State(state): State<AppState>,
    actor: Actor,
    Path(repair_id): Path<Uuid>,
) -> ApiResult<Json<RepairTicket>> {
    Ok(Json(state.core.repairs.start(&actor, repair_id).await?))
}

/// POST /repairs/:id/complete
pub async fn complete_repair(
    State(state): State<AppState>,
    actor: Actor,
    Path(repair_id): Path<Uuid>,
    Json(completion): Json<RepairCompletion>,
) -> ApiResult<Json<RepairTicket>> {
    Ok(Json(
        state
            .core
            .repairs
            .complete(&actor, repair_id, completion)
            .await?,
    ))
}
