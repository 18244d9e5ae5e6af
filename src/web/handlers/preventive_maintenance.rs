//! Preventive maintenance endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{NewPreventiveMaintenance, PmUpdate, PreventiveMaintenance};
use crate::services::Actor;
use crate::web::errors::ApiResult;
use crate::web::handlers::repairs::TakeRequest;
use crate::web::handlers::tickets::ReasonRequest;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub scheduled_date: NaiveDate,
}

/// POST /preventive-maintenance
pub async fn schedule_pm(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<NewPreventiveMaintenance>,
) -> ApiResult<(StatusCode, Json<PreventiveMaintenance>)> {
    let pm = state
        .core
        .preventive_maintenance
        .schedule(&actor, request)
        .await?;
    Ok((StatusCode::CREATED, Json(pm)))
}

/// GET /preventive-maintenance/:id
pub async fn get_pm(
    State(state): State<AppState>,
    actor: Actor,
    Path(pm_id): Path<Uuid>,
) -> ApiResult<Json<PreventiveMaintenance>> {
    Ok(Json(
        state
            .core
            .preventive_maintenance
            .get_pm(&actor, pm_id)
            .await?,
    ))
}

/// PATCH /preventive-maintenance/:id
pub async fn update_pm(
    State(state): State<AppState>,
    actor: Actor,
    Path(pm_id): Path<Uuid>,
    Json(update): Json<PmUpdate>,
) -> ApiResult<Json<PreventiveMaintenance>> {
    Ok(Json(
        state
            .core
            .preventive_maintenance
            .update(&actor, pm_id, update)
            .await?,
    ))
}

/// POST /preventive-maintenance/:id/take
pub async fn take_pm(
    State(state): State<AppState>,
    actor: Actor,
    Path(pm_id): Path<Uuid>,
    body: Option<Json<TakeRequest>>,
) -> ApiResult<Json<PreventiveMaintenance>> {
    let engineer_id = body.and_then(|Json(b)| b.engineer_id);
    Ok(Json(
        state
            .core
            .preventive_maintenance
            .take(&actor, pm_id, engineer_id)
            .await?,
    ))
}

/// POST /preventive-maintenance/:id/reschedule
pub async fn reschedule_pm(
    State(state): State<AppState>,
    actor: Actor,
    Path(pm_id): Path<Uuid>,
    Json(request): Json<RescheduleRequest>,
) -> ApiResult<Json<PreventiveMaintenance>> {
    Ok(Json(
        state
            .core
            .preventive_maintenance
            .reschedule(&actor, pm_id, request.scheduled_date)
            .await?,
    ))
}

/// POST /preventive-maintenance/:id/complete
pub async fn complete_pm(
    State(state): State<AppState>,
    actor: Actor,
    Path(pm_id): Path<Uuid>,
) -> ApiResult<Json<PreventiveMaintenance>> {
    Ok(Json(
        state
            .core
            .preventive_maintenance
            .complete(&actor, pm_id)
            .await?,
    ))
}

/// POST /preventive-maintenance/:id/cancel
pub async fn cancel_pm(
    State(state): State<AppState>,
    actor: Actor,
    Path(pm_id): Path<Uuid>,
    body: Option<Json<ReasonRequest>>,
) -> ApiResult<Json<PreventiveMaintenance>> {
    let reason = body.and_then(|Json(b)| b.reason);
    Ok(Json(
        state
            .core
            .preventive_maintenance
            .cancel(&actor, pm_id, reason)
            .await?,
    ))
}

/// POST /preventive-maintenance/:id/disable-auto-schedule
pub async fn disable_auto_schedule(
    State(state): State<AppState>,
    actor: Actor,
    Path(pm_id): Path<Uuid>,
) -> ApiResult<Json<PreventiveMaintenance>> {
    Ok(Json(
        state
            .core
            .preventive_maintenance
            .disable_auto_schedule(&actor, pm_id)
            .await?,
    ))
}

/// DELETE /preventive-maintenance/:id
pub async fn delete_pm(
    State(state): State<AppState>,
    actor: Actor,
    Path(pm_id): Path<Uuid>,
    body: Option<Json<ReasonRequest>>,
) -> ApiResult<Json<PreventiveMaintenance>> {
    let reason = body.and_then(|Json(b)| b.reason);
    Ok(Json(
        state
            .core
            .preventive_maintenance
            .delete(&actor, pm_id, reason)
            .await?,
    ))
}
