//! Request extractors.
//!
//! Authentication happens in front of this service; the gateway forwards the
//! caller as `x-actor-id` and `x-actor-role` headers.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::services::{Actor, Role};
use crate::web::errors::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ApiError::unauthorized(format!("Missing {name} header")))
        };

        let actor_id = header(ACTOR_ID_HEADER)?
            .parse::<Uuid>()
            .map_err(|_| ApiError::unauthorized(format!("Invalid {ACTOR_ID_HEADER} header")))?;
        let role = header(ACTOR_ROLE_HEADER)?
            .parse::<Role>()
            .map_err(ApiError::unauthorized)?;

        Ok(Actor::new(actor_id, role))
    }
}
