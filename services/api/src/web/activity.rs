//! services/api/src/web/activity.rs
//!
//! The caller's own activity trail.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use crm_core::{Action, ActivityRecord, RequestContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::web::error::PageError;
use crate::web::state::AppState;

pub const MODULE: &str = "activity";
const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ActivityResponse {
    pub id: i64,
    pub action: String,
    pub description: Option<String>,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
}

impl From<ActivityRecord> for ActivityResponse {
    fn from(a: ActivityRecord) -> Self {
        Self {
            id: a.id,
            action: a.action,
            description: a.description,
            ip_address: a.ip_address,
            created_at: a.created_at,
        }
    }
}

/// GET /activity
#[utoipa::path(
    get,
    path = "/activity",
    params(("limit" = Option<i64>, Query, description = "Maximum records, 1 to 200 (default 50)")),
    responses(
        (status = 200, description = "Newest first", body = [ActivityResponse]),
        (status = 303, description = "Redirected to the login or forbidden page")
    )
)]
pub async fn list_activity_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ActivityQuery>,
) -> Result<impl IntoResponse, PageError> {
    let identity = state.require_permission(&ctx, MODULE, Action::View).await?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let records = state
        .db
        .list_activity(identity.user_id, limit)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to list activity"))?;

    Ok(Json(
        records
            .into_iter()
            .map(ActivityResponse::from)
            .collect::<Vec<_>>(),
    ))
}
