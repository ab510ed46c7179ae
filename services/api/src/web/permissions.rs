//! services/api/src/web/permissions.rs
//!
//! Lets the front end ask whether a control (e.g. an upload button) should be shown.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};
use crm_core::RequestContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::web::error::PageError;
use crate::web::state::AppState;

#[derive(Deserialize)]
pub struct PermissionQuery {
    pub module: String,
    pub action: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PermissionCheckResponse {
    pub module: String,
    pub action: String,
    pub allowed: bool,
}

/// GET /permissions/check
#[utoipa::path(
    get,
    path = "/permissions/check",
    params(
        ("module" = String, Query, description = "Module name, e.g. `documents`"),
        ("action" = Option<String>, Query, description = "view, create, edit or delete (default view)")
    ),
    responses((status = 200, description = "Whether the caller holds the permission", body = PermissionCheckResponse))
)]
pub async fn check_permission_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<PermissionQuery>,
) -> Result<impl IntoResponse, PageError> {
    let identity = state.require_login(&ctx)?;
    let action = query.action.unwrap_or_else(|| "view".to_string());

    let allowed = state
        .guard
        .resolver()
        .is_allowed_str(Some(identity), &query.module, &action)
        .await;

    Ok(Json(PermissionCheckResponse {
        module: query.module,
        action,
        allowed,
    }))
}
