//! services/api/src/web/notifications.rs
//!
//! In-app notifications addressed to the logged-in user.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use crm_core::{Notification, NotificationKind, RequestContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::web::error::PageError;
use crate::web::state::AppState;

#[derive(Deserialize, Default)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct NotificationResponse {
    pub id: i64,
    pub title: String,
    pub message: String,
    /// One of `info`, `success`, `warning`, `error`.
    pub kind: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            title: n.title,
            message: n.message,
            kind: n.kind.as_str().to_string(),
            link: n.link,
            is_read: n.is_read,
            created_at: n.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

/// GET /notifications
#[utoipa::path(
    get,
    path = "/notifications",
    params(("unread_only" = Option<bool>, Query, description = "Only unread notifications")),
    responses((status = 200, description = "Newest first", body = [NotificationResponse]))
)]
pub async fn list_notifications_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<NotificationQuery>,
) -> Result<impl IntoResponse, PageError> {
    let identity = state.require_login(&ctx)?;
    let notifications = state
        .db
        .list_notifications(identity.user_id, query.unread_only)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to list notifications"))?;

    Ok(Json(
        notifications
            .into_iter()
            .map(NotificationResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// POST /notifications/{id}/read
#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    params(("id" = i64, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Marked as read"),
        (status = 404, description = "No such notification for this user")
    )
)]
pub async fn mark_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(notification_id): Path<i64>,
) -> Result<impl IntoResponse, PageError> {
    let identity = state.require_login(&ctx)?;
    state
        .db
        .mark_notification_read(identity.user_id, notification_id)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to update notification"))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /notifications/read-all
#[utoipa::path(
    post,
    path = "/notifications/read-all",
    responses((status = 200, description = "Number of notifications marked read", body = MarkAllReadResponse))
)]
pub async fn mark_all_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, PageError> {
    let identity = state.require_login(&ctx)?;
    let updated = state
        .db
        .mark_all_notifications_read(identity.user_id)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to update notifications"))?;
    Ok(Json(MarkAllReadResponse { updated }))
}

/// Convenience for handlers that raise a notification outside an audited write.
/// Failures are logged and otherwise ignored.
pub async fn notify_best_effort(
    state: &AppState,
    user_id: i64,
    title: &str,
    message: &str,
    kind: NotificationKind,
) {
    if let Err(e) = state.recorder.notify(user_id, title, message, kind, None).await {
        tracing::error!(user_id, "Failed to raise notification '{}': {}", title, e);
    }
}
