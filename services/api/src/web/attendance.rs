//! services/api/src/web/attendance.rs
//!
//! Geofenced office check-in.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use crm_core::geo::valid_coordinates;
use crm_core::{Action, CheckIn, NewCheckIn, NotificationKind, Recorder, RequestContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::web::error::PageError;
use crate::web::notifications::notify_best_effort;
use crate::web::state::AppState;

pub const MODULE: &str = "attendance";

#[derive(Deserialize, ToSchema)]
pub struct CheckInRequest {
    pub office_id: i64,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CheckInResponse {
    pub id: i64,
    pub office_id: i64,
    pub distance_meters: f64,
    pub created_at: DateTime<Utc>,
}

impl From<CheckIn> for CheckInResponse {
    fn from(c: CheckIn) -> Self {
        Self {
            id: c.id,
            office_id: c.office_id,
            distance_meters: c.distance_meters,
            created_at: c.created_at,
        }
    }
}

/// POST /attendance/check-in
#[utoipa::path(
    post,
    path = "/attendance/check-in",
    request_body = CheckInRequest,
    responses(
        (status = 201, description = "Checked in", body = CheckInResponse),
        (status = 400, description = "Invalid coordinates"),
        (status = 404, description = "Unknown office"),
        (status = 422, description = "Outside the office geofence"),
        (status = 303, description = "Redirected to the login or forbidden page")
    )
)]
pub async fn check_in_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<CheckInRequest>,
) -> Result<impl IntoResponse, PageError> {
    let identity = state.require_permission(&ctx, MODULE, Action::Create).await?;

    if !valid_coordinates(req.latitude, req.longitude) {
        return Err(PageError::bad_request("Latitude or longitude out of range"));
    }
    let office = state
        .db
        .get_office(req.office_id)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to load office"))?;

    let position = office.check_position(req.latitude, req.longitude);
    if !position.inside {
        let message = format!(
            "You are {:.0} m from {}; check-in requires being within {:.0} m",
            position.distance_meters, office.name, office.radius_meters
        );
        notify_best_effort(
            &state,
            identity.user_id,
            "Check-in rejected",
            &message,
            NotificationKind::Warning,
        )
        .await;
        return Err(PageError::Status(StatusCode::UNPROCESSABLE_ENTITY, message));
    }

    let check_in = NewCheckIn {
        user_id: identity.user_id,
        office_id: office.id,
        latitude: req.latitude,
        longitude: req.longitude,
        distance_meters: position.distance_meters,
    };
    let audit = Recorder::audit(&ctx, "Check In", Some(&format!("Checked in at {}", office.name)));
    let saved = state
        .db
        .create_check_in(&check_in, &audit)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to record check-in"))?;

    info!(user_id = identity.user_id, office_id = office.id, "Checked in");
    Ok((StatusCode::CREATED, Json(CheckInResponse::from(saved))))
}
