//! services/api/src/web/profile.rs
//!
//! The logged-in user's own profile and password.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use crm_core::{Identity, NewNotification, NotificationKind, ProfileUpdate, Recorder, RequestContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::web::auth::{hash_password, verify_password};
use crate::web::error::PageError;
use crate::web::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl From<&Identity> for ProfileResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            user_id: identity.user_id,
            name: identity.user_name.clone(),
            email: identity.user_email.clone(),
            role: identity.user_role.clone(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub name: String,
    pub email: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// GET /profile
#[utoipa::path(
    get,
    path = "/profile",
    responses((status = 200, description = "The caller's profile", body = ProfileResponse))
)]
pub async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, PageError> {
    let identity = state.require_login(&ctx)?;
    let user = state
        .db
        .get_user_by_id(identity.user_id)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to load profile"))?;
    Ok(Json(ProfileResponse::from(&user.identity)))
}

/// PUT /profile - Update name and email
#[utoipa::path(
    put,
    path = "/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = ProfileResponse),
        (status = 400, description = "Invalid name or email"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, PageError> {
    let identity = state.require_login(&ctx)?;

    let update = ProfileUpdate {
        user_name: req.name.trim().to_string(),
        user_email: req.email.trim().to_string(),
    };
    if update.user_name.is_empty() {
        return Err(PageError::bad_request("Name is required"));
    }
    if !is_plausible_email(&update.user_email) {
        return Err(PageError::bad_request("A valid email address is required"));
    }

    let audit = Recorder::audit(&ctx, "Update Profile", Some("Updated name and email"));
    let updated = state
        .db
        .update_profile(identity.user_id, &update, &audit)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to update profile"))?;

    Ok(Json(ProfileResponse::from(&updated)))
}

/// POST /profile/password - Change the caller's password
#[utoipa::path(
    post,
    path = "/profile/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Weak new password or wrong current password")
    )
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, PageError> {
    let identity = state.require_login(&ctx)?;

    if req.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PageError::bad_request(format!(
            "New password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let user = state
        .db
        .get_user_by_id(identity.user_id)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to load profile"))?;
    let current_ok = verify_password(&req.current_password, &user.password_hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        PageError::internal("Authentication error")
    })?;
    if !current_ok {
        return Err(PageError::bad_request("Current password is incorrect"));
    }

    let new_hash = hash_password(&req.new_password).map_err(|e| {
        error!("Failed to hash password: {:?}", e);
        PageError::internal("Failed to hash password")
    })?;
    let audit = Recorder::audit(&ctx, "Change Password", None).with_notification(NewNotification {
        user_id: identity.user_id,
        title: "Password changed".to_string(),
        message: "Your password was changed. Contact an administrator if this was not you."
            .to_string(),
        kind: NotificationKind::Warning,
        link: None,
    });
    state
        .db
        .update_password_hash(identity.user_id, &new_hash, &audit)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to change password"))?;

    Ok(StatusCode::NO_CONTENT)
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !email.contains(' ')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_plausibility() {
        assert!(is_plausible_email("kim@example.com"));
        assert!(!is_plausible_email("kim@localhost"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("kim example@example.com"));
        assert!(!is_plausible_email("kim"));
    }
}
