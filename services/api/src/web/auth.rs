//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for login, logout and the current identity, plus the
//! landing pages that the access guard redirects to.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Redirect},
    Extension, Json,
};
use crm_core::{PortError, RequestContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::web::error::PageError;
use crate::web::middleware::SESSION_COOKIE;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
}

#[derive(Serialize, ToSchema)]
pub struct PageMessage {
    pub message: String,
}

//=========================================================================================
// Password and Cookie Helpers
//=========================================================================================

/// Hashes a password into an argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Checks a password against a stored PHC string.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(password_hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    format!(
        "{}={}; HttpOnly;{} SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        token,
        if secure { " Secure;" } else { "" },
        max_age_secs
    )
}

fn invalid_credentials() -> PageError {
    PageError::Status(StatusCode::UNAUTHORIZED, "Invalid email or password".to_string())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /login - Where unauthenticated requests are redirected
#[utoipa::path(
    get,
    path = "/login",
    responses((status = 200, description = "Login landing page", body = PageMessage))
)]
pub async fn login_page() -> impl IntoResponse {
    Json(PageMessage {
        message: "Please log in with POST /auth/login".to_string(),
    })
}

/// GET /forbidden - Where requests lacking a permission are redirected
#[utoipa::path(
    get,
    path = "/forbidden",
    responses((status = 403, description = "Forbidden landing page", body = PageMessage))
)]
pub async fn forbidden_page() -> impl IntoResponse {
    (
        StatusCode::FORBIDDEN,
        Json(PageMessage {
            message: "You do not have access to that page".to_string(),
        }),
    )
}

/// POST /auth/login - Login with an existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials or disabled account"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, PageError> {
    // 1. Get user by email
    let credentials = match state.db.get_user_by_email(req.email.trim()).await {
        Ok(credentials) => credentials,
        Err(PortError::NotFound(_)) => return Err(invalid_credentials()),
        Err(e) => return Err(PageError::from_port(e, "Authentication error")),
    };

    // 2. Verify password
    let valid = verify_password(&req.password, &credentials.password_hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        PageError::internal("Authentication error")
    })?;
    if !valid {
        return Err(invalid_credentials());
    }
    if !credentials.is_active {
        return Err(PageError::Status(
            StatusCode::UNAUTHORIZED,
            "Account is disabled".to_string(),
        ));
    }

    // 3. Replace any session the browser already had
    if let Some(old_token) = ctx.session_token.as_deref() {
        if let Err(e) = state.sessions.clear(old_token).await {
            warn!("Failed to clear previous session: {}", e);
        }
    }

    // 4. Create the auth session
    let identity = credentials.identity;
    let session = state
        .sessions
        .establish(&identity)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to create session"))?;

    // 5. Record the login; a failed audit write does not block the login
    let login_ctx = RequestContext::authenticated(identity.clone(), ctx.client_ip.clone());
    if let Err(e) = state
        .recorder
        .record_activity(&login_ctx, "Login", Some("User logged in"))
        .await
    {
        error!(user_id = identity.user_id, "Failed to record login activity: {}", e);
    }
    info!(user_id = identity.user_id, "User logged in");

    // 6. Return response with cookie
    let cookie = session_cookie(
        &session.id,
        state.config.session_max_lifetime_secs,
        state.config.cookie_secure,
    );
    let response = AuthResponse {
        user_id: identity.user_id,
        name: identity.user_name,
        email: identity.user_email,
        role: identity.user_role,
    };

    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout and invalidate the session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 303, description = "Logged out; redirected to the login page"))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, PageError> {
    let identity = state.require_login(&ctx)?;

    if let Err(e) = state
        .recorder
        .record_activity(&ctx, "Logout", Some("User logged out"))
        .await
    {
        error!(user_id = identity.user_id, "Failed to record logout activity: {}", e);
    }

    if let Some(token) = ctx.session_token.as_deref() {
        state
            .sessions
            .clear(token)
            .await
            .map_err(|e| PageError::from_port(e, "Failed to logout"))?;
    }

    let cookie = session_cookie("", 0, state.config.cookie_secure);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Redirect::to(&state.config.login_path),
    ))
}

/// GET /auth/me - The identity bound to the current session
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current identity", body = AuthResponse),
        (status = 303, description = "Not logged in")
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, PageError> {
    let identity = state.require_login(&ctx)?;
    Ok(Json(AuthResponse {
        user_id: identity.user_id,
        name: identity.user_name.clone(),
        email: identity.user_email.clone(),
        role: identity.user_role.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies_only_the_original_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn cookie_marks_secure_only_when_configured() {
        assert!(session_cookie("t", 60, true).contains("Secure;"));
        assert!(!session_cookie("t", 60, false).contains("Secure"));
        assert!(session_cookie("t", 60, false).starts_with("session=t;"));
    }
}
