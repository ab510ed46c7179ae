pub mod activity;
pub mod attendance;
pub mod auth;
pub mod documents;
pub mod error;
pub mod middleware;
pub mod notifications;
pub mod permissions;
pub mod profile;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

pub use error::PageError;
pub use middleware::{load_context, require_login};
pub use state::AppState;

/// Room for multipart framing and the title field on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Builds the application router with every route wired to its handler.
///
/// `load_context` wraps all routes so each handler sees a `RequestContext`;
/// the protected group additionally redirects anonymous callers to the login page.
pub fn app_router(state: Arc<AppState>) -> Router {
    // Public routes (no session required)
    let public_routes = Router::new()
        .route("/login", get(auth::login_page))
        .route("/forbidden", get(auth::forbidden_page))
        .route("/auth/login", post(auth::login_handler));

    // Protected routes (session required; handlers check module permissions)
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/me", get(auth::me_handler))
        .route("/permissions/check", get(permissions::check_permission_handler))
        .route(
            "/documents",
            get(documents::list_documents_handler).post(documents::upload_document_handler),
        )
        .route("/documents/{id}", delete(documents::delete_document_handler))
        .route("/documents/{id}/download", get(documents::download_document_handler))
        .route(
            "/profile",
            get(profile::get_profile_handler).put(profile::update_profile_handler),
        )
        .route("/profile/password", post(profile::change_password_handler))
        .route("/notifications", get(notifications::list_notifications_handler))
        .route("/notifications/read-all", post(notifications::mark_all_read_handler))
        .route("/notifications/{id}/read", post(notifications::mark_read_handler))
        .route("/activity", get(activity::list_activity_handler))
        .route("/attendance/check-in", post(attendance::check_in_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_login,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(
            state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            load_context,
        ))
        .with_state(state)
}
