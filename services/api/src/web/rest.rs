//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification of the REST API.

use utoipa::OpenApi;

use crate::web::{activity, attendance, auth, documents, notifications, permissions, profile};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_page,
        auth::forbidden_page,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        permissions::check_permission_handler,
        documents::list_documents_handler,
        documents::upload_document_handler,
        documents::download_document_handler,
        documents::delete_document_handler,
        profile::get_profile_handler,
        profile::update_profile_handler,
        profile::change_password_handler,
        notifications::list_notifications_handler,
        notifications::mark_read_handler,
        notifications::mark_all_read_handler,
        activity::list_activity_handler,
        attendance::check_in_handler,
    ),
    components(
        schemas(
            auth::LoginRequest,
            auth::AuthResponse,
            auth::PageMessage,
            permissions::PermissionCheckResponse,
            documents::DocumentResponse,
            profile::ProfileResponse,
            profile::UpdateProfileRequest,
            profile::ChangePasswordRequest,
            notifications::NotificationResponse,
            notifications::MarkAllReadResponse,
            activity::ActivityResponse,
            attendance::CheckInRequest,
            attendance::CheckInResponse,
        )
    ),
    tags(
        (name = "CRM API", description = "Session, permission-gated documents, profile, notifications and attendance.")
    )
)]
pub struct ApiDoc;
