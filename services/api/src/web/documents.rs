//! services/api/src/web/documents.rs
//!
//! Document upload, listing, download and deletion. Every handler is gated on
//! the `documents` module.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use crm_core::{Action, Document, NewDocument, NewNotification, NotificationKind, Recorder, RequestContext};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::adapters::files::{content_type_for, sanitize_file_name};
use crate::web::error::PageError;
use crate::web::state::AppState;

pub const MODULE: &str = "documents";

//=========================================================================================
// API Response Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct DocumentResponse {
    pub id: i64,
    pub title: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_by: i64,
    pub created_at: DateTime<Utc>,
}

impl From<Document> for DocumentResponse {
    fn from(d: Document) -> Self {
        Self {
            id: d.id,
            title: d.title,
            file_name: d.file_name,
            content_type: d.content_type,
            size_bytes: d.size_bytes,
            uploaded_by: d.uploaded_by,
            created_at: d.created_at,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /documents - List all documents
#[utoipa::path(
    get,
    path = "/documents",
    responses(
        (status = 200, description = "Documents, newest first", body = [DocumentResponse]),
        (status = 303, description = "Redirected to the login or forbidden page")
    )
)]
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, PageError> {
    state.require_permission(&ctx, MODULE, Action::View).await?;

    let documents = state
        .db
        .list_documents()
        .await
        .map_err(|e| PageError::from_port(e, "Failed to list documents"))?;

    Ok(Json(
        documents
            .into_iter()
            .map(DocumentResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// POST /documents - Upload a document
///
/// Accepts multipart/form-data with a `file` part and an optional `title` part.
#[utoipa::path(
    post,
    path = "/documents",
    request_body(content_type = "multipart/form-data", description = "A `file` part and an optional `title`."),
    responses(
        (status = 201, description = "Document stored", body = DocumentResponse),
        (status = 400, description = "Missing, empty or disallowed file"),
        (status = 413, description = "File too large"),
        (status = 303, description = "Redirected to the login or forbidden page")
    )
)]
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, PageError> {
    let identity = state.require_permission(&ctx, MODULE, Action::Create).await?;

    // 1. Read the form
    let mut title: Option<String> = None;
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PageError::bad_request(format!("Failed to read multipart data: {}", e)))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("title") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| PageError::bad_request(format!("Failed to read title: {}", e)))?;
                title = Some(text.trim().to_string()).filter(|t| !t.is_empty());
            }
            Some("file") => {
                let name = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| PageError::bad_request(format!("Failed to read file bytes: {}", e)))?;
                upload = Some((name, data.to_vec()));
            }
            _ => {}
        }
    }

    // 2. Validate
    let (file_name, bytes) =
        upload.ok_or_else(|| PageError::bad_request("Multipart form must include a file"))?;
    if bytes.is_empty() {
        return Err(PageError::bad_request("Uploaded file is empty"));
    }
    if bytes.len() > state.config.max_upload_bytes {
        return Err(PageError::Status(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("File exceeds the {} byte limit", state.config.max_upload_bytes),
        ));
    }
    let content_type = content_type_for(&file_name)
        .ok_or_else(|| PageError::bad_request(format!("File type of '{}' is not allowed", file_name)))?;
    let title = title.unwrap_or_else(|| file_name.clone());

    // 3. Store bytes, then metadata + audit trail in one transaction
    let stored_name = state
        .files
        .save(&file_name, &bytes)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to store file"))?;

    let new_document = NewDocument {
        title: title.clone(),
        file_name: sanitize_file_name(&file_name),
        stored_name: stored_name.clone(),
        content_type: content_type.to_string(),
        size_bytes: bytes.len() as i64,
        uploaded_by: identity.user_id,
    };
    let audit = Recorder::audit(&ctx, "Upload Document", Some(&format!("Uploaded '{}'", title)))
        .with_notification(NewNotification {
            user_id: identity.user_id,
            title: "Document uploaded".to_string(),
            message: format!("'{}' was uploaded successfully", title),
            kind: NotificationKind::Success,
            link: Some("/documents".to_string()),
        });

    let document = match state.db.create_document(&new_document, &audit).await {
        Ok(document) => document,
        Err(e) => {
            if let Err(cleanup) = state.files.remove(&stored_name).await {
                warn!("Failed to remove orphaned upload {}: {}", stored_name, cleanup);
            }
            return Err(PageError::from_port(e, "Failed to save document"));
        }
    };

    info!(user_id = identity.user_id, document_id = document.id, "Document uploaded");
    Ok((StatusCode::CREATED, Json(DocumentResponse::from(document))))
}

/// GET /documents/{id}/download - Download the stored file
#[utoipa::path(
    get,
    path = "/documents/{id}/download",
    params(("id" = i64, Path, description = "Document id")),
    responses(
        (status = 200, description = "File contents"),
        (status = 404, description = "Unknown document"),
        (status = 303, description = "Redirected to the login or forbidden page")
    )
)]
pub async fn download_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(document_id): Path<i64>,
) -> Result<impl IntoResponse, PageError> {
    state.require_permission(&ctx, MODULE, Action::View).await?;

    let document = state
        .db
        .get_document(document_id)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to load document"))?;
    let bytes = state
        .files
        .read(&document.stored_name)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to read file"))?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        sanitize_file_name(&document.file_name)
    );
    Ok((
        [
            (header::CONTENT_TYPE, document.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// DELETE /documents/{id} - Delete a document and its file
#[utoipa::path(
    delete,
    path = "/documents/{id}",
    params(("id" = i64, Path, description = "Document id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Unknown document"),
        (status = 303, description = "Redirected to the login or forbidden page")
    )
)]
pub async fn delete_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(document_id): Path<i64>,
) -> Result<impl IntoResponse, PageError> {
    let identity = state.require_permission(&ctx, MODULE, Action::Delete).await?;

    let existing = state
        .db
        .get_document(document_id)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to load document"))?;

    let mut audit = Recorder::audit(
        &ctx,
        "Delete Document",
        Some(&format!("Deleted '{}'", existing.title)),
    );
    if existing.uploaded_by != identity.user_id {
        audit = audit.with_notification(NewNotification {
            user_id: existing.uploaded_by,
            title: "Document deleted".to_string(),
            message: format!("'{}' was deleted by {}", existing.title, identity.user_name),
            kind: NotificationKind::Warning,
            link: None,
        });
    }

    let removed = state
        .db
        .delete_document(document_id, &audit)
        .await
        .map_err(|e| PageError::from_port(e, "Failed to delete document"))?;

    if let Err(e) = state.files.remove(&removed.stored_name).await {
        warn!("Failed to remove file {}: {}", removed.stored_name, e);
    }
    info!(user_id = identity.user_id, document_id, "Document deleted");
    Ok(StatusCode::NO_CONTENT)
}
