//! crates/crm_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete database implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    ActivityRecord, AuthSession, CheckIn, Document, Identity, NewActivity, NewCheckIn,
    NewDocument, NewNotification, Notification, Office, PermissionEntry, ProfileUpdate,
    UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, disk).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Audit Trail
//=========================================================================================

/// The side effects that must be committed together with a business write.
///
/// Adapters write the activity record and every notification inside the same
/// transaction as the write they accompany; if any part fails, nothing is kept.
#[derive(Debug, Clone, Default)]
pub struct AuditTrail {
    pub activity: Option<NewActivity>,
    pub notifications: Vec<NewNotification>,
}

impl AuditTrail {
    pub fn new(activity: Option<NewActivity>) -> Self {
        Self {
            activity,
            notifications: Vec::new(),
        }
    }

    pub fn with_notification(mut self, notification: NewNotification) -> Self {
        self.notifications.push(notification);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.activity.is_none() && self.notifications.is_empty()
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Users ---
    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user_by_id(&self, user_id: i64) -> PortResult<UserCredentials>;

    /// Updates name and email, refreshing the identity of every live session of the user.
    async fn update_profile(
        &self,
        user_id: i64,
        update: &ProfileUpdate,
        audit: &AuditTrail,
    ) -> PortResult<Identity>;

    async fn update_password_hash(
        &self,
        user_id: i64,
        password_hash: &str,
        audit: &AuditTrail,
    ) -> PortResult<()>;

    // --- Auth Sessions ---
    async fn create_auth_session(&self, session: &AuthSession) -> PortResult<()>;

    async fn get_auth_session(&self, session_id: &str) -> PortResult<AuthSession>;

    async fn touch_auth_session(&self, session_id: &str, seen_at: DateTime<Utc>) -> PortResult<()>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Permissions ---
    /// Returns every entry stored for the (role, module) pair; empty if none.
    async fn get_permissions(&self, role: &str, module: &str) -> PortResult<Vec<PermissionEntry>>;

    // --- Activity & Notifications ---
    async fn insert_activity(&self, activity: &NewActivity) -> PortResult<ActivityRecord>;

    async fn list_activity(&self, user_id: i64, limit: i64) -> PortResult<Vec<ActivityRecord>>;

    async fn insert_notification(&self, notification: &NewNotification) -> PortResult<Notification>;

    async fn list_notifications(&self, user_id: i64, unread_only: bool) -> PortResult<Vec<Notification>>;

    /// Marks one of the user's own notifications as read.
    async fn mark_notification_read(&self, user_id: i64, notification_id: i64) -> PortResult<()>;

    /// Returns the number of notifications that changed state.
    async fn mark_all_notifications_read(&self, user_id: i64) -> PortResult<u64>;

    // --- Documents ---
    async fn create_document(&self, document: &NewDocument, audit: &AuditTrail) -> PortResult<Document>;

    async fn list_documents(&self) -> PortResult<Vec<Document>>;

    async fn get_document(&self, document_id: i64) -> PortResult<Document>;

    async fn delete_document(&self, document_id: i64, audit: &AuditTrail) -> PortResult<Document>;

    // --- Attendance ---
    async fn get_office(&self, office_id: i64) -> PortResult<Office>;

    async fn create_check_in(&self, check_in: &NewCheckIn, audit: &AuditTrail) -> PortResult<CheckIn>;
}
