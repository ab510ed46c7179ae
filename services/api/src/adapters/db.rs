//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Every audited write runs in a single transaction together with its activity
//! record and notifications.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_core::domain::{
    Action, ActivityRecord, AuthSession, CheckIn, Document, Identity, NewActivity, NewCheckIn,
    NewDocument, NewNotification, Notification, NotificationKind, Office, PermissionEntry,
    ProfileUpdate, UserCredentials,
};
use crm_core::ports::{AuditTrail, DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(e: sqlx::Error, what: impl FnOnce() -> String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what()),
        _ => PortError::Unexpected(e.to_string()),
    }
}

/// Writes the activity record and notifications of `audit` inside `tx`.
async fn write_audit(tx: &mut Transaction<'_, Postgres>, audit: &AuditTrail) -> Result<(), sqlx::Error> {
    if let Some(activity) = &audit.activity {
        sqlx::query(
            "INSERT INTO activity_log (user_id, action, description, ip_address, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(activity.user_id)
        .bind(&activity.action)
        .bind(&activity.description)
        .bind(&activity.ip_address)
        .bind(activity.created_at)
        .execute(&mut **tx)
        .await?;
    }
    for notification in &audit.notifications {
        sqlx::query(
            "INSERT INTO notifications (user_id, title, message, kind, link) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.kind.as_str())
        .bind(&notification.link)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: i64,
    name: String,
    email: String,
    role: String,
    password_hash: String,
    is_active: bool,
}
impl UserRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            identity: Identity {
                user_id: self.id,
                user_name: self.name,
                user_role: self.role,
                user_email: self.email,
            },
            password_hash: self.password_hash,
            is_active: self.is_active,
        }
    }
}

#[derive(FromRow)]
struct AuthSessionRecord {
    id: String,
    user_id: i64,
    user_name: String,
    user_role: String,
    user_email: String,
    created_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}
impl AuthSessionRecord {
    fn to_domain(self) -> AuthSession {
        AuthSession {
            id: self.id,
            identity: Identity {
                user_id: self.user_id,
                user_name: self.user_name,
                user_role: self.user_role,
                user_email: self.user_email,
            },
            created_at: self.created_at,
            last_seen_at: self.last_seen_at,
            expires_at: self.expires_at,
        }
    }
}

#[derive(FromRow)]
struct RolePermissionRecord {
    role: String,
    module: String,
    can_view: bool,
    can_create: bool,
    can_edit: bool,
    can_delete: bool,
}
impl RolePermissionRecord {
    /// Expands the one-column-per-action row into one entry per action.
    fn to_domain(self) -> Vec<PermissionEntry> {
        Action::ALL
            .into_iter()
            .map(|action| PermissionEntry {
                role: self.role.clone(),
                module: self.module.clone(),
                action,
                allowed: match action {
                    Action::View => self.can_view,
                    Action::Create => self.can_create,
                    Action::Edit => self.can_edit,
                    Action::Delete => self.can_delete,
                },
            })
            .collect()
    }
}

#[derive(FromRow)]
struct ActivityRecordRow {
    id: i64,
    user_id: i64,
    action: String,
    description: Option<String>,
    ip_address: String,
    created_at: DateTime<Utc>,
}
impl ActivityRecordRow {
    fn to_domain(self) -> ActivityRecord {
        ActivityRecord {
            id: self.id,
            user_id: self.user_id,
            action: self.action,
            description: self.description,
            ip_address: self.ip_address,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct NotificationRecord {
    id: i64,
    user_id: i64,
    title: String,
    message: String,
    kind: String,
    link: Option<String>,
    is_read: bool,
    created_at: DateTime<Utc>,
}
impl NotificationRecord {
    fn to_domain(self) -> Notification {
        Notification {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            message: self.message,
            kind: NotificationKind::from_label(&self.kind),
            link: self.link,
            is_read: self.is_read,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct DocumentRecord {
    id: i64,
    title: String,
    file_name: String,
    stored_name: String,
    content_type: String,
    size_bytes: i64,
    uploaded_by: i64,
    created_at: DateTime<Utc>,
}
impl DocumentRecord {
    fn to_domain(self) -> Document {
        Document {
            id: self.id,
            title: self.title,
            file_name: self.file_name,
            stored_name: self.stored_name,
            content_type: self.content_type,
            size_bytes: self.size_bytes,
            uploaded_by: self.uploaded_by,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct OfficeRecord {
    id: i64,
    name: String,
    latitude: f64,
    longitude: f64,
    radius_meters: f64,
}
impl OfficeRecord {
    fn to_domain(self) -> Office {
        Office {
            id: self.id,
            name: self.name,
            latitude: self.latitude,
            longitude: self.longitude,
            radius_meters: self.radius_meters,
        }
    }
}

#[derive(FromRow)]
struct CheckInRecord {
    id: i64,
    user_id: i64,
    office_id: i64,
    latitude: f64,
    longitude: f64,
    distance_meters: f64,
    created_at: DateTime<Utc>,
}
impl CheckInRecord {
    fn to_domain(self) -> CheckIn {
        CheckIn {
            id: self.id,
            user_id: self.user_id,
            office_id: self.office_id,
            latitude: self.latitude,
            longitude: self.longitude,
            distance_meters: self.distance_meters,
            created_at: self.created_at,
        }
    }
}

const USER_COLUMNS: &str = "id, name, email, role, password_hash, is_active";
const DOCUMENT_COLUMNS: &str =
    "id, title, file_name, stored_name, content_type, size_bytes, uploaded_by, created_at";
const NOTIFICATION_COLUMNS: &str = "id, user_id, title, message, kind, link, is_read, created_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, || format!("User {} not found", email)))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: i64) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, || format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn update_profile(
        &self,
        user_id: i64,
        update: &ProfileUpdate,
        audit: &AuditTrail,
    ) -> PortResult<Identity> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET name = $1, email = $2 WHERE id = $3 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&update.user_name)
        .bind(&update.user_email)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db_err) if db_err.is_unique_violation() => {
                PortError::Conflict(format!("Email {} is already in use", update.user_email))
            }
            _ => not_found_or_unexpected(e, || format!("User {} not found", user_id)),
        })?;
        let identity = record.to_domain().identity;

        sqlx::query(
            "UPDATE auth_sessions SET user_name = $1, user_email = $2, user_role = $3 WHERE user_id = $4",
        )
        .bind(&identity.user_name)
        .bind(&identity.user_email)
        .bind(&identity.user_role)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        write_audit(&mut tx, audit).await.map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;
        Ok(identity)
    }

    async fn update_password_hash(
        &self,
        user_id: i64,
        password_hash: &str,
        audit: &AuditTrail,
    ) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        write_audit(&mut tx, audit).await.map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn create_auth_session(&self, session: &AuthSession) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO auth_sessions (id, user_id, user_name, user_role, user_email, created_at, last_seen_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&session.id)
        .bind(session.identity.user_id)
        .bind(&session.identity.user_name)
        .bind(&session.identity.user_role)
        .bind(&session.identity.user_email)
        .bind(session.created_at)
        .bind(session.last_seen_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_auth_session(&self, session_id: &str) -> PortResult<AuthSession> {
        let record = sqlx::query_as::<_, AuthSessionRecord>(
            "SELECT id, user_id, user_name, user_role, user_email, created_at, last_seen_at, expires_at \
             FROM auth_sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, || "Auth session not found".to_string()))?;
        Ok(record.to_domain())
    }

    async fn touch_auth_session(&self, session_id: &str, seen_at: DateTime<Utc>) -> PortResult<()> {
        sqlx::query("UPDATE auth_sessions SET last_seen_at = $1 WHERE id = $2")
            .bind(seen_at)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn get_permissions(&self, role: &str, module: &str) -> PortResult<Vec<PermissionEntry>> {
        let records = sqlx::query_as::<_, RolePermissionRecord>(
            "SELECT role, module, can_view, can_create, can_edit, can_delete \
             FROM role_permissions WHERE role = $1 AND module = $2",
        )
        .bind(role)
        .bind(module)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().flat_map(|r| r.to_domain()).collect())
    }

    async fn insert_activity(&self, activity: &NewActivity) -> PortResult<ActivityRecord> {
        let record = sqlx::query_as::<_, ActivityRecordRow>(
            "INSERT INTO activity_log (user_id, action, description, ip_address, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, user_id, action, description, ip_address, created_at",
        )
        .bind(activity.user_id)
        .bind(&activity.action)
        .bind(&activity.description)
        .bind(&activity.ip_address)
        .bind(activity.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_activity(&self, user_id: i64, limit: i64) -> PortResult<Vec<ActivityRecord>> {
        let records = sqlx::query_as::<_, ActivityRecordRow>(
            "SELECT id, user_id, action, description, ip_address, created_at \
             FROM activity_log WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn insert_notification(&self, notification: &NewNotification) -> PortResult<Notification> {
        let record = sqlx::query_as::<_, NotificationRecord>(&format!(
            "INSERT INTO notifications (user_id, title, message, kind, link) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.kind.as_str())
        .bind(&notification.link)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_notifications(&self, user_id: i64, unread_only: bool) -> PortResult<Vec<Notification>> {
        let records = sqlx::query_as::<_, NotificationRecord>(&format!(
            "SELECT {} FROM notifications WHERE user_id = $1 AND (NOT $2 OR is_read = FALSE) \
             ORDER BY created_at DESC, id DESC",
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn mark_notification_read(&self, user_id: i64, notification_id: i64) -> PortResult<()> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
            .bind(notification_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Notification {} not found", notification_id)));
        }
        Ok(())
    }

    async fn mark_all_notifications_read(&self, user_id: i64) -> PortResult<u64> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }

    async fn create_document(&self, document: &NewDocument, audit: &AuditTrail) -> PortResult<Document> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let record = sqlx::query_as::<_, DocumentRecord>(&format!(
            "INSERT INTO documents (title, file_name, stored_name, content_type, size_bytes, uploaded_by) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            DOCUMENT_COLUMNS
        ))
        .bind(&document.title)
        .bind(&document.file_name)
        .bind(&document.stored_name)
        .bind(&document.content_type)
        .bind(document.size_bytes)
        .bind(document.uploaded_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        write_audit(&mut tx, audit).await.map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_documents(&self) -> PortResult<Vec<Document>> {
        let records = sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {} FROM documents ORDER BY created_at DESC, id DESC",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_document(&self, document_id: i64) -> PortResult<Document> {
        let record = sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {} FROM documents WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(document_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, || format!("Document {} not found", document_id)))?;
        Ok(record.to_domain())
    }

    async fn delete_document(&self, document_id: i64, audit: &AuditTrail) -> PortResult<Document> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let record = sqlx::query_as::<_, DocumentRecord>(&format!(
            "DELETE FROM documents WHERE id = $1 RETURNING {}",
            DOCUMENT_COLUMNS
        ))
        .bind(document_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| not_found_or_unexpected(e, || format!("Document {} not found", document_id)))?;

        write_audit(&mut tx, audit).await.map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_office(&self, office_id: i64) -> PortResult<Office> {
        let record = sqlx::query_as::<_, OfficeRecord>(
            "SELECT id, name, latitude, longitude, radius_meters FROM offices WHERE id = $1",
        )
        .bind(office_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, || format!("Office {} not found", office_id)))?;
        Ok(record.to_domain())
    }

    async fn create_check_in(&self, check_in: &NewCheckIn, audit: &AuditTrail) -> PortResult<CheckIn> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let record = sqlx::query_as::<_, CheckInRecord>(
            "INSERT INTO check_ins (user_id, office_id, latitude, longitude, distance_meters) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, user_id, office_id, latitude, longitude, distance_meters, created_at",
        )
        .bind(check_in.user_id)
        .bind(check_in.office_id)
        .bind(check_in.latitude)
        .bind(check_in.longitude)
        .bind(check_in.distance_meters)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        write_audit(&mut tx, audit).await.map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }
}
