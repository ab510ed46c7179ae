//! crates/crm_core/src/testing.rs
//!
//! An in-memory `DatabaseService` for unit and router tests.
//!
//! Audited writes follow the same all-or-nothing contract as the Postgres
//! adapter: when `fail_audit_writes` is set, the business write is discarded
//! along with its audit trail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::domain::{
    Action, ActivityRecord, AuthSession, CheckIn, Document, Identity, NewActivity, NewCheckIn,
    NewDocument, NewNotification, Notification, Office, PermissionEntry, ProfileUpdate,
    UserCredentials,
};
use crate::ports::{AuditTrail, DatabaseService, PortError, PortResult};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: HashMap<i64, UserCredentials>,
    sessions: HashMap<String, AuthSession>,
    permissions: Vec<PermissionEntry>,
    activity: Vec<ActivityRecord>,
    notifications: Vec<Notification>,
    documents: Vec<Document>,
    offices: HashMap<i64, Office>,
    check_ins: Vec<CheckIn>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn push_activity(&mut self, activity: &NewActivity) -> ActivityRecord {
        let record = ActivityRecord {
            id: self.next_id(),
            user_id: activity.user_id,
            action: activity.action.clone(),
            description: activity.description.clone(),
            ip_address: activity.ip_address.clone(),
            created_at: activity.created_at,
        };
        self.activity.push(record.clone());
        record
    }

    fn push_notification(&mut self, notification: &NewNotification) -> Notification {
        let record = Notification {
            id: self.next_id(),
            user_id: notification.user_id,
            title: notification.title.clone(),
            message: notification.message.clone(),
            kind: notification.kind,
            link: notification.link.clone(),
            is_read: false,
            created_at: Utc::now(),
        };
        self.notifications.push(record.clone());
        record
    }

    fn apply_audit(&mut self, audit: &AuditTrail) {
        if let Some(activity) = &audit.activity {
            self.push_activity(activity);
        }
        for notification in &audit.notifications {
            self.push_notification(notification);
        }
    }
}

/// A `DatabaseService` backed by plain collections behind a mutex.
#[derive(Default)]
pub struct InMemoryDatabase {
    tables: Mutex<Tables>,
    permission_lookups: AtomicUsize,
    fail_permission_lookups: AtomicBool,
    fail_activity_writes: AtomicBool,
    fail_audit_writes: AtomicBool,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // A poisoned lock only means another test thread panicked mid-write.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- Seeding ---

    pub fn add_user(&self, name: &str, email: &str, role: &str, password_hash: &str) -> Identity {
        let mut tables = self.tables();
        let identity = Identity {
            user_id: tables.next_id(),
            user_name: name.to_string(),
            user_role: role.to_string(),
            user_email: email.to_string(),
        };
        self.insert_user(&mut tables, identity.clone(), password_hash, true);
        identity
    }

    /// Seeds a user with a caller-chosen id.
    pub fn add_user_with_id(&self, user_id: i64, name: &str, email: &str, role: &str) -> Identity {
        let mut tables = self.tables();
        let identity = Identity {
            user_id,
            user_name: name.to_string(),
            user_role: role.to_string(),
            user_email: email.to_string(),
        };
        tables.next_id = tables.next_id.max(user_id);
        self.insert_user(&mut tables, identity.clone(), "", true);
        identity
    }

    fn insert_user(&self, tables: &mut Tables, identity: Identity, hash: &str, is_active: bool) {
        tables.users.insert(
            identity.user_id,
            UserCredentials {
                identity,
                password_hash: hash.to_string(),
                is_active,
            },
        );
    }

    pub fn deactivate_user(&self, user_id: i64) {
        if let Some(user) = self.tables().users.get_mut(&user_id) {
            user.is_active = false;
        }
    }

    pub fn grant(&self, role: &str, module: &str, action: Action, allowed: bool) {
        self.tables().permissions.push(PermissionEntry {
            role: role.to_string(),
            module: module.to_string(),
            action,
            allowed,
        });
    }

    pub fn add_office(&self, name: &str, latitude: f64, longitude: f64, radius_meters: f64) -> Office {
        let mut tables = self.tables();
        let office = Office {
            id: tables.next_id(),
            name: name.to_string(),
            latitude,
            longitude,
            radius_meters,
        };
        tables.offices.insert(office.id, office.clone());
        office
    }

    /// Overwrites `last_seen_at` of a stored session, for expiry tests.
    pub fn set_session_last_seen(&self, session_id: &str, last_seen_at: DateTime<Utc>) {
        if let Some(session) = self.tables().sessions.get_mut(session_id) {
            session.last_seen_at = last_seen_at;
        }
    }

    // --- Fault injection ---

    pub fn fail_permission_lookups(&self, fail: bool) {
        self.fail_permission_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_activity_writes(&self, fail: bool) {
        self.fail_activity_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit_writes.store(fail, Ordering::SeqCst);
    }

    // --- Inspection ---

    pub fn permission_lookups(&self) -> usize {
        self.permission_lookups.load(Ordering::SeqCst)
    }

    pub fn activity(&self) -> Vec<ActivityRecord> {
        self.tables().activity.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.tables().notifications.clone()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.tables().documents.clone()
    }

    pub fn session_count(&self) -> usize {
        self.tables().sessions.len()
    }

    pub fn password_hash(&self, user_id: i64) -> Option<String> {
        self.tables().users.get(&user_id).map(|u| u.password_hash.clone())
    }

    fn check_audit(&self, audit: &AuditTrail) -> PortResult<()> {
        if !audit.is_empty() && self.fail_audit_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("audit write failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.tables()
            .users
            .values()
            .find(|u| u.identity.user_email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn get_user_by_id(&self, user_id: i64) -> PortResult<UserCredentials> {
        self.tables()
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn update_profile(
        &self,
        user_id: i64,
        update: &ProfileUpdate,
        audit: &AuditTrail,
    ) -> PortResult<Identity> {
        self.check_audit(audit)?;
        let mut tables = self.tables();
        let taken = tables.users.values().any(|u| {
            u.identity.user_id != user_id && u.identity.user_email.eq_ignore_ascii_case(&update.user_email)
        });
        if taken {
            return Err(PortError::Conflict(format!("Email {} is already in use", update.user_email)));
        }
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        user.identity.user_name = update.user_name.clone();
        user.identity.user_email = update.user_email.clone();
        let identity = user.identity.clone();
        for session in tables.sessions.values_mut() {
            if session.identity.user_id == user_id {
                session.identity = identity.clone();
            }
        }
        tables.apply_audit(audit);
        Ok(identity)
    }

    async fn update_password_hash(
        &self,
        user_id: i64,
        password_hash: &str,
        audit: &AuditTrail,
    ) -> PortResult<()> {
        self.check_audit(audit)?;
        let mut tables = self.tables();
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        user.password_hash = password_hash.to_string();
        tables.apply_audit(audit);
        Ok(())
    }

    async fn create_auth_session(&self, session: &AuthSession) -> PortResult<()> {
        self.tables().sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_auth_session(&self, session_id: &str) -> PortResult<AuthSession> {
        self.tables()
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Auth session not found".to_string()))
    }

    async fn touch_auth_session(&self, session_id: &str, seen_at: DateTime<Utc>) -> PortResult<()> {
        if let Some(session) = self.tables().sessions.get_mut(session_id) {
            session.last_seen_at = seen_at;
        }
        Ok(())
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.tables().sessions.remove(session_id);
        Ok(())
    }

    async fn get_permissions(&self, role: &str, module: &str) -> PortResult<Vec<PermissionEntry>> {
        self.permission_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_permission_lookups.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("permission lookup failed".to_string()));
        }
        Ok(self
            .tables()
            .permissions
            .iter()
            .filter(|p| p.role == role && p.module == module)
            .cloned()
            .collect())
    }

    async fn insert_activity(&self, activity: &NewActivity) -> PortResult<ActivityRecord> {
        if self.fail_activity_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("activity write failed".to_string()));
        }
        Ok(self.tables().push_activity(activity))
    }

    async fn list_activity(&self, user_id: i64, limit: i64) -> PortResult<Vec<ActivityRecord>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .tables()
            .activity
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_notification(&self, notification: &NewNotification) -> PortResult<Notification> {
        Ok(self.tables().push_notification(notification))
    }

    async fn list_notifications(&self, user_id: i64, unread_only: bool) -> PortResult<Vec<Notification>> {
        Ok(self
            .tables()
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, user_id: i64, notification_id: i64) -> PortResult<()> {
        let mut tables = self.tables();
        let notification = tables
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("Notification {} not found", notification_id)))?;
        notification.is_read = true;
        Ok(())
    }

    async fn mark_all_notifications_read(&self, user_id: i64) -> PortResult<u64> {
        let mut changed = 0;
        for n in self.tables().notifications.iter_mut() {
            if n.user_id == user_id && !n.is_read {
                n.is_read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn create_document(&self, document: &NewDocument, audit: &AuditTrail) -> PortResult<Document> {
        self.check_audit(audit)?;
        let mut tables = self.tables();
        let record = Document {
            id: tables.next_id(),
            title: document.title.clone(),
            file_name: document.file_name.clone(),
            stored_name: document.stored_name.clone(),
            content_type: document.content_type.clone(),
            size_bytes: document.size_bytes,
            uploaded_by: document.uploaded_by,
            created_at: Utc::now(),
        };
        tables.documents.push(record.clone());
        tables.apply_audit(audit);
        Ok(record)
    }

    async fn list_documents(&self) -> PortResult<Vec<Document>> {
        Ok(self.tables().documents.iter().rev().cloned().collect())
    }

    async fn get_document(&self, document_id: i64) -> PortResult<Document> {
        self.tables()
            .documents
            .iter()
            .find(|d| d.id == document_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Document {} not found", document_id)))
    }

    async fn delete_document(&self, document_id: i64, audit: &AuditTrail) -> PortResult<Document> {
        self.check_audit(audit)?;
        let mut tables = self.tables();
        let position = tables
            .documents
            .iter()
            .position(|d| d.id == document_id)
            .ok_or_else(|| PortError::NotFound(format!("Document {} not found", document_id)))?;
        let removed = tables.documents.remove(position);
        tables.apply_audit(audit);
        Ok(removed)
    }

    async fn get_office(&self, office_id: i64) -> PortResult<Office> {
        self.tables()
            .offices
            .get(&office_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Office {} not found", office_id)))
    }

    async fn create_check_in(&self, check_in: &NewCheckIn, audit: &AuditTrail) -> PortResult<CheckIn> {
        self.check_audit(audit)?;
        let mut tables = self.tables();
        let record = CheckIn {
            id: tables.next_id(),
            user_id: check_in.user_id,
            office_id: check_in.office_id,
            latitude: check_in.latitude,
            longitude: check_in.longitude,
            distance_meters: check_in.distance_meters,
            created_at: Utc::now(),
        };
        tables.check_ins.push(record.clone());
        tables.apply_audit(audit);
        Ok(record)
    }
}
