//! crates/crm_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or HTTP framework.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

//=========================================================================================
// Identity & Sessions
//=========================================================================================

/// The authenticated identity carried by a browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: i64,
    pub user_name: String,
    /// Free-form role label, e.g. "admin" or "sales_rep".
    pub user_role: String,
    pub user_email: String,
}

// Only used internally for login and password changes - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub identity: Identity,
    pub password_hash: String,
    pub is_active: bool,
}

/// A persisted browser login session, addressed by the cookie token in `id`.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub identity: Identity,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Everything a controller knows about the caller, built once per request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub identity: Option<Identity>,
    pub session_token: Option<String>,
    pub client_ip: String,
}

impl RequestContext {
    pub fn anonymous(client_ip: impl Into<String>) -> Self {
        Self {
            identity: None,
            session_token: None,
            client_ip: client_ip.into(),
        }
    }

    pub fn authenticated(identity: Identity, client_ip: impl Into<String>) -> Self {
        Self {
            identity: Some(identity),
            session_token: None,
            client_ip: client_ip.into(),
        }
    }
}

//=========================================================================================
// Permissions
//=========================================================================================

/// The fixed set of operation classes a permission can grant within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[default]
    View,
    Create,
    Edit,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::View, Action::Create, Action::Edit, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name one of the known actions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown permission action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(Action::View),
            "create" => Ok(Action::Create),
            "edit" => Ok(Action::Edit),
            "delete" => Ok(Action::Delete),
            _ => Err(UnknownAction(s.to_string())),
        }
    }
}

/// A single (role, module, action) grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionEntry {
    pub role: String,
    pub module: String,
    pub action: Action,
    pub allowed: bool,
}

//=========================================================================================
// Activity & Notifications
//=========================================================================================

/// An append-only audit entry describing a user-initiated change.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRecord {
    pub id: i64,
    pub user_id: i64,
    pub action: String,
    pub description: Option<String>,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
}

/// An activity record that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActivity {
    pub user_id: i64,
    pub action: String,
    pub description: Option<String>,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "success",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
        }
    }

    /// Unknown labels read back from storage degrade to `Info`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "success" => NotificationKind::Success,
            "warning" => NotificationKind::Warning,
            "error" => NotificationKind::Error,
            _ => NotificationKind::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: i64,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub link: Option<String>,
}

//=========================================================================================
// Documents, Profiles & Attendance
//=========================================================================================

/// Metadata for an uploaded file. The bytes live on disk under `stored_name`.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub file_name: String,
    pub stored_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_by: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub file_name: String,
    pub stored_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_by: i64,
}

#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub user_name: String,
    pub user_email: String,
}

/// An office location with the radius inside which check-ins are accepted.
#[derive(Debug, Clone, Serialize)]
pub struct Office {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckIn {
    pub id: i64,
    pub user_id: i64,
    pub office_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_meters: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCheckIn {
    pub user_id: i64,
    pub office_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_meters: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parses_case_insensitively() {
        assert_eq!("VIEW".parse::<Action>(), Ok(Action::View));
        assert_eq!(" edit ".parse::<Action>(), Ok(Action::Edit));
        assert!("approve".parse::<Action>().is_err());
    }

    #[test]
    fn action_defaults_to_view() {
        assert_eq!(Action::default(), Action::View);
    }

    #[test]
    fn unknown_notification_label_degrades_to_info() {
        assert_eq!(NotificationKind::from_label("warning"), NotificationKind::Warning);
        assert_eq!(NotificationKind::from_label("bogus"), NotificationKind::Info);
    }
}
