//! crates/crm_core/src/permissions.rs
//!
//! Resolves (role, module, action) triples to an allow/deny decision.
//!
//! Every path that cannot produce a definite `allowed = true` answers `false`:
//! a missing entry, an unauthenticated caller, an unknown action, duplicate
//! entries and store errors all deny.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::domain::{Action, Identity, PermissionEntry};
use crate::ports::DatabaseService;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PermissionError {
    #[error("Duplicate permission entry for role '{role}', module '{module}', action '{action}'")]
    DuplicateEntry {
        role: String,
        module: String,
        action: Action,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PermissionKey {
    role: String,
    module: String,
    action: Action,
}

/// A lookup table keyed by (role, module, action).
#[derive(Debug, Default)]
pub struct PermissionTable {
    entries: HashMap<PermissionKey, bool>,
}

impl PermissionTable {
    /// Builds the table, rejecting more than one entry for the same key.
    pub fn from_entries(
        entries: impl IntoIterator<Item = PermissionEntry>,
    ) -> Result<Self, PermissionError> {
        let mut table = HashMap::new();
        for entry in entries {
            let key = PermissionKey {
                role: entry.role,
                module: entry.module,
                action: entry.action,
            };
            if table.contains_key(&key) {
                return Err(PermissionError::DuplicateEntry {
                    role: key.role,
                    module: key.module,
                    action: key.action,
                });
            }
            table.insert(key, entry.allowed);
        }
        Ok(Self { entries: table })
    }

    pub fn is_allowed(&self, role: &str, module: &str, action: Action) -> bool {
        let key = PermissionKey {
            role: role.to_string(),
            module: module.to_string(),
            action,
        };
        self.entries.get(&key).copied().unwrap_or(false)
    }
}

/// Answers permission queries against the `role_permissions` store.
#[derive(Clone)]
pub struct PermissionResolver {
    db: Arc<dyn DatabaseService>,
}

impl PermissionResolver {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Returns whether the caller may perform `action` in `module`.
    ///
    /// An unauthenticated caller is denied without consulting the store.
    pub async fn is_allowed(&self, identity: Option<&Identity>, module: &str, action: Action) -> bool {
        let Some(identity) = identity else {
            return false;
        };
        let role = identity.user_role.as_str();

        let entries = match self.db.get_permissions(role, module).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(role, module, %action, "Permission lookup failed, denying: {}", e);
                return false;
            }
        };

        match PermissionTable::from_entries(entries) {
            Ok(table) => table.is_allowed(role, module, action),
            Err(e) => {
                warn!("Ambiguous permission data, denying: {}", e);
                false
            }
        }
    }

    /// Like `is_allowed`, but takes the action as a string. Unknown actions deny.
    pub async fn is_allowed_str(&self, identity: Option<&Identity>, module: &str, action: &str) -> bool {
        match action.parse::<Action>() {
            Ok(action) => self.is_allowed(identity, module, action).await,
            Err(e) => {
                warn!(module, "{}", e);
                false
            }
        }
    }
}
