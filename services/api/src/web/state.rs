//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every handler.

use crate::adapters::files::FileStore;
use crate::config::Config;
use crate::web::error::PageError;
use chrono::Duration;
use crm_core::{
    AccessGuard, Action, DatabaseService, Denial, Identity, PermissionResolver, Recorder,
    RequestContext, SessionPolicy, SessionStore,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub files: FileStore,
    pub sessions: SessionStore,
    pub guard: AccessGuard,
    pub recorder: Recorder,
}

impl AppState {
    /// Wires the core components around one database port.
    pub fn new(db: Arc<dyn DatabaseService>, config: Arc<Config>) -> Self {
        let policy = SessionPolicy {
            idle_timeout: Duration::seconds(config.session_idle_timeout_secs),
            max_lifetime: Duration::seconds(config.session_max_lifetime_secs),
        };
        Self {
            files: FileStore::new(config.upload_dir.clone()),
            sessions: SessionStore::new(db.clone(), policy),
            guard: AccessGuard::new(PermissionResolver::new(db.clone())),
            recorder: Recorder::new(db.clone()),
            db,
            config,
        }
    }

    fn redirect_for(&self, denial: Denial) -> PageError {
        match denial {
            Denial::Unauthenticated => PageError::Redirect(self.config.login_path.clone()),
            Denial::Forbidden => PageError::Redirect(self.config.forbidden_path.clone()),
        }
    }

    /// Call at the top of a handler; redirects to the login page on failure.
    pub fn require_login<'a>(&self, ctx: &'a RequestContext) -> Result<&'a Identity, PageError> {
        self.guard.require_login(ctx).map_err(|d| self.redirect_for(d))
    }

    /// Call at the top of a handler; redirects to the login or forbidden page on failure.
    pub async fn require_permission<'a>(
        &self,
        ctx: &'a RequestContext,
        module: &str,
        action: Action,
    ) -> Result<&'a Identity, PageError> {
        self.guard
            .require_permission(ctx, module, action)
            .await
            .map_err(|d| self.redirect_for(d))
    }
}
