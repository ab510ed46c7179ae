//! crates/crm_core/src/guard.rs
//!
//! The access guard: an authentication gate followed by an authorization gate.
//! The second gate is only evaluated once the first has passed.

use tracing::{debug, warn};

use crate::domain::{Action, Identity, RequestContext};
use crate::permissions::PermissionResolver;

/// Why a request was stopped at a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// No session; the caller is sent to the login page.
    Unauthenticated,
    /// Logged in but lacking the permission; the caller is sent to the forbidden page.
    Forbidden,
}

#[derive(Clone)]
pub struct AccessGuard {
    resolver: PermissionResolver,
}

impl AccessGuard {
    pub fn new(resolver: PermissionResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// Gate 1 only.
    pub fn require_login<'a>(&self, ctx: &'a RequestContext) -> Result<&'a Identity, Denial> {
        match ctx.identity.as_ref() {
            Some(identity) => Ok(identity),
            None => {
                debug!(client_ip = %ctx.client_ip, "Rejecting unauthenticated request");
                Err(Denial::Unauthenticated)
            }
        }
    }

    /// Gate 1, then gate 2.
    pub async fn require_permission<'a>(
        &self,
        ctx: &'a RequestContext,
        module: &str,
        action: Action,
    ) -> Result<&'a Identity, Denial> {
        let identity = self.require_login(ctx)?;
        if self.resolver.is_allowed(Some(identity), module, action).await {
            Ok(identity)
        } else {
            warn!(
                user_id = identity.user_id,
                role = %identity.user_role,
                module,
                %action,
                "Access denied"
            );
            Err(Denial::Forbidden)
        }
    }
}
