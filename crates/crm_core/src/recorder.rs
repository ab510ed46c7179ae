//! crates/crm_core/src/recorder.rs
//!
//! Writes activity records and in-app notifications on behalf of controllers.

use chrono::Utc;
use std::sync::Arc;

use crate::domain::{
    ActivityRecord, NewActivity, NewNotification, Notification, NotificationKind, RequestContext,
};
use crate::ports::{AuditTrail, DatabaseService, PortResult};

#[derive(Clone)]
pub struct Recorder {
    db: Arc<dyn DatabaseService>,
}

impl Recorder {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Builds the activity record for the caller, or `None` when nobody is logged in.
    pub fn activity(
        ctx: &RequestContext,
        action: &str,
        description: Option<&str>,
    ) -> Option<NewActivity> {
        let identity = ctx.identity.as_ref()?;
        Some(NewActivity {
            user_id: identity.user_id,
            action: action.to_string(),
            description: description.map(str::to_string),
            ip_address: ctx.client_ip.clone(),
            created_at: Utc::now(),
        })
    }

    /// Starts an audit trail for an audited business write.
    pub fn audit(ctx: &RequestContext, action: &str, description: Option<&str>) -> AuditTrail {
        AuditTrail::new(Self::activity(ctx, action, description))
    }

    /// Appends an activity record for the caller.
    ///
    /// Returns `Ok(None)` without writing anything when the context has no identity.
    pub async fn record_activity(
        &self,
        ctx: &RequestContext,
        action: &str,
        description: Option<&str>,
    ) -> PortResult<Option<ActivityRecord>> {
        match Self::activity(ctx, action, description) {
            Some(activity) => self.db.insert_activity(&activity).await.map(Some),
            None => Ok(None),
        }
    }

    /// Raises an in-app notification for `user_id`.
    pub async fn notify(
        &self,
        user_id: i64,
        title: &str,
        message: &str,
        kind: NotificationKind,
        link: Option<&str>,
    ) -> PortResult<Notification> {
        let notification = NewNotification {
            user_id,
            title: title.to_string(),
            message: message.to_string(),
            kind,
            link: link.map(str::to_string),
        };
        self.db.insert_notification(&notification).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryDatabase;

    #[tokio::test]
    async fn login_activity_is_recorded_for_the_session_user() {
        let db = Arc::new(InMemoryDatabase::new());
        let user = db.add_user_with_id(42, "Kim", "kim@example.com", "sales_rep");
        let recorder = Recorder::new(db.clone());
        let ctx = RequestContext::authenticated(user, "203.0.113.9");

        let record = recorder
            .record_activity(&ctx, "Login", Some("User logged in"))
            .await
            .unwrap()
            .expect("a record for an authenticated caller");

        assert_eq!(record.user_id, 42);
        assert_eq!(record.action, "Login");
        assert_eq!(record.description.as_deref(), Some("User logged in"));
        assert_eq!(record.ip_address, "203.0.113.9");
        assert_eq!(db.activity().len(), 1);
    }

    #[tokio::test]
    async fn anonymous_activity_is_skipped_silently() {
        let db = Arc::new(InMemoryDatabase::new());
        let recorder = Recorder::new(db.clone());
        let ctx = RequestContext::anonymous("203.0.113.9");

        let outcome = recorder.record_activity(&ctx, "Login", None).await.unwrap();

        assert!(outcome.is_none());
        assert!(db.activity().is_empty());
    }

    #[tokio::test]
    async fn activity_write_failure_is_reported_to_the_caller() {
        let db = Arc::new(InMemoryDatabase::new());
        let user = db.add_user("Kim", "kim@example.com", "sales_rep", "");
        db.fail_activity_writes(true);
        let recorder = Recorder::new(db.clone());
        let ctx = RequestContext::authenticated(user, "203.0.113.9");

        assert!(recorder.record_activity(&ctx, "Login", None).await.is_err());
    }

    #[tokio::test]
    async fn notify_stores_an_unread_notification() {
        let db = Arc::new(InMemoryDatabase::new());
        let recorder = Recorder::new(db.clone());

        let notification = recorder
            .notify(5, "Welcome", "Your account is ready", NotificationKind::default(), None)
            .await
            .unwrap();

        assert_eq!(notification.user_id, 5);
        assert_eq!(notification.kind, NotificationKind::Info);
        assert!(!notification.is_read);
        assert_eq!(db.notifications().len(), 1);
    }
}
