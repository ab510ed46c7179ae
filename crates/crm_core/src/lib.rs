pub mod domain;
pub mod geo;
pub mod guard;
pub mod permissions;
pub mod ports;
pub mod recorder;
pub mod session;
pub mod testing;

pub use domain::{
    Action, ActivityRecord, AuthSession, CheckIn, Document, Identity, NewActivity, NewCheckIn,
    NewDocument, NewNotification, Notification, NotificationKind, Office, PermissionEntry,
    ProfileUpdate, RequestContext, UserCredentials,
};
pub use guard::{AccessGuard, Denial};
pub use permissions::{PermissionError, PermissionResolver, PermissionTable};
pub use ports::{AuditTrail, DatabaseService, PortError, PortResult};
pub use recorder::Recorder;
pub use session::{SessionPolicy, SessionStatus, SessionStore};
