use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use crm_api_lib::{
    config::Config,
    web::{app_router, auth::hash_password, state::AppState},
};
use crm_core::{testing::InMemoryDatabase, Action, Identity};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;
use tracing::Level;

const CLIENT_IP: &str = "198.51.100.7";
const PASSWORD: &str = "password123";
const BOUNDARY: &str = "crm-test-boundary";

struct TestApp {
    app: Router,
    db: Arc<InMemoryDatabase>,
    upload_dir: PathBuf,
}

impl TestApp {
    fn new() -> Self {
        let db = Arc::new(InMemoryDatabase::new());
        let upload_dir =
            std::env::temp_dir().join(format!("crm-api-test-{}", uuid::Uuid::new_v4()));
        let config = Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            database_url: String::new(),
            db_max_connections: 1,
            log_level: Level::INFO,
            upload_dir: upload_dir.clone(),
            max_upload_bytes: 1024 * 1024,
            session_idle_timeout_secs: 1800,
            session_max_lifetime_secs: 3600,
            login_path: "/login".to_string(),
            forbidden_path: "/forbidden".to_string(),
            cookie_secure: false,
            cors_origin: "http://localhost:3000".to_string(),
        };
        let state = Arc::new(AppState::new(db.clone(), Arc::new(config)));
        Self {
            app: app_router(state),
            db,
            upload_dir,
        }
    }

    fn add_user(&self, name: &str, email: &str, role: &str) -> Identity {
        let hash = hash_password(PASSWORD).unwrap();
        self.db.add_user(name, email, role, &hash)
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Logs in and returns the `session=...` cookie pair.
    async fn login(&self, email: &str) -> String {
        let response = self
            .send(json_request(
                "POST",
                "/auth/login",
                None,
                json!({ "email": email, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }
}

fn request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", CLIENT_IP);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", CLIENT_IP)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn upload_request(cookie: &str, title: &str, file_name: &str, contents: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n{title}\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
         Content-Type: text/plain\r\n\r\n{contents}\r\n--{b}--\r\n",
        b = BOUNDARY,
    );
    Request::builder()
        .method("POST")
        .uri("/documents")
        .header("x-forwarded-for", CLIENT_IP)
        .header(header::COOKIE, cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn anonymous_request_redirects_to_login_without_permission_lookup() {
    let t = TestApp::new();
    t.db.grant("sales_rep", "documents", Action::View, true);

    let response = t.send(request("GET", "/documents", None)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    assert_eq!(t.db.permission_lookups(), 0);
}

#[tokio::test]
async fn landing_pages_are_public() {
    let t = TestApp::new();

    let login = t.send(request("GET", "/login", None)).await;
    assert_eq!(login.status(), StatusCode::OK);

    let forbidden = t.send(request("GET", "/forbidden", None)).await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let t = TestApp::new();
    t.add_user("Ana", "ana@example.com", "sales_rep");

    let response = t
        .send(json_request(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "ana@example.com", "password": "not-the-password" }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(t.db.session_count(), 0);
    assert!(t.db.activity().is_empty());
}

#[tokio::test]
async fn disabled_account_cannot_log_in() {
    let t = TestApp::new();
    let user = t.add_user("Ana", "ana@example.com", "sales_rep");
    t.db.deactivate_user(user.user_id);

    let response = t
        .send(json_request(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "ana@example.com", "password": PASSWORD }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(t.db.session_count(), 0);
}

#[tokio::test]
async fn login_establishes_session_and_records_activity() {
    let t = TestApp::new();
    let user = t.add_user("Ana", "ana@example.com", "sales_rep");

    let cookie = t.login("ana@example.com").await;
    let me = t.send(request("GET", "/auth/me", Some(&cookie))).await;

    assert_eq!(me.status(), StatusCode::OK);
    let body = body_json(me).await;
    assert_eq!(body["user_id"], user.user_id);
    assert_eq!(body["role"], "sales_rep");

    let activity = t.db.activity();
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].user_id, user.user_id);
    assert_eq!(activity[0].action, "Login");
    assert_eq!(activity[0].ip_address, CLIENT_IP);
}

#[tokio::test]
async fn sales_rep_can_list_but_not_upload_documents() {
    let t = TestApp::new();
    t.add_user("Ana", "ana@example.com", "sales_rep");
    t.db.grant("sales_rep", "documents", Action::View, true);
    t.db.grant("sales_rep", "documents", Action::Create, false);
    let cookie = t.login("ana@example.com").await;

    let list = t.send(request("GET", "/documents", Some(&cookie))).await;
    assert_eq!(list.status(), StatusCode::OK);
    assert_eq!(body_json(list).await, json!([]));

    let upload = t
        .send(upload_request(&cookie, "Quote", "quote.txt", "hello"))
        .await;
    assert_eq!(upload.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&upload), "/forbidden");
    assert!(t.db.documents().is_empty());
}

#[tokio::test]
async fn missing_permission_row_redirects_to_forbidden() {
    let t = TestApp::new();
    t.add_user("Root", "root@example.com", "admin");
    t.db.grant("admin", "documents", Action::View, true);
    let cookie = t.login("root@example.com").await;

    let response = t.send(request("GET", "/activity", Some(&cookie))).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/forbidden");
}

#[tokio::test]
async fn logout_clears_the_session() {
    let t = TestApp::new();
    t.add_user("Ana", "ana@example.com", "sales_rep");
    let cookie = t.login("ana@example.com").await;

    let logout = t.send(request("POST", "/auth/logout", Some(&cookie))).await;
    assert_eq!(logout.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&logout), "/login");
    let cleared = logout
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let me = t.send(request("GET", "/auth/me", Some(&cookie))).await;
    assert_eq!(me.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&me), "/login");
    assert_eq!(t.db.session_count(), 0);

    let actions: Vec<String> = t.db.activity().into_iter().map(|a| a.action).collect();
    assert_eq!(actions, vec!["Login".to_string(), "Logout".to_string()]);
}

#[tokio::test]
async fn upload_is_stored_audited_and_downloadable() {
    let t = TestApp::new();
    let user = t.add_user("Ana", "ana@example.com", "manager");
    t.db.grant("manager", "documents", Action::View, true);
    t.db.grant("manager", "documents", Action::Create, true);
    let cookie = t.login("ana@example.com").await;

    let upload = t
        .send(upload_request(&cookie, "Q3 Quote", "quote.txt", "hello crm"))
        .await;
    assert_eq!(upload.status(), StatusCode::CREATED);
    let created = body_json(upload).await;
    assert_eq!(created["title"], "Q3 Quote");
    assert_eq!(created["uploaded_by"], user.user_id);

    assert_eq!(t.db.documents().len(), 1);
    assert!(t
        .db
        .activity()
        .iter()
        .any(|a| a.action == "Upload Document" && a.ip_address == CLIENT_IP));
    let notifications = t.db.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, user.user_id);

    let id = created["id"].as_i64().unwrap();
    let download = t
        .send(request("GET", &format!("/documents/{}/download", id), Some(&cookie)))
        .await;
    assert_eq!(download.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(download.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"hello crm");

    let _ = tokio::fs::remove_dir_all(&t.upload_dir).await;
}

#[tokio::test]
async fn failed_audit_write_rolls_back_the_upload() {
    let t = TestApp::new();
    t.add_user("Ana", "ana@example.com", "manager");
    t.db.grant("manager", "documents", Action::Create, true);
    let cookie = t.login("ana@example.com").await;
    t.db.fail_audit_writes(true);

    let upload = t
        .send(upload_request(&cookie, "Quote", "quote.txt", "hello"))
        .await;

    assert_eq!(upload.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(t.db.documents().is_empty());
    assert!(t.db.notifications().is_empty());
    let leftover = std::fs::read_dir(&t.upload_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);

    let _ = tokio::fs::remove_dir_all(&t.upload_dir).await;
}

#[tokio::test]
async fn disallowed_file_type_is_rejected() {
    let t = TestApp::new();
    t.add_user("Ana", "ana@example.com", "manager");
    t.db.grant("manager", "documents", Action::Create, true);
    let cookie = t.login("ana@example.com").await;

    let upload = t
        .send(upload_request(&cookie, "Tool", "tool.exe", "MZ"))
        .await;

    assert_eq!(upload.status(), StatusCode::BAD_REQUEST);
    assert!(t.db.documents().is_empty());
}

#[tokio::test]
async fn check_in_honours_the_office_geofence() {
    let t = TestApp::new();
    t.add_user("Ana", "ana@example.com", "sales_rep");
    t.db.grant("sales_rep", "attendance", Action::Create, true);
    let office = t.db.add_office("HQ", 51.5007, -0.1246, 200.0);
    let cookie = t.login("ana@example.com").await;

    let inside = t
        .send(json_request(
            "POST",
            "/attendance/check-in",
            Some(&cookie),
            json!({ "office_id": office.id, "latitude": 51.5010, "longitude": -0.1250 }),
        ))
        .await;
    assert_eq!(inside.status(), StatusCode::CREATED);
    assert!(t.db.activity().iter().any(|a| a.action == "Check In"));

    let outside = t
        .send(json_request(
            "POST",
            "/attendance/check-in",
            Some(&cookie),
            json!({ "office_id": office.id, "latitude": 51.5100, "longitude": -0.1246 }),
        ))
        .await;
    assert_eq!(outside.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(t
        .db
        .notifications()
        .iter()
        .any(|n| n.title == "Check-in rejected"));
}

#[tokio::test]
async fn profile_update_is_visible_to_the_live_session() {
    let t = TestApp::new();
    t.add_user("Ana", "ana@example.com", "sales_rep");
    t.add_user("Ben", "ben@example.com", "sales_rep");
    let cookie = t.login("ana@example.com").await;

    let taken = t
        .send(json_request(
            "PUT",
            "/profile",
            Some(&cookie),
            json!({ "name": "Ana", "email": "ben@example.com" }),
        ))
        .await;
    assert_eq!(taken.status(), StatusCode::CONFLICT);

    let updated = t
        .send(json_request(
            "PUT",
            "/profile",
            Some(&cookie),
            json!({ "name": "Ana Lima", "email": "ana.lima@example.com" }),
        ))
        .await;
    assert_eq!(updated.status(), StatusCode::OK);

    let me = body_json(t.send(request("GET", "/auth/me", Some(&cookie))).await).await;
    assert_eq!(me["name"], "Ana Lima");
    assert_eq!(me["email"], "ana.lima@example.com");
}

#[tokio::test]
async fn password_change_requires_the_current_password() {
    let t = TestApp::new();
    let user = t.add_user("Ana", "ana@example.com", "sales_rep");
    let cookie = t.login("ana@example.com").await;
    let before = t.db.password_hash(user.user_id);

    let wrong = t
        .send(json_request(
            "POST",
            "/profile/password",
            Some(&cookie),
            json!({ "current_password": "guess", "new_password": "a-much-better-one" }),
        ))
        .await;
    assert_eq!(wrong.status(), StatusCode::BAD_REQUEST);
    assert_eq!(t.db.password_hash(user.user_id), before);

    let changed = t
        .send(json_request(
            "POST",
            "/profile/password",
            Some(&cookie),
            json!({ "current_password": PASSWORD, "new_password": "a-much-better-one" }),
        ))
        .await;
    assert_eq!(changed.status(), StatusCode::NO_CONTENT);
    assert_ne!(t.db.password_hash(user.user_id), before);
    assert!(t.db.activity().iter().any(|a| a.action == "Change Password"));
}

#[tokio::test]
async fn notifications_can_be_listed_and_marked_read() {
    let t = TestApp::new();
    t.add_user("Ana", "ana@example.com", "manager");
    t.db.grant("manager", "documents", Action::Create, true);
    let cookie = t.login("ana@example.com").await;
    let upload = t
        .send(upload_request(&cookie, "Quote", "quote.txt", "hello"))
        .await;
    assert_eq!(upload.status(), StatusCode::CREATED);

    let unread = body_json(
        t.send(request("GET", "/notifications?unread_only=true", Some(&cookie)))
            .await,
    )
    .await;
    let id = unread[0]["id"].as_i64().unwrap();
    assert_eq!(unread[0]["kind"], "success");

    let mark = t
        .send(request("POST", &format!("/notifications/{}/read", id), Some(&cookie)))
        .await;
    assert_eq!(mark.status(), StatusCode::NO_CONTENT);

    let remaining = body_json(
        t.send(request("GET", "/notifications?unread_only=true", Some(&cookie)))
            .await,
    )
    .await;
    assert_eq!(remaining, json!([]));

    let _ = tokio::fs::remove_dir_all(&t.upload_dir).await;
}

#[tokio::test]
async fn permission_query_reports_flags_for_ui_rendering() {
    let t = TestApp::new();
    t.add_user("Ana", "ana@example.com", "sales_rep");
    t.db.grant("sales_rep", "documents", Action::View, true);
    let cookie = t.login("ana@example.com").await;

    let view = body_json(
        t.send(request("GET", "/permissions/check?module=documents", Some(&cookie)))
            .await,
    )
    .await;
    assert_eq!(view["action"], "view");
    assert_eq!(view["allowed"], true);

    let bogus = body_json(
        t.send(request(
            "GET",
            "/permissions/check?module=documents&action=approve",
            Some(&cookie),
        ))
        .await,
    )
    .await;
    assert_eq!(bogus["allowed"], false);
}

#[tokio::test]
async fn email_taken_in_another_case_is_a_conflict() {
    let t = TestApp::new();
    t.add_user("Ana", "ana@example.com", "sales_rep");
    let ben = t.add_user("Ben", "ben@example.com", "sales_rep");
    let cookie = t.login("ana@example.com").await;

    let taken = t
        .send(json_request(
            "PUT",
            "/profile",
            Some(&cookie),
            json!({ "name": "Ana", "email": "BEN@Example.com" }),
        ))
        .await;
    assert_eq!(taken.status(), StatusCode::CONFLICT);

    let ben_cookie = t.login("BEN@EXAMPLE.COM").await;
    let me = body_json(t.send(request("GET", "/auth/me", Some(&ben_cookie))).await).await;
    assert_eq!(me["user_id"], ben.user_id);
}

#[tokio::test]
async fn deactivated_user_is_signed_out_of_live_sessions() {
    let t = TestApp::new();
    let user = t.add_user("Ana", "ana@example.com", "sales_rep");
    let cookie = t.login("ana@example.com").await;
    t.db.deactivate_user(user.user_id);

    let me = t.send(request("GET", "/auth/me", Some(&cookie))).await;

    assert_eq!(me.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&me), "/login");
    assert_eq!(t.db.session_count(), 0);
}

#[tokio::test]
async fn document_delete_is_gated_audited_and_notifies_the_uploader() {
    let t = TestApp::new();
    let ana = t.add_user("Ana", "ana@example.com", "manager");
    t.add_user("Root", "root@example.com", "admin");
    t.db.grant("manager", "documents", Action::Create, true);
    t.db.grant("manager", "documents", Action::Delete, false);
    t.db.grant("admin", "documents", Action::Delete, true);
    let ana_cookie = t.login("ana@example.com").await;
    let root_cookie = t.login("root@example.com").await;

    let upload = t
        .send(upload_request(&ana_cookie, "Quote", "quote.txt", "hello"))
        .await;
    assert_eq!(upload.status(), StatusCode::CREATED);
    let id = body_json(upload).await["id"].as_i64().unwrap();
    let path = format!("/documents/{}", id);

    let denied = t.send(request("DELETE", &path, Some(&ana_cookie))).await;
    assert_eq!(denied.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&denied), "/forbidden");
    assert_eq!(t.db.documents().len(), 1);

    let deleted = t.send(request("DELETE", &path, Some(&root_cookie))).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    assert!(t.db.documents().is_empty());
    assert!(t.db.activity().iter().any(|a| a.action == "Delete Document"));
    let stored = std::fs::read_dir(&t.upload_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(stored, 0);

    let titles: Vec<String> = t
        .db
        .notifications()
        .into_iter()
        .filter(|n| n.user_id == ana.user_id)
        .map(|n| n.title)
        .collect();
    assert_eq!(titles, vec!["Document uploaded".to_string(), "Document deleted".to_string()]);

    let again = t.send(request("DELETE", &path, Some(&root_cookie))).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    let _ = tokio::fs::remove_dir_all(&t.upload_dir).await;
}

#[tokio::test]
async fn read_all_reports_how_many_notifications_changed() {
    let t = TestApp::new();
    t.add_user("Ana", "ana@example.com", "manager");
    t.db.grant("manager", "documents", Action::Create, true);
    let cookie = t.login("ana@example.com").await;
    for title in ["First", "Second"] {
        let upload = t
            .send(upload_request(&cookie, title, "quote.txt", "hello"))
            .await;
        assert_eq!(upload.status(), StatusCode::CREATED);
    }

    let first = body_json(t.send(request("POST", "/notifications/read-all", Some(&cookie))).await).await;
    assert_eq!(first, json!({ "updated": 2 }));

    let second = body_json(t.send(request("POST", "/notifications/read-all", Some(&cookie))).await).await;
    assert_eq!(second, json!({ "updated": 0 }));

    let _ = tokio::fs::remove_dir_all(&t.upload_dir).await;
}

#[tokio::test]
async fn activity_lists_own_records_newest_first() {
    let t = TestApp::new();
    t.add_user("Ana", "ana@example.com", "sales_rep");
    t.add_user("Ben", "ben@example.com", "sales_rep");
    t.db.grant("sales_rep", "activity", Action::View, true);
    let cookie = t.login("ana@example.com").await;
    t.login("ben@example.com").await;

    let updated = t
        .send(json_request(
            "PUT",
            "/profile",
            Some(&cookie),
            json!({ "name": "Ana Lima", "email": "ana@example.com" }),
        ))
        .await;
    assert_eq!(updated.status(), StatusCode::OK);

    let response = t.send(request("GET", "/activity", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let actions: Vec<String> = body_json(response)
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["action"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(actions, vec!["Update Profile".to_string(), "Login".to_string()]);
}
