//! services/api/src/web/middleware.rs
//!
//! Request-context and authentication middleware.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use crm_core::RequestContext;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::web::error::PageError;
use crate::web::state::AppState;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Extracts the session token from the `Cookie` header, if any.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| {
            let (name, value) = c.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then_some(value)
        })
}

/// The peer address, or the first `X-Forwarded-For` hop when the server was
/// not started with connect info.
fn client_ip(req: &Request) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// Middleware that resolves the session cookie once per request and stores a
/// `RequestContext` in the request extensions for handlers to use.
///
/// Never rejects: an invalid or missing session simply yields an anonymous context.
pub async fn load_context(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let session_token = session_token(req.headers()).map(str::to_string);
    let client_ip = client_ip(&req);
    let identity = state.sessions.current(session_token.as_deref()).await;

    req.extensions_mut().insert(RequestContext {
        identity,
        session_token,
        client_ip,
    });
    next.run(req).await
}

/// Middleware that redirects anonymous requests to the login page.
pub async fn require_login(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, PageError> {
    let ctx = req
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default();
    state.require_login(&ctx)?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_session_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc-123; lang=en"),
        );
        assert_eq!(session_token(&headers), Some("abc-123"));
    }

    #[test]
    fn ignores_similarly_named_and_empty_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("old_session=x; session="));
        assert_eq!(session_token(&headers), None);
        assert_eq!(session_token(&HeaderMap::new()), None);
    }
}
