use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;

use crate::error::AppError;
use crate::state::AppState;

/// Username and password accepted on admin routes.
#[derive(Clone)]
pub struct AdminCredentials {
    pub user: String,
    pub pass: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("user", &self.user)
            .field("pass", &"***")
            .finish()
    }
}

/// Authenticated admin name, inserted into request extensions by
/// [`basic_auth`].
#[derive(Clone, Debug)]
pub struct AdminUser(pub String);

/// HTTP Basic auth gate for `/admin/*`.
///
/// 1. No credentials configured → 401 (admin is disabled)
/// 2. `Authorization: Basic` matches → passthrough with [`AdminUser`]
/// 3. Anything else → 401 with a `WWW-Authenticate` challenge
pub async fn basic_auth(State(app): State<AppState>, mut req: Request, next: Next) -> Response {
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic);

    match (app.admin.as_deref(), presented) {
        (Some(creds), Some((user, pass))) if user == creds.user && pass == creds.pass => {
            req.extensions_mut().insert(AdminUser(user));
            next.run(req).await
        }
        (None, _) => {
            tracing::warn!(path = %req.uri().path(), "admin request rejected: no credentials configured");
            challenge()
        }
        _ => challenge(),
    }
}

fn challenge() -> Response {
    let mut resp = AppError::unauthorized().into_response();
    resp.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"updraft admin\""),
    );
    resp
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
