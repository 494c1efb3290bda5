use axum::body::Body;
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::Deserialize;

use updraft_core::report::LogReport;

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 1000;
const MAX_REPORT_BYTES: usize = 64 * 1024;

/// POST /api/log: store one client status report, sent as JSON or a
/// urlencoded form. An empty body and missing fields get defaults; storage
/// failures answer `{"error": "Log failed"}`.
pub async fn submit(State(app): State<AppState>, req: Request) -> Response {
    let report = match parse_report(req).await {
        Ok(report) => report,
        Err(e) => return e.into_response(),
    };
    let result = tokio::task::spawn_blocking(move || app.store.record_report(&report)).await;
    match result {
        Ok(Ok(id)) => {
            tracing::debug!(id, "status report stored");
            Json(serde_json::json!({ "success": true })).into_response()
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "status report not stored");
            log_failed()
        }
        Err(e) => {
            tracing::error!(error = %e, "task join error");
            log_failed()
        }
    }
}

async fn parse_report(req: Request) -> Result<LogReport, AppError> {
    let is_form = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_REPORT_BYTES)
        .await
        .map_err(|e| AppError::bad_request(format!("unreadable body: {e}")))?;

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(LogReport::default());
    }
    if is_form {
        let req = Request::from_parts(parts, Body::from(bytes));
        let Form(report) = Form::<LogReport>::from_request(req, &())
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        Ok(report)
    } else {
        // Older clients omit the content type on JSON bodies.
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::bad_request(format!("invalid report: {e}")))
    }
}

fn log_failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "Log failed" })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<u32>,
}

/// GET /api/log: recent admin actions and client reports, newest first.
pub async fn list(
    State(app): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let result = tokio::task::spawn_blocking(move || {
        let actions = app.store.recent_actions(limit)?;
        let updates = app.store.recent_reports(limit)?;
        Ok::<_, updraft_core::UpdraftError>(serde_json::json!({
            "actions": actions,
            "updates": updates,
        }))
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}
