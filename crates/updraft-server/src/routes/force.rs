use axum::extract::{FromRequest, Request, State};
use axum::http::header;
use axum::{Form, Json};
use serde::Deserialize;

use updraft_core::types::ForceScope;

use crate::auth::AdminUser;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub union: Option<String>,
    #[serde(default)]
    pub society_code: Option<String>,
}

/// POST /admin/force: publish a force flag for everyone, a union or one
/// society. Accepts JSON or a urlencoded form. Re-triggering rewrites the
/// flag with a newer timestamp.
pub async fn trigger(
    State(app): State<AppState>,
    req: Request,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = req
        .extensions()
        .get::<AdminUser>()
        .map(|u| u.0.clone())
        .unwrap_or_else(|| "admin".to_string());
    let body = parse_body(req).await?;
    let scope = ForceScope::from_request(
        body.kind.trim(),
        body.union.as_deref(),
        body.society_code.as_deref(),
    )?;

    let result = tokio::task::spawn_blocking(move || {
        let flag = scope.flag_file_name();
        let triggered_at = chrono::Utc::now().timestamp_millis();
        updraft_core::io::atomic_write(
            &app.files_dir.join(&flag),
            triggered_at.to_string().as_bytes(),
        )?;
        app.store.record_action(scope.kind(), scope.target(), &user)?;
        tracing::info!(%scope, flag = %flag, by = %user, "force update triggered");
        Ok::<_, updraft_core::UpdraftError>(serde_json::json!({
            "success": true,
            "message": format!("Force update triggered for {scope}"),
            "flag": flag,
            "triggeredAt": triggered_at,
        }))
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

async fn parse_body(req: Request) -> Result<ForceRequest, AppError> {
    let is_form = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        let Form(body) = Form::<ForceRequest>::from_request(req, &())
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        Ok(body)
    } else {
        let Json(body) = Json::<ForceRequest>::from_request(req, &())
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        Ok(body)
    }
}
