use axum::extract::{Path, State};
use axum::Json;

use updraft_core::report::DigestResponse;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/file-sha/{name}: SHA-256 of a published file, computed on demand.
pub async fn file_sha(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DigestResponse>, AppError> {
    updraft_core::paths::validate_name(&name)?;
    let path = app.files_dir.join(&name);
    if !path.is_file() {
        return Err(AppError::not_found(format!("file not found: {name}")));
    }

    let result = tokio::task::spawn_blocking(move || {
        let size = std::fs::metadata(&path)?.len();
        let sha256 = updraft_core::digest::digest_file(&path)?;
        Ok::<_, updraft_core::UpdraftError>(DigestResponse {
            file: name,
            sha256,
            size,
        })
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}
