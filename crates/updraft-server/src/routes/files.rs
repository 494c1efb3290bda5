use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::Stream;
use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};

use crate::error::AppError;
use crate::range::ByteRange;
use crate::state::AppState;

const CHUNK: usize = 64 * 1024;

/// GET|HEAD /files/{name}: range-aware artifact and flag serving.
pub async fn get_file(
    State(app): State<AppState>,
    Path(name): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    serve(&app, &name, &method, &headers, false).await
}

/// GET|HEAD /download/{name}: same as `/files`, marked as an attachment.
pub async fn download_file(
    State(app): State<AppState>,
    Path(name): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    serve(&app, &name, &method, &headers, true).await
}

async fn serve(
    app: &AppState,
    name: &str,
    method: &Method,
    headers: &HeaderMap,
    attachment: bool,
) -> Result<Response, AppError> {
    updraft_core::paths::validate_name(name)?;
    let path = app.files_dir.join(name);
    let len = match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => return Err(AppError::not_found(format!("file not found: {name}"))),
    };

    let mut builder = Response::builder()
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_TYPE, "application/octet-stream");
    if attachment {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        );
    }

    let requested = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let (status, start, count) = match ByteRange::resolve(requested, len) {
        ByteRange::Full => (StatusCode::OK, 0, len),
        ByteRange::Partial { start, end } => {
            builder = builder.header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{len}"));
            (StatusCode::PARTIAL_CONTENT, start, end - start + 1)
        }
        ByteRange::Unsatisfiable => {
            tracing::debug!(name, range = requested.unwrap_or(""), len, "range not satisfiable");
            return Ok(builder
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{len}"))
                .body(Body::empty())?);
        }
    };

    builder = builder
        .status(status)
        .header(header::CONTENT_LENGTH, count);
    if method == Method::HEAD {
        return Ok(builder.body(Body::empty())?);
    }

    let mut file = tokio::fs::File::open(&path).await?;
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }
    tracing::debug!(name, start, count, "serving file");
    Ok(builder.body(Body::from_stream(chunks(file.take(count))))?)
}

/// Stream a reader in fixed-size chunks; the file is never held in memory.
fn chunks<R>(reader: R) -> impl Stream<Item = std::io::Result<Bytes>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    futures::stream::try_unfold(reader, |mut reader| async move {
        let mut buf = vec![0u8; CHUNK];
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some((Bytes::from(buf), reader)))
    })
}
