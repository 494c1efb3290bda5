pub mod auth;
pub mod error;
pub mod range;
pub mod routes;
pub mod state;
pub mod store;

use axum::extract::Request;
use axum::http::{header, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::{AppState, ServerConfig};

/// Build the axum Router with all routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let admin = Router::new()
        .route("/admin/force", post(routes::force::trigger))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::basic_auth,
        ));

    Router::new()
        // Artifacts and flags
        .route("/files/{name}", get(routes::files::get_file))
        .route("/download/{name}", get(routes::files::download_file))
        .route("/api/file-sha/{name}", get(routes::digest::file_sha))
        // Reports
        .route(
            "/api/log",
            get(routes::log::list).post(routes::log::submit),
        )
        .route("/health", get(routes::health::health))
        .merge(admin)
        .layer(middleware::from_fn(no_store))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Every response is live state; no intermediary may cache it.
async fn no_store(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    resp
}

/// Start the delivery server on `0.0.0.0:<port>`.
pub async fn serve(config: ServerConfig, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(config, listener).await
}

/// Start the delivery server on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when `port = 0` and
/// the OS picks a free port).
pub async fn serve_on(config: ServerConfig, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let files_dir = config.files_dir.clone();
    let admin_enabled = config.admin.is_some();
    let app = build_router(AppState::new(config)?);

    tracing::info!(
        port = actual_port,
        files = %files_dir.display(),
        admin_enabled,
        "delivery server listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
