//! JSON HTTP API over the reporting layer.

pub mod error;
pub mod handlers;
pub mod response;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::Result;
use crate::reports::ReportService;

pub use error::ApiError;
pub use response::{ApiResponse, ErrorResponse};

/// Shared state handed to every handler
pub struct AppState {
    /// Report queries shared across requests
    pub reports: ReportService,
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/reports/top-products", get(handlers::top_products))
        .route("/api/channels", get(handlers::list_channels))
        .route("/api/channels/{name}/activity", get(handlers::channel_activity))
        .route("/api/channels/{name}/detections", get(handlers::channel_detections))
        .route("/api/search/messages", get(handlers::search_messages))
        .route("/api/detections/summary", get(handlers::detection_summary))
        .route("/api/analytics/dashboard", get(handlers::dashboard))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        // method + path + status + latency
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}

/// Bind `addr` and serve until the process is stopped
pub async fn serve(addr: &str, reports: ReportService) -> Result<()> {
    let app = router(Arc::new(AppState { reports }));

    let listener = TcpListener::bind(addr).await?;
    info!("Channel analytics API listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
