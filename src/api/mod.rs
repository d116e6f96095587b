//! HTTP/JSON surface of the journal.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::analysis::AnalysisPipeline;
use crate::config::ApiConfig;
use crate::export::ExportSink;
use crate::thoughts::ThoughtStore;

pub use error::ApiError;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: ThoughtStore,
    pub pipeline: Arc<AnalysisPipeline>,
    /// `None` when export is disabled.
    pub exporter: Option<Arc<dyn ExportSink>>,
    pub api: ApiConfig,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/analyze", post(handlers::analyze))
        .route("/entries", get(handlers::list_entries))
        .route("/entries/{id}", get(handlers::get_entry))
        .route("/stats", get(handlers::stats))
        .route("/export", post(handlers::export))
        .route("/model", get(handlers::model_status))
        .route("/model/reload", post(handlers::model_reload))
        .with_state(state)
}

/// Router with request tracing and CORS applied.
pub fn build_app(state: AppState, cors_origins: &[String]) -> Router {
    router(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors(cors_origins))
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        cors.allow_origin(parsed)
    }
}
