//! Request handlers.
//!
//! - GET  /health: liveness and version
//! - POST /analyze: analyze and store one thought
//! - GET  /entries: newest-first page of stored thoughts
//! - GET  /entries/{id}: one stored thought
//! - GET  /stats: counts per sentiment and date range
//! - POST /export: write selected thoughts to the export sink
//! - GET  /model: inference gateway status
//! - POST /model/reload: drop the model and load it again

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::ApiError;
use super::AppState;
use crate::export::MAX_EXPORT_RECORDS;
use crate::inference::{GatewayStatus, Readiness};
use crate::thoughts::stats::StatsResponse;
use crate::thoughts::store::ListQuery;
use crate::thoughts::types::{Sentiment, Thought};

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub raw_text: String,
}

/// Wire form of a stored thought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThoughtResponse {
    pub id: i64,
    pub raw_text: String,
    pub summary: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub confidence: Option<f64>,
    pub created_at: String,
}

impl From<Thought> for ThoughtResponse {
    fn from(t: Thought) -> Self {
        Self {
            id: t.id,
            raw_text: t.raw_text,
            summary: t.summary,
            sentiment: t.sentiment,
            confidence: t.confidence,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EntriesParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sentiment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntriesResponse {
    pub total: u64,
    pub entries: Vec<ThoughtResponse>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub thought_ids: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub success: bool,
    pub location: String,
    pub thought_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub status: GatewayStatus,
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /analyze
pub async fn analyze(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ThoughtResponse>), ApiError> {
    let Json(request) = body?;
    let raw_text = request.raw_text;

    if raw_text.trim().is_empty() {
        return Err(ApiError::Validation("raw_text must not be empty".into()));
    }
    let max_chars = state.api.max_text_chars;
    if raw_text.chars().count() > max_chars {
        return Err(ApiError::Validation(format!(
            "raw_text exceeds {max_chars} characters"
        )));
    }

    let started = Instant::now();
    let analysis = state.pipeline.analyze(&raw_text).await?;
    let thought = state
        .store
        .insert(raw_text, analysis.summary, analysis.sentiment)
        .await?;

    tracing::info!(
        id = thought.id,
        text_len = thought.raw_text.len(),
        analyzed = thought.sentiment.is_some(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "thought stored"
    );

    Ok((StatusCode::CREATED, Json(thought.into())))
}

/// GET /entries
pub async fn list_entries(
    State(state): State<AppState>,
    params: Result<Query<EntriesParams>, QueryRejection>,
) -> Result<Json<EntriesResponse>, ApiError> {
    let Query(params) = params?;

    let limit = non_negative("limit", params.limit)?
        .unwrap_or(state.api.default_page_size)
        .min(state.api.max_page_size);
    let offset = non_negative("offset", params.offset)?.unwrap_or(0);
    let sentiment = params
        .sentiment
        .as_deref()
        .map(str::parse::<Sentiment>)
        .transpose()
        .map_err(ApiError::Validation)?;

    let query = ListQuery {
        limit,
        offset,
        sentiment,
    };
    let (total, entries) = state.store.page(query).await?;

    Ok(Json(EntriesResponse {
        total,
        entries: entries.into_iter().map(ThoughtResponse::from).collect(),
    }))
}

/// GET /entries/{id}
pub async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ThoughtResponse>, ApiError> {
    match state.store.get(id).await? {
        Some(thought) => Ok(Json(thought.into())),
        None => Err(ApiError::NotFound(format!("thought {id} not found"))),
    }
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    Ok(Json(state.store.stats().await?))
}

/// POST /export
///
/// An empty body exports everything up to [`MAX_EXPORT_RECORDS`].
pub async fn export(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ExportResponse>, ApiError> {
    let sink = state.exporter.clone().ok_or(ApiError::ExportDisabled)?;

    let request: ExportRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ExportRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Validation(format!("invalid export request: {e}")))?
    };

    let thoughts = match request.thought_ids {
        Some(ids) => state.store.get_many(ids).await?,
        None => {
            state
                .store
                .list(ListQuery {
                    limit: MAX_EXPORT_RECORDS,
                    offset: 0,
                    sentiment: None,
                })
                .await?
        }
    };

    let receipt = tokio::task::spawn_blocking(move || sink.export(&thoughts))
        .await
        .map_err(|e| ApiError::Export(e.to_string()))?
        .map_err(|e| ApiError::Export(format!("{e:#}")))?;

    Ok(Json(ExportResponse {
        success: true,
        location: receipt.location,
        thought_count: receipt.thought_count,
    }))
}

/// GET /model
pub async fn model_status(State(state): State<AppState>) -> Json<GatewayStatus> {
    Json(state.pipeline.gateway().status())
}

/// POST /model/reload
pub async fn model_reload(State(state): State<AppState>) -> Json<ReloadResponse> {
    let gateway = state.pipeline.gateway();
    let (ready, reason) = match gateway.reload().await {
        Readiness::Ready => (true, None),
        Readiness::Unavailable { reason } => (false, Some(reason)),
    };
    Json(ReloadResponse {
        ready,
        reason,
        status: gateway.status(),
    })
}

fn non_negative(name: &str, value: Option<i64>) -> Result<Option<usize>, ApiError> {
    match value {
        Some(v) if v < 0 => Err(ApiError::Validation(format!(
            "{name} must be a non-negative integer"
        ))),
        Some(v) => Ok(Some(v as usize)),
        None => Ok(None),
    }
}
