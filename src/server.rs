//! HTTP server initialization.
//!
//! [`serve`] wires the database, inference gateway, analysis pipeline and export
//! sink into the axum router and runs it until ctrl-c.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::analysis::{AnalysisPipeline, PipelineSettings};
use crate::api::{self, AppState};
use crate::config::{AppConfig, InferenceConfig};
use crate::db;
use crate::export;
use crate::inference::InferenceGateway;
use crate::thoughts::ThoughtStore;

/// Identifier recorded in `schema_meta` for the configured model.
pub fn model_identifier(config: &InferenceConfig) -> String {
    match config.backend.as_str() {
        "local" => format!("local:{}:{}", config.model, config.quantization),
        other => format!("{other}:{}", config.model),
    }
}

/// Open the database and build the shared handler state.
///
/// The model is not loaded here; the gateway loads it on the first analysis.
pub fn build_state(config: &AppConfig) -> Result<AppState> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    let configured = model_identifier(&config.inference);
    match db::migrations::get_inference_model(&conn) {
        Ok(Some(stored)) if stored != configured => tracing::warn!(
            stored = %stored,
            configured = %configured,
            "inference model changed; earlier records were analyzed by a different model"
        ),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "could not read stored inference model"),
    }
    db::migrations::set_inference_model(&conn, &configured)
        .context("failed to record inference model")?;

    let gateway = Arc::new(InferenceGateway::from_config(&config.inference));
    let pipeline = Arc::new(AnalysisPipeline::new(
        gateway,
        PipelineSettings::from(&config.inference),
    ));

    let exporter = export::sink_from_config(&config.export);
    match &exporter {
        Some(sink) => tracing::info!(sink = %sink.describe(), "export enabled"),
        None => tracing::info!("export disabled"),
    }

    Ok(AppState {
        store: ThoughtStore::new(conn),
        pipeline,
        exporter,
        api: config.api.clone(),
    })
}

/// Serve the HTTP API on `server.host:server.port`.
pub async fn serve(config: AppConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = build_state(&config)?;
    let app = api::build_app(state, &config.server.cors_origins);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening on http://{bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
