use std::sync::Arc;

use anyhow::Result;

use sentiment_space::analysis::{AnalysisPipeline, PipelineSettings};
use sentiment_space::config::AppConfig;
use sentiment_space::inference::InferenceGateway;
use sentiment_space::thoughts::ThoughtStore;

/// Analyze one thought with the configured model, store it, and print the record.
pub async fn analyze(config: &AppConfig, raw_text: &str) -> Result<()> {
    anyhow::ensure!(!raw_text.trim().is_empty(), "text must not be empty");

    let conn = sentiment_space::db::open_database(config.resolved_db_path())?;
    let store = ThoughtStore::new(conn);

    let gateway = Arc::new(InferenceGateway::from_config(&config.inference));
    let pipeline = AnalysisPipeline::new(gateway, PipelineSettings::from(&config.inference));

    let analysis = pipeline.analyze(raw_text).await?;
    if analysis.is_placeholder() {
        eprintln!("Model unavailable; stored without summary or sentiment. Run `sentiment-space doctor`.");
    }

    let thought = store
        .insert(raw_text.to_string(), analysis.summary, analysis.sentiment)
        .await?;

    println!("{}", serde_json::to_string_pretty(&thought)?);
    Ok(())
}
