//! CLI `doctor` command: database diagnostics plus model file checks.

use anyhow::{Context, Result};

use sentiment_space::config::AppConfig;
use sentiment_space::db;
use sentiment_space::inference::local;
use sentiment_space::server::model_identifier;

/// Run diagnostics and print a health report.
pub fn doctor(config: &AppConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    println!("Sentiment Space Health Report");
    println!("=============================");
    println!();

    if !db_path.exists() {
        println!("Database:          not found at {}", db_path.display());
        println!("Run `sentiment-space serve` to initialize.");
    } else {
        let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

        let conn = db::open_database(&db_path)
            .context("failed to open database (may be corrupt)")?;
        let report = db::check_database_health(&conn).context("failed to run health check")?;

        println!("Database:          {}", db_path.display());
        println!("File size:         {}", format_bytes(file_size));
        println!("Schema version:    {}", report.schema_version);
        println!("Thoughts:          {}", report.thought_count);
        if report.integrity_ok {
            println!("Integrity check:   PASSED");
        } else {
            println!("Integrity check:   FAILED ({})", report.integrity_details);
            println!();
            println!("Recovery steps:");
            println!("  1. Stop the server and restore from a backup copy of the database.");
            println!("  2. Or dump what is readable: sentiment-space export > backup.json");
        }
        println!();

        let configured = model_identifier(&config.inference);
        println!("Inference model:");
        println!("  Stored:          {}", report.inference_model.as_deref().unwrap_or("(not set)"));
        println!("  Configured:      {configured}");
        if report.inference_model.as_deref().is_some_and(|s| s != configured) {
            println!("  NOTE: model changed since the last server start.");
        }
    }
    println!();

    match config.inference.backend.as_str() {
        "local" => {
            let dir = local::model_dir(&config.inference);
            let model_file = local::model_file_name(&config.inference.quantization)?;
            println!("Local model files ({}):", dir.display());
            for file in [model_file, "tokenizer.json"] {
                let status = if dir.join(file).exists() { "present" } else { "MISSING" };
                println!("  {:<17}{status}", file);
            }
            if !dir.join(model_file).exists() || !dir.join("tokenizer.json").exists() {
                println!("Run `sentiment-space model download` to fetch them.");
            }
        }
        "remote" => {
            println!("Remote model server: {} ({})", config.inference.remote_url, config.inference.remote_api);
        }
        other => println!("Inference backend:   {other} (analyses will be stored without scores)"),
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
