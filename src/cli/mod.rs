pub mod analyze;
pub mod doctor;
pub mod export;
pub mod stats;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use sentiment_space::config::InferenceConfig;
use sentiment_space::inference::local;

const HF_BASE_URL: &str = "https://huggingface.co";

fn model_url(model: &str, file: &str) -> String {
    format!("{HF_BASE_URL}/{model}/resolve/main/onnx/{file}")
}

fn tokenizer_url(model: &str) -> String {
    format!("{HF_BASE_URL}/{model}/resolve/main/tokenizer.json")
}

/// Download the configured ONNX model and its tokenizer into the model directory.
pub async fn model_download(config: &InferenceConfig) -> Result<()> {
    anyhow::ensure!(
        config.backend == "local",
        "model download is only needed for the local backend (configured: {})",
        config.backend
    );

    let model_file = local::model_file_name(&config.quantization)?;
    let dir = local::model_dir(config);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create model dir: {}", dir.display()))?;

    let model_path = dir.join(model_file);
    let tokenizer_path = dir.join("tokenizer.json");

    if model_path.exists() {
        println!("Model already exists at {}", model_path.display());
    } else {
        println!("Downloading {} ({}, {})...", config.model, model_file, config.quantization);
        download_file(&model_url(&config.model, model_file), &model_path).await?;
        println!("Model saved to {}", model_path.display());
    }

    if tokenizer_path.exists() {
        println!("Tokenizer already exists at {}", tokenizer_path.display());
    } else {
        println!("Downloading tokenizer.json...");
        download_file(&tokenizer_url(&config.model), &tokenizer_path).await?;
        println!("Tokenizer saved to {}", tokenizer_path.display());
    }

    println!("Model download complete. Ready for use.");
    Ok(())
}

/// Download a file from a URL with progress bar. Uses atomic write (tmp + rename).
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download of {url} failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                    .context("invalid progress template")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    // Model files run to hundreds of MB; write chunk by chunk.
    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk)
            .await
            .context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}
