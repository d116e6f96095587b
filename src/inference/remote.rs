//! Remote text generation over HTTP.
//!
//! Supports an Ollama server (`/api/generate`) and any OpenAI-compatible server
//! exposing `/v1/completions`. The server is checked at load time so an
//! unreachable endpoint settles the gateway as unavailable instead of failing
//! every request later.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::runtime::Handle;

use super::{GenerateParams, Generation, TextGenerator};
use crate::config::InferenceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemoteApi {
    Ollama,
    OpenAi,
}

pub struct RemoteGenerator {
    http: Client,
    runtime: Handle,
    api: RemoteApi,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
    name: String,
}

impl RemoteGenerator {
    /// Build the client and verify the server answers. Must run inside a Tokio runtime.
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let api = match config.remote_api.as_str() {
            "ollama" => RemoteApi::Ollama,
            "openai" => RemoteApi::OpenAi,
            other => anyhow::bail!("unknown remote_api: {other}. Supported: ollama, openai"),
        };
        let base_url = config.remote_url.trim().trim_end_matches('/').to_string();
        anyhow::ensure!(!base_url.is_empty(), "inference.remote_url is not set");

        let runtime = Handle::try_current().context("remote backend needs a Tokio runtime")?;
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("failed to build HTTP client")?;

        let generator = Self {
            http,
            runtime,
            api,
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            name: format!("{}:{}", config.remote_api, config.model),
        };
        generator.check_reachable()?;
        tracing::info!(url = %generator.base_url, model = %generator.model, "remote model server reachable");
        Ok(generator)
    }

    fn check_reachable(&self) -> Result<()> {
        let url = match self.api {
            RemoteApi::Ollama => format!("{}/api/tags", self.base_url),
            RemoteApi::OpenAi => self.openai_url("models"),
        };
        let request = self.authorized(self.http.get(&url));
        let status = self
            .runtime
            .block_on(async move { request.send().await.map(|r| r.status()) })
            .with_context(|| format!("model server unreachable at {url}"))?;
        anyhow::ensure!(status.is_success(), "model server check failed: HTTP {status}");
        Ok(())
    }

    fn openai_url(&self, path: &str) -> String {
        if self.base_url.ends_with("/v1") {
            format!("{}/{path}", self.base_url)
        } else {
            format!("{}/v1/{path}", self.base_url)
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn build_request(&self, prompt: &str, params: &GenerateParams) -> (String, Value) {
        let temperature = params.temperature.unwrap_or(self.temperature);
        let max_tokens = params.max_tokens;
        match self.api {
            RemoteApi::Ollama => (
                format!("{}/api/generate", self.base_url),
                json!({
                    "model": self.model,
                    "prompt": prompt,
                    "stream": false,
                    "options": {
                        "temperature": temperature,
                        "num_predict": max_tokens,
                    },
                }),
            ),
            RemoteApi::OpenAi => (
                self.openai_url("completions"),
                json!({
                    "model": self.model,
                    "prompt": prompt,
                    "max_tokens": max_tokens,
                    "temperature": temperature,
                    "logprobs": 1,
                }),
            ),
        }
    }
}

impl TextGenerator for RemoteGenerator {
    fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<Generation> {
        let (url, payload) = self.build_request(prompt, params);
        let request = self.authorized(self.http.post(&url)).json(&payload);

        let (status, body) = self.runtime.block_on(async move {
            let response = request.send().await?;
            let status = response.status();
            let body: Value = response.json().await.unwrap_or(Value::Null);
            Ok::<_, reqwest::Error>((status, body))
        })?;

        if !status.is_success() {
            return Err(anyhow!("model server error: {status} {body}"));
        }

        match self.api {
            RemoteApi::Ollama => parse_ollama(&body),
            RemoteApi::OpenAi => parse_openai(&body),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn parse_ollama(body: &Value) -> Result<Generation> {
    let text = body
        .get("response")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("response missing `response` field"))?;
    Ok(Generation::text(text.trim()))
}

fn parse_openai(body: &Value) -> Result<Generation> {
    let choice = body
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| anyhow!("response has no choices"))?;
    let text = choice
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("choice missing `text` field"))?;

    let token_logprobs: Vec<f64> = choice
        .get("logprobs")
        .and_then(|l| l.get("token_logprobs"))
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();

    let likelihood = if token_logprobs.is_empty() {
        None
    } else {
        let mean = token_logprobs.iter().sum::<f64>() / token_logprobs.len() as f64;
        Some(mean.exp() as f32)
    };

    Ok(Generation {
        text: text.trim().to_string(),
        likelihood,
    })
}
