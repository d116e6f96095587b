//! Text generation backends and the gateway that guards them.
//!
//! Provides the [`TextGenerator`] trait with a local ONNX Runtime backend and a
//! remote HTTP backend, the [`ModelLoader`] seam the gateway loads through, and
//! [`InferenceGateway`] itself.

pub mod gateway;
pub mod local;
pub mod remote;

pub use gateway::{GatewayLimits, GatewayState, GatewayStatus, InferenceGateway, Readiness};

use anyhow::Result;

use crate::config::InferenceConfig;

/// Output of one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// Model-reported likelihood of `text` in `[0.0, 1.0]`, when the backend exposes one.
    pub likelihood: Option<f32>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            likelihood: None,
        }
    }
}

/// Per-call sampling settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateParams {
    pub max_tokens: usize,
    /// `None` uses the backend's configured temperature.
    pub temperature: Option<f32>,
}

impl GenerateParams {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A loaded text-generation capability.
///
/// Methods are synchronous; the gateway calls them through
/// `tokio::task::spawn_blocking`.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<Generation>;

    /// Short identifier for logs and status output.
    fn name(&self) -> &str;
}

/// Produces a [`TextGenerator`]; may be slow, is called on the blocking pool.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn TextGenerator>>;

    /// Human-readable description of what this loader loads.
    fn describe(&self) -> String {
        "custom".into()
    }
}

impl<F> ModelLoader for F
where
    F: Fn() -> Result<Box<dyn TextGenerator>> + Send + Sync,
{
    fn load(&self) -> Result<Box<dyn TextGenerator>> {
        self()
    }
}

/// Loader that builds the backend named in configuration.
pub struct ConfiguredLoader {
    config: InferenceConfig,
}

impl ConfiguredLoader {
    pub fn new(config: InferenceConfig) -> Self {
        Self { config }
    }
}

impl ModelLoader for ConfiguredLoader {
    fn load(&self) -> Result<Box<dyn TextGenerator>> {
        create_generator(&self.config)
    }

    fn describe(&self) -> String {
        format!(
            "{} backend, model {} ({}, {})",
            self.config.backend, self.config.model, self.config.quantization, self.config.device
        )
    }
}

/// Create a text generator from config.
///
/// `"local"` loads ONNX model files from `model_dir` (run `sentiment-space model
/// download` first), `"remote"` talks to an HTTP model server, `"disabled"`
/// always fails so the gateway settles on the placeholder path.
pub fn create_generator(config: &InferenceConfig) -> Result<Box<dyn TextGenerator>> {
    match config.backend.as_str() {
        "local" => Ok(Box::new(local::OnnxGenerator::new(config)?)),
        "remote" => Ok(Box::new(remote::RemoteGenerator::new(config)?)),
        "disabled" => anyhow::bail!("inference disabled by configuration"),
        other => anyhow::bail!("unknown inference backend: {other}. Supported: local, remote, disabled"),
    }
}
