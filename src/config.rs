use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub inference: InferenceConfig,
    pub api: ApiConfig,
    pub export: ExportConfig,
    /// File the settings were read from; `None` when defaults were used.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InferenceConfig {
    /// `local` (ONNX Runtime), `remote` (HTTP model server) or `disabled`.
    pub backend: String,
    pub model: String,
    pub model_dir: String,
    pub quantization: String,
    pub device: String,
    pub max_new_tokens: usize,
    pub temperature: f32,
    pub max_prompt_chars: usize,
    pub max_concurrent: usize,
    pub load_timeout_secs: u64,
    pub generate_timeout_secs: u64,
    pub remote_url: String,
    /// `ollama` or `openai`.
    pub remote_api: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub max_text_chars: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExportConfig {
    pub enabled: bool,
    pub directory: Option<String>,
    pub prefix: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            inference: InferenceConfig::default(),
            api: ApiConfig::default(),
            export: ExportConfig::default(),
            source: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            log_level: "info".into(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_app_dir()
            .join("sentiment.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        let model_dir = default_app_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            backend: "local".into(),
            model: "onnx-community/Qwen2.5-0.5B-Instruct".into(),
            model_dir,
            quantization: "int4".into(),
            device: "cpu".into(),
            max_new_tokens: 256,
            temperature: 0.7,
            max_prompt_chars: 512,
            max_concurrent: 2,
            load_timeout_secs: 120,
            generate_timeout_secs: 60,
            remote_url: "http://localhost:11434".into(),
            remote_api: "ollama".into(),
            api_key: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_text_chars: 10_000,
            default_page_size: 100,
            max_page_size: 1000,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: None,
            prefix: "exports".into(),
        }
    }
}

/// Returns `~/.sentiment-space/`
pub fn default_app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sentiment-space")
}

/// Returns the default config file path: `~/.sentiment-space/config.toml`
pub fn default_config_path() -> PathBuf {
    default_app_dir().join("config.toml")
}

impl AppConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, apply env var overrides, then validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            let mut config: AppConfig =
                toml::from_str(&contents).context("failed to parse config TOML")?;
            config.source = Some(path.to_path_buf());
            config
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides()?;
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("SENTIMENT_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("SENTIMENT_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("SENTIMENT_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("SENTIMENT_PORT") {
            self.server.port = val.parse().context("SENTIMENT_PORT must be a port number")?;
        }
        if let Ok(val) = std::env::var("LLM_BACKEND") {
            self.inference.backend = val;
        }
        if let Ok(val) = std::env::var("LLM_MODEL_NAME") {
            self.inference.model = val;
        }
        if let Ok(val) = std::env::var("LLM_QUANTIZATION") {
            self.inference.quantization = val;
        }
        if let Ok(val) = std::env::var("LLM_DEVICE") {
            self.inference.device = val;
        }
        if let Ok(val) = std::env::var("LLM_MAX_NEW_TOKENS") {
            self.inference.max_new_tokens = val
                .parse()
                .context("LLM_MAX_NEW_TOKENS must be a positive integer")?;
        }
        if let Ok(val) = std::env::var("LLM_REMOTE_URL") {
            self.inference.remote_url = val;
        }
        if let Ok(val) = std::env::var("EXPORT_ENABLED") {
            self.export.enabled = val.eq_ignore_ascii_case("true");
        }
        if let Ok(val) = std::env::var("EXPORT_DIR") {
            self.export.directory = Some(val);
        }
        Ok(())
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.export.enabled {
            ensure!(
                self.export
                    .directory
                    .as_deref()
                    .is_some_and(|d| !d.trim().is_empty()),
                "export.enabled = true requires export.directory"
            );
        }
        ensure!(
            self.inference.max_concurrent >= 1,
            "inference.max_concurrent must be at least 1"
        );
        ensure!(
            (0.0..=2.0).contains(&self.inference.temperature),
            "inference.temperature must be between 0.0 and 2.0"
        );
        ensure!(
            self.api.default_page_size >= 1 && self.api.max_page_size >= 1,
            "api page sizes must be at least 1"
        );
        ensure!(
            self.api.default_page_size <= self.api.max_page_size,
            "api.default_page_size must not exceed api.max_page_size"
        );
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
