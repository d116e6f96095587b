//! Lazy, single-flight model gateway.
//!
//! The gateway moves through `Unloaded → Loading → Ready | Failed`. Loading is
//! triggered by the first [`InferenceGateway::ensure_ready`] call and happens at
//! most once per process unless an operator calls [`InferenceGateway::reload`].
//! Concurrent first callers queue on one async mutex and all observe the single
//! load's outcome.
//!
//! A failed load is not an error to callers: they get [`Readiness::Unavailable`]
//! and must take the placeholder path themselves.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};

use super::{GenerateParams, Generation, ModelLoader, TextGenerator};
use crate::config::InferenceConfig;
use crate::error::InferenceError;

/// Whether the gateway can serve [`InferenceGateway::generate`] calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Unavailable { reason: String },
}

/// Lifecycle state of the model behind the gateway.
#[derive(Clone, Default)]
pub enum GatewayState {
    #[default]
    Unloaded,
    Loading,
    Ready(Arc<dyn TextGenerator>),
    Failed(String),
}

impl GatewayState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
        }
    }

    /// `Some` once loading has resolved either way.
    fn settled(&self) -> Option<Readiness> {
        match self {
            Self::Ready(_) => Some(Readiness::Ready),
            Self::Failed(reason) => Some(Readiness::Unavailable {
                reason: reason.clone(),
            }),
            Self::Unloaded | Self::Loading => None,
        }
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(generator) => write!(f, "Ready({})", generator.name()),
            Self::Failed(reason) => write!(f, "Failed({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Resource bounds applied by the gateway.
#[derive(Debug, Clone, Copy)]
pub struct GatewayLimits {
    /// Maximum generations running at once.
    pub max_concurrent: usize,
    /// Upper bound on a single load attempt.
    pub load_timeout: Duration,
    /// Upper bound on a single generation.
    pub generate_timeout: Duration,
}

impl Default for GatewayLimits {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            load_timeout: Duration::from_secs(120),
            generate_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&InferenceConfig> for GatewayLimits {
    fn from(config: &InferenceConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1),
            load_timeout: Duration::from_secs(config.load_timeout_secs),
            generate_timeout: Duration::from_secs(config.generate_timeout_secs),
        }
    }
}

/// Snapshot for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    pub backend: String,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub load_attempts: usize,
    pub max_concurrent: usize,
}

pub struct InferenceGateway {
    loader: Arc<dyn ModelLoader>,
    state: RwLock<GatewayState>,
    /// Single acquisition point for the Unloaded → Loading transition.
    load_lock: Mutex<()>,
    /// Held by the blocking task itself, so a timed-out generation still counts.
    permits: Arc<Semaphore>,
    limits: GatewayLimits,
    load_attempts: AtomicUsize,
}

impl InferenceGateway {
    pub fn new(loader: Arc<dyn ModelLoader>, limits: GatewayLimits) -> Self {
        Self {
            loader,
            state: RwLock::new(GatewayState::Unloaded),
            load_lock: Mutex::new(()),
            permits: Arc::new(Semaphore::new(limits.max_concurrent.max(1))),
            limits,
            load_attempts: AtomicUsize::new(0),
        }
    }

    /// Gateway backed by the configured backend.
    pub fn from_config(config: &InferenceConfig) -> Self {
        Self::new(
            Arc::new(super::ConfiguredLoader::new(config.clone())),
            GatewayLimits::from(config),
        )
    }

    /// Load the model if nothing has tried yet, then report readiness.
    ///
    /// Never fails: a model that cannot be obtained yields `Unavailable`.
    pub async fn ensure_ready(&self) -> Readiness {
        if let Some(readiness) = self.current_state().settled() {
            return readiness;
        }

        let _guard = self.load_lock.lock().await;
        // Another caller may have finished loading while we waited.
        if let Some(readiness) = self.current_state().settled() {
            return readiness;
        }

        self.load_locked().await
    }

    /// Discard the current model (or failure) and load again.
    pub async fn reload(&self) -> Readiness {
        let _guard = self.load_lock.lock().await;
        tracing::info!(previous = self.current_state().label(), "model reload requested");
        self.set_state(GatewayState::Unloaded);
        self.load_locked().await
    }

    /// Run one generation. Valid only after `ensure_ready` returned `Ready`.
    ///
    /// The concurrency permit is released when the blocking work finishes, not
    /// when the caller stops waiting on a timeout.
    pub async fn generate(
        &self,
        prompt: &str,
        params: GenerateParams,
    ) -> Result<Generation, InferenceError> {
        let generator = match self.current_state() {
            GatewayState::Ready(generator) => generator,
            _ => return Err(InferenceError::NotReady),
        };

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| InferenceError::Generation(e.to_string()))?;

        let prompt = prompt.to_string();
        let started = Instant::now();
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            generator.generate(&prompt, &params)
        });

        let timeout = self.limits.generate_timeout;
        let generation = match tokio::time::timeout(timeout, task).await {
            Err(_) => return Err(InferenceError::Timeout(timeout.as_secs())),
            Ok(Err(join_err)) => return Err(InferenceError::Generation(join_err.to_string())),
            Ok(Ok(Err(e))) => return Err(InferenceError::Generation(format!("{e:#}"))),
            Ok(Ok(Ok(generation))) => generation,
        };

        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            output_len = generation.text.len(),
            "generation finished"
        );
        Ok(generation)
    }

    pub fn state(&self) -> GatewayState {
        self.current_state()
    }

    /// Number of load attempts made since the gateway was created.
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> GatewayStatus {
        let state = self.current_state();
        GatewayStatus {
            backend: self.loader.describe(),
            state: state.label(),
            generator: match &state {
                GatewayState::Ready(g) => Some(g.name().to_string()),
                _ => None,
            },
            failure: match &state {
                GatewayState::Failed(reason) => Some(reason.clone()),
                _ => None,
            },
            load_attempts: self.load_attempts(),
            max_concurrent: self.limits.max_concurrent,
        }
    }

    /// Perform one load. Caller must hold `load_lock`.
    async fn load_locked(&self) -> Readiness {
        self.set_state(GatewayState::Loading);
        let attempt = self.load_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(attempt, loader = %self.loader.describe(), "loading model");

        let started = Instant::now();
        let loader = Arc::clone(&self.loader);
        let task = tokio::task::spawn_blocking(move || loader.load());

        let timeout = self.limits.load_timeout;
        let next = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(generator))) => GatewayState::Ready(Arc::from(generator)),
            Ok(Ok(Err(e))) => GatewayState::Failed(format!("{e:#}")),
            Ok(Err(join_err)) => GatewayState::Failed(format!("model load task failed: {join_err}")),
            Err(_) => GatewayState::Failed(format!(
                "model load timed out after {}s",
                timeout.as_secs()
            )),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &next {
            GatewayState::Ready(generator) => {
                tracing::info!(elapsed_ms, generator = generator.name(), "model ready")
            }
            GatewayState::Failed(reason) => tracing::warn!(
                elapsed_ms,
                %reason,
                "model unavailable; analyses will be stored without summary or sentiment"
            ),
            _ => {}
        }

        let readiness = next.settled().unwrap_or(Readiness::Unavailable {
            reason: "load did not settle".into(),
        });
        self.set_state(next);
        readiness
    }

    fn current_state(&self) -> GatewayState {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_state(&self, next: GatewayState) {
        match self.state.write() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}
