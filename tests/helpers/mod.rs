#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use rusqlite::Connection;
use sentiment_space::analysis::{AnalysisPipeline, PipelineSettings};
use sentiment_space::api::{self, AppState};
use sentiment_space::config::ApiConfig;
use sentiment_space::db;
use sentiment_space::export::ExportSink;
use sentiment_space::inference::{
    GenerateParams, Generation, GatewayLimits, InferenceGateway, ModelLoader, TextGenerator,
};
use sentiment_space::thoughts::ThoughtStore;
use serde_json::Value;
use tower::ServiceExt;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Answers summary prompts with a fixed sentence and sentiment prompts by
/// keyword: "great" → positive, "awful" → negative, otherwise neutral.
pub struct KeywordGenerator;

impl TextGenerator for KeywordGenerator {
    fn generate(&self, prompt: &str, _params: &GenerateParams) -> Result<Generation> {
        if prompt.contains("Summary:") {
            return Ok(Generation::text("A short summary."));
        }
        let label = if prompt.contains("great") {
            "positive"
        } else if prompt.contains("awful") {
            "negative"
        } else {
            "neutral"
        };
        Ok(Generation {
            text: label.to_string(),
            likelihood: Some(0.84),
        })
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// Fails every generation after loading.
pub struct FailingGenerator;

impl TextGenerator for FailingGenerator {
    fn generate(&self, _prompt: &str, _params: &GenerateParams) -> Result<Generation> {
        anyhow::bail!("device lost mid-generation")
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Loader that counts attempts and takes a while, so concurrent callers overlap.
pub struct CountingLoader {
    pub attempts: AtomicUsize,
    pub delay: Duration,
    pub available: bool,
}

impl CountingLoader {
    pub fn ready() -> Self {
        Self {
            attempts: AtomicUsize::new(0),
            delay: Duration::from_millis(100),
            available: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::ready()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ModelLoader for CountingLoader {
    fn load(&self) -> Result<Box<dyn TextGenerator>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if self.available {
            Ok(Box::new(KeywordGenerator))
        } else {
            anyhow::bail!("model weights not found")
        }
    }

    fn describe(&self) -> String {
        "counting test loader".into()
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: ThoughtStore,
    pub gateway: Arc<InferenceGateway>,
}

/// Build the full router over an in-memory store and the given loader.
pub fn test_app(loader: Arc<dyn ModelLoader>, exporter: Option<Arc<dyn ExportSink>>) -> TestApp {
    test_app_with_db(test_db(), loader, exporter)
}

/// Build the full router over the given connection.
pub fn test_app_with_db(
    conn: Connection,
    loader: Arc<dyn ModelLoader>,
    exporter: Option<Arc<dyn ExportSink>>,
) -> TestApp {
    let store = ThoughtStore::new(conn);
    let gateway = Arc::new(InferenceGateway::new(loader, GatewayLimits::default()));
    let pipeline = Arc::new(AnalysisPipeline::new(
        Arc::clone(&gateway),
        PipelineSettings::default(),
    ));
    let state = AppState {
        store: store.clone(),
        pipeline,
        exporter,
        api: ApiConfig::default(),
    };
    TestApp {
        router: api::build_app(state, &[]),
        store,
        gateway,
    }
}

/// App whose model loads and answers via [`KeywordGenerator`].
pub fn ready_app() -> TestApp {
    test_app(Arc::new(CountingLoader::ready()), None)
}

/// App whose model can never be loaded.
pub fn unavailable_app() -> TestApp {
    test_app(Arc::new(CountingLoader::unavailable()), None)
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    split(response).await
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    split(response).await
}

pub async fn analyze(app: &Router, raw_text: &str) -> Value {
    let (status, body) = post_json(app, "/analyze", serde_json::json!({ "raw_text": raw_text })).await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    body
}

async fn split(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}
