//! Thought journal backend: free-text thoughts in, summarized and
//! sentiment-scored records out, over a small HTTP/JSON API.
//!
//! A `POST /analyze` request flows through four parts:
//!
//! 1. The request handler ([`api`]) validates the text.
//! 2. The analysis pipeline ([`analysis`]) asks the inference gateway
//!    ([`inference`]) for a summary and a sentiment label.
//! 3. The record store ([`thoughts`]) persists the result in SQLite.
//! 4. The stored record is returned to the client.
//!
//! The model is loaded lazily, once, on first use. When it cannot be loaded the
//! thought is still stored, with `summary`, `sentiment` and `confidence` left
//! null, and the request succeeds.
//!
//! # Modules
//!
//! - [`config`]: configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`thoughts`]: the record store
//! - [`inference`]: text generation backends and the gateway guarding them
//! - [`analysis`]: summarize, classify, score
//! - [`api`]: axum router, handlers, and error mapping
//! - [`export`]: bulk export sinks
//! - [`server`]: wiring and the HTTP server loop

pub mod analysis;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod inference;
pub mod server;
pub mod thoughts;
