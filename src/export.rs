//! Bulk export of stored thoughts to an object location.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::{expand_tilde, ExportConfig};
use crate::thoughts::types::Thought;

/// Upper bound on records in one export when no ids are given.
pub const MAX_EXPORT_RECORDS: usize = 10_000;

/// Where an export landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReceipt {
    pub location: String,
    pub thought_count: usize,
}

/// Export document layout.
#[derive(Debug, Serialize)]
pub struct ExportDocument<'a> {
    pub exported_at: String,
    pub thought_count: usize,
    pub thoughts: &'a [Thought],
}

impl<'a> ExportDocument<'a> {
    pub fn new(thoughts: &'a [Thought]) -> Self {
        Self {
            exported_at: crate::thoughts::store::now_timestamp(),
            thought_count: thoughts.len(),
            thoughts,
        }
    }
}

/// Destination for exports. Synchronous; callers on the runtime use spawn_blocking.
pub trait ExportSink: Send + Sync {
    fn export(&self, thoughts: &[Thought]) -> Result<ExportReceipt>;

    fn describe(&self) -> String;
}

/// Writes each export as one JSON object under `{root}/{prefix}/`.
pub struct DirectorySink {
    root: PathBuf,
    prefix: String,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    fn target_dir(&self) -> PathBuf {
        if self.prefix.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&self.prefix)
        }
    }
}

impl ExportSink for DirectorySink {
    fn export(&self, thoughts: &[Thought]) -> Result<ExportReceipt> {
        let dir = self.target_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create export directory {}", dir.display()))?;

        let name = format!(
            "thoughts_export_{}.json",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = unique_path(&dir, &name);
        let json = serde_json::to_vec_pretty(&ExportDocument::new(thoughts))?;

        // Write to a sibling temp file, then rename, so readers never see a partial export.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to move export into place at {}", path.display()))?;

        tracing::info!(location = %path.display(), thought_count = thoughts.len(), "export written");

        Ok(ExportReceipt {
            location: path.to_string_lossy().into_owned(),
            thought_count: thoughts.len(),
        })
    }

    fn describe(&self) -> String {
        format!("directory {}", self.target_dir().display())
    }
}

/// Two exports within the same second get `_1`, `_2`, ... suffixes.
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = name.trim_end_matches(".json");
    (1..)
        .map(|n| dir.join(format!("{stem}_{n}.json")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Build the configured sink, or `None` when export is switched off.
pub fn sink_from_config(config: &ExportConfig) -> Option<Arc<dyn ExportSink>> {
    if !config.enabled {
        return None;
    }
    let dir = config.directory.as_deref()?;
    Some(Arc::new(DirectorySink::new(expand_tilde(dir), config.prefix.clone())))
}
