// Usage Store
//
// Keeps the usage ledger across CLI invocations as a small JSON document.
// Each process loads the file on start and rewrites it after every settled
// run. Concurrent processes are not coordinated: the last writer wins.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::compliance::UsageEvent;

/// Current on-disk format version
const FORMAT_VERSION: u32 = 1;

/// On-disk document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UsageFile {
    version: u32,
    saved_at: DateTime<Utc>,
    events: Vec<UsageEvent>,
}

/// JSON file holding settled usage events
#[derive(Debug, Clone)]
pub struct UsageStore {
    path: PathBuf,
}

impl UsageStore {
    /// Create a store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File backing the store
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored event
    ///
    /// A missing file is an empty history.
    pub async fn load(&self) -> Result<Vec<UsageEvent>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No usage file at {:?}, starting empty", self.path);
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read usage file {:?}", self.path))
            }
        };

        let file: UsageFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse usage file {:?}", self.path))?;
        if file.version != FORMAT_VERSION {
            anyhow::bail!(
                "Unsupported usage file version {} in {:?}",
                file.version,
                self.path
            );
        }

        tracing::debug!("Loaded {} usage events from {:?}", file.events.len(), self.path);
        Ok(file.events)
    }

    /// Replace the stored history with `events`
    ///
    /// Writes a sibling temp file and renames it over the old one.
    pub async fn save(&self, events: &[UsageEvent]) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create usage directory {:?}", dir))?;
        }

        let file = UsageFile {
            version: FORMAT_VERSION,
            saved_at: Utc::now(),
            events: events.to_vec(),
        };
        let rendered = serde_json::to_string_pretty(&file).context("Failed to render usage")?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, rendered)
            .await
            .with_context(|| format!("Failed to write usage file {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace usage file {:?}", self.path))?;

        tracing::debug!("Saved {} usage events to {:?}", events.len(), self.path);
        Ok(())
    }
}
