use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use harmonia_types::models::ThreadMetadata;

/// Resolves display names for a thread. Read-only from the pipeline's side.
pub trait MetadataProvider: Send + Sync {
    fn resolve(&self, thread_id: &str) -> Option<ThreadMetadata>;
}

/// Resolve, falling back to the raw thread id for unknown threads.
pub fn resolve_or_fallback(provider: &dyn MetadataProvider, thread_id: &str) -> ThreadMetadata {
    provider
        .resolve(thread_id)
        .unwrap_or_else(|| ThreadMetadata::fallback(thread_id))
}

/// Fixed thread -> names map, typically loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    threads: HashMap<String, ThreadMetadata>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, thread_id: impl Into<String>, metadata: ThreadMetadata) {
        self.threads.insert(thread_id.into(), metadata);
    }

    /// JSON object keyed by thread id.
    pub fn from_json(json: &str) -> Result<Self> {
        let threads: HashMap<String, ThreadMetadata> =
            serde_json::from_str(json).context("invalid thread metadata JSON")?;
        Ok(Self { threads })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read thread metadata {}", path.display()))?;
        let metadata = Self::from_json(&json)?;
        info!("Loaded metadata for {} threads from {}", metadata.len(), path.display());
        Ok(metadata)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

impl MetadataProvider for StaticMetadata {
    fn resolve(&self, thread_id: &str) -> Option<ThreadMetadata> {
        self.threads.get(thread_id).cloned()
    }
}
