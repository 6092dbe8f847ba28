use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use harmonia_types::models::MessageKind;

/// Offensive-language heuristic applied once, when a message is appended.
///
/// Implementations must be deterministic: the same body always yields the
/// same verdict. Accuracy is not a goal; an auditable, repeatable tag is.
pub trait ContentFilter: Send + Sync {
    fn classify(&self, body: &str) -> bool;
}

/// Verdict for a message about to be stored. Audio has no inspectable text.
pub fn classify_message(filter: &dyn ContentFilter, kind: &MessageKind, body: &str) -> bool {
    match kind {
        MessageKind::Text => filter.classify(body),
        MessageKind::Audio { .. } => false,
    }
}

/// Built-in terms used when no wordlist is configured (pt-BR and en).
pub const DEFAULT_TERMS: &[&str] = &[
    "idiota",
    "imbecil",
    "estúpido",
    "estúpida",
    "otário",
    "otária",
    "babaca",
    "vagabundo",
    "vagabunda",
    "desgraçado",
    "desgraçada",
    "inútil",
    "cretino",
    "cretina",
    "idiot",
    "stupid",
    "moron",
    "imbecile",
    "worthless",
    "jerk",
];

/// Case-insensitive substring match against a fixed set of terms.
#[derive(Debug, Clone)]
pub struct WordlistFilter {
    terms: Vec<String>,
}

impl WordlistFilter {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        terms.sort();
        terms.dedup();
        Self { terms }
    }

    /// Parse a wordlist: one term per line, `#` starts a comment line.
    pub fn parse(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.starts_with('#')),
        )
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read wordlist {}", path.display()))?;
        let filter = Self::parse(&text);
        info!("Loaded {} moderation terms from {}", filter.len(), path.display());
        Ok(filter)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Default for WordlistFilter {
    fn default() -> Self {
        Self::new(DEFAULT_TERMS.iter().copied())
    }
}

impl ContentFilter for WordlistFilter {
    fn classify(&self, body: &str) -> bool {
        let lowered = body.to_lowercase();
        self.terms.iter().any(|term| lowered.contains(term.as_str()))
    }
}
