//! Human-readable descriptions for trouble codes and requests
//!
//! Descriptions are display-only; no decode path depends on them.

use crate::error::LookupError;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Key-value store of descriptions, keyed by trouble code (`P0133`) or
/// request text (`01 0C`)
pub trait DescriptionStore: Send + Sync {
    fn describe(&self, code: &str) -> Option<String>;
}

impl DescriptionStore for HashMap<String, String> {
    fn describe(&self, code: &str) -> Option<String> {
        self.get(code).cloned()
    }
}

/// Descriptions loaded from a JSON object of `"code": "description"` pairs
#[derive(Debug, Clone, Default)]
pub struct DescriptionMap {
    entries: HashMap<String, String>,
}

impl DescriptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, LookupError> {
        let raw: HashMap<String, String> = serde_json::from_str(json)?;
        let entries = raw
            .into_iter()
            .map(|(code, text)| (code.trim().to_ascii_uppercase(), text))
            .collect();
        Ok(Self { entries })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LookupError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let map = Self::from_json_str(&json)?;
        info!("Loaded {} descriptions from {}", map.len(), path.display());
        Ok(map)
    }

    pub fn insert(&mut self, code: impl Into<String>, description: impl Into<String>) {
        self.entries
            .insert(code.into().trim().to_ascii_uppercase(), description.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DescriptionStore for DescriptionMap {
    fn describe(&self, code: &str) -> Option<String> {
        self.entries.get(&code.trim().to_ascii_uppercase()).cloned()
    }
}
