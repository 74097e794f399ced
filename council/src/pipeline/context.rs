//! Accumulated analysis context and externally supplied facts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Facts extracted outside the council, passed to stages verbatim
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalFacts {
    facts: BTreeMap<String, String>,
}

impl ExternalFacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.facts.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.facts.get(key).map(String::as_str)
    }

    /// Value for `key`, or `default` when absent or blank
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.get(key) {
            Some(v) if !v.trim().is_empty() => v,
            _ => default,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.facts.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Pretty JSON object of every fact, keys sorted
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.facts).unwrap_or_default()
    }
}

impl<K, V> FromIterator<(K, V)> for ExternalFacts
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            facts: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One folded stage outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub stage_id: u32,
    pub role: String,
    pub consensus: String,
}

/// Append-only record of each completed stage's consensus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisContext {
    entries: Vec<ContextEntry>,
}

impl AnalysisContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a completed stage into the context
    pub fn record(&mut self, stage_id: u32, role: impl Into<String>, consensus: impl Into<String>) {
        self.entries.push(ContextEntry {
            stage_id,
            role: role.into(),
            consensus: consensus.into(),
        });
    }

    /// Most recent consensus recorded for `role`
    pub fn consensus_for(&self, role: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.role == role)
            .map(|e| e.consensus.as_str())
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry as `## role` followed by its consensus, separated by blank lines
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("## {}\n{}", e.role, e.consensus))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
