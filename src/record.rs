use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;

static URL_LIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)(https?://|www\.|/)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Identifier,
    Structured,
    Layout,
    PageFields,
    Fallback,
    /// Rows read back from a prior export.
    Prior,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Identifier => "identifier",
            StrategyKind::Structured => "structured",
            StrategyKind::Layout => "layout",
            StrategyKind::PageFields => "page_fields",
            StrategyKind::Fallback => "fallback",
            StrategyKind::Prior => "prior",
        }
    }

    pub fn parse(s: &str) -> Option<StrategyKind> {
        [
            StrategyKind::Identifier,
            StrategyKind::Structured,
            StrategyKind::Layout,
            StrategyKind::PageFields,
            StrategyKind::Fallback,
            StrategyKind::Prior,
        ]
        .into_iter()
        .find(|k| k.as_str() == s)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub document: String,
    pub ordinal: Option<u64>,
    pub strategy: StrategyKind,
}

/// Field values found by one strategy in one document. Only non-empty values are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub fields: IndexMap<String, String>,
    pub provenance: Provenance,
}

impl Candidate {
    pub fn new(provenance: Provenance) -> Self {
        Candidate {
            fields: IndexMap::new(),
            provenance,
        }
    }

    /// Sets `field` unless `value` is blank. Returns whether it was stored.
    pub fn set(&mut self, field: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        if value.trim().is_empty() {
            return false;
        }
        self.fields.insert(field.to_string(), value);
        true
    }

    /// Sets `field` only if it has no value yet.
    pub fn fill(&mut self, field: &str, value: impl Into<String>) -> bool {
        if self.has(field) {
            return false;
        }
        self.set(field, value)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn has(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn clear(&mut self, field: &str) {
        self.fields.shift_remove(field);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Dedup key: first non-empty of `key_fields`, canonicalised.
    pub fn key(&self, key_fields: &[String]) -> Option<String> {
        key_fields
            .iter()
            .filter_map(|f| self.get(f))
            .find_map(canonical_key)
    }
}

/// URL-like values reduce to their last path segment; everything else to
/// lower-case with collapsed whitespace.
pub fn canonical_key(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let key = if URL_LIKE_RE.is_match(value) {
        let path = value
            .split(['?', '#'])
            .next()
            .unwrap_or(value)
            .trim_end_matches('/');
        path.rsplit('/').next().unwrap_or(path).to_lowercase()
    } else {
        value
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    };
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}
