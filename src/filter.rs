use std::collections::HashMap;

use regex::Regex;

use crate::profile::{FieldKind, FieldRule};

/// Data-driven acceptance checks shared by every strategy and the normalizer.
pub struct AcceptanceFilter {
    rules: HashMap<String, FieldRule>,
    stoplist: Vec<String>,
    reject: Vec<Regex>,
}

impl AcceptanceFilter {
    pub fn new(rules: HashMap<String, FieldRule>, stoplist: &[String], reject: Vec<Regex>) -> Self {
        let lower = |words: &[String]| words.iter().map(|w| w.to_lowercase()).collect::<Vec<_>>();
        let rules = rules
            .into_iter()
            .map(|(field, mut rule)| {
                rule.stoplist = lower(&rule.stoplist);
                (field, rule)
            })
            .collect();
        AcceptanceFilter {
            rules,
            stoplist: lower(stoplist),
            reject,
        }
    }

    /// Trimmed value if it passes every check for `field`.
    pub fn accept(&self, field: &str, value: &str) -> Option<String> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let rule = self.rules.get(field);
        let len = value.chars().count();
        if let Some(rule) = rule {
            if rule.min.is_some_and(|min| len < min) || rule.max.is_some_and(|max| len > max) {
                return None;
            }
        }

        // Stoplists and reject patterns target free text, not counts or links.
        if !matches!(self.kind(field), FieldKind::Text) {
            return Some(value.to_string());
        }

        let lower = value.to_lowercase();
        let stopped = self
            .stoplist
            .iter()
            .chain(rule.iter().flat_map(|r| r.stoplist.iter()))
            .any(|w| contains_word(&lower, w));
        if stopped {
            return None;
        }
        if self.reject.iter().any(|re| re.is_match(value)) {
            return None;
        }
        Some(value.to_string())
    }

    pub fn kind(&self, field: &str) -> FieldKind {
        self.rules
            .get(field)
            .map(|r| r.kind.clone())
            .unwrap_or_default()
    }

    pub fn is_integer(&self, field: &str) -> bool {
        matches!(self.kind(field), FieldKind::Integer)
    }
}

/// Whole-word containment; multi-word entries match as a phrase.
fn contains_word(haystack: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    haystack.match_indices(word).any(|(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
