use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::document::Document;
use crate::profile::{Profile, Structured};
use crate::record::{Candidate, StrategyKind};

static SCRIPT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());

/// Records from data embedded in `<script>` bodies: JSON-LD, JSON fragments
/// found after anchor patterns, and named-capture patterns.
pub fn extract(profile: &Profile, doc: &Document, dom: &Html) -> Vec<Candidate> {
    let Some(rules) = &profile.structured else {
        return Vec::new();
    };
    let mut walker = Walker {
        profile,
        rules,
        doc,
        out: Vec::new(),
    };

    for script in dom.select(&SCRIPT) {
        let body: String = script.text().collect();
        if body.trim().is_empty() {
            continue;
        }
        let is_ld = script
            .value()
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("application/ld+json"));

        if is_ld {
            if rules.json_ld {
                match parse_fragment(&body) {
                    Some(v) => walker.walk(&v),
                    None => debug!(document = %doc.name, "unparseable JSON-LD block"),
                }
            }
            continue;
        }

        // A span nested in one that parsed is already covered by its walk;
        // inside one that didn't, it gets its own chance.
        let mut covered = 0;
        for (start, end) in anchored_spans(&rules.fragment_anchors, &body) {
            if start < covered {
                continue;
            }
            match parse_fragment(&body[start..end]) {
                Some(v) => {
                    walker.walk(&v);
                    covered = end;
                }
                None => debug!(document = %doc.name, bytes = end - start, "skipping malformed fragment"),
            }
        }

        for re in &rules.capture_patterns {
            walker.captures(re, &body);
        }
    }

    walker.out
}

struct Walker<'a> {
    profile: &'a Profile,
    rules: &'a Structured,
    doc: &'a Document,
    out: Vec<Candidate>,
}

impl Walker<'_> {
    fn candidate(&self) -> Candidate {
        Candidate::new(self.doc.provenance(StrategyKind::Structured))
    }

    fn walk(&mut self, value: &Value) {
        match value {
            Value::String(s) => self.identifiers_in(s),
            Value::Array(items) => items.iter().for_each(|v| self.walk(v)),
            Value::Object(map) => {
                let produced = self.object_record(map);
                for v in map.values() {
                    match v {
                        Value::String(_) if produced => {}
                        _ => self.walk(v),
                    }
                }
            }
            _ => {}
        }
    }

    fn identifiers_in(&mut self, s: &str) {
        let profile = self.profile;
        let Some(id) = &profile.identifier else {
            return;
        };
        for (raw, canonical) in id.find_all(s) {
            let mut c = self.candidate();
            c.set(&id.field, canonical);
            if let Some(raw_field) = &id.raw_field {
                c.set(raw_field, raw);
            }
            self.out.push(c);
        }
    }

    fn object_record(&mut self, map: &serde_json::Map<String, Value>) -> bool {
        let has_all = self
            .rules
            .object_requires
            .iter()
            .all(|k| map.get(k).and_then(scalar).is_some());
        if !has_all || self.rules.object_fields.is_empty() {
            return false;
        }

        let mut c = self.candidate();
        for (key, field) in &self.rules.object_fields {
            if let Some(v) = map.get(key).and_then(scalar) {
                c.fill(field, self.canonical_value(field, v));
            }
        }
        if c.is_empty() {
            return false;
        }
        self.out.push(c);
        true
    }

    /// Identifier-field values are brought into canonical form when they match.
    fn canonical_value(&self, field: &str, value: String) -> String {
        self.profile
            .identifier
            .as_ref()
            .filter(|id| id.field == field)
            .and_then(|id| id.find_all(&value).into_iter().next())
            .map(|(_, canonical)| canonical)
            .unwrap_or(value)
    }

    fn captures(&mut self, re: &Regex, body: &str) {
        let names: Vec<&str> = re.capture_names().flatten().collect();
        if names.is_empty() {
            return;
        }
        for caps in re.captures_iter(body) {
            let mut c = self.candidate();
            for name in &names {
                if let Some(m) = caps.name(name) {
                    c.set(name, m.as_str());
                }
            }
            if !c.is_empty() {
                self.out.push(c);
            }
        }
    }
}

fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Byte spans of the bracketed values right after each anchor match, outer
/// spans before the ones nested in them.
fn anchored_spans(anchors: &[Regex], body: &str) -> Vec<(usize, usize)> {
    let mut spans: Vec<(usize, usize)> = anchors
        .iter()
        .flat_map(|re| re.find_iter(body))
        .filter_map(|m| {
            let start = m.end() + (body[m.end()..].len() - body[m.end()..].trim_start().len());
            balanced_end(&body[start..]).map(|len| (start, start + len))
        })
        .collect();
    spans.sort();
    spans.dedup();
    spans
}

/// Length of the `{…}` or `[…]` value at the start of `s`, honouring strings
/// and escapes. `None` when `s` doesn't start with a bracket or never closes.
pub fn balanced_end(s: &str) -> Option<usize> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in s.char_indices() {
        if i == 0 && ch != '{' && ch != '[' {
            return None;
        }
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Permissive JSON parse: strict first, then with trailing commas removed.
pub fn parse_fragment(s: &str) -> Option<Value> {
    let s = s.trim().trim_end_matches(';');
    serde_json::from_str(s)
        .ok()
        .or_else(|| serde_json::from_str(&strip_trailing_commas(s)).ok())
}

/// Drops commas directly before a closing bracket. String contents are left alone.
fn strip_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in s.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
        } else if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let next = s[i + 1..].trim_start().chars().next();
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}
