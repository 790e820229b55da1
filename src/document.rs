use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{LeadError, Result};
use crate::record::{Provenance, StrategyKind};

static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)-(\d+)\.html?$").unwrap());

/// One saved HTML snapshot. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub path: PathBuf,
    pub ordinal: Option<u64>,
    pub html: String,
}

impl Document {
    pub fn new(name: impl Into<String>, html: impl Into<String>) -> Self {
        let name = name.into();
        Document {
            ordinal: parse_ordinal(&name),
            path: PathBuf::from(&name),
            name,
            html: html.into(),
        }
    }

    /// Reads a snapshot from disk. Invalid UTF-8 is replaced, not rejected.
    pub fn read(path: &Path) -> Result<Document> {
        let bytes = std::fs::read(path).map_err(|e| LeadError::io(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mut doc = Document::new(name, String::from_utf8_lossy(&bytes));
        doc.path = path.to_path_buf();
        Ok(doc)
    }

    pub fn provenance(&self, strategy: StrategyKind) -> Provenance {
        Provenance {
            document: self.name.clone(),
            ordinal: self.ordinal,
            strategy,
        }
    }
}

/// `clay-page-12.html` → 12
pub fn parse_ordinal(name: &str) -> Option<u64> {
    ORDINAL_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Documents without an ordinal first, then ascending ordinal, then name.
pub fn document_order(a: &Document, b: &Document) -> Ordering {
    match (a.ordinal, b.ordinal) {
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (x, y) => x.cmp(&y).then_with(|| a.name.cmp(&b.name)),
    }
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped: Vec<(PathBuf, String)>,
}

/// Loads every `*.html` file directly inside `dir`. Unreadable files are skipped
/// and reported; only a missing or unreadable directory is an error.
pub fn load_dir(dir: &Path) -> Result<LoadReport> {
    let entries = std::fs::read_dir(dir).map_err(|e| LeadError::io(dir, e))?;
    let mut report = LoadReport::default();

    for entry in entries {
        let path = match entry {
            Ok(e) => e.path(),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "unreadable directory entry");
                report.skipped.push((dir.to_path_buf(), e.to_string()));
                continue;
            }
        };
        if !is_html(&path) || !path.is_file() {
            continue;
        }
        match Document::read(&path) {
            Ok(doc) => {
                debug!(document = %doc.name, ordinal = ?doc.ordinal, bytes = doc.html.len(), "loaded");
                report.documents.push(doc);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable document");
                report.skipped.push((path, e.to_string()));
            }
        }
    }

    report.documents.sort_by(document_order);
    Ok(report)
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
}
