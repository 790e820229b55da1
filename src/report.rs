use std::path::PathBuf;

use indexmap::IndexMap;

use crate::export::Exported;
use crate::purge::PurgeReport;
use crate::record::StrategyKind;
use crate::strategy::Extraction;
use crate::upload::UploadStatus;

/// Per-strategy totals across a run.
#[derive(Debug, Default)]
pub struct StrategyTracker {
    metrics: IndexMap<StrategyKind, StrategyMetric>,
}

#[derive(Debug, Default, Clone, Copy)]
struct StrategyMetric {
    documents: usize,
    candidates: usize,
}

impl StrategyTracker {
    pub fn new() -> Self {
        StrategyTracker::default()
    }

    pub fn record(&mut self, extraction: &Extraction) {
        for (kind, found) in &extraction.counts {
            let m = self.metrics.entry(*kind).or_default();
            if *found > 0 {
                m.documents += 1;
            }
            m.candidates += found;
        }
    }

    pub fn total(&self) -> usize {
        self.metrics.values().map(|m| m.candidates).sum()
    }

    pub fn print(&self) {
        for (kind, m) in &self.metrics {
            println!(
                "  candidates from {}: {} (in {} documents)",
                kind, m.candidates, m.documents
            );
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub documents: usize,
    pub skipped: Vec<(PathBuf, String)>,
    pub strategies: StrategyTracker,
    /// Candidates with at least one field left after normalization.
    pub normalized: usize,
    pub keyless: usize,
    pub known: usize,
    pub prior_rows: usize,
    pub rows: usize,
    pub export: Option<Exported>,
    pub upload: Option<UploadStatus>,
    pub purge: Option<PurgeReport>,
}

impl RunReport {
    /// No snapshots at all. Unreadable ones still need reporting.
    pub fn nothing_to_do(&self) -> bool {
        self.documents == 0 && self.skipped.is_empty()
    }

    pub fn print(&self) {
        println!("Documents: {} loaded, {} skipped", self.documents, self.skipped.len());
        for (path, why) in &self.skipped {
            println!("  skipped {}: {}", path.display(), why);
        }
        self.strategies.print();
        println!(
            "Candidates: {} found, {} after normalization, {} without key, {} already known",
            self.strategies.total(),
            self.normalized,
            self.keyless,
            self.known
        );
        if self.prior_rows > 0 {
            println!("Rows: {} ({} carried over from prior table)", self.rows, self.prior_rows);
        } else {
            println!("Rows: {}", self.rows);
        }
        match &self.export {
            Some(e) if e.fell_back => println!("Exported (CSV fallback): {}", e.path.display()),
            Some(e) => println!("Exported: {}", e.path.display()),
            None => println!("Nothing exported."),
        }
        if let Some(upload) = &self.upload {
            println!("Upload: {}", upload.describe());
        }
        if let Some(purge) = &self.purge {
            println!(
                "Purged {} documents ({} failed).",
                purge.removed,
                purge.failed.len()
            );
        }
    }
}
