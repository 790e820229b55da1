use std::path::PathBuf;

use tracing::{info, warn};

use crate::document::Document;

#[derive(Debug, Default)]
pub struct PurgeReport {
    pub removed: usize,
    pub failed: Vec<(PathBuf, String)>,
}

/// Deletes the snapshot files behind `docs`. Failures are logged and counted.
pub fn purge(docs: &[Document]) -> PurgeReport {
    let mut report = PurgeReport::default();
    for doc in docs {
        match std::fs::remove_file(&doc.path) {
            Ok(()) => report.removed += 1,
            Err(e) => {
                warn!(path = %doc.path.display(), error = %e, "could not delete document");
                report.failed.push((doc.path.clone(), e.to_string()));
            }
        }
    }
    info!(removed = report.removed, failed = report.failed.len(), "purged documents");
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_and_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("a-1.html");
        std::fs::write(&kept, "<p>a</p>").unwrap();
        let docs = vec![
            Document::read(&kept).unwrap(),
            Document::new(dir.path().join("gone-2.html").to_string_lossy(), ""),
        ];
        let report = purge(&docs);
        assert_eq!(report.removed, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(!kept.exists());
    }
}
