use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::document::{load_dir, Document};
use crate::error::Result;
use crate::export::{read_prior, write_table};
use crate::merge::{merge, MergedRecord, ResultTable};
use crate::normalize::normalize;
use crate::profile::Profile;
use crate::purge::purge;
use crate::record::Candidate;
use crate::report::{RunReport, StrategyTracker};
use crate::settings::Settings;
use crate::strategy::{self, Extraction, StrategyMode};
use crate::upload::{upload, UploadStatus};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

pub struct RunOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub prior: Option<PathBuf>,
    pub append: bool,
    pub mode: StrategyMode,
    pub purge: bool,
    pub upload: bool,
}

/// Extraction of one document after normalization.
struct Processed {
    extraction: Extraction,
    candidates: Vec<Candidate>,
}

fn process(profile: &Profile, doc: &Document, mode: StrategyMode) -> Processed {
    let mut extraction = strategy::extract(profile, doc, mode);
    let candidates = std::mem::take(&mut extraction.candidates)
        .into_iter()
        .map(|c| normalize(profile, c))
        .filter(|c| !c.is_empty())
        .collect();
    Processed {
        extraction,
        candidates,
    }
}

#[cfg(feature = "rayon")]
fn process_documents(
    profile: &Profile,
    docs: &[Document],
    mode: StrategyMode,
    pb: &ProgressBar,
) -> Vec<Processed> {
    docs.par_iter()
        .map(|doc| {
            let out = process(profile, doc, mode);
            pb.inc(1);
            out
        })
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn process_documents(
    profile: &Profile,
    docs: &[Document],
    mode: StrategyMode,
    pb: &ProgressBar,
) -> Vec<Processed> {
    docs.iter()
        .map(|doc| {
            let out = process(profile, doc, mode);
            pb.inc(1);
            out
        })
        .collect()
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Load → extract → normalize → merge → export, then the optional upload and
/// purge. A run over an empty directory returns a report with no documents.
pub fn run(profile: &Profile, settings: &Settings, opts: &RunOptions) -> Result<RunReport> {
    let loaded = load_dir(&opts.input)?;
    let mut report = RunReport {
        documents: loaded.documents.len(),
        skipped: loaded.skipped,
        ..Default::default()
    };
    let docs = loaded.documents;
    if docs.is_empty() {
        return Ok(report);
    }

    let prior = opts
        .prior
        .as_deref()
        .map(|p| read_prior(profile, p))
        .transpose()?;

    info!(profile = %profile.name, documents = docs.len(), mode = ?opts.mode, "extracting");
    let pb = progress_bar(docs.len());
    let processed = process_documents(profile, &docs, opts.mode, &pb);
    pb.finish_and_clear();

    let (records, strategies, normalized) = collect(profile, processed, prior.as_ref(), &mut report);
    report.strategies = strategies;
    report.normalized = normalized;

    let mut rows: Vec<MergedRecord> = Vec::new();
    if opts.append {
        if let Some(prior) = prior {
            report.prior_rows = prior.len();
            rows.extend(prior.rows);
        }
    }
    rows.extend(records);
    report.rows = rows.len();

    if rows.is_empty() {
        info!("no records to export");
        return Ok(report);
    }

    let table = ResultTable::new(profile, rows);
    let exported = write_table(&table, &opts.output)?;

    if opts.upload {
        report.upload = Some(upload(
            &exported.path,
            settings.webhook_url.as_deref(),
            settings.upload_timeout(),
        ));
    }
    report.export = Some(exported);

    if opts.purge {
        report.purge = Some(purge(&docs));
    }
    Ok(report)
}

fn collect(
    profile: &Profile,
    processed: Vec<Processed>,
    prior: Option<&ResultTable>,
    report: &mut RunReport,
) -> (Vec<MergedRecord>, StrategyTracker, usize) {
    let mut tracker = StrategyTracker::new();
    let mut candidates = Vec::new();
    for p in processed {
        tracker.record(&p.extraction);
        candidates.extend(p.candidates);
    }
    let normalized = candidates.len();

    let known = prior.map(ResultTable::keys);
    let outcome = merge(candidates, &profile.key_fields, known.as_ref());
    report.keyless = outcome.keyless;
    report.known = outcome.known;
    (outcome.records, tracker, normalized)
}

/// Result of running the strategies over a single file.
pub struct Inspection {
    pub extraction: Extraction,
    pub table: ResultTable,
}

/// Extract, normalize and merge one document without exporting anything.
pub fn inspect(profile: &Profile, path: &Path, mode: StrategyMode) -> Result<Inspection> {
    let doc = Document::read(path)?;
    let Processed {
        extraction,
        candidates,
    } = process(profile, &doc, mode);
    let outcome = merge(candidates, &profile.key_fields, None);
    Ok(Inspection {
        extraction,
        table: ResultTable::new(profile, outcome.records),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            webhook_url: None,
            upload_timeout_secs: 1,
            profile_dir: None,
        }
    }

    fn opts(input: &Path, output: PathBuf) -> RunOptions {
        RunOptions {
            input: input.to_path_buf(),
            output,
            prior: None,
            append: false,
            mode: StrategyMode::All,
            purge: false,
            upload: false,
        }
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
    }

    fn input_dir(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, html) in files {
            std::fs::write(dir.path().join(name), html).unwrap();
        }
        dir
    }

    #[test]
    fn identifier_and_nearby_name() {
        let p = Profile::builtin("clay").unwrap();
        let input = input_dir(&[(
            "clay-1.html",
            r#"<html><body><div>Jane Doe</div>
               <a href="https://www.linkedin.com/in/jane-doe">LinkedIn</a></body></html>"#,
        )]);
        let out = tempfile::tempdir().unwrap();
        let report = run(&p, &settings(), &opts(input.path(), out.path().join("leads.csv"))).unwrap();
        assert_eq!(report.rows, 1);

        let table = read_prior(&p, &out.path().join("leads.csv")).unwrap();
        let row = &table.rows[0];
        assert_eq!(row.get("linkedin_profile"), Some("https://www.linkedin.com/in/jane-doe/"));
        assert_eq!(row.get("full_name"), Some("Jane Doe"));
        assert_eq!(row.get("first_name"), Some("Jane"));
        assert_eq!(row.get("last_name"), Some("Doe"));
    }

    #[test]
    fn same_identifier_twice_is_one_row() {
        let p = Profile::builtin("clay").unwrap();
        let input = input_dir(&[
            ("clay-1.html", r#"<a href="https://www.linkedin.com/in/bob-stone/">Bob Stone</a>"#),
            ("clay-2.html", r#"<p>Bob Stone</p><a href="https://www.linkedin.com/in/Bob-Stone">x</a>"#),
        ]);
        let out = tempfile::tempdir().unwrap();
        let report = run(&p, &settings(), &opts(input.path(), out.path().join("leads.csv"))).unwrap();
        assert_eq!(report.rows, 1);
        assert_eq!(report.documents, 2);
    }

    #[test]
    fn nothing_found_exports_nothing() {
        let p = Profile::builtin("clay").unwrap();
        let input = input_dir(&[("plain-1.html", "<html><body><p>Quarterly report</p></body></html>")]);
        let out = tempfile::tempdir().unwrap();
        let report = run(&p, &settings(), &opts(input.path(), out.path().join("leads.xlsx"))).unwrap();
        assert_eq!(report.rows, 0);
        assert!(report.export.is_none());
        assert_eq!(report.strategies.total(), 0);
        assert!(!out.path().join("leads.xlsx").exists());
    }

    #[test]
    fn empty_input_dir() {
        let p = Profile::builtin("clay").unwrap();
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let report = run(&p, &settings(), &opts(input.path(), out.path().join("leads.xlsx"))).unwrap();
        assert_eq!(report.documents, 0);
        assert!(report.export.is_none());
    }

    #[test]
    fn prior_keys_are_excluded_and_appended() {
        let p = Profile::builtin("crunchbase").unwrap();
        let out = tempfile::tempdir().unwrap();
        let prior = out.path().join("prior.csv");
        std::fs::write(
            &prior,
            "Name,Identifier,URL,source_document,strategy\nabc,abc,,old-1.html,layout\n",
        )
        .unwrap();
        let input = input_dir(&[(
            "cb-2.html",
            r#"<a href="/organization/abc">ABC</a><a href="/organization/acme-robotics">Acme Robotics</a>
               <a href="/organization/zeta-labs">abc</a>"#,
        )]);

        let mut o = opts(input.path(), out.path().join("new.csv"));
        o.prior = Some(prior.clone());
        let report = run(&p, &settings(), &o).unwrap();
        assert_eq!(report.known, 1);
        let table = read_prior(&p, &out.path().join("new.csv")).unwrap();
        let names: Vec<_> = table.rows.iter().filter_map(|r| r.get("name")).collect();
        assert_eq!(names, vec!["Acme Robotics"]);

        o.append = true;
        o.output = out.path().join("appended.csv");
        let report = run(&p, &settings(), &o).unwrap();
        assert_eq!(report.prior_rows, 1);
        let table = read_prior(&p, &o.output).unwrap();
        let names: Vec<_> = table.rows.iter().filter_map(|r| r.get("name")).collect();
        assert_eq!(names, vec!["abc", "Acme Robotics"]);
    }

    #[test]
    fn rerun_over_own_output_is_stable() {
        let p = Profile::builtin("clay").unwrap();
        let input = input_dir(&[("clay-1.html", &fixture("clay-1.html"))]);
        let out = tempfile::tempdir().unwrap();
        let first = out.path().join("first.csv");
        run(&p, &settings(), &opts(input.path(), first.clone())).unwrap();
        let table = read_prior(&p, &first).unwrap();
        let keys = table.keys();

        let candidates = table.rows.into_iter().map(|r| Candidate {
            fields: r.fields,
            provenance: r.provenance,
        });
        let again = merge(candidates, &p.key_fields, None).records;
        let again: std::collections::HashSet<String> = again.into_iter().map(|r| r.key).collect();
        assert_eq!(keys, again);
    }

    #[test]
    fn purge_after_export() {
        let p = Profile::builtin("clay").unwrap();
        let input = input_dir(&[(
            "clay-1.html",
            r#"<p>Amy Wong</p><a href="https://www.linkedin.com/in/amy-wong">x</a>"#,
        )]);
        let out = tempfile::tempdir().unwrap();
        let mut o = opts(input.path(), out.path().join("leads.csv"));
        o.purge = true;
        o.upload = true;
        let report = run(&p, &settings(), &o).unwrap();
        assert_eq!(report.purge.as_ref().map(|r| r.removed), Some(1));
        assert!(matches!(report.upload, Some(UploadStatus::Skipped(_))));
        assert!(!input.path().join("clay-1.html").exists());
    }

    #[test]
    fn fixtures_end_to_end() {
        let cases = [
            ("clay", "clay-1.html", 3),
            ("crunchbase", "crunchbase-1.html", 3),
            ("crunchbase-profile", "crunchbase-profile-acme.html", 1),
            ("g2", "g2-1.html", 2),
        ];
        for (profile, file, rows) in cases {
            let p = Profile::builtin(profile).unwrap();
            let report = inspect(&p, Path::new(&format!("tests/fixtures/{}", file)), StrategyMode::All)
                .unwrap();
            assert_eq!(report.table.len(), rows, "{}: {:?}", profile, report.table.keys());
        }
    }
}
