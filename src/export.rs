use std::fs::File;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Reader, Xlsx};
use indexmap::IndexMap;
use rust_xlsxwriter::{Format, Workbook};
use tracing::{info, warn};

use crate::error::{LeadError, Result};
use crate::merge::{merge, ResultTable, SOURCE_HEADER, STRATEGY_HEADER};
use crate::profile::Profile;
use crate::record::{Candidate, Provenance, StrategyKind};

const SHEET_NAME: &str = "Leads";

#[derive(Debug)]
pub struct Exported {
    pub path: PathBuf,
    /// The spreadsheet writer failed and CSV was written instead.
    pub fell_back: bool,
}

/// Writes `.csv` directly and anything else as `.xlsx`, falling back to CSV
/// at the same base name when the spreadsheet can't be written.
pub fn write_table(table: &ResultTable, path: &Path) -> Result<Exported> {
    if is_csv(path) {
        write_csv(table, path)?;
        return Ok(Exported {
            path: path.to_path_buf(),
            fell_back: false,
        });
    }

    let xlsx_err = match write_xlsx(table, path) {
        Ok(()) => {
            info!(path = %path.display(), rows = table.len(), "wrote spreadsheet");
            return Ok(Exported {
                path: path.to_path_buf(),
                fell_back: false,
            });
        }
        Err(e) => e,
    };

    let csv_path = path.with_extension("csv");
    warn!(path = %path.display(), error = %xlsx_err, fallback = %csv_path.display(), "spreadsheet export failed, writing CSV");
    match write_csv(table, &csv_path) {
        Ok(()) => Ok(Exported {
            path: csv_path,
            fell_back: true,
        }),
        Err(csv_err) => Err(LeadError::Export {
            path: path.to_path_buf(),
            reason: format!("xlsx: {}; csv: {}", xlsx_err, csv_err),
        }),
    }
}

fn write_xlsx(table: &ResultTable, path: &Path) -> Result<()> {
    let export_err = |e: rust_xlsxwriter::XlsxError| LeadError::Export {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME).map_err(export_err)?;

    for (col, header) in table.headers().into_iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, header, &bold)
            .map_err(export_err)?;
    }

    let integer_cols: Vec<bool> = table
        .columns
        .iter()
        .map(|c| c.integer)
        .chain([false, false])
        .collect();

    for (i, row) in table.rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, value) in table.cells(row).into_iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let c = col as u16;
            match value.parse::<f64>() {
                Ok(n) if integer_cols[col] => sheet.write_number(r, c, n),
                _ => sheet.write_string(r, c, value),
            }
            .map_err(export_err)?;
        }
    }

    workbook.save(path).map_err(export_err)?;
    Ok(())
}

fn write_csv(table: &ResultTable, path: &Path) -> Result<()> {
    let export_err = |e: csv::Error| LeadError::Export {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let mut wtr = csv::Writer::from_path(path).map_err(export_err)?;
    wtr.write_record(table.headers()).map_err(export_err)?;
    for row in &table.rows {
        wtr.write_record(table.cells(row)).map_err(export_err)?;
    }
    wtr.flush().map_err(|e| LeadError::io(path, e))?;
    info!(path = %path.display(), rows = table.len(), "wrote CSV");
    Ok(())
}

/// Reads a table this tool exported earlier back into merged form.
pub fn read_prior(profile: &Profile, path: &Path) -> Result<ResultTable> {
    let grid = if is_csv(path) {
        read_csv_grid(path)?
    } else {
        read_xlsx_grid(path)?
    };
    let mut rows = grid.into_iter();
    let Some(headers) = rows.next() else {
        return Ok(ResultTable::new(profile, Vec::new()));
    };

    let fields: Vec<Option<String>> = headers.iter().map(|h| header_field(profile, h)).collect();
    if !fields.iter().flatten().any(|f| profile.key_fields.contains(f)) {
        return Err(LeadError::Prior {
            path: path.to_path_buf(),
            reason: format!(
                "no key column ({}) in header",
                profile.key_fields.join(", ")
            ),
        });
    }

    let candidates = rows.map(|cells| {
        let mut document = String::new();
        let mut strategy = StrategyKind::Prior;
        let mut values = IndexMap::new();
        for (cell, field) in cells.into_iter().zip(&fields) {
            match field.as_deref() {
                Some(SOURCE_HEADER) => document = cell,
                Some(STRATEGY_HEADER) => {
                    strategy = StrategyKind::parse(&cell).unwrap_or(StrategyKind::Prior)
                }
                Some(f) if !cell.trim().is_empty() => {
                    values.insert(f.to_string(), cell);
                }
                _ => {}
            }
        }
        Candidate {
            fields: values,
            provenance: Provenance {
                ordinal: crate::document::parse_ordinal(&document),
                document,
                strategy,
            },
        }
    });

    let outcome = merge(candidates, &profile.key_fields, None);
    info!(path = %path.display(), rows = outcome.records.len(), "loaded prior table");
    Ok(ResultTable::new(profile, outcome.records))
}

/// Matches a header cell to a profile field by header text or field name.
fn header_field(profile: &Profile, header: &str) -> Option<String> {
    let header = header.trim();
    if header == SOURCE_HEADER || header == STRATEGY_HEADER {
        return Some(header.to_string());
    }
    profile
        .columns
        .iter()
        .find(|c| c.header.eq_ignore_ascii_case(header) || c.field.eq_ignore_ascii_case(header))
        .map(|c| c.field.clone())
}

fn read_csv_grid(path: &Path) -> Result<Vec<Vec<String>>> {
    let prior_err = |e: csv::Error| LeadError::Prior {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let file = File::open(path).map_err(|e| LeadError::io(path, e))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);
    rdr.records()
        .map(|r| {
            r.map(|rec| rec.iter().map(str::to_string).collect())
                .map_err(prior_err)
        })
        .collect()
}

fn read_xlsx_grid(path: &Path) -> Result<Vec<Vec<String>>> {
    let prior_err = |reason: String| LeadError::Prior {
        path: path.to_path_buf(),
        reason,
    };
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e: calamine::XlsxError| prior_err(e.to_string()))?;
    let Some((_, range)) = workbook.worksheets().into_iter().next() else {
        return Err(prior_err("workbook has no sheets".into()));
    };
    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect())
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(profile: &Profile) -> ResultTable {
        let mut a = Candidate::new(Provenance {
            document: "g2-1.html".into(),
            ordinal: Some(1),
            strategy: StrategyKind::Layout,
        });
        a.set("company_name", "Acme Corp");
        a.set("twitter_followers", "12400");
        a.set("hq_location", "Austin, TX");
        let mut b = a.clone();
        b.fields.clear();
        b.set("company_name", "Beta, \"Labs\"");
        let out = merge(vec![a, b], &profile.key_fields, None);
        ResultTable::new(profile, out.records)
    }

    #[test]
    fn csv_round_trip_keeps_rows() {
        let p = Profile::builtin("g2").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let written = write_table(&table(&p), &path).unwrap();
        assert!(!written.fell_back);

        let back = read_prior(&p, &path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.rows[0].get("twitter_followers"), Some("12400"));
        assert_eq!(back.rows[0].provenance.strategy, StrategyKind::Layout);
        assert_eq!(back.rows[1].get("company_name"), Some("Beta, \"Labs\""));
        assert_eq!(back.keys(), table(&p).keys());
    }

    #[test]
    fn xlsx_written_and_read_back() {
        let p = Profile::builtin("g2").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let written = write_table(&table(&p), &path).unwrap();
        assert_eq!(written.path, path);

        let back = read_prior(&p, &path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.rows[0].get("twitter_followers"), Some("12400"));
        assert_eq!(back.rows[0].get("hq_location"), Some("Austin, TX"));
        assert_eq!(back.rows[0].provenance.document, "g2-1.html");
    }

    #[test]
    fn falls_back_to_csv() {
        let p = Profile::builtin("g2").unwrap();
        let dir = tempfile::tempdir().unwrap();
        // a directory where the workbook should go makes the xlsx save fail
        let path = dir.path().join("blocked.xlsx");
        std::fs::create_dir(&path).unwrap();
        let written = write_table(&table(&p), &path).unwrap();
        assert!(written.fell_back);
        assert_eq!(written.path, dir.path().join("blocked.csv"));
        assert!(written.path.is_file());
    }

    #[test]
    fn prior_without_key_column_rejected() {
        let p = Profile::builtin("g2").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prior.csv");
        std::fs::write(&path, "foo,bar\n1,2\n").unwrap();
        assert!(matches!(read_prior(&p, &path), Err(LeadError::Prior { .. })));
    }
}
