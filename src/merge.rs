use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::profile::Profile;
use crate::record::{Candidate, Provenance};

/// Union of every candidate sharing one key. Field order is first-seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedRecord {
    pub key: String,
    pub fields: IndexMap<String, String>,
    pub provenance: Provenance,
}

impl MergedRecord {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub records: Vec<MergedRecord>,
    /// Candidates dropped because no key field had a value.
    pub keyless: usize,
    /// Candidates dropped because their key was already known.
    pub known: usize,
}

/// Groups candidates by key in first-seen order. The first non-empty value of a
/// field wins and is never overwritten. Keys in `known` are left out.
pub fn merge<I>(candidates: I, key_fields: &[String], known: Option<&HashSet<String>>) -> MergeOutcome
where
    I: IntoIterator<Item = Candidate>,
{
    let mut groups: IndexMap<String, MergedRecord> = IndexMap::new();
    let mut outcome = MergeOutcome::default();

    for candidate in candidates {
        let Some(key) = candidate.key(key_fields) else {
            debug!(document = %candidate.provenance.document, strategy = %candidate.provenance.strategy, "dropping candidate without key");
            outcome.keyless += 1;
            continue;
        };
        if known.is_some_and(|k| k.contains(&key)) {
            outcome.known += 1;
            continue;
        }
        match groups.get_mut(&key) {
            Some(record) => {
                for (field, value) in candidate.fields {
                    record.fields.entry(field).or_insert(value);
                }
            }
            None => {
                groups.insert(
                    key.clone(),
                    MergedRecord {
                        key,
                        fields: candidate.fields,
                        provenance: candidate.provenance,
                    },
                );
            }
        }
    }

    outcome.records = groups.into_values().collect();
    outcome
}

pub struct Column {
    pub field: String,
    pub header: String,
    pub integer: bool,
}

pub const SOURCE_HEADER: &str = "source_document";
pub const STRATEGY_HEADER: &str = "strategy";

/// Merged records in export order with the profile's columns.
pub struct ResultTable {
    pub columns: Vec<Column>,
    pub rows: Vec<MergedRecord>,
}

impl ResultTable {
    pub fn new(profile: &Profile, rows: Vec<MergedRecord>) -> Self {
        let columns = profile
            .columns
            .iter()
            .map(|c| Column {
                field: c.field.clone(),
                header: c.header.clone(),
                integer: profile.is_integer(&c.field),
            })
            .collect();
        ResultTable { columns, rows }
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.header.as_str())
            .chain([SOURCE_HEADER, STRATEGY_HEADER])
            .collect()
    }

    /// Cell values of one row, empty where the field is absent.
    pub fn cells<'a>(&self, row: &'a MergedRecord) -> Vec<&'a str> {
        self.columns
            .iter()
            .map(|c| row.get(&c.field).unwrap_or(""))
            .chain([row.provenance.document.as_str(), row.provenance.strategy.as_str()])
            .collect()
    }

    pub fn keys(&self) -> HashSet<String> {
        self.rows.iter().map(|r| r.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StrategyKind;

    fn keys() -> Vec<String> {
        vec!["linkedin".to_string(), "name".to_string()]
    }

    fn cand(doc: &str, fields: &[(&str, &str)]) -> Candidate {
        let mut c = Candidate::new(Provenance {
            document: doc.into(),
            ordinal: None,
            strategy: StrategyKind::Layout,
        });
        for (k, v) in fields {
            c.set(k, *v);
        }
        c
    }

    #[test]
    fn disjoint_fields_union() {
        let out = merge(
            vec![
                cand("a.html", &[("linkedin", "https://www.linkedin.com/in/jane/"), ("name", "Jane Doe")]),
                cand("b.html", &[("linkedin", "https://www.linkedin.com/in/Jane"), ("title", "CEO")]),
            ],
            &keys(),
            None,
        );
        assert_eq!(out.records.len(), 1);
        let r = &out.records[0];
        assert_eq!(r.key, "jane");
        assert_eq!(r.get("name"), Some("Jane Doe"));
        assert_eq!(r.get("title"), Some("CEO"));
        assert_eq!(r.provenance.document, "a.html");
    }

    #[test]
    fn first_value_wins() {
        let out = merge(
            vec![
                cand("a.html", &[("name", "Acme"), ("city", "Austin")]),
                cand("b.html", &[("name", "ACME"), ("city", "Boston")]),
            ],
            &keys(),
            None,
        );
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].get("city"), Some("Austin"));
        assert_eq!(out.records[0].get("name"), Some("Acme"));
    }

    #[test]
    fn keyless_dropped() {
        let out = merge(vec![cand("a.html", &[("title", "CEO")])], &keys(), None);
        assert!(out.records.is_empty());
        assert_eq!(out.keyless, 1);
    }

    #[test]
    fn known_keys_excluded() {
        let known: HashSet<String> = ["abc".to_string()].into();
        let out = merge(
            vec![
                cand("new.html", &[("name", "abc"), ("title", "CTO")]),
                cand("new.html", &[("name", "xyz")]),
            ],
            &keys(),
            Some(&known),
        );
        assert_eq!(out.known, 1);
        let got: Vec<_> = out.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(got, vec!["xyz"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let input = vec![
            cand("a.html", &[("name", "Jane Doe"), ("title", "CEO")]),
            cand("b.html", &[("name", "jane  doe"), ("city", "Paris")]),
            cand("b.html", &[("name", "Bob Stone")]),
        ];
        let once = merge(input, &keys(), None).records;
        let again = merge(
            once.iter().cloned().map(|r| Candidate {
                fields: r.fields,
                provenance: r.provenance,
            }),
            &keys(),
            None,
        )
        .records;
        assert_eq!(once, again);
    }

    #[test]
    fn key_set_independent_of_order() {
        let input = vec![
            cand("a.html", &[("name", "Jane Doe")]),
            cand("b.html", &[("linkedin", "/in/bob-stone/")]),
            cand("c.html", &[("name", "Amy Wong")]),
            cand("d.html", &[("name", "JANE DOE")]),
        ];
        let mut reversed = input.clone();
        reversed.reverse();
        let a: HashSet<String> = merge(input, &keys(), None).records.into_iter().map(|r| r.key).collect();
        let b: HashSet<String> = merge(reversed, &keys(), None).records.into_iter().map(|r| r.key).collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn table_cells_follow_columns() {
        let p = Profile::builtin("crunchbase").unwrap();
        let out = merge(
            vec![cand("cb-1.html", &[("url", "https://x.io"), ("name", "Acme Robotics")])],
            &p.key_fields,
            None,
        );
        let table = ResultTable::new(&p, out.records);
        assert_eq!(table.headers(), vec!["Name", "Identifier", "URL", "source_document", "strategy"]);
        assert_eq!(
            table.cells(&table.rows[0]),
            vec!["Acme Robotics", "", "https://x.io", "cb-1.html", "layout"]
        );
        assert_eq!(table.keys(), ["acme robotics".to_string()].into());
    }
}
