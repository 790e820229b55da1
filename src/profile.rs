use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use scraper::Selector;
use serde::Deserialize;

use crate::error::{LeadError, Result};
use crate::filter::AcceptanceFilter;

const BUILTIN: &[(&str, &str)] = &[
    ("clay", include_str!("../profiles/clay.json")),
    ("crunchbase", include_str!("../profiles/crunchbase.json")),
    ("crunchbase-profile", include_str!("../profiles/crunchbase-profile.json")),
    ("g2", include_str!("../profiles/g2.json")),
];

// ── On-disk shape ──

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub columns: Vec<ColumnDef>,
    pub key_fields: Vec<String>,
    #[serde(default)]
    pub fields: HashMap<String, FieldRule>,
    #[serde(default)]
    pub stoplist: Vec<String>,
    #[serde(default)]
    pub reject_patterns: Vec<String>,
    /// Characters matching this class are stripped during normalization.
    #[serde(default)]
    pub strip_chars: Option<String>,
    #[serde(default)]
    pub name_split: Option<NameSplit>,
    #[serde(default)]
    pub name_patterns: Vec<String>,
    #[serde(default)]
    pub identifier: Option<IdentifierDef>,
    #[serde(default)]
    pub structured: Option<StructuredDef>,
    #[serde(default)]
    pub layouts: Vec<LayoutDef>,
    #[serde(default)]
    pub page_fields: Vec<PageFieldDef>,
    #[serde(default)]
    pub fallback: Option<FallbackRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnDef {
    pub field: String,
    pub header: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Integer,
    Url,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldRule {
    #[serde(default)]
    pub min: Option<usize>,
    #[serde(default)]
    pub max: Option<usize>,
    #[serde(default)]
    pub stoplist: Vec<String>,
    #[serde(default)]
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NameSplit {
    pub full: String,
    pub first: String,
    pub last: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentifierDef {
    pub field: String,
    /// Also store the bare id (capture group 1) under this field.
    #[serde(default)]
    pub raw_field: Option<String>,
    pub pattern: String,
    /// `{id}` is replaced with capture group 1.
    pub canonical: String,
    #[serde(default = "default_id_min")]
    pub min_len: usize,
    #[serde(default = "default_id_max")]
    pub max_len: usize,
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default)]
    pub fields: Vec<FieldPatterns>,
}

fn default_id_min() -> usize {
    2
}

fn default_id_max() -> usize {
    100
}

fn default_window() -> usize {
    3000
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldPatterns {
    pub field: String,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StructuredDef {
    #[serde(default)]
    pub json_ld: bool,
    #[serde(default)]
    pub fragment_anchors: Vec<String>,
    #[serde(default)]
    pub capture_patterns: Vec<String>,
    #[serde(default)]
    pub object_fields: HashMap<String, String>,
    #[serde(default)]
    pub object_requires: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayoutDef {
    pub name: String,
    pub selectors: Vec<String>,
    #[serde(default)]
    pub require: Vec<String>,
    pub cells: Vec<CellDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CellDef {
    pub field: String,
    pub source: CellSource,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CellSource {
    Identifier,
    Name,
    Text {
        #[serde(default)]
        css: Option<String>,
        #[serde(default)]
        regex: Option<String>,
    },
    Attr {
        #[serde(default)]
        css: Option<String>,
        attr: String,
        #[serde(default)]
        regex: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
    },
    IconText {
        icon: String,
        #[serde(default)]
        css: Option<String>,
        #[serde(default)]
        regex: Option<String>,
    },
    IconLink {
        icon: String,
        #[serde(default = "default_link_css")]
        css: String,
        #[serde(default)]
        contains: Option<String>,
        #[serde(default)]
        unwrap_param: Option<String>,
    },
}

fn default_link_css() -> String {
    "a[href]".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageFieldDef {
    pub field: String,
    pub sources: Vec<PageSource>,
    #[serde(default)]
    pub collect: Option<CollectRule>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageSource {
    Selector {
        css: String,
        #[serde(default)]
        attr: Option<String>,
        #[serde(default)]
        regex: Option<String>,
    },
    Pattern { regex: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectRule {
    pub limit: usize,
    pub separator: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FallbackRule {
    #[serde(default = "default_fallback_window")]
    pub window: usize,
}

fn default_fallback_window() -> usize {
    500
}

// ── Compiled form ──

pub struct Profile {
    pub name: String,
    pub description: String,
    pub columns: Vec<ColumnDef>,
    pub key_fields: Vec<String>,
    pub filter: AcceptanceFilter,
    pub strip_chars: Option<Regex>,
    pub name_split: Option<NameSplit>,
    pub name_field: Option<String>,
    pub name_patterns: Vec<Regex>,
    pub identifier: Option<Identifier>,
    pub structured: Option<Structured>,
    pub layouts: Vec<Layout>,
    pub page_fields: Vec<PageField>,
    pub fallback: Option<FallbackRule>,
}

pub struct Identifier {
    pub field: String,
    pub raw_field: Option<String>,
    pub pattern: Regex,
    pub canonical: String,
    pub min_len: usize,
    pub max_len: usize,
    pub window: usize,
    pub fields: Vec<(String, Vec<Regex>)>,
}

impl Identifier {
    /// Canonical form of a raw id, or `None` when the id is out of bounds.
    pub fn canonicalize(&self, id: &str) -> Option<String> {
        let len = id.chars().count();
        if id.is_empty() || len < self.min_len || len > self.max_len {
            return None;
        }
        Some(self.canonical.replace("{id}", id))
    }

    /// Distinct ids in first-seen order, paired with their canonical form.
    pub fn find_all(&self, text: &str) -> Vec<(String, String)> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for caps in self.pattern.captures_iter(text) {
            let Some(id) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            let Some(canonical) = self.canonicalize(id) else {
                continue;
            };
            if seen.insert(canonical.to_lowercase()) {
                out.push((id.to_string(), canonical));
            }
        }
        out
    }
}

pub struct Structured {
    pub json_ld: bool,
    pub fragment_anchors: Vec<Regex>,
    pub capture_patterns: Vec<Regex>,
    pub object_fields: Vec<(String, String)>,
    pub object_requires: Vec<String>,
}

pub struct Layout {
    pub name: String,
    pub selectors: Vec<(String, Selector)>,
    pub require: Vec<String>,
    pub cells: Vec<Cell>,
}

pub struct Cell {
    pub field: String,
    pub source: CompiledCell,
}

pub enum CompiledCell {
    Identifier,
    Name,
    Text {
        css: Option<Selector>,
        regex: Option<Regex>,
    },
    Attr {
        css: Option<Selector>,
        attr: String,
        regex: Option<Regex>,
        base_url: Option<String>,
    },
    IconText {
        icon: Selector,
        css: Option<Selector>,
        regex: Option<Regex>,
    },
    IconLink {
        icon: Selector,
        css: Selector,
        contains: Option<String>,
        unwrap_param: Option<String>,
    },
}

pub struct PageField {
    pub field: String,
    pub sources: Vec<CompiledPageSource>,
    pub collect: Option<CollectRule>,
}

pub enum CompiledPageSource {
    Selector {
        css: Selector,
        attr: Option<String>,
        regex: Option<Regex>,
    },
    Pattern(Regex),
}

impl Profile {
    pub fn builtin(name: &str) -> Result<Profile> {
        let (_, raw) = BUILTIN
            .iter()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| LeadError::Profile {
                name: name.to_string(),
                reason: format!(
                    "unknown built-in profile (known: {})",
                    builtin_names().join(", ")
                ),
            })?;
        Profile::from_json(raw)
    }

    /// `<dir>/<name>.json` when a profile directory is configured and holds one,
    /// otherwise the built-in of that name.
    pub fn resolve(name: &str, dir: Option<&Path>) -> Result<Profile> {
        let local = dir
            .map(|d| d.join(format!("{}.json", name)))
            .filter(|p| p.is_file());
        match local {
            Some(path) => Profile::from_file(&path),
            None => Profile::builtin(name),
        }
    }

    pub fn from_file(path: &Path) -> Result<Profile> {
        let raw = std::fs::read_to_string(path).map_err(|e| LeadError::io(path, e))?;
        Profile::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Profile> {
        let def: ProfileDef = serde_json::from_str(raw)?;
        Profile::compile(def)
    }

    pub fn compile(def: ProfileDef) -> Result<Profile> {
        if def.columns.is_empty() || def.key_fields.is_empty() {
            return Err(LeadError::Profile {
                name: def.name,
                reason: "columns and key_fields must not be empty".into(),
            });
        }
        for key in &def.key_fields {
            if !def.columns.iter().any(|c| &c.field == key) {
                return Err(LeadError::Profile {
                    name: def.name.clone(),
                    reason: format!("key field `{}` is not a column", key),
                });
            }
        }

        let reject = compile_all(&def.reject_patterns)?;
        let filter = AcceptanceFilter::new(def.fields.clone(), &def.stoplist, reject);

        let identifier = def
            .identifier
            .map(|id| -> Result<Identifier> {
                let fields = id
                    .fields
                    .iter()
                    .map(|f| Ok((f.field.clone(), compile_all(&f.patterns)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Identifier {
                    field: id.field,
                    raw_field: id.raw_field,
                    pattern: compile(&id.pattern)?,
                    canonical: id.canonical,
                    min_len: id.min_len,
                    max_len: id.max_len,
                    window: id.window,
                    fields,
                })
            })
            .transpose()?;

        let structured = def
            .structured
            .map(|s| -> Result<Structured> {
                let mut object_fields: Vec<(String, String)> =
                    s.object_fields.into_iter().collect();
                object_fields.sort();
                Ok(Structured {
                    json_ld: s.json_ld,
                    fragment_anchors: compile_all(&s.fragment_anchors)?,
                    capture_patterns: compile_all(&s.capture_patterns)?,
                    object_fields,
                    object_requires: s.object_requires,
                })
            })
            .transpose()?;

        let layouts = def
            .layouts
            .into_iter()
            .map(compile_layout)
            .collect::<Result<Vec<_>>>()?;

        let page_fields = def
            .page_fields
            .into_iter()
            .map(|pf| -> Result<PageField> {
                let sources = pf
                    .sources
                    .iter()
                    .map(|s| match s {
                        PageSource::Selector { css, attr, regex } => {
                            Ok(CompiledPageSource::Selector {
                                css: select(css)?,
                                attr: attr.clone(),
                                regex: compile_opt(regex.as_deref())?,
                            })
                        }
                        PageSource::Pattern { regex } => {
                            Ok(CompiledPageSource::Pattern(compile(regex)?))
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(PageField {
                    field: pf.field,
                    sources,
                    collect: pf.collect,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let name_field = def.name_split.as_ref().map(|s| s.full.clone());

        Ok(Profile {
            name: def.name,
            description: def.description,
            columns: def.columns,
            key_fields: def.key_fields,
            filter,
            strip_chars: compile_opt(def.strip_chars.as_deref())?,
            name_split: def.name_split,
            name_field,
            name_patterns: compile_all(&def.name_patterns)?,
            identifier,
            structured,
            layouts,
            page_fields,
            fallback: def.fallback,
        })
    }

    pub fn is_integer(&self, field: &str) -> bool {
        self.filter.is_integer(field)
    }
}

fn compile_layout(def: LayoutDef) -> Result<Layout> {
    let selectors = def
        .selectors
        .iter()
        .map(|css| Ok((css.clone(), select(css)?)))
        .collect::<Result<Vec<_>>>()?;
    let cells = def
        .cells
        .into_iter()
        .map(|c| -> Result<Cell> {
            let source = match c.source {
                CellSource::Identifier => CompiledCell::Identifier,
                CellSource::Name => CompiledCell::Name,
                CellSource::Text { css, regex } => CompiledCell::Text {
                    css: css.as_deref().map(select).transpose()?,
                    regex: compile_opt(regex.as_deref())?,
                },
                CellSource::Attr {
                    css,
                    attr,
                    regex,
                    base_url,
                } => CompiledCell::Attr {
                    css: css.as_deref().map(select).transpose()?,
                    attr,
                    regex: compile_opt(regex.as_deref())?,
                    base_url,
                },
                CellSource::IconText { icon, css, regex } => CompiledCell::IconText {
                    icon: icon_selector(&icon)?,
                    css: css.as_deref().map(select).transpose()?,
                    regex: compile_opt(regex.as_deref())?,
                },
                CellSource::IconLink {
                    icon,
                    css,
                    contains,
                    unwrap_param,
                } => CompiledCell::IconLink {
                    icon: icon_selector(&icon)?,
                    css: select(&css)?,
                    contains,
                    unwrap_param,
                },
            };
            Ok(Cell {
                field: c.field,
                source,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Layout {
        name: def.name,
        selectors,
        require: def.require,
        cells,
    })
}

pub fn builtin_names() -> Vec<&'static str> {
    BUILTIN.iter().map(|(n, _)| *n).collect()
}

pub fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| LeadError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}

fn compile_opt(pattern: Option<&str>) -> Result<Option<Regex>> {
    pattern.map(compile).transpose()
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| compile(p)).collect()
}

pub fn select(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| LeadError::Selector {
        css: css.to_string(),
        reason: e.to_string(),
    })
}

/// `icon-location` → `svg[class*="icon-location"]`
fn icon_selector(icon: &str) -> Result<Selector> {
    select(&format!("svg[class*=\"{}\"]", icon))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_compile() {
        for name in builtin_names() {
            let p = Profile::builtin(name).unwrap_or_else(|e| panic!("{}: {}", name, e));
            assert_eq!(p.name, name);
            assert!(!p.columns.is_empty());
        }
    }

    #[test]
    fn unknown_builtin() {
        assert!(matches!(
            Profile::builtin("linkedin"),
            Err(LeadError::Profile { .. })
        ));
    }

    #[test]
    fn key_field_must_be_column() {
        let raw = r#"{
            "name": "broken",
            "columns": [{"field": "name", "header": "Name"}],
            "key_fields": ["url"]
        }"#;
        assert!(matches!(
            Profile::from_json(raw),
            Err(LeadError::Profile { .. })
        ));
    }

    #[test]
    fn bad_regex_reported() {
        let raw = r#"{
            "name": "broken",
            "columns": [{"field": "name", "header": "Name"}],
            "key_fields": ["name"],
            "name_patterns": ["([A-Z"]
        }"#;
        assert!(matches!(Profile::from_json(raw), Err(LeadError::Regex { .. })));
    }

    #[test]
    fn profile_dir_shadows_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("g2.json"),
            r#"{"name": "g2-local", "columns": [{"field": "name", "header": "Name"}], "key_fields": ["name"]}"#,
        )
        .unwrap();
        let p = Profile::resolve("g2", Some(dir.path())).unwrap();
        assert_eq!(p.name, "g2-local");
        let p = Profile::resolve("clay", Some(dir.path())).unwrap();
        assert_eq!(p.name, "clay");
    }

    #[test]
    fn identifier_bounds() {
        let p = Profile::builtin("clay").unwrap();
        let id = p.identifier.as_ref().unwrap();
        assert_eq!(
            id.canonicalize("jane-doe").as_deref(),
            Some("https://www.linkedin.com/in/jane-doe/")
        );
        assert!(id.canonicalize("").is_none());
        assert!(id.canonicalize(&"x".repeat(id.max_len + 1)).is_none());
    }

    #[test]
    fn identifier_dedups_in_order() {
        let p = Profile::builtin("clay").unwrap();
        let id = p.identifier.as_ref().unwrap();
        let text = "https://www.linkedin.com/in/bob/ https://www.linkedin.com/in/amy \
                    https://www.linkedin.com/in/bob";
        let found: Vec<String> = id.find_all(text).into_iter().map(|(i, _)| i).collect();
        assert_eq!(found, vec!["bob", "amy"]);
    }
}
