use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::{inline_text, text_lines};
use crate::document::Document;
use crate::normalize::clean_field;
use crate::profile::{Cell, CompiledCell, Layout, Profile};
use crate::record::{Candidate, StrategyKind};
use crate::text::first_accepted;

/// Base for resolving relative redirect links before reading their query.
const RELATIVE_BASE: &str = "http://relative.invalid/";

/// Records from repeated page structure. For each layout the selectors are tried
/// in order and the first one whose elements yield records wins.
pub fn extract(profile: &Profile, doc: &Document, dom: &Html) -> Vec<Candidate> {
    let mut out = Vec::new();
    for layout in &profile.layouts {
        for (css, selector) in &layout.selectors {
            let rows: Vec<Candidate> = dom
                .select(selector)
                .filter_map(|el| row(profile, layout, doc, el))
                .collect();
            if rows.is_empty() {
                continue;
            }
            debug!(layout = %layout.name, selector = %css, rows = rows.len(), "layout matched");
            out.extend(rows);
            break;
        }
    }
    out
}

fn row(profile: &Profile, layout: &Layout, doc: &Document, el: ElementRef<'_>) -> Option<Candidate> {
    let mut c = Candidate::new(doc.provenance(StrategyKind::Layout));
    for cell in &layout.cells {
        if let Some(v) = cell_value(profile, cell, el) {
            c.set(&cell.field, v);
        }
    }
    let complete = layout.require.iter().all(|f| {
        c.get(f)
            .is_some_and(|v| clean_field(profile, f, v).is_some())
    });
    (complete && !c.is_empty()).then_some(c)
}

fn cell_value(profile: &Profile, cell: &Cell, el: ElementRef<'_>) -> Option<String> {
    match &cell.source {
        CompiledCell::Identifier => {
            let id = profile.identifier.as_ref()?;
            id.find_all(&el.html()).into_iter().next().map(|(_, c)| c)
        }
        CompiledCell::Name => {
            let text = inline_text(el);
            profile.name_patterns.iter().find_map(|re| {
                first_accepted(re, &text, |v| clean_field(profile, &cell.field, v))
            })
        }
        CompiledCell::Text { css, regex } => {
            let texts: Vec<String> = match css {
                Some(sel) => el.select(sel).map(inline_text).collect(),
                None => vec![inline_text(el)],
            };
            texts
                .iter()
                .filter(|t| !t.is_empty())
                .find_map(|t| narrow(regex.as_ref(), t))
        }
        CompiledCell::Attr {
            css,
            attr,
            regex,
            base_url,
        } => {
            let values: Vec<&str> = match css {
                Some(sel) => el.select(sel).filter_map(|e| e.value().attr(attr)).collect(),
                None => el.value().attr(attr).into_iter().collect(),
            };
            values
                .into_iter()
                .find_map(|v| narrow(regex.as_ref(), v))
                .map(|v| resolve(base_url.as_deref(), v))
        }
        CompiledCell::IconText { icon, css, regex } => {
            icon_containers(el, icon).find_map(|container| {
                let text = match css {
                    Some(sel) => container
                        .select(sel)
                        .map(inline_text)
                        .find(|t| !t.is_empty())?,
                    None => text_lines(container),
                };
                narrow(regex.as_ref(), &text)
            })
        }
        CompiledCell::IconLink {
            icon,
            css,
            contains,
            unwrap_param,
        } => icon_containers(el, icon).find_map(|container| {
            container
                .select(css)
                .filter_map(|a| a.value().attr("href"))
                .filter(|href| contains.as_deref().map_or(true, |n| href.contains(n)))
                .find_map(|href| match unwrap_param {
                    Some(param) => unwrap_query(href, param),
                    None => Some(href.to_string()),
                })
        }),
    }
}

/// Grandparent of every matching icon: the block holding its label and value.
fn icon_containers<'a>(
    el: ElementRef<'a>,
    icon: &'a Selector,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.select(icon).filter_map(|svg| {
        svg.parent()
            .and_then(|p| p.parent())
            .and_then(ElementRef::wrap)
    })
}

fn narrow(regex: Option<&Regex>, text: &str) -> Option<String> {
    match regex {
        Some(re) => first_accepted(re, text, |v| {
            let v = v.trim();
            (!v.is_empty()).then(|| v.to_string())
        }),
        None => {
            let v = text.trim();
            (!v.is_empty()).then(|| v.to_string())
        }
    }
}

fn resolve(base: Option<&str>, value: String) -> String {
    let Some(base) = base else {
        return value;
    };
    Url::parse(base)
        .and_then(|b| b.join(&value))
        .map(|u| u.to_string())
        .unwrap_or(value)
}

/// `/redirect?secure%5Burl%5D=https%3A%2F%2Fx.com` with `secure[url]` → `https://x.com`
fn unwrap_query(href: &str, param: &str) -> Option<String> {
    let url = Url::parse(href)
        .or_else(|_| Url::parse(RELATIVE_BASE).and_then(|b| b.join(href)))
        .ok()?;
    url.query_pairs()
        .find(|(k, _)| k == param)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}
