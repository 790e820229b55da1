use std::collections::BTreeSet;

use scraper::Html;

use super::{inline_text, text_lines};
use crate::document::Document;
use crate::normalize::clean_field;
use crate::profile::{CompiledPageSource, PageField, Profile};
use crate::record::{Candidate, StrategyKind};
use crate::text::all_accepted;

/// A single record describing the whole page. Each field takes the first
/// accepted value from its sources, or collects all of them.
pub fn extract(profile: &Profile, doc: &Document, dom: &Html) -> Vec<Candidate> {
    if profile.page_fields.is_empty() {
        return Vec::new();
    }
    let text = text_lines(dom.root_element());
    let mut c = Candidate::new(doc.provenance(StrategyKind::PageFields));

    for pf in &profile.page_fields {
        let value = match &pf.collect {
            None => pf
                .sources
                .iter()
                .find_map(|src| values(profile, pf, src, dom, &text).into_iter().next()),
            Some(def) => {
                let all: BTreeSet<String> = pf
                    .sources
                    .iter()
                    .flat_map(|src| values(profile, pf, src, dom, &text))
                    .collect();
                let joined = all
                    .into_iter()
                    .take(def.limit)
                    .collect::<Vec<_>>()
                    .join(&def.separator);
                (!joined.is_empty()).then_some(joined)
            }
        };
        if let Some(v) = value {
            c.set(&pf.field, v);
        }
    }

    if c.is_empty() {
        Vec::new()
    } else {
        vec![c]
    }
}

fn values(
    profile: &Profile,
    pf: &PageField,
    source: &CompiledPageSource,
    dom: &Html,
    text: &str,
) -> Vec<String> {
    let accept = |v: &str| clean_field(profile, &pf.field, v);
    match source {
        CompiledPageSource::Selector { css, attr, regex } => dom
            .select(css)
            .filter_map(|el| match attr {
                Some(a) => el.value().attr(a).map(str::to_string),
                None => Some(inline_text(el)),
            })
            .flat_map(|raw| match regex {
                Some(re) => all_accepted(re, &raw, accept),
                None => accept(&raw).into_iter().collect(),
            })
            .collect(),
        CompiledPageSource::Pattern(re) => all_accepted(re, text, accept),
    }
}
