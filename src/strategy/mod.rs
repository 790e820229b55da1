pub mod fallback;
pub mod identifier;
pub mod layout;
pub mod page_fields;
pub mod structured;

use itertools::Itertools;
use scraper::{ElementRef, Html};
use tracing::debug;

use crate::document::Document;
use crate::profile::Profile;
use crate::record::{Candidate, StrategyKind};
use crate::text::collapse_whitespace;

/// How the strategy outputs of one document are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StrategyMode {
    /// Run every strategy and concatenate.
    #[default]
    All,
    /// Stop at the first strategy that yields anything.
    FirstNonEmpty,
}

/// Candidates of one document plus how many each strategy produced.
#[derive(Debug, Default)]
pub struct Extraction {
    pub candidates: Vec<Candidate>,
    pub counts: Vec<(StrategyKind, usize)>,
}

impl Extraction {
    fn note(&mut self, kind: StrategyKind, found: usize) {
        debug!(strategy = %kind, found);
        self.counts.push((kind, found));
    }
}

/// Concatenation order in [`StrategyMode::All`]. Merging keeps the first value
/// per field, so sources that read fields directly come before the ones that
/// guess them from surrounding text.
const MERGE_ORDER: [StrategyKind; 4] = [
    StrategyKind::Structured,
    StrategyKind::Layout,
    StrategyKind::PageFields,
    StrategyKind::Identifier,
];

/// Runs the profile's strategies over one document, cheapest first. The
/// plain-text fallback only runs when everything else came back empty.
pub fn extract(profile: &Profile, doc: &Document, mode: StrategyMode) -> Extraction {
    let dom = Html::parse_document(&doc.html);
    let mut out = Extraction::default();

    let strategies: [(StrategyKind, &dyn Fn() -> Vec<Candidate>); 4] = [
        (StrategyKind::Identifier, &|| identifier::extract(profile, doc)),
        (StrategyKind::Structured, &|| structured::extract(profile, doc, &dom)),
        (StrategyKind::Layout, &|| layout::extract(profile, doc, &dom)),
        (StrategyKind::PageFields, &|| page_fields::extract(profile, doc, &dom)),
    ];
    let mut found: Vec<(StrategyKind, Vec<Candidate>)> = Vec::new();
    for (kind, run) in strategies {
        let candidates = run();
        let hit = !candidates.is_empty();
        found.push((kind, candidates));
        if mode == StrategyMode::FirstNonEmpty && hit {
            break;
        }
    }

    for (kind, candidates) in &found {
        out.note(*kind, candidates.len());
    }
    for kind in MERGE_ORDER {
        if let Some(i) = found.iter().position(|(k, _)| *k == kind) {
            out.candidates.append(&mut found[i].1);
        }
    }

    if out.candidates.is_empty() {
        let candidates = fallback::extract(profile, doc);
        out.note(StrategyKind::Fallback, candidates.len());
        out.candidates = candidates;
    }
    out
}

/// Visible text of an element, one trimmed line per text node. Script and
/// style bodies are skipped.
pub(crate) fn text_lines(el: ElementRef<'_>) -> String {
    el.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name()))
                .is_some_and(|name| matches!(name, "script" | "style" | "noscript"));
            if hidden {
                return None;
            }
            let line = collapse_whitespace(text);
            (!line.is_empty()).then_some(line)
        })
        .join("\n")
}

/// Visible text of an element on a single line.
pub(crate) fn inline_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().join(" "))
}
