use super::identifier::context_windows;
use crate::document::Document;
use crate::normalize::clean_field;
use crate::profile::Profile;
use crate::record::{Candidate, StrategyKind};
use crate::text::{first_accepted, visible_text};

/// Last resort over the tag-stripped text: identifiers that are visible on the
/// page, each with a name guessed from the words around it.
pub fn extract(profile: &Profile, doc: &Document) -> Vec<Candidate> {
    let (Some(def), Some(id)) = (&profile.fallback, &profile.identifier) else {
        return Vec::new();
    };
    let text = visible_text(&doc.html);

    id.find_all(&text)
        .into_iter()
        .map(|(raw, canonical)| {
            let mut c = Candidate::new(doc.provenance(StrategyKind::Fallback));
            c.set(&id.field, canonical.as_str());
            if let Some(raw_field) = &id.raw_field {
                c.set(raw_field, raw.as_str());
            }
            if let Some(name_field) = &profile.name_field {
                let windows = context_windows(id, &text, &canonical, def.window);
                let name = profile.name_patterns.iter().find_map(|re| {
                    windows.iter().find_map(|(chunk, _)| {
                        first_accepted(re, chunk, |v| clean_field(profile, name_field, v))
                    })
                });
                if let Some(name) = name {
                    c.set(name_field, name);
                }
            }
            c
        })
        .collect()
}
