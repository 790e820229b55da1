use crate::document::Document;
use crate::normalize::clean_field;
use crate::profile::{Identifier, Profile};
use crate::record::{Candidate, StrategyKind};
use crate::text::{first_accepted, visible_text, window};

/// One candidate per distinct identifier in the raw markup. Secondary fields
/// come from the text around every occurrence of that identifier.
pub fn extract(profile: &Profile, doc: &Document) -> Vec<Candidate> {
    let Some(id) = &profile.identifier else {
        return Vec::new();
    };

    id.find_all(&doc.html)
        .into_iter()
        .map(|(raw, canonical)| {
            let mut c = Candidate::new(doc.provenance(StrategyKind::Identifier));
            c.set(&id.field, canonical.as_str());
            if let Some(raw_field) = &id.raw_field {
                c.set(raw_field, raw.as_str());
            }

            let windows = context_windows(id, &doc.html, &canonical, id.window);
            for (field, patterns) in &id.fields {
                if let Some(v) = first_in_windows(profile, field, patterns, &windows) {
                    c.set(field, v);
                }
            }
            c
        })
        .collect()
}

/// Raw window around each occurrence of `canonical`, paired with its visible text.
pub(crate) fn context_windows<'a>(
    id: &Identifier,
    text: &'a str,
    canonical: &str,
    radius: usize,
) -> Vec<(&'a str, String)> {
    let wanted = canonical.to_lowercase();
    id.pattern
        .captures_iter(text)
        .filter(|caps| {
            caps.get(1)
                .and_then(|m| id.canonicalize(m.as_str()))
                .is_some_and(|c| c.to_lowercase() == wanted)
        })
        .filter_map(|caps| caps.get(0))
        .map(|m| {
            let raw = window(text, m.start(), m.end(), radius);
            (raw, visible_text(raw))
        })
        .collect()
}

/// Patterns in priority order; each is tried on every window, markup first
/// (attribute values, quoted strings) and then the visible text.
fn first_in_windows(
    profile: &Profile,
    field: &str,
    patterns: &[regex::Regex],
    windows: &[(&str, String)],
) -> Option<String> {
    patterns.iter().find_map(|re| {
        windows.iter().find_map(|(raw, visible)| {
            [*raw, visible.as_str()]
                .into_iter()
                .find_map(|hay| first_accepted(re, hay, |v| clean_field(profile, field, v)))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clay() -> Profile {
        Profile::builtin("clay").unwrap()
    }

    #[test]
    fn no_identifier_no_records() {
        let doc = Document::new("a.html", "<p>Jane Doe, VP Sales at Acme Inc</p>");
        assert!(extract(&clay(), &doc).is_empty());
    }

    #[test]
    fn identifier_with_nearby_name() {
        let doc = Document::new(
            "clay-1.html",
            r#"<div class="cell">Jane Doe</div>
               <a href="https://www.linkedin.com/in/jane-doe">profile</a>"#,
        );
        let found = extract(&clay(), &doc);
        assert_eq!(found.len(), 1);
        let c = &found[0];
        assert_eq!(
            c.get("linkedin_profile"),
            Some("https://www.linkedin.com/in/jane-doe/")
        );
        assert_eq!(c.get("full_name"), Some("Jane Doe"));
        assert_eq!(c.provenance.strategy, StrategyKind::Identifier);
        assert_eq!(c.provenance.ordinal, Some(1));
    }

    #[test]
    fn repeated_identifier_is_one_candidate() {
        let doc = Document::new(
            "clay-2.html",
            r#"<a href="https://www.linkedin.com/in/bob-stone/">Bob Stone</a>
               <a href="https://www.linkedin.com/in/bob-stone">again</a>"#,
        );
        let found = extract(&clay(), &doc);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn secondary_fields_from_any_occurrence() {
        let filler = "x".repeat(4000);
        let html = format!(
            r#"<a href="https://www.linkedin.com/in/amy-wong">Amy Wong</a>{}
               <span>Chief Technology Officer</span> <span>Senior Engineer</span>
               <a href="https://www.linkedin.com/in/amy-wong/">again</a>"#,
            filler
        );
        let found = extract(&clay(), &Document::new("clay-3.html", html));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("full_name"), Some("Amy Wong"));
        assert_eq!(found[0].get("job_title"), Some("Senior Engineer"));
    }

    #[test]
    fn raw_id_field() {
        let p = Profile::builtin("crunchbase").unwrap();
        let doc = Document::new(
            "cb-1.html",
            r#"<a title="Acme Robotics" href="https://www.crunchbase.com/organization/acme-robotics">x</a>"#,
        );
        let found = extract(&p, &doc);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("identifier"), Some("acme-robotics"));
        assert_eq!(
            found[0].get("url"),
            Some("https://www.crunchbase.com/organization/acme-robotics")
        );
        assert_eq!(found[0].get("name"), Some("Acme Robotics"));
    }
}
