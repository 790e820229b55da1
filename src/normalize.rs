use crate::profile::{FieldKind, Profile};
use crate::record::Candidate;
use crate::text::{collapse_whitespace, decode_entities, strip_tags};

/// Cleans every field of a candidate in place. Never fails: a value that doesn't
/// survive cleaning or the acceptance filter is dropped.
pub fn normalize(profile: &Profile, mut candidate: Candidate) -> Candidate {
    let fields: Vec<String> = candidate.fields.keys().cloned().collect();
    for field in fields {
        let Some(raw) = candidate.get(&field) else {
            continue;
        };
        match clean_field(profile, &field, raw) {
            Some(v) => {
                candidate.set(&field, v);
            }
            None => candidate.clear(&field),
        }
    }
    split_name(profile, &mut candidate);
    candidate
}

pub fn clean_field(profile: &Profile, field: &str, raw: &str) -> Option<String> {
    let decoded = decode_entities(&strip_tags(raw));
    let cleaned = match profile.filter.kind(field) {
        FieldKind::Integer => digits(&decoded)?,
        FieldKind::Url => decoded.trim().to_string(),
        FieldKind::Text => {
            let collapsed = collapse_whitespace(&decoded);
            match &profile.strip_chars {
                Some(re) => collapse_whitespace(&re.replace_all(&collapsed, "")),
                None => collapsed,
            }
        }
    };
    profile.filter.accept(field, &cleaned)
}

/// "12,400 followers" → "12400". First run of digits, group separators allowed.
fn digits(s: &str) -> Option<String> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let run: String = s[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == ' ')
        .filter(char::is_ascii_digit)
        .collect();
    let trimmed = run.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0".into() } else { trimmed.to_string() })
}

fn split_name(profile: &Profile, candidate: &mut Candidate) {
    let Some(split) = &profile.name_split else {
        return;
    };
    if candidate.has(&split.first) && candidate.has(&split.last) {
        return;
    }
    let Some(full) = candidate.get(&split.full).map(str::to_string) else {
        return;
    };
    let Some((first, last)) = full.split_once(char::is_whitespace) else {
        return;
    };
    candidate.fill(&split.first, first.trim());
    candidate.fill(&split.last, last.trim());
}
