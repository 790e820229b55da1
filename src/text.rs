use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]{1,6}|[0-9]{1,7});").unwrap());

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&#39;", "'"),
    ("&ndash;", "–"),
    ("&mdash;", "—"),
    ("&hellip;", "…"),
    ("&rsquo;", "'"),
    ("&lsquo;", "'"),
    ("&amp;", "&"),
];

/// Replace every tag with a space so adjacent cells don't fuse.
pub fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, " ").into_owned()
}

pub fn collapse_whitespace(s: &str) -> String {
    WS_RE.replace_all(s, " ").trim().to_string()
}

/// Decode the named entities snapshots actually contain plus any numeric entity.
/// `&amp;` goes last so `&amp;lt;` decodes once.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let numeric = NUMERIC_ENTITY_RE.replace_all(s, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    let mut out = numeric.into_owned();
    for (entity, replacement) in NAMED_ENTITIES {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    out
}

/// Markup-free, whitespace-collapsed view of an HTML fragment.
pub fn visible_text(html: &str) -> String {
    collapse_whitespace(&decode_entities(&strip_tags(html)))
}

/// `radius` bytes either side of `[start, end)`, snapped to char boundaries.
pub fn window(text: &str, start: usize, end: usize, radius: usize) -> &str {
    let mut lo = start.saturating_sub(radius);
    while lo > 0 && !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = end.saturating_add(radius).min(text.len());
    while hi < text.len() && !text.is_char_boundary(hi) {
        hi += 1;
    }
    &text[lo..hi]
}

/// First capture of `re` in `haystack` that `accept` keeps. Every participating
/// group is offered in order; patterns without groups offer the whole match.
pub fn first_accepted<F>(re: &Regex, haystack: &str, mut accept: F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    for caps in re.captures_iter(haystack) {
        if caps.len() == 1 {
            if let Some(v) = caps.get(0).and_then(|m| accept(m.as_str())) {
                return Some(v);
            }
            continue;
        }
        for group in caps.iter().skip(1).flatten() {
            if let Some(v) = accept(group.as_str()) {
                return Some(v);
            }
        }
    }
    None
}

/// Every accepted capture of `re`, in match order.
pub fn all_accepted<F>(re: &Regex, haystack: &str, mut accept: F) -> Vec<String>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = Vec::new();
    for caps in re.captures_iter(haystack) {
        let groups: Vec<_> = if caps.len() == 1 {
            caps.get(0).into_iter().collect()
        } else {
            caps.iter().skip(1).flatten().collect()
        };
        out.extend(groups.into_iter().filter_map(|g| accept(g.as_str())));
    }
    out
}
