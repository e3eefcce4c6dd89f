use crate::rubric::Track;
use serde_json::Value;

/// Canonical form of an identifier that may have passed through a numeric
/// cell (`123.0`), picked up whitespace, or be missing entirely.
///
/// Only an all-zero fractional part is stripped; `100.5` stays `100.5`.
pub fn normalize_id(raw: &Value) -> String {
    match raw {
        Value::Null => String::new(),
        Value::String(s) => normalize_id_str(s),
        Value::Number(n) => normalize_id_str(&n.to_string()),
        Value::Bool(b) => normalize_id_str(&b.to_string()),
        // Arrays/objects are never identifiers.
        Value::Array(_) | Value::Object(_) => String::new(),
    }
}

pub fn normalize_id_str(raw: &str) -> String {
    let mut cur = raw;
    loop {
        let t = cur.trim();
        if is_null_like(t) {
            return String::new();
        }
        match strip_zero_fraction(t) {
            Some(stripped) => cur = stripped,
            None => return t.to_string(),
        }
    }
}

/// Canonical spelling of a subject id. Research subjects are student ids and
/// get [`normalize_id`]; design subjects are group names and are only
/// trimmed, so `"Phase 2.0"` and `"None"` stay as registered.
pub fn subject_id(track: Track, raw: &Value) -> String {
    match (track, raw) {
        (Track::Research, v) => normalize_id(v),
        (Track::Design, Value::String(s)) => s.trim().to_string(),
        (Track::Design, Value::Number(n)) => n.to_string(),
        (Track::Design, _) => String::new(),
    }
}

pub fn subject_id_str(track: Track, raw: &str) -> String {
    match track {
        Track::Research => normalize_id_str(raw),
        Track::Design => raw.trim().to_string(),
    }
}

/// Comparison key for subject ids. Group names match case-insensitively;
/// student ids match exactly after normalization.
pub fn subject_key(track: Track, raw: &str) -> String {
    match track {
        Track::Research => normalize_id_str(raw),
        Track::Design => raw.trim().to_ascii_lowercase(),
    }
}

fn is_null_like(s: &str) -> bool {
    s.is_empty()
        || s.eq_ignore_ascii_case("nan")
        || s.eq_ignore_ascii_case("none")
        || s.eq_ignore_ascii_case("null")
}

/// `"123.00"` -> `Some("123")`; `None` when there is no all-zero suffix or
/// nothing would remain in front of the dot.
fn strip_zero_fraction(s: &str) -> Option<&str> {
    let dot = s.rfind('.')?;
    let (head, frac) = (&s[..dot], &s[dot + 1..]);
    if head.is_empty() || frac.is_empty() || !frac.bytes().all(|b| b == b'0') {
        return None;
    }
    Some(head)
}
