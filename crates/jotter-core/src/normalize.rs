//! Canonical keys for user-facing names.
//!
//! Tag and metric names are stored twice: a normalized key used for per-user
//! uniqueness and lookups, and the display string the user typed. Every call
//! site (API handlers, the tag merge routine, the tagging pipeline) goes
//! through these two functions so "Heart Rate", "heart-rate" and
//! " HEART  rate " all land on the same row.

/// Canonical lookup key for a tag or metric name.
///
/// Lowercases, trims, collapses each run of non-alphanumeric characters to a
/// single `_` and strips leading/trailing `_`. Returns `None` when nothing
/// alphanumeric remains.
pub fn normalize_name(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;

    for ch in raw.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Human-facing form: trimmed, internal whitespace collapsed to single spaces.
pub fn display_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a batch of candidate names, dropping empties and duplicates.
///
/// Returns `(normalized, display)` pairs in first-seen order. When two
/// candidates share a key the first display string wins.
pub fn normalize_all<I, S>(candidates: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for candidate in candidates {
        let raw = candidate.as_ref();
        if let Some(key) = normalize_name(raw) {
            if seen.insert(key.clone()) {
                out.push((key, display_name(raw)));
            }
        }
    }
    out
}
