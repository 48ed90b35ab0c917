use std::collections::HashSet;
use std::sync::LazyLock;
use regex::Regex;
use crate::domain::models::HeaderSet;

pub const UNNAMED_COLUMN: &str = "col_unnamed";
pub const DIGIT_PREFIX: &str = "col_";

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Alphabetic}\p{N}]").expect("static regex"));

pub fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return UNNAMED_COLUMN.to_string();
    }

    let lowered = trimmed.to_lowercase();
    let clean = NON_ALNUM.replace_all(&lowered, "_").into_owned();

    if clean.starts_with(|c: char| c.is_numeric()) {
        format!("{}{}", DIGIT_PREFIX, clean)
    } else {
        clean
    }
}

/// Normalizes every header and disambiguates collisions with the column index.
pub fn normalize_headers<S: AsRef<str>>(raw: &[S]) -> HeaderSet {
    let mut seen = HashSet::with_capacity(raw.len());
    let mut columns = Vec::with_capacity(raw.len());

    for (i, header) in raw.iter().enumerate() {
        let mut clean = normalize_header(header.as_ref());
        while seen.contains(&clean) {
            clean = format!("{}_{}", clean, i);
        }
        seen.insert(clean.clone());
        columns.push(clean);
    }

    HeaderSet::from_normalized(columns)
}
