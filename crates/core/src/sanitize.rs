//! Extraction of a bare SQL statement from free-form model output.
//!
//! This is a layered textual heuristic, not a parser: fenced block first,
//! then dialect keyword stripping, then removal of truncated dialect residue
//! at the start of the string.

use once_cell::sync::Lazy;
use regex::Regex;

static FENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)```(?:sqlite|postgresql|postgres|sql)?(.*?)```").expect("valid fence regex")
});

static DIALECT_WORD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(sqlite|postgresql|sql)\b").expect("valid dialect regex")
});

static DIALECT_RESIDUE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:ite|lite|qlite|sqlite)\s*[:\-]*|:)\s*").expect("valid residue regex")
});

/// Returns the trimmed SQL carried by `raw`, or an empty string when nothing
/// usable is present.
pub fn clean_sql(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let sql = match FENCE_REGEX.captures(raw).and_then(|captures| captures.get(1)) {
        Some(block) => block.as_str().trim().to_string(),
        None => {
            let stripped = DIALECT_WORD_REGEX.replace_all(raw, "");
            stripped.trim().trim_matches('`').trim().to_string()
        }
    };

    DIALECT_RESIDUE_REGEX.replace(&sql, "").into_owned()
}

/// Optional-input convenience wrapper: `None` sanitizes to an empty string.
pub fn clean_sql_opt(raw: Option<&str>) -> String {
    raw.map(clean_sql).unwrap_or_default()
}
