/// Statement keywords allowed to reach a backend.
pub const READ_ONLY_KEYWORDS: [&str; 2] = ["SELECT", "WITH"];

pub const STATEMENT_SEPARATOR: char = ';';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementClass {
    ReadOnly,
    Rejected,
}

/// Splits a generated batch on the statement separator, trimming each
/// fragment and discarding empty ones. Order is preserved.
pub fn split_statements(batch: &str) -> Vec<String> {
    batch
        .trim()
        .split(STATEMENT_SEPARATOR)
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Classifies one statement by its leading keyword, case-insensitively and
/// ignoring leading whitespace. The keyword must end at a word boundary.
pub fn classify(statement: &str) -> StatementClass {
    let leading = statement.trim_start();
    let keyword_len = leading
        .char_indices()
        .find(|(_, ch)| !(ch.is_alphanumeric() || *ch == '_'))
        .map(|(index, _)| index)
        .unwrap_or(leading.len());
    let keyword = &leading[..keyword_len];

    if READ_ONLY_KEYWORDS.iter().any(|allowed| keyword.eq_ignore_ascii_case(allowed)) {
        StatementClass::ReadOnly
    } else {
        StatementClass::Rejected
    }
}

pub fn is_read_only(statement: &str) -> bool {
    classify(statement) == StatementClass::ReadOnly
}
