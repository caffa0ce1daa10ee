use crate::schema::types::{PROVIDER_ID_WIDTH, UNKNOWN_NAME, UNKNOWN_STATE};

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

/// Cell text, or `None` when the cell is missing or blank.
pub fn non_empty(cell: Option<&str>) -> Option<&str> {
    cell.map(clean_str).filter(|s| !s.is_empty())
}

/// Zero-padded positional id for rows without a usable identifier.
pub fn positional_id(row_idx: usize) -> String {
    format!("{:0width$}", row_idx, width = PROVIDER_ID_WIDTH)
}

/// `"15009.0"` → `"015009"`. Ids already wider than six characters are
/// returned unpadded and untruncated.
pub fn normalize_provider_id(raw: &str) -> String {
    let id = clean_str(raw);
    let id = id.strip_suffix(".0").unwrap_or(id);
    format!("{:0>width$}", id, width = PROVIDER_ID_WIDTH)
}

pub fn normalize_provider_name(raw: Option<&str>) -> String {
    non_empty(raw).unwrap_or(UNKNOWN_NAME).to_string()
}

/// Upper-cased two-letter code, anything else collapses to `"UNK"`.
pub fn normalize_state(raw: Option<&str>) -> String {
    match non_empty(raw) {
        Some(s) if s.len() == 2 && s.chars().all(|c| c.is_ascii_alphabetic()) => {
            s.to_ascii_uppercase()
        }
        _ => UNKNOWN_STATE.to_string(),
    }
}

/// Parse an hours cell. Blank, unparseable and non-finite values are absent.
pub fn parse_hours(raw: Option<&str>) -> Option<f64> {
    non_empty(raw)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
