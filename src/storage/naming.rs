//! Filename handling for uploaded attachments.
//!
//! User-supplied names are never used as paths directly. They are reduced to a
//! safe ASCII form and prefixed with a unique token before touching disk.

/// Upper bound on a sanitized name, leaving room for the token prefix.
const MAX_NAME_LEN: usize = 200;

const FALLBACK_NAME: &str = "file";

const OCTET_STREAM: &str = "application/octet-stream";

/// Reduce a client filename to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    // Browsers on Windows may send the full client path.
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let joined = base.split_whitespace().collect::<Vec<_>>().join("_");
    let filtered: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();

    let trimmed = filtered.trim_matches(|c| c == '.' || c == '_');
    let truncated = &trimmed[..trimmed.len().min(MAX_NAME_LEN)];

    if truncated.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        truncated.to_string()
    }
}

/// Collision-resistant on-disk name: `<token>_<sanitized>`.
pub fn unique_name(sanitized: &str) -> String {
    format!("{}_{}", uuid::Uuid::now_v7().simple(), sanitized)
}

/// Whether a directory entry belongs to an attachment whose sanitized
/// original name is `sanitized`. Used for rows written before the stored
/// name was recorded.
pub fn matches_stored_name(candidate: &str, sanitized: &str) -> bool {
    candidate == sanitized
        || candidate
            .strip_suffix(sanitized)
            .is_some_and(|prefix| prefix.ends_with('_'))
}

/// MIME type for an attachment: the client's declared type when it is
/// specific, else a guess from the extension.
pub fn derive_mime_type(sanitized: &str, declared: Option<&str>) -> String {
    match declared.map(str::trim) {
        Some(ct) if !ct.is_empty() && ct != OCTET_STREAM => ct.to_string(),
        _ => mime_guess::from_path(sanitized)
            .first_or_octet_stream()
            .to_string(),
    }
}
