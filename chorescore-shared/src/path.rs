use percent_encoding::percent_decode_str;

use crate::api;

/// Extracts the family id from `/api/v1/family/{id}/...`.
/// Returns a percent-decoded owned [`String`].
pub fn family_id_from_path(path: &str) -> Option<String> {
    let prefix = format!("{}/family/", api::API_V1_PREFIX);
    let rest = path.strip_prefix(&prefix)?;
    let seg = rest.split('/').next()?;
    if seg.is_empty() {
        None
    } else {
        Some(decode_segment(seg))
    }
}

/// Percent-decodes one path segment.
pub fn decode_segment(seg: &str) -> String {
    percent_decode_str(seg).decode_utf8_lossy().to_string()
}

/// Path inside the family scope, e.g. `chores/abc/approve`.
pub fn family_relative(path: &str) -> Option<&str> {
    let prefix = format!("{}/family/", api::API_V1_PREFIX);
    let rest = path.strip_prefix(&prefix)?;
    let (_, tail) = rest.split_once('/')?;
    Some(tail.trim_end_matches('/'))
}
