use crate::application::MAX_HISTORY_PAGE;
use axum::http::header::HeaderMap;

pub(super) const SIGNATURE_HEADER: &str = "stripe-signature";

pub(super) fn signature_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub(super) fn clamp_page(limit: i64, offset: i64) -> (i64, i64) {
    (limit.clamp(1, MAX_HISTORY_PAGE), offset.max(0))
}

/// Admin grants arrive as free text; keep what lands in the ledger short.
pub(super) fn grant_reason(reason: Option<String>) -> String {
    reason
        .map(|r| r.trim().chars().take(200).collect::<String>())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "admin grant".to_string())
}
