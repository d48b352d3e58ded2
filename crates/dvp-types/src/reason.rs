//! Human-readable rejection reasons.

/// Cut `reason` to at most `max_chars` characters, on a char boundary.
#[must_use]
pub fn truncate_reason(reason: &str, max_chars: usize) -> String {
    match reason.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => reason[..byte_idx].to_string(),
        None => reason.to_string(),
    }
}
