//! Free-text normalization

use tracing::debug;

/// Longest stored text, in characters, including the ellipsis
pub const MAX_TEXT_CHARS: usize = 5000;

const ELLIPSIS: &str = "...";

/// Collapse whitespace runs to single spaces and cap the length.
///
/// Absent, empty and whitespace-only input all become `None`. Text longer
/// than [`MAX_TEXT_CHARS`] characters keeps its first 4997 characters
/// followed by `"..."`.
pub fn clean_text(text: Option<&str>) -> Option<String> {
    let cleaned = text?.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return None;
    }

    let char_count = cleaned.chars().count();
    if char_count <= MAX_TEXT_CHARS {
        return Some(cleaned);
    }

    let keep = MAX_TEXT_CHARS - ELLIPSIS.len();
    let cut = cleaned
        .char_indices()
        .nth(keep)
        .map_or(cleaned.len(), |(idx, _)| idx);

    let mut truncated = String::with_capacity(cut + ELLIPSIS.len());
    truncated.push_str(&cleaned[..cut]);
    truncated.push_str(ELLIPSIS);

    debug!(
        original_length = char_count,
        truncated_length = MAX_TEXT_CHARS,
        "Text truncated due to length"
    );

    Some(truncated)
}
