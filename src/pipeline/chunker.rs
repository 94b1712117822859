//! Character-window chunking of page text.
//!
//! Windows are counted in Unicode scalar values, not bytes or tokens, so a
//! window may end mid-word. The extraction model tolerates that, and the
//! overlap carries the cut sentence into the next window.

/// Line separators recognised when normalising extracted page text.
fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\u{0b}' | '\u{0c}' | '\u{1c}' | '\u{1d}' | '\u{1e}' | '\u{85}' | '\u{2028}'
            | '\u{2029}'
    )
}

/// Stripped, non-blank lines of `text`.
pub(crate) fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(is_line_break)
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

/// Strip every line, drop blank lines, and join the rest with `\n`.
pub fn normalize(text: &str) -> String {
    content_lines(text).collect::<Vec<_>>().join("\n")
}

/// Split `text` into overlapping windows of `chunk_size` characters.
///
/// The text is normalised first. Consecutive windows start `chunk_size -
/// overlap` characters apart (never less than one), and the last window always
/// ends at the end of the text. Empty input yields no windows.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    // Byte offset of every char boundary, including the end of the string.
    let bounds: Vec<usize> = normalized
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(normalized.len()))
        .collect();
    let len = bounds.len() - 1;

    let size = chunk_size.max(1);
    let advance = size.saturating_sub(overlap).max(1);

    let mut windows = Vec::with_capacity(len.div_ceil(advance));
    let mut start = 0usize;
    loop {
        let end = (start + size).min(len);
        windows.push(normalized[bounds[start]..bounds[end]].to_string());
        if end == len {
            break;
        }
        start += advance;
    }
    windows
}
