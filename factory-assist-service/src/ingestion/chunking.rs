//! Splitting reconstructed page content into index chunks.
//!
//! Chunks break only on fragment boundaries (blank lines), so an image marker
//! always stays whole and in its original position relative to the text around
//! it. A single text fragment longer than the limit is cut on character
//! boundaries, preferring a line break or space near the end of the window.

use super::reconstruct::FRAGMENT_SEPARATOR;

/// Split `content` into chunks of at most `max_chars` characters.
///
/// An image marker longer than the limit becomes its own oversized chunk.
pub fn split_content(content: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let separator_len = FRAGMENT_SEPARATOR.chars().count();
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for fragment in content.split(FRAGMENT_SEPARATOR) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            continue;
        }
        let fragment_len = fragment.chars().count();

        let pieces = if fragment_len > max_chars && !is_marker(fragment) {
            split_long_fragment(fragment, max_chars)
        } else {
            vec![fragment.to_string()]
        };

        for piece in pieces {
            let piece_len = piece.chars().count();
            if !current.is_empty() && current_len + separator_len + piece_len > max_chars {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if !current.is_empty() {
                current.push_str(FRAGMENT_SEPARATOR);
                current_len += separator_len;
            }
            current.push_str(&piece);
            current_len += piece_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn is_marker(fragment: &str) -> bool {
    fragment.starts_with("![") && fragment.ends_with(')') && !fragment.contains('\n')
}

fn split_long_fragment(fragment: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = fragment.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + max_chars).min(chars.len());
        if end < chars.len() {
            // Back off to the last break in the second half of the window
            let floor = start + max_chars / 2;
            if let Some(pos) = (floor..end).rev().find(|&i| chars[i] == '\n' || chars[i] == ' ') {
                end = pos + 1;
            }
        }
        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        start = end;
    }

    pieces
}
