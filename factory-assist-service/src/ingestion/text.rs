//! Plain-text documents (`.txt`, `.md`, `.csv`, `.log`).
//!
//! A text file has no geometry, so it becomes a single page whose paragraphs
//! are stacked top to bottom in file order.

use super::fragments::{PageContent, Rect, TextBlock};
use crate::error::ProcessingError;

/// Extensions handled as plain text
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "csv", "log"];

/// Read a UTF-8 document as page 1, one text block per paragraph.
pub fn read_text_page(filename: &str, content: &[u8]) -> Result<PageContent, ProcessingError> {
    let text = std::str::from_utf8(content).map_err(|_| ProcessingError::InvalidText {
        filename: filename.to_string(),
    })?;
    let text = text.trim_start_matches('\u{feff}').replace("\r\n", "\n");

    let text_blocks = text
        .split("\n\n")
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .enumerate()
        .map(|(i, paragraph)| TextBlock {
            bounds: Rect::new(0.0, i as f32, 1.0, (i + 1) as f32),
            text: paragraph.to_string(),
        })
        .collect();

    Ok(PageContent {
        page_number: 1,
        text_blocks,
        images: Vec::new(),
    })
}
