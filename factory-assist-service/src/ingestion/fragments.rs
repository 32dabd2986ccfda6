//! Positioned page content.
//!
//! Extractors (pdfium, plain text) produce a [`PageContent`] per page with
//! coordinates already converted to top-down space: `top < bottom`, and a
//! smaller `bottom` means higher on the page.

/// Axis-aligned rectangle in top-down page coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }
}

/// A run of text with its bounding box
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub bounds: Rect,
    pub text: String,
}

/// An image object with encoded bytes and every rectangle it is drawn at
#[derive(Debug, Clone)]
pub struct ImageObject {
    pub bytes: Vec<u8>,
    /// File extension matching the encoding of `bytes`
    pub extension: String,
    pub rects: Vec<Rect>,
}

/// Raw content of one source page
#[derive(Debug, Clone)]
pub struct PageContent {
    /// 1-based page number
    pub page_number: u32,
    pub text_blocks: Vec<TextBlock>,
    pub images: Vec<ImageObject>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FragmentContent {
    Text(String),
    /// Persisted asset name
    Image(String),
}

/// A positioned unit of page content prior to ordering
#[derive(Debug, Clone, PartialEq)]
pub struct PageFragment {
    pub vertical_position: f32,
    pub content: FragmentContent,
}

/// Sort fragments top to bottom by lower edge, keeping extraction order on ties.
pub fn order_fragments(fragments: &mut [PageFragment]) {
    // sort_by is stable
    fragments.sort_by(|a, b| a.vertical_position.total_cmp(&b.vertical_position));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(y: f32, s: &str) -> PageFragment {
        PageFragment {
            vertical_position: y,
            content: FragmentContent::Text(s.to_string()),
        }
    }

    #[test]
    fn test_order_is_stable_on_ties() {
        let mut fragments = vec![text(20.0, "b"), text(10.0, "a1"), text(10.0, "a2")];
        order_fragments(&mut fragments);
        let order: Vec<_> = fragments
            .iter()
            .map(|f| match &f.content {
                FragmentContent::Text(s) => s.as_str(),
                FragmentContent::Image(_) => "img",
            })
            .collect();
        assert_eq!(order, vec!["a1", "a2", "b"]);
    }

    #[test]
    fn test_rect_height_never_negative() {
        assert_eq!(Rect::new(0.0, 50.0, 10.0, 40.0).height(), 0.0);
        assert_eq!(Rect::new(0.0, 40.0, 10.0, 50.0).height(), 10.0);
    }
}
