//! Inline images referenced by a tool result into the model request.
//!
//! Image markers (`![alt](url)`) in a retrieval result are replaced by a short
//! caption naming the URL and the image itself, at the marker's position, so
//! the model sees each diagram next to the text it illustrates.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::MultimodalConfig;
use crate::i18n::I18n;
use crate::ingestion::assets::ImageStore;
use crate::llm::{ContentPart, Message, MessageContent};

static IMAGE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex"));

pub struct MultimodalAdapter {
    images: Arc<ImageStore>,
    config: MultimodalConfig,
    i18n: Arc<I18n>,
    locale: String,
}

/// Outcome of resolving one marker
enum Inline {
    Image { data: String, mime: String },
    /// Below the size threshold
    Decorative,
    /// Missing or unreadable
    Unavailable,
}

impl MultimodalAdapter {
    pub fn new(
        images: Arc<ImageStore>,
        config: MultimodalConfig,
        i18n: Arc<I18n>,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            images,
            config,
            i18n,
            locale: locale.into(),
        }
    }

    /// Rewrite a tool result's image markers into interleaved parts.
    ///
    /// Anything else, and tool results without markers, pass through unchanged.
    pub async fn adapt(&self, message: Message) -> Message {
        if !self.config.enabled {
            return message;
        }
        match message {
            Message::ToolResult {
                tool_call_id,
                tool_name,
                content: MessageContent::Text(text),
            } if IMAGE_MARKER.is_match(&text) => Message::ToolResult {
                tool_call_id,
                tool_name,
                content: self.interleave(&text).await,
            },
            other => other,
        }
    }

    async fn interleave(&self, text: &str) -> MessageContent {
        let mut parts = Vec::new();
        let mut pending = String::new();
        let mut last_end = 0;
        let mut inlined = 0usize;

        // (marker span, url), collected up front so no regex state lives across awaits
        let markers: Vec<(std::ops::Range<usize>, String)> = IMAGE_MARKER
            .captures_iter(text)
            .filter_map(|c| Some((c.get(0)?.range(), c.get(2)?.as_str().to_string())))
            .collect();

        for (span, url) in markers {
            pending.push_str(&text[last_end..span.start]);
            last_end = span.end;

            match self.load(&url).await {
                Inline::Image { data, mime } => {
                    flush(&mut pending, &mut parts);
                    parts.push(ContentPart::Text {
                        text: self
                            .i18n
                            .format(&self.locale, "multimodal-image-caption", &[("url", &url)]),
                    });
                    parts.push(ContentPart::Image { data, mime });
                    inlined += 1;
                }
                Inline::Decorative => {}
                Inline::Unavailable => pending.push_str(&text[span]),
            }
        }
        pending.push_str(&text[last_end..]);
        flush(&mut pending, &mut parts);

        debug!(images = inlined, parts = parts.len(), "Adapted tool result for the model");

        if inlined == 0 {
            return MessageContent::Text(
                parts
                    .into_iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text } => Some(text),
                        ContentPart::Image { .. } => None,
                    })
                    .collect(),
            );
        }
        MessageContent::Parts(parts)
    }

    async fn load(&self, url: &str) -> Inline {
        let Some(path) = self.images.resolve_url(url) else {
            return Inline::Unavailable;
        };

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Inline::Unavailable,
            Err(e) => {
                warn!(url = %url, error = %e, "Referenced image is not available");
                return Inline::Unavailable;
            }
        };
        if metadata.len() < self.config.min_image_bytes {
            debug!(url = %url, size = metadata.len(), "Skipping decorative image");
            return Inline::Decorative;
        }

        let Some(mime) = mime_type(&path) else {
            warn!(url = %url, "Unrecognized image format");
            return Inline::Unavailable;
        };

        match tokio::fs::read(&path).await {
            Ok(bytes) => Inline::Image {
                data: STANDARD.encode(bytes),
                mime: mime.to_string(),
            },
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to read image");
                Inline::Unavailable
            }
        }
    }
}

fn mime_type(path: &Path) -> Option<&'static str> {
    ImageFormat::from_path(path).ok().map(|format| format.to_mime_type())
}

/// Push accumulated text as a part unless it is blank.
fn flush(pending: &mut String, parts: &mut Vec<ContentPart>) {
    let text = std::mem::take(pending);
    if !text.trim().is_empty() {
        parts.push(ContentPart::Text { text });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolName;
    use tempfile::TempDir;

    const BASE: &str = "http://localhost:8000/images";

    fn adapter(dir: &TempDir) -> MultimodalAdapter {
        MultimodalAdapter::new(
            Arc::new(ImageStore::new(dir.path().to_path_buf(), BASE)),
            MultimodalConfig {
                enabled: true,
                min_image_bytes: 1500,
            },
            Arc::new(I18n::new("en")),
            "en",
        )
    }

    fn tool_result(text: &str) -> Message {
        Message::ToolResult {
            tool_call_id: "call_1".to_string(),
            tool_name: ToolName::SearchFactoryKnowledge,
            content: MessageContent::Text(text.to_string()),
        }
    }

    fn parts_of(message: Message) -> Vec<ContentPart> {
        match message {
            Message::ToolResult {
                content: MessageContent::Parts(parts),
                ..
            } => parts,
            other => panic!("expected parts, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_large_image_inlined_after_preceding_text() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("m1_p1_0.png"), vec![7u8; 2000]).unwrap();

        let url = format!("{BASE}/m1_p1_0.png");
        let adapted = adapter(&dir)
            .adapt(tool_result(&format!("Step A\n\n![diagram]({url})\n\nStep B")))
            .await;

        let parts = parts_of(adapted);
        assert_eq!(parts.len(), 4);
        assert_eq!(
            parts[0],
            ContentPart::Text {
                text: "Step A\n\n".to_string()
            }
        );
        assert_eq!(
            parts[1],
            ContentPart::Text {
                text: format!("Image {url}:")
            }
        );
        let ContentPart::Image { data, mime } = &parts[2] else {
            panic!("expected image part");
        };
        assert_eq!(mime, "image/png");
        assert_eq!(STANDARD.decode(data).unwrap().len(), 2000);
        assert_eq!(
            parts[3],
            ContentPart::Text {
                text: "\n\nStep B".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_small_image_is_dropped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("icon.png"), vec![1u8; 1499]).unwrap();

        let adapted = adapter(&dir)
            .adapt(tool_result(&format!("A ![diagram]({BASE}/icon.png) B")))
            .await;
        assert_eq!(adapted, tool_result("A  B"));
    }

    #[tokio::test]
    async fn test_missing_image_keeps_marker() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big.jpg"), vec![1u8; 1600]).unwrap();

        let text = format!("![diagram]({BASE}/gone.png) then ![diagram]({BASE}/big.jpg)");
        let parts = parts_of(adapter(&dir).adapt(tool_result(&text)).await);
        assert_eq!(
            parts[0],
            ContentPart::Text {
                text: format!("![diagram]({BASE}/gone.png) then ")
            }
        );
        assert!(matches!(&parts[2], ContentPart::Image { mime, .. } if mime == "image/jpeg"));
    }

    #[tokio::test]
    async fn test_messages_without_markers_pass_through() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir);

        let plain = tool_result("no images here");
        assert_eq!(adapter.adapt(plain.clone()).await, plain);

        let user = Message::user(format!("![diagram]({BASE}/x.png)"));
        assert_eq!(adapter.adapt(user.clone()).await, user);
    }

    #[tokio::test]
    async fn test_disabled_adapter_is_identity() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("m1_p1_0.png"), vec![7u8; 2000]).unwrap();
        let mut adapter = adapter(&dir);
        adapter.config.enabled = false;

        let message = tool_result(&format!("![diagram]({BASE}/m1_p1_0.png)"));
        assert_eq!(adapter.adapt(message.clone()).await, message);
    }
}
