//! OpenAI Chat Completions wire types.

use serde::{Deserialize, Serialize};

use super::messages::{ContentPart, Message, MessageContent};
use super::ToolDefinition;

#[derive(Debug, Serialize)]
pub(super) struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool<'a>>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Debug, Serialize, PartialEq)]
pub(super) struct WireMessage {
    pub role: &'static str,
    /// Always present; `""` rather than `null` for tool-calling assistant turns
    pub content: WireContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub(super) enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Debug, Serialize, PartialEq)]
pub(super) struct WireImageUrl {
    pub url: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub(super) struct WireToolCall {
    pub id: String,
    pub r#type: &'static str,
    pub function: WireFunctionCall,
}

#[derive(Debug, Serialize, PartialEq)]
pub(super) struct WireFunctionCall {
    pub name: String,
    /// JSON-encoded arguments object
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub(super) struct WireTool<'a> {
    pub r#type: &'static str,
    pub function: &'a ToolDefinition,
}

impl<'a> WireTool<'a> {
    pub fn function(definition: &'a ToolDefinition) -> Self {
        Self {
            r#type: "function",
            function: definition,
        }
    }
}

fn wire_content(content: &MessageContent) -> WireContent {
    match content {
        MessageContent::Text(text) => WireContent::Text(text.clone()),
        MessageContent::Parts(parts) => WireContent::Parts(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => WirePart::Text { text: text.clone() },
                    ContentPart::Image { data, mime } => WirePart::ImageUrl {
                        image_url: WireImageUrl {
                            url: format!("data:{};base64,{}", mime, data),
                        },
                    },
                })
                .collect(),
        ),
    }
}

/// System prompt followed by the conversation, in wire form
pub(super) fn wire_messages(system: &str, messages: &[Message]) -> Vec<WireMessage> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    wire.push(WireMessage {
        role: "system",
        content: WireContent::Text(system.to_string()),
        tool_call_id: None,
        tool_calls: Vec::new(),
    });

    for message in messages {
        wire.push(match message {
            Message::User { content } => WireMessage {
                role: "user",
                content: WireContent::Text(content.clone()),
                tool_call_id: None,
                tool_calls: Vec::new(),
            },
            Message::Assistant {
                content,
                tool_calls,
            } => WireMessage {
                role: "assistant",
                content: WireContent::Text(content.clone()),
                tool_call_id: None,
                tool_calls: tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        r#type: "function",
                        function: WireFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect(),
            },
            Message::ToolResult {
                tool_call_id,
                content,
                ..
            } => WireMessage {
                role: "tool",
                content: wire_content(content),
                tool_call_id: Some(tool_call_id.clone()),
                tool_calls: Vec::new(),
            },
        });
    }

    wire
}

// ─── Streaming response ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChunkToolCall {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChunkFunction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}
