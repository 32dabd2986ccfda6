//! Language-model boundary.
//!
//! The agent talks to the model only through [`ChatModel`]; the production
//! implementation is an OpenAI-compatible streaming client.

pub mod client;
pub mod messages;
mod sse;
mod wire;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use crate::error::ModelError;

pub use client::OpenAiChatModel;
pub use messages::{ContentPart, Message, MessageContent, ToolCall};

/// A tool offered to the model for one call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object
    pub parameters: serde_json::Value,
}

/// One model invocation
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub messages: Vec<Message>,
    /// Tools the model may call; empty means none
    pub tools: Vec<ToolDefinition>,
}

/// Final content of a completed model call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// Incremental text as the model streams
    Delta(String),
    /// The call completed. Always the last event of a stream.
    Finished(ModelReply),
}

pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelEvent, ModelError>> + Send>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Start a streaming completion
    async fn complete(&self, request: ModelRequest) -> Result<ModelStream, ModelError>;
}
