//! Tools the agent can offer to the model.
//!
//! - [`ToolName::SearchFactoryKnowledge`]: one-shot knowledge base search
//! - [`ToolName::RecordUnansweredQuestion`]: escalate to the human-review queue

pub mod registry;
pub mod retrieval;

pub use registry::{EscalationArgs, REGISTRY, SearchArgs, ToolName, parse_arguments};
pub use retrieval::RetrievalTool;
