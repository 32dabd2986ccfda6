//! Tool registry.
//!
//! Tool names are derived from the [`ToolName`] variants via strum, so the
//! string the model sees and the name the dispatcher matches on cannot drift
//! apart. Parameter schemas are generated from the argument structs.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::llm::ToolDefinition;

/// All tools as an exhaustive enum
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    SearchFactoryKnowledge,
    RecordUnansweredQuestion,
}

/// Arguments of `search_factory_knowledge`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// The fault, error code or operation to look up, as a full sentence
    pub query: String,
}

/// Arguments of `record_unanswered_question`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EscalationArgs {
    /// The user's original question
    pub query: String,
    /// Why the knowledge base could not answer it
    pub reason: String,
}

/// Metadata for a tool definition
#[derive(Debug, Clone)]
pub struct ToolMetadata {
    pub name: ToolName,
    pub description: &'static str,
    /// JSON Schema for the arguments (built lazily)
    pub parameters: fn() -> serde_json::Value,
}

/// JSON Schema of `T` without the document-level keys model APIs don't need.
fn parameters_for<T: JsonSchema>() -> serde_json::Value {
    let mut value = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
    if let Some(object) = value.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    value
}

pub struct ToolRegistry {
    tools: BTreeMap<ToolName, ToolMetadata>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let tools = [
            ToolMetadata {
                name: ToolName::SearchFactoryKnowledge,
                description: "Search the factory knowledge base (equipment manuals, repair procedures, \
                    operating instructions). Returns the relevant pages in reading order, including \
                    diagram links, followed by the source file names. Call it at most once per question.",
                parameters: parameters_for::<SearchArgs>,
            },
            ToolMetadata {
                name: ToolName::RecordUnansweredQuestion,
                description: "Record a question the knowledge base cannot answer so a technician can \
                    add the missing material. Use it when the search results are missing or not \
                    sufficient for the question.",
                parameters: parameters_for::<EscalationArgs>,
            },
        ];

        Self {
            tools: tools.into_iter().map(|t| (t.name, t)).collect(),
        }
    }

    /// Definitions for the tools in `names`, in registry order
    pub fn definitions(&self, names: &[ToolName]) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .filter(|t| names.contains(&t.name))
            .map(|t| ToolDefinition {
                name: t.name.to_string(),
                description: t.description.to_string(),
                parameters: (t.parameters)(),
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global tool registry
pub static REGISTRY: LazyLock<ToolRegistry> = LazyLock::new(ToolRegistry::new);

/// Decode tool arguments, accepting a JSON-encoded string as well as an object.
pub fn parse_arguments<T: DeserializeOwned>(arguments: &serde_json::Value) -> Result<T, serde_json::Error> {
    match arguments {
        serde_json::Value::String(raw) => serde_json::from_str(raw),
        value => serde_json::from_value(value.clone()),
    }
}
