//! Recovery of tool calls the model wrote as text instead of structured calls.
//!
//! Grammar, tried in order (the first form that yields a known tool wins):
//!
//! 1. `<tool_call>{"name": NAME, "arguments": ARGS}</tool_call>` where ARGS is
//!    an object or a JSON string holding one.
//! 2. `<｜tool▁call▁begin｜>function<｜tool▁sep｜>NAME ARGS <｜tool▁call▁end｜>`
//!    where ARGS is a fenced ```` ```json ```` block or a bare object. The ASCII
//!    spelling `<|tool_call_begin|>` / `<|tool_sep|>` / `<|tool_call_end|>` is
//!    the same form. `tool_calls_begin` / `tool_calls_end` wrappers are ignored.
//! 3. `<function=NAME>` followed by a JSON object or by
//!    `<parameter=KEY>VALUE</parameter>` pairs, closed by `</function>`.
//!
//! Names that are not [`ToolName`]s are never recovered.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::tools::ToolName;

/// A tool call extracted from text
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredCall {
    pub name: ToolName,
    pub arguments: Value,
}

static TOOL_CALL_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<tool_call>\s*(.*?)\s*</tool_call>").expect("valid regex")
});

static DSML_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)<[｜|]tool[▁_]call[▁_]begin[｜|]>\s*(?:function)?\s*<[｜|]tool[▁_]sep[｜|]>\s*([A-Za-z0-9_.\-]+)(.*?)<[｜|]tool[▁_]call[▁_]end[｜|]>",
    )
    .expect("valid regex")
});

static DSML_WRAPPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[｜|]tool[▁_]calls[▁_](?:begin|end)[｜|]>").expect("valid regex")
});

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("valid regex")
});

static FUNCTION_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<function=([A-Za-z0-9_.\-]+)>(.*?)</function>").expect("valid regex")
});

static PARAMETER_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<parameter=([A-Za-z0-9_.\-]+)>\s*(.*?)\s*</parameter>").expect("valid regex")
});

/// Any opener of a recognized form, complete or not
static OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<tool_call>|<[｜|]tool[▁_]calls?[▁_]begin[｜|]>|<function=").expect("valid regex")
});

/// Stray closing or separator tags left after removing complete forms
static STRAY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</tool_call>|</function>|<[｜|]tool[▁_](?:call[▁_]end|sep|calls[▁_]end)[｜|]>")
        .expect("valid regex")
});

/// Tag openers the streaming guard watches for
const GUARDED_OPENERS: &[&str] = &["<tool_call>", "<｜tool▁call", "<|tool_call", "<function="];

/// Whether `text` contains anything that looks like tool-call markup
pub fn contains_tool_markup(text: &str) -> bool {
    OPENER.is_match(text)
}

/// Recover tool calls from `text`, in order of appearance.
pub fn recover(text: &str) -> Vec<RecoveredCall> {
    let parsers: [fn(&str) -> Vec<RecoveredCall>; 3] =
        [recover_tool_call_tags, recover_dsml, recover_function_tags];

    for parser in parsers {
        let calls = parser(text);
        if !calls.is_empty() {
            debug!(count = calls.len(), "Recovered tool calls from text");
            return calls;
        }
    }
    Vec::new()
}

/// Remove every recognized tag and its payload, then trim.
///
/// An opener without its closing tag swallows the rest of the text.
pub fn strip(text: &str) -> String {
    let text = TOOL_CALL_TAG.replace_all(text, "");
    let text = DSML_CALL.replace_all(&text, "");
    let text = FUNCTION_TAG.replace_all(&text, "");
    let text = DSML_WRAPPER.replace_all(&text, "");
    let mut text = STRAY_TAG.replace_all(&text, "").into_owned();

    if let Some(found) = OPENER.find(&text) {
        text.truncate(found.start());
    }
    text.trim().to_string()
}

fn known_tool(name: &str) -> Option<ToolName> {
    ToolName::from_str(name.trim()).ok()
}

/// An object, or a JSON string that decodes to one
fn as_arguments(value: Value) -> Option<Value> {
    match value {
        Value::Object(_) => Some(value),
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(decoded @ Value::Object(_)) => Some(decoded),
            _ => None,
        },
        Value::Null => Some(Value::Object(Map::new())),
        _ => None,
    }
}

/// First JSON object in `body`: a fenced block if present, else the outermost braces.
fn parse_json_body(body: &str) -> Option<Value> {
    let body = body.trim();
    if body.is_empty() {
        return Some(Value::Object(Map::new()));
    }
    let candidate = JSON_FENCE
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(body);

    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&candidate[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn recover_tool_call_tags(text: &str) -> Vec<RecoveredCall> {
    TOOL_CALL_TAG
        .captures_iter(text)
        .filter_map(|captures| {
            let payload: Value = serde_json::from_str(captures.get(1)?.as_str()).ok()?;
            let name = known_tool(payload.get("name")?.as_str()?)?;
            let arguments = as_arguments(payload.get("arguments").cloned().unwrap_or(Value::Null))?;
            Some(RecoveredCall { name, arguments })
        })
        .collect()
}

fn recover_dsml(text: &str) -> Vec<RecoveredCall> {
    DSML_CALL
        .captures_iter(text)
        .filter_map(|captures| {
            let name = known_tool(captures.get(1)?.as_str())?;
            let arguments = parse_json_body(captures.get(2)?.as_str())?;
            Some(RecoveredCall { name, arguments })
        })
        .collect()
}

fn recover_function_tags(text: &str) -> Vec<RecoveredCall> {
    FUNCTION_TAG
        .captures_iter(text)
        .filter_map(|captures| {
            let name = known_tool(captures.get(1)?.as_str())?;
            let body = captures.get(2)?.as_str();

            let arguments = if PARAMETER_TAG.is_match(body) {
                let mut map = Map::new();
                for parameter in PARAMETER_TAG.captures_iter(body) {
                    let key = parameter.get(1)?.as_str().to_string();
                    let value = parameter.get(2)?.as_str().to_string();
                    map.insert(key, Value::String(value));
                }
                Value::Object(map)
            } else {
                parse_json_body(body)?
            };
            Some(RecoveredCall { name, arguments })
        })
        .collect()
}

/// Streaming filter that keeps tool-call markup out of the text stream.
///
/// Text that might be the start of a tag is held back until it is decided.
/// Once a tag is confirmed, everything after it in the current model step is
/// suppressed.
#[derive(Debug, Default)]
pub struct TagGuard {
    held: String,
    released: String,
    suppressed: bool,
}

impl TagGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a delta; returns the text that is safe to forward now.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        if self.suppressed {
            return None;
        }
        self.held.push_str(delta);

        let mut hold_from = None;
        for (index, _) in self.held.match_indices('<') {
            let tail = &self.held[index..];
            if GUARDED_OPENERS.iter().any(|opener| tail.starts_with(opener)) {
                let safe = self.held[..index].to_string();
                self.held.clear();
                self.suppressed = true;
                return self.release(safe);
            }
            if GUARDED_OPENERS.iter().any(|opener| opener.starts_with(tail)) {
                hold_from = Some(index);
                break;
            }
        }

        let safe = match hold_from {
            Some(index) => {
                let rest = self.held.split_off(index);
                std::mem::replace(&mut self.held, rest)
            }
            None => std::mem::take(&mut self.held),
        };
        self.release(safe)
    }

    /// End of the model step; returns held-back text that turned out not to be a tag.
    pub fn finish(&mut self) -> Option<String> {
        if self.suppressed {
            return None;
        }
        let rest = std::mem::take(&mut self.held);
        self.release(rest)
    }

    /// Whether a tag was confirmed in this step
    pub fn suppressed(&self) -> bool {
        self.suppressed
    }

    /// Everything forwarded so far in this step
    pub fn released(&self) -> &str {
        &self.released
    }

    fn release(&mut self, text: String) -> Option<String> {
        if text.is_empty() {
            return None;
        }
        self.released.push_str(&text);
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn search(query: &str) -> RecoveredCall {
        RecoveredCall {
            name: ToolName::SearchFactoryKnowledge,
            arguments: json!({ "query": query }),
        }
    }

    #[test]
    fn test_tool_call_tag_with_object_arguments() {
        let text = r#"Let me check. <tool_call>{"name": "search_factory_knowledge", "arguments": {"query": "E-102"}}</tool_call>"#;
        assert_eq!(recover(text), vec![search("E-102")]);
        assert_eq!(strip(text), "Let me check.");
    }

    #[test]
    fn test_tool_call_tag_with_string_arguments() {
        let text = r#"<tool_call>{"name":"search_factory_knowledge","arguments":"{\"query\":\"pump\"}"}</tool_call>"#;
        assert_eq!(recover(text), vec![search("pump")]);
    }

    #[test]
    fn test_dsml_fullwidth_with_fence() {
        let text = "<｜tool▁calls▁begin｜><｜tool▁call▁begin｜>function<｜tool▁sep｜>search_factory_knowledge\n```json\n{\"query\": \"注塑机 E-102\"}\n```<｜tool▁call▁end｜><｜tool▁calls▁end｜>";
        assert_eq!(recover(text), vec![search("注塑机 E-102")]);
        assert_eq!(strip(text), "");
    }

    #[test]
    fn test_dsml_ascii_bare_object() {
        let text = "<|tool_call_begin|>function<|tool_sep|>record_unanswered_question {\"query\": \"q\", \"reason\": \"r\"}<|tool_call_end|>";
        assert_eq!(
            recover(text),
            vec![RecoveredCall {
                name: ToolName::RecordUnansweredQuestion,
                arguments: json!({"query": "q", "reason": "r"}),
            }]
        );
    }

    #[test]
    fn test_function_tag_with_parameters() {
        let text = "<function=search_factory_knowledge>\n<parameter=query>\nmotor overheating\n</parameter>\n</function>";
        assert_eq!(recover(text), vec![search("motor overheating")]);
    }

    #[test]
    fn test_function_tag_with_json_body() {
        let text = "<function=search_factory_knowledge>{\"query\": \"valve\"}</function>";
        assert_eq!(recover(text), vec![search("valve")]);
    }

    #[test]
    fn test_unknown_tool_is_not_recovered() {
        let text = r#"<tool_call>{"name": "rm_rf", "arguments": {}}</tool_call>"#;
        assert!(recover(text).is_empty());
        assert!(contains_tool_markup(text));
        assert_eq!(strip(text), "");
    }

    #[test]
    fn test_strip_unterminated_tag() {
        let text = "The answer is below. <tool_call>{\"name\": \"search_fac";
        assert!(recover(text).is_empty());
        assert_eq!(strip(text), "The answer is below.");
    }

    #[test]
    fn test_plain_text_untouched() {
        let text = "Press <Reset> then hold for 3 s.";
        assert!(!contains_tool_markup(text));
        assert!(recover(text).is_empty());
        assert_eq!(strip(text), text);
    }

    #[test]
    fn test_guard_passes_plain_text() {
        let mut guard = TagGuard::new();
        assert_eq!(guard.push("Hello "), Some("Hello ".to_string()));
        assert_eq!(guard.push("world"), Some("world".to_string()));
        assert_eq!(guard.finish(), None);
        assert!(!guard.suppressed());
    }

    #[test]
    fn test_guard_holds_possible_opener_then_releases() {
        let mut guard = TagGuard::new();
        assert_eq!(guard.push("Press <"), Some("Press ".to_string()));
        assert_eq!(guard.push("Res"), Some("<Res".to_string()));
        assert_eq!(guard.push("et>"), Some("et>".to_string()));
        assert_eq!(guard.released(), "Press <Reset>");
    }

    #[test]
    fn test_guard_suppresses_split_tag() {
        let mut guard = TagGuard::new();
        assert_eq!(guard.push("Checking <tool"), Some("Checking ".to_string()));
        assert_eq!(guard.push("_call>{\"name\""), None);
        assert!(guard.suppressed());
        assert_eq!(guard.push(": \"x\"}</tool_call> after"), None);
        assert_eq!(guard.finish(), None);
        assert_eq!(guard.released(), "Checking ");
    }

    #[test]
    fn test_guard_held_text_flushed_at_finish() {
        let mut guard = TagGuard::new();
        assert_eq!(guard.push("a <func"), Some("a ".to_string()));
        assert_eq!(guard.finish(), Some("<func".to_string()));
    }

    #[test]
    fn test_guard_fullwidth_opener() {
        let mut guard = TagGuard::new();
        assert_eq!(guard.push("好的<｜tool▁call▁begin｜>"), Some("好的".to_string()));
        assert!(guard.suppressed());
    }
}
