//! SSE parser for streamed chat completions.
//!
//! Splits the body on blank lines, parses each `data:` payload as a
//! completion chunk and accumulates tool-call fragments by index until the
//! stream ends.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tracing::warn;
use uuid::Uuid;

use super::messages::ToolCall;
use super::wire::ChatCompletionChunk;
use super::{ModelEvent, ModelReply};
use crate::error::ModelError;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Turn a response body into model events.
///
/// Emits a [`ModelEvent::Delta`] per non-empty content fragment and exactly one
/// [`ModelEvent::Finished`] at `[DONE]` or end of body, whichever comes first.
pub(super) fn parse_sse_stream<S>(body: S) -> impl Stream<Item = Result<ModelEvent, ModelError>> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let body: ByteStream = Box::pin(body);

    stream::unfold(
        (body, StreamState::default(), Vec::<u8>::new()),
        |(mut body, mut state, mut buffer)| async move {
            loop {
                if let Some(event) = state.queue.pop_front() {
                    return Some((Ok(event), (body, state, buffer)));
                }
                if state.finished {
                    return None;
                }

                // Complete SSE event in the buffer
                if let Some(end) = find_event_end(&buffer) {
                    let raw: Vec<u8> = buffer.drain(..end + 2).collect();
                    let event = String::from_utf8_lossy(&raw[..end]).into_owned();
                    if let Err(e) = state.process_event(&event) {
                        state.finished = true;
                        return Some((Err(e), (body, state, buffer)));
                    }
                    continue;
                }

                match body.next().await {
                    Some(Ok(bytes)) => buffer.extend(bytes.iter().filter(|&&b| b != b'\r')),
                    Some(Err(e)) => {
                        state.finished = true;
                        return Some((
                            Err(ModelError::Stream {
                                message: format!("stream read error: {e}"),
                            }),
                            (body, state, buffer),
                        ));
                    }
                    None => {
                        let rest = String::from_utf8_lossy(&std::mem::take(&mut buffer)).into_owned();
                        if !rest.trim().is_empty()
                            && let Err(e) = state.process_event(rest.trim())
                        {
                            state.finished = true;
                            return Some((Err(e), (body, state, buffer)));
                        }
                        if !state.finished {
                            state.finish();
                        }
                    }
                }
            }
        },
    )
}

fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Tool call being assembled from deltas
struct PendingCall {
    index: u32,
    id: Option<String>,
    name: String,
    arguments: String,
}

#[derive(Default)]
struct StreamState {
    content: String,
    pending_calls: Vec<PendingCall>,
    queue: VecDeque<ModelEvent>,
    finished: bool,
}

impl StreamState {
    /// Process one SSE event (possibly several `data:` lines).
    fn process_event(&mut self, event: &str) -> Result<(), ModelError> {
        let mut data = String::new();
        for line in event.lines() {
            if let Some(payload) = line.strip_prefix("data:") {
                let payload = payload.trim();
                if payload == "[DONE]" {
                    self.finish();
                    return Ok(());
                }
                data.push_str(payload);
            }
        }

        if data.is_empty() {
            // Keep-alive or comment
            return Ok(());
        }

        let chunk: ChatCompletionChunk =
            serde_json::from_str(&data).map_err(|e| ModelError::InvalidResponse { source: e })?;

        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(());
        };

        if let Some(content) = choice.delta.content
            && !content.is_empty()
        {
            self.content.push_str(&content);
            self.queue.push_back(ModelEvent::Delta(content));
        }

        for fragment in choice.delta.tool_calls.unwrap_or_default() {
            let index = fragment.index.unwrap_or(0);
            let (name, arguments) = fragment
                .function
                .map(|f| (f.name.unwrap_or_default(), f.arguments.unwrap_or_default()))
                .unwrap_or_default();

            match self.pending_calls.iter_mut().find(|c| c.index == index) {
                Some(call) => {
                    call.name.push_str(&name);
                    call.arguments.push_str(&arguments);
                    if fragment.id.is_some() {
                        call.id = fragment.id;
                    }
                }
                None => self.pending_calls.push(PendingCall {
                    index,
                    id: fragment.id,
                    name,
                    arguments,
                }),
            }
        }

        Ok(())
    }

    /// Queue the final reply and stop.
    fn finish(&mut self) {
        let mut pending = std::mem::take(&mut self.pending_calls);
        pending.sort_by_key(|c| c.index);

        let tool_calls = pending
            .into_iter()
            .filter(|c| !c.name.trim().is_empty())
            .map(|c| ToolCall {
                id: c.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
                arguments: parse_arguments(&c.name, &c.arguments),
                name: c.name.trim().to_string(),
            })
            .collect();

        self.queue.push_back(ModelEvent::Finished(ModelReply {
            content: std::mem::take(&mut self.content),
            tool_calls,
        }));
        self.finished = true;
    }
}

/// Arguments as JSON; unparseable text is kept as a string for the caller to reject.
fn parse_arguments(name: &str, raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(Default::default());
    }
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(tool = %name, error = %e, "Tool call arguments are not valid JSON");
            serde_json::Value::String(raw.to_string())
        }
    }
}
