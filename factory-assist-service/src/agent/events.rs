//! Turn events and the text stream built from them.

use async_stream::stream;
use futures::{Stream, StreamExt};

/// What the orchestrator reports while a turn runs.
///
/// `step` identifies one response step: a model call, or one synthesized
/// message.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Incremental model text
    Delta { step: u32, text: String },
    /// The model's complete visible text at the end of a call
    ModelFinal { step: u32, text: String },
    /// A message produced without the model (apology, failure notice)
    Synthesized { step: u32, text: String },
}

impl TurnEvent {
    fn step(&self) -> u32 {
        match self {
            TurnEvent::Delta { step, .. }
            | TurnEvent::ModelFinal { step, .. }
            | TurnEvent::Synthesized { step, .. } => *step,
        }
    }
}

/// Convert turn events into text increments.
///
/// Per step, exactly one source is used: deltas if any were streamed, else the
/// model's final text, else the synthesized message.
pub fn emit_text<S>(events: S) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = TurnEvent> + Send + 'static,
{
    stream! {
        let mut events = Box::pin(events);
        let mut current_step = None;
        let mut emitted = false;

        while let Some(event) = events.next().await {
            if current_step != Some(event.step()) {
                current_step = Some(event.step());
                emitted = false;
            }

            let text = match event {
                TurnEvent::Delta { text, .. } => text,
                TurnEvent::ModelFinal { text, .. } | TurnEvent::Synthesized { text, .. } => {
                    if emitted {
                        continue;
                    }
                    text
                }
            };

            if text.is_empty() {
                continue;
            }
            emitted = true;
            yield text;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    async fn run(events: Vec<TurnEvent>) -> Vec<String> {
        emit_text(stream::iter(events)).collect().await
    }

    fn delta(step: u32, text: &str) -> TurnEvent {
        TurnEvent::Delta {
            step,
            text: text.to_string(),
        }
    }

    fn model_final(step: u32, text: &str) -> TurnEvent {
        TurnEvent::ModelFinal {
            step,
            text: text.to_string(),
        }
    }

    fn synthesized(step: u32, text: &str) -> TurnEvent {
        TurnEvent::Synthesized {
            step,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_deltas_win_over_final() {
        let out = run(vec![delta(0, "Hel"), delta(0, "lo"), model_final(0, "Hello")]).await;
        assert_eq!(out, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_final_used_without_deltas() {
        let out = run(vec![model_final(0, "Hello")]).await;
        assert_eq!(out, vec!["Hello"]);
    }

    #[tokio::test]
    async fn test_synthesized_only_when_step_is_silent() {
        let out = run(vec![
            model_final(0, ""),
            synthesized(1, "Sorry"),
            delta(2, "x"),
            synthesized(2, "ignored"),
        ])
        .await;
        assert_eq!(out, vec!["Sorry", "x"]);
    }

    #[tokio::test]
    async fn test_empty_deltas_do_not_claim_the_step() {
        let out = run(vec![delta(0, ""), model_final(0, "full")]).await;
        assert_eq!(out, vec!["full"]);
    }
}
