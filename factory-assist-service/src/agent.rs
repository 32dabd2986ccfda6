//! Agent orchestrator.
//!
//! One user turn runs as a small state machine:
//!
//! ```text
//! Idle -> Thinking -> ToolDispatch -> Thinking -> ... -> Responding -> Terminated
//! ```
//!
//! `Thinking` calls the model with the tools still allowed this turn,
//! `ToolDispatch` runs exactly one tool, and `Responding` records the final
//! answer. The turn is bounded twice: at most [`RETRIEVAL_BUDGET`] knowledge
//! base searches (a further search is rewritten into an escalation) and at most
//! `agent.max_model_calls` model calls. After an escalation the model is not
//! consulted again; the user gets a fixed apology.

pub mod conversation;
pub mod events;
pub mod multimodal;
pub mod prompts;
pub mod recovery;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::error::{ModelError, describe};
use crate::escalation::{EscalationLog, RecordOutcome};
use crate::i18n::I18n;
use crate::llm::{ChatModel, Message, MessageContent, ModelEvent, ModelReply, ModelRequest, ToolCall};
use crate::tools::{EscalationArgs, REGISTRY, RetrievalTool, SearchArgs, ToolName, parse_arguments};

pub use conversation::{ConversationStore, ConversationTurn, retrieval_used_this_turn};
pub use events::{TurnEvent, emit_text};
pub use multimodal::MultimodalAdapter;

use recovery::TagGuard;

/// Knowledge base searches allowed per user turn
pub const RETRIEVAL_BUDGET: usize = 1;

const EVENT_BUFFER: usize = 64;

/// Orchestrator state within a turn
#[derive(Debug)]
enum AgentState {
    Thinking,
    ToolDispatch(PendingCall),
    /// Final answer, already streamed
    Responding(String),
    Terminated,
}

/// The single tool call selected from a model response
#[derive(Debug, Clone)]
struct PendingCall {
    id: String,
    name: ToolName,
    arguments: serde_json::Value,
}

/// Result of one streamed model call
struct ModelStep {
    reply: ModelReply,
    guard: TagGuard,
}

/// Per-turn bookkeeping
struct TurnContext {
    thread_id: String,
    events: mpsc::Sender<TurnEvent>,
    next_step: u32,
    model_calls: u32,
}

impl TurnContext {
    fn begin_step(&mut self) -> u32 {
        let step = self.next_step;
        self.next_step += 1;
        step
    }

    /// Send an event; a caller that went away is not an error.
    async fn send(&self, event: TurnEvent) {
        if self.events.send(event).await.is_err() {
            debug!(thread_id = %self.thread_id, "Client disconnected, finishing turn without output");
        }
    }

    async fn synthesize(&mut self, text: &str) {
        let step = self.begin_step();
        self.send(TurnEvent::Synthesized {
            step,
            text: text.to_string(),
        })
        .await;
    }
}

pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    retrieval: Arc<RetrievalTool>,
    escalation: Arc<EscalationLog>,
    adapter: MultimodalAdapter,
    i18n: Arc<I18n>,
    config: AgentConfig,
    conversations: ConversationStore,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        retrieval: Arc<RetrievalTool>,
        escalation: Arc<EscalationLog>,
        adapter: MultimodalAdapter,
        i18n: Arc<I18n>,
        config: AgentConfig,
    ) -> Self {
        Self {
            model,
            retrieval,
            escalation,
            adapter,
            i18n,
            conversations: ConversationStore::new(Duration::from_secs(config.idle_thread_secs)),
            config,
        }
    }

    fn text(&self, key: &str) -> String {
        self.i18n.get(&self.config.locale, key, None)
    }

    fn format(&self, key: &str, args: &[(&str, &str)]) -> String {
        self.i18n.format(&self.config.locale, key, args)
    }

    /// Run a user turn in the background and stream its text.
    ///
    /// Dropping the stream does not cancel the turn; it completes so the
    /// thread's history stays consistent.
    pub fn chat(
        self: &Arc<Self>,
        thread_id: &str,
        query: &str,
    ) -> impl Stream<Item = String> + Send + use<> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let this = Arc::clone(self);
        let thread_id = thread_id.to_string();
        let query = query.to_string();

        tokio::spawn(async move {
            this.run_turn(&thread_id, &query, tx).await;
        });

        emit_text(ReceiverStream::new(rx))
    }

    /// Process one user message to completion, reporting through `events`.
    pub async fn run_turn(&self, thread_id: &str, query: &str, events: mpsc::Sender<TurnEvent>) {
        let conversation = self.conversations.get_or_create(thread_id);
        let mut turn = conversation.lock().await;

        metrics::counter!("factory_chat_turns_total").increment(1);
        info!(thread_id = %thread_id, "Turn started");

        // Idle -> Thinking
        turn.begin(query);
        turn.trim_history(self.config.max_history_messages);
        let mut ctx = TurnContext {
            thread_id: thread_id.to_string(),
            events,
            next_step: 0,
            model_calls: 0,
        };

        let mut state = AgentState::Thinking;
        loop {
            state = match state {
                AgentState::Thinking => self.think(&mut turn, &mut ctx).await,
                AgentState::ToolDispatch(call) => self.dispatch(&mut turn, call).await,
                AgentState::Responding(text) => {
                    turn.messages.push(Message::assistant(text));
                    AgentState::Terminated
                }
                AgentState::Terminated => break,
            };
        }
        turn.terminated = true;

        info!(
            thread_id = %thread_id,
            model_calls = ctx.model_calls,
            retrievals = turn.retrieval_attempts,
            "Turn finished"
        );
    }

    async fn think(&self, turn: &mut ConversationTurn, ctx: &mut TurnContext) -> AgentState {
        if let Some(Message::ToolResult {
            tool_name: ToolName::RecordUnansweredQuestion,
            ..
        }) = turn.messages.last()
        {
            debug!(thread_id = %ctx.thread_id, "Escalation recorded, answering without the model");
            let text = self.text("agent-escalation-apology");
            ctx.synthesize(&text).await;
            return AgentState::Responding(text);
        }

        if ctx.model_calls >= self.config.max_model_calls {
            warn!(
                thread_id = %ctx.thread_id,
                limit = self.config.max_model_calls,
                "Model call limit reached"
            );
            if let Some(query) = turn.current_query() {
                let args = EscalationArgs {
                    query: query.to_string(),
                    reason: self.text("agent-step-limit-reason"),
                };
                self.record_escalation(&args).await;
            }
            let text = self.text("agent-step-limit");
            ctx.synthesize(&text).await;
            return AgentState::Responding(text);
        }

        let retrieval_used =
            retrieval_used_this_turn(&turn.messages) || turn.retrieval_attempts >= RETRIEVAL_BUDGET;
        let offered: &[ToolName] = if retrieval_used {
            &[ToolName::RecordUnansweredQuestion]
        } else {
            &[ToolName::SearchFactoryKnowledge, ToolName::RecordUnansweredQuestion]
        };

        let request = ModelRequest {
            system: prompts::system_prompt(&self.config.locale).to_string(),
            messages: self.prepare_messages(&turn.messages).await,
            tools: REGISTRY.definitions(offered),
        };

        ctx.model_calls += 1;
        let step = ctx.begin_step();
        debug!(
            thread_id = %ctx.thread_id,
            step,
            messages = request.messages.len(),
            retrieval_used,
            "Calling model"
        );

        let ModelStep { reply, guard } = match self.call_model(request, step, ctx).await {
            Ok(output) => output,
            Err(e) => {
                metrics::counter!("factory_model_failures_total").increment(1);
                error!(thread_id = %ctx.thread_id, error = %describe(&e), "Model call failed");
                let text = self.format("agent-model-failure", &[("reason", &describe(&e))]);
                ctx.synthesize(&text).await;
                return AgentState::Responding(text);
            }
        };

        let has_markup = guard.suppressed() || recovery::contains_tool_markup(&reply.content);
        let visible = if has_markup {
            recovery::strip(&reply.content)
        } else {
            reply.content.clone()
        };

        if let Some(call) = self.select_call(&reply, retrieval_used, turn) {
            ctx.send(TurnEvent::ModelFinal {
                step,
                text: visible.clone(),
            })
            .await;
            turn.messages.push(Message::Assistant {
                content: visible,
                tool_calls: vec![ToolCall {
                    id: call.id.clone(),
                    name: call.name.to_string(),
                    arguments: call.arguments.clone(),
                }],
            });
            return AgentState::ToolDispatch(call);
        }

        // Plain answer. Text held back by the guard that turned out to be
        // ordinary prose still has to reach the caller.
        if guard.suppressed()
            && let Some(rest) = unemitted_remainder(guard.released(), &visible)
        {
            ctx.send(TurnEvent::Delta { step, text: rest }).await;
        }
        ctx.send(TurnEvent::ModelFinal {
            step,
            text: visible.clone(),
        })
        .await;

        if visible.trim().is_empty() {
            warn!(thread_id = %ctx.thread_id, "Model returned no usable content");
            let text = self.text("agent-empty-response");
            ctx.synthesize(&text).await;
            return AgentState::Responding(text);
        }

        AgentState::Responding(visible)
    }

    /// The conversation as sent to the model: the latest tool result gets its
    /// images inlined; stored history keeps the text form.
    async fn prepare_messages(&self, messages: &[Message]) -> Vec<Message> {
        let mut prepared = messages.to_vec();
        if let Some(last) = prepared.pop() {
            prepared.push(self.adapter.adapt(last).await);
        }
        prepared
    }

    async fn call_model(
        &self,
        request: ModelRequest,
        step: u32,
        ctx: &TurnContext,
    ) -> Result<ModelStep, ModelError> {
        let mut stream = self.model.complete(request).await?;
        let mut guard = TagGuard::new();
        let mut reply = None;

        while let Some(event) = stream.next().await {
            match event? {
                ModelEvent::Delta(text) => {
                    if let Some(safe) = guard.push(&text) {
                        ctx.send(TurnEvent::Delta { step, text: safe }).await;
                    }
                }
                ModelEvent::Finished(finished) => {
                    reply = Some(finished);
                    break;
                }
            }
        }

        let reply = reply.ok_or_else(|| ModelError::Stream {
            message: "stream ended before the completion finished".to_string(),
        })?;

        if let Some(rest) = guard.finish() {
            ctx.send(TurnEvent::Delta { step, text: rest }).await;
        }

        Ok(ModelStep { reply, guard })
    }

    /// Pick the one tool call to execute, enforcing the retrieval budget.
    fn select_call(
        &self,
        reply: &ModelReply,
        retrieval_used: bool,
        turn: &ConversationTurn,
    ) -> Option<PendingCall> {
        let mut calls: Vec<PendingCall> = reply
            .tool_calls
            .iter()
            .filter_map(|call| match ToolName::from_str(&call.name) {
                Ok(name) => Some(PendingCall {
                    id: call.id.clone(),
                    name,
                    arguments: call.arguments.clone(),
                }),
                Err(_) => {
                    warn!(tool = %call.name, "Model called an unknown tool, ignoring it");
                    None
                }
            })
            .collect();

        if calls.is_empty() && recovery::contains_tool_markup(&reply.content) {
            calls = recovery::recover(&reply.content)
                .into_iter()
                .map(|recovered| PendingCall {
                    id: format!("recovered_{}", Uuid::new_v4().simple()),
                    name: recovered.name,
                    arguments: recovered.arguments,
                })
                .collect();
            if calls.is_empty() {
                warn!("Malformed tool markup could not be recovered, answering with the text");
            } else {
                info!(tool = %calls[0].name, "Recovered tool call from malformed output");
            }
        }

        if calls.len() > 1 {
            warn!(
                executed = %calls[0].name,
                dropped = calls.len() - 1,
                "Model requested several tools, executing only the first"
            );
        }
        let mut call = calls.into_iter().next()?;

        if call.name == ToolName::SearchFactoryKnowledge && retrieval_used {
            warn!("Second knowledge base search this turn, escalating instead");
            call.name = ToolName::RecordUnansweredQuestion;
            call.arguments = json!({
                "query": turn.current_query().unwrap_or_default(),
                "reason": self.text("agent-forced-escalation-reason"),
            });
        }

        Some(call)
    }

    async fn dispatch(&self, turn: &mut ConversationTurn, call: PendingCall) -> AgentState {
        if turn.terminated {
            warn!(tool = %call.name, "Turn already terminated, tool call not executed");
            return AgentState::Terminated;
        }

        debug!(tool = %call.name, arguments = %call.arguments, "Executing tool");

        let content = match call.name {
            ToolName::SearchFactoryKnowledge => match parse_arguments::<SearchArgs>(&call.arguments) {
                Ok(args) => {
                    turn.retrieval_attempts += 1;
                    self.retrieval.search(&args.query).await
                }
                Err(e) => {
                    warn!(error = %e, "Invalid search arguments");
                    self.format("agent-tool-args-invalid", &[("reason", &e.to_string())])
                }
            },
            ToolName::RecordUnansweredQuestion => {
                let user_query = turn.current_query().unwrap_or_default().to_string();
                let args = parse_arguments::<EscalationArgs>(&call.arguments)
                    .ok()
                    .filter(|args| !args.query.trim().is_empty())
                    .unwrap_or_else(|| EscalationArgs {
                        query: user_query,
                        reason: self.text("agent-forced-escalation-reason"),
                    });
                self.record_escalation(&args).await
            }
        };

        turn.messages.push(Message::ToolResult {
            tool_call_id: call.id,
            tool_name: call.name,
            content: MessageContent::Text(content),
        });
        AgentState::Thinking
    }

    async fn record_escalation(&self, args: &EscalationArgs) -> String {
        match self.escalation.record(&args.query, &args.reason).await {
            Ok(RecordOutcome::Recorded) => {
                self.format("agent-escalation-recorded", &[("query", &args.query)])
            }
            Ok(RecordOutcome::Duplicate) => {
                self.format("agent-escalation-duplicate", &[("query", &args.query)])
            }
            Err(e) => {
                error!(error = %describe(&e), "Failed to record unanswered question");
                self.format("agent-escalation-failed", &[("reason", &describe(&e))])
            }
        }
    }
}

/// Part of `visible` not yet streamed, given what the tag guard already released.
fn unemitted_remainder(released: &str, visible: &str) -> Option<String> {
    let rest = visible.strip_prefix(released.trim())?;
    let rest = if released.ends_with(char::is_whitespace) {
        rest.trim_start()
    } else {
        rest
    };
    if rest.trim().is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}
