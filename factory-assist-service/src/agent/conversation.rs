//! Per-thread conversation state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::llm::Message;
use crate::tools::ToolName;

/// Working state of one conversation thread
#[derive(Debug)]
pub struct ConversationTurn {
    pub messages: Vec<Message>,
    /// Retrieval calls executed since the last user message
    pub retrieval_attempts: usize,
    /// Set when the current turn has ended; no tool runs after that
    pub terminated: bool,
    last_active: Instant,
}

impl Default for ConversationTurn {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            retrieval_attempts: 0,
            terminated: false,
            last_active: Instant::now(),
        }
    }
}

impl ConversationTurn {
    /// Start a new user turn
    pub fn begin(&mut self, query: &str) {
        self.retrieval_attempts = 0;
        self.terminated = false;
        self.last_active = Instant::now();
        self.messages.push(Message::user(query));
    }

    /// Drop whole earlier turns, oldest first, until at most `max_messages`
    /// remain. The current turn is always kept, so tool calls stay paired with
    /// their results.
    pub fn trim_history(&mut self, max_messages: usize) {
        if self.messages.len() <= max_messages {
            return;
        }
        let excess = self.messages.len() - max_messages;
        let last_user = self.messages.iter().rposition(Message::is_user).unwrap_or(0);
        let cut = self
            .messages
            .iter()
            .enumerate()
            .skip(excess)
            .find(|(_, m)| m.is_user())
            .map_or(last_user, |(index, _)| index.min(last_user));
        self.messages.drain(..cut);
    }

    /// The user message that opened the current turn
    pub fn current_query(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::User { content } => Some(content.as_str()),
            _ => None,
        })
    }
}

/// Whether the retrieval tool already ran since the last user message.
pub fn retrieval_used_this_turn(messages: &[Message]) -> bool {
    messages
        .iter()
        .rev()
        .take_while(|m| !m.is_user())
        .any(|m| {
            matches!(
                m,
                Message::ToolResult {
                    tool_name: ToolName::SearchFactoryKnowledge,
                    ..
                }
            )
        })
}

/// Conversations keyed by thread id.
///
/// Threads idle for longer than `idle_ttl` are dropped the next time a thread
/// is looked up. A thread with a turn in progress is never dropped.
pub struct ConversationStore {
    threads: DashMap<String, Arc<Mutex<ConversationTurn>>>,
    idle_ttl: Duration,
}

impl ConversationStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            threads: DashMap::new(),
            idle_ttl,
        }
    }

    /// The thread's state, created empty on first use
    pub fn get_or_create(&self, thread_id: &str) -> Arc<Mutex<ConversationTurn>> {
        self.evict_idle(Instant::now());
        self.threads
            .entry(thread_id.to_string())
            .or_default()
            .clone()
    }

    fn evict_idle(&self, now: Instant) {
        let before = self.threads.len();
        self.threads.retain(|_, conversation| match conversation.try_lock() {
            Ok(turn) => now.saturating_duration_since(turn.last_active) < self.idle_ttl,
            Err(_) => true,
        });
        let evicted = before.saturating_sub(self.threads.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.threads.len(), "Evicted idle conversation threads");
        }
    }

    #[cfg(test)]
    pub fn get(&self, thread_id: &str) -> Option<Arc<Mutex<ConversationTurn>>> {
        self.threads.get(thread_id).map(|entry| entry.value().clone())
    }
}
