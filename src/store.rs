//! Agent execution state and the message-log store (C3).
//!
//! The store is the sole writer of an agent's message log (see the data-model
//! invariant that collectors never mutate the log directly) and the sole owner of the
//! agent's [`ExecutionState`]. Both are exposed as action methods rather than public
//! mutable fields so every mutation goes through one place.

use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::message::ConversationMessage;

/// A tool call the engine is waiting on or currently dispatching.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// The agent's execution status (spec §4.1). Observed through [`AgentStore::subscribe`]
/// rather than polled, matching the teacher's preference for explicit inspectable state
/// over hidden reactivity.
#[derive(Clone, Debug)]
pub enum ExecutionState {
    Idle,
    Streaming { cancel_handle: CancellationToken },
    WaitingForTools { pending: Vec<PendingToolCall> },
    ExecutingTools { pending: Vec<PendingToolCall> },
    Completed { final_message: ConversationMessage },
    Error { message: String },
}

impl ExecutionState {
    pub fn can_accept_messages(&self) -> bool {
        matches!(self, ExecutionState::Idle | ExecutionState::Completed { .. })
    }

    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            ExecutionState::Streaming { .. }
                | ExecutionState::WaitingForTools { .. }
                | ExecutionState::ExecutingTools { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed { .. } | ExecutionState::Error { .. }
        )
    }
}

/// Per-agent mutable state: the append-ordered message log plus the current
/// [`ExecutionState`]. Owned exclusively by one Agent Instance (root or subagent); never
/// shared between a subagent and its parent (data-model invariant 6).
pub struct AgentStore {
    messages: Mutex<Vec<ConversationMessage>>,
    state_tx: watch::Sender<ExecutionState>,
}

impl AgentStore {
    pub fn new() -> Self {
        let (state_tx, _rx) = watch::channel(ExecutionState::Idle);
        Self {
            messages: Mutex::new(Vec::new()),
            state_tx,
        }
    }

    pub async fn messages(&self) -> Vec<ConversationMessage> {
        self.messages.lock().await.clone()
    }

    pub async fn push_message(&self, message: ConversationMessage) {
        self.messages.lock().await.push(message);
    }

    pub async fn push_messages(&self, new_messages: impl IntoIterator<Item = ConversationMessage>) {
        self.messages.lock().await.extend(new_messages);
    }

    /// Replaces the entire log, used by compaction (§4.5.1) when a summary is produced.
    pub async fn replace_messages(&self, messages: Vec<ConversationMessage>) {
        *self.messages.lock().await = messages;
    }

    /// Removes a message by its stable identity (§9 open question c) rather than by
    /// content equality.
    pub async fn remove_message(&self, id: Uuid) {
        self.messages.lock().await.retain(|message| message.id != id);
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }

    pub fn state(&self) -> ExecutionState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.state_tx.subscribe()
    }

    /// Applies a transition. The legal-transition table (spec §4.1) is enforced by the
    /// engine, which is the only caller; the store itself accepts any state so tests can
    /// drive it directly.
    pub fn transition(&self, new_state: ExecutionState) {
        let _ = self.state_tx.send(new_state);
    }
}

impl Default for AgentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_and_read_round_trips() {
        let store = AgentStore::new();
        store.push_message(ConversationMessage::user("hi")).await;
        assert_eq!(store.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn remove_by_identity_leaves_others_untouched() {
        let store = AgentStore::new();
        let keep = ConversationMessage::user("keep");
        let drop = ConversationMessage::user("drop");
        let drop_id = drop.id;
        store.push_message(keep.clone()).await;
        store.push_message(drop).await;

        store.remove_message(drop_id).await;

        let remaining = store.messages().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep.id);
    }

    #[test]
    fn state_predicates_match_spec_table() {
        assert!(ExecutionState::Idle.can_accept_messages());
        assert!(!ExecutionState::Idle.is_processing());
        assert!(ExecutionState::WaitingForTools { pending: vec![] }.is_processing());
        assert!(!ExecutionState::WaitingForTools { pending: vec![] }.can_accept_messages());
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let store = AgentStore::new();
        let mut rx = store.subscribe();
        store.transition(ExecutionState::Streaming {
            cancel_handle: CancellationToken::new(),
        });
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_processing());
    }
}
