//! Agent Handle & Spawn Context wiring (C9, spec §4.6): the public control object a
//! caller drives a root agent through, and the closure that lets tool handlers spawn
//! independent subagent runs without `engine`/`reconciler` depending on this module.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::engine::{self, EngineEvent};
use crate::error::{AgentError, ConfigurationError};
use crate::llm::ChatModel;
use crate::message::{ConversationMessage, StopReason};
use crate::reconciler;
use crate::spawn::{SpawnFn, SpawnOverrides, SpawnResult, ToolContext};
use crate::store::ExecutionState;
use crate::tree::{AgentConfig, AgentElement, AgentInstance, Element, HostContext, Instance};

/// The public control object for a root agent (spec §3 "Agent Handle"). Owns the
/// materialised [`AgentInstance`] and the run's root [`CancellationToken`]; tool
/// handlers never see either directly, only through the [`ToolContext`] built for them.
pub struct AgentHandle {
    agent: AgentInstance,
    client: Arc<dyn ChatModel>,
    root_cancel: CancellationToken,
    has_run: AtomicBool,
}

impl AgentHandle {
    /// Materialises `root` (which must be an `Element::Agent`) against a fresh
    /// [`HostContext::root`] and seeds any top-level `Message` children into the store.
    pub async fn new(root: Element, client: Arc<dyn ChatModel>) -> Result<Self, ConfigurationError> {
        let host = HostContext::root(client.clone());
        let instance = reconciler::materialize(root, &host)?;
        let agent = match instance {
            Instance::Agent(agent) => agent,
            _ => return Err(ConfigurationError::NestedAgent),
        };
        reconciler::seed_messages(&agent).await;

        Ok(Self {
            agent,
            client,
            root_cancel: CancellationToken::new(),
            has_run: AtomicBool::new(false),
        })
    }

    /// The agent's current execution state, observed through the store (spec §4.1).
    pub fn state(&self) -> ExecutionState {
        self.agent.store.state()
    }

    /// An immutable snapshot of the message log.
    pub async fn messages(&self) -> Vec<ConversationMessage> {
        self.agent.store.messages().await
    }

    /// Runs the agent to completion starting from a single seed user message. Single-shot
    /// per handle: a second call returns [`AgentError::AlreadyRunning`] (spec §4.6).
    pub async fn run(&mut self, initial_user_message: impl Into<String>) -> Result<String, AgentError> {
        if self.has_run.swap(true, Ordering::SeqCst) {
            return Err(AgentError::AlreadyRunning);
        }
        self.agent
            .store
            .push_message(ConversationMessage::user(initial_user_message))
            .await;
        self.drive_to_completion().await
    }

    /// Appends a user message and drives the agent to its next completion. Rejected while
    /// a run is already in flight (spec §4.6).
    pub async fn send_message(&mut self, text: impl Into<String>) -> Result<String, AgentError> {
        if self.agent.store.state().is_processing() {
            return Err(AgentError::AlreadyRunning);
        }
        self.has_run.store(true, Ordering::SeqCst);
        self.agent.store.push_message(ConversationMessage::user(text)).await;
        self.drive_to_completion().await
    }

    /// Appends a user message and returns a stream of lifecycle events, ending with
    /// [`EngineEvent::Complete`] (spec §4.6 `stream`).
    pub fn stream<'a>(
        &'a mut self,
        text: impl Into<String> + 'a,
    ) -> impl futures_util::Stream<Item = Result<EngineEvent, AgentError>> + 'a {
        self.has_run.store(true, Ordering::SeqCst);
        async_stream::try_stream! {
            self.agent.store.push_message(ConversationMessage::user(text)).await;
            let ctx = self.build_tool_context();
            let inner = engine::run(&mut self.agent, self.root_cancel.clone(), ctx);
            futures_util::pin_mut!(inner);
            while let Some(event) = inner.next().await {
                yield event?;
            }
        }
    }

    /// Cancels the run's root token (spec §4.5.2). Idempotent; safe from any task.
    pub fn abort(&self) {
        self.root_cancel.cancel();
    }

    /// A clone of the run's root cancellation token (spec §5 "safe to invoke from any
    /// task"). Lets a caller trigger the same cancellation `abort()` would from a task
    /// that doesn't otherwise hold `&self` — e.g. one racing against an in-flight
    /// `stream()` call, which holds `&mut self` for its whole lifetime.
    pub fn cancel_token(&self) -> CancellationToken {
        self.root_cancel.clone()
    }

    /// Aborts any in-flight run, then unmounts the tree: clears the agent's materialised
    /// children and aggregates deterministically (spec §4.6 `close`).
    pub fn close(&mut self) {
        self.abort();
        self.agent.children.clear();
        self.agent.tools.clear();
        self.agent.sdk_tools.clear();
        self.agent.system_parts.clear();
        self.agent.mcp_servers.clear();
    }

    async fn drive_to_completion(&mut self) -> Result<String, AgentError> {
        let ctx = self.build_tool_context();
        let stream = engine::run(&mut self.agent, self.root_cancel.clone(), ctx);
        futures_util::pin_mut!(stream);

        let mut final_content = None;
        while let Some(event) = stream.next().await {
            match event {
                Ok(EngineEvent::Complete { content, .. }) => final_content = Some(content),
                Ok(EngineEvent::Message(message)) => {
                    if let Some(on_message) = &self.agent.config.callbacks.on_message {
                        on_message(message);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    if let Some(on_error) = &self.agent.config.callbacks.on_error {
                        on_error(&err);
                    }
                    return Err(err);
                }
            }
        }

        final_content.ok_or(AgentError::MissingFinalResponse)
    }

    fn build_tool_context(&self) -> ToolContext {
        let spawn_fn = build_spawn_fn(self.client.clone(), self.agent.config.clone());
        ToolContext::new(
            self.agent.config.name.clone(),
            self.client.clone(),
            self.agent.config.model.clone(),
            self.root_cancel.clone(),
            spawn_fn,
        )
    }
}

/// Builds the `spawn_agent` closure threaded through every [`ToolContext`] (spec §4.6):
/// wraps a subagent/agent-tool's declarative subtree in a fresh `Element::Agent`,
/// resolves its configuration against `parent_config` and the caller's overrides,
/// materialises and runs it to completion on its own store, independent of the spawning
/// agent's event stream. Recurses into itself so a subagent's own tool handlers can spawn
/// further subagents (spec §4.3 "Subagent Synthetic Tool").
///
/// Receives the *spawning* `ToolContext` and the new subagent's `name` on every call, so
/// `parent_ctx.descend(...)` genuinely extends the live ancestor chain instead of each
/// spawn starting a fresh, empty one — this is what makes `ctx.has_visited`/
/// `host.has_visited` cycle detection (spec §4.3/§9) actually fire.
fn build_spawn_fn(client: Arc<dyn ChatModel>, parent_config: AgentConfig) -> Arc<SpawnFn> {
    Arc::new(move |parent_ctx: ToolContext, name: String, subtree: Vec<Element>, overrides: SpawnOverrides| {
        let client = client.clone();
        let parent_config = parent_config.clone();
        Box::pin(async move {
            let model = overrides.model.unwrap_or_else(|| parent_config.model.clone());
            let mut config = AgentConfig::new(model.clone());
            config.max_tokens = overrides
                .max_tokens
                .unwrap_or_else(|| (parent_config.max_tokens / 2).max(1));
            config.max_iterations = (parent_config.max_iterations / 2).max(1);
            config.temperature = overrides.temperature.or(parent_config.temperature);
            config.thinking = parent_config.thinking.clone();
            config.betas = parent_config.betas.clone();
            config.compaction = parent_config.compaction.clone();

            let cancel = parent_ctx.cancel.child_token();
            let spawn_fn = build_spawn_fn(client.clone(), config.clone());
            let ctx = parent_ctx.descend(&name, model, cancel.clone(), spawn_fn);

            let root_element = Element::Agent(AgentElement {
                config,
                children: subtree,
            });
            let host = HostContext::root_with_ancestors(client.clone(), ctx.spawn_chain().to_vec());
            let instance = reconciler::materialize(root_element, &host)?;
            let mut agent = match instance {
                Instance::Agent(agent) => agent,
                _ => unreachable!("materialize(Element::Agent(..)) always yields Instance::Agent"),
            };
            reconciler::seed_messages(&agent).await;

            let stream = engine::run(&mut agent, cancel, ctx);
            futures_util::pin_mut!(stream);

            let mut content = String::new();
            let mut stop_reason = StopReason::EndTurn;
            while let Some(event) = stream.next().await {
                if let EngineEvent::Complete {
                    content: final_content,
                    stop_reason: final_stop_reason,
                } = event?
                {
                    content = final_content;
                    stop_reason = final_stop_reason;
                }
            }

            Ok(SpawnResult { content, stop_reason })
        })
    })
}
