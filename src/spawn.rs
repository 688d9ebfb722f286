//! The Tool Context / Spawn Context every tool handler runs with (C10, spec §4.6).

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::llm::ChatModel;
use crate::message::StopReason;
use crate::tree::Element;

/// Per-call overrides a tool handler may supply to `spawn_agent` (spec §4.6): model,
/// max_tokens, temperature, and signal are all optional and otherwise inherit from the
/// spawning context.
#[derive(Clone, Debug, Default)]
pub struct SpawnOverrides {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// The outcome of a completed spawned run, returned to the calling handler (spec §4.6:
/// "their result is returned to the handler").
#[derive(Clone, Debug)]
pub struct SpawnResult {
    pub content: String,
    pub stop_reason: StopReason,
}

pub(crate) type SpawnFn = dyn Fn(ToolContext, String, Vec<Element>, SpawnOverrides) -> BoxFuture<'static, Result<SpawnResult, AgentError>>
    + Send
    + Sync;

/// Passed to every tool handler invocation (spec §4.6). Carries the agent name, the
/// shared chat client, the agent's current model id, the per-turn cancel signal, and a
/// `spawn_agent` closure that runs a declarative subtree to completion independently of
/// the caller's own event stream.
#[derive(Clone)]
pub struct ToolContext {
    pub agent_name: Option<String>,
    pub client: Arc<dyn ChatModel>,
    pub model: String,
    pub cancel: CancellationToken,
    spawn_fn: Arc<SpawnFn>,
    spawn_chain: Vec<String>,
}

impl ToolContext {
    pub fn new(
        agent_name: Option<String>,
        client: Arc<dyn ChatModel>,
        model: String,
        cancel: CancellationToken,
        spawn_fn: Arc<SpawnFn>,
    ) -> Self {
        Self {
            agent_name,
            client,
            model,
            cancel,
            spawn_fn,
            spawn_chain: Vec::new(),
        }
    }

    /// Runs `subtree` to completion as an independent subagent named `name` (spec §9:
    /// cycle detection "must... match by logical name"). Spawned runs never leak their
    /// store, engine, or callbacks into the caller's event stream (spec §4.6). The
    /// spawned run's root cancel token is a child of this context's own `cancel`, so
    /// aborting the caller aborts every descendant spawn (spec §5).
    ///
    /// Passes this context (and therefore its `spawn_chain`) to the spawn closure so the
    /// child's own context genuinely extends the ancestor chain rather than starting
    /// fresh — see `handle.rs::build_spawn_fn`, the only implementation of `SpawnFn`.
    pub async fn spawn_agent(
        &self,
        name: &str,
        subtree: Vec<Element>,
        overrides: SpawnOverrides,
    ) -> Result<SpawnResult, AgentError> {
        (self.spawn_fn)(self.clone(), name.to_string(), subtree, overrides).await
    }

    /// The chain of subagent/agent-tool names already entered on the way to this call,
    /// used for cycle detection before a nested spawn (spec §4.3/§9).
    pub fn spawn_chain(&self) -> &[String] {
        &self.spawn_chain
    }

    pub fn has_visited(&self, name: &str) -> bool {
        self.spawn_chain.iter().any(|n| n == name)
    }

    /// Builds the context a nested subagent's own tool handlers will run with: the
    /// spawned run's own cancel child token, model/spawn_fn swapped for the child's own,
    /// and `name` appended to the cycle-detection chain so a grandchild spawn sharing an
    /// ancestor's name is caught by `has_visited` (spec §4.3/§9).
    pub fn descend(&self, name: &str, model: String, cancel: CancellationToken, spawn_fn: Arc<SpawnFn>) -> Self {
        let mut spawn_chain = self.spawn_chain.clone();
        spawn_chain.push(name.to_string());
        Self {
            agent_name: Some(name.to_string()),
            client: self.client.clone(),
            model,
            cancel,
            spawn_fn,
            spawn_chain,
        }
    }
}
