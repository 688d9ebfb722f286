//! Declarative configuration tree (C4): the `Element` builder API a caller authors
//! against, and the `Instance` graph the reconciler materialises from it.
//!
//! Parent links are deliberately not stored on instances. Operations that need
//! ancestor context (root-store lookup, cycle detection) thread a [`HostContext`] down
//! during tree descent instead, per the design note that the teacher's "host context"
//! concept is a value pushed from parent to child rather than a pointer held by the
//! child.

mod element;
mod instance;

pub use element::*;
pub use instance::*;

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::llm::ChatModel;
use crate::message::ConversationMessage;

/// Which context-management-style beta flag an SDK tool requires, if any (§4.2 collect
/// rule: "memory → context-management, code-execution → code-execution, web-search →
/// none").
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Beta {
    ContextManagement,
    CodeExecution,
    Mcp,
    Named(String),
}

impl Beta {
    pub fn as_flag(&self) -> String {
        match self {
            Beta::ContextManagement => "context-management-2025-06-27".to_string(),
            Beta::CodeExecution => "code-execution-2025-05-22".to_string(),
            Beta::Mcp => "mcp-client-2025-04-04".to_string(),
            Beta::Named(flag) => flag.clone(),
        }
    }
}

/// The built-in SDK-tool kinds (spec §3 "Tool Instance / SDK-Tool Instance"). Memory is
/// the one kind with a client-side handler contract (§6.3 / C14); the others are opaque
/// descriptors forwarded to the chat service.
#[derive(Clone, Debug)]
pub enum SdkToolKind {
    WebSearch,
    CodeExecution,
    Memory { root: std::path::PathBuf },
}

impl SdkToolKind {
    pub fn beta(&self) -> Option<Beta> {
        match self {
            SdkToolKind::WebSearch => None,
            SdkToolKind::CodeExecution => Some(Beta::CodeExecution),
            SdkToolKind::Memory { .. } => Some(Beta::ContextManagement),
        }
    }

    pub fn wire_type(&self) -> &'static str {
        match self {
            SdkToolKind::WebSearch => "web_search",
            SdkToolKind::CodeExecution => "code_execution",
            SdkToolKind::Memory { .. } => "memory",
        }
    }
}

#[derive(Clone, Debug)]
pub struct McpServerConfig {
    pub name: String,
    pub url: String,
    pub auth_token: Option<String>,
}

/// A condition's gate, evaluated by the condition evaluator (§4.4, C7).
#[derive(Clone, Debug)]
pub enum ConditionPredicate {
    Bool(bool),
    NaturalLanguage(String),
}

/// A thinking-mode request, passed through verbatim to the chat client (§6.1).
#[derive(Clone, Debug)]
pub struct ThinkingConfig {
    pub enabled: bool,
    pub budget_tokens: u32,
}

/// Compaction policy (§4.5.1).
#[derive(Clone, Debug)]
pub struct CompactionConfig {
    pub enabled: bool,
    pub threshold_tokens: u64,
    pub model: Option<String>,
    pub summary_prompt: String,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_tokens: 100_000,
            model: None,
            summary_prompt: "Summarize the conversation so far, preserving any facts, \
                decisions, and open threads a continuation would need."
                .to_string(),
        }
    }
}

/// Lifecycle callbacks, invoked for the caller's benefit. Never inherited by subagents
/// (§4.2 create rule: "callbacks never inherit").
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_message: Option<Arc<dyn Fn(ConversationMessage) + Send + Sync>>,
    pub on_complete: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub on_error: Option<Arc<dyn Fn(&crate::error::AgentError) + Send + Sync>>,
    pub on_step_finish: Option<Arc<dyn Fn(&crate::engine::StepFinish) + Send + Sync>>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_message", &self.on_message.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_step_finish", &self.on_step_finish.is_some())
            .finish()
    }
}

/// The fully resolved configuration record an Agent or Subagent Instance carries
/// (spec §3 "Agent Instance" attributes).
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub model: String,
    pub max_tokens: u32,
    pub max_iterations: u32,
    pub stop_sequences: Vec<String>,
    pub temperature: Option<f32>,
    pub stream: bool,
    pub thinking: Option<ThinkingConfig>,
    pub betas: BTreeSet<Beta>,
    pub compaction: CompactionConfig,
    pub name: Option<String>,
    pub description: Option<String>,
    pub callbacks: Callbacks,
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 4096,
            max_iterations: 25,
            stop_sequences: Vec::new(),
            temperature: None,
            stream: false,
            thinking: None,
            betas: BTreeSet::new(),
            compaction: CompactionConfig::default(),
            name: None,
            description: None,
            callbacks: Callbacks::default(),
        }
    }
}

/// Partial configuration overrides supplied on a Subagent element; unset fields are
/// resolved against the parent's [`AgentConfig`] at create time (§4.2).
#[derive(Clone, Debug, Default)]
pub struct AgentConfigOverrides {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub max_iterations: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
    pub temperature: Option<f32>,
    pub stream: Option<bool>,
    pub thinking: Option<ThinkingConfig>,
    pub betas: Option<BTreeSet<Beta>>,
    pub compaction: Option<CompactionConfig>,
}

impl AgentConfigOverrides {
    /// Resolves subagent configuration against the parent's, implementing the
    /// inheritance rules in §4.2: `max_tokens` halves (floored) if unset, else 4096;
    /// `max_iterations` halves similarly; the rest inherit verbatim when unset.
    pub fn resolve(&self, parent: &AgentConfig, model: String) -> AgentConfig {
        AgentConfig {
            model,
            max_tokens: self
                .max_tokens
                .unwrap_or_else(|| (parent.max_tokens / 2).max(1)),
            max_iterations: self
                .max_iterations
                .unwrap_or_else(|| (parent.max_iterations / 2).max(1)),
            stop_sequences: self
                .stop_sequences
                .clone()
                .unwrap_or_else(|| parent.stop_sequences.clone()),
            temperature: self.temperature.or(parent.temperature),
            stream: self.stream.unwrap_or(parent.stream),
            thinking: self.thinking.clone().or_else(|| parent.thinking.clone()),
            betas: self.betas.clone().unwrap_or_else(|| parent.betas.clone()),
            compaction: self.compaction.clone().unwrap_or_else(|| parent.compaction.clone()),
            name: None,
            description: None,
            callbacks: Callbacks::default(),
        }
    }
}

/// Context pushed from parent to child during a tree walk: the chat client shared by
/// inheritance, the root store (for cycle/"Agent nested in Agent" checks), and the
/// chain of ancestor agent/subagent names walked so far (cycle detection, §4.3/§9).
#[derive(Clone)]
pub struct HostContext {
    pub client: Arc<dyn ChatModel>,
    pub ancestor_names: Vec<String>,
    pub inside_agent: bool,
    /// The nearest enclosing Agent/Subagent's resolved configuration, used to resolve
    /// a nested Subagent element's inheritable fields at create time (§4.2).
    pub parent_config: Option<AgentConfig>,
}

impl HostContext {
    pub fn root(client: Arc<dyn ChatModel>) -> Self {
        Self {
            client,
            ancestor_names: Vec::new(),
            inside_agent: false,
            parent_config: None,
        }
    }

    /// Like [`Self::root`], but seeded with the ancestor chain already walked to reach
    /// this materialisation — used when re-materialising a spawned subagent's own
    /// subtree, so a Subagent element nested inside it that shares a name with one of
    /// its own ancestors is still caught by `has_visited` (spec §9).
    pub fn root_with_ancestors(client: Arc<dyn ChatModel>, ancestor_names: Vec<String>) -> Self {
        Self {
            client,
            ancestor_names,
            inside_agent: false,
            parent_config: None,
        }
    }

    pub fn descend_into_agent(&self, config: &AgentConfig) -> Self {
        Self {
            client: self.client.clone(),
            ancestor_names: self.ancestor_names.clone(),
            inside_agent: true,
            parent_config: Some(config.clone()),
        }
    }

    pub fn descend_into_subagent(&self, name: &str, config: &AgentConfig) -> Self {
        let mut ancestor_names = self.ancestor_names.clone();
        ancestor_names.push(name.to_string());
        Self {
            client: self.client.clone(),
            ancestor_names,
            inside_agent: true,
            parent_config: Some(config.clone()),
        }
    }

    pub fn has_visited(&self, name: &str) -> bool {
        self.ancestor_names.iter().any(|n| n == name)
    }
}
