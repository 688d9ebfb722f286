//! # canopy-agent
//!
//! **A declarative tree for building agents, reconciled the way a UI framework
//! reconciles a component tree.**
//!
//! An agent is authored as an [`Element`] tree — an `Agent` wrapping tools, system
//! prompt parts, SDK tools, MCP servers, subagents, and conditionally-active branches —
//! and the [`reconciler`] turns it into a runtime [`AgentInstance`] graph the same way a
//! UI reconciler turns a component tree into a DOM: tools, system parts, and SDK tools
//! are the aggregated "collected" output of walking the tree, and natural-language
//! `Condition` nodes can flip a branch in or out between turns.
//!
//! ## Why this shape?
//! | Capability | `canopy-agent` | A flat `tools: Vec<Tool>` builder | Why this helps |
//! |---|---|---|---|
//! | Composition | Nested `Agent`/`Subagent`/`Condition`/`ToolsContainer` [`Element`]s | One flat list, conditionally built by hand | Conditional tool sets and subagents compose declaratively |
//! | Subagents | A `Subagent` element becomes a synthetic [`Tool`] on collect | Manually wired recursive agent calls | Delegation is just another node in the tree |
//! | Runtime state | [`AgentStore`] + [`ExecutionState`] watched via `tokio::sync::watch` | Ad-hoc flags | Inspectable, race-free state machine |
//! | Provider interface | One trait ([`ChatModel`]), one production adapter ([`AnthropicModel`]) | Provider-specific runtime behavior | Tests substitute a scripted model behind the same seam |
//! | Context growth | Configurable [`CompactionConfig`] summarizes between turns | Ad-hoc truncation in app code | Bounded context without losing the thread |
//!
//! ## Quickstart
//! ```rust,no_run
//! use canopy_agent::handle::AgentHandle;
//! use canopy_agent::llm::AnthropicModel;
//! use canopy_agent::tree::{agent, AgentConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(AnthropicModel::from_env()?);
//! let tree = agent(AgentConfig::new("claude-sonnet-4-5"), vec![]);
//!
//! let mut handle = AgentHandle::new(tree, client).await?;
//! let answer = handle.run("Summarize the task in one line.").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Streaming events
//! ```rust,no_run
//! use canopy_agent::engine::EngineEvent;
//! use canopy_agent::handle::AgentHandle;
//! use canopy_agent::llm::AnthropicModel;
//! use canopy_agent::tree::{agent, AgentConfig};
//! use futures_util::StreamExt;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(AnthropicModel::from_env()?);
//! let tree = agent(AgentConfig::new("claude-sonnet-4-5"), vec![]);
//! let mut handle = AgentHandle::new(tree, client).await?;
//!
//! let stream = handle.stream("Solve this step by step.");
//! futures_util::pin_mut!(stream);
//! while let Some(event) = stream.next().await {
//!     match event? {
//!         EngineEvent::StepFinish(step) => println!("step {}: {}", step.step, step.text),
//!         EngineEvent::Complete { content, .. } => println!("final: {content}"),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Evidence in this repository
//! - Agent state machine transitions and abort semantics: `src/store.rs`, `src/engine/mod.rs`
//! - Tree collect/recollect and subagent synthesis: `src/reconciler.rs`, `src/subagent_tool.rs`
//! - Natural-language condition batching: `src/condition.rs`
//! - Context compaction between turns: `src/engine/compaction.rs`
//! - Provider adapter behind the shared `ChatModel` seam: `src/llm/`

/// Natural-language / boolean condition re-evaluation (C7).
pub mod condition;
/// The turn-loop engine: streaming, tool dispatch, step-finish events, compaction (C8).
pub mod engine;
/// Error types returned by schema validation, tools, the reconciler, and the engine.
pub mod error;
/// The public control object for a root agent, and the subagent spawn closure (C9/C10).
pub mod handle;
/// Provider abstraction and the Anthropic model adapter.
pub mod llm;
/// Typed conversation messages and content blocks.
pub mod message;
/// Tree-diff reconciler: materializes an `Element` tree into an `Instance` graph.
pub mod reconciler;
/// The Tool Context every tool handler runs with.
pub mod spawn;
/// Agent execution state and the message-log store.
pub mod store;
/// Synthesizes the synthetic tool wrapping an Agent-Tool or Subagent Instance.
pub mod subagent_tool;
/// Tool descriptor, JSON-schema validation, and the invocation wrapper.
pub mod tool;
/// Built-in tool implementations (currently: the memory tool).
pub mod tools;
/// The declarative `Element` builder API and the `Instance` runtime graph.
pub mod tree;

/// Runtime control surface.
pub use handle::AgentHandle;
/// Error values exposed by the SDK.
pub use error::{
    AgentError, CompactionError, ConditionError, ConfigurationError, ProviderError, SchemaError,
    ToolError,
};
/// Engine event and step-finish types.
pub use engine::{EngineEvent, StepFinish};
/// Model adapter and the provider-facing chat types.
pub use llm::{AnthropicModel, AnthropicModelConfig, ChatModel, ChatRequest, ChatResponse};
/// Message and content-block primitives.
pub use message::{ContentBlock, ConversationMessage, MessageContent, Role, StopReason, Usage};
/// Tool primitives.
pub use tool::{Tool, ToolOutcome};
/// Declarative tree builders and configuration types.
pub use tree::{
    agent, agent_tool, condition as condition_element, mcp_server, message as message_element,
    sdk_tool, subagent, system, system_ephemeral, tool as tool_element, tools_container,
    AgentConfig, AgentConfigOverrides, CompactionConfig, Element, SdkToolKind, ThinkingConfig,
};
