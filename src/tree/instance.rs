//! The runtime `Instance` graph the reconciler materialises from an `Element` tree
//! (spec §3 / §4.2). Instances hold no parent pointer; ancestor information is threaded
//! through a [`super::HostContext`] during descent instead (see module docs).

use std::sync::Arc;

use serde_json::Value;

use crate::llm::ChatModel;
use crate::store::AgentStore;
use crate::tool::Tool;
use crate::tree::Element;

use super::{AgentConfig, ConditionPredicate, McpServerConfig, SdkToolKind};

/// A materialised node. Mirrors [`Element`] one-for-one except `Agent`/`Subagent`,
/// which carry resolved configuration and (for `Agent`) an owned store and aggregates
/// instead of the element's raw children list.
pub enum Instance {
    Agent(AgentInstance),
    Subagent(SubagentInstance),
    Tool(Arc<Tool>),
    SdkTool(SdkToolKind),
    System { content: String, ephemeral: bool },
    Message(crate::message::ConversationMessage),
    ToolsContainer(Vec<Instance>),
    McpServer(McpServerConfig),
    Condition(ConditionInstance),
    AgentTool(AgentToolInstance),
}

/// A system-prompt part as it appears in the agent's aggregated `system_parts`
/// (spec §3 "System/Context Instance"; Context is collapsed into System per §9a).
#[derive(Clone, Debug)]
pub struct SystemPart {
    pub content: String,
    pub ephemeral: bool,
}

/// The runtime representation of a root configured agent (spec §3 "Agent Instance").
/// Owns its [`AgentStore`] exclusively; never appears as a descendant of another
/// `AgentInstance` (enforced at materialise time, see `reconciler::materialize`).
pub struct AgentInstance {
    pub config: AgentConfig,
    pub store: Arc<AgentStore>,
    pub client: Arc<dyn ChatModel>,
    pub children: Vec<Instance>,
    pub tools: Vec<Arc<Tool>>,
    pub sdk_tools: Vec<SdkToolKind>,
    pub system_parts: Vec<SystemPart>,
    pub mcp_servers: Vec<McpServerConfig>,
}

impl AgentInstance {
    pub fn new(config: AgentConfig, client: Arc<dyn ChatModel>) -> Self {
        Self {
            config,
            store: Arc::new(AgentStore::new()),
            client,
            children: Vec::new(),
            tools: Vec::new(),
            sdk_tools: Vec::new(),
            system_parts: Vec::new(),
            mcp_servers: Vec::new(),
        }
    }

    pub fn system_prompt(&self) -> Option<String> {
        if self.system_parts.is_empty() {
            None
        } else {
            Some(
                self.system_parts
                    .iter()
                    .map(|part| part.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            )
        }
    }
}

/// A Subagent Instance: not executed until its synthetic tool is invoked. Holds the
/// resolved configuration and a reference to the subtree to render on spawn (spec §3
/// "Subagent Instance").
pub struct SubagentInstance {
    pub name: String,
    pub description: Option<String>,
    pub config: AgentConfig,
    pub subtree: Vec<Element>,
}

pub struct ConditionInstance {
    pub predicate: ConditionPredicate,
    pub active: bool,
    pub children: Vec<Instance>,
}

/// A realised Agent-Tool Instance: the declarative definition plus, once collected, the
/// synthetic [`Tool`] wrapping it (populated by `subagent_tool::synthesize`, C6).
pub struct AgentToolInstance {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub render: Arc<dyn Fn(Value) -> Vec<Element> + Send + Sync>,
    pub synthesized: Option<Arc<Tool>>,
}
