//! The `Element` builder API: the declarative, caller-authored tree (spec §1 "a JSX
//! syntax... standing in for an explicit `Element` builder API").

use std::sync::Arc;

use serde_json::Value;

use crate::message::ConversationMessage;
use crate::tool::Tool;

use super::{AgentConfig, AgentConfigOverrides, ConditionPredicate, McpServerConfig, SdkToolKind};

/// One node of the declarative configuration tree. Constructed with the free functions
/// below (`agent`, `subagent`, `tool`, ...) rather than built directly, the same way the
/// teacher exposes `ToolSpec::new(...)` constructors instead of bare struct literals.
#[derive(Clone)]
pub enum Element {
    Agent(AgentElement),
    Subagent(SubagentElement),
    Tool(Arc<Tool>),
    SdkTool(SdkToolKind),
    System { content: String, ephemeral: bool },
    Message(ConversationMessage),
    ToolsContainer(Vec<Element>),
    McpServer(McpServerConfig),
    Condition(ConditionElement),
    AgentTool(AgentToolElement),
}

#[derive(Clone)]
pub struct AgentElement {
    pub config: AgentConfig,
    pub children: Vec<Element>,
}

#[derive(Clone)]
pub struct SubagentElement {
    pub name: String,
    pub description: Option<String>,
    pub overrides: AgentConfigOverrides,
    pub children: Vec<Element>,
}

#[derive(Clone)]
pub struct ConditionElement {
    pub predicate: ConditionPredicate,
    pub children: Vec<Element>,
}

/// A declarative "tool that is an agent" (spec §3 "Agent-Tool Instance"). `render` maps
/// validated input to the subtree spawned when the synthetic tool is invoked (§4.3).
#[derive(Clone)]
pub struct AgentToolElement {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub render: Arc<dyn Fn(Value) -> Vec<Element> + Send + Sync>,
}

pub fn agent(config: AgentConfig, children: Vec<Element>) -> Element {
    Element::Agent(AgentElement { config, children })
}

pub fn subagent(
    name: impl Into<String>,
    overrides: AgentConfigOverrides,
    children: Vec<Element>,
) -> Element {
    Element::Subagent(SubagentElement {
        name: name.into(),
        description: None,
        overrides,
        children,
    })
}

pub fn subagent_with_description(
    name: impl Into<String>,
    description: impl Into<String>,
    overrides: AgentConfigOverrides,
    children: Vec<Element>,
) -> Element {
    Element::Subagent(SubagentElement {
        name: name.into(),
        description: Some(description.into()),
        overrides,
        children,
    })
}

pub fn tool(tool: Tool) -> Element {
    Element::Tool(Arc::new(tool))
}

pub fn sdk_tool(kind: SdkToolKind) -> Element {
    Element::SdkTool(kind)
}

pub fn system(content: impl Into<String>) -> Element {
    Element::System {
        content: content.into(),
        ephemeral: false,
    }
}

pub fn system_ephemeral(content: impl Into<String>) -> Element {
    Element::System {
        content: content.into(),
        ephemeral: true,
    }
}

pub fn message(message: ConversationMessage) -> Element {
    Element::Message(message)
}

pub fn tools_container(children: Vec<Element>) -> Element {
    Element::ToolsContainer(children)
}

pub fn mcp_server(config: McpServerConfig) -> Element {
    Element::McpServer(config)
}

pub fn condition(predicate: ConditionPredicate, children: Vec<Element>) -> Element {
    Element::Condition(ConditionElement { predicate, children })
}

pub fn agent_tool<F>(
    name: impl Into<String>,
    description: impl Into<String>,
    schema: Value,
    render: F,
) -> Element
where
    F: Fn(Value) -> Vec<Element> + Send + Sync + 'static,
{
    Element::AgentTool(AgentToolElement {
        name: name.into(),
        description: description.into(),
        schema,
        render: Arc::new(render),
    })
}
