//! Tree-diff reconciler (C5): turns an [`Element`] tree into an [`Instance`] graph and
//! keeps an agent's aggregated tool/system/sdk-tool/mcp-server arrays in sync with the
//! subset of descendants currently contributing (spec §4.2).

use std::sync::Arc;

use crate::error::ConfigurationError;
use crate::message::ConversationMessage;
use crate::store::AgentStore;
use crate::subagent_tool;
use crate::tools::memory::{memory_tool, MemorySandbox};
use crate::tree::{
    AgentElement, AgentInstance, AgentToolElement, AgentToolInstance, ConditionElement,
    ConditionInstance, ConditionPredicate, Element, HostContext, Instance, McpServerConfig,
    SdkToolKind, SubagentElement, SubagentInstance, SystemPart,
};

/// Materialises a declarative tree as the runtime instance graph (spec §4.2 "Create").
/// `host` carries the chat client and ancestor chain; pass [`HostContext::root`] for a
/// fresh root agent.
pub fn materialize(element: Element, host: &HostContext) -> Result<Instance, ConfigurationError> {
    match element {
        Element::Agent(AgentElement { config, children }) => {
            if host.inside_agent {
                return Err(ConfigurationError::NestedAgent);
            }

            let child_host = host.descend_into_agent(&config);
            let mut instance = AgentInstance::new(config, host.client.clone());
            for child in children {
                instance.children.push(materialize(child, &child_host)?);
            }
            collect(&mut instance)?;
            Ok(Instance::Agent(instance))
        }
        Element::Subagent(SubagentElement {
            name,
            description,
            overrides,
            children,
        }) => {
            if name.is_empty() {
                return Err(ConfigurationError::SubagentMissingConfig(name));
            }
            if host.has_visited(&name) {
                return Err(ConfigurationError::SubagentCycle(name));
            }
            let parent_config = host
                .parent_config
                .clone()
                .ok_or(ConfigurationError::MissingRootStore)?;
            let model = overrides.model.clone().unwrap_or_else(|| parent_config.model.clone());
            let resolved = overrides.resolve(&parent_config, model);

            // Walk the subagent's own declared subtree now, with `name` pushed onto the
            // ancestor chain, so a literal self- or mutually-referential Subagent nested
            // inside it is rejected at definition time rather than only at spawn time
            // (spec §9: cycles "must be detected during collect"). The walk's own
            // Instances are discarded; only a cycle error, if any, escapes.
            let child_host = host.descend_into_subagent(&name, &resolved);
            for child in children.clone() {
                materialize(child, &child_host)?;
            }

            Ok(Instance::Subagent(SubagentInstance {
                name,
                description,
                config: resolved,
                subtree: children,
            }))
        }
        Element::Tool(tool) => Ok(Instance::Tool(tool)),
        Element::SdkTool(kind) => Ok(Instance::SdkTool(kind)),
        Element::System { content, ephemeral } => Ok(Instance::System { content, ephemeral }),
        Element::Message(message) => Ok(Instance::Message(message)),
        Element::ToolsContainer(children) => {
            let mut materialized = Vec::with_capacity(children.len());
            for child in children {
                if matches!(child, Element::Agent(_)) {
                    return Err(ConfigurationError::NestedAgent);
                }
                materialized.push(materialize(child, host)?);
            }
            Ok(Instance::ToolsContainer(materialized))
        }
        Element::McpServer(config) => Ok(Instance::McpServer(config)),
        Element::Condition(ConditionElement { predicate, children }) => {
            let active = matches!(&predicate, ConditionPredicate::Bool(true));
            let mut materialized = Vec::with_capacity(children.len());
            for child in children {
                materialized.push(materialize(child, host)?);
            }
            Ok(Instance::Condition(ConditionInstance {
                predicate,
                active,
                children: materialized,
            }))
        }
        Element::AgentTool(AgentToolElement {
            name,
            description,
            schema,
            render,
        }) => Ok(Instance::AgentTool(AgentToolInstance {
            name,
            description,
            schema,
            render,
            synthesized: None,
        })),
    }
}

/// Rebuilds `agent`'s aggregated arrays from its current child tree (spec §4.2
/// "Collect" / "Conditional re-collection"). Implemented as a full recompute rather
/// than incremental splice: the contract only guarantees aggregates are a deterministic
/// function of the current tree (data-model invariant 5), not a particular diff
/// algorithm, so a full walk after each structural change satisfies it directly.
pub fn collect(agent: &mut AgentInstance) -> Result<(), ConfigurationError> {
    agent.tools.clear();
    agent.sdk_tools.clear();
    agent.system_parts.clear();
    agent.mcp_servers.clear();

    let mut tools = Vec::new();
    let mut sdk_tools = Vec::new();
    let mut system_parts = Vec::new();
    let mut mcp_servers = Vec::new();
    let mut seen_tool_names = std::collections::HashSet::new();

    collect_into(
        &mut agent.children,
        &mut tools,
        &mut sdk_tools,
        &mut system_parts,
        &mut mcp_servers,
        &mut seen_tool_names,
    )?;

    agent.tools = tools;
    agent.sdk_tools = sdk_tools;
    agent.system_parts = system_parts;
    agent.mcp_servers = mcp_servers;
    Ok(())
}

/// Pushes `tool` onto `tools`, rejecting a name already collected from an earlier
/// sibling or ancestor (spec §4.2 "Collect" aggregates one tool per logical name).
fn push_tool(
    tool: Arc<crate::tool::Tool>,
    tools: &mut Vec<Arc<crate::tool::Tool>>,
    seen_tool_names: &mut std::collections::HashSet<String>,
) -> Result<(), ConfigurationError> {
    if !seen_tool_names.insert(tool.name().to_string()) {
        return Err(ConfigurationError::DuplicateTool(tool.name().to_string()));
    }
    tools.push(tool);
    Ok(())
}

fn collect_into(
    children: &mut [Instance],
    tools: &mut Vec<Arc<crate::tool::Tool>>,
    sdk_tools: &mut Vec<crate::tree::SdkToolKind>,
    system_parts: &mut Vec<SystemPart>,
    mcp_servers: &mut Vec<McpServerConfig>,
    seen_tool_names: &mut std::collections::HashSet<String>,
) -> Result<(), ConfigurationError> {
    for child in children {
        match child {
            Instance::Tool(tool) => push_tool(tool.clone(), tools, seen_tool_names)?,
            Instance::SdkTool(kind) => {
                if let SdkToolKind::Memory { root } = kind {
                    // The memory tool is provider-announced (see `sdk_tools`) but
                    // client-executed (spec §6.3), so it also needs a dispatchable
                    // `Tool` the engine can find by name.
                    let sandbox = Arc::new(MemorySandbox::new(root.clone()));
                    push_tool(Arc::new(memory_tool(sandbox)), tools, seen_tool_names)?;
                }
                sdk_tools.push(kind.clone());
            }
            Instance::System { content, ephemeral } => system_parts.push(SystemPart {
                content: content.clone(),
                ephemeral: *ephemeral,
            }),
            Instance::McpServer(config) => mcp_servers.push(config.clone()),
            Instance::Message(_) => {
                // Messages are collected into the store, not the agent's aggregates;
                // pushing is the engine's job at seed time (see `AgentStore`).
            }
            Instance::ToolsContainer(nested) => {
                collect_into(nested, tools, sdk_tools, system_parts, mcp_servers, seen_tool_names)?;
            }
            Instance::Condition(condition) => {
                if condition.active {
                    collect_into(
                        &mut condition.children,
                        tools,
                        sdk_tools,
                        system_parts,
                        mcp_servers,
                        seen_tool_names,
                    )?;
                }
            }
            Instance::AgentTool(agent_tool) => {
                let synthetic = subagent_tool::synthesize_agent_tool(agent_tool);
                agent_tool.synthesized = Some(synthetic.clone());
                push_tool(synthetic, tools, seen_tool_names)?;
            }
            Instance::Subagent(subagent) => {
                let synthetic = subagent_tool::synthesize_subagent(subagent);
                push_tool(synthetic, tools, seen_tool_names)?;
            }
            Instance::Agent(_) => return Err(ConfigurationError::NestedAgent),
        }
    }
    Ok(())
}

/// Pushes a seed [`ConversationMessage`] element into the store (spec §4.2 "Message →
/// push onto the store's message log"), used when a `Message` element appears at the
/// top level of an agent's children during initial materialisation.
pub async fn seed_messages(agent: &AgentInstance) {
    for child in &agent.children {
        if let Instance::Message(message) = child {
            agent.store.push_message(message.clone()).await;
        }
    }
}

/// Removes a previously-seeded message element's backing store entry (spec §4.2
/// "Uncollect" for Message instances), by reference identity per §9c.
pub async fn unseed_message(store: &AgentStore, message: &ConversationMessage) {
    store.remove_message(message.id).await;
}
