//! Subagent Synthetic Tool (C6): wraps an Agent-Tool or Subagent Instance as a `Tool`
//! whose handler spawns and awaits a child run (spec §4.3).
//!
//! The spawn itself is driven through `ToolContext::spawn_agent`, which the root
//! `AgentHandle` wires up with a closure that materialises a fresh `AgentInstance` and
//! runs the engine to completion — see `handle.rs`. This module only builds the `Tool`
//! descriptor and its handler; it never touches `tokio::spawn` directly, matching the
//! way `tron`'s `SubagentManager` separates "what to run" from "how to schedule it".

use std::sync::Arc;

use serde_json::Value;

use crate::error::ToolError;
use crate::spawn::SpawnOverrides;
use crate::tool::{Tool, ToolOutcome};
use crate::tree::{AgentToolInstance, SubagentInstance};

/// Builds the synthetic tool for a declarative "tool that is an agent" (spec §3
/// "Agent-Tool Instance"). The handler re-validates input (`Tool::invoke` already does
/// this before calling the handler, so failures never reach this closure), renders the
/// subtree from the validated input, and spawns it.
pub fn synthesize_agent_tool(agent_tool: &AgentToolInstance) -> Arc<Tool> {
    let name = agent_tool.name.clone();
    let render = agent_tool.render.clone();

    let built = Tool::new(agent_tool.name.clone(), agent_tool.description.clone())
        .with_schema(agent_tool.schema.clone())
        .unwrap_or_else(|_| Tool::new(agent_tool.name.clone(), agent_tool.description.clone()))
        .with_handler(move |input: Value, ctx| {
            let name = name.clone();
            let render = render.clone();
            async move {
                if ctx.has_visited(&name) {
                    return Err(ToolError::Execution(format!(
                        "subagent '{name}' would recurse into itself (cycle detected)"
                    )));
                }

                let subtree = render(input);
                let result = ctx
                    .spawn_agent(&name, subtree, SpawnOverrides::default())
                    .await
                    .map_err(|err| ToolError::Execution(err.to_string()))?;

                Ok(ToolOutcome::Text(result.content))
            }
        });

    Arc::new(built)
}

/// Builds the synthetic tool for a declarative Subagent Instance (spec §3 "Subagent
/// Instance"). Unlike an Agent-Tool, a Subagent's subtree is fixed rather than a
/// function of the call's input, so the handler accepts (and ignores) an empty object.
pub fn synthesize_subagent(subagent: &SubagentInstance) -> Arc<Tool> {
    let name = subagent.name.clone();
    let subtree = subagent.subtree.clone();
    let model = subagent.config.model.clone();
    let max_tokens = subagent.config.max_tokens;
    let temperature = subagent.config.temperature;

    let description = subagent
        .description
        .clone()
        .unwrap_or_else(|| format!("Delegate a task to the '{name}' subagent."));

    let built = Tool::new(subagent.name.clone(), description).with_handler(move |_input, ctx| {
        let name = name.clone();
        let subtree = subtree.clone();
        let overrides = SpawnOverrides {
            model: Some(model.clone()),
            max_tokens: Some(max_tokens),
            temperature,
        };
        async move {
            if ctx.has_visited(&name) {
                return Err(ToolError::Execution(format!(
                    "subagent '{name}' would recurse into itself (cycle detected)"
                )));
            }

            let result = ctx
                .spawn_agent(&name, subtree, overrides)
                .await
                .map_err(|err| ToolError::Execution(err.to_string()))?;

            Ok(ToolOutcome::Text(result.content))
        }
    });

    Arc::new(built)
}
