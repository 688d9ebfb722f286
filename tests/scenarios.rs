//! End-to-end scenario tests (spec §8 S1-S6), the crate's only true integration
//! tests — everything else is a colocated `#[cfg(test)]` unit module.

mod common;

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{json, Value};

use canopy_agent::error::{AgentError, ProviderError};
use canopy_agent::llm::{ChatModel, ChatStreamEvent};
use canopy_agent::message::{ConversationMessage, Role, StopReason};
use canopy_agent::spawn::SpawnOverrides;
use canopy_agent::tool::{Tool, ToolOutcome};
use canopy_agent::tree::ConditionPredicate;
use canopy_agent::{
    agent, agent_tool, condition_element, message_element, system, tool as tool_element, AgentConfig,
    AgentHandle, EngineEvent,
};

use common::{echo_tool, noop_tool, text_response, tool_use_response, MockChatModel, StallingStreamModel};

#[tokio::test]
async fn s1_single_tool_turn() {
    let model = Arc::new(MockChatModel::with_responses(vec![
        tool_use_response("call_1", "echo", json!({"text": "hi"}), StopReason::ToolUse),
        text_response("hi", StopReason::EndTurn),
    ]));

    let tree = agent(
        AgentConfig::new("claude-sonnet-4-5"),
        vec![system("You are helpful"), tool_element(echo_tool())],
    );

    let mut handle = AgentHandle::new(tree, model.clone()).await.expect("materialize");
    let stream = handle.stream("say hi");
    futures_util::pin_mut!(stream);

    let mut final_event = None;
    while let Some(event) = stream.next().await {
        let event = event.expect("no error expected");
        if matches!(event, EngineEvent::Complete { .. }) {
            final_event = Some(event);
        }
    }

    match final_event {
        Some(EngineEvent::Complete { content, stop_reason }) => {
            assert_eq!(content, "hi");
            assert_eq!(stop_reason, StopReason::EndTurn);
        }
        _ => panic!("expected a Complete event"),
    }

    let messages = handle.messages().await;
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[2].role, Role::User);
    assert_eq!(messages[3].role, Role::Assistant);
}

#[tokio::test]
async fn s2_iteration_cap() {
    let mut config = AgentConfig::new("claude-sonnet-4-5");
    config.max_iterations = 3;
    let tree = agent(config, vec![tool_element(noop_tool("noop"))]);

    let responses = (0..3)
        .map(|i| tool_use_response(&format!("call_{i}"), "noop", json!({}), StopReason::ToolUse))
        .collect();
    let model = Arc::new(MockChatModel::with_responses(responses));

    let mut handle = AgentHandle::new(tree, model.clone()).await.expect("materialize");
    let stream = handle.stream("start");
    futures_util::pin_mut!(stream);

    let mut final_event = None;
    while let Some(event) = stream.next().await {
        let event = event.expect("cap must not surface as an error");
        if matches!(event, EngineEvent::Complete { .. }) {
            final_event = Some(event);
        }
    }

    assert_eq!(model.request_count(), 3);
    match final_event {
        Some(EngineEvent::Complete { stop_reason, .. }) => {
            assert_eq!(stop_reason, StopReason::ToolUse);
        }
        _ => panic!("expected a Complete event once the cap was reached"),
    }
}

fn researcher_subtree(input: Value) -> Vec<canopy_agent::tree::Element> {
    let topic = input.get("topic").and_then(Value::as_str).unwrap_or("").to_string();
    vec![
        system("research expert"),
        message_element(ConversationMessage::user(format!("Research: {topic}"))),
    ]
}

#[tokio::test]
async fn s3_subagent_spawn_is_isolated() {
    let tree = agent(
        AgentConfig::new("claude-sonnet-4-5"),
        vec![agent_tool(
            "researcher",
            "Delegate a research question to a subagent",
            json!({
                "type": "object",
                "properties": {"topic": {"type": "string"}},
                "required": ["topic"],
                "additionalProperties": false
            }),
            researcher_subtree,
        )],
    );

    let model = Arc::new(MockChatModel::with_responses(vec![
        tool_use_response("call_1", "researcher", json!({"topic": "AI"}), StopReason::ToolUse),
        text_response("AI findings", StopReason::EndTurn),
        text_response("done", StopReason::EndTurn),
    ]));

    let mut handle = AgentHandle::new(tree, model.clone()).await.expect("materialize");
    let result = handle.run("delegate it").await.expect("run");

    assert_eq!(result, "done");

    let messages = handle.messages().await;
    let tool_result_text: Vec<String> = messages
        .iter()
        .flat_map(|message| message.content.blocks())
        .filter_map(|block| match block {
            canopy_agent::ContentBlock::ToolResult { content, .. } => Some(content),
            _ => None,
        })
        .collect();
    assert_eq!(tool_result_text, vec!["AI findings".to_string()]);

    let leaked_subagent_text = messages
        .iter()
        .any(|message| message.content.concatenated_text().contains("Research: AI"));
    assert!(!leaked_subagent_text, "subagent's own seed message must not appear in the parent store");
}

fn dual_spawn_tool() -> Tool {
    Tool::new("dual_spawn", "spawns two subagents concurrently and joins their results")
        .with_handler(|_args, ctx| async move {
            let subtree_a = vec![
                system("alpha branch"),
                message_element(ConversationMessage::user("go alpha")),
            ];
            let subtree_b = vec![
                system("beta branch"),
                message_element(ConversationMessage::user("go beta")),
            ];

            let (a, b) = futures_util::future::join(
                ctx.spawn_agent("alpha", subtree_a, SpawnOverrides::default()),
                ctx.spawn_agent("beta", subtree_b, SpawnOverrides::default()),
            )
            .await;

            let a = a.map_err(|err| canopy_agent::error::ToolError::Execution(err.to_string()))?;
            let b = b.map_err(|err| canopy_agent::error::ToolError::Execution(err.to_string()))?;

            Ok(ToolOutcome::Text(format!("{}+{}", a.content, b.content)))
        })
}

#[tokio::test]
async fn s4_parallel_spawn_waits_for_both_children() {
    let tree = agent(
        AgentConfig::new("claude-sonnet-4-5"),
        vec![tool_element(dual_spawn_tool())],
    );

    let model = Arc::new(MockChatModel::with_responses(vec![
        tool_use_response("call_1", "dual_spawn", json!({}), StopReason::ToolUse),
        text_response("alpha-done", StopReason::EndTurn),
        text_response("beta-done", StopReason::EndTurn),
        text_response("all done", StopReason::EndTurn),
    ]));

    let mut handle = AgentHandle::new(tree, model.clone()).await.expect("materialize");
    let result = handle.run("fan out").await.expect("run");

    assert_eq!(result, "all done");

    let messages = handle.messages().await;
    let tool_result_text: Vec<String> = messages
        .iter()
        .flat_map(|message| message.content.blocks())
        .filter_map(|block| match block {
            canopy_agent::ContentBlock::ToolResult { content, .. } => Some(content),
            _ => None,
        })
        .collect();
    assert_eq!(tool_result_text.len(), 1);
    assert!(tool_result_text[0].contains("alpha-done"));
    assert!(tool_result_text[0].contains("beta-done"));

    let leaked = messages.iter().any(|message| {
        let text = message.content.concatenated_text();
        text.contains("go alpha") || text.contains("go beta")
    });
    assert!(!leaked, "child seed messages must never surface in the parent's own message log");
}

#[tokio::test]
async fn s5_condition_gates_the_tool_list() {
    let secret_tool = || tool_element(Tool::new("secret", "a gated tool"));

    let gated_off = agent(
        AgentConfig::new("claude-sonnet-4-5"),
        vec![condition_element(ConditionPredicate::Bool(false), vec![secret_tool()])],
    );
    let model_off = Arc::new(MockChatModel::with_responses(vec![text_response(
        "ok",
        StopReason::EndTurn,
    )]));
    let mut handle_off = AgentHandle::new(gated_off, model_off.clone()).await.expect("materialize");
    handle_off.run("hello").await.expect("run");
    let requests_off = model_off.requests();
    assert!(!requests_off[0].tools.iter().any(|tool| tool.name == "secret"));

    let gated_on = agent(
        AgentConfig::new("claude-sonnet-4-5"),
        vec![condition_element(ConditionPredicate::Bool(true), vec![secret_tool()])],
    );
    let model_on = Arc::new(MockChatModel::with_responses(vec![text_response(
        "ok",
        StopReason::EndTurn,
    )]));
    let mut handle_on = AgentHandle::new(gated_on, model_on.clone()).await.expect("materialize");
    handle_on.run("hello").await.expect("run");
    let requests_on = model_on.requests();
    assert!(requests_on[0].tools.iter().any(|tool| tool.name == "secret"));
}

#[tokio::test]
async fn s6_abort_during_streaming() {
    let mut config = AgentConfig::new("claude-sonnet-4-5");
    config.stream = true;
    let tree = agent(config, vec![]);

    let client: Arc<dyn ChatModel> = Arc::new(StallingStreamModel);
    let mut handle = AgentHandle::new(tree, client).await.expect("materialize");
    let cancel = handle.cancel_token();

    let stream = handle.stream("go");
    futures_util::pin_mut!(stream);

    let mut saw_text_delta = false;
    let mut saw_complete = false;
    let mut saw_error_event = false;
    let mut final_error = None;

    while let Some(event) = stream.next().await {
        match event {
            Ok(EngineEvent::Stream(ChatStreamEvent::TextDelta(_))) => {
                saw_text_delta = true;
                cancel.cancel();
            }
            Ok(EngineEvent::Error(_)) => saw_error_event = true,
            Ok(EngineEvent::Complete { .. }) => saw_complete = true,
            Ok(_) => {}
            Err(err) => {
                final_error = Some(err);
                break;
            }
        }
    }

    assert!(saw_text_delta, "expected at least one text delta before abort");
    assert!(saw_error_event, "expected an Error lifecycle event");
    assert!(!saw_complete, "abort must never reach Complete");
    assert!(cancel.is_cancelled());

    match final_error {
        Some(AgentError::Provider(ProviderError::Aborted)) => {}
        other => panic!("expected AgentError::Provider(ProviderError::Aborted), got {other:?}"),
    }
}
