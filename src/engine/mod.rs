//! Execution Engine (C8): the turn loop that drives one agent to completion against
//! the chat service, dispatches tool calls, enforces limits, compacts context, and
//! emits structured lifecycle events (spec §4.5), built with `async-stream`'s
//! `try_stream!` macro in the same style as the teacher's `Agent::query_stream`.

mod compaction;

use std::time::Instant;

use async_stream::try_stream;
use futures_util::future::join_all;
use futures_util::Stream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::condition;
use crate::error::{AgentError, ProviderError};
use crate::llm::{ChatRequest, ChatStreamEvent, SystemPart, ToolDefinition};
use crate::message::{ContentBlock, ConversationMessage, Role, StopReason, Usage};
use crate::reconciler;
use crate::spawn::ToolContext;
use crate::store::{ExecutionState, PendingToolCall};
use crate::tool::format_validation_error;
use crate::tree::{AgentInstance, Beta};

pub use compaction::maybe_compact;

/// One entry in a step's ordered tool-call record (spec §4.5.3).
#[derive(Clone, Debug)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// One entry in a step's ordered tool-result record (spec §4.5.3).
#[derive(Clone, Debug)]
pub struct ToolResultRecord {
    pub id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
    pub execution_time_ms: u64,
}

/// Everything emitted at the end of a turn (spec §4.5.3).
#[derive(Clone, Debug)]
pub struct StepFinish {
    pub step: u32,
    pub text: String,
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub tool_results: Vec<ToolResultRecord>,
    pub stop_reason: StopReason,
    pub usage: Usage,
    pub assistant_message: ConversationMessage,
    pub message_log: Vec<ConversationMessage>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A user-visible lifecycle event (spec §7's event list).
#[derive(Clone, Debug)]
pub enum EngineEvent {
    StateChange(ExecutionStateSnapshot),
    Stream(ChatStreamEvent),
    Message(ConversationMessage),
    StepFinish(StepFinish),
    Complete { content: String, stop_reason: StopReason },
    Error(String),
}

/// A cheaply-cloneable snapshot of [`ExecutionState`] for event consumers that don't
/// need the live cancel handle.
#[derive(Clone, Debug)]
pub enum ExecutionStateSnapshot {
    Idle,
    Streaming,
    WaitingForTools,
    ExecutingTools,
    Completed,
    Error,
}

impl From<&ExecutionState> for ExecutionStateSnapshot {
    fn from(state: &ExecutionState) -> Self {
        match state {
            ExecutionState::Idle => ExecutionStateSnapshot::Idle,
            ExecutionState::Streaming { .. } => ExecutionStateSnapshot::Streaming,
            ExecutionState::WaitingForTools { .. } => ExecutionStateSnapshot::WaitingForTools,
            ExecutionState::ExecutingTools { .. } => ExecutionStateSnapshot::ExecutingTools,
            ExecutionState::Completed { .. } => ExecutionStateSnapshot::Completed,
            ExecutionState::Error { .. } => ExecutionStateSnapshot::Error,
        }
    }
}

/// Drives `agent` through turns until completion, an error, or abort (spec §4.5).
/// `root_cancel` is the run's root cancellation token; each iteration derives a child
/// token for its in-flight request. `base_ctx` is cloned per tool dispatch with its
/// cancel handle swapped for the current iteration's.
pub fn run<'a>(
    agent: &'a mut AgentInstance,
    root_cancel: CancellationToken,
    base_ctx: ToolContext,
) -> impl Stream<Item = Result<EngineEvent, AgentError>> + 'a {
    try_stream! {
        if agent.store.is_empty().await {
            Err(AgentError::EmptyConversation)?;
        }

        let mut iteration: u32 = 0;
        let mut first_iteration = true;
        let mut last_assistant_message: Option<ConversationMessage> = None;
        let mut last_text = String::new();
        let mut last_stop_reason = StopReason::EndTurn;

        loop {
            if root_cancel.is_cancelled() {
                agent.store.transition(ExecutionState::Error { message: "aborted".to_string() });
                yield EngineEvent::Error("aborted".to_string());
                Err(AgentError::Aborted)?;
            }

            if iteration >= agent.config.max_iterations {
                // The cap was reached by a prior iteration's tool-use turn, not by a
                // failure: exit the same way a non-tool-use turn does, just without a
                // further chat request (spec §4.5 / §8 S2 "run does not throw").
                let final_message = last_assistant_message
                    .clone()
                    .unwrap_or_else(|| ConversationMessage::assistant_blocks(Vec::new()));
                agent.store.transition(ExecutionState::Completed { final_message });
                yield EngineEvent::StateChange((&agent.store.state()).into());

                if let Some(callback) = &agent.config.callbacks.on_complete {
                    callback(&last_text);
                }
                yield EngineEvent::Complete { content: last_text, stop_reason: last_stop_reason };
                return;
            }
            iteration += 1;

            let cancel_handle = root_cancel.child_token();
            agent.store.transition(ExecutionState::Streaming { cancel_handle: cancel_handle.clone() });
            yield EngineEvent::StateChange((&agent.store.state()).into());

            let eval_outcome = condition::evaluate_conditions(agent, first_iteration).await;
            first_iteration = false;
            if eval_outcome.changed {
                reconciler::collect(agent)?;
            }

            let request = build_request(agent).await;

            let response = if agent.config.stream {
                let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
                let client = agent.client.clone();
                let request_for_task = request.clone();
                let cancel_for_task = cancel_handle.clone();
                let join_handle = tokio::spawn(async move {
                    client.complete_streaming(&request_for_task, cancel_for_task, tx).await
                });

                while let Some(event) = rx.recv().await {
                    yield EngineEvent::Stream(event);
                }

                match join_handle
                    .await
                    .map_err(|err| AgentError::Provider(ProviderError::Request(err.to_string())))
                {
                    Ok(Ok(response)) => response,
                    Ok(Err(provider_err)) => {
                        let message = provider_err.to_string();
                        agent.store.transition(ExecutionState::Error { message: message.clone() });
                        yield EngineEvent::Error(message);
                        Err(AgentError::Provider(provider_err))?
                    }
                    Err(join_err) => {
                        let message = join_err.to_string();
                        agent.store.transition(ExecutionState::Error { message: message.clone() });
                        yield EngineEvent::Error(message);
                        Err(join_err)?
                    }
                }
            } else {
                match agent.client.complete(&request, cancel_handle.clone()).await {
                    Ok(response) => response,
                    Err(provider_err) => {
                        let message = provider_err.to_string();
                        agent.store.transition(ExecutionState::Error { message: message.clone() });
                        yield EngineEvent::Error(message);
                        Err(AgentError::Provider(provider_err))?
                    }
                }
            };

            let mut assistant_message = ConversationMessage {
                id: Uuid::new_v4(),
                role: Role::Assistant,
                content: response.message.content,
            };
            assistant_message.sanitize_for_request();
            agent.store.push_message(assistant_message.clone()).await;
            yield EngineEvent::Message(assistant_message.clone());

            let tool_calls = assistant_message.content.tool_use_blocks();
            let text = assistant_message.content.concatenated_text();
            let thinking = assistant_message.content.thinking_text();

            last_assistant_message = Some(assistant_message.clone());
            last_text = text.clone();
            last_stop_reason = response.stop_reason.clone();

            if !tool_calls.is_empty() && response.stop_reason.is_tool_use() {
                let pending: Vec<PendingToolCall> = tool_calls
                    .iter()
                    .map(|(id, name, input)| PendingToolCall { id: id.clone(), name: name.clone(), input: input.clone() })
                    .collect();

                agent.store.transition(ExecutionState::WaitingForTools { pending: pending.clone() });
                yield EngineEvent::StateChange((&agent.store.state()).into());
                agent.store.transition(ExecutionState::ExecutingTools { pending: pending.clone() });
                yield EngineEvent::StateChange((&agent.store.state()).into());

                let mut dispatch_ctx = base_ctx.clone();
                dispatch_ctx.cancel = cancel_handle.clone();

                let (started_at_ms, results) = dispatch_tools(agent, &tool_calls, &dispatch_ctx).await;

                let result_blocks: Vec<ContentBlock> = results
                    .iter()
                    .map(|result| ContentBlock::tool_result(result.id.clone(), result.content.clone(), result.is_error))
                    .collect();
                let user_message = ConversationMessage::user_blocks(result_blocks);
                agent.store.push_message(user_message.clone()).await;
                yield EngineEvent::Message(user_message);

                agent.store.transition(ExecutionState::Idle);
                yield EngineEvent::StateChange((&agent.store.state()).into());

                tokio::task::yield_now().await;

                let step = StepFinish {
                    step: iteration,
                    text,
                    thinking,
                    tool_calls: tool_calls
                        .iter()
                        .map(|(id, name, input)| ToolCallRecord { id: id.clone(), name: name.clone(), input: input.clone() })
                        .collect(),
                    tool_results: results,
                    stop_reason: response.stop_reason.clone(),
                    usage: response.usage,
                    assistant_message: assistant_message.clone(),
                    message_log: agent.store.messages().await,
                    timestamp: chrono::Utc::now(),
                };
                let _ = started_at_ms;
                if let Some(callback) = &agent.config.callbacks.on_step_finish {
                    callback(&step);
                }
                yield EngineEvent::StepFinish(step);

                if let Err(err) = compaction::maybe_compact(agent, response.usage).await {
                    tracing::warn!(
                        target = "canopy_agent::engine::compaction",
                        error = %err,
                        "compaction failed; message log left untouched"
                    );
                }
            } else {
                let step = StepFinish {
                    step: iteration,
                    text: text.clone(),
                    thinking,
                    tool_calls: Vec::new(),
                    tool_results: Vec::new(),
                    stop_reason: response.stop_reason.clone(),
                    usage: response.usage,
                    assistant_message: assistant_message.clone(),
                    message_log: agent.store.messages().await,
                    timestamp: chrono::Utc::now(),
                };
                if let Some(callback) = &agent.config.callbacks.on_step_finish {
                    callback(&step);
                }
                yield EngineEvent::StepFinish(step);

                agent.store.transition(ExecutionState::Completed { final_message: assistant_message.clone() });
                yield EngineEvent::StateChange((&agent.store.state()).into());

                if let Some(callback) = &agent.config.callbacks.on_complete {
                    callback(&text);
                }
                yield EngineEvent::Complete { content: text, stop_reason: response.stop_reason };
                return;
            }
        }
    }
}

async fn build_request(agent: &AgentInstance) -> ChatRequest {
    let mut request = ChatRequest::new(agent.config.model.clone(), agent.config.max_tokens);
    request.messages = agent.store.messages().await;
    request.stop_sequences = agent.config.stop_sequences.clone();
    request.temperature = agent.config.temperature;
    request.thinking = agent.config.thinking.clone();

    request.system = agent
        .system_parts
        .iter()
        .map(|part| SystemPart {
            text: part.content.clone(),
            cache_ephemeral: part.ephemeral,
        })
        .collect();

    request.tools = agent
        .tools
        .iter()
        .map(|tool| ToolDefinition {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.json_schema().clone(),
        })
        .collect();

    request.mcp_servers = agent.mcp_servers.clone();

    let mut betas = agent.config.betas.clone();
    for sdk_tool in &agent.sdk_tools {
        if let Some(beta) = sdk_tool.beta() {
            betas.insert(beta);
        }
    }
    if !agent.mcp_servers.is_empty() {
        betas.insert(Beta::Mcp);
    }
    request.betas = betas;

    request
}

async fn dispatch_tools(
    agent: &AgentInstance,
    tool_calls: &[(String, String, serde_json::Value)],
    ctx: &ToolContext,
) -> (u64, Vec<ToolResultRecord>) {
    let started = Instant::now();

    let futures = tool_calls.iter().map(|(id, name, input)| {
        let id = id.clone();
        let name = name.clone();
        let input = input.clone();
        let ctx = ctx.clone();
        let tool = agent.tools.iter().find(|tool| tool.name() == name).cloned();

        async move {
            let call_started = Instant::now();
            let (content, is_error) = match tool {
                None => (format!("Error: tool not found: {name}"), true),
                Some(tool) => match tool.invoke(input, ctx).await {
                    Ok(outcome) => (outcome.into_text(), false),
                    Err(err) => (format_validation_error(&err), true),
                },
            };

            ToolResultRecord {
                id,
                name,
                content,
                is_error,
                execution_time_ms: call_started.elapsed().as_millis() as u64,
            }
        }
    });

    let results = join_all(futures).await;
    (started.elapsed().as_millis() as u64, results)
}
