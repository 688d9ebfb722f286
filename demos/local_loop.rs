use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use canopy_agent::error::{ProviderError, ToolError};
use canopy_agent::llm::{ChatModel, ChatRequest, ChatResponse, ChatStreamEvent};
use canopy_agent::message::{ContentBlock, ConversationMessage, StopReason, Usage};
use canopy_agent::tool::{Tool, ToolOutcome};
use canopy_agent::{agent, tool as tool_element, AgentConfig, AgentHandle, EngineEvent};
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// A `ChatModel` that pops one canned response per call, used here in place of a real
/// provider so the demo runs without network access or an API key.
#[derive(Default)]
struct ScriptedModel {
    responses: Mutex<VecDeque<ChatResponse>>,
}

impl ScriptedModel {
    fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        _request: &ChatRequest,
        _cancel: CancellationToken,
    ) -> Result<ChatResponse, ProviderError> {
        self.responses
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .ok_or_else(|| ProviderError::Response("scripted model exhausted responses".to_string()))
    }

    async fn complete_streaming(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
        events: UnboundedSender<ChatStreamEvent>,
    ) -> Result<ChatResponse, ProviderError> {
        let response = self.complete(request, cancel).await?;
        if let Some(text) = response.message.content.blocks().iter().find_map(ContentBlock::as_text) {
            let _ = events.send(ChatStreamEvent::TextDelta(text.to_string()));
        }
        Ok(response)
    }
}

fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        message: ConversationMessage::assistant_blocks(vec![ContentBlock::text(text)]),
        stop_reason: StopReason::EndTurn,
        usage: Usage::default(),
    }
}

fn tool_use_response(id: &str, name: &str, input: serde_json::Value) -> ChatResponse {
    ChatResponse {
        message: ConversationMessage::assistant_blocks(vec![ContentBlock::tool_use(id, name, input)]),
        stop_reason: StopReason::ToolUse,
        usage: Usage::default(),
    }
}

fn add_tool() -> Tool {
    Tool::new("add", "add two numbers")
        .with_schema(json!({
            "type": "object",
            "properties": {
                "a": {"type": "integer"},
                "b": {"type": "integer"}
            },
            "required": ["a", "b"],
            "additionalProperties": false
        }))
        .expect("valid schema")
        .with_handler(|args, _ctx| async move {
            let a = args
                .get("a")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| ToolError::Execution("a missing".to_string()))?;
            let b = args
                .get("b")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| ToolError::Execution("b missing".to_string()))?;
            Ok(ToolOutcome::Text((a + b).to_string()))
        })
}

async fn build_handle(config: AgentConfig, responses: Vec<ChatResponse>) -> Result<AgentHandle, Box<dyn Error>> {
    let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new(responses));
    let tree = agent(config, vec![tool_element(add_tool())]);
    Ok(AgentHandle::new(tree, model).await?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut handle = build_handle(
        AgentConfig::new("claude-sonnet-4-5"),
        vec![
            tool_use_response("call_1", "add", json!({"a": 2, "b": 3})),
            text_response("2 + 3 = 5"),
        ],
    )
    .await?;

    let final_response = handle.run("What is 2 + 3?").await?;
    println!("run final: {final_response}");

    let mut streaming_config = AgentConfig::new("claude-sonnet-4-5");
    streaming_config.stream = true;
    let mut streaming_handle = build_handle(
        streaming_config,
        vec![
            tool_use_response("call_2", "add", json!({"a": 10, "b": 7})),
            text_response("10 + 7 = 17"),
        ],
    )
    .await?;

    let stream = streaming_handle.stream("What is 10 + 7?");
    futures_util::pin_mut!(stream);
    while let Some(event) = stream.next().await {
        match event? {
            EngineEvent::Stream(ChatStreamEvent::TextDelta(text)) => println!("delta: {text}"),
            EngineEvent::Message(message) => println!("message: {:?}", message.role),
            EngineEvent::StepFinish(step) => {
                println!("step {} finished, stop_reason={:?}", step.step, step.stop_reason)
            }
            EngineEvent::Complete { content, .. } => println!("stream final: {content}"),
            _ => {}
        }
    }

    Ok(())
}
