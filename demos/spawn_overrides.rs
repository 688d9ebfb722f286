use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use canopy_agent::error::ProviderError;
use canopy_agent::llm::{ChatModel, ChatRequest, ChatResponse, ChatStreamEvent};
use canopy_agent::message::{ContentBlock, ConversationMessage, StopReason, Usage};
use canopy_agent::spawn::SpawnOverrides;
use canopy_agent::tool::{Tool, ToolOutcome};
use canopy_agent::{agent, message_element, system, tool as tool_element, AgentConfig, AgentHandle};
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// A `ChatModel` that pops one canned response per call, recording every request it
/// was handed so a demo can show what the model actually saw.
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
        request: &ChatRequest,
        _cancel: CancellationToken,
    ) -> Result<ChatResponse, ProviderError> {
        println!("model [{}] saw {} message(s)", request.model, request.messages.len());
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
        _events: UnboundedSender<ChatStreamEvent>,
    ) -> Result<ChatResponse, ProviderError> {
        self.complete(request, cancel).await
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

/// Spawns a subagent restricted to a cheaper model and a tighter token budget than the
/// parent's own, via `SpawnOverrides` — useful for delegating a narrow sub-task without
/// inheriting the parent's full configuration.
fn delegate_to_cheaper_model_tool() -> Tool {
    Tool::new("delegate", "delegate a question to a smaller, cheaper model")
        .with_schema(json!({
            "type": "object",
            "properties": {"question": {"type": "string"}},
            "required": ["question"],
            "additionalProperties": false
        }))
        .expect("valid schema")
        .with_handler(|args, ctx| async move {
            let question = args.get("question").and_then(|v| v.as_str()).unwrap_or("").to_string();

            let subtree = vec![
                system("Answer tersely."),
                message_element(ConversationMessage::user(question)),
            ];

            let overrides = SpawnOverrides {
                model: Some("claude-haiku-4-5".to_string()),
                max_tokens: Some(256),
                temperature: None,
            };

            let result = ctx
                .spawn_agent("cheaper_model_delegate", subtree, overrides)
                .await
                .map_err(|err| canopy_agent::error::ToolError::Execution(err.to_string()))?;

            Ok(ToolOutcome::Text(result.content))
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let model = Arc::new(ScriptedModel::new(vec![
        tool_use_response("call_1", "delegate", json!({"question": "capital of France?"})),
        text_response("Paris"),
        text_response("The capital of France is Paris."),
    ]));

    let tree = agent(
        AgentConfig::new("claude-sonnet-4-5"),
        vec![tool_element(delegate_to_cheaper_model_tool())],
    );

    let mut handle = AgentHandle::new(tree, model.clone()).await?;
    let response = handle.run("What's the capital of France?").await?;
    println!("final: {response}");

    Ok(())
}
