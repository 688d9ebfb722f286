//! Scripted `ChatModel` test double shared by the end-to-end scenario tests (spec §8),
//! in the teacher's `MockModel`/`ScriptedModel` style: a `Mutex<VecDeque<...>>` of
//! canned responses popped one per request, with every request recorded for assertions.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use canopy_agent::error::ProviderError;
use canopy_agent::llm::{ChatModel, ChatRequest, ChatResponse, ChatStreamEvent};
use canopy_agent::message::{ContentBlock, ConversationMessage, StopReason, Usage};
use canopy_agent::tool::{Tool, ToolOutcome};

/// A `ChatModel` whose `complete`/`complete_streaming` pop one scripted response per
/// call. Panics (via `ProviderError::Response`) once the script runs dry, same as the
/// teacher's `MockModel` running out of `with_responses(...)` entries.
pub struct MockChatModel {
    responses: Mutex<VecDeque<ChatResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockChatModel {
    pub fn with_responses(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(
        &self,
        request: &ChatRequest,
        _cancel: CancellationToken,
    ) -> Result<ChatResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses.lock().unwrap().pop_front().ok_or_else(|| {
            ProviderError::Response("mock model ran out of scripted responses".to_string())
        })
    }

    async fn complete_streaming(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
        events: UnboundedSender<ChatStreamEvent>,
    ) -> Result<ChatResponse, ProviderError> {
        let response = self.complete(request, cancel).await?;
        let text = response.message.content.concatenated_text();
        if !text.is_empty() {
            let _ = events.send(ChatStreamEvent::TextDelta(text));
        }
        Ok(response)
    }
}

/// A `ChatModel` whose streaming call emits one text delta, then hangs until its
/// `CancellationToken` fires, at which point it resolves `Err(ProviderError::Aborted)` —
/// used to drive S6's abort-during-streaming scenario.
pub struct StallingStreamModel;

#[async_trait]
impl ChatModel for StallingStreamModel {
    async fn complete(
        &self,
        _request: &ChatRequest,
        _cancel: CancellationToken,
    ) -> Result<ChatResponse, ProviderError> {
        Err(ProviderError::Response("unary complete not exercised by S6".to_string()))
    }

    async fn complete_streaming(
        &self,
        _request: &ChatRequest,
        cancel: CancellationToken,
        events: UnboundedSender<ChatStreamEvent>,
    ) -> Result<ChatResponse, ProviderError> {
        let _ = events.send(ChatStreamEvent::TextDelta("partial".to_string()));
        cancel.cancelled().await;
        Err(ProviderError::Aborted)
    }
}

pub fn text_response(text: &str, stop_reason: StopReason) -> ChatResponse {
    ChatResponse {
        message: ConversationMessage::assistant_blocks(vec![ContentBlock::text(text)]),
        stop_reason,
        usage: Usage::default(),
    }
}

pub fn tool_use_response(id: &str, name: &str, input: Value, stop_reason: StopReason) -> ChatResponse {
    ChatResponse {
        message: ConversationMessage::assistant_blocks(vec![ContentBlock::tool_use(id, name, input)]),
        stop_reason,
        usage: Usage::default(),
    }
}

/// A tool that returns its `text` argument verbatim, used by S1.
pub fn echo_tool() -> Tool {
    Tool::new("echo", "returns its input verbatim")
        .with_schema(json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"],
            "additionalProperties": false
        }))
        .expect("schema is a valid object root")
        .with_handler(|args, _ctx| async move {
            let text = args.get("text").and_then(Value::as_str).unwrap_or("").to_string();
            Ok(ToolOutcome::Text(text))
        })
}

/// A tool that acknowledges without any real effect, used to exercise S2's iteration
/// cap: the model keeps calling it until `max_iterations` cuts the run off.
pub fn noop_tool(name: &str) -> Tool {
    Tool::new(name.to_string(), "does nothing")
        .with_handler(|_args, _ctx| async move { Ok(ToolOutcome::Text("ack".to_string())) })
}
