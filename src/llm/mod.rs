//! The chat-service boundary (C11): `ChatModel` is the seam the engine programs
//! against; [`AnthropicModel`] is its only production implementor (spec §6.1).

mod anthropic;

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::message::{ConversationMessage, StopReason, Usage};
use crate::tree::{Beta, McpServerConfig, ThinkingConfig};

pub use anthropic::{AnthropicModel, AnthropicModelConfig};

/// A tool descriptor stripped of its handler, the shape the chat request actually needs
/// on the wire (spec §6.1 `{type: "custom", name, description, input_schema}`).
#[derive(Clone, Debug)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A system-prompt part as it goes out on the wire, including the optional ephemeral
/// cache marker (spec §6.1).
#[derive(Clone, Debug)]
pub struct SystemPart {
    pub text: String,
    pub cache_ephemeral: bool,
}

/// Everything the engine needs to build one chat-service call (spec §6.1).
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: Vec<SystemPart>,
    pub messages: Vec<ConversationMessage>,
    pub tools: Vec<ToolDefinition>,
    pub mcp_servers: Vec<McpServerConfig>,
    pub stop_sequences: Vec<String>,
    pub temperature: Option<f32>,
    pub thinking: Option<ThinkingConfig>,
    pub betas: BTreeSet<Beta>,
    /// When set, forces the named tool to be called (used by the condition evaluator's
    /// structured-output request, spec §4.4).
    pub force_tool: Option<String>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            system: Vec::new(),
            messages: Vec::new(),
            tools: Vec::new(),
            mcp_servers: Vec::new(),
            stop_sequences: Vec::new(),
            temperature: None,
            thinking: None,
            betas: BTreeSet::new(),
            force_tool: None,
        }
    }
}

/// The fully-formed assistant turn the chat service handed back (spec §6.1).
#[derive(Clone, Debug)]
pub struct ChatResponse {
    pub message: ConversationMessage,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

/// A lifecycle event surfaced while a streaming request is in flight. The engine
/// re-emits these as `stream` events (spec §4.5 step 4).
#[derive(Clone, Debug)]
pub enum ChatStreamEvent {
    TextDelta(String),
    ThinkingDelta(String),
    ToolUseStart { id: String, name: String },
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Issues a single, non-streaming request.
    async fn complete(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, ProviderError>;

    /// Issues a streaming request, forwarding lifecycle events on `events` as they
    /// arrive and returning the assembled final message once the stream ends.
    async fn complete_streaming(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
        events: UnboundedSender<ChatStreamEvent>,
    ) -> Result<ChatResponse, ProviderError>;
}
