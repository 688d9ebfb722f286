use anthropic_ai_sdk::client::AnthropicClient;
use anthropic_ai_sdk::types::message::{
    CacheControl, ContentBlock as SdkContentBlock, CreateMessageParams, CreateMessageResponse,
    Message as SdkMessage, MessageClient, MessageError, MessageStartContent, RequiredMessageParams,
    Role as SdkRole, StreamEvent, SystemPromptBlock, Thinking as SdkThinking, ThinkingType, Tool as SdkTool,
    ToolChoice,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::llm::{ChatModel, ChatRequest, ChatResponse, ChatStreamEvent, ToolDefinition};
use crate::message::{ContentBlock, ConversationMessage, MessageContent, Role, StopReason, Usage};

/// Runtime configuration for [`AnthropicModel`].
#[derive(Debug, Clone)]
pub struct AnthropicModelConfig {
    pub api_key: String,
    pub api_version: String,
    pub api_base_url: Option<String>,
}

impl AnthropicModelConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_version: AnthropicClient::DEFAULT_API_VERSION.to_string(),
            api_base_url: None,
        }
    }
}

/// Anthropic provider adapter implementing [`ChatModel`] (C11). The sole production
/// implementor the engine talks to; tests substitute a scripted model behind the same
/// trait instead of standing up a fake HTTP server.
#[derive(Debug, Clone)]
pub struct AnthropicModel {
    client: AnthropicClient,
}

impl AnthropicModel {
    pub fn new(config: AnthropicModelConfig) -> Result<Self, ProviderError> {
        let mut builder = AnthropicClient::builder(config.api_key, config.api_version);
        if let Some(url) = config.api_base_url {
            builder = builder.with_api_base_url(url);
        }

        let client = builder
            .build::<MessageError>()
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(Self { client })
    }

    /// Builds a model adapter using `ANTHROPIC_API_KEY` from the environment (§6.5).
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ProviderError::Request("ANTHROPIC_API_KEY is not set".to_string()))?;
        Self::new(AnthropicModelConfig::new(api_key))
    }

    fn build_request(&self, request: &ChatRequest, stream: bool) -> CreateMessageParams {
        let messages = request
            .messages
            .iter()
            .map(to_sdk_message)
            .collect::<Vec<_>>();

        let required = RequiredMessageParams {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
        };

        let mut params = CreateMessageParams::new(required).with_stream(stream);

        if !request.system.is_empty() {
            let blocks = request
                .system
                .iter()
                .map(|part| SystemPromptBlock {
                    type_: "text".to_string(),
                    text: part.text.clone(),
                    cache_control: part.cache_ephemeral.then(CacheControl::ephemeral),
                })
                .collect::<Vec<_>>();
            params = params.with_system_blocks(blocks);
        }

        if let Some(temperature) = request.temperature {
            params = params.with_temperature(temperature);
        }

        if !request.stop_sequences.is_empty() {
            params = params.with_stop_sequences(request.stop_sequences.clone());
        }

        if let Some(thinking) = &request.thinking {
            if thinking.enabled {
                params = params.with_thinking(SdkThinking {
                    budget_tokens: thinking.budget_tokens as usize,
                    type_: ThinkingType::Enabled,
                });
            }
        }

        if !request.tools.is_empty() {
            let tools = request.tools.iter().map(to_sdk_tool).collect::<Vec<_>>();
            let choice = match &request.force_tool {
                Some(name) => ToolChoice::Tool { name: name.clone() },
                None => ToolChoice::Auto,
            };
            params = params.with_tools(tools).with_tool_choice(choice);
        }

        if !request.mcp_servers.is_empty() {
            params = params.with_mcp_servers(
                request
                    .mcp_servers
                    .iter()
                    .map(|server| server.name.clone())
                    .collect(),
            );
        }

        if !request.betas.is_empty() {
            params = params.with_betas(
                request
                    .betas
                    .iter()
                    .map(|beta| beta.as_flag())
                    .collect::<Vec<_>>(),
            );
        }

        params
    }
}

#[async_trait]
impl ChatModel for AnthropicModel {
    async fn complete(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, ProviderError> {
        let params = self.build_request(request, false);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Aborted),
            result = self.client.create_message(Some(&params)) => {
                result.map_err(|err| ProviderError::Request(err.to_string()))?
            }
        };

        Ok(normalize_response(&response))
    }

    async fn complete_streaming(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
        events: UnboundedSender<ChatStreamEvent>,
    ) -> Result<ChatResponse, ProviderError> {
        let params = self.build_request(request, true);

        let stream = self
            .client
            .create_message_streaming(Some(&params))
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;
        futures_util::pin_mut!(stream);

        let mut text_parts: Vec<String> = Vec::new();
        let mut thinking_parts: Vec<String> = Vec::new();
        let mut tool_calls: Vec<(String, String, serde_json::Value)> = Vec::new();
        let mut stop_reason = StopReason::EndTurn;
        let mut usage = Usage::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Aborted),
                next = stream.next() => next,
            };

            let Some(event) = next else { break };
            let event = event.map_err(|err| ProviderError::Response(err.to_string()))?;

            match event {
                StreamEvent::ContentBlockStart {
                    index: _,
                    content_block: SdkContentBlock::ToolUse { id, name, input },
                } => {
                    let _ = events.send(ChatStreamEvent::ToolUseStart {
                        id: id.clone(),
                        name: name.clone(),
                    });
                    tool_calls.push((id, name, input));
                }
                StreamEvent::ContentBlockDelta { delta, .. } => {
                    use anthropic_ai_sdk::types::message::ContentBlockDelta;
                    match delta {
                        ContentBlockDelta::TextDelta { text } => {
                            let _ = events.send(ChatStreamEvent::TextDelta(text.clone()));
                            text_parts.push(text);
                        }
                        ContentBlockDelta::ThinkingDelta { thinking } => {
                            let _ = events.send(ChatStreamEvent::ThinkingDelta(thinking.clone()));
                            thinking_parts.push(thinking);
                        }
                        ContentBlockDelta::InputJsonDelta { .. }
                        | ContentBlockDelta::SignatureDelta { .. } => {}
                    }
                }
                StreamEvent::MessageDelta { delta, usage: delta_usage } => {
                    if let Some(reason) = delta.stop_reason {
                        stop_reason = to_stop_reason(&reason);
                    }
                    usage.output_tokens = delta_usage.output_tokens;
                }
                StreamEvent::MessageStart {
                    message: MessageStartContent { usage: start_usage, .. },
                } => {
                    usage.input_tokens = start_usage.input_tokens;
                    usage.cache_creation_input_tokens =
                        start_usage.cache_creation_input_tokens.unwrap_or(0);
                    usage.cache_read_input_tokens = start_usage.cache_read_input_tokens.unwrap_or(0);
                }
                StreamEvent::Error { error } => {
                    return Err(ProviderError::Response(error.message));
                }
                StreamEvent::MessageStop
                | StreamEvent::ContentBlockStart { .. }
                | StreamEvent::ContentBlockStop { .. }
                | StreamEvent::Ping => {}
            }
        }

        let mut blocks = Vec::new();
        if !thinking_parts.is_empty() {
            blocks.push(ContentBlock::Thinking {
                thinking: thinking_parts.join(""),
            });
        }
        if !text_parts.is_empty() {
            blocks.push(ContentBlock::text(text_parts.join("")));
        }
        for (id, name, input) in tool_calls {
            blocks.push(ContentBlock::tool_use(id, name, input));
        }

        Ok(ChatResponse {
            message: ConversationMessage {
                id: uuid::Uuid::new_v4(),
                role: Role::Assistant,
                content: MessageContent::Blocks(blocks),
            },
            stop_reason,
            usage,
        })
    }
}

fn to_sdk_tool(tool: &ToolDefinition) -> SdkTool {
    SdkTool {
        name: tool.name.clone(),
        description: Some(tool.description.clone()),
        input_schema: tool.input_schema.clone(),
    }
}

fn to_sdk_message(message: &ConversationMessage) -> SdkMessage {
    let role = match message.role {
        Role::User => SdkRole::User,
        Role::Assistant => SdkRole::Assistant,
    };

    let blocks = message
        .content
        .blocks()
        .into_iter()
        .map(|block| match block {
            ContentBlock::Text { text, .. } => SdkContentBlock::Text { text },
            ContentBlock::ToolUse { id, name, input } => SdkContentBlock::ToolUse { id, name, input },
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => SdkContentBlock::ToolResult {
                tool_use_id,
                content: if is_error {
                    format!("Error: {content}")
                } else {
                    content
                },
            },
            ContentBlock::Thinking { thinking } => SdkContentBlock::Thinking {
                thinking,
                signature: String::new(),
            },
        })
        .collect();

    SdkMessage::new_blocks(role, blocks)
}

fn normalize_response(response: &CreateMessageResponse) -> ChatResponse {
    let mut blocks = Vec::new();
    for block in &response.content {
        match block {
            SdkContentBlock::Text { text } => blocks.push(ContentBlock::text(text.clone())),
            SdkContentBlock::ToolUse { id, name, input } => {
                blocks.push(ContentBlock::tool_use(id.clone(), name.clone(), input.clone()))
            }
            SdkContentBlock::Thinking { thinking, .. } => {
                blocks.push(ContentBlock::Thinking {
                    thinking: thinking.clone(),
                })
            }
            SdkContentBlock::RedactedThinking { data } => blocks.push(ContentBlock::Thinking {
                thinking: format!("[redacted:{} bytes]", data.len()),
            }),
            SdkContentBlock::ToolResult { .. } => {}
        }
    }

    let stop_reason = response
        .stop_reason
        .as_ref()
        .map(to_stop_reason)
        .unwrap_or(StopReason::EndTurn);

    ChatResponse {
        message: ConversationMessage {
            id: uuid::Uuid::new_v4(),
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        },
        stop_reason,
        usage: Usage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            cache_creation_input_tokens: response.usage.cache_creation_input_tokens.unwrap_or(0),
            cache_read_input_tokens: response.usage.cache_read_input_tokens.unwrap_or(0),
        },
    }
}

fn to_stop_reason(reason: &anthropic_ai_sdk::types::message::StopReason) -> StopReason {
    use anthropic_ai_sdk::types::message::StopReason as SdkStopReason;
    match reason {
        SdkStopReason::ToolUse => StopReason::ToolUse,
        SdkStopReason::EndTurn => StopReason::EndTurn,
        SdkStopReason::MaxTokens => StopReason::MaxTokens,
        SdkStopReason::StopSequence => StopReason::StopSequence,
        SdkStopReason::Refusal => StopReason::Other("refusal".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_response_extracts_tool_calls_and_text() {
        let response = CreateMessageResponse {
            content: vec![
                SdkContentBlock::Text {
                    text: "Looking up".to_string(),
                },
                SdkContentBlock::ToolUse {
                    id: "call_1".to_string(),
                    name: "search".to_string(),
                    input: json!({"query": "rust"}),
                },
            ],
            id: "msg_1".to_string(),
            model: "claude-test".to_string(),
            role: SdkRole::Assistant,
            stop_reason: Some(anthropic_ai_sdk::types::message::StopReason::ToolUse),
            stop_sequence: None,
            type_: "message".to_string(),
            usage: anthropic_ai_sdk::types::message::Usage {
                input_tokens: 1,
                output_tokens: 1,
                cache_creation_input_tokens: None,
                cache_read_input_tokens: None,
            },
        };

        let normalized = normalize_response(&response);
        assert_eq!(normalized.stop_reason, StopReason::ToolUse);
        assert_eq!(normalized.message.content.tool_use_blocks().len(), 1);
        assert_eq!(normalized.message.content.concatenated_text(), "Looking up");
    }
}
