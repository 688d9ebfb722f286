//! Typed conversation messages and content blocks (C1).
//!
//! Mirrors the shape the Anthropic Messages API expects on the wire, but kept
//! independent of `anthropic_ai_sdk`'s types so the rest of the crate never has to
//! reach through the provider adapter to talk about a message.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A message role. Only `user` and `assistant` appear in a conversation log; `system`
/// content lives separately as system-prompt parts (see [`crate::tree::SystemPart`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One block of message content. Blocks are immutable after creation (invariant 4 in
/// the data model): a tool-use block is never rewritten in place, only answered by a
/// later tool-result block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
        /// Response-only field some provider versions attach to text blocks. Stripped
        /// before the message is ever replayed as request input (§9 open question b).
        #[serde(skip_serializing_if = "Option::is_none", default)]
        parsed_output: Option<Value>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    Thinking {
        thinking: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text {
            text: text.into(),
            parsed_output: None,
        }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Removes response-only fields that would make this block invalid as a subsequent
    /// request parameter. Idempotent: calling it twice is a no-op the second time.
    pub fn sanitize_for_request(&mut self) {
        if let ContentBlock::Text { parsed_output, .. } = self {
            *parsed_output = None;
        }
    }
}

/// Either a bare string or an ordered list of content blocks, matching the wire shape
/// the chat service accepts for `content`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    pub fn blocks(&self) -> Vec<ContentBlock> {
        match self {
            MessageContent::Text(text) => vec![ContentBlock::text(text.clone())],
            MessageContent::Blocks(blocks) => blocks.clone(),
        }
    }

    pub fn tool_use_blocks(&self) -> Vec<(String, String, Value)> {
        self.blocks()
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some((id, name, input)),
                _ => None,
            })
            .collect()
    }

    pub fn concatenated_text(&self) -> String {
        self.blocks()
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn thinking_text(&self) -> Option<String> {
        let parts: Vec<String> = self
            .blocks()
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Thinking { thinking } => Some(thinking),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

/// A single message in an agent's append-ordered log, carrying an internal identity
/// used so the reconciler's uncollect path can always splice by reference (§9c) rather
/// than falling back to content equality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: MessageContent,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: MessageContent::Blocks(blocks),
        }
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }

    pub fn sanitize_for_request(&mut self) {
        if let MessageContent::Blocks(blocks) = &mut self.content {
            for block in blocks {
                block.sanitize_for_request();
            }
        }
    }
}

/// Token usage reported with a chat response, including cache accounting (§6.1).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_creation_input_tokens: u32,
    pub cache_read_input_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens as u64
            + self.output_tokens as u64
            + self.cache_creation_input_tokens as u64
            + self.cache_read_input_tokens as u64
    }
}

/// The finish reason on an assistant message, narrowed to the values the engine cares
/// about; anything else from the provider is preserved as `Other`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ToolUse,
    EndTurn,
    MaxTokens,
    StopSequence,
    Other(String),
}

impl StopReason {
    pub fn is_tool_use(&self) -> bool {
        matches!(self, StopReason::ToolUse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_strips_parsed_output() {
        let mut message = ConversationMessage::assistant_blocks(vec![ContentBlock::Text {
            text: "hi".to_string(),
            parsed_output: Some(json!({"x": 1})),
        }]);
        message.sanitize_for_request();
        match &message.content {
            MessageContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::Text { parsed_output, .. } => assert!(parsed_output.is_none()),
                _ => panic!("expected text block"),
            },
            _ => panic!("expected blocks"),
        }
    }

    #[test]
    fn tool_use_blocks_extracts_in_order() {
        let content = MessageContent::Blocks(vec![
            ContentBlock::text("thinking out loud"),
            ContentBlock::tool_use("call_1", "search", json!({"q": "rust"})),
            ContentBlock::tool_use("call_2", "lookup", json!({})),
        ]);
        let calls = content.tool_use_blocks();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "call_1");
        assert_eq!(calls[1].0, "call_2");
    }
}
