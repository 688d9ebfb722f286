//! Context compaction (spec §4.5.1): replaces the message log with a single summary
//! message once usage crosses the configured threshold. Runs between turns only; never
//! affects the in-flight turn.

use tokio_util::sync::CancellationToken;

use crate::error::CompactionError;
use crate::llm::ChatRequest;
use crate::message::{ContentBlock, ConversationMessage, MessageContent};
use crate::message::Usage;
use crate::tree::AgentInstance;

/// Summarizes and replaces the message log once `usage` crosses the configured
/// threshold. A no-op, not an error, when compaction is disabled or the threshold
/// hasn't been crossed; callers should log `Err` and keep running (spec §4.5.1: "never
/// fatal, the log is left untouched and the loop continues").
pub async fn maybe_compact(agent: &AgentInstance, usage: Usage) -> Result<(), CompactionError> {
    if !agent.config.compaction.enabled {
        return Ok(());
    }

    if usage.total() <= agent.config.compaction.threshold_tokens {
        return Ok(());
    }

    let mut log = agent.store.messages().await;

    match log.last_mut() {
        Some(last) if last.role == crate::message::Role::Assistant => {
            if let MessageContent::Blocks(blocks) = &mut last.content {
                let only_tool_use = blocks
                    .iter()
                    .all(|block| matches!(block, ContentBlock::ToolUse { .. }));
                if only_tool_use {
                    log.pop();
                } else {
                    blocks.retain(|block| !matches!(block, ContentBlock::ToolUse { .. }));
                }
            }
        }
        _ => {}
    }

    for message in &mut log {
        message.sanitize_for_request();
    }

    let model = agent
        .config
        .compaction
        .model
        .clone()
        .unwrap_or_else(|| agent.config.model.clone());

    let mut request = ChatRequest::new(model, agent.config.max_tokens);
    request.messages = log;
    request
        .messages
        .push(ConversationMessage::user(agent.config.compaction.summary_prompt.clone()));

    let response = agent
        .client
        .complete(&request, CancellationToken::new())
        .await
        .map_err(|err| CompactionError::Request(err.to_string()))?;

    let summary = response.message.content.concatenated_text();
    if summary.is_empty() {
        return Err(CompactionError::NoSummary);
    }

    agent
        .store
        .replace_messages(vec![ConversationMessage::user(summary)])
        .await;
    Ok(())
}
