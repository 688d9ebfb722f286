//! Condition Evaluator (C7): evaluates boolean Condition Instances directly and batches
//! natural-language ones through a single structured-output tool call (spec §4.4).

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::ConditionError;
use crate::llm::{ChatModel, ChatRequest, ToolDefinition};
use crate::message::{ContentBlock, ConversationMessage, MessageContent};
use crate::store::AgentStore;
use crate::tree::{AgentInstance, ConditionInstance, ConditionPredicate, Instance};

const BATCH_TOOL_NAME: &str = "set_condition_flags";
const MAX_MESSAGES: usize = 10;
const MAX_BLOCK_CHARS: usize = 500;

/// Whether re-evaluation changed any condition's active flag; the engine recollects the
/// agent only when this is true (spec §4.2 "Conditional re-collection").
pub struct ConditionEvalOutcome {
    pub changed: bool,
}

/// Re-evaluates every Condition Instance reachable from `agent`. On the first turn of a
/// run (or when explicitly requested) `include_strings` is true and natural-language
/// conditions are batch-evaluated too; on later turns only booleans are refreshed
/// (spec §4.5 step 2).
pub async fn evaluate_conditions(agent: &mut AgentInstance, include_strings: bool) -> ConditionEvalOutcome {
    let mut changed = update_booleans(&mut agent.children);

    if include_strings {
        let mut prompts = Vec::new();
        collect_string_prompts(&mut agent.children, &mut prompts);

        if !prompts.is_empty() {
            let texts: Vec<String> = prompts.iter().map(|(text, _)| text.clone()).collect();
            match batch_evaluate(agent, &texts).await {
                Ok(active_indices) => {
                    for (index, (_, active_flag)) in prompts.iter_mut().enumerate() {
                        let new_active = active_indices.contains(&index);
                        if **active_flag != new_active {
                            changed = true;
                        }
                        **active_flag = new_active;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        target = "canopy_agent::reconciler::conditions",
                        error = %err,
                        "condition evaluation failed; defaulting natural-language conditions to inactive"
                    );
                    for (_, active_flag) in prompts.iter_mut() {
                        if **active_flag {
                            changed = true;
                        }
                        **active_flag = false;
                    }
                }
            }
        }
    }

    ConditionEvalOutcome { changed }
}

fn update_booleans(children: &mut [Instance]) -> bool {
    let mut changed = false;
    for child in children {
        match child {
            Instance::Condition(condition) => {
                if let ConditionPredicate::Bool(value) = condition.predicate {
                    if condition.active != value {
                        changed = true;
                    }
                    condition.active = value;
                }
                changed |= update_booleans(&mut condition.children);
            }
            Instance::ToolsContainer(nested) => {
                changed |= update_booleans(nested);
            }
            _ => {}
        }
    }
    changed
}

fn collect_string_prompts<'a>(
    children: &'a mut [Instance],
    out: &mut Vec<(String, &'a mut bool)>,
) {
    for child in children {
        match child {
            Instance::Condition(condition) => {
                if let ConditionPredicate::NaturalLanguage(text) = &condition.predicate {
                    let text = text.clone();
                    // SAFETY-free split-borrow workaround: grab the active flag and the
                    // children separately so both can be collected from in one pass.
                    let ConditionInstance { active, children, .. } = condition;
                    out.push((text, active));
                    collect_string_prompts(children, out);
                } else {
                    collect_string_prompts(&mut condition.children, out);
                }
            }
            Instance::ToolsContainer(nested) => {
                collect_string_prompts(nested, out);
            }
            _ => {}
        }
    }
}

async fn batch_evaluate(agent: &AgentInstance, prompts: &[String]) -> Result<Vec<usize>, ConditionError> {
    let valid_indices: Vec<i64> = (0..prompts.len() as i64).collect();
    let schema = json!({
        "type": "object",
        "properties": {
            "active_indices": {
                "type": "array",
                "items": { "type": "integer", "enum": valid_indices }
            }
        },
        "required": ["active_indices"],
        "additionalProperties": false
    });

    let enumerated = prompts
        .iter()
        .enumerate()
        .map(|(index, text)| format!("{index}. {text}"))
        .collect::<Vec<_>>()
        .join("\n");

    let system_prompt = format!(
        "Decide which of the following natural-language conditions are currently true, \
         given the conversation so far. Call `{BATCH_TOOL_NAME}` exactly once with the \
         indices of the conditions that are true.\n\n{enumerated}"
    );

    let mut messages = truncated_history(&agent.store).await;
    messages.push(ConversationMessage::user("Evaluate the conditions now."));

    let mut request = ChatRequest::new(agent.config.model.clone(), 256);
    request.system.push(crate::llm::SystemPart {
        text: system_prompt,
        cache_ephemeral: false,
    });
    request.messages = messages;
    request.tools.push(ToolDefinition {
        name: BATCH_TOOL_NAME.to_string(),
        description: "Report which natural-language conditions are currently true.".to_string(),
        input_schema: schema,
    });
    request.force_tool = Some(BATCH_TOOL_NAME.to_string());

    let response = agent
        .client
        .complete(&request, CancellationToken::new())
        .await
        .map_err(|err| ConditionError::Request(err.to_string()))?;

    let (_, _, input) = response
        .message
        .content
        .tool_use_blocks()
        .into_iter()
        .find(|(_, name, _)| name == BATCH_TOOL_NAME)
        .ok_or(ConditionError::UnparseableResponse)?;

    parse_active_indices(&input)
}

fn parse_active_indices(input: &Value) -> Result<Vec<usize>, ConditionError> {
    input
        .get("active_indices")
        .and_then(Value::as_array)
        .ok_or(ConditionError::UnparseableResponse)?
        .iter()
        .map(|value| {
            value
                .as_u64()
                .map(|n| n as usize)
                .ok_or(ConditionError::UnparseableResponse)
        })
        .collect()
}

async fn truncated_history(store: &AgentStore) -> Vec<ConversationMessage> {
    let all = store.messages().await;
    let start = all.len().saturating_sub(MAX_MESSAGES);
    all[start..]
        .iter()
        .cloned()
        .map(truncate_message)
        .collect()
}

fn truncate_message(mut message: ConversationMessage) -> ConversationMessage {
    if let MessageContent::Blocks(blocks) = &mut message.content {
        for block in blocks {
            truncate_block(block);
        }
    }
    message
}

fn truncate_block(block: &mut ContentBlock) {
    match block {
        ContentBlock::Text { text, .. } => truncate_in_place(text),
        ContentBlock::ToolResult { content, .. } => truncate_in_place(content),
        ContentBlock::Thinking { thinking } => truncate_in_place(thinking),
        ContentBlock::ToolUse { .. } => {}
    }
}

fn truncate_in_place(text: &mut String) {
    if text.chars().count() > MAX_BLOCK_CHARS {
        *text = text.chars().take(MAX_BLOCK_CHARS).collect();
    }
}
