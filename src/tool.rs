//! Tool descriptor, JSON-schema validation, and the invocation wrapper (C2).

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::{SchemaError, ToolError};
use crate::message::ContentBlock;
use crate::spawn::ToolContext;

/// What a tool handler may return on success.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutcome {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl ToolOutcome {
    pub fn into_text(self) -> String {
        match self {
            ToolOutcome::Text(text) => text,
            ToolOutcome::Blocks(blocks) => blocks
                .iter()
                .filter_map(ContentBlock::as_text)
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

type ToolHandler =
    dyn Fn(Value, ToolContext) -> BoxFuture<'static, Result<ToolOutcome, ToolError>> + Send + Sync;

/// A Tool Instance (spec §3): name, description, JSON schema, and a callback. This is
/// the runtime shape produced both for user-authored tools and for the synthetic tools
/// the reconciler builds out of Agent-Tool and Subagent instances (C6).
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    json_schema: Value,
    handler: Arc<ToolHandler>,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("json_schema", &self.json_schema)
            .finish()
    }
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            json_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": true,
            }),
            handler: Arc::new(|_args, _ctx| {
                Box::pin(async {
                    Err(ToolError::Execution(
                        "tool handler not configured".to_string(),
                    ))
                })
            }),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Result<Self, SchemaError> {
        validate_schema(&schema)?;
        self.json_schema = schema;
        Ok(self)
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutcome, ToolError>> + Send + 'static,
    {
        self.handler = Arc::new(move |args, ctx| Box::pin(handler(args, ctx)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn json_schema(&self) -> &Value {
        &self.json_schema
    }

    /// Validates `args` against this tool's schema, then invokes the handler. Schema
    /// failures are returned as [`ToolError::InvalidArguments`] and never reach the
    /// handler (spec §6.2: validation errors become tool results, not thrown errors).
    pub async fn invoke(&self, args: Value, ctx: ToolContext) -> Result<ToolOutcome, ToolError> {
        validate_arguments(self.name(), &self.json_schema, &args)?;
        (self.handler)(args, ctx).await
    }
}

pub fn validate_schema(schema: &Value) -> Result<(), SchemaError> {
    let schema_obj = schema.as_object().ok_or(SchemaError::SchemaNotObject)?;

    let root_type = schema_obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(SchemaError::RootTypeMustBeObject)?;

    if root_type != "object" {
        return Err(SchemaError::RootTypeMustBeObject);
    }

    if let Some(required) = schema_obj.get("required") {
        let required_arr = required.as_array().ok_or(SchemaError::InvalidRequired)?;
        for item in required_arr {
            if !item.is_string() {
                return Err(SchemaError::InvalidRequired);
            }
        }
    }

    Ok(())
}

/// Validates `args` against `schema`, producing a formatted, human-readable message on
/// failure (spec §6.2: `Validation error: <path>: <message>, ...`).
pub fn validate_arguments(tool_name: &str, schema: &Value, args: &Value) -> Result<(), ToolError> {
    let mut problems = Vec::new();

    let Some(args_obj) = args.as_object() else {
        return Err(ToolError::InvalidArguments {
            tool: tool_name.to_string(),
            message: "arguments must be a JSON object".to_string(),
        });
    };

    let schema_obj = schema
        .as_object()
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool_name.to_string(),
            message: "tool schema must be a JSON object".to_string(),
        })?;

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        for field in required {
            let Some(field_name) = field.as_str() else {
                continue;
            };
            if !args_obj.contains_key(field_name) {
                problems.push(format!("{field_name}: missing required field"));
            }
        }
    }

    let properties = schema_obj
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if schema_obj
        .get("additionalProperties")
        .and_then(Value::as_bool)
        == Some(false)
    {
        for key in args_obj.keys() {
            if !properties.contains_key(key) {
                problems.push(format!("{key}: unknown field"));
            }
        }
    }

    for (key, value) in args_obj {
        if let Some(field_schema) = properties.get(key) {
            if let Some(type_name) = field_schema.get("type").and_then(Value::as_str) {
                if !value_matches_type(value, type_name) {
                    problems.push(format!("{key}: must be of type {type_name}"));
                }
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments {
            tool: tool_name.to_string(),
            message: problems.join(", "),
        })
    }
}

fn value_matches_type(value: &Value, type_name: &str) -> bool {
    match type_name {
        "string" => value.is_string(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "number" => value.as_f64().is_some(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Formats a validation failure the way the LLM sees it: `Validation error: a: missing
/// required field, b: must be of type integer`.
pub fn format_validation_error(err: &ToolError) -> String {
    match err {
        ToolError::InvalidArguments { message, .. } => format!("Validation error: {message}"),
        other => format!("Error: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_validation_rejects_non_object_root() {
        let result = Tool::new("bad", "bad").with_schema(json!({"type": "string"}));
        assert!(result.is_err());
    }

    #[test]
    fn argument_validation_reports_missing_required() {
        let schema = json!({
            "type": "object",
            "properties": {"value": {"type": "string"}},
            "required": ["value"],
            "additionalProperties": false
        });

        let err = validate_arguments("req", &schema, &json!({})).expect_err("should fail");
        assert!(format_validation_error(&err).contains("missing required field"));
    }

    #[test]
    fn argument_validation_reports_unknown_field() {
        let schema = json!({
            "type": "object",
            "properties": {},
            "required": [],
            "additionalProperties": false
        });

        let err = validate_arguments("req", &schema, &json!({"extra": 1})).expect_err("fail");
        assert!(format_validation_error(&err).contains("unknown field"));
    }

    #[test]
    fn argument_validation_accepts_well_typed_object() {
        let schema = json!({
            "type": "object",
            "properties": {"n": {"type": "integer"}},
            "required": ["n"],
            "additionalProperties": false
        });
        assert!(validate_arguments("ok", &schema, &json!({"n": 3})).is_ok());
    }
}
