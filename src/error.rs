use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("tool schema must be a JSON object")]
    SchemaNotObject,
    #[error("tool schema must declare type=object")]
    RootTypeMustBeObject,
    #[error("required must be an array of strings")]
    InvalidRequired,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid tool arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("dependency missing: {0}")]
    MissingDependency(&'static str),
    #[error("tool execution failed: {0}")]
    Execution(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider response invalid: {0}")]
    Response(String),
    #[error("request aborted")]
    Aborted,
}

/// Raised synchronously by the reconciler when a tree of [`crate::tree::Element`]s
/// cannot be materialised (spec §7). Always fatal to the reconcile that produced it.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("an Agent instance cannot be nested inside another Agent instance")]
    NestedAgent,
    #[error("subagent '{0}' requires a name and a model before it can be spawned")]
    SubagentMissingConfig(String),
    #[error("subagent '{0}' would recurse into itself (cycle detected by name)")]
    SubagentCycle(String),
    #[error("agent instance has no root Agent Store to attach to")]
    MissingRootStore,
    #[error("duplicate tool registered: {0}")]
    DuplicateTool(String),
}

/// Failure evaluating conditions (spec §4.4 / §7). Never fatal: the evaluator
/// defaults all natural-language conditions to inactive and the loop continues.
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("condition evaluation request failed: {0}")]
    Request(String),
    #[error("condition evaluator returned an unparseable structured response")]
    UnparseableResponse,
}

/// Failure compacting the message log (spec §4.5.1 / §7). Never fatal: the log is
/// left untouched and the loop continues.
#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("compaction request failed: {0}")]
    Request(String),
    #[error("compaction response contained no summary text")]
    NoSummary,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("agent stream ended without final response")]
    MissingFinalResponse,
    #[error("conversation has no seed user message")]
    EmptyConversation,
    #[error("run was aborted")]
    Aborted,
    #[error("agent configuration error: {0}")]
    Config(String),
    #[error("agent handle is already running")]
    AlreadyRunning,
}
