//! Memory tool handlers (C14, spec §6.3): six named commands operating against a
//! sandboxed root directory. Grounded in the teacher's
//! `tools::claude_code::SandboxContext::resolve_path` path-escape check and its
//! read/write/edit tool bodies, adapted from the teacher's `ToolSpec`/`DependencyMap`
//! shape onto this crate's `Tool`/`ToolContext`.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tool::{Tool, ToolOutcome};

/// The sandboxed root a memory tool instance is confined to. Every path argument is
/// resolved against `root` and rejected if it would escape it.
#[derive(Debug, Clone)]
pub struct MemorySandbox {
    root: PathBuf,
}

impl MemorySandbox {
    /// Wraps `root` without touching the filesystem; the directory is created lazily by
    /// whichever command first needs it to exist (`create`, `insert`, `rename`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: normalize(&root.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, String> {
        let candidate = Path::new(path);
        let unresolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };
        let resolved = normalize(&unresolved);

        if !resolved.starts_with(&self.root) {
            return Err(format!("Path escapes memory root: {path}"));
        }

        Ok(resolved)
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Path::new("/")),
            Component::CurDir => {}
            Component::ParentDir => {
                let _ = normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// Builds the "memory" [`Tool`] dispatched by command name (spec §6.3). The reconciler
/// pushes this into an agent's tool aggregate whenever an `SdkTool::Memory` is collected,
/// alongside the wire-level descriptor the chat service expects to see announced.
pub fn memory_tool(sandbox: Arc<MemorySandbox>) -> Tool {
    Tool::new(
        "memory",
        "View, create, and edit files in a persistent memory directory.",
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "command": {
                "type": "string",
                "enum": ["view", "create", "str_replace", "insert", "delete", "rename"]
            },
            "path": {"type": "string"},
            "new_path": {"type": "string"},
            "file_text": {"type": "string"},
            "old_str": {"type": "string"},
            "new_str": {"type": "string"},
            "replace_all": {"type": "boolean"},
            "insert_line": {"type": "integer"},
            "insert_text": {"type": "string"},
            "overwrite": {"type": "boolean"}
        },
        "required": ["command", "path"],
        "additionalProperties": false
    }))
    .unwrap_or_else(|_| Tool::new("memory", "memory tool"))
    .with_handler(move |args, _ctx| {
        let sandbox = sandbox.clone();
        async move { dispatch(&sandbox, &args) }
    })
}

fn dispatch(sandbox: &MemorySandbox, args: &Value) -> Result<ToolOutcome, ToolError> {
    let command = args.get("command").and_then(Value::as_str).unwrap_or("");
    let path = args.get("path").and_then(Value::as_str).unwrap_or("");

    match command {
        "view" => view(sandbox, path),
        "create" => create(sandbox, path, args),
        "str_replace" => str_replace(sandbox, path, args),
        "insert" => insert(sandbox, path, args),
        "delete" => delete(sandbox, path),
        "rename" => rename(sandbox, path, args),
        other => Err(ToolError::Execution(format!(
            "unknown memory command: {other}"
        ))),
    }
}

fn view(sandbox: &MemorySandbox, path: &str) -> Result<ToolOutcome, ToolError> {
    let resolved = sandbox
        .resolve(path)
        .map_err(ToolError::Execution)?;

    if !resolved.exists() {
        return Ok(ToolOutcome::Text(format!("Not found: {path}")));
    }

    if resolved.is_dir() {
        let mut entries: Vec<String> = fs::read_dir(&resolved)
            .map_err(|err| ToolError::Execution(err.to_string()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                if entry.path().is_dir() {
                    format!("{name}/")
                } else {
                    name
                }
            })
            .collect();
        entries.sort();
        return Ok(ToolOutcome::Text(if entries.is_empty() {
            format!("{path} is an empty directory")
        } else {
            entries.join("\n")
        }));
    }

    let content = fs::read_to_string(&resolved).map_err(|err| ToolError::Execution(err.to_string()))?;
    let numbered = content
        .lines()
        .enumerate()
        .map(|(idx, line)| format!("{:4}  {}", idx + 1, line))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(ToolOutcome::Text(numbered))
}

fn create(sandbox: &MemorySandbox, path: &str, args: &Value) -> Result<ToolOutcome, ToolError> {
    let resolved = sandbox.resolve(path).map_err(ToolError::Execution)?;
    let overwrite = args.get("overwrite").and_then(Value::as_bool).unwrap_or(false);

    if resolved.exists() && !overwrite {
        return Ok(ToolOutcome::Text(format!(
            "{path} already exists (pass overwrite=true to replace it)"
        )));
    }

    let file_text = args.get("file_text").and_then(Value::as_str).unwrap_or("");

    if let Some(parent) = resolved.parent() {
        fs::create_dir_all(parent).map_err(|err| ToolError::Execution(err.to_string()))?;
    }
    fs::write(&resolved, file_text).map_err(|err| ToolError::Execution(err.to_string()))?;

    Ok(ToolOutcome::Text(format!(
        "Wrote {} bytes to {path}",
        file_text.len()
    )))
}

fn str_replace(sandbox: &MemorySandbox, path: &str, args: &Value) -> Result<ToolOutcome, ToolError> {
    let resolved = sandbox.resolve(path).map_err(ToolError::Execution)?;
    let old_str = args.get("old_str").and_then(Value::as_str).unwrap_or("");
    let new_str = args.get("new_str").and_then(Value::as_str).unwrap_or("");
    let replace_all = args.get("replace_all").and_then(Value::as_bool).unwrap_or(false);

    if !resolved.exists() {
        return Ok(ToolOutcome::Text(format!("Not found: {path}")));
    }

    let content = fs::read_to_string(&resolved).map_err(|err| ToolError::Execution(err.to_string()))?;
    let occurrences = content.matches(old_str).count();

    if occurrences == 0 {
        return Ok(ToolOutcome::Text(format!(
            "No occurrence of the given string found in {path}"
        )));
    }
    if occurrences > 1 && !replace_all {
        return Ok(ToolOutcome::Text(format!(
            "Found {occurrences} occurrences in {path}; pass replace_all=true to replace them all"
        )));
    }

    let updated = if replace_all {
        content.replace(old_str, new_str)
    } else {
        content.replacen(old_str, new_str, 1)
    };
    fs::write(&resolved, updated).map_err(|err| ToolError::Execution(err.to_string()))?;

    Ok(ToolOutcome::Text(format!(
        "Replaced {occurrences} occurrence(s) in {path}"
    )))
}

fn insert(sandbox: &MemorySandbox, path: &str, args: &Value) -> Result<ToolOutcome, ToolError> {
    let resolved = sandbox.resolve(path).map_err(ToolError::Execution)?;
    let insert_line = args.get("insert_line").and_then(Value::as_u64).unwrap_or(0) as usize;
    let insert_text = args.get("insert_text").and_then(Value::as_str).unwrap_or("");

    if !resolved.exists() {
        return Ok(ToolOutcome::Text(format!("Not found: {path}")));
    }

    let content = fs::read_to_string(&resolved).map_err(|err| ToolError::Execution(err.to_string()))?;
    let mut lines: Vec<&str> = content.lines().collect();

    if insert_line > lines.len() {
        return Ok(ToolOutcome::Text(format!(
            "insert_line {insert_line} is past the end of {path} ({} lines)",
            lines.len()
        )));
    }

    lines.insert(insert_line, insert_text);
    let updated = lines.join("\n") + "\n";
    fs::write(&resolved, updated).map_err(|err| ToolError::Execution(err.to_string()))?;

    Ok(ToolOutcome::Text(format!(
        "Inserted 1 line into {path} after line {insert_line}"
    )))
}

fn delete(sandbox: &MemorySandbox, path: &str) -> Result<ToolOutcome, ToolError> {
    let resolved = sandbox.resolve(path).map_err(ToolError::Execution)?;

    if !resolved.exists() {
        return Ok(ToolOutcome::Text(format!("Not found: {path}")));
    }

    if resolved.is_dir() {
        fs::remove_dir(&resolved).map_err(|_| {
            ToolError::Execution(format!("{path} is not an empty directory"))
        })?;
    } else {
        fs::remove_file(&resolved).map_err(|err| ToolError::Execution(err.to_string()))?;
    }

    Ok(ToolOutcome::Text(format!("Deleted {path}")))
}

fn rename(sandbox: &MemorySandbox, path: &str, args: &Value) -> Result<ToolOutcome, ToolError> {
    let from = sandbox.resolve(path).map_err(ToolError::Execution)?;
    let new_path = args.get("new_path").and_then(Value::as_str).unwrap_or("");
    let to = sandbox.resolve(new_path).map_err(ToolError::Execution)?;

    if !from.exists() {
        return Ok(ToolOutcome::Text(format!("Not found: {path}")));
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|err| ToolError::Execution(err.to_string()))?;
    }
    fs::rename(&from, &to).map_err(|err| ToolError::Execution(err.to_string()))?;

    Ok(ToolOutcome::Text(format!("Renamed {path} to {new_path}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn test_sandbox() -> MemorySandbox {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let root = std::env::temp_dir().join(format!("canopy_agent_memory_{millis}"));
        MemorySandbox::new(root)
    }

    #[test]
    fn path_resolution_blocks_escape() {
        let sandbox = test_sandbox();
        assert!(sandbox.resolve("../../etc/passwd").is_err());
        let _ = fs::remove_dir_all(sandbox.root());
    }

    #[test]
    fn create_then_view_round_trips() {
        let sandbox = test_sandbox();
        create(&sandbox, "notes.md", &json!({"file_text": "hello"})).expect("create");
        let viewed = view(&sandbox, "notes.md").expect("view");
        assert!(matches!(viewed, ToolOutcome::Text(ref text) if text.contains("hello")));
        let _ = fs::remove_dir_all(sandbox.root());
    }

    #[test]
    fn str_replace_reports_ambiguity_without_replace_all() {
        let sandbox = test_sandbox();
        create(&sandbox, "dup.md", &json!({"file_text": "a a a"})).expect("create");
        let result = str_replace(&sandbox, "dup.md", &json!({"old_str": "a", "new_str": "b"})).expect("no error");
        assert!(matches!(result, ToolOutcome::Text(ref text) if text.contains("Found 3 occurrences")));
        let _ = fs::remove_dir_all(sandbox.root());
    }

    #[test]
    fn delete_rejects_nonempty_directory() {
        let sandbox = test_sandbox();
        create(&sandbox, "dir/file.md", &json!({"file_text": "x"})).expect("create");
        let result = delete(&sandbox, "dir").expect("no error");
        assert!(matches!(result, ToolOutcome::Text(ref text) if text.contains("not an empty directory")));
        let _ = fs::remove_dir_all(sandbox.root());
    }
}
