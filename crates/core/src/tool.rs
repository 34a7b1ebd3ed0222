//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what let the driving agent act in the world: query the
//! calendar, send the summary email. The schema each tool declares is
//! advisory — it is sent to the model so it knows how to call the tool,
//! but validation happens inside the tool itself, which reports bad
//! arguments as an error result rather than raising.

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the provider's tool_use id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
///
/// Invariant: `output` is never empty, even when `is_error` is set — the
/// driving agent always gets something to reason about. Use the
/// constructors to keep that invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool failed
    pub is_error: bool,

    /// The output content (error description when `is_error`)
    pub output: String,
}

impl ToolResult {
    /// A successful result.
    pub fn ok(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::build(call_id, false, output)
    }

    /// A failed result; the message is surfaced to the agent as data.
    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(call_id, true, message)
    }

    fn build(call_id: impl Into<String>, is_error: bool, output: impl Into<String>) -> Self {
        let output = output.into();
        Self {
            call_id: call_id.into(),
            is_error,
            output: if output.is_empty() {
                "(no output)".into()
            } else {
                output
            },
        }
    }
}

/// The core Tool trait.
///
/// Each capability (`send_email`, `calendar_events`) implements this trait.
/// Tools are registered in the ToolRegistry and exposed to the session.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "send_email").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    ///
    /// Runtime failures (bad arguments, missing transport configuration,
    /// network errors) come back as error `ToolResult`s, not `Err` — the
    /// `Err` channel is reserved for dispatch-level problems.
    async fn execute(&self, call: &ToolCall) -> ToolResult;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The session uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Look up and execute tools when the model requests them
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Whether a tool with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get all tool definitions (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool call.
    ///
    /// An unregistered name is a hard `NotFound` error — the session
    /// validates its allow-list against the registry up front, so hitting
    /// this at dispatch time means a wiring bug, not a model mistake.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        Ok(tool.execute(call).await)
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, call: &ToolCall) -> ToolResult {
            match call.arguments["text"].as_str() {
                Some(text) => ToolResult::ok(&call.id, text),
                None => ToolResult::error(&call.id, "Missing 'text' argument"),
            }
        }
    }

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments: args,
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.contains("echo"));
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn registry_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let result = registry
            .execute(&call("echo", serde_json::json!({"text": "hello world"})))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.output, "hello world");
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute(&call("nonexistent", serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn bad_arguments_become_error_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let result = registry
            .execute(&call("echo", serde_json::json!({})))
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.output.contains("text"));
    }

    #[test]
    fn error_result_output_never_empty() {
        let result = ToolResult::error("call_1", "");
        assert!(result.is_error);
        assert!(!result.output.is_empty());
    }
}
