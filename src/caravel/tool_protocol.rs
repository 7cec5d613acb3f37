//! Tool capability abstraction and registry.
//!
//! Every capability an agent can invoke (domain tools bound by the host,
//! the memory tools, the delegate tool) implements the [`Tool`] trait:
//! a name, a description, a JSON-schema parameter object, and an async
//! `execute`.  A [`ToolRegistry`] aggregates the tools available to one
//! agent and handles name-based dispatch; registration is last-write-wins on
//! name collision.
//!
//! The [`FnTool`] adapter binds a [`ToolSpec`] (name/description/schema) to
//! an async closure so hosts and tests can provide tool implementations
//! without defining new types.
//!
//! # Example
//!
//! ```rust
//! use caravel::caravel::tool_protocol::{FnTool, ToolRegistry, ToolResult, ToolSpec};
//! use std::sync::Arc;
//!
//! # async {
//! let spec = ToolSpec::new(
//!     "echo",
//!     "Echoes its input back.",
//!     serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}}),
//! );
//! let tool = FnTool::new(spec, |args| async move {
//!     Ok(ToolResult::success(args))
//! });
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(Arc::new(tool));
//!
//! let result = registry.execute("echo", serde_json::json!({"text": "hi"})).await;
//! assert!(result.success);
//! # };
//! ```

use crate::caravel::client_wrapper::ToolDefinition;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

/// Represents the result of a tool execution.
///
/// Every tool returns one of these; a thrown error at the execution layer is
/// converted into a `failure` result by the registry so the agent always sees
/// a structured outcome it can react to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool execution was successful.
    pub success: bool,
    /// The output data from the tool.
    pub output: serde_json::Value,
    /// Optional error message if execution failed.
    pub error: Option<String>,
}

impl ToolResult {
    /// Convenience constructor for successful tool execution.
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    /// Convenience constructor for failed tool execution.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

/// A capability an agent can invoke during its ReAct loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique identifier the agent uses to select this tool.
    fn name(&self) -> &str;

    /// Human-readable description of what this tool does.  The model reads
    /// this to decide when to use the tool.
    fn description(&self) -> &str;

    /// JSON schema describing the expected input parameters.
    fn parameters(&self) -> serde_json::Value;

    /// Run the tool with the given parameters.
    async fn execute(
        &self,
        args: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>>;
}

/// Static shape of a tool: identity, description, and parameter schema.
///
/// The domain tools shipped by this crate are published as specs (see
/// [`tools::specs`](crate::caravel::tools::specs)); the host binds each spec
/// to an implementation via [`FnTool`].
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

type ToolHandler = Box<
    dyn Fn(serde_json::Value) -> BoxFuture<'static, Result<ToolResult, Box<dyn Error + Send + Sync>>>
        + Send
        + Sync,
>;

/// A tool backed by an async closure.
pub struct FnTool {
    spec: ToolSpec,
    handler: ToolHandler,
}

impl FnTool {
    /// Bind a spec to an async handler.
    pub fn new<F, Fut>(spec: ToolSpec, handler: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ToolResult, Box<dyn Error + Send + Sync>>>
            + Send
            + 'static,
    {
        Self {
            spec,
            handler: Box::new(move |args| Box::pin(handler(args))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn description(&self) -> &str {
        &self.spec.description
    }

    fn parameters(&self) -> serde_json::Value {
        self.spec.parameters.clone()
    }

    async fn execute(
        &self,
        args: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        (self.handler)(args).await
    }
}

/// Registry that holds all tools available to one agent.
///
/// Iteration order follows registration order so generated tool descriptions
/// are stable.  Registering a tool under an existing name replaces the
/// previous entry in place.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool so the agent can use it (last-write-wins on name).
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// All registered tools in registration order.
    pub fn list(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Convert all tools into the provider-facing definition shape.
    pub fn to_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters_schema: t.parameters(),
            })
            .collect()
    }

    /// Execute a named tool, folding lookup misses and execution errors into
    /// failure results so the caller always gets a structured outcome.
    pub async fn execute(&self, name: &str, args: serde_json::Value) -> ToolResult {
        let tool = match self.get(name) {
            Some(tool) => tool,
            None => return ToolResult::failure(format!("Unknown tool: {}", name)),
        };
        match tool.execute(args).await {
            Ok(result) => result,
            Err(e) => ToolResult::failure(format!("Tool failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool(name: &str, reply: &'static str) -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            ToolSpec::new(name, "test tool", json!({"type": "object"})),
            move |_args| async move { Ok(ToolResult::success(json!({ "reply": reply }))) },
        ))
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("ping", "pong"));

        let result = registry.execute("ping", json!({})).await;
        assert!(result.success);
        assert_eq!(result.output["reply"], "pong");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failure_result() {
        let registry = ToolRegistry::new();
        let result = registry.execute("missing", json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn registration_is_last_write_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("ping", "old"));
        registry.register(echo_tool("ping", "new"));

        assert_eq!(registry.list().len(), 1);
        let result = registry.execute("ping", json!({})).await;
        assert_eq!(result.output["reply"], "new");
    }

    #[tokio::test]
    async fn execution_errors_become_failures() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new(
            ToolSpec::new("broken", "always errors", json!({"type": "object"})),
            |_args| async move { Err("connection refused".into()) },
        )));

        let result = registry.execute("broken", json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("connection refused"));
    }

    #[test]
    fn definitions_follow_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("a", "x"));
        registry.register(echo_tool("b", "y"));

        let defs = registry.to_tool_definitions();
        assert_eq!(defs[0].name, "a");
        assert_eq!(defs[1].name, "b");
    }
}
