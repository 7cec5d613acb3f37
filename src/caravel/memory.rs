//! Per-run working memory for the ReAct loop.
//!
//! Each agent owns an [`AgentMemory`] that records every reasoning step of
//! the current run: the thought, an optional tool invocation with its result,
//! and the resulting observation.  The memory is what makes the agent
//! stateful across its multi-step execution; the message history rebuilt on
//! every LLM call is derived from it.  It is cleared at the start of each
//! `run` and discarded with the agent.
//!
//! A small key-value "facts" map sits beside the step log for derived values
//! an agent wants to reference without replaying its own transcript.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Record of a single tool execution within the agent loop.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Name of the executed tool.
    pub tool_name: String,
    /// The parsed JSON arguments the tool was called with.
    pub arguments: Value,
    /// The tool's result rendered as JSON (success flag, output, error).
    pub result: Value,
    /// When the invocation completed.
    pub timestamp: DateTime<Utc>,
}

/// One iteration of the ReAct loop: thought, optional action, observation.
#[derive(Debug, Clone)]
pub struct AgentStep {
    /// 1-based step number, strictly increasing within a run.
    pub step_number: usize,
    /// The model's reasoning text for this step.
    pub thought: String,
    /// The tool invocation, when the step took an action.
    pub tool_call: Option<ToolInvocation>,
    /// Rendered tool result or empty for thought-only steps.
    pub observation: String,
}

impl AgentStep {
    /// Build a thought-only step (no tool action).
    pub fn thought(step_number: usize, thought: impl Into<String>) -> Self {
        Self {
            step_number,
            thought: thought.into(),
            tool_call: None,
            observation: String::new(),
        }
    }
}

/// Maintains context across an agent's reasoning steps.
///
/// Stores the full history of thoughts, tool calls, and observations so the
/// agent can reference earlier results when deciding later steps.
#[derive(Debug, Default)]
pub struct AgentMemory {
    steps: Vec<AgentStep>,
    facts: HashMap<String, Value>,
}

impl AgentMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded steps in execution order.
    pub fn steps(&self) -> &[AgentStep] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Record a completed reasoning step.
    pub fn add_step(&mut self, step: AgentStep) {
        self.steps.push(step);
    }

    /// Store a derived fact discovered during execution.  Facts persist
    /// across steps and can be referenced later in the same run.
    pub fn store_fact(&mut self, key: impl Into<String>, value: Value) {
        self.facts.insert(key.into(), value);
    }

    /// Retrieve a previously stored fact.
    pub fn get_fact(&self, key: &str) -> Option<&Value> {
        self.facts.get(key)
    }

    /// All stored facts.
    pub fn facts(&self) -> &HashMap<String, Value> {
        &self.facts
    }

    /// Build a text summary of all steps for LLM context.
    ///
    /// Used as the returned output when a run ends by cancellation or by
    /// exhausting its step budget.
    pub fn history_summary(&self) -> String {
        if self.steps.is_empty() {
            return "No previous steps.".to_string();
        }

        let mut lines = Vec::new();
        for step in &self.steps {
            lines.push(format!("Step {}:", step.step_number));
            lines.push(format!("  Thought: {}", step.thought));
            if let Some(call) = &step.tool_call {
                lines.push(format!("  Action: {}({})", call.tool_name, call.arguments));
                lines.push(format!(
                    "  Observation: {}",
                    crate::caravel::util::truncate_chars(&step.observation, 500)
                ));
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }

    /// Reset memory for a new task.
    pub fn clear(&mut self) {
        self.steps.clear();
        self.facts.clear();
    }
}
