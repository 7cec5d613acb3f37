//! Self-delegation: lets a top-level agent invoke another agent mid-run.
//!
//! Guard rails:
//! - depth >= 1 refuses; a sub-agent can never delegate further
//! - a shared per-dispatch counter caps delegated runs at
//!   [`MAX_DELEGATED_RUNS`]; a refused call does not increment it
//! - sub-agents get their domain tools plus the memory tools but no
//!   delegate tool
//! - each sub-run is traced with the `delegation` intent label for the same
//!   user

use crate::caravel::agent::{build_agent, AgentName, RunOptions, Toolbox};
use crate::caravel::client_wrapper::ClientWrapper;
use crate::caravel::config::CoreConfig;
use crate::caravel::event::CancelFlag;
use crate::caravel::protocol::MessageBus;
use crate::caravel::store::{MemoryStore, TraceStatus, TraceStore};
use crate::caravel::tool_protocol::{Tool, ToolResult};
use crate::caravel::tools::memory_tools::{RecallMemoryTool, RecallPastWorkTool, StoreMemoryTool};
use crate::caravel::util::truncate_chars;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-dispatch cap on delegated sub-agent runs.
pub const MAX_DELEGATED_RUNS: usize = 5;

/// Everything a delegation needs to build and run a sub-agent inside the
/// current dispatch.
#[derive(Clone)]
pub struct DelegateContext {
    pub client: Arc<dyn ClientWrapper>,
    pub config: CoreConfig,
    pub toolbox: Toolbox,
    pub user_id: Option<i64>,
    pub conversation_id: Option<i64>,
    /// The dispatch-scoped bus; sub-agents read context from it.
    pub bus: Arc<MessageBus>,
    /// Nesting depth of the delegating agent (top-level agents run at 0).
    pub depth: usize,
    /// Shared, monotonically increasing delegated-run counter.
    pub counter: Arc<AtomicUsize>,
    pub trace_store: Option<Arc<dyn TraceStore>>,
    pub memory_store: Option<Arc<dyn MemoryStore>>,
    pub cancel: Option<CancelFlag>,
}

/// Tool that lets an agent delegate a sub-task to another agent.
pub struct DelegateToAgentTool {
    ctx: DelegateContext,
}

impl DelegateToAgentTool {
    pub fn new(ctx: DelegateContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for DelegateToAgentTool {
    fn name(&self) -> &str {
        "delegate_to_agent"
    }

    fn description(&self) -> &str {
        "Delegate a sub-task to another specialized agent. \
         Use when you need data or analysis from another agent's expertise. \
         Scout finds jobs, Match analyzes compatibility, \
         Forge writes materials, Coach prepares interviews."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_name": {
                    "type": "string",
                    "enum": ["scout", "match", "forge", "coach"],
                    "description": "Which agent to delegate to",
                },
                "task_description": {
                    "type": "string",
                    "description": "What you need the other agent to do",
                },
            },
            "required": ["agent_name", "task_description"],
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let agent_tag = args.get("agent_name").and_then(Value::as_str).unwrap_or("");
        let task = args
            .get("task_description")
            .and_then(Value::as_str)
            .unwrap_or("");

        if agent_tag.is_empty() || task.is_empty() {
            return Ok(ToolResult::failure(
                "agent_name and task_description are required",
            ));
        }

        // No recursive delegation.
        if self.ctx.depth >= 1 {
            return Ok(ToolResult::failure(
                "Cannot delegate from a sub-agent (max depth 1)",
            ));
        }

        // Global run cap; the refused call leaves the counter untouched.
        if self.ctx.counter.load(Ordering::SeqCst) >= MAX_DELEGATED_RUNS {
            return Ok(ToolResult::failure(format!(
                "Delegation limit reached (max {} sub-agent runs per dispatch)",
                MAX_DELEGATED_RUNS
            )));
        }

        let agent_name = match AgentName::parse(agent_tag) {
            Some(name) => name,
            None => return Ok(ToolResult::failure(format!("Unknown agent: {}", agent_tag))),
        };

        self.ctx.counter.fetch_add(1, Ordering::SeqCst);

        // Sub-agent: domain tools plus memory tools, no delegate tool.
        let mut agent = build_agent(
            agent_name,
            self.ctx.client.clone(),
            &self.ctx.config,
            self.ctx.toolbox.tools_for(agent_name),
        );
        if let Some(user_id) = self.ctx.user_id {
            if let Some(memory_store) = &self.ctx.memory_store {
                agent
                    .registry
                    .register(Arc::new(RecallMemoryTool::new(memory_store.clone(), user_id)));
                agent
                    .registry
                    .register(Arc::new(StoreMemoryTool::new(memory_store.clone(), user_id)));
            }
            if let Some(trace_store) = &self.ctx.trace_store {
                agent
                    .registry
                    .register(Arc::new(RecallPastWorkTool::new(trace_store.clone(), user_id)));
            }
        }

        let trace_id = match (self.ctx.user_id, &self.ctx.trace_store) {
            (Some(user_id), Some(store)) => {
                match store
                    .create_trace(
                        user_id,
                        self.ctx.conversation_id,
                        agent_name.as_str(),
                        "delegation",
                        truncate_chars(task, 2000),
                    )
                    .await
                {
                    Ok(id) => Some(id),
                    Err(e) => {
                        log::warn!("delegate: trace create failed: {}", e);
                        None
                    }
                }
            }
            _ => None,
        };

        let run_opts = RunOptions {
            trace_id,
            bus: Some(self.ctx.bus.clone()),
            cancel: self.ctx.cancel.clone(),
            sink: None,
            trace_store: self.ctx.trace_store.clone(),
            rl_hints: String::new(),
        };

        match agent.run(task, &run_opts).await {
            Ok(output) => Ok(ToolResult::success(json!({
                "agent": agent_name.as_str(),
                "output": truncate_chars(&output, 3000),
            }))),
            Err(e) => {
                if let (Some(id), Some(store)) = (trace_id, &self.ctx.trace_store) {
                    if let Err(e) = store
                        .complete_trace(id, TraceStatus::Failed, &e.to_string(), 0, 0)
                        .await
                    {
                        log::warn!("delegate: trace completion failed: {}", e);
                    }
                }
                Ok(ToolResult::failure(format!(
                    "Delegation to {} failed: {}",
                    agent_name,
                    truncate_chars(&e.to_string(), 500)
                )))
            }
        }
    }
}
