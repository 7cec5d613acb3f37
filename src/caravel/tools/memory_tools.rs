//! Memory tools agents can invoke mid-execution.
//!
//! These give agents the ability to recall past memories, store new ones,
//! and review past work traces during their ReAct loop.  They are registered
//! by the orchestrator only when a user is attached to the dispatch.

use crate::caravel::agent::AgentName;
use crate::caravel::episodic::EpisodicMemory;
use crate::caravel::store::{MemoryCategory, MemoryStore, TraceStore};
use crate::caravel::tool_protocol::{Tool, ToolResult};
use crate::caravel::util::truncate_chars;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Arc;

fn category_arg(args: &Value) -> Option<MemoryCategory> {
    args.get("category")
        .and_then(Value::as_str)
        .map(MemoryCategory::parse_or_fact)
}

/// Recall stored user memories during agent execution.
pub struct RecallMemoryTool {
    store: Arc<dyn MemoryStore>,
    user_id: i64,
}

impl RecallMemoryTool {
    pub fn new(store: Arc<dyn MemoryStore>, user_id: i64) -> Self {
        Self { store, user_id }
    }
}

#[async_trait]
impl Tool for RecallMemoryTool {
    fn name(&self) -> &str {
        "recall_memory"
    }

    fn description(&self) -> &str {
        "Search the user's memory for relevant past information. \
         Returns facts, preferences, goals, and outcomes from previous conversations. \
         Use this when you need context about the user's background, preferences, or past results."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search term to find relevant memories (e.g. 'Python skills', 'target company', 'ATS score')",
                },
                "category": {
                    "type": "string",
                    "enum": ["fact", "preference", "goal", "outcome"],
                    "description": "Optional: filter by memory category",
                },
            },
            "required": ["query"],
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let query = args.get("query").and_then(Value::as_str).unwrap_or("");
        let memory = EpisodicMemory::new(self.store.clone(), self.user_id);

        let memories = if !query.is_empty() {
            memory.search(query, 10).await?
        } else {
            memory.recall(category_arg(&args), 10).await?
        };

        let results: Vec<Value> = memories
            .iter()
            .map(|m| {
                json!({
                    "content": m.content,
                    "category": m.category.as_str(),
                    "created_at": m.created_at.to_rfc3339(),
                })
            })
            .collect();

        Ok(ToolResult::success(json!({
            "memories": results,
            "count": results.len(),
        })))
    }
}

/// Store a new memory about the user during agent execution.
pub struct StoreMemoryTool {
    store: Arc<dyn MemoryStore>,
    user_id: i64,
}

impl StoreMemoryTool {
    pub fn new(store: Arc<dyn MemoryStore>, user_id: i64) -> Self {
        Self { store, user_id }
    }
}

#[async_trait]
impl Tool for StoreMemoryTool {
    fn name(&self) -> &str {
        "store_memory"
    }

    fn description(&self) -> &str {
        "Store an important fact or observation about the user for future reference. \
         Use this when you discover something worth remembering — skills, preferences, \
         job search results, ATS scores, interview outcomes, etc."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The fact or observation to remember (be specific and concise)",
                },
                "category": {
                    "type": "string",
                    "enum": ["fact", "preference", "goal", "outcome"],
                    "description": "Category: fact (objective info), preference (user likes/dislikes), goal (career targets), outcome (results of actions)",
                },
            },
            "required": ["content", "category"],
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let content = args.get("content").and_then(Value::as_str).unwrap_or("");
        if content.is_empty() {
            return Ok(ToolResult::failure("Content is required"));
        }
        let category = category_arg(&args).unwrap_or(MemoryCategory::Fact);

        let memory = EpisodicMemory::new(self.store.clone(), self.user_id);
        let memory_id = memory.remember(content, category, None).await?;

        Ok(ToolResult::success(json!({
            "memory_id": memory_id,
            "message": format!("Stored {}: {}", category.as_str(), truncate_chars(content, 100)),
        })))
    }
}

/// Review summaries of past agent runs for this user.
pub struct RecallPastWorkTool {
    store: Arc<dyn TraceStore>,
    user_id: i64,
}

impl RecallPastWorkTool {
    pub fn new(store: Arc<dyn TraceStore>, user_id: i64) -> Self {
        Self { store, user_id }
    }
}

#[async_trait]
impl Tool for RecallPastWorkTool {
    fn name(&self) -> &str {
        "recall_past_work"
    }

    fn description(&self) -> &str {
        "Review summaries of past agent runs for this user. \
         Shows what agents did previously, what tools were used, and outcomes. \
         Useful for avoiding redundant work or building on past results."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_name": {
                    "type": "string",
                    "enum": ["scout", "match", "forge", "coach"],
                    "description": "Optional: filter by agent type",
                },
                "limit": {
                    "type": "integer",
                    "description": "Number of past runs to retrieve (default 5, max 10)",
                },
            },
            "required": [],
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let agent_filter = args
            .get("agent_name")
            .and_then(Value::as_str)
            .and_then(AgentName::parse);
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(5)
            .min(10) as usize;

        let mut traces = self.store.get_traces(self.user_id, 20).await?;
        if let Some(agent) = agent_filter {
            traces.retain(|t| t.agent_name == agent.as_str());
        }
        traces.truncate(limit);

        let results: Vec<Value> = traces
            .iter()
            .map(|t| {
                json!({
                    "agent": t.agent_name,
                    "intent": t.intent,
                    "status": t.status.as_str(),
                    "output_preview": truncate_chars(&t.output, 500),
                    "total_steps": t.total_steps,
                    "total_tool_calls": t.total_tool_calls,
                    "started_at": t.started_at.to_rfc3339(),
                })
            })
            .collect();

        Ok(ToolResult::success(json!({
            "traces": results,
            "count": results.len(),
        })))
    }
}
