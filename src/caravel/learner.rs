//! Learns from past traces to build per-user expertise context.
//!
//! Before an agent runs, the orchestrator asks the [`AgentLearner`] for an
//! experience block distilled from that user's history with the same agent:
//! tool success rates, recent successful outputs annotated with feedback,
//! failure counts, and related memories.  The block is appended to the task
//! so agents improve with every user they serve.

use crate::caravel::agent::AgentName;
use crate::caravel::store::{Feedback, MemoryStore, TraceStatus, TraceStore};
use crate::caravel::util::truncate_chars;
use std::collections::HashMap;
use std::sync::Arc;

/// Analyzes past agent traces to build expertise context for prompts.
pub struct AgentLearner {
    trace_store: Arc<dyn TraceStore>,
    memory_store: Option<Arc<dyn MemoryStore>>,
}

impl AgentLearner {
    pub fn new(
        trace_store: Arc<dyn TraceStore>,
        memory_store: Option<Arc<dyn MemoryStore>>,
    ) -> Self {
        Self {
            trace_store,
            memory_store,
        }
    }

    /// Build an experience context block from past runs, or an empty string
    /// when there is nothing to learn from.  Store failures are swallowed;
    /// learning is never allowed to break a dispatch.
    pub async fn expertise_context(&self, user_id: i64, agent: AgentName) -> String {
        let traces = match self.trace_store.get_traces(user_id, 20).await {
            Ok(traces) => traces,
            Err(e) => {
                log::warn!("learner: trace read failed: {}", e);
                return String::new();
            }
        };

        let agent_traces: Vec<_> = traces
            .iter()
            .filter(|t| t.agent_name == agent.as_str())
            .collect();
        if agent_traces.is_empty() {
            return String::new();
        }

        let successful: Vec<_> = agent_traces
            .iter()
            .filter(|t| t.status == TraceStatus::Completed)
            .collect();
        let failed_count = agent_traces
            .iter()
            .filter(|t| t.status == TraceStatus::Failed)
            .count();

        let mut lines = vec!["PAST EXPERIENCE WITH THIS USER:".to_string()];

        let mut tool_stats: Vec<(String, f64)> = self
            .tool_effectiveness(user_id, agent)
            .await
            .into_iter()
            .collect();
        tool_stats.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (tool, rate) in tool_stats {
            lines.push(format!(
                "- {}: {:.0}% success rate in past runs",
                tool,
                rate * 100.0
            ));
        }

        for trace in successful.iter().take(3) {
            if trace.output.is_empty() {
                continue;
            }
            let preview = truncate_chars(&trace.output, 200).replace('\n', " ");
            let prefix = match trace.feedback {
                Some(Feedback::Positive) => "[User found this helpful] ",
                Some(Feedback::Negative) => "[Try different approach] ",
                None => "",
            };
            lines.push(format!(
                "- {}Previous run ({} steps, {} tool calls): {}",
                prefix,
                trace.total_steps,
                trace.total_tool_calls,
                preview.trim()
            ));
        }

        if failed_count > 0 {
            lines.push(format!(
                "- {} recent runs failed — consider alternative approaches",
                failed_count
            ));
        }

        if let Some(memory_store) = &self.memory_store {
            match memory_store
                .search_memories(user_id, agent.as_str(), 5)
                .await
            {
                Ok(memories) => {
                    for mem in memories {
                        lines.push(format!("- [{}] {}", mem.category.as_str(), mem.content));
                    }
                }
                Err(e) => log::warn!("learner: memory search failed: {}", e),
            }
        }

        if lines.len() <= 1 {
            return String::new();
        }
        lines.join("\n")
    }

    /// Per-tool success rates from this user's past traces with one agent.
    pub async fn tool_effectiveness(
        &self,
        user_id: i64,
        agent: AgentName,
    ) -> HashMap<String, f64> {
        let traces = match self.trace_store.get_traces(user_id, 20).await {
            Ok(traces) => traces,
            Err(_) => return HashMap::new(),
        };

        let mut counts: HashMap<String, (u32, u32)> = HashMap::new();
        for trace in traces.iter().filter(|t| t.agent_name == agent.as_str()) {
            let steps = match self.trace_store.get_trace_steps(trace.id).await {
                Ok(steps) => steps,
                Err(_) => continue,
            };
            for step in steps {
                let tool = match step.tool_name {
                    Some(tool) if !tool.is_empty() => tool,
                    _ => continue,
                };
                let entry = counts.entry(tool).or_insert((0, 0));
                entry.1 += 1;
                if step.success {
                    entry.0 += 1;
                }
            }
        }

        counts
            .into_iter()
            .filter(|(_, (_, total))| *total > 0)
            .map(|(tool, (ok, total))| (tool, ok as f64 / total as f64))
            .collect()
    }
}
