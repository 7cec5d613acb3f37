//! In-memory store backends.
//!
//! [`InMemoryStore`] implements every persistence seam over plain mutex'd
//! vectors with auto-increment ids.  It backs the test suite and is handy
//! for development embeddings that don't care about durability; production
//! deployments implement the traits over a real database.

use crate::caravel::agent::AgentName;
use crate::caravel::store::{
    Feedback, GoalOrigin, GoalRecord, GoalStatus, GoalStepRecord, GoalStore, MemoryCategory,
    MemoryRecord, MemoryStore, NegotiationStore, StepStatus, StoreResult, TraceRecord, TraceStatus,
    TraceStepRecord, TraceStore,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// A persisted negotiation session (for inspection in tests/dev tools).
#[derive(Debug, Clone)]
pub struct NegotiationSessionRecord {
    pub id: i64,
    pub conversation_id: Option<i64>,
    pub topic: String,
    pub agents: Vec<String>,
    pub consensus_reached: Option<bool>,
    pub final_position: Option<String>,
}

/// A persisted negotiation round (for inspection in tests/dev tools).
#[derive(Debug, Clone)]
pub struct NegotiationRoundRecord {
    pub session_id: i64,
    pub round_number: u32,
    pub agent_name: String,
    pub response_type: String,
    pub position: String,
    pub evidence: String,
    pub confidence: f64,
}

/// All four store seams, in memory.
#[derive(Default)]
pub struct InMemoryStore {
    next_id: AtomicI64,
    traces: Mutex<Vec<TraceRecord>>,
    trace_steps: Mutex<Vec<TraceStepRecord>>,
    goals: Mutex<Vec<GoalRecord>>,
    goal_steps: Mutex<Vec<GoalStepRecord>>,
    sessions: Mutex<Vec<NegotiationSessionRecord>>,
    rounds: Mutex<Vec<NegotiationRoundRecord>>,
    memories: Mutex<Vec<MemoryRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Snapshot of persisted negotiation sessions.
    pub fn negotiation_sessions(&self) -> Vec<NegotiationSessionRecord> {
        self.sessions.lock().unwrap().clone()
    }

    /// Snapshot of persisted negotiation rounds.
    pub fn negotiation_rounds(&self) -> Vec<NegotiationRoundRecord> {
        self.rounds.lock().unwrap().clone()
    }
}

#[async_trait]
impl TraceStore for InMemoryStore {
    async fn create_trace(
        &self,
        user_id: i64,
        conversation_id: Option<i64>,
        agent_name: &str,
        intent: &str,
        task: &str,
    ) -> StoreResult<i64> {
        let id = self.fresh_id();
        self.traces.lock().unwrap().push(TraceRecord {
            id,
            user_id,
            conversation_id,
            agent_name: agent_name.to_string(),
            intent: intent.to_string(),
            task: task.to_string(),
            status: TraceStatus::Running,
            output: String::new(),
            started_at: Utc::now(),
            completed_at: None,
            total_steps: 0,
            total_tool_calls: 0,
            feedback: None,
        });
        Ok(id)
    }

    async fn add_trace_step(&self, step: TraceStepRecord) -> StoreResult<()> {
        self.trace_steps.lock().unwrap().push(step);
        Ok(())
    }

    async fn complete_trace(
        &self,
        trace_id: i64,
        status: TraceStatus,
        output: &str,
        total_steps: u32,
        total_tool_calls: u32,
    ) -> StoreResult<()> {
        let mut traces = self.traces.lock().unwrap();
        let trace = traces
            .iter_mut()
            .find(|t| t.id == trace_id)
            .ok_or_else(|| format!("no trace {}", trace_id))?;
        trace.status = status;
        trace.output = output.to_string();
        trace.completed_at = Some(Utc::now());
        trace.total_steps = total_steps;
        trace.total_tool_calls = total_tool_calls;
        Ok(())
    }

    async fn get_traces(&self, user_id: i64, limit: usize) -> StoreResult<Vec<TraceRecord>> {
        let traces = self.traces.lock().unwrap();
        Ok(traces
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_trace_steps(&self, trace_id: i64) -> StoreResult<Vec<TraceStepRecord>> {
        let steps = self.trace_steps.lock().unwrap();
        Ok(steps
            .iter()
            .filter(|s| s.trace_id == trace_id)
            .cloned()
            .collect())
    }

    async fn set_trace_feedback(
        &self,
        trace_id: i64,
        user_id: i64,
        feedback: Feedback,
    ) -> StoreResult<()> {
        let mut traces = self.traces.lock().unwrap();
        let trace = traces
            .iter_mut()
            .find(|t| t.id == trace_id && t.user_id == user_id)
            .ok_or_else(|| format!("no trace {} for user {}", trace_id, user_id))?;
        trace.feedback = Some(feedback);
        Ok(())
    }
}

#[async_trait]
impl GoalStore for InMemoryStore {
    async fn create_goal(&self, user_id: i64, title: &str, description: &str) -> StoreResult<i64> {
        let id = self.fresh_id();
        self.goals.lock().unwrap().push(GoalRecord {
            id,
            user_id,
            title: title.to_string(),
            description: description.to_string(),
            status: GoalStatus::Active,
            origin: GoalOrigin::User,
            trigger_type: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn add_goal_step(
        &self,
        goal_id: i64,
        step_number: u32,
        title: &str,
        description: &str,
        agent_name: AgentName,
    ) -> StoreResult<i64> {
        let id = self.fresh_id();
        self.goal_steps.lock().unwrap().push(GoalStepRecord {
            id,
            goal_id,
            step_number,
            title: title.to_string(),
            description: description.to_string(),
            agent_name,
            status: StepStatus::Pending,
            output: String::new(),
            trace_id: None,
        });
        Ok(id)
    }

    async fn get_goal(&self, goal_id: i64, user_id: i64) -> StoreResult<Option<GoalRecord>> {
        Ok(self
            .goals
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.id == goal_id && g.user_id == user_id)
            .cloned())
    }

    async fn get_goal_steps(&self, goal_id: i64) -> StoreResult<Vec<GoalStepRecord>> {
        let mut steps: Vec<GoalStepRecord> = self
            .goal_steps
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.goal_id == goal_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_number);
        Ok(steps)
    }

    async fn get_next_pending_step(&self, goal_id: i64) -> StoreResult<Option<GoalStepRecord>> {
        Ok(self
            .get_goal_steps(goal_id)
            .await?
            .into_iter()
            .find(|s| s.status == StepStatus::Pending))
    }

    async fn update_goal_step(
        &self,
        step_id: i64,
        status: StepStatus,
        output: Option<&str>,
    ) -> StoreResult<()> {
        let mut steps = self.goal_steps.lock().unwrap();
        let step = steps
            .iter_mut()
            .find(|s| s.id == step_id)
            .ok_or_else(|| format!("no goal step {}", step_id))?;
        step.status = status;
        if let Some(output) = output {
            step.output = output.to_string();
        }
        Ok(())
    }

    async fn update_step_description(&self, step_id: i64, description: &str) -> StoreResult<()> {
        let mut steps = self.goal_steps.lock().unwrap();
        let step = steps
            .iter_mut()
            .find(|s| s.id == step_id)
            .ok_or_else(|| format!("no goal step {}", step_id))?;
        step.description = description.to_string();
        Ok(())
    }

    async fn renumber_pending_from(&self, goal_id: i64, from: u32) -> StoreResult<()> {
        let mut steps = self.goal_steps.lock().unwrap();
        for step in steps.iter_mut() {
            if step.goal_id == goal_id
                && step.status == StepStatus::Pending
                && step.step_number >= from
            {
                step.step_number += 1;
            }
        }
        Ok(())
    }

    async fn update_goal_status(&self, goal_id: i64, status: GoalStatus) -> StoreResult<()> {
        let mut goals = self.goals.lock().unwrap();
        let goal = goals
            .iter_mut()
            .find(|g| g.id == goal_id)
            .ok_or_else(|| format!("no goal {}", goal_id))?;
        goal.status = status;
        Ok(())
    }
}

#[async_trait]
impl NegotiationStore for InMemoryStore {
    async fn create_session(
        &self,
        conversation_id: Option<i64>,
        topic: &str,
        agents: &[String],
    ) -> StoreResult<i64> {
        let id = self.fresh_id();
        self.sessions.lock().unwrap().push(NegotiationSessionRecord {
            id,
            conversation_id,
            topic: topic.to_string(),
            agents: agents.to_vec(),
            consensus_reached: None,
            final_position: None,
        });
        Ok(id)
    }

    async fn add_round(
        &self,
        session_id: i64,
        round_number: u32,
        agent_name: &str,
        response_type: &str,
        position: &str,
        evidence: &str,
        confidence: f64,
    ) -> StoreResult<()> {
        self.rounds.lock().unwrap().push(NegotiationRoundRecord {
            session_id,
            round_number,
            agent_name: agent_name.to_string(),
            response_type: response_type.to_string(),
            position: position.to_string(),
            evidence: evidence.to_string(),
            confidence,
        });
        Ok(())
    }

    async fn complete_session(
        &self,
        session_id: i64,
        consensus_reached: bool,
        final_position: &str,
    ) -> StoreResult<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| format!("no negotiation session {}", session_id))?;
        session.consensus_reached = Some(consensus_reached);
        session.final_position = Some(final_position.to_string());
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn save_memory(
        &self,
        user_id: i64,
        content: &str,
        category: MemoryCategory,
        _source_conversation_id: Option<i64>,
    ) -> StoreResult<i64> {
        let id = self.fresh_id();
        self.memories.lock().unwrap().push(MemoryRecord {
            id,
            user_id,
            content: content.to_string(),
            category,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn get_memories(
        &self,
        user_id: i64,
        category: Option<MemoryCategory>,
        limit: usize,
    ) -> StoreResult<Vec<MemoryRecord>> {
        Ok(self
            .memories
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|m| m.user_id == user_id)
            .filter(|m| category.map(|c| m.category == c).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn search_memories(
        &self,
        user_id: i64,
        query: &str,
        limit: usize,
    ) -> StoreResult<Vec<MemoryRecord>> {
        let query = query.to_lowercase();
        Ok(self
            .memories
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|m| m.user_id == user_id && m.content.to_lowercase().contains(&query))
            .take(limit)
            .cloned()
            .collect())
    }
}
