//! Persistence seams for traces, goals, negotiations, and user memories.
//!
//! The core never talks to a database directly: it calls these async traits
//! and the embedding application supplies the backend.  Every write issued by
//! the pipeline is best-effort: failures are logged and swallowed at the
//! call site so persistence can never change pipeline semantics.
//!
//! In-memory implementations suitable for tests and development live in
//! [`memstore`](crate::caravel::memstore).

use crate::caravel::agent::AgentName;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// Result alias used across the store traits.
pub type StoreResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Lifecycle status of a persisted agent trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    MaxSteps,
}

impl TraceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceStatus::Running => "running",
            TraceStatus::Completed => "completed",
            TraceStatus::Failed => "failed",
            TraceStatus::Cancelled => "cancelled",
            TraceStatus::MaxSteps => "max_steps",
        }
    }
}

impl fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User feedback attached to a completed trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Positive,
    Negative,
}

/// Status of a career goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Active,
    Suggested,
    Completed,
    Dismissed,
}

/// Where a goal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalOrigin {
    User,
    AgentSuggested,
}

/// Status of a single goal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    /// Whether the step can no longer execute.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

/// Category of an episodic memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Fact,
    Preference,
    Goal,
    Outcome,
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Fact => "fact",
            MemoryCategory::Preference => "preference",
            MemoryCategory::Goal => "goal",
            MemoryCategory::Outcome => "outcome",
        }
    }

    /// Parse a category tag, falling back to `Fact` for anything unknown.
    pub fn parse_or_fact(tag: &str) -> Self {
        match tag {
            "preference" => MemoryCategory::Preference,
            "goal" => MemoryCategory::Goal,
            "outcome" => MemoryCategory::Outcome,
            _ => MemoryCategory::Fact,
        }
    }
}

/// Persisted record of one agent execution.
#[derive(Debug, Clone)]
pub struct TraceRecord {
    pub id: i64,
    pub user_id: i64,
    pub conversation_id: Option<i64>,
    pub agent_name: String,
    /// Intent label for the run; the routed intent tag, or `"delegation"`
    /// for sub-agent runs spawned through the delegate tool.
    pub intent: String,
    pub task: String,
    pub status: TraceStatus,
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_steps: u32,
    pub total_tool_calls: u32,
    pub feedback: Option<Feedback>,
}

/// One persisted ReAct step belonging to a trace.
#[derive(Debug, Clone)]
pub struct TraceStepRecord {
    pub trace_id: i64,
    pub step_number: u32,
    pub thought: String,
    pub tool_name: Option<String>,
    pub tool_args: Option<String>,
    pub tool_result: Option<String>,
    pub observation: String,
    pub success: bool,
}

/// Persisted audit log of agent executions.
#[async_trait]
pub trait TraceStore: Send + Sync {
    /// Open a trace in `running` state and return its id.
    async fn create_trace(
        &self,
        user_id: i64,
        conversation_id: Option<i64>,
        agent_name: &str,
        intent: &str,
        task: &str,
    ) -> StoreResult<i64>;

    /// Append one step to a running trace.
    async fn add_trace_step(&self, step: TraceStepRecord) -> StoreResult<()>;

    /// Finalize a trace.  No further steps are added afterwards.
    async fn complete_trace(
        &self,
        trace_id: i64,
        status: TraceStatus,
        output: &str,
        total_steps: u32,
        total_tool_calls: u32,
    ) -> StoreResult<()>;

    /// Most recent traces for a user, newest first.
    async fn get_traces(&self, user_id: i64, limit: usize) -> StoreResult<Vec<TraceRecord>>;

    /// All steps of one trace in execution order.
    async fn get_trace_steps(&self, trace_id: i64) -> StoreResult<Vec<TraceStepRecord>>;

    /// Attach user feedback to a trace owned by `user_id`.
    async fn set_trace_feedback(
        &self,
        trace_id: i64,
        user_id: i64,
        feedback: Feedback,
    ) -> StoreResult<()>;
}

/// A persisted career goal.
#[derive(Debug, Clone)]
pub struct GoalRecord {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub status: GoalStatus,
    pub origin: GoalOrigin,
    pub trigger_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A single step of a goal plan.
#[derive(Debug, Clone)]
pub struct GoalStepRecord {
    pub id: i64,
    pub goal_id: i64,
    pub step_number: u32,
    pub title: String,
    pub description: String,
    pub agent_name: AgentName,
    pub status: StepStatus,
    pub output: String,
    pub trace_id: Option<i64>,
}

/// Persisted goals with ordered steps.
///
/// Invariant maintained by implementations: the "next pending step" is always
/// the lowest `step_number` whose status is `pending`.
#[async_trait]
pub trait GoalStore: Send + Sync {
    async fn create_goal(&self, user_id: i64, title: &str, description: &str) -> StoreResult<i64>;

    async fn add_goal_step(
        &self,
        goal_id: i64,
        step_number: u32,
        title: &str,
        description: &str,
        agent_name: AgentName,
    ) -> StoreResult<i64>;

    async fn get_goal(&self, goal_id: i64, user_id: i64) -> StoreResult<Option<GoalRecord>>;

    async fn get_goal_steps(&self, goal_id: i64) -> StoreResult<Vec<GoalStepRecord>>;

    async fn get_next_pending_step(&self, goal_id: i64) -> StoreResult<Option<GoalStepRecord>>;

    /// Update a step's status and, when provided, its output text.
    async fn update_goal_step(
        &self,
        step_id: i64,
        status: StepStatus,
        output: Option<&str>,
    ) -> StoreResult<()>;

    /// Overwrite a step's description (mid-plan `modify_step`).
    async fn update_step_description(&self, step_id: i64, description: &str) -> StoreResult<()>;

    /// Shift every pending step with `step_number >= from` up by one, making
    /// room for an inserted step (mid-plan `add_step`).
    async fn renumber_pending_from(&self, goal_id: i64, from: u32) -> StoreResult<()>;

    async fn update_goal_status(&self, goal_id: i64, status: GoalStatus) -> StoreResult<()>;
}

/// Persisted negotiation sessions and their debate rounds.
#[async_trait]
pub trait NegotiationStore: Send + Sync {
    async fn create_session(
        &self,
        conversation_id: Option<i64>,
        topic: &str,
        agents: &[String],
    ) -> StoreResult<i64>;

    #[allow(clippy::too_many_arguments)]
    async fn add_round(
        &self,
        session_id: i64,
        round_number: u32,
        agent_name: &str,
        response_type: &str,
        position: &str,
        evidence: &str,
        confidence: f64,
    ) -> StoreResult<()>;

    async fn complete_session(
        &self,
        session_id: i64,
        consensus_reached: bool,
        final_position: &str,
    ) -> StoreResult<()>;
}

/// One episodic memory entry about a user.
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub category: MemoryCategory,
    pub created_at: DateTime<Utc>,
}

/// Persisted cross-session knowledge about users.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn save_memory(
        &self,
        user_id: i64,
        content: &str,
        category: MemoryCategory,
        source_conversation_id: Option<i64>,
    ) -> StoreResult<i64>;

    async fn get_memories(
        &self,
        user_id: i64,
        category: Option<MemoryCategory>,
        limit: usize,
    ) -> StoreResult<Vec<MemoryRecord>>;

    /// Keyword search over memory contents, newest first.
    async fn search_memories(
        &self,
        user_id: i64,
        query: &str,
        limit: usize,
    ) -> StoreResult<Vec<MemoryRecord>>;
}
