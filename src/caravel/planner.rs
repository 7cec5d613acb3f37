//! Goal planner: decomposes career goals into agent-executable steps.
//!
//! "Help me land a backend role at Stripe" becomes a handful of concrete
//! steps, each assigned to one agent.  Plans persist through the
//! [`GoalStore`] seam and execute stepwise: each step becomes a
//! single-agent routing decision dispatched through a fresh
//! [`Orchestrator`].  Auto-execution re-evaluates the plan after every
//! completed step; the remaining plan can be continued, pruned, modified,
//! or extended based on what the step actually produced.

use crate::caravel::agent::{AgentName, Toolbox};
use crate::caravel::client_wrapper::{ChatOptions, ClientWrapper, Message, Role, ToolChoice};
use crate::caravel::config::CoreConfig;
use crate::caravel::event::{emit_to, CancelFlag, DispatchEvent, EventSink};
use crate::caravel::orchestrator::{DispatchOptions, Orchestrator, UserProfile};
use crate::caravel::prompts::{PLANNING_PROMPT, REPLAN_PROMPT};
use crate::caravel::router::{ExtractedContext, Intent, RoutingDecision};
use crate::caravel::store::{
    GoalStatus, GoalStepRecord, GoalStore, MemoryStore, NegotiationStore, StepStatus, StoreResult,
    TraceStore,
};
use crate::caravel::util::{strip_code_fences, truncate_chars};
use serde_json::Value;
use std::sync::Arc;

/// One planned step: title, what it does, and the agent that runs it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub title: String,
    pub description: String,
    pub agent_name: AgentName,
}

/// A normalized plan ready to persist.
#[derive(Debug, Clone)]
pub struct PlanDraft {
    pub title: String,
    pub steps: Vec<PlanStep>,
}

/// Mid-plan adjustment decided by the re-evaluation call.
#[derive(Debug, Clone)]
pub struct PlanAdjustment {
    pub action: AdjustAction,
    pub reason: String,
    pub new_title: String,
    pub new_description: String,
    pub agent_name: Option<AgentName>,
}

impl PlanAdjustment {
    fn keep_going(reason: impl Into<String>) -> Self {
        Self {
            action: AdjustAction::Continue,
            reason: reason.into(),
            new_title: String::new(),
            new_description: String::new(),
            agent_name: None,
        }
    }
}

/// Actions the re-planner can take between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustAction {
    Continue,
    SkipNext,
    ModifyStep,
    AddStep,
}

impl AdjustAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustAction::Continue => "continue",
            AdjustAction::SkipNext => "skip_next",
            AdjustAction::ModifyStep => "modify_step",
            AdjustAction::AddStep => "add_step",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "continue" => Some(AdjustAction::Continue),
            "skip_next" => Some(AdjustAction::SkipNext),
            "modify_step" => Some(AdjustAction::ModifyStep),
            "add_step" => Some(AdjustAction::AddStep),
            _ => None,
        }
    }
}

/// Outcome of executing one goal step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step_id: i64,
    pub step_title: String,
    pub agent_name: AgentName,
    pub output: String,
    pub status: StepStatus,
}

/// Final status reported by [`GoalPlanner::auto_execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoExecuteStatus {
    Completed,
    Partial,
    Cancelled,
    NotFound,
}

impl AutoExecuteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoExecuteStatus::Completed => "completed",
            AutoExecuteStatus::Partial => "partial",
            AutoExecuteStatus::Cancelled => "cancelled",
            AutoExecuteStatus::NotFound => "not_found",
        }
    }
}

/// Goal + step progress snapshot.
#[derive(Debug, Clone)]
pub struct PlanStatus {
    pub goal: crate::caravel::store::GoalRecord,
    pub steps: Vec<GoalStepRecord>,
    pub total_steps: usize,
    pub completed_steps: usize,
    /// Completed fraction in `[0, 1]`; zero for empty plans.
    pub progress: f64,
}

/// Safety cap on auto-executed steps, including dynamically added ones.
const MAX_AUTO_STEPS: usize = 10;

/// Decomposes career goals into trackable, multi-step plans and executes
/// them agent by agent.
pub struct GoalPlanner {
    config: CoreConfig,
    client: Arc<dyn ClientWrapper>,
    goal_store: Arc<dyn GoalStore>,
    toolbox: Toolbox,
    trace_store: Option<Arc<dyn TraceStore>>,
    memory_store: Option<Arc<dyn MemoryStore>>,
    negotiation_store: Option<Arc<dyn NegotiationStore>>,
}

impl GoalPlanner {
    pub fn new(
        config: CoreConfig,
        client: Arc<dyn ClientWrapper>,
        goal_store: Arc<dyn GoalStore>,
    ) -> Self {
        Self {
            config,
            client,
            goal_store,
            toolbox: Toolbox::new(),
            trace_store: None,
            memory_store: None,
            negotiation_store: None,
        }
    }

    pub fn with_toolbox(mut self, toolbox: Toolbox) -> Self {
        self.toolbox = toolbox;
        self
    }

    pub fn with_trace_store(mut self, store: Arc<dyn TraceStore>) -> Self {
        self.trace_store = Some(store);
        self
    }

    pub fn with_memory_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.memory_store = Some(store);
        self
    }

    pub fn with_negotiation_store(mut self, store: Arc<dyn NegotiationStore>) -> Self {
        self.negotiation_store = Some(store);
        self
    }

    fn build_orchestrator(&self) -> Orchestrator {
        let mut orchestrator = Orchestrator::new(self.config.clone(), self.client.clone())
            .with_toolbox(self.toolbox.clone());
        if let Some(store) = &self.trace_store {
            orchestrator = orchestrator.with_trace_store(store.clone());
        }
        if let Some(store) = &self.memory_store {
            orchestrator = orchestrator.with_memory_store(store.clone());
        }
        if let Some(store) = &self.negotiation_store {
            orchestrator = orchestrator.with_negotiation_store(store.clone());
        }
        orchestrator
    }

    /// Decompose a goal into 1-6 agent steps.
    ///
    /// Falls back to the deterministic scout → match → forge → coach plan on
    /// any classifier failure.
    pub async fn create_plan(&self, goal_text: &str, user_context: &str) -> PlanDraft {
        let messages = [
            Message::text(Role::System, PLANNING_PROMPT),
            Message::text(Role::User, format!("Goal: {}\n\n{}", goal_text, user_context)),
        ];
        let options = ChatOptions {
            max_tokens: 600,
            temperature: 0.2,
            tool_choice: ToolChoice::None,
        };

        let reply = match self.client.send_message(&messages, None, options).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("planner: planning call failed: {}", e);
                return fallback_plan(goal_text);
            }
        };

        match serde_json::from_str::<Value>(strip_code_fences(&reply.content)) {
            Ok(data) => normalize_plan(&data, goal_text),
            Err(_) => fallback_plan(goal_text),
        }
    }

    /// Persist a plan as a goal with numbered steps, returning the goal id.
    pub async fn save_plan(&self, user_id: i64, plan: &PlanDraft) -> StoreResult<i64> {
        let goal_id = self
            .goal_store
            .create_goal(user_id, &plan.title, "")
            .await?;
        for (i, step) in plan.steps.iter().enumerate() {
            self.goal_store
                .add_goal_step(
                    goal_id,
                    (i + 1) as u32,
                    &step.title,
                    &step.description,
                    step.agent_name,
                )
                .await?;
        }
        Ok(goal_id)
    }

    /// Find and execute the next pending step for a goal.
    ///
    /// Returns `Ok(None)` when the goal has no pending steps (or doesn't
    /// belong to the user).
    pub async fn execute_next_step(
        &self,
        goal_id: i64,
        user_id: i64,
        resume_text: &str,
        profile: Option<&UserProfile>,
    ) -> StoreResult<Option<StepOutcome>> {
        let step = match self.goal_store.get_next_pending_step(goal_id).await? {
            Some(step) => step,
            None => return Ok(None),
        };
        let goal = match self.goal_store.get_goal(goal_id, user_id).await? {
            Some(goal) => goal,
            None => return Ok(None),
        };

        let outcome = self
            .run_step(&goal.title, &step, user_id, resume_text, profile, None, None)
            .await?;

        self.finish_goal_if_done(goal_id).await?;
        Ok(Some(outcome))
    }

    /// Return goal + all steps with progress, or `None` for unknown goals.
    pub async fn plan_status(&self, goal_id: i64, user_id: i64) -> StoreResult<Option<PlanStatus>> {
        let goal = match self.goal_store.get_goal(goal_id, user_id).await? {
            Some(goal) => goal,
            None => return Ok(None),
        };
        let steps = self.goal_store.get_goal_steps(goal_id).await?;
        let completed = steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        let progress = if steps.is_empty() {
            0.0
        } else {
            completed as f64 / steps.len() as f64
        };
        Ok(Some(PlanStatus {
            goal,
            total_steps: steps.len(),
            completed_steps: completed,
            progress,
            steps,
        }))
    }

    /// Auto-execute all remaining steps with mid-plan re-evaluation.
    ///
    /// Emits goal events to the sink as it goes and stops between steps when
    /// the cancel flag is set.
    pub async fn auto_execute(
        &self,
        goal_id: i64,
        user_id: i64,
        resume_text: &str,
        profile: Option<&UserProfile>,
        cancel: CancelFlag,
        sink: Option<Arc<dyn EventSink>>,
    ) -> AutoExecuteStatus {
        let goal = match self.goal_store.get_goal(goal_id, user_id).await {
            Ok(Some(goal)) => goal,
            Ok(None) => {
                emit_to(
                    sink.as_ref(),
                    DispatchEvent::GoalCompleted {
                        status: AutoExecuteStatus::NotFound.as_str().to_string(),
                    },
                )
                .await;
                return AutoExecuteStatus::NotFound;
            }
            Err(e) => {
                log::warn!("planner: goal read failed: {}", e);
                return AutoExecuteStatus::NotFound;
            }
        };

        for _ in 0..MAX_AUTO_STEPS {
            if cancel.is_cancelled() {
                emit_to(
                    sink.as_ref(),
                    DispatchEvent::GoalCompleted {
                        status: AutoExecuteStatus::Cancelled.as_str().to_string(),
                    },
                )
                .await;
                return AutoExecuteStatus::Cancelled;
            }

            let step = match self.goal_store.get_next_pending_step(goal_id).await {
                Ok(Some(step)) => step,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("planner: pending step read failed: {}", e);
                    break;
                }
            };

            emit_to(
                sink.as_ref(),
                DispatchEvent::GoalStepStarted {
                    step_number: step.step_number,
                    title: step.title.clone(),
                    agent: step.agent_name,
                },
            )
            .await;

            let outcome = match self
                .run_step(
                    &goal.title,
                    &step,
                    user_id,
                    resume_text,
                    profile,
                    Some(cancel.clone()),
                    sink.clone(),
                )
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::warn!("planner: step execution failed: {}", e);
                    break;
                }
            };

            emit_to(
                sink.as_ref(),
                DispatchEvent::GoalStepCompleted {
                    step_number: step.step_number,
                    status: outcome.status.as_str().to_string(),
                    output_preview: truncate_chars(&outcome.output, 500).to_string(),
                },
            )
            .await;

            // Re-evaluate the remaining plan after a successful step.
            if outcome.status == StepStatus::Completed {
                let pending: Vec<GoalStepRecord> = match self.goal_store.get_goal_steps(goal_id).await
                {
                    Ok(steps) => steps
                        .into_iter()
                        .filter(|s| s.status == StepStatus::Pending)
                        .collect(),
                    Err(_) => Vec::new(),
                };
                if !pending.is_empty() {
                    let adjustment = self.re_evaluate(&step, &outcome.output, &pending).await;
                    if adjustment.action != AdjustAction::Continue {
                        emit_to(
                            sink.as_ref(),
                            DispatchEvent::GoalReplan {
                                adjustment: adjustment.action.as_str().to_string(),
                                reason: adjustment.reason.clone(),
                            },
                        )
                        .await;
                        self.apply_adjustment(goal_id, &adjustment, &pending[0]).await;
                    }
                }
            }
        }

        let status = match self.finish_goal_if_done(goal_id).await {
            Ok(true) => AutoExecuteStatus::Completed,
            _ => AutoExecuteStatus::Partial,
        };
        emit_to(
            sink.as_ref(),
            DispatchEvent::GoalCompleted {
                status: status.as_str().to_string(),
            },
        )
        .await;
        status
    }

    /// Execute one step through a single-agent dispatch and write back its
    /// terminal status and output.
    #[allow(clippy::too_many_arguments)]
    async fn run_step(
        &self,
        goal_title: &str,
        step: &GoalStepRecord,
        user_id: i64,
        resume_text: &str,
        profile: Option<&UserProfile>,
        cancel: Option<CancelFlag>,
        sink: Option<Arc<dyn EventSink>>,
    ) -> StoreResult<StepOutcome> {
        self.goal_store
            .update_goal_step(step.id, StepStatus::InProgress, None)
            .await?;

        let routing = RoutingDecision::single_agent(
            intent_for(step.agent_name),
            step.agent_name,
            ExtractedContext {
                role: Some(goal_title.to_string()),
                ..ExtractedContext::default()
            },
            format!("Executing goal step: {}", step.title),
        );

        let mut orchestrator = self.build_orchestrator();
        let opts = DispatchOptions {
            user_id: Some(user_id),
            conversation_id: None,
            resume_text: resume_text.to_string(),
            profile: profile.cloned(),
            cancel: cancel.unwrap_or_default(),
            sink,
            hints: None,
        };
        let (results, _bus) = orchestrator
            .dispatch(
                &routing,
                &format!("{}: {}", goal_title, step.description),
                &opts,
            )
            .await;

        let (status, output) = match results.first() {
            Some(result) if result.success => (StepStatus::Completed, result.output.clone()),
            Some(result) => (StepStatus::Failed, result.output.clone()),
            None => (
                StepStatus::Failed,
                "Agent did not produce output".to_string(),
            ),
        };

        self.goal_store
            .update_goal_step(step.id, status, Some(&output))
            .await?;

        Ok(StepOutcome {
            step_id: step.id,
            step_title: step.title.clone(),
            agent_name: step.agent_name,
            output,
            status,
        })
    }

    /// Cheap LLM call deciding whether the plan should be adjusted after a
    /// completed step.  Falls back to `continue` on any failure.
    async fn re_evaluate(
        &self,
        completed_step: &GoalStepRecord,
        step_output: &str,
        remaining: &[GoalStepRecord],
    ) -> PlanAdjustment {
        let remaining_summary = remaining
            .iter()
            .map(|s| format!("- Step {}: {} ({})", s.step_number, s.title, s.agent_name))
            .collect::<Vec<_>>()
            .join("\n");
        let user_msg = format!(
            "Completed step: {} ({})\nOutput preview: {}\n\nRemaining steps:\n{}",
            completed_step.title,
            completed_step.agent_name,
            truncate_chars(step_output, 800),
            remaining_summary
        );

        let messages = [
            Message::text(Role::System, REPLAN_PROMPT),
            Message::text(Role::User, user_msg),
        ];

        let reply = match self
            .client
            .send_message(&messages, None, ChatOptions::classification(200))
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("planner: re-plan call failed: {}", e);
                return PlanAdjustment::keep_going("Re-plan fallback");
            }
        };

        match serde_json::from_str::<Value>(strip_code_fences(&reply.content)) {
            Ok(data) => parse_adjustment(&data),
            Err(_) => PlanAdjustment::keep_going("Re-plan fallback"),
        }
    }

    /// Apply a non-continue adjustment to the next pending step.
    async fn apply_adjustment(
        &self,
        goal_id: i64,
        adjustment: &PlanAdjustment,
        next_pending: &GoalStepRecord,
    ) {
        let result = match adjustment.action {
            AdjustAction::SkipNext => {
                self.goal_store
                    .update_goal_step(
                        next_pending.id,
                        StepStatus::Skipped,
                        Some(&format!("Skipped: {}", adjustment.reason)),
                    )
                    .await
            }
            AdjustAction::ModifyStep => {
                if adjustment.new_description.is_empty() {
                    return;
                }
                self.goal_store
                    .update_step_description(next_pending.id, &adjustment.new_description)
                    .await
            }
            AdjustAction::AddStep => {
                let agent = match adjustment.agent_name {
                    Some(agent) if !adjustment.new_title.is_empty() => agent,
                    _ => return,
                };
                let insert_at = next_pending.step_number;
                match self
                    .goal_store
                    .renumber_pending_from(goal_id, insert_at)
                    .await
                {
                    Ok(()) => {
                        self.goal_store
                            .add_goal_step(
                                goal_id,
                                insert_at,
                                &adjustment.new_title,
                                &adjustment.new_description,
                                agent,
                            )
                            .await
                            .map(|_| ())
                    }
                    Err(e) => Err(e),
                }
            }
            AdjustAction::Continue => return,
        };

        if let Err(e) = result {
            log::warn!("planner: adjustment write failed: {}", e);
        }
    }

    /// Flip the goal to completed once every step is terminal.  Returns
    /// whether the goal is now complete.
    async fn finish_goal_if_done(&self, goal_id: i64) -> StoreResult<bool> {
        if self
            .goal_store
            .get_next_pending_step(goal_id)
            .await?
            .is_some()
        {
            return Ok(false);
        }
        let steps = self.goal_store.get_goal_steps(goal_id).await?;
        if steps.iter().all(|s| s.status.is_terminal()) {
            self.goal_store
                .update_goal_status(goal_id, GoalStatus::Completed)
                .await?;
            return Ok(true);
        }
        Ok(false)
    }
}

/// The natural routing intent for a single-agent goal step.
pub(crate) fn intent_for(agent: AgentName) -> Intent {
    match agent {
        AgentName::Scout => Intent::JobSearch,
        AgentName::Match => Intent::AnalyzeMatch,
        AgentName::Forge => Intent::WriteMaterials,
        AgentName::Coach => Intent::InterviewPrep,
    }
}

/// Validate and normalize plan JSON.
pub(crate) fn normalize_plan(data: &Value, goal_text: &str) -> PlanDraft {
    let title = data
        .get("title")
        .and_then(Value::as_str)
        .map(|t| truncate_chars(t, 60).to_string())
        .unwrap_or_else(|| truncate_chars(goal_text, 60).to_string());

    let mut steps = Vec::new();
    if let Some(raw_steps) = data.get("steps").and_then(Value::as_array) {
        for step in raw_steps.iter().take(6) {
            let step_title = match step.get("title").and_then(Value::as_str) {
                Some(title) if !title.is_empty() => truncate_chars(title, 60).to_string(),
                _ => continue,
            };
            let agent = step
                .get("agent_name")
                .and_then(Value::as_str)
                .and_then(AgentName::parse)
                .unwrap_or(AgentName::Scout);
            steps.push(PlanStep {
                title: step_title,
                description: step
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                agent_name: agent,
            });
        }
    }

    if steps.is_empty() {
        steps.push(PlanStep {
            title: "Research opportunities".to_string(),
            description: goal_text.to_string(),
            agent_name: AgentName::Scout,
        });
    }

    PlanDraft { title, steps }
}

/// The deterministic plan used when the planner LLM is unavailable.
pub(crate) fn fallback_plan(goal_text: &str) -> PlanDraft {
    PlanDraft {
        title: truncate_chars(goal_text, 60).to_string(),
        steps: vec![
            PlanStep {
                title: "Research opportunities".to_string(),
                description: format!("Search for relevant positions: {}", goal_text),
                agent_name: AgentName::Scout,
            },
            PlanStep {
                title: "Analyze fit".to_string(),
                description: "Compare your background against requirements".to_string(),
                agent_name: AgentName::Match,
            },
            PlanStep {
                title: "Prepare materials".to_string(),
                description: "Write tailored cover letter and resume".to_string(),
                agent_name: AgentName::Forge,
            },
            PlanStep {
                title: "Prep for interviews".to_string(),
                description: "Practice likely interview questions".to_string(),
                agent_name: AgentName::Coach,
            },
        ],
    }
}

fn parse_adjustment(data: &Value) -> PlanAdjustment {
    let action = data
        .get("action")
        .and_then(Value::as_str)
        .and_then(AdjustAction::parse)
        .unwrap_or(AdjustAction::Continue);

    let mut reason = data
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    reason.truncate(
        reason
            .char_indices()
            .nth(200)
            .map(|(i, _)| i)
            .unwrap_or(reason.len()),
    );

    // Invalid agent names reduce to no agent, which downgrades add_step to a
    // no-op at application time.
    let agent_name = data
        .get("agent_name")
        .and_then(Value::as_str)
        .and_then(AgentName::parse);

    PlanAdjustment {
        action,
        reason,
        new_title: data
            .get("new_title")
            .and_then(Value::as_str)
            .map(|t| truncate_chars(t, 60).to_string())
            .unwrap_or_default(),
        new_description: data
            .get("new_description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        agent_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_oversized_plans() {
        let steps: Vec<Value> = (0..9)
            .map(|i| json!({"title": format!("Step {}", i), "agent_name": "scout"}))
            .collect();
        let plan = normalize_plan(&json!({"title": "Big plan", "steps": steps}), "goal");
        assert_eq!(plan.steps.len(), 6);
    }

    #[test]
    fn invalid_agent_defaults_to_scout() {
        let plan = normalize_plan(
            &json!({"steps": [{"title": "Do it", "agent_name": "wizard"}]}),
            "goal",
        );
        assert_eq!(plan.steps[0].agent_name, AgentName::Scout);
    }

    #[test]
    fn empty_plan_gets_a_scout_step() {
        let plan = normalize_plan(&json!({"steps": []}), "land a rust job");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].agent_name, AgentName::Scout);
        assert_eq!(plan.steps[0].description, "land a rust job");
    }

    #[test]
    fn fallback_plan_covers_all_agents() {
        let plan = fallback_plan("become a staff engineer");
        let agents: Vec<AgentName> = plan.steps.iter().map(|s| s.agent_name).collect();
        assert_eq!(
            agents,
            vec![
                AgentName::Scout,
                AgentName::Match,
                AgentName::Forge,
                AgentName::Coach
            ]
        );
    }

    #[test]
    fn unknown_adjustment_reduces_to_continue() {
        let adjustment = parse_adjustment(&json!({"action": "abort", "reason": "?"}));
        assert_eq!(adjustment.action, AdjustAction::Continue);
    }

    #[test]
    fn adjustment_with_invalid_agent_is_kept_but_unusable() {
        let adjustment = parse_adjustment(&json!({
            "action": "add_step",
            "reason": "need research",
            "new_title": "Research salaries",
            "agent_name": "wizard",
        }));
        assert_eq!(adjustment.action, AdjustAction::AddStep);
        assert_eq!(adjustment.agent_name, None);
    }

    #[test]
    fn plan_titles_are_clamped() {
        let long_title = "t".repeat(100);
        let plan = normalize_plan(&json!({"title": long_title, "steps": []}), "goal");
        assert_eq!(plan.title.chars().count(), 60);
    }
}
