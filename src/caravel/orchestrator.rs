//! Orchestrator: executes a routing decision to completion.
//!
//! The orchestrator is the brain of the multi-agent pipeline.  It seeds a
//! FIFO of agents from the routing decision, runs them one at a time with
//! structured context flowing through a dispatch-scoped [`MessageBus`], and
//! lets the [`PipelineEvaluator`] steer the queue after every agent:
//! continue, loop back, skip, stop, or add an agent.  After the pipeline
//! drains it scans the bus for conflicting outputs and resolves at most one
//! conflict through a [`NegotiationSession`].
//!
//! A dispatch is logically sequential (each agent reads the bus state left
//! by the previous one) while different dispatches run concurrently on
//! their own orchestrator instances.  The delegation counter lives on the
//! dispatch; the bus is never shared across dispatches.

use crate::caravel::agent::{build_agent, AgentName, RunOptions, Toolbox};
use crate::caravel::client_wrapper::ClientWrapper;
use crate::caravel::config::CoreConfig;
use crate::caravel::episodic::{extract_facts, EpisodicMemory};
use crate::caravel::evaluator::{EvalAction, PipelineEvaluator};
use crate::caravel::event::{emit_to, CancelFlag, DispatchEvent, EventSink};
use crate::caravel::learner::AgentLearner;
use crate::caravel::negotiation::{ConflictDetector, NegotiationSession};
use crate::caravel::protocol::{AgentMessage, MessageBus, Payload};
use crate::caravel::router::RoutingDecision;
use crate::caravel::store::{MemoryStore, NegotiationStore, TraceStatus, TraceStore};
use crate::caravel::tools::delegate::{DelegateContext, DelegateToAgentTool};
use crate::caravel::tools::memory_tools::{RecallMemoryTool, RecallPastWorkTool, StoreMemoryTool};
use crate::caravel::util::truncate_chars;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

/// Confidence attached to agent responses that don't supply their own.
/// Load-bearing for conflict detection.
pub const DEFAULT_RESPONSE_CONFIDENCE: f64 = 0.8;

/// Result from a single agent's execution.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub agent_name: AgentName,
    pub output: String,
    pub success: bool,
    pub trace_id: Option<i64>,
}

/// Compact user profile injected into agent tasks.
#[derive(Debug, Clone, Default)]
pub struct UserProfile {
    pub target_role: Option<String>,
    pub experience_level: Option<String>,
    pub skills: Vec<String>,
    pub location: Option<String>,
}

impl UserProfile {
    /// Render the profile as prompt lines, or `None` when empty.
    pub fn summary(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(role) = &self.target_role {
            parts.push(format!("Target role: {}", role));
        }
        if let Some(level) = &self.experience_level {
            parts.push(format!("Experience: {}", level));
        }
        if !self.skills.is_empty() {
            let skills: Vec<&str> = self.skills.iter().take(15).map(String::as_str).collect();
            parts.push(format!("Skills: {}", skills.join(", ")));
        }
        if let Some(location) = &self.location {
            parts.push(format!("Location: {}", location));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

/// Seam for learned tool-preference hints (the online learner itself lives
/// outside the core; the hint feed is injected here).
#[async_trait]
pub trait HintSource: Send + Sync {
    async fn tool_hints(
        &self,
        _user_id: i64,
        _query: &str,
        _agent: AgentName,
        _profile: Option<&UserProfile>,
    ) -> String {
        String::new()
    }
}

/// Caller-supplied context and collaborators for one dispatch.
#[derive(Default)]
pub struct DispatchOptions {
    pub user_id: Option<i64>,
    pub conversation_id: Option<i64>,
    pub resume_text: String,
    pub profile: Option<UserProfile>,
    pub cancel: CancelFlag,
    pub sink: Option<Arc<dyn EventSink>>,
    pub hints: Option<Arc<dyn HintSource>>,
}

/// Coordinates specialized agents to handle one request.
///
/// Pipeline: Scout finds jobs and researches companies, Match analyzes JD vs
/// resume compatibility, Forge writes application materials, Coach prepares
/// interview strategy.
pub struct Orchestrator {
    config: CoreConfig,
    client: Arc<dyn ClientWrapper>,
    toolbox: Toolbox,
    trace_store: Option<Arc<dyn TraceStore>>,
    memory_store: Option<Arc<dyn MemoryStore>>,
    negotiation_store: Option<Arc<dyn NegotiationStore>>,
    results: Vec<AgentResult>,
}

impl Orchestrator {
    pub fn new(config: CoreConfig, client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            config,
            client,
            toolbox: Toolbox::new(),
            trace_store: None,
            memory_store: None,
            negotiation_store: None,
            results: Vec::new(),
        }
    }

    /// Bind the domain tools agents will run with (builder pattern).
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

    /// Results accumulated by the most recent dispatch.
    pub fn results(&self) -> &[AgentResult] {
        &self.results
    }

    /// Dispatch agents based on a routing decision.
    ///
    /// Runs the evaluator-driven loop with structured communication via the
    /// message bus, then conflict detection and at most one negotiation.
    /// Returns the results of all dispatched agents together with the bus so
    /// callers can inspect observations and consensus messages.
    pub async fn dispatch(
        &mut self,
        routing: &RoutingDecision,
        user_message: &str,
        opts: &DispatchOptions,
    ) -> (Vec<AgentResult>, Arc<MessageBus>) {
        self.results.clear();
        let bus = Arc::new(MessageBus::new());

        bus.send(AgentMessage::new(
            "user",
            "orchestrator",
            Payload::Request {
                message: user_message.to_string(),
                intent: routing.intent,
            },
        ));

        let evaluator = PipelineEvaluator::new(self.client.clone(), &self.config);
        let learner = self
            .trace_store
            .as_ref()
            .map(|store| AgentLearner::new(store.clone(), self.memory_store.clone()));
        let delegation_counter = Arc::new(AtomicUsize::new(0));

        let mut remaining: VecDeque<AgentName> = routing.agents.iter().copied().collect();
        // Allow up to 3 extra iterations for loop-backs and additions.
        let max_iterations = remaining.len() + 3;
        let mut iteration = 0;
        let mut delegation_cursor = 0;

        while let Some(agent_name) = remaining.pop_front() {
            if iteration >= max_iterations {
                break;
            }
            iteration += 1;

            if opts.cancel.is_cancelled() {
                break;
            }

            self.emit_status(opts, agent_name, "running").await;

            let mut task = self.build_agent_task(agent_name, user_message, routing, opts);

            if let (Some(learner), Some(user_id)) = (&learner, opts.user_id) {
                let expertise = learner.expertise_context(user_id, agent_name).await;
                if !expertise.is_empty() {
                    task.push_str("\n\n");
                    task.push_str(&expertise);
                }
            }

            let rl_hints = match (&opts.hints, opts.user_id) {
                (Some(hints), Some(user_id)) => {
                    hints
                        .tool_hints(user_id, user_message, agent_name, opts.profile.as_ref())
                        .await
                }
                _ => String::new(),
            };

            let trace_id = self
                .create_trace(opts, agent_name, routing.intent.as_str(), &task)
                .await;

            let mut agent = build_agent(
                agent_name,
                self.client.clone(),
                &self.config,
                self.toolbox.tools_for(agent_name),
            );
            self.attach_memory_tools(&mut agent, opts);
            agent
                .registry
                .register(Arc::new(DelegateToAgentTool::new(DelegateContext {
                    client: self.client.clone(),
                    config: self.config.clone(),
                    toolbox: self.toolbox.clone(),
                    user_id: opts.user_id,
                    conversation_id: opts.conversation_id,
                    bus: bus.clone(),
                    depth: 0,
                    counter: delegation_counter.clone(),
                    trace_store: self.trace_store.clone(),
                    memory_store: self.memory_store.clone(),
                    cancel: Some(opts.cancel.clone()),
                })));

            let run_opts = RunOptions {
                trace_id,
                bus: Some(bus.clone()),
                cancel: Some(opts.cancel.clone()),
                sink: opts.sink.clone(),
                trace_store: self.trace_store.clone(),
                rl_hints,
            };

            let result = match agent.run(&task, &run_opts).await {
                Ok(output) => AgentResult {
                    agent_name,
                    output,
                    success: true,
                    trace_id,
                },
                Err(e) => {
                    log::error!("[{}] agent failed: {}", agent_name, e);
                    if let (Some(id), Some(store)) = (trace_id, &self.trace_store) {
                        if let Err(e) = store
                            .complete_trace(id, TraceStatus::Failed, &e.to_string(), 0, 0)
                            .await
                        {
                            log::warn!("trace completion failed: {}", e);
                        }
                    }
                    AgentResult {
                        agent_name,
                        output: format!("Agent failed: {}", e),
                        success: false,
                        trace_id,
                    }
                }
            };
            self.results.push(result.clone());

            if result.success {
                bus.send(
                    AgentMessage::new(
                        agent_name.as_str(),
                        "orchestrator",
                        Payload::Response {
                            output: result.output.clone(),
                            confidence: DEFAULT_RESPONSE_CONFIDENCE,
                            needs_more_data: false,
                        },
                    )
                    .with_trace(trace_id),
                );
                self.remember_facts(opts, &result.output, user_message).await;
            } else {
                bus.send(
                    AgentMessage::new(
                        agent_name.as_str(),
                        "orchestrator",
                        Payload::Error {
                            output: result.output.clone(),
                        },
                    )
                    .with_trace(trace_id),
                );
            }

            self.emit_status(opts, agent_name, if result.success { "complete" } else { "failed" })
                .await;

            if result.success {
                let remaining_list: Vec<AgentName> = remaining.iter().copied().collect();
                let decision = evaluator
                    .evaluate(agent_name, &result.output, &remaining_list, routing)
                    .await;

                bus.send(AgentMessage::new(
                    "evaluator",
                    "orchestrator",
                    Payload::Observation {
                        note: format!("[{}] {}", decision.action, decision.reason),
                        action: Some(decision.action),
                        target: decision.target_agent,
                    },
                ));

                emit_to(
                    opts.sink.as_ref(),
                    DispatchEvent::Evaluator {
                        decision: decision.action.as_str().to_string(),
                        reason: decision.reason.clone(),
                        target_agent: decision
                            .target_agent
                            .map(|a| a.as_str().to_string())
                            .unwrap_or_default(),
                    },
                )
                .await;

                match decision.action {
                    EvalAction::Stop => remaining.clear(),
                    EvalAction::SkipNext => {
                        // No-op when the queue is already empty.
                        if let Some(skipped) = remaining.pop_front() {
                            bus.send(AgentMessage::new(
                                "evaluator",
                                "orchestrator",
                                Payload::Observation {
                                    note: format!("Skipped {}: {}", skipped, decision.reason),
                                    action: None,
                                    target: None,
                                },
                            ));
                        }
                    }
                    EvalAction::LoopBack => {
                        if let Some(target) = decision.target_agent {
                            if !remaining.contains(&target) {
                                remaining.push_front(target);
                            }
                        }
                    }
                    EvalAction::AddAgent => {
                        if let Some(target) = decision.target_agent {
                            if !remaining.contains(&target) {
                                remaining.push_back(target);
                            }
                        }
                    }
                    EvalAction::Continue => {}
                }
            }

            // Drain delegation requests posted to the bus since last look,
            // under the same per-dispatch cap as the delegate tool.
            let delegations = bus.delegations();
            for msg in delegations.iter().skip(delegation_cursor) {
                if let Payload::Delegate { target_agent, .. } = &msg.payload {
                    if remaining.contains(target_agent) {
                        continue;
                    }
                    if delegation_counter.load(std::sync::atomic::Ordering::SeqCst)
                        >= crate::caravel::tools::delegate::MAX_DELEGATED_RUNS
                    {
                        log::warn!("delegation cap reached, ignoring request for {}", target_agent);
                        continue;
                    }
                    delegation_counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    remaining.push_front(*target_agent);
                }
            }
            delegation_cursor = delegations.len();
        }

        self.run_negotiation(&bus, opts).await;

        (self.results.clone(), bus)
    }

    /// Scan for conflicting outputs and resolve the first one found through
    /// a bounded negotiation, posting the consensus back to the bus.
    async fn run_negotiation(&self, bus: &Arc<MessageBus>, opts: &DispatchOptions) {
        let conflicts = ConflictDetector::new().detect(bus);
        let conflict = match conflicts.into_iter().next() {
            Some(conflict) => conflict,
            None => return,
        };

        log::info!(
            "conflict detected ({}): {}",
            conflict.topic.as_str(),
            conflict.details
        );

        let mut session =
            NegotiationSession::new(conflict, bus.clone(), self.client.clone())
                .with_conversation(opts.conversation_id);
        if let Some(store) = &self.negotiation_store {
            session = session.with_store(store.clone());
        }
        if let Some(sink) = &opts.sink {
            session = session.with_sink(sink.clone());
        }

        let consensus = session.run().await;

        bus.send(AgentMessage::new(
            "negotiator",
            "orchestrator",
            Payload::Consensus {
                reached: consensus.reached,
                position: consensus.position.clone(),
                confidence: consensus.confidence,
                dissenting_views: consensus.dissenting_views.clone(),
                rounds_taken: consensus.rounds_taken,
            },
        ));

        emit_to(
            opts.sink.as_ref(),
            DispatchEvent::NegotiationResult {
                consensus_reached: consensus.reached,
                position: consensus.position,
                confidence: consensus.confidence,
                dissenting_views: consensus.dissenting_views,
                rounds_taken: consensus.rounds_taken,
            },
        )
        .await;
    }

    /// Construct the task string for one agent from the user message,
    /// profile, and extracted context.  Prior agent outputs are not
    /// concatenated here; they flow through the bus.
    fn build_agent_task(
        &self,
        agent_name: AgentName,
        user_message: &str,
        routing: &RoutingDecision,
        opts: &DispatchOptions,
    ) -> String {
        let ctx = &routing.extracted_context;
        let company = ctx.company.as_deref().unwrap_or("the company");
        let role = ctx
            .role
            .as_deref()
            .or_else(|| {
                opts.profile
                    .as_ref()
                    .and_then(|p| p.target_role.as_deref())
            })
            .unwrap_or("the role");

        let mut parts = vec![format!("User request: {}", user_message)];

        if let Some(summary) = opts.profile.as_ref().and_then(UserProfile::summary) {
            parts.push(format!("User profile:\n{}", summary));
        }

        match agent_name {
            AgentName::Scout => {
                let keywords = if ctx.skills.is_empty() {
                    role.to_string()
                } else {
                    ctx.skills.join(", ")
                };
                let at_company = if company == "the company" {
                    String::new()
                } else {
                    format!(" at {}", company)
                };
                parts.push(format!(
                    "Search for jobs matching: {}. Focus on {} roles{}. \
                     Find the top results and research the most promising companies.",
                    keywords, role, at_company
                ));
            }
            AgentName::Match => {
                parts.push(format!("Analyze compatibility for {} at {}.", role, company));
                if !opts.resume_text.is_empty() {
                    parts.push(format!(
                        "Resume:\n{}",
                        truncate_chars(&opts.resume_text, 3000)
                    ));
                }
                if ctx.has_jd {
                    parts.push(
                        "The job description was provided in the user's message above."
                            .to_string(),
                    );
                }
                parts.push(
                    "Parse the job requirements, analyze the resume, match skills, \
                     and score ATS compatibility. Produce a detailed analysis."
                        .to_string(),
                );
            }
            AgentName::Forge => {
                parts.push(format!(
                    "Write application materials for {} at {}. \
                     Rewrite resume bullets to match the role and generate a tailored cover letter.",
                    role, company
                ));
                if !opts.resume_text.is_empty() {
                    parts.push(format!(
                        "Resume:\n{}",
                        truncate_chars(&opts.resume_text, 2000)
                    ));
                }
            }
            AgentName::Coach => {
                parts.push(format!(
                    "Prepare interview questions for {} at {}. \
                     Generate likely questions with talking points and strategic advice.",
                    role, company
                ));
            }
        }

        parts.join("\n\n")
    }

    async fn create_trace(
        &self,
        opts: &DispatchOptions,
        agent_name: AgentName,
        intent: &str,
        task: &str,
    ) -> Option<i64> {
        let user_id = opts.user_id?;
        let store = self.trace_store.as_ref()?;
        match store
            .create_trace(
                user_id,
                opts.conversation_id,
                agent_name.as_str(),
                intent,
                truncate_chars(task, 2000),
            )
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("trace create failed: {}", e);
                None
            }
        }
    }

    fn attach_memory_tools(&self, agent: &mut crate::caravel::agent::Agent, opts: &DispatchOptions) {
        let user_id = match opts.user_id {
            Some(id) => id,
            None => return,
        };
        if let Some(memory_store) = &self.memory_store {
            agent
                .registry
                .register(Arc::new(RecallMemoryTool::new(memory_store.clone(), user_id)));
            agent
                .registry
                .register(Arc::new(StoreMemoryTool::new(memory_store.clone(), user_id)));
        }
        if let Some(trace_store) = &self.trace_store {
            agent
                .registry
                .register(Arc::new(RecallPastWorkTool::new(trace_store.clone(), user_id)));
        }
    }

    /// Extract facts from successful output into episodic memory.
    async fn remember_facts(&self, opts: &DispatchOptions, output: &str, user_message: &str) {
        let (user_id, memory_store) = match (opts.user_id, &self.memory_store) {
            (Some(user_id), Some(store)) => (user_id, store),
            _ => return,
        };

        let facts = extract_facts(&self.client, output, user_message).await;
        if facts.is_empty() {
            return;
        }
        let memory = EpisodicMemory::new(memory_store.clone(), user_id);
        for fact in facts {
            if let Err(e) = memory
                .remember(&fact.content, fact.category, opts.conversation_id)
                .await
            {
                log::warn!("episodic write failed: {}", e);
            }
        }
    }

    async fn emit_status(&self, opts: &DispatchOptions, agent: AgentName, status: &str) {
        let message = match status {
            "running" => match agent {
                AgentName::Scout => "Scout Agent searching for jobs".to_string(),
                AgentName::Match => "Match Agent analyzing compatibility".to_string(),
                AgentName::Forge => "Forge Agent writing materials".to_string(),
                AgentName::Coach => "Coach Agent preparing interview prep".to_string(),
            },
            "complete" => format!("{} done", capitalize(agent.as_str())),
            _ => format!("{} failed", capitalize(agent.as_str())),
        };
        emit_to(
            opts.sink.as_ref(),
            DispatchEvent::AgentStatus {
                agent: agent.as_str().to_string(),
                status: status.to_string(),
                message,
            },
        )
        .await;
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_summary_skips_empty_fields() {
        let profile = UserProfile {
            target_role: Some("Backend Engineer".to_string()),
            skills: vec!["rust".to_string(), "postgres".to_string()],
            ..UserProfile::default()
        };
        let summary = profile.summary().unwrap();
        assert!(summary.contains("Target role: Backend Engineer"));
        assert!(summary.contains("Skills: rust, postgres"));
        assert!(!summary.contains("Location"));

        assert_eq!(UserProfile::default().summary(), None);
    }
}
