//! Agent runtime: the per-agent ReAct loop.
//!
//! An [`Agent`] is a value, not a subtype: the four specialists (scout,
//! match, forge, coach) differ only in their system prompt and registered
//! tool subset, so a single shared [`Agent::run`] drives all of them.  On
//! each step the model receives the full context (system prompt, task, and
//! every prior thought/action/observation), decides whether to call a tool
//! or produce a final answer, and the loop continues until a `FINAL_ANSWER`
//! marker appears or the step budget is exhausted.
//!
//! # Observability and persistence
//!
//! Every step optionally streams an `AgentReasoning` event and appends a
//! step record to the trace store.  Trace writes are best-effort: a failed
//! write is logged and swallowed, never surfaced to the loop.
//!
//! # Cancellation
//!
//! The cancel flag is observed at the top of each step.  An in-flight LLM
//! call or tool execution always completes first, so cancellation latency is
//! bounded by one step's cost.  A cancelled run finalizes its trace as
//! `cancelled` and returns the partial history summary.

use crate::caravel::client_wrapper::{ChatOptions, ClientWrapper, Message, NativeToolCall, Role};
use crate::caravel::config::CoreConfig;
use crate::caravel::event::{emit_to, CancelFlag, DispatchEvent, EventSink};
use crate::caravel::memory::{AgentMemory, AgentStep, ToolInvocation};
use crate::caravel::protocol::MessageBus;
use crate::caravel::prompts;
use crate::caravel::store::{TraceStatus, TraceStepRecord, TraceStore};
use crate::caravel::tool_protocol::{Tool, ToolRegistry, ToolResult};
use crate::caravel::util::truncate_chars;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// The marker an agent emits in front of its final output.
pub const FINAL_ANSWER_MARKER: &str = "FINAL_ANSWER";

/// The four specialized agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentName {
    Scout,
    Match,
    Forge,
    Coach,
}

impl AgentName {
    pub const ALL: [AgentName; 4] = [
        AgentName::Scout,
        AgentName::Match,
        AgentName::Forge,
        AgentName::Coach,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::Scout => "scout",
            AgentName::Match => "match",
            AgentName::Forge => "forge",
            AgentName::Coach => "coach",
        }
    }

    /// Parse an agent tag, returning `None` for anything outside the set.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "scout" => Some(AgentName::Scout),
            "match" => Some(AgentName::Match),
            "forge" => Some(AgentName::Forge),
            "coach" => Some(AgentName::Coach),
            _ => None,
        }
    }

    /// One-line description of what this agent does.
    pub fn role(&self) -> &'static str {
        match self {
            AgentName::Scout => "Job discovery and company research",
            AgentName::Match => "Skills analysis and ATS scoring",
            AgentName::Forge => "Application material writer",
            AgentName::Coach => "Interview preparation and coaching",
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            AgentName::Scout => prompts::SCOUT_PROMPT,
            AgentName::Match => prompts::MATCH_PROMPT,
            AgentName::Forge => prompts::FORGE_PROMPT,
            AgentName::Coach => prompts::COACH_PROMPT,
        }
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-agent tool provisioning: which domain tools each agent gets.
///
/// The registry of domain tools is supplied by the embedding application
/// (the shapes ship in [`tools::specs`](crate::caravel::tools::specs)); the
/// orchestrator and the delegate tool both draw from the same toolbox when
/// instantiating agents.
#[derive(Clone, Default)]
pub struct Toolbox {
    tools: HashMap<AgentName, Vec<Arc<dyn Tool>>>,
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the domain tool set for one agent (builder pattern).
    pub fn with_tools(mut self, name: AgentName, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools.insert(name, tools);
        self
    }

    pub fn set(&mut self, name: AgentName, tools: Vec<Arc<dyn Tool>>) {
        self.tools.insert(name, tools);
    }

    /// The domain tools for one agent; empty when the host bound none.
    pub fn tools_for(&self, name: AgentName) -> Vec<Arc<dyn Tool>> {
        self.tools.get(&name).cloned().unwrap_or_default()
    }
}

/// Optional collaborators for one [`Agent::run`] invocation.
#[derive(Default)]
pub struct RunOptions {
    /// Trace to persist steps into; `None` disables persistence.
    pub trace_id: Option<i64>,
    /// Dispatch-scoped bus used to pre-compute structured context.
    pub bus: Option<Arc<MessageBus>>,
    /// Cooperative cancellation, observed at the top of each step.
    pub cancel: Option<CancelFlag>,
    /// Sink for streamed reasoning events.
    pub sink: Option<Arc<dyn EventSink>>,
    /// Store backing trace persistence.
    pub trace_store: Option<Arc<dyn TraceStore>>,
    /// Learned tool-preference hints injected into the system prompt.
    pub rl_hints: String,
}

/// A tool-equipped ReAct loop specialized to one domain.
pub struct Agent {
    pub name: AgentName,
    /// One-line description used in status messages.
    pub role: &'static str,
    system_prompt: &'static str,
    pub registry: ToolRegistry,
    pub memory: AgentMemory,
    client: Arc<dyn ClientWrapper>,
    max_steps: usize,
    max_tool_retries: usize,
}

/// Construct an agent with its domain tool subset registered.
///
/// Memory tools and the delegate tool are layered on top by the orchestrator
/// (or deliberately withheld, for sub-agents).
pub fn build_agent(
    name: AgentName,
    client: Arc<dyn ClientWrapper>,
    config: &CoreConfig,
    domain_tools: Vec<Arc<dyn Tool>>,
) -> Agent {
    let mut agent = Agent::new(name, client, config);
    for tool in domain_tools {
        agent.registry.register(tool);
    }
    agent
}

impl Agent {
    pub fn new(name: AgentName, client: Arc<dyn ClientWrapper>, config: &CoreConfig) -> Self {
        Self {
            name,
            role: name.role(),
            system_prompt: name.system_prompt(),
            registry: ToolRegistry::new(),
            memory: AgentMemory::new(),
            client,
            max_steps: config.max_steps,
            max_tool_retries: config.max_tool_retries,
        }
    }

    fn tool_descriptions(&self) -> String {
        self.registry
            .list()
            .iter()
            .map(|t| format!("- **{}**: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn compose_system_prompt(&self, rl_hints: &str) -> String {
        let mut prompt = self
            .system_prompt
            .replace("{tool_descriptions}", &self.tool_descriptions());
        prompt.push_str(prompts::SELF_CORRECTION_PROMPT);
        if !rl_hints.is_empty() {
            prompt.push_str("\n\nTOOL OPTIMIZATION HINTS:\n");
            prompt.push_str(rl_hints);
        }
        prompt
    }

    /// Rebuild the full message history for the next LLM call: system prompt,
    /// task (with bus context), then one thought / tool-call / tool-result
    /// group per recorded step.
    fn build_messages(&self, task: &str, bus_context: &str, rl_hints: &str) -> Vec<Message> {
        let user_content = if bus_context.is_empty() {
            task.to_string()
        } else {
            format!("{}\n{}", task, bus_context)
        };

        let mut messages = vec![
            Message::text(Role::System, self.compose_system_prompt(rl_hints)),
            Message::text(Role::User, user_content),
        ];

        for step in self.memory.steps() {
            messages.push(Message::text(
                Role::Assistant,
                format!("Thought: {}", step.thought),
            ));
            if let Some(call) = &step.tool_call {
                let call_id = format!("call_{}", step.step_number);
                messages.push(Message {
                    role: Role::Assistant,
                    content: Arc::from(""),
                    tool_calls: vec![NativeToolCall {
                        id: call_id.clone(),
                        name: call.tool_name.clone(),
                        arguments: call.arguments.to_string(),
                    }],
                });
                messages.push(Message::text(
                    Role::Tool { call_id },
                    call.result.to_string(),
                ));
            }
        }

        messages
    }

    /// Execute a tool with automatic retry on failure.
    ///
    /// Only tool execution is retried, never LLM calls.  Results that carry
    /// `success == true` (which side-effect-only tools construct by default)
    /// return immediately.
    async fn execute_tool_with_retry(&self, name: &str, args: serde_json::Value) -> ToolResult {
        let mut result = self.registry.execute(name, args.clone()).await;
        if result.success {
            return result;
        }

        for attempt in 1..=self.max_tool_retries {
            log::info!(
                "[{}] retry {}/{} for {}",
                self.name,
                attempt,
                self.max_tool_retries,
                name
            );
            result = self.registry.execute(name, args.clone()).await;
            if result.success {
                return result;
            }
        }

        result
    }

    /// Execute the agent's ReAct loop on a given task.
    ///
    /// Returns the text after the `FINAL_ANSWER` marker on completion, or a
    /// history summary when the run is cancelled or exhausts its step
    /// budget.  Errors are LLM transport failures and malformed tool-call
    /// arguments; the orchestrator records them as agent failures.
    pub async fn run(
        &mut self,
        task: &str,
        opts: &RunOptions,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        self.memory.clear();
        log::info!("--- {} agent --- ({})", self.name, self.role);
        let mut total_tool_calls: u32 = 0;

        let bus_context = opts
            .bus
            .as_ref()
            .map(|bus| bus.context_for(self.name.as_str()))
            .unwrap_or_default();

        for step_num in 1..=self.max_steps {
            if opts
                .cancel
                .as_ref()
                .map(CancelFlag::is_cancelled)
                .unwrap_or(false)
            {
                let summary = self.memory.history_summary();
                let cancel_msg = format!("(cancelled after {} steps) {}", step_num - 1, summary);
                self.finish_trace(
                    opts,
                    TraceStatus::Cancelled,
                    &cancel_msg,
                    (step_num - 1) as u32,
                    total_tool_calls,
                )
                .await;
                return Ok(cancel_msg);
            }

            log::info!("[{}] step {}/{}", self.name, step_num, self.max_steps);

            let messages = self.build_messages(task, &bus_context, &opts.rl_hints);
            let tools = if self.registry.is_empty() {
                None
            } else {
                Some(self.registry.to_tool_definitions())
            };
            let reply = self
                .client
                .send_message(&messages, tools, ChatOptions::default())
                .await?;

            if let Some(tool_call) = reply.tool_calls.first() {
                // Single-tool-per-step policy: only the first call is taken.
                let args: serde_json::Value = serde_json::from_str(&tool_call.arguments)?;
                let thought = if reply.content.is_empty() {
                    format!("Using {}", tool_call.name)
                } else {
                    reply.content.to_string()
                };

                let result = self
                    .execute_tool_with_retry(&tool_call.name, args.clone())
                    .await;
                let success = result.success;
                let result_value =
                    serde_json::to_value(&result).unwrap_or(serde_json::Value::Null);
                let observation = serde_json::to_string_pretty(&result_value)
                    .unwrap_or_else(|_| result_value.to_string());
                total_tool_calls += 1;

                log::info!(
                    "[{}] {} -> {}",
                    self.name,
                    tool_call.name,
                    if success { "OK" } else { "FAILED" }
                );

                emit_to(
                    opts.sink.as_ref(),
                    DispatchEvent::AgentReasoning {
                        agent: self.name.as_str().to_string(),
                        thought: truncate_chars(&thought, 300).to_string(),
                        tool: tool_call.name.clone(),
                    },
                )
                .await;

                self.persist_step(
                    opts,
                    TraceStepRecord {
                        trace_id: opts.trace_id.unwrap_or(0),
                        step_number: step_num as u32,
                        thought: thought.clone(),
                        tool_name: Some(tool_call.name.clone()),
                        tool_args: Some(args.to_string()),
                        tool_result: Some(truncate_chars(&observation, 4000).to_string()),
                        observation: truncate_chars(&observation, 2000).to_string(),
                        success,
                    },
                )
                .await;

                self.memory.add_step(AgentStep {
                    step_number: step_num,
                    thought,
                    tool_call: Some(ToolInvocation {
                        tool_name: tool_call.name.clone(),
                        arguments: args,
                        result: result_value,
                        timestamp: Utc::now(),
                    }),
                    observation,
                });
            } else {
                let content = reply.content.to_string();
                if let Some(idx) = content.find(FINAL_ANSWER_MARKER) {
                    let final_text = content[idx + FINAL_ANSWER_MARKER.len()..].trim().to_string();
                    log::info!("[{}] complete ({} steps)", self.name, step_num);
                    self.finish_trace(
                        opts,
                        TraceStatus::Completed,
                        &final_text,
                        step_num as u32,
                        total_tool_calls,
                    )
                    .await;
                    return Ok(final_text);
                }

                self.persist_step(
                    opts,
                    TraceStepRecord {
                        trace_id: opts.trace_id.unwrap_or(0),
                        step_number: step_num as u32,
                        thought: content.clone(),
                        tool_name: None,
                        tool_args: None,
                        tool_result: None,
                        observation: String::new(),
                        success: true,
                    },
                )
                .await;

                self.memory.add_step(AgentStep::thought(step_num, content));
            }
        }

        log::info!("[{}] max steps reached", self.name);
        let summary = self.memory.history_summary();
        self.finish_trace(
            opts,
            TraceStatus::MaxSteps,
            &summary,
            self.max_steps as u32,
            total_tool_calls,
        )
        .await;
        Ok(summary)
    }

    /// Best-effort trace step write; failures never reach the loop.
    async fn persist_step(&self, opts: &RunOptions, step: TraceStepRecord) {
        if opts.trace_id.is_none() {
            return;
        }
        if let Some(store) = &opts.trace_store {
            if let Err(e) = store.add_trace_step(step).await {
                log::warn!("[{}] trace step write failed: {}", self.name, e);
            }
        }
    }

    /// Best-effort trace finalization; output is clamped to the persisted
    /// field limit.
    async fn finish_trace(
        &self,
        opts: &RunOptions,
        status: TraceStatus,
        output: &str,
        total_steps: u32,
        total_tool_calls: u32,
    ) {
        let trace_id = match opts.trace_id {
            Some(id) => id,
            None => return,
        };
        if let Some(store) = &opts.trace_store {
            if let Err(e) = store
                .complete_trace(
                    trace_id,
                    status,
                    truncate_chars(output, 4000),
                    total_steps,
                    total_tool_calls,
                )
                .await
            {
                log::warn!("[{}] trace completion failed: {}", self.name, e);
            }
        }
    }
}
