//! End-to-end dispatch session: route, run, synthesize, stream.
//!
//! A [`DispatchSession`] carries one user request through the whole core:
//!
//! 1. the router classifies the message;
//! 2. `general_chat` takes the direct path: a bounded tool-calling loop
//!    over the full chat registry, with tools withheld on the final round;
//! 3. anything else dispatches the agent pipeline through the
//!    [`Orchestrator`] (a `multi_step` request is first decomposed into a
//!    persisted goal plan when a goal store is configured, and its first
//!    step executes immediately);
//! 4. successful agent outputs are folded into a synthesis prompt and the
//!    final response streams to the event sink as `Content` chunks,
//!    terminated by `Done`.
//!
//! The session is created per request and discarded afterwards.  Failures
//! surface to the user as one short, non-technical message; the detail goes
//! to logs and traces only.

use crate::caravel::agent::Toolbox;
use crate::caravel::client_wrapper::{
    ChatOptions, ClientWrapper, Message, NativeToolCall, Role, ToolChoice,
};
use crate::caravel::config::CoreConfig;
use crate::caravel::episodic::EpisodicMemory;
use crate::caravel::event::{emit_to, DispatchEvent, EventSink};
use crate::caravel::orchestrator::{AgentResult, DispatchOptions, Orchestrator};
use crate::caravel::planner::GoalPlanner;
use crate::caravel::prompts::CHAT_SYSTEM_PROMPT;
use crate::caravel::router::{Intent, IntentRouter, RoutingDecision};
use crate::caravel::store::{GoalStore, MemoryStore, NegotiationStore, TraceStore};
use crate::caravel::tool_protocol::ToolRegistry;
use crate::caravel::util::truncate_chars;
use futures_util::StreamExt;
use std::sync::Arc;
use uuid::Uuid;

/// The user-visible failure message.  Internal context goes to traces and
/// logs, never to the user.
pub const FAILURE_MESSAGE: &str = "Something went wrong — please try again.";

/// Human-readable status line per tool, for `ToolStatus` events.
fn tool_status_message(tool: &str) -> String {
    match tool {
        "search_jobs" => "Searching for jobs".to_string(),
        "parse_job_description" => "Analyzing job description".to_string(),
        "analyze_resume" => "Analyzing resume".to_string(),
        "match_skills" => "Matching skills".to_string(),
        "score_ats" => "Scoring ATS compatibility".to_string(),
        "prepare_interview" => "Preparing interview questions".to_string(),
        "generate_cover_letter" => "Writing cover letter".to_string(),
        "rewrite_resume" => "Rewriting resume".to_string(),
        "research_company" => "Researching company".to_string(),
        "analyze_github" => "Analyzing GitHub profile".to_string(),
        "research_salary" => "Researching salary data".to_string(),
        "draft_email" => "Drafting email".to_string(),
        "generate_learning_path" => "Creating learning path".to_string(),
        "mock_interview" => "Running mock interview".to_string(),
        "fetch_url" => "Reading webpage".to_string(),
        other => format!("Using {}", other),
    }
}

/// Outcome of one dispatch: the routing, the agent results (empty on the
/// direct path), and the final synthesized response text.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub routing: RoutingDecision,
    pub results: Vec<AgentResult>,
    pub response: String,
}

/// Drives one user request end to end.
pub struct DispatchSession {
    config: CoreConfig,
    client: Arc<dyn ClientWrapper>,
    toolbox: Toolbox,
    /// Full tool registry for the direct chat path.
    chat_registry: Arc<ToolRegistry>,
    trace_store: Option<Arc<dyn TraceStore>>,
    memory_store: Option<Arc<dyn MemoryStore>>,
    negotiation_store: Option<Arc<dyn NegotiationStore>>,
    goal_store: Option<Arc<dyn GoalStore>>,
}

impl DispatchSession {
    pub fn new(config: CoreConfig, client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            config,
            client,
            toolbox: Toolbox::new(),
            chat_registry: Arc::new(ToolRegistry::new()),
            trace_store: None,
            memory_store: None,
            negotiation_store: None,
            goal_store: None,
        }
    }

    pub fn with_toolbox(mut self, toolbox: Toolbox) -> Self {
        self.toolbox = toolbox;
        self
    }

    /// Bind the registry used by the direct chat path.
    pub fn with_chat_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.chat_registry = registry;
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

    pub fn with_goal_store(mut self, store: Arc<dyn GoalStore>) -> Self {
        self.goal_store = Some(store);
        self
    }

    /// Process one user message end to end, emitting events along the way.
    pub async fn run(&self, message: &str, opts: &DispatchOptions) -> DispatchOutcome {
        let dispatch_id = Uuid::new_v4();
        log::info!("dispatch {} started", dispatch_id);

        let user_context = self.build_user_context(opts).await;
        let router = IntentRouter::new(self.client.clone(), &self.config);
        let routing = router
            .route(message, !opts.resume_text.is_empty(), opts.profile.is_some())
            .await;

        emit_to(
            opts.sink.as_ref(),
            DispatchEvent::Routing {
                intent: routing.intent,
                agents: routing.agents.clone(),
            },
        )
        .await;

        let system_content = format!("{}{}", CHAT_SYSTEM_PROMPT, user_context);
        let base_messages = vec![
            Message::text(Role::System, system_content),
            Message::text(Role::User, message),
        ];

        let (results, response) = if routing.intent == Intent::GeneralChat
            || routing.agents.is_empty()
        {
            (Vec::new(), self.run_direct(base_messages, opts).await)
        } else if routing.intent == Intent::MultiStep
            && self.goal_store.is_some()
            && opts.user_id.is_some()
        {
            self.run_multi_step(&routing, message, &user_context, base_messages, opts)
                .await
        } else {
            self.run_agents(&routing, message, base_messages, opts).await
        };

        emit_to(
            opts.sink.as_ref(),
            DispatchEvent::Done {
                dispatch_id: dispatch_id.to_string(),
            },
        )
        .await;
        log::info!("dispatch {} finished", dispatch_id);

        DispatchOutcome {
            routing,
            results,
            response,
        }
    }

    /// Direct LLM path with tool calling (general chat).
    ///
    /// Tools are offered for `max_tool_rounds` rounds, then withheld so the
    /// model must produce a textual reply.
    async fn run_direct(&self, mut messages: Vec<Message>, opts: &DispatchOptions) -> String {
        let tool_defs = self.chat_registry.to_tool_definitions();

        for round in 0..=self.config.max_tool_rounds {
            let is_last_round = round >= self.config.max_tool_rounds;
            let tools = if is_last_round || tool_defs.is_empty() {
                None
            } else {
                Some(tool_defs.clone())
            };
            let options = ChatOptions {
                max_tokens: 1024,
                temperature: 0.6,
                tool_choice: if tools.is_some() {
                    ToolChoice::Auto
                } else {
                    ToolChoice::None
                },
            };

            let reply = match self.client.send_message(&messages, tools, options).await {
                Ok(reply) => reply,
                Err(e) => {
                    log::error!("direct chat call failed: {}", e);
                    return self.fail(opts).await;
                }
            };

            if !reply.tool_calls.is_empty() && !is_last_round {
                let calls: Vec<NativeToolCall> = reply.tool_calls.clone();
                messages.push(reply);

                for call in calls {
                    emit_to(
                        opts.sink.as_ref(),
                        DispatchEvent::ToolStatus {
                            tool: call.name.clone(),
                            status: tool_status_message(&call.name),
                        },
                    )
                    .await;

                    let args: serde_json::Value =
                        serde_json::from_str(&call.arguments).unwrap_or(serde_json::json!({}));
                    let result = self.chat_registry.execute(&call.name, args).await;
                    let mut result_str = serde_json::to_string_pretty(&result)
                        .unwrap_or_else(|_| "{}".to_string());
                    if result_str.chars().count() > 4000 {
                        result_str =
                            format!("{}\n... (truncated)", truncate_chars(&result_str, 4000));
                    }

                    messages.push(Message::text(Role::Tool { call_id: call.id }, result_str));
                }
                continue;
            }

            // Final response: prefer streaming, fall back to the reply we
            // already hold.
            return self
                .stream_or(messages, reply.content.to_string(), 1024, opts)
                .await;
        }

        self.fail(opts).await
    }

    /// Multi-step path: decompose into a goal plan, then execute the first
    /// step through the agent pipeline.
    async fn run_multi_step(
        &self,
        routing: &RoutingDecision,
        message: &str,
        user_context: &str,
        mut base_messages: Vec<Message>,
        opts: &DispatchOptions,
    ) -> (Vec<AgentResult>, String) {
        let (goal_store, user_id) = match (self.goal_store.clone(), opts.user_id) {
            (Some(store), Some(user_id)) => (store, user_id),
            _ => return self.run_agents(routing, message, base_messages, opts).await,
        };

        let mut planner = GoalPlanner::new(
            self.config.clone(),
            self.client.clone(),
            goal_store,
        )
        .with_toolbox(self.toolbox.clone());
        if let Some(store) = &self.trace_store {
            planner = planner.with_trace_store(store.clone());
        }
        if let Some(store) = &self.memory_store {
            planner = planner.with_memory_store(store.clone());
        }
        if let Some(store) = &self.negotiation_store {
            planner = planner.with_negotiation_store(store.clone());
        }

        let plan = planner.create_plan(message, user_context).await;
        let goal_id = match planner.save_plan(user_id, &plan).await {
            Ok(id) => id,
            Err(e) => {
                // Planning is an optimization; fall back to the plain
                // pipeline when it cannot be persisted.
                log::warn!("plan persistence failed, dispatching directly: {}", e);
                return self.run_agents(routing, message, base_messages, opts).await;
            }
        };
        log::info!("created goal {} with {} steps", goal_id, plan.steps.len());

        emit_to(
            opts.sink.as_ref(),
            DispatchEvent::AgentStatus {
                agent: "planner".to_string(),
                status: "complete".to_string(),
                message: format!("Created plan: {} ({} steps)", plan.title, plan.steps.len()),
            },
        )
        .await;

        let first_step = match plan.steps.first() {
            Some(step) => step,
            None => return self.run_agents(routing, message, base_messages, opts).await,
        };

        let first_routing = RoutingDecision::single_agent(
            crate::caravel::planner::intent_for(first_step.agent_name),
            first_step.agent_name,
            routing.extracted_context.clone(),
            "Executing first step of goal plan",
        );

        let mut plan_text = format!(
            "\n\nI created a goal plan: '{}' with {} steps:\n",
            plan.title,
            plan.steps.len()
        );
        for (i, step) in plan.steps.iter().enumerate() {
            plan_text.push_str(&format!(
                "{}. {} ({} agent)\n",
                i + 1,
                step.title,
                step.agent_name
            ));
        }
        plan_text.push_str("\nThe user can say 'continue my plan' or check the Goals tab to resume.");
        base_messages.push(Message::text(Role::System, plan_text));

        self.run_agents(&first_routing, message, base_messages, opts)
            .await
    }

    /// Agent dispatch path: run the pipeline, then synthesize a response
    /// from the agent outputs.
    async fn run_agents(
        &self,
        routing: &RoutingDecision,
        message: &str,
        mut base_messages: Vec<Message>,
        opts: &DispatchOptions,
    ) -> (Vec<AgentResult>, String) {
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

        let (results, _bus) = orchestrator.dispatch(routing, message, opts).await;

        let trace_ids: Vec<i64> = results.iter().filter_map(|r| r.trace_id).collect();
        if !trace_ids.is_empty() {
            emit_to(opts.sink.as_ref(), DispatchEvent::TraceIds { ids: trace_ids }).await;
        }

        if opts.cancel.is_cancelled() {
            let partial = results
                .iter()
                .filter(|r| r.success)
                .map(|r| truncate_chars(&r.output, 500))
                .collect::<Vec<_>>()
                .join("\n");
            let response = format!(
                "Stopped early. Here's what I found so far:\n\n{}",
                partial
            );
            emit_to(
                opts.sink.as_ref(),
                DispatchEvent::Content {
                    text: response.clone(),
                },
            )
            .await;
            return (results, response);
        }

        // Fold agent outputs into a synthesis system message.
        let mut agent_context = String::new();
        for result in results.iter().filter(|r| r.success) {
            agent_context.push_str(&format!(
                "\n\n[{} AGENT RESULTS]\n{}\n",
                result.agent_name.as_str().to_uppercase(),
                truncate_chars(&result.output, 3000)
            ));
        }
        if !agent_context.is_empty() {
            base_messages.push(Message::text(
                Role::System,
                format!(
                    "AGENT ANALYSIS RESULTS (synthesize these into your response — \
                     do NOT mention agent names to the user):{}",
                    agent_context
                ),
            ));
        }

        let response = self.synthesize(base_messages, 2048, opts).await;
        (results, response)
    }

    /// Stream the synthesized response; providers without streaming get one
    /// non-streaming call emitted as a single chunk.
    async fn synthesize(
        &self,
        messages: Vec<Message>,
        max_tokens: usize,
        opts: &DispatchOptions,
    ) -> String {
        let options = ChatOptions {
            max_tokens,
            temperature: 0.6,
            tool_choice: ToolChoice::None,
        };

        match self.client.send_message_stream(&messages, options).await {
            Ok(Some(stream)) => {
                if let Some(full) = self.consume_stream(stream, opts).await {
                    return full;
                }
            }
            Ok(None) => {}
            Err(e) => log::error!("stream open failed: {}", e),
        }

        match self.client.send_message(&messages, None, options).await {
            Ok(reply) => {
                let text = reply.content.to_string();
                emit_to(
                    opts.sink.as_ref(),
                    DispatchEvent::Content { text: text.clone() },
                )
                .await;
                text
            }
            Err(e) => {
                log::error!("synthesis call failed: {}", e);
                self.fail(opts).await
            }
        }
    }

    /// Stream the final response when the provider supports it, otherwise
    /// emit the fallback text (already obtained) as a single chunk.
    async fn stream_or(
        &self,
        messages: Vec<Message>,
        fallback: String,
        max_tokens: usize,
        opts: &DispatchOptions,
    ) -> String {
        let options = ChatOptions {
            max_tokens,
            temperature: 0.6,
            tool_choice: ToolChoice::None,
        };

        if let Ok(Some(stream)) = self.client.send_message_stream(&messages, options).await {
            if let Some(full) = self.consume_stream(stream, opts).await {
                return full;
            }
        }

        emit_to(
            opts.sink.as_ref(),
            DispatchEvent::Content {
                text: fallback.clone(),
            },
        )
        .await;
        fallback
    }

    /// Drain a chunk stream into the sink; `None` when it produced nothing.
    async fn consume_stream(
        &self,
        mut stream: crate::caravel::client_wrapper::MessageChunkStream,
        opts: &DispatchOptions,
    ) -> Option<String> {
        let mut full = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    if !chunk.content.is_empty() {
                        full.push_str(&chunk.content);
                        emit_to(
                            opts.sink.as_ref(),
                            DispatchEvent::Content {
                                text: chunk.content,
                            },
                        )
                        .await;
                    }
                }
                Err(e) => {
                    log::error!("stream chunk failed: {}", e);
                    break;
                }
            }
        }
        if full.is_empty() {
            None
        } else {
            Some(full)
        }
    }

    async fn fail(&self, opts: &DispatchOptions) -> String {
        emit_to(
            opts.sink.as_ref(),
            DispatchEvent::Content {
                text: FAILURE_MESSAGE.to_string(),
            },
        )
        .await;
        FAILURE_MESSAGE.to_string()
    }

    /// User context block for the chat system prompt: profile, resume
    /// preview, and episodic memories.
    async fn build_user_context(&self, opts: &DispatchOptions) -> String {
        let mut parts = Vec::new();
        if let Some(profile) = &opts.profile {
            if let Some(role) = &profile.target_role {
                parts.push(format!("Targeting: {} roles", role));
            }
            if let Some(level) = &profile.experience_level {
                parts.push(format!("Experience: {}", level));
            }
            if !profile.skills.is_empty() {
                let skills: Vec<&str> =
                    profile.skills.iter().take(15).map(String::as_str).collect();
                parts.push(format!("Skills: {}", skills.join(", ")));
            }
            if let Some(location) = &profile.location {
                parts.push(format!("Location: {}", location));
            }
        }
        if !opts.resume_text.is_empty() {
            parts.push(format!(
                "\nResume on file:\n{}",
                truncate_chars(&opts.resume_text, 2000)
            ));
        }

        let mut result = String::new();
        if !parts.is_empty() {
            result = format!("\n\nUSER CONTEXT:\n{}", parts.join("\n"));
        }

        if let (Some(memory_store), Some(user_id)) = (&self.memory_store, opts.user_id) {
            let memories = EpisodicMemory::new(memory_store.clone(), user_id)
                .recall_as_context(10)
                .await;
            if !memories.is_empty() {
                result.push_str("\n\n");
                result.push_str(&memories);
            }
        }

        result
    }
}
