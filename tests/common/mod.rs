//! Shared test doubles: a scripted LLM client and tool helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use caravel::caravel::client_wrapper::{
    ChatOptions, ClientWrapper, Message, NativeToolCall, Role, ToolDefinition,
};
use caravel::caravel::tool_protocol::{FnTool, Tool, ToolResult, ToolSpec};
use std::collections::VecDeque;
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// An LLM stand-in that routes each request to a scripted reply queue based
/// on the system prompt, so one client can serve the router, the evaluator,
/// the agents, the debate, and the planner within a single dispatch.
#[derive(Default)]
pub struct ScriptedClient {
    /// Replies for agent ReAct calls, consumed in order.  When empty, agents
    /// get an immediate `FINAL_ANSWER done`.
    pub agent_replies: Mutex<VecDeque<Message>>,
    /// Replies for the direct chat / synthesis path.
    pub chat_replies: Mutex<VecDeque<Message>>,
    /// Raw JSON replies for the evaluator, defaulting to `continue`.
    pub eval_replies: Mutex<VecDeque<String>>,
    /// Raw JSON replies for debate position calls.
    pub debate_replies: Mutex<VecDeque<String>>,
    /// Raw JSON replies for the mid-plan re-evaluator, defaulting to
    /// `continue`.
    pub replan_replies: Mutex<VecDeque<String>>,
    /// Routing JSON returned by the classifier; `None` means general_chat.
    pub routing_json: Mutex<Option<String>>,
    /// Plan JSON returned by the goal planner.
    pub plan_json: Mutex<Option<String>>,
    /// Hook fired on every evaluator call (e.g. to flip a cancel flag
    /// between agents).
    pub on_eval: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    /// Count of agent-path LLM calls, for loop assertions.
    pub agent_calls: AtomicUsize,
    /// Message contents of the most recent agent-path request, joined by
    /// newlines, for prompt-composition assertions.
    pub last_agent_request: Mutex<Option<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_agent_reply(&self, message: Message) {
        self.agent_replies.lock().unwrap().push_back(message);
    }

    pub fn push_chat_reply(&self, message: Message) {
        self.chat_replies.lock().unwrap().push_back(message);
    }

    pub fn push_eval_reply(&self, json: &str) {
        self.eval_replies.lock().unwrap().push_back(json.to_string());
    }

    pub fn push_debate_reply(&self, json: &str) {
        self.debate_replies
            .lock()
            .unwrap()
            .push_back(json.to_string());
    }

    pub fn push_replan_reply(&self, json: &str) {
        self.replan_replies
            .lock()
            .unwrap()
            .push_back(json.to_string());
    }

    pub fn set_routing(&self, json: &str) {
        *self.routing_json.lock().unwrap() = Some(json.to_string());
    }

    pub fn set_plan(&self, json: &str) {
        *self.plan_json.lock().unwrap() = Some(json.to_string());
    }

    pub fn set_on_eval(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_eval.lock().unwrap() = Some(Box::new(hook));
    }

    fn pop(queue: &Mutex<VecDeque<Message>>) -> Option<Message> {
        queue.lock().unwrap().pop_front()
    }

    fn pop_json(queue: &Mutex<VecDeque<String>>, default: &str) -> Message {
        let json = queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| default.to_string());
        text_reply(&json)
    }
}

/// A plain assistant text reply.
pub fn text_reply(content: &str) -> Message {
    Message::text(Role::Assistant, content)
}

/// An assistant reply containing a single native tool call.
pub fn tool_reply(id: &str, name: &str, arguments: &str) -> Message {
    Message {
        role: Role::Assistant,
        content: Arc::from(""),
        tool_calls: vec![NativeToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }],
    }
}

#[async_trait]
impl ClientWrapper for ScriptedClient {
    async fn send_message(
        &self,
        messages: &[Message],
        _tools: Option<Vec<ToolDefinition>>,
        _options: ChatOptions,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        let system: &str = messages
            .first()
            .map(|m| m.content.as_ref())
            .unwrap_or_default();

        if system.contains("You are an intent classifier") {
            let json = self
                .routing_json
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| r#"{"intent": "general_chat", "agents": []}"#.to_string());
            return Ok(text_reply(&json));
        }
        if system.contains("You are a pipeline evaluator") {
            if let Some(hook) = self.on_eval.lock().unwrap().as_ref() {
                hook();
            }
            return Ok(Self::pop_json(
                &self.eval_replies,
                r#"{"action": "continue", "reason": "looks good", "target_agent": ""}"#,
            ));
        }
        if system.contains("structured debate") {
            return Ok(Self::pop_json(
                &self.debate_replies,
                r#"{"response_type": "position", "position": "hold", "evidence": "", "confidence": 0.5}"#,
            ));
        }
        if system.contains("You are a career goal planner") {
            let json = self.plan_json.lock().unwrap().clone().unwrap_or_else(|| {
                r#"{"title": "Plan", "steps": [{"title": "Research", "description": "look around", "agent_name": "scout"}]}"#
                    .to_string()
            });
            return Ok(text_reply(&json));
        }
        if system.contains("You are a plan evaluator") {
            return Ok(Self::pop_json(
                &self.replan_replies,
                r#"{"action": "continue", "reason": "on track"}"#,
            ));
        }
        if system.contains("You are a memory extraction system") {
            return Ok(text_reply("[]"));
        }
        if system.starts_with("You are Caravel,") {
            return Ok(Self::pop(&self.chat_replies)
                .unwrap_or_else(|| text_reply("Here is what I found.")));
        }

        // Agent ReAct call.
        self.agent_calls.fetch_add(1, Ordering::SeqCst);
        let transcript = messages
            .iter()
            .map(|m| m.content.as_ref())
            .collect::<Vec<_>>()
            .join("\n");
        *self.last_agent_request.lock().unwrap() = Some(transcript);
        Ok(Self::pop(&self.agent_replies)
            .unwrap_or_else(|| text_reply("FINAL_ANSWER done")))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// A client whose every call fails, for fallback-path tests.
pub struct UnreachableClient;

#[async_trait]
impl ClientWrapper for UnreachableClient {
    async fn send_message(
        &self,
        _messages: &[Message],
        _tools: Option<Vec<ToolDefinition>>,
        _options: ChatOptions,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        Err("connection refused".into())
    }

    fn model_name(&self) -> &str {
        "unreachable"
    }
}

/// A counting tool that always succeeds with a fixed payload.
pub fn counting_tool(
    name: &str,
    payload: serde_json::Value,
    counter: Arc<AtomicUsize>,
) -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        ToolSpec::new(name, "test tool", serde_json::json!({"type": "object"})),
        move |_args| {
            let counter = counter.clone();
            let payload = payload.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ToolResult::success(payload))
            }
        },
    ))
}

/// A counting tool that always fails, for retry tests.
pub fn failing_tool(name: &str, counter: Arc<AtomicUsize>) -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        ToolSpec::new(name, "always fails", serde_json::json!({"type": "object"})),
        move |_args| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ToolResult::failure("boom"))
            }
        },
    ))
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
