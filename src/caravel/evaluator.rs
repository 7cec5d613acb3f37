//! Pipeline evaluator: decides the next action after each agent completes.
//!
//! A cheap, fast LLM call analyzes the agent's output and returns one of
//! `continue`, `loop_back`, `skip_next`, `stop`, or `add_agent`.  The
//! evaluator is advisory and failure-proof: an unreachable LLM, malformed
//! JSON, an unknown action, or a `loop_back`/`add_agent` without a valid
//! target all reduce to `continue`.

use crate::caravel::agent::AgentName;
use crate::caravel::client_wrapper::{ChatOptions, ClientWrapper, Message, Role};
use crate::caravel::config::CoreConfig;
use crate::caravel::prompts::EVAL_PROMPT;
use crate::caravel::router::RoutingDecision;
use crate::caravel::util::{strip_code_fences, truncate_chars};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Pipeline actions the evaluator can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalAction {
    Continue,
    LoopBack,
    SkipNext,
    Stop,
    AddAgent,
}

impl EvalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvalAction::Continue => "continue",
            EvalAction::LoopBack => "loop_back",
            EvalAction::SkipNext => "skip_next",
            EvalAction::Stop => "stop",
            EvalAction::AddAgent => "add_agent",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "continue" => Some(EvalAction::Continue),
            "loop_back" => Some(EvalAction::LoopBack),
            "skip_next" => Some(EvalAction::SkipNext),
            "stop" => Some(EvalAction::Stop),
            "add_agent" => Some(EvalAction::AddAgent),
            _ => None,
        }
    }
}

impl fmt::Display for EvalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the evaluator analyzing an agent's output.
#[derive(Debug, Clone)]
pub struct EvalDecision {
    pub action: EvalAction,
    pub reason: String,
    /// Required for `loop_back` and `add_agent`.
    pub target_agent: Option<AgentName>,
}

impl EvalDecision {
    fn fallback(reason: impl Into<String>) -> Self {
        Self {
            action: EvalAction::Continue,
            reason: reason.into(),
            target_agent: None,
        }
    }
}

/// Lightweight evaluator that runs after each agent to control pipeline flow.
pub struct PipelineEvaluator {
    client: Arc<dyn ClientWrapper>,
    model: String,
}

impl PipelineEvaluator {
    pub fn new(client: Arc<dyn ClientWrapper>, config: &CoreConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
        }
    }

    /// Analyze agent output and decide what happens next.
    ///
    /// Uses a cheap LLM call (max_tokens 200) and falls back to `continue` on
    /// any error.
    pub async fn evaluate(
        &self,
        agent_name: AgentName,
        output: &str,
        remaining_agents: &[AgentName],
        routing: &RoutingDecision,
    ) -> EvalDecision {
        let remaining = if remaining_agents.is_empty() {
            "none".to_string()
        } else {
            remaining_agents
                .iter()
                .map(|a| a.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let preview = if output.is_empty() {
            "(empty)"
        } else {
            truncate_chars(output, 1500)
        };

        let user_msg = format!(
            "Agent: {}\nIntent: {}\nRemaining agents: {}\nAgent output (preview):\n{}",
            agent_name, routing.intent, remaining, preview
        );

        let messages = [
            Message::text(Role::System, EVAL_PROMPT),
            Message::text(Role::User, user_msg),
        ];

        let reply = match self
            .client
            .send_message(&messages, None, ChatOptions::classification(200))
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("evaluator: call failed ({}), model {}", e, self.model);
                return EvalDecision::fallback("Evaluator fallback");
            }
        };

        match serde_json::from_str::<Value>(strip_code_fences(&reply.content)) {
            Ok(data) => parse_eval_decision(&data),
            Err(_) => EvalDecision::fallback("Evaluator fallback"),
        }
    }
}

/// Validate and normalize the evaluator's decision.
pub(crate) fn parse_eval_decision(data: &Value) -> EvalDecision {
    let mut action = data
        .get("action")
        .and_then(Value::as_str)
        .and_then(EvalAction::parse)
        .unwrap_or(EvalAction::Continue);

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

    // Targets outside the valid set are cleared.
    let target_agent = data
        .get("target_agent")
        .and_then(Value::as_str)
        .and_then(AgentName::parse);

    // loop_back and add_agent require a target.
    if matches!(action, EvalAction::LoopBack | EvalAction::AddAgent) && target_agent.is_none() {
        action = EvalAction::Continue;
        if reason.is_empty() {
            reason = "No target agent specified, continuing".to_string();
        }
    }

    EvalDecision {
        action,
        reason,
        target_agent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_action_becomes_continue() {
        let decision = parse_eval_decision(&json!({"action": "retreat", "reason": "?"}));
        assert_eq!(decision.action, EvalAction::Continue);
    }

    #[test]
    fn loop_back_without_target_becomes_continue() {
        let decision = parse_eval_decision(&json!({
            "action": "loop_back",
            "reason": "",
            "target_agent": "",
        }));
        assert_eq!(decision.action, EvalAction::Continue);
        assert_eq!(decision.reason, "No target agent specified, continuing");
    }

    #[test]
    fn invalid_target_is_cleared() {
        let decision = parse_eval_decision(&json!({
            "action": "add_agent",
            "reason": "bring in the wizard",
            "target_agent": "wizard",
        }));
        // Cleared target turns the add into a continue.
        assert_eq!(decision.action, EvalAction::Continue);
        assert_eq!(decision.target_agent, None);
    }

    #[test]
    fn valid_loop_back_is_preserved() {
        let decision = parse_eval_decision(&json!({
            "action": "loop_back",
            "reason": "zero results, broaden the search",
            "target_agent": "scout",
        }));
        assert_eq!(decision.action, EvalAction::LoopBack);
        assert_eq!(decision.target_agent, Some(AgentName::Scout));
    }

    #[test]
    fn reason_is_clamped() {
        let long = "x".repeat(400);
        let decision = parse_eval_decision(&json!({"action": "stop", "reason": long}));
        assert_eq!(decision.reason.chars().count(), 200);
    }
}
