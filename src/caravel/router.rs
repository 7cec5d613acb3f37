//! Intent classification and agent pipeline selection.
//!
//! The [`IntentRouter`] maps a free-text user message (plus resume/profile
//! availability) to a [`RoutingDecision`]: an intent from a closed set, an
//! ordered agent pipeline, and whatever context it recognized in the message.
//! It is invoked at most once per user request and never fails: an
//! unreachable classifier, malformed JSON, or an unknown intent all degrade
//! to `general_chat` with an empty pipeline.
//!
//! # Example
//!
//! ```rust
//! use caravel::caravel::agent::AgentName;
//! use caravel::caravel::router::{default_agents_for, Intent, RoutingDecision};
//!
//! assert_eq!(default_agents_for(Intent::JobSearch), &[AgentName::Scout]);
//! assert_eq!(default_agents_for(Intent::GeneralChat), &[] as &[AgentName]);
//!
//! let fallback = RoutingDecision::fallback("classifier unreachable");
//! assert_eq!(fallback.intent, Intent::GeneralChat);
//! assert!(fallback.agents.is_empty());
//! ```

use crate::caravel::agent::AgentName;
use crate::caravel::client_wrapper::{ChatOptions, ClientWrapper, Message, Role};
use crate::caravel::config::CoreConfig;
use crate::caravel::prompts::ROUTING_PROMPT;
use crate::caravel::util::strip_code_fences;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Closed set of user intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    JobSearch,
    AnalyzeMatch,
    WriteMaterials,
    InterviewPrep,
    MultiStep,
    GeneralChat,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::JobSearch => "job_search",
            Intent::AnalyzeMatch => "analyze_match",
            Intent::WriteMaterials => "write_materials",
            Intent::InterviewPrep => "interview_prep",
            Intent::MultiStep => "multi_step",
            Intent::GeneralChat => "general_chat",
        }
    }

    /// Parse an intent tag, returning `None` for anything outside the set.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "job_search" => Some(Intent::JobSearch),
            "analyze_match" => Some(Intent::AnalyzeMatch),
            "write_materials" => Some(Intent::WriteMaterials),
            "interview_prep" => Some(Intent::InterviewPrep),
            "multi_step" => Some(Intent::MultiStep),
            "general_chat" => Some(Intent::GeneralChat),
            _ => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The default agent pipeline for an intent, applied when the classifier
/// names an intent but omits the agents.  Idempotent by construction.
pub fn default_agents_for(intent: Intent) -> &'static [AgentName] {
    match intent {
        Intent::JobSearch => &[AgentName::Scout],
        Intent::AnalyzeMatch => &[AgentName::Match],
        Intent::WriteMaterials => &[AgentName::Match, AgentName::Forge],
        Intent::InterviewPrep => &[AgentName::Coach],
        Intent::MultiStep => &[
            AgentName::Scout,
            AgentName::Match,
            AgentName::Forge,
            AgentName::Coach,
        ],
        Intent::GeneralChat => &[],
    }
}

/// Context the classifier recognized inside the user message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContext {
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub has_jd: bool,
}

/// Result of classifying a user message into an intent + agent pipeline.
///
/// Immutable after construction.  Invariant: `general_chat` implies an empty
/// agent sequence; every other intent implies a non-empty one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub intent: Intent,
    pub agents: Vec<AgentName>,
    #[serde(default)]
    pub extracted_context: ExtractedContext,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub needs_resume: bool,
    #[serde(default)]
    pub needs_profile: bool,
}

impl RoutingDecision {
    /// The `general_chat` fallback used whenever classification fails.
    pub fn fallback(reasoning: impl Into<String>) -> Self {
        Self {
            intent: Intent::GeneralChat,
            agents: Vec::new(),
            extracted_context: ExtractedContext::default(),
            reasoning: reasoning.into(),
            needs_resume: false,
            needs_profile: false,
        }
    }

    /// A single-agent decision, used by the goal executor to route one step.
    pub fn single_agent(
        intent: Intent,
        agent: AgentName,
        extracted_context: ExtractedContext,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            intent,
            agents: vec![agent],
            extracted_context,
            reasoning: reasoning.into(),
            needs_resume: false,
            needs_profile: false,
        }
    }
}

/// Classifies user intent and determines which agents to dispatch.
pub struct IntentRouter {
    client: Arc<dyn ClientWrapper>,
    model: String,
}

impl IntentRouter {
    pub fn new(client: Arc<dyn ClientWrapper>, config: &CoreConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
        }
    }

    /// Classify user intent with a cheap, focused LLM call.
    ///
    /// Falls back to `general_chat` with no agents on any failure.
    pub async fn route(
        &self,
        message: &str,
        has_resume: bool,
        has_profile: bool,
    ) -> RoutingDecision {
        let mut context_hint = String::new();
        if has_resume {
            context_hint.push_str(" The user has a resume on file.");
        }
        if has_profile {
            context_hint.push_str(" The user has a profile set up.");
        }

        let messages = [
            Message::text(Role::System, ROUTING_PROMPT),
            Message::text(Role::User, format!("{}{}", message, context_hint)),
        ];

        let reply = match self
            .client
            .send_message(&messages, None, ChatOptions::classification(300))
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("router: classification call failed ({}), using {}", e, self.model);
                return RoutingDecision::fallback("Router fallback due to classification error");
            }
        };

        match serde_json::from_str::<Value>(strip_code_fences(&reply.content)) {
            Ok(data) => parse_routing_response(&data),
            Err(_) => RoutingDecision::fallback("Router fallback due to classification error"),
        }
    }
}

/// Validate and normalize the classifier's routing response.
pub(crate) fn parse_routing_response(data: &Value) -> RoutingDecision {
    let intent = data
        .get("intent")
        .and_then(Value::as_str)
        .and_then(Intent::parse)
        .unwrap_or(Intent::GeneralChat);

    let mut agents: Vec<AgentName> = data
        .get("agents")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .filter_map(AgentName::parse)
                .collect()
        })
        .unwrap_or_default();

    // Intent-agent consistency: general_chat never dispatches; any other
    // intent without agents gets the default pipeline.
    if intent == Intent::GeneralChat {
        agents.clear();
    } else if agents.is_empty() {
        agents = default_agents_for(intent).to_vec();
    }

    let extracted_context = data
        .get("extracted_context")
        .map(parse_extracted_context)
        .unwrap_or_default();

    RoutingDecision {
        intent,
        agents,
        extracted_context,
        reasoning: data
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        needs_resume: data
            .get("needs_resume")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        needs_profile: data
            .get("needs_profile")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

fn parse_extracted_context(data: &Value) -> ExtractedContext {
    let non_empty_string = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    ExtractedContext {
        company: non_empty_string("company"),
        role: non_empty_string("role"),
        skills: data
            .get("skills")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        url: non_empty_string("url"),
        has_jd: data.get("has_jd").and_then(Value::as_bool).unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_unknown_intent_to_general_chat() {
        let decision = parse_routing_response(&json!({
            "intent": "world_domination",
            "agents": ["scout"],
        }));
        assert_eq!(decision.intent, Intent::GeneralChat);
        assert!(decision.agents.is_empty());
    }

    #[test]
    fn applies_default_pipeline_when_agents_missing() {
        let decision = parse_routing_response(&json!({
            "intent": "write_materials",
            "agents": [],
        }));
        assert_eq!(decision.agents, vec![AgentName::Match, AgentName::Forge]);
    }

    #[test]
    fn filters_invalid_agent_names() {
        let decision = parse_routing_response(&json!({
            "intent": "job_search",
            "agents": ["scout", "wizard"],
        }));
        assert_eq!(decision.agents, vec![AgentName::Scout]);
    }

    #[test]
    fn coerces_extracted_context() {
        let decision = parse_routing_response(&json!({
            "intent": "analyze_match",
            "agents": ["match"],
            "extracted_context": {
                "company": "Acme",
                "role": null,
                "skills": ["rust", "tokio"],
                "url": "",
                "has_jd": true,
            },
            "needs_resume": true,
        }));
        let ctx = &decision.extracted_context;
        assert_eq!(ctx.company.as_deref(), Some("Acme"));
        assert_eq!(ctx.role, None);
        assert_eq!(ctx.skills, vec!["rust", "tokio"]);
        assert_eq!(ctx.url, None);
        assert!(ctx.has_jd);
        assert!(decision.needs_resume);
    }

    #[test]
    fn default_mapping_is_idempotent() {
        for intent in [
            Intent::JobSearch,
            Intent::AnalyzeMatch,
            Intent::WriteMaterials,
            Intent::InterviewPrep,
            Intent::MultiStep,
        ] {
            let once = default_agents_for(intent).to_vec();
            // A decision that already carries the defaults is left untouched.
            let decision = parse_routing_response(&json!({
                "intent": intent.as_str(),
                "agents": once.iter().map(|a| a.as_str()).collect::<Vec<_>>(),
            }));
            assert_eq!(decision.agents, once);
        }
    }

    #[test]
    fn decision_survives_json_round_trip() {
        let decision = parse_routing_response(&json!({
            "intent": "multi_step",
            "agents": ["scout", "match"],
            "extracted_context": {"company": "Acme", "skills": ["go"], "has_jd": false},
            "reasoning": "end-to-end request",
            "needs_resume": true,
            "needs_profile": false,
        }));

        let encoded = serde_json::to_string(&decision).unwrap();
        let decoded: RoutingDecision = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.intent, decision.intent);
        assert_eq!(decoded.agents, decision.agents);
        assert_eq!(decoded.extracted_context, decision.extracted_context);
        assert_eq!(decoded.needs_resume, decision.needs_resume);
    }
}
