mod common;

use caravel::caravel::agent::AgentName;
use caravel::caravel::config::CoreConfig;
use caravel::caravel::evaluator::{EvalAction, PipelineEvaluator};
use caravel::caravel::router::{Intent, IntentRouter, RoutingDecision};
use common::*;
use std::sync::Arc;

#[tokio::test]
async fn unreachable_classifier_falls_back_to_general_chat() {
    init_logging();
    let router = IntentRouter::new(Arc::new(UnreachableClient), &CoreConfig::default());
    let decision = router.route("find me a job", false, false).await;

    assert_eq!(decision.intent, Intent::GeneralChat);
    assert!(decision.agents.is_empty());
}

#[tokio::test]
async fn malformed_json_falls_back_to_general_chat() {
    init_logging();
    let client = Arc::new(ScriptedClient::new());
    client.set_routing("this is not json at all");

    let router = IntentRouter::new(client, &CoreConfig::default());
    let decision = router.route("find me a job", false, false).await;

    assert_eq!(decision.intent, Intent::GeneralChat);
    assert!(decision.agents.is_empty());
}

#[tokio::test]
async fn fenced_replies_are_unwrapped_before_parsing() {
    init_logging();
    let client = Arc::new(ScriptedClient::new());
    client.set_routing(
        "```json\n{\"intent\": \"job_search\", \"agents\": [\"scout\"], \
         \"reasoning\": \"user wants jobs\"}\n```",
    );

    let router = IntentRouter::new(client, &CoreConfig::default());
    let decision = router.route("find me remote jobs", true, false).await;

    assert_eq!(decision.intent, Intent::JobSearch);
    assert_eq!(decision.agents, vec![AgentName::Scout]);
    assert_eq!(decision.reasoning, "user wants jobs");
}

#[tokio::test]
async fn unreachable_evaluator_defaults_to_continue() {
    init_logging();
    let evaluator = PipelineEvaluator::new(Arc::new(UnreachableClient), &CoreConfig::default());
    let routing = RoutingDecision::fallback("test");
    let decision = evaluator
        .evaluate(AgentName::Scout, "some output", &[], &routing)
        .await;

    assert_eq!(decision.action, EvalAction::Continue);
}

#[tokio::test]
async fn malformed_evaluator_reply_defaults_to_continue() {
    init_logging();
    let client = Arc::new(ScriptedClient::new());
    client.push_eval_reply("definitely { not json");

    let evaluator = PipelineEvaluator::new(client, &CoreConfig::default());
    let routing = RoutingDecision::fallback("test");
    let decision = evaluator
        .evaluate(AgentName::Scout, "some output", &[AgentName::Match], &routing)
        .await;

    assert_eq!(decision.action, EvalAction::Continue);
}
