mod common;

use caravel::caravel::agent::{AgentName, Toolbox};
use caravel::caravel::config::CoreConfig;
use caravel::caravel::dispatch::DispatchSession;
use caravel::caravel::event::{ChannelSink, DispatchEvent, EventSink};
use caravel::caravel::memstore::InMemoryStore;
use caravel::caravel::orchestrator::DispatchOptions;
use caravel::caravel::router::Intent;
use caravel::caravel::store::GoalStore;
use caravel::caravel::tool_protocol::ToolRegistry;
use common::*;
use serde_json::json;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

fn drain(rx: &mut UnboundedReceiver<DispatchEvent>) -> Vec<DispatchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn general_chat_takes_the_direct_tool_path() {
    init_logging();
    let client = Arc::new(ScriptedClient::new());
    client.push_chat_reply(tool_reply("call_1", "search_jobs", r#"{"keywords": ["go"]}"#));
    client.push_chat_reply(text_reply("Here are a few roles worth a look."));

    let executions = Arc::new(AtomicUsize::new(0));
    let mut chat_registry = ToolRegistry::new();
    chat_registry.register(counting_tool(
        "search_jobs",
        json!({"jobs": ["one"], "count": 1}),
        executions.clone(),
    ));

    let (sink, mut rx) = ChannelSink::new();
    let session = DispatchSession::new(CoreConfig::default(), client)
        .with_chat_registry(Arc::new(chat_registry));
    let opts = DispatchOptions {
        sink: Some(Arc::new(sink) as Arc<dyn EventSink>),
        ..DispatchOptions::default()
    };
    let outcome = session.run("anything interesting out there?", &opts).await;

    assert_eq!(outcome.routing.intent, Intent::GeneralChat);
    assert!(outcome.results.is_empty());
    assert_eq!(outcome.response, "Here are a few roles worth a look.");

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(DispatchEvent::Routing { .. })));
    assert!(matches!(events.last(), Some(DispatchEvent::Done { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, DispatchEvent::ToolStatus { tool, .. } if tool == "search_jobs")));
    assert!(events
        .iter()
        .any(|e| matches!(e, DispatchEvent::Content { text } if text.contains("worth a look"))));
}

#[tokio::test]
async fn agent_dispatch_synthesizes_from_agent_outputs() {
    init_logging();
    let client = Arc::new(ScriptedClient::new());
    client.set_routing(
        r#"{"intent": "job_search", "agents": ["scout"],
            "extracted_context": {"role": "backend engineer", "skills": ["python"], "has_jd": false}}"#,
    );
    client.push_agent_reply(text_reply("FINAL_ANSWER 4 strong openings at Acme"));
    client.push_chat_reply(text_reply("I found four promising backend openings."));

    let store = Arc::new(InMemoryStore::new());
    let (sink, mut rx) = ChannelSink::new();
    let session = DispatchSession::new(CoreConfig::default(), client)
        .with_toolbox(Toolbox::new())
        .with_trace_store(store.clone());
    let opts = DispatchOptions {
        user_id: Some(8),
        sink: Some(Arc::new(sink) as Arc<dyn EventSink>),
        ..DispatchOptions::default()
    };
    let outcome = session.run("Find me remote Python backend jobs", &opts).await;

    assert_eq!(outcome.routing.intent, Intent::JobSearch);
    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.results[0].success);
    assert_eq!(outcome.response, "I found four promising backend openings.");

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(DispatchEvent::Routing { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, DispatchEvent::TraceIds { ids } if !ids.is_empty())));
    assert!(events.iter().any(
        |e| matches!(e, DispatchEvent::AgentStatus { agent, status, .. } if agent == "scout" && status == "complete")
    ));
    assert!(matches!(events.last(), Some(DispatchEvent::Done { .. })));
}

#[tokio::test]
async fn multi_step_requests_become_goal_plans() {
    init_logging();
    let client = Arc::new(ScriptedClient::new());
    client.set_routing(
        r#"{"intent": "multi_step", "agents": ["scout", "match", "forge", "coach"]}"#,
    );
    client.set_plan(
        r#"{
            "title": "Apply to Acme",
            "steps": [
                {"title": "Find the posting", "description": "search", "agent_name": "scout"},
                {"title": "Score the fit", "description": "analyze", "agent_name": "match"}
            ]
        }"#,
    );
    client.push_agent_reply(text_reply("FINAL_ANSWER found the posting"));
    client.push_chat_reply(text_reply("Plan created; the first step already ran."));

    let store = Arc::new(InMemoryStore::new());
    let (sink, mut rx) = ChannelSink::new();
    let session = DispatchSession::new(CoreConfig::default(), client)
        .with_goal_store(store.clone());
    let opts = DispatchOptions {
        user_id: Some(8),
        sink: Some(Arc::new(sink) as Arc<dyn EventSink>),
        ..DispatchOptions::default()
    };
    let outcome = session.run("Help me apply to the backend role at Acme", &opts).await;

    // Only the first planned step executed in this dispatch.
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].agent_name, AgentName::Scout);

    // The plan persisted with both steps.
    let steps = store.get_goal_steps(1).await.unwrap();
    assert_eq!(steps.len(), 2);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        DispatchEvent::AgentStatus { agent, message, .. }
            if agent == "planner" && message.contains("Created plan")
    )));
}

#[tokio::test]
async fn unreachable_classifier_falls_back_to_general_chat() {
    init_logging();
    let session = DispatchSession::new(CoreConfig::default(), Arc::new(UnreachableClient));
    let outcome = session.run("hello there", &DispatchOptions::default()).await;

    assert_eq!(outcome.routing.intent, Intent::GeneralChat);
    assert!(outcome.routing.agents.is_empty());
    // The direct path then fails closed with the short user-facing message.
    assert_eq!(
        outcome.response,
        caravel::caravel::dispatch::FAILURE_MESSAGE
    );
}
