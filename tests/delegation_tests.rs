mod common;

use caravel::caravel::agent::Toolbox;
use caravel::caravel::config::CoreConfig;
use caravel::caravel::memstore::InMemoryStore;
use caravel::caravel::protocol::MessageBus;
use caravel::caravel::store::TraceStore;
use caravel::caravel::tool_protocol::Tool;
use caravel::caravel::tools::delegate::{DelegateContext, DelegateToAgentTool, MAX_DELEGATED_RUNS};
use common::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn delegate_tool(
    client: Arc<ScriptedClient>,
    store: Arc<InMemoryStore>,
    depth: usize,
    counter: Arc<AtomicUsize>,
) -> DelegateToAgentTool {
    DelegateToAgentTool::new(DelegateContext {
        client,
        config: CoreConfig::default(),
        toolbox: Toolbox::new(),
        user_id: Some(5),
        conversation_id: None,
        bus: Arc::new(MessageBus::new()),
        depth,
        counter,
        trace_store: Some(store),
        memory_store: None,
        cancel: None,
    })
}

#[tokio::test]
async fn five_delegations_succeed_then_the_sixth_is_refused() {
    init_logging();
    let client = Arc::new(ScriptedClient::new());
    for i in 0..MAX_DELEGATED_RUNS {
        client.push_agent_reply(text_reply(&format!("FINAL_ANSWER sub-result {}", i)));
    }

    let store = Arc::new(InMemoryStore::new());
    let counter = Arc::new(AtomicUsize::new(0));
    let tool = delegate_tool(client, store.clone(), 0, counter.clone());

    for i in 0..MAX_DELEGATED_RUNS {
        let result = tool
            .execute(json!({
                "agent_name": "match",
                "task_description": format!("analyze candidate {}", i),
            }))
            .await
            .unwrap();
        assert!(result.success, "delegation {} should succeed", i);
        assert_eq!(result.output["agent"], "match");
    }
    assert_eq!(counter.load(Ordering::SeqCst), MAX_DELEGATED_RUNS);

    let refused = tool
        .execute(json!({
            "agent_name": "match",
            "task_description": "one more",
        }))
        .await
        .unwrap();
    assert!(!refused.success);
    assert!(refused
        .error
        .as_deref()
        .unwrap()
        .starts_with("Delegation limit reached"));
    // The refused call did not bump the counter.
    assert_eq!(counter.load(Ordering::SeqCst), MAX_DELEGATED_RUNS);

    // Every delegated run was traced under the delegation intent.
    let traces = store.get_traces(5, 20).await.unwrap();
    assert_eq!(traces.len(), MAX_DELEGATED_RUNS);
    assert!(traces.iter().all(|t| t.intent == "delegation"));
}

#[tokio::test]
async fn sub_agents_cannot_delegate_further() {
    init_logging();
    let client = Arc::new(ScriptedClient::new());
    let store = Arc::new(InMemoryStore::new());
    let counter = Arc::new(AtomicUsize::new(0));
    let tool = delegate_tool(client, store, 1, counter.clone());

    let result = tool
        .execute(json!({
            "agent_name": "scout",
            "task_description": "find more jobs",
        }))
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.error.unwrap().contains("max depth 1"));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_agents_and_missing_fields_are_refused() {
    init_logging();
    let client = Arc::new(ScriptedClient::new());
    let store = Arc::new(InMemoryStore::new());
    let counter = Arc::new(AtomicUsize::new(0));
    let tool = delegate_tool(client, store, 0, counter.clone());

    let missing = tool.execute(json!({"agent_name": "scout"})).await.unwrap();
    assert!(!missing.success);

    let unknown = tool
        .execute(json!({"agent_name": "wizard", "task_description": "cast"}))
        .await
        .unwrap();
    assert!(!unknown.success);
    assert!(unknown.error.unwrap().contains("Unknown agent"));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}
