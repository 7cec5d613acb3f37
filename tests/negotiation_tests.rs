mod common;

use caravel::caravel::negotiation::{ConflictDetector, ConflictTopic, NegotiationSession};
use caravel::caravel::protocol::{AgentMessage, MessageBus, MessageKind, Payload};
use caravel::caravel::memstore::InMemoryStore;
use common::*;
use std::sync::Arc;

fn bus_with_divergent_responses() -> Arc<MessageBus> {
    let bus = Arc::new(MessageBus::new());
    bus.send(AgentMessage::new(
        "scout",
        "orchestrator",
        Payload::Response {
            output: "This company is an excellent match, strong culture, ideal role.".to_string(),
            confidence: 0.9,
            needs_more_data: false,
        },
    ));
    bus.send(AgentMessage::new(
        "match",
        "orchestrator",
        Payload::Response {
            output: "The skills overlap is thin and the seniority looks off.".to_string(),
            confidence: 0.4,
            needs_more_data: false,
        },
    ));
    bus
}

#[tokio::test]
async fn divergent_confidences_trigger_a_bounded_debate() {
    init_logging();
    let bus = bus_with_divergent_responses();

    let conflicts = ConflictDetector::new().detect(&bus);
    assert_eq!(conflicts.len(), 1);
    let conflict = conflicts.into_iter().next().unwrap();
    assert_eq!(conflict.topic, ConflictTopic::ConfidenceDivergence);

    let client = Arc::new(ScriptedClient::new());
    // Round 1: both hold their positions far apart.
    client.push_debate_reply(
        r#"{"response_type": "position", "position": "great fit", "evidence": "culture", "confidence": 0.9}"#,
    );
    client.push_debate_reply(
        r#"{"response_type": "position", "position": "weak fit", "evidence": "skills gap", "confidence": 0.4}"#,
    );
    // Round 2: match concedes.
    client.push_debate_reply(
        r#"{"response_type": "position", "position": "great fit", "evidence": "culture", "confidence": 0.9}"#,
    );
    client.push_debate_reply(
        r#"{"response_type": "concede", "position": "deferring to scout", "evidence": "", "confidence": 0.5}"#,
    );

    let store = Arc::new(InMemoryStore::new());
    let mut session = NegotiationSession::new(conflict, bus.clone(), client)
        .with_store(store.clone())
        .with_conversation(Some(11));
    let consensus = session.run().await;

    assert!(consensus.reached);
    assert_eq!(consensus.rounds_taken, 2);
    assert!(consensus.rounds_taken <= 3);
    assert_eq!(consensus.position, "great fit");
    assert_eq!(consensus.dissenting_views.len(), 1);

    // The session and at least two rounds were persisted.
    let sessions = store.negotiation_sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].topic, "confidence_divergence");
    assert_eq!(sessions[0].consensus_reached, Some(true));
    assert!(store.negotiation_rounds().len() >= 2);

    // Debate positions were posted to the bus.
    let debate_msgs = bus.debate_messages();
    assert!(debate_msgs
        .iter()
        .all(|m| m.kind() == MessageKind::DebatePosition));
    assert_eq!(debate_msgs.len(), 4);
}

#[tokio::test]
async fn stubborn_agents_end_without_consensus() {
    init_logging();
    let bus = bus_with_divergent_responses();
    let conflict = ConflictDetector::new().detect(&bus).remove(0);

    let client = Arc::new(ScriptedClient::new());
    for _ in 0..3 {
        client.push_debate_reply(
            r#"{"response_type": "counter", "position": "scout stands firm", "evidence": "data", "confidence": 0.9}"#,
        );
        client.push_debate_reply(
            r#"{"response_type": "counter", "position": "match stands firm", "evidence": "data", "confidence": 0.4}"#,
        );
    }

    let store = Arc::new(InMemoryStore::new());
    let mut session = NegotiationSession::new(conflict, bus, client)
        .with_store(store.clone());
    let consensus = session.run().await;

    assert!(!consensus.reached);
    assert_eq!(consensus.rounds_taken, 3);
    // Highest-confidence final position wins; the other view is preserved.
    assert_eq!(consensus.position, "scout stands firm");
    assert_eq!(consensus.dissenting_views.len(), 1);
    assert!(consensus.dissenting_views[0].starts_with("match:"));

    let sessions = store.negotiation_sessions();
    assert_eq!(sessions[0].consensus_reached, Some(false));
    assert_eq!(store.negotiation_rounds().len(), 6);
}

#[tokio::test]
async fn unreachable_debate_llm_degrades_to_original_outputs() {
    init_logging();
    let bus = bus_with_divergent_responses();
    let conflict = ConflictDetector::new().detect(&bus).remove(0);

    let mut session = NegotiationSession::new(conflict, bus, Arc::new(UnreachableClient));
    let consensus = session.run().await;

    // Every position falls back to confidence 0.5, which converges
    // immediately under the 0.15 spread rule.
    assert!(consensus.reached);
    assert_eq!(consensus.rounds_taken, 1);
}
