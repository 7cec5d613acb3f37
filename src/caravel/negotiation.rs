//! Conflict detection and structured negotiation between agents.
//!
//! When two agents produce conflicting outputs, a bounded debate resolves
//! the disagreement:
//!
//! - **Round 1 (Opening):** each agent states position + evidence + confidence
//! - **Round 2 (Rebuttal):** agents may concede, counter, or request data
//! - **Round 3 (Final):** definitive positions if no consensus yet
//!
//! Consensus rules, checked after every round:
//! - every position is a concession → done
//! - confidence spread within 0.15 → done
//! - at least one concession alongside holdouts → done, conceders recorded
//!   as dissenting
//! - otherwise the debate continues; after round 3 the highest-confidence
//!   final position wins without consensus, dissenters preserved
//!
//! The sentiment lexicon is deliberately tiny and keyword-based; the
//! detector contract (first conflict only, 0.3 confidence gap, 3-keyword
//! threshold) is what matters.

use crate::caravel::client_wrapper::{ChatOptions, ClientWrapper, Message, Role, ToolChoice};
use crate::caravel::event::{emit_to, DispatchEvent, EventSink};
use crate::caravel::protocol::{AgentMessage, MessageBus, Payload};
use crate::caravel::prompts::DEBATE_SYSTEM_PROMPT;
use crate::caravel::store::NegotiationStore;
use crate::caravel::util::{percent, strip_code_fences, truncate_chars};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Positive-sentiment keywords for contradiction detection.
pub const POSITIVE_KEYWORDS: [&str; 8] = [
    "excellent",
    "strong",
    "great",
    "perfect",
    "ideal",
    "recommended",
    "top",
    "best",
];

/// Negative-sentiment keywords for contradiction detection.
pub const NEGATIVE_KEYWORDS: [&str; 8] = [
    "poor", "weak", "bad", "avoid", "risky", "unlikely", "mismatch", "low",
];

/// What kind of disagreement the detector found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictTopic {
    ConfidenceDivergence,
    SentimentContradiction,
}

impl ConflictTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictTopic::ConfidenceDivergence => "confidence_divergence",
            ConflictTopic::SentimentContradiction => "sentiment_contradiction",
        }
    }
}

/// A detected conflict between two agent outputs.
#[derive(Debug, Clone)]
pub struct Conflict {
    /// The two disagreeing agent identifiers.
    pub agents: [String; 2],
    pub topic: ConflictTopic,
    pub details: String,
    pub confidence_gap: f64,
}

/// Scans MessageBus responses to detect conflicts between agents.
#[derive(Debug, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    pub const CONFIDENCE_THRESHOLD: f64 = 0.3;
    pub const SENTIMENT_THRESHOLD: usize = 3;

    pub fn new() -> Self {
        Self
    }

    /// Scan all agent responses pairwise for conflicting outputs.
    ///
    /// The caller processes at most the first conflict per dispatch.
    pub fn detect(&self, bus: &MessageBus) -> Vec<Conflict> {
        let responses = bus.responses();
        if responses.len() < 2 {
            return Vec::new();
        }

        let mut conflicts = Vec::new();
        for i in 0..responses.len() {
            for j in (i + 1)..responses.len() {
                if let Some(conflict) = self.check_pair(&responses[i], &responses[j]) {
                    conflicts.push(conflict);
                }
            }
        }
        conflicts
    }

    fn check_pair(&self, r1: &AgentMessage, r2: &AgentMessage) -> Option<Conflict> {
        let (o1, c1) = response_parts(r1)?;
        let (o2, c2) = response_parts(r2)?;

        let gap = (c1 - c2).abs();
        if gap > Self::CONFIDENCE_THRESHOLD {
            return Some(Conflict {
                agents: [r1.sender.clone(), r2.sender.clone()],
                topic: ConflictTopic::ConfidenceDivergence,
                details: format!(
                    "{} confidence {} vs {} confidence {}",
                    r1.sender,
                    percent(c1),
                    r2.sender,
                    percent(c2)
                ),
                confidence_gap: gap,
            });
        }

        let o1 = o1.to_lowercase();
        let o2 = o2.to_lowercase();
        let pos1 = keyword_hits(&o1, &POSITIVE_KEYWORDS);
        let neg1 = keyword_hits(&o1, &NEGATIVE_KEYWORDS);
        let pos2 = keyword_hits(&o2, &POSITIVE_KEYWORDS);
        let neg2 = keyword_hits(&o2, &NEGATIVE_KEYWORDS);

        let threshold = Self::SENTIMENT_THRESHOLD;
        if (pos1 >= threshold && neg2 >= threshold) || (neg1 >= threshold && pos2 >= threshold) {
            return Some(Conflict {
                agents: [r1.sender.clone(), r2.sender.clone()],
                topic: ConflictTopic::SentimentContradiction,
                details: format!(
                    "{} is {}, {} is {}",
                    r1.sender,
                    if pos1 > neg1 { "positive" } else { "negative" },
                    r2.sender,
                    if pos2 > neg2 { "positive" } else { "negative" }
                ),
                confidence_gap: 0.0,
            });
        }

        None
    }
}

fn response_parts(msg: &AgentMessage) -> Option<(&str, f64)> {
    match &msg.payload {
        Payload::Response {
            output, confidence, ..
        } => Some((output.as_str(), *confidence)),
        _ => None,
    }
}

fn keyword_hits(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| text.contains(*kw)).count()
}

/// How an agent responds within a negotiation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Position,
    Concede,
    Counter,
    RequestData,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Position => "position",
            ResponseType::Concede => "concede",
            ResponseType::Counter => "counter",
            ResponseType::RequestData => "request_data",
        }
    }

    /// Parse a response-type tag, defaulting to `position`.
    pub fn parse_or_position(tag: &str) -> Self {
        match tag {
            "concede" => ResponseType::Concede,
            "counter" => ResponseType::Counter,
            "request_data" => ResponseType::RequestData,
            _ => ResponseType::Position,
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An agent's stance in one negotiation round.
#[derive(Debug, Clone)]
pub struct AgentPosition {
    pub agent_name: String,
    pub response_type: ResponseType,
    pub position: String,
    pub evidence: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Outcome of a negotiation session.
#[derive(Debug, Clone)]
pub struct ConsensusResult {
    pub reached: bool,
    pub position: String,
    pub confidence: f64,
    pub dissenting_views: Vec<String>,
    pub rounds_taken: u32,
}

/// Runs a structured debate between conflicting agents.
pub struct NegotiationSession {
    conflict: Conflict,
    bus: Arc<MessageBus>,
    client: Arc<dyn ClientWrapper>,
    store: Option<Arc<dyn NegotiationStore>>,
    conversation_id: Option<i64>,
    sink: Option<Arc<dyn EventSink>>,
    /// Positions per round, in round order.
    positions: Vec<Vec<AgentPosition>>,
    session_id: Option<i64>,
}

impl NegotiationSession {
    pub const MAX_ROUNDS: u32 = 3;

    pub fn new(conflict: Conflict, bus: Arc<MessageBus>, client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            conflict,
            bus,
            client,
            store: None,
            conversation_id: None,
            sink: None,
            positions: Vec::new(),
            session_id: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn NegotiationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_conversation(mut self, conversation_id: Option<i64>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Execute the negotiation and return the consensus result.
    ///
    /// Round positions are posted to the bus as `debate_position` messages,
    /// streamed as `NegotiationRound` events, and persisted per round.
    pub async fn run(&mut self) -> ConsensusResult {
        if let Some(store) = &self.store {
            match store
                .create_session(
                    self.conversation_id,
                    self.conflict.topic.as_str(),
                    &self.conflict.agents,
                )
                .await
            {
                Ok(id) => self.session_id = Some(id),
                Err(e) => log::warn!("negotiation: session create failed: {}", e),
            }
        }

        // Original outputs of the conflicting agents, clamped for prompts.
        let mut agent_outputs: Vec<(String, String)> = Vec::new();
        for resp in self.bus.responses() {
            if self.conflict.agents.contains(&resp.sender) {
                if let Payload::Response { output, .. } = &resp.payload {
                    agent_outputs
                        .push((resp.sender.clone(), truncate_chars(output, 2000).to_string()));
                }
            }
        }

        for round_num in 1..=Self::MAX_ROUNDS {
            let round_positions = self.run_round(round_num, &agent_outputs).await;
            self.positions.push(round_positions);

            if let Some(consensus) = self.check_consensus() {
                self.complete_session(true, &consensus.position).await;
                return consensus;
            }
        }

        self.resolve_no_consensus().await
    }

    /// Run one round, collecting each conflicting agent's position.
    async fn run_round(
        &mut self,
        round_num: u32,
        agent_outputs: &[(String, String)],
    ) -> Vec<AgentPosition> {
        let agents = self.conflict.agents.clone();
        let mut positions = Vec::new();

        for agent_name in agents.iter() {
            let output = agent_outputs
                .iter()
                .find(|(name, _)| name == agent_name)
                .map(|(_, output)| output.as_str())
                .unwrap_or("");

            let position = self.get_agent_position(agent_name, output, round_num).await;

            if let Some(store) = &self.store {
                if let Some(session_id) = self.session_id {
                    if let Err(e) = store
                        .add_round(
                            session_id,
                            round_num,
                            &position.agent_name,
                            position.response_type.as_str(),
                            &position.position,
                            &position.evidence,
                            position.confidence,
                        )
                        .await
                    {
                        log::warn!("negotiation: round write failed: {}", e);
                    }
                }
            }

            self.bus.send(AgentMessage::new(
                position.agent_name.clone(),
                "negotiator",
                Payload::DebatePosition {
                    round: round_num,
                    agent: position.agent_name.clone(),
                    response_type: position.response_type,
                    position: truncate_chars(&position.position, 500).to_string(),
                    confidence: position.confidence,
                },
            ));

            emit_to(
                self.sink.as_ref(),
                DispatchEvent::NegotiationRound {
                    round: round_num,
                    agent: position.agent_name.clone(),
                    response_type: position.response_type.as_str().to_string(),
                    position: truncate_chars(&position.position, 500).to_string(),
                    confidence: position.confidence,
                },
            )
            .await;

            positions.push(position);
        }

        positions
    }

    /// Ask the LLM to formulate an agent's position for the debate.
    ///
    /// Any transport or parse failure degrades to a plain `position` echoing
    /// the agent's original output at confidence 0.5.
    async fn get_agent_position(
        &self,
        agent_name: &str,
        output: &str,
        round_num: u32,
    ) -> AgentPosition {
        let round_label = match round_num {
            1 => "Opening",
            2 => "Rebuttal",
            3 => "Final Position",
            _ => "Position",
        };

        let mut prev_context = String::new();
        for (prev_round, prev_positions) in self.positions.iter().enumerate() {
            for pos in prev_positions {
                if pos.agent_name != agent_name {
                    prev_context.push_str(&format!(
                        "\nRound {} - {}: [{}] {}",
                        prev_round + 1,
                        pos.agent_name,
                        pos.response_type,
                        truncate_chars(&pos.position, 300)
                    ));
                }
            }
        }

        let mut prompt = format!(
            "You are the {} agent in a structured debate about: {}\n\n\
             Your analysis output was:\n{}\n",
            agent_name,
            self.conflict.details,
            truncate_chars(output, 1500)
        );
        if !prev_context.is_empty() {
            prompt.push_str(&format!("\nPrevious debate positions:{}\n", prev_context));
        }
        prompt.push_str(&format!("\nThis is Round {} ({}).\n", round_num, round_label));
        match round_num {
            1 => prompt
                .push_str("State your position, provide evidence, and assign a confidence score.\n"),
            2 => prompt.push_str(
                "You may CONCEDE (agree with the other agent), COUNTER (provide \
                 counter-arguments), or REQUEST_DATA (ask for more information).\n",
            ),
            3 => prompt.push_str("State your FINAL position clearly.\n"),
            _ => {}
        }
        prompt.push_str(
            "\nRespond with JSON only:\n\
             {\"response_type\": \"position|concede|counter|request_data\", \
             \"position\": \"your position\", \"evidence\": \"supporting evidence\", \
             \"confidence\": 0.0-1.0}",
        );

        let messages = [
            Message::text(Role::System, DEBATE_SYSTEM_PROMPT),
            Message::text(Role::User, prompt),
        ];
        let options = ChatOptions {
            max_tokens: 300,
            temperature: 0.3,
            tool_choice: ToolChoice::None,
        };

        let fallback = || AgentPosition {
            agent_name: agent_name.to_string(),
            response_type: ResponseType::Position,
            position: truncate_chars(output, 500).to_string(),
            evidence: String::new(),
            confidence: 0.5,
        };

        let reply = match self.client.send_message(&messages, None, options).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("negotiation: position call failed for {}: {}", agent_name, e);
                return fallback();
            }
        };

        let data: Value = match serde_json::from_str(strip_code_fences(&reply.content)) {
            Ok(data) => data,
            Err(_) => return fallback(),
        };

        AgentPosition {
            agent_name: agent_name.to_string(),
            response_type: data
                .get("response_type")
                .and_then(Value::as_str)
                .map(ResponseType::parse_or_position)
                .unwrap_or(ResponseType::Position),
            position: data
                .get("position")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            evidence: data
                .get("evidence")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            confidence: parse_confidence(data.get("confidence")),
        }
    }

    /// Check whether the latest round produced consensus.
    fn check_consensus(&self) -> Option<ConsensusResult> {
        let current = self.positions.last()?;
        if current.is_empty() {
            return None;
        }
        let rounds_taken = self.positions.len() as u32;

        // Everyone conceded: the winning position is the highest-confidence
        // non-concession from the most recent round that still had one, or
        // the current highest when no round did.
        if current.iter().all(|p| p.response_type == ResponseType::Concede) {
            let winner = self
                .positions
                .iter()
                .rev()
                .find_map(|round| {
                    let holdouts: Vec<&AgentPosition> = round
                        .iter()
                        .filter(|p| p.response_type != ResponseType::Concede)
                        .collect();
                    max_by_confidence(&holdouts).cloned()
                })
                .or_else(|| max_by_confidence(&current.iter().collect::<Vec<_>>()).cloned())?;
            return Some(ConsensusResult {
                reached: true,
                position: winner.position.clone(),
                confidence: winner.confidence,
                dissenting_views: Vec::new(),
                rounds_taken,
            });
        }

        // Confidence convergence within 0.15.
        let confidences: Vec<f64> = current.iter().map(|p| p.confidence).collect();
        let max = confidences.iter().cloned().fold(f64::MIN, f64::max);
        let min = confidences.iter().cloned().fold(f64::MAX, f64::min);
        if max - min <= 0.15 {
            let winner = max_by_confidence(&current.iter().collect::<Vec<_>>())?;
            let mean = confidences.iter().sum::<f64>() / confidences.len() as f64;
            return Some(ConsensusResult {
                reached: true,
                position: winner.position.clone(),
                confidence: mean,
                dissenting_views: Vec::new(),
                rounds_taken,
            });
        }

        // Partial concession: holdout with the highest confidence wins,
        // conceders recorded as dissenting.
        let conceding: Vec<&AgentPosition> = current
            .iter()
            .filter(|p| p.response_type == ResponseType::Concede)
            .collect();
        let holdouts: Vec<&AgentPosition> = current
            .iter()
            .filter(|p| p.response_type != ResponseType::Concede)
            .collect();
        if !conceding.is_empty() && !holdouts.is_empty() {
            let winner = max_by_confidence(&holdouts)?;
            return Some(ConsensusResult {
                reached: true,
                position: winner.position.clone(),
                confidence: winner.confidence,
                dissenting_views: conceding
                    .iter()
                    .map(|p| {
                        format!(
                            "{} conceded: {}",
                            p.agent_name,
                            truncate_chars(&p.position, 200)
                        )
                    })
                    .collect(),
                rounds_taken,
            });
        }

        None
    }

    /// Resolve when max rounds are reached without consensus: the
    /// highest-confidence final-round position wins, dissenters preserved.
    async fn resolve_no_consensus(&self) -> ConsensusResult {
        let rounds_taken = self.positions.len() as u32;
        let last_round = match self.positions.last() {
            Some(round) if !round.is_empty() => round,
            _ => {
                return ConsensusResult {
                    reached: false,
                    position: "No positions recorded".to_string(),
                    confidence: 0.5,
                    dissenting_views: Vec::new(),
                    rounds_taken,
                }
            }
        };

        let winner = match max_by_confidence(&last_round.iter().collect::<Vec<_>>()) {
            Some(winner) => winner.clone(),
            None => {
                return ConsensusResult {
                    reached: false,
                    position: "No positions recorded".to_string(),
                    confidence: 0.5,
                    dissenting_views: Vec::new(),
                    rounds_taken,
                }
            }
        };
        let dissenting_views = last_round
            .iter()
            .filter(|p| p.agent_name != winner.agent_name)
            .map(|p| format!("{}: {}", p.agent_name, truncate_chars(&p.position, 200)))
            .collect();

        self.complete_session(false, &winner.position).await;

        ConsensusResult {
            reached: false,
            position: winner.position,
            confidence: winner.confidence,
            dissenting_views,
            rounds_taken,
        }
    }

    async fn complete_session(&self, consensus_reached: bool, final_position: &str) {
        if let (Some(store), Some(session_id)) = (&self.store, self.session_id) {
            if let Err(e) = store
                .complete_session(session_id, consensus_reached, final_position)
                .await
            {
                log::warn!("negotiation: session completion failed: {}", e);
            }
        }
    }
}

fn parse_confidence(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.5),
        Some(Value::String(s)) => s.parse().unwrap_or(0.5),
        _ => 0.5,
    }
}

fn max_by_confidence<'a>(positions: &[&'a AgentPosition]) -> Option<&'a AgentPosition> {
    positions
        .iter()
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(Ordering::Equal)
        })
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caravel::protocol::MessageBus;

    fn respond(bus: &MessageBus, sender: &str, output: &str, confidence: f64) {
        bus.send(AgentMessage::new(
            sender,
            "orchestrator",
            Payload::Response {
                output: output.to_string(),
                confidence,
                needs_more_data: false,
            },
        ));
    }

    #[test]
    fn detects_confidence_divergence() {
        let bus = MessageBus::new();
        respond(&bus, "scout", "found several roles", 0.9);
        respond(&bus, "match", "analysis done", 0.4);

        let conflicts = ConflictDetector::new().detect(&bus);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].topic, ConflictTopic::ConfidenceDivergence);
        assert!((conflicts[0].confidence_gap - 0.5).abs() < 1e-9);
    }

    #[test]
    fn detects_sentiment_contradiction() {
        let bus = MessageBus::new();
        respond(
            &bus,
            "scout",
            "This is an excellent, strong, ideal opportunity",
            0.8,
        );
        respond(
            &bus,
            "match",
            "The fit looks poor and weak, better to avoid",
            0.8,
        );

        let conflicts = ConflictDetector::new().detect(&bus);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].topic, ConflictTopic::SentimentContradiction);
    }

    #[test]
    fn no_conflict_below_thresholds() {
        let bus = MessageBus::new();
        respond(&bus, "scout", "found jobs", 0.8);
        respond(&bus, "match", "great strong analysis", 0.7);

        assert!(ConflictDetector::new().detect(&bus).is_empty());
    }

    #[test]
    fn fewer_than_two_responses_never_conflict() {
        let bus = MessageBus::new();
        respond(&bus, "scout", "found jobs", 0.1);
        assert!(ConflictDetector::new().detect(&bus).is_empty());
    }

    fn position(agent: &str, rt: ResponseType, conf: f64) -> AgentPosition {
        AgentPosition {
            agent_name: agent.to_string(),
            response_type: rt,
            position: format!("{} position", agent),
            evidence: String::new(),
            confidence: conf,
        }
    }

    fn session_with_rounds(rounds: Vec<Vec<AgentPosition>>) -> NegotiationSession {
        struct DeadClient;
        #[async_trait::async_trait]
        impl ClientWrapper for DeadClient {
            async fn send_message(
                &self,
                _messages: &[Message],
                _tools: Option<Vec<crate::caravel::client_wrapper::ToolDefinition>>,
                _options: ChatOptions,
            ) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
                Err("unreachable".into())
            }
            fn model_name(&self) -> &str {
                "dead"
            }
        }

        let mut session = NegotiationSession::new(
            Conflict {
                agents: ["scout".to_string(), "match".to_string()],
                topic: ConflictTopic::ConfidenceDivergence,
                details: "test".to_string(),
                confidence_gap: 0.5,
            },
            Arc::new(MessageBus::new()),
            Arc::new(DeadClient),
        );
        session.positions = rounds;
        session
    }

    #[test]
    fn consensus_on_confidence_convergence() {
        let session = session_with_rounds(vec![vec![
            position("scout", ResponseType::Position, 0.8),
            position("match", ResponseType::Counter, 0.7),
        ]]);

        let consensus = session.check_consensus().expect("consensus");
        assert!(consensus.reached);
        assert_eq!(consensus.position, "scout position");
        assert!((consensus.confidence - 0.75).abs() < 1e-9);
        assert_eq!(consensus.rounds_taken, 1);
    }

    #[test]
    fn consensus_on_partial_concession() {
        let session = session_with_rounds(vec![vec![
            position("scout", ResponseType::Concede, 0.9),
            position("match", ResponseType::Counter, 0.6),
        ]]);

        let consensus = session.check_consensus().expect("consensus");
        assert!(consensus.reached);
        assert_eq!(consensus.position, "match position");
        assert_eq!(consensus.dissenting_views.len(), 1);
        assert!(consensus.dissenting_views[0].starts_with("scout conceded:"));
    }

    #[test]
    fn all_concede_picks_last_holdout() {
        let session = session_with_rounds(vec![
            vec![
                position("scout", ResponseType::Position, 0.9),
                position("match", ResponseType::Position, 0.4),
            ],
            vec![
                position("scout", ResponseType::Concede, 0.3),
                position("match", ResponseType::Concede, 0.2),
            ],
        ]);

        let consensus = session.check_consensus().expect("consensus");
        assert!(consensus.reached);
        // Highest-confidence non-concession from the previous round.
        assert_eq!(consensus.position, "scout position");
        assert_eq!(consensus.rounds_taken, 2);
    }

    #[test]
    fn holdout_spread_continues_the_debate() {
        let session = session_with_rounds(vec![vec![
            position("scout", ResponseType::Position, 0.9),
            position("match", ResponseType::Counter, 0.4),
        ]]);
        assert!(session.check_consensus().is_none());
    }

    #[tokio::test]
    async fn no_consensus_resolves_to_highest_confidence() {
        let mut session = session_with_rounds(vec![
            vec![
                position("scout", ResponseType::Position, 0.9),
                position("match", ResponseType::Counter, 0.4),
            ],
            vec![
                position("scout", ResponseType::Counter, 0.9),
                position("match", ResponseType::Counter, 0.4),
            ],
            vec![
                position("scout", ResponseType::Position, 0.85),
                position("match", ResponseType::Position, 0.45),
            ],
        ]);

        let result = session.resolve_no_consensus().await;
        assert!(!result.reached);
        assert_eq!(result.position, "scout position");
        assert_eq!(result.rounds_taken, 3);
        assert_eq!(result.dissenting_views.len(), 1);
        assert!(result.dissenting_views[0].starts_with("match:"));
    }
}
