//! Structured agent communication protocol.
//!
//! Agents communicate via typed [`AgentMessage`] values through a
//! [`MessageBus`], replacing raw string concatenation with structured data
//! flow.  The payload is a tagged union discriminated by message kind, so a
//! `response` can never be confused with an `observation` at the type level.
//!
//! A bus is scoped to a single orchestrator dispatch: created at dispatch
//! start, shared (`Arc`) with the agents and the delegate tool for its
//! duration, and discarded at dispatch end.  It is append-only: messages
//! are never mutated or removed, and iteration order equals send order.

use crate::caravel::agent::AgentName;
use crate::caravel::evaluator::EvalAction;
use crate::caravel::negotiation::ResponseType;
use crate::caravel::router::Intent;
use crate::caravel::util::{percent, truncate_chars};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Discriminant of an [`AgentMessage`] payload, for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
    Observation,
    Delegate,
    Error,
    DebatePosition,
    Consensus,
}

/// Typed message body.  The schema of each variant is exactly the data that
/// kind of message carries; there is no free-form map underneath.
#[derive(Debug, Clone)]
pub enum Payload {
    /// User or orchestrator task request.
    Request { message: String, intent: Intent },
    /// Agent output with confidence.
    Response {
        output: String,
        confidence: f64,
        needs_more_data: bool,
    },
    /// Evaluator notes and status updates.
    Observation {
        note: String,
        action: Option<EvalAction>,
        target: Option<AgentName>,
    },
    /// Agent requesting the orchestrator to invoke another agent.
    Delegate { target_agent: AgentName, task: String },
    /// Agent failure report.
    Error { output: String },
    /// An agent's stance in one negotiation round.
    DebatePosition {
        round: u32,
        agent: String,
        response_type: ResponseType,
        position: String,
        confidence: f64,
    },
    /// Final consensus from a negotiation session.
    Consensus {
        reached: bool,
        position: String,
        confidence: f64,
        dissenting_views: Vec<String>,
        rounds_taken: u32,
    },
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Request { .. } => MessageKind::Request,
            Payload::Response { .. } => MessageKind::Response,
            Payload::Observation { .. } => MessageKind::Observation,
            Payload::Delegate { .. } => MessageKind::Delegate,
            Payload::Error { .. } => MessageKind::Error,
            Payload::DebatePosition { .. } => MessageKind::DebatePosition,
            Payload::Consensus { .. } => MessageKind::Consensus,
        }
    }
}

/// A typed message between agents or between an agent and the orchestrator.
///
/// Append-only: once sent, never modified.  `seq` is assigned by the bus on
/// send and increases monotonically within one dispatch.
#[derive(Debug, Clone)]
pub struct AgentMessage {
    /// Producing party: an agent name, `"user"`, `"orchestrator"`,
    /// `"evaluator"`, or `"negotiator"`.
    pub sender: String,
    /// Target party; `"orchestrator"` for routing-level messages.
    pub receiver: String,
    pub payload: Payload,
    /// Bus-assigned monotonically increasing sequence number.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    /// Optional link back to the persisted trace of the producing run.
    pub trace_id: Option<i64>,
}

impl AgentMessage {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            payload,
            seq: 0,
            timestamp: Utc::now(),
            trace_id: None,
        }
    }

    pub fn with_trace(mut self, trace_id: Option<i64>) -> Self {
        self.trace_id = trace_id;
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}

/// In-memory, append-only message log scoped to a single dispatch.
///
/// The log sits behind a mutex so the bus can be shared via `Arc` between
/// the orchestrator and the delegate tool; it is never shared across
/// dispatches.
#[derive(Debug, Default)]
pub struct MessageBus {
    messages: Mutex<Vec<AgentMessage>>,
    next_seq: AtomicU64,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a message to the bus, stamping its sequence number.
    pub fn send(&self, mut msg: AgentMessage) {
        msg.seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.messages
            .lock()
            .expect("message bus poisoned")
            .push(msg);
    }

    pub fn len(&self) -> usize {
        self.messages.lock().expect("message bus poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every message in send order.
    pub fn all_messages(&self) -> Vec<AgentMessage> {
        self.messages.lock().expect("message bus poisoned").clone()
    }

    fn filtered(&self, keep: impl Fn(&AgentMessage) -> bool) -> Vec<AgentMessage> {
        self.messages
            .lock()
            .expect("message bus poisoned")
            .iter()
            .filter(|m| keep(m))
            .cloned()
            .collect()
    }

    /// All messages addressed to a specific receiver.
    pub fn get_for(&self, receiver: &str) -> Vec<AgentMessage> {
        self.filtered(|m| m.receiver == receiver)
    }

    /// All observation messages (evaluator notes, status updates).
    pub fn observations(&self) -> Vec<AgentMessage> {
        self.filtered(|m| m.kind() == MessageKind::Observation)
    }

    /// All delegation requests.
    pub fn delegations(&self) -> Vec<AgentMessage> {
        self.filtered(|m| m.kind() == MessageKind::Delegate)
    }

    /// All response messages from agents.
    pub fn responses(&self) -> Vec<AgentMessage> {
        self.filtered(|m| m.kind() == MessageKind::Response)
    }

    /// All debate-related messages (positions and consensus).
    pub fn debate_messages(&self) -> Vec<AgentMessage> {
        self.filtered(|m| {
            matches!(
                m.kind(),
                MessageKind::DebatePosition | MessageKind::Consensus
            )
        })
    }

    /// Build a prompt-injectable context block from messages relevant to a
    /// receiver.
    ///
    /// Collects every `response` from senders other than `receiver` and every
    /// `observation`, formatted as structured context blocks.  Returns an
    /// empty string when no such messages exist.  Pure with respect to bus
    /// state: repeated calls on an unchanged bus yield identical output.
    pub fn context_for(&self, receiver: &str) -> String {
        let mut parts = Vec::new();

        for msg in self.messages.lock().expect("message bus poisoned").iter() {
            match &msg.payload {
                Payload::Response {
                    output, confidence, ..
                } if msg.sender != receiver && !output.is_empty() => {
                    parts.push(format!(
                        "--- {} AGENT RESULTS --- (confidence: {})\n{}",
                        msg.sender.to_uppercase(),
                        percent(*confidence),
                        output
                    ));
                }
                Payload::Observation { note, .. } => {
                    parts.push(format!("[Note] {}", note));
                }
                _ => {}
            }
        }

        if parts.is_empty() {
            return String::new();
        }

        format!("\n\nCONTEXT FROM PREVIOUS AGENTS:\n{}", parts.join("\n\n"))
    }

    /// Outputs of successful agents, truncated, for the "stopped early"
    /// partial summary.
    pub fn partial_outputs(&self, max_chars: usize) -> Vec<String> {
        self.responses()
            .iter()
            .filter_map(|m| match &m.payload {
                Payload::Response { output, .. } => {
                    Some(truncate_chars(output, max_chars).to_string())
                }
                _ => None,
            })
            .collect()
    }
}
