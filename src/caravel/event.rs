//! Dispatch event stream and cooperative cancellation.
//!
//! The orchestration core is framing-neutral: it emits typed
//! [`DispatchEvent`]s to an [`EventSink`] and the transport layer encodes
//! them however it wishes (SSE, WebSocket frames, logs).  Where a transport
//! prefers channels over callbacks, [`ChannelSink`] bridges the two.
//!
//! Cancellation is cooperative.  The transport holds a [`CancelFlag`] clone
//! and sets it; the ReAct loop observes the flag at the top of each step and
//! the orchestrator/auto-executor between agents and goal steps.  In-flight
//! LLM or tool calls are never interrupted, which bounds cancellation latency
//! to one step's cost.
//!
//! # Example
//!
//! ```rust
//! use caravel::caravel::event::{CancelFlag, ChannelSink, DispatchEvent};
//!
//! let flag = CancelFlag::new();
//! assert!(!flag.is_cancelled());
//! flag.cancel();
//! assert!(flag.is_cancelled());
//!
//! let (sink, rx) = ChannelSink::new();
//! # let _ = (sink, rx);
//! ```

use crate::caravel::agent::AgentName;
use crate::caravel::router::Intent;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Cloneable cancellation flag shared between the transport and a dispatch.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.  Observed at the next step/agent boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Typed events produced while a dispatch (or goal auto-execution) runs.
///
/// Event order mirrors pipeline progress: `Routing` first, interleaved agent
/// and tool status while the pipeline advances, negotiation events when a
/// conflict is debated, `Content` chunks as the final response streams, and a
/// terminating `Done`.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// The routing decision for this request.
    Routing {
        intent: Intent,
        agents: Vec<AgentName>,
    },
    /// A tool is executing in the direct chat path.
    ToolStatus { tool: String, status: String },
    /// An agent started, completed, or failed.
    AgentStatus {
        agent: String,
        status: String,
        message: String,
    },
    /// One reasoning step of an agent, streamed as it happens.
    AgentReasoning {
        agent: String,
        thought: String,
        tool: String,
    },
    /// The pipeline evaluator made a decision after an agent run.
    Evaluator {
        decision: String,
        reason: String,
        target_agent: String,
    },
    /// Trace ids created during this dispatch, for feedback UIs.
    TraceIds { ids: Vec<i64> },
    /// One agent's stance in one negotiation round.
    NegotiationRound {
        round: u32,
        agent: String,
        response_type: String,
        position: String,
        confidence: f64,
    },
    /// Final outcome of a negotiation session.
    NegotiationResult {
        consensus_reached: bool,
        position: String,
        confidence: f64,
        dissenting_views: Vec<String>,
        rounds_taken: u32,
    },
    /// A chunk of the synthesized response.
    Content { text: String },
    /// A goal step is about to execute.
    GoalStepStarted {
        step_number: u32,
        title: String,
        agent: AgentName,
    },
    /// A goal step finished.
    GoalStepCompleted {
        step_number: u32,
        status: String,
        output_preview: String,
    },
    /// The auto-executor adjusted the plan between steps.
    GoalReplan { adjustment: String, reason: String },
    /// Goal auto-execution ended (`completed`, `partial`, `cancelled`, or
    /// `not_found`).
    GoalCompleted { status: String },
    /// The dispatch finished; no further events follow.
    Done { dispatch_id: String },
}

/// Receiver for [`DispatchEvent`]s.
///
/// The default implementation is a no-op so transports only implement what
/// they care about.  Sinks are shared as `Arc<dyn EventSink>` across the
/// orchestrator, agents, and negotiation sessions of one dispatch.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, _event: DispatchEvent) {}
}

/// No-op sink for callers that don't observe events.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {}

/// An [`EventSink`] that forwards every event into an unbounded channel.
///
/// Useful for transports structured around a receive loop; backpressure is
/// the receiver's concern.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DispatchEvent>,
}

impl ChannelSink {
    /// Create a sink plus the receiving half of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: DispatchEvent) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}

/// Emit an event through an optional sink.
pub(crate) async fn emit_to(sink: Option<&Arc<dyn EventSink>>, event: DispatchEvent) {
    if let Some(sink) = sink {
        sink.emit(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(DispatchEvent::Content {
            text: "hello".to_string(),
        })
        .await;

        match rx.recv().await {
            Some(DispatchEvent::Content { text }) => assert_eq!(text, "hello"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn cancel_flag_is_shared_across_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
