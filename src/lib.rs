// src/lib.rs

// Import the top-level `caravel` module.
pub mod caravel;

// Re-exporting key items for easier external access.
pub use caravel::agent::{Agent, AgentName, Toolbox};
pub use caravel::client_wrapper::{ClientWrapper, Message, Role};
pub use caravel::config::CoreConfig;
pub use caravel::dispatch::DispatchSession;
pub use caravel::event::{CancelFlag, DispatchEvent, EventSink};
pub use caravel::orchestrator::{DispatchOptions, Orchestrator};
pub use caravel::planner::GoalPlanner;
pub use caravel::protocol::MessageBus;
pub use caravel::router::{IntentRouter, RoutingDecision};
