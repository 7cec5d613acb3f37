//! The tool surface shipped with the core.
//!
//! - [`specs`]: shape-only definitions (name, description, JSON-schema) of
//!   the domain tools; the embedding application binds implementations via
//!   [`FnTool`](crate::caravel::tool_protocol::FnTool).
//! - [`memory_tools`]: recall/store/recall-past-work tools implemented over
//!   the store seams.
//! - [`delegate`]: the guard-railed `delegate_to_agent` tool.

pub mod delegate;
pub mod memory_tools;
pub mod specs;
