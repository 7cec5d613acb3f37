//! Configuration for the orchestration core.
//!
//! Provides the [`CoreConfig`] struct passed explicitly to the orchestrator,
//! planner, and dispatch session at construction.  There are no process-wide
//! singletons: the environment is read once via [`CoreConfig::from_env`] and
//! the resulting value flows through the pipeline.
//!
//! # Recognized environment variables
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `LLM_PROVIDER` | `provider` | `"groq"` |
//! | `LLM_MODEL` | `model` | `"llama-3.3-70b-versatile"` |
//! | `AGENT_MAX_STEPS` | `max_steps` | `15` |
//! | `MAX_TOOL_ROUNDS` | `max_tool_rounds` | `6` |
//!
//! # Example
//!
//! ```rust
//! use caravel::caravel::config::CoreConfig;
//!
//! let config = CoreConfig::default();
//! assert_eq!(config.max_steps, 15);
//!
//! let custom = CoreConfig {
//!     max_steps: 8,
//!     ..CoreConfig::default()
//! };
//! assert_eq!(custom.max_tool_rounds, 6);
//! ```

use std::env;

/// Runtime knobs for the orchestration core.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Provider tag used by the embedding application to pick a concrete
    /// [`ClientWrapper`](crate::caravel::client_wrapper::ClientWrapper).
    pub provider: String,
    /// Model identifier forwarded on every chat request.
    pub model: String,
    /// Upper bound on ReAct steps per agent run.
    pub max_steps: usize,
    /// Upper bound on tool-calling rounds in the direct chat path; tools are
    /// withheld on the final round to force a textual reply.
    pub max_tool_rounds: usize,
    /// Additional attempts after a failed tool execution (the initial call is
    /// not counted).
    pub max_tool_retries: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            max_steps: 15,
            max_tool_rounds: 6,
            max_tool_retries: 2,
        }
    }
}

impl CoreConfig {
    /// Build a config from the recognized environment variables, falling back
    /// to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            provider: env::var("LLM_PROVIDER").unwrap_or(defaults.provider),
            model: env::var("LLM_MODEL").unwrap_or(defaults.model),
            max_steps: env_usize("AGENT_MAX_STEPS", defaults.max_steps),
            max_tool_rounds: env_usize("MAX_TOOL_ROUNDS", defaults.max_tool_rounds),
            max_tool_retries: defaults.max_tool_retries,
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CoreConfig::default();
        assert_eq!(config.provider, "groq");
        assert_eq!(config.max_steps, 15);
        assert_eq!(config.max_tool_rounds, 6);
        assert_eq!(config.max_tool_retries, 2);
    }
}
