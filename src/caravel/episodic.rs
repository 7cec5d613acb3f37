//! Episodic memory: facts the system learned about a user across sessions.
//!
//! Two halves: [`EpisodicMemory`], a thin user-scoped view over the
//! [`MemoryStore`] seam, and [`extract_facts`], the cheap LLM call the
//! orchestrator runs after a successful agent to harvest facts worth
//! keeping.  Extraction is best-effort and returns an empty list on any
//! failure.

use crate::caravel::client_wrapper::{ChatOptions, ClientWrapper, Message, Role};
use crate::caravel::prompts::MEMORY_EXTRACTION_PROMPT;
use crate::caravel::store::{MemoryCategory, MemoryRecord, MemoryStore, StoreResult};
use crate::caravel::util::{strip_code_fences, truncate_chars};
use serde_json::Value;
use std::sync::Arc;

/// Manages persistent memories about a specific user.
pub struct EpisodicMemory {
    store: Arc<dyn MemoryStore>,
    user_id: i64,
}

impl EpisodicMemory {
    pub fn new(store: Arc<dyn MemoryStore>, user_id: i64) -> Self {
        Self { store, user_id }
    }

    /// Store a fact about the user.
    pub async fn remember(
        &self,
        content: &str,
        category: MemoryCategory,
        conversation_id: Option<i64>,
    ) -> StoreResult<i64> {
        self.store
            .save_memory(self.user_id, content, category, conversation_id)
            .await
    }

    /// Retrieve memories, optionally filtered by category.
    pub async fn recall(
        &self,
        category: Option<MemoryCategory>,
        limit: usize,
    ) -> StoreResult<Vec<MemoryRecord>> {
        self.store.get_memories(self.user_id, category, limit).await
    }

    /// Build a text block of memories for prompt injection; empty when the
    /// user has none.
    pub async fn recall_as_context(&self, limit: usize) -> String {
        let memories = match self.recall(None, limit).await {
            Ok(memories) => memories,
            Err(e) => {
                log::warn!("episodic: recall failed: {}", e);
                return String::new();
            }
        };
        if memories.is_empty() {
            return String::new();
        }

        let mut lines = vec!["PREVIOUS KNOWLEDGE ABOUT THIS USER:".to_string()];
        for mem in memories {
            lines.push(format!("- [{}] {}", mem.category.as_str(), mem.content));
        }
        lines.join("\n")
    }

    /// Keyword search over this user's memories.
    pub async fn search(&self, query: &str, limit: usize) -> StoreResult<Vec<MemoryRecord>> {
        self.store.search_memories(self.user_id, query, limit).await
    }
}

/// A fact harvested from agent output.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFact {
    pub content: String,
    pub category: MemoryCategory,
}

/// Use a cheap LLM call to extract memorable facts from agent output.
///
/// Returns at most 5 categorized facts; any transport or parse failure
/// yields an empty list.
pub async fn extract_facts(
    client: &Arc<dyn ClientWrapper>,
    agent_output: &str,
    user_message: &str,
) -> Vec<ExtractedFact> {
    let user_msg = format!(
        "User said: {}\n\nAgent output:\n{}",
        truncate_chars(user_message, 500),
        truncate_chars(agent_output, 2000)
    );
    let messages = [
        Message::text(Role::System, MEMORY_EXTRACTION_PROMPT),
        Message::text(Role::User, user_msg),
    ];

    let reply = match client
        .send_message(&messages, None, ChatOptions::classification(400))
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            log::warn!("episodic: extraction call failed: {}", e);
            return Vec::new();
        }
    };

    let parsed: Value = match serde_json::from_str(strip_code_fences(&reply.content)) {
        Ok(value) => value,
        Err(_) => return Vec::new(),
    };
    let items = match parsed.as_array() {
        Some(items) => items,
        None => return Vec::new(),
    };

    items
        .iter()
        .take(5)
        .filter_map(|item| {
            let content = item.get("content")?.as_str()?.to_string();
            let category = item
                .get("category")
                .and_then(Value::as_str)
                .map(MemoryCategory::parse_or_fact)
                .unwrap_or(MemoryCategory::Fact);
            Some(ExtractedFact { content, category })
        })
        .collect()
}
