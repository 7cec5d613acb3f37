//! Shared primitives for provider-agnostic LLM clients.
//!
//! The pipeline talks to language models exclusively through the
//! [`ClientWrapper`] trait and the lightweight data types in this module.
//! Concrete vendor clients (hosted or local) live outside this crate and are
//! selected by the embedding application, typically keyed off the
//! `LLM_PROVIDER` environment variable surfaced by
//! [`CoreConfig`](crate::caravel::config::CoreConfig).
//!
//! Tool calling uses the native function-calling shape: the assistant reply
//! carries zero or more [`NativeToolCall`]s whose arguments are raw JSON
//! strings, and tool results are fed back as `Role::Tool` messages correlated
//! by call id.

use async_trait::async_trait;
use futures_util::stream::Stream;
use std::error::Error;
use std::pin::Pin;
use std::sync::Arc;

/// A single tool call returned by the LLM in a function-calling response.
///
/// The `arguments` field is the raw JSON string supplied by the provider; the
/// agent runtime parses it before execution so malformed arguments surface as
/// agent-level failures rather than transport errors.
#[derive(Debug, Clone)]
pub struct NativeToolCall {
    /// Provider-assigned call ID, e.g. `"call_abc123"`.
    pub id: String,
    /// Tool name matching one of the [`ToolDefinition`]s sent in the request.
    pub name: String,
    /// Raw JSON argument string supplied by the LLM for this call.
    pub arguments: String,
}

/// Provider-agnostic tool schema passed to the LLM along with a chat request.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    /// Tool name as it will appear in the API `tools` array.
    pub name: String,
    /// Human-readable description surfaced to the LLM to aid tool selection.
    pub description: String,
    /// JSON Schema object describing the accepted parameters.
    pub parameters_schema: serde_json::Value,
}

/// Represents the possible roles for a message.
#[derive(Debug, Clone)]
pub enum Role {
    /// A system authored message that primes or constrains assistant behaviour.
    System,
    /// A user authored message.
    User,
    /// An assistant authored message (model responses or injected exemplars).
    Assistant,
    /// A tool-result message correlating with a prior assistant
    /// [`NativeToolCall`].
    Tool {
        /// The id of the tool call this result answers.
        call_id: String,
    },
}

/// Represents a generic message to be sent to an LLM.
///
/// The `tool_calls` field is populated by [`ClientWrapper::send_message`]
/// when the provider returns function-calling results; it is empty for every
/// other message kind.
#[derive(Clone)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The message body.  Stored as `Arc<str>` so histories can be cheaply
    /// cloned while being rebuilt every step.
    pub content: Arc<str>,
    /// Native tool calls requested by the assistant.
    pub tool_calls: Vec<NativeToolCall>,
}

impl Message {
    /// Build a plain text message with no tool calls.
    ///
    /// # Example
    ///
    /// ```rust
    /// use caravel::caravel::client_wrapper::{Message, Role};
    ///
    /// let msg = Message::text(Role::User, "Find me backend roles");
    /// assert!(msg.tool_calls.is_empty());
    /// ```
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Arc::from(content.into().as_str()),
            tool_calls: Vec::new(),
        }
    }
}

/// Whether the provider may decide to call tools on this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    /// The model chooses freely between replying and calling a tool.
    Auto,
    /// Tool calling is disabled for this request.
    None,
}

/// Per-request knobs forwarded to the provider.
#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    /// Completion token ceiling for this request.
    pub max_tokens: usize,
    /// Sampling temperature.
    pub temperature: f32,
    /// Tool-calling policy for this request.
    pub tool_choice: ToolChoice,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.6,
            tool_choice: ToolChoice::Auto,
        }
    }
}

impl ChatOptions {
    /// Options for short, deterministic classification calls (router,
    /// evaluator, re-planner): low temperature, no tools.
    pub fn classification(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            temperature: 0.1,
            tool_choice: ToolChoice::None,
        }
    }
}

/// Represents a chunk of content in a streaming response.
#[derive(Clone, Debug)]
pub struct MessageChunk {
    /// The incremental content delta in this chunk.  May be empty for chunks
    /// that don't contain content (e.g. finish_reason chunks).
    pub content: String,
    /// Optional finish reason mirroring the provider specific status.
    pub finish_reason: Option<String>,
}

/// Type alias for a stream of message chunks compatible with `Send` executors.
pub type MessageChunkStream =
    Pin<Box<dyn Stream<Item = Result<MessageChunk, Box<dyn Error + Send + Sync>>> + Send>>;

/// Type alias for the future returned by [`ClientWrapper::send_message_stream`].
pub type MessageStreamFuture<'a> = Pin<
    Box<
        dyn std::future::Future<
                Output = Result<Option<MessageChunkStream>, Box<dyn Error + Send + Sync>>,
            > + Send
            + 'a,
    >,
>;

/// Trait-driven abstraction over a concrete LLM provider.
///
/// Implementations translate requests into the provider wire format and
/// return responses in a uniform shape.  All implementations must be
/// thread-safe (`Send + Sync`) so they can be shared between concurrent
/// dispatches via `Arc<dyn ClientWrapper>`.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send a full request/response style chat completion.
    ///
    /// The `messages` slice must include any system priming messages the
    /// caller wishes to send.  When `tools` is `Some` and non-empty the
    /// definitions are forwarded to the provider's function-calling API and
    /// the returned [`Message`] may carry non-empty [`Message::tool_calls`].
    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
        options: ChatOptions,
    ) -> Result<Message, Box<dyn Error + Send + Sync>>;

    /// Request a streaming response from the provider.
    ///
    /// Providers without streaming support inherit the default implementation
    /// which resolves to `Ok(None)`; callers then fall back to
    /// [`send_message`](ClientWrapper::send_message) and emit the reply as a
    /// single chunk.
    fn send_message_stream<'a>(
        &'a self,
        _messages: &'a [Message],
        _options: ChatOptions,
    ) -> MessageStreamFuture<'a> {
        Box::pin(async { Ok(None) })
    }

    /// Return the identifier used to select the upstream model.
    fn model_name(&self) -> &str;
}
