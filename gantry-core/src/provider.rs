//! Model provider seam.
//!
//! Concrete LLM backends (and their wire formats) live outside this crate;
//! the conversation loop only needs a stream of [`StreamEvent`]s. Use
//! `test_utils::MockProvider` for tests.

use futures::stream::BoxStream;

use crate::types::{Message, StopReason, TokenUsage, ToolDefinition, ToolUseBlock};

/// Events from a streaming model response
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental text delta
    TextDelta(String),
    /// The model requested a tool call
    ToolCall(ToolUseBlock),
    /// Streaming stopped
    Stop {
        /// Why the model stopped
        stop_reason: StopReason,
        /// Token usage for this response, if reported
        usage: Option<TokenUsage>,
    },
}

/// Error types for model providers
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Authentication or authorization failed at the backend
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting or throttling
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Network or connectivity issues
    #[error("network error: {0}")]
    Network(String),

    /// Model-side errors (content filtered, context too long, etc.)
    #[error("model error: {0}")]
    Model(String),

    /// Service unavailable or temporary issues
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Invalid configuration (bad model id, missing parameters)
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Other provider-specific errors
    #[error("{0}")]
    Other(String),
}

/// Trait for model providers.
///
/// A provider combines model metadata with streaming generation. The
/// returned stream yields tokens and tool-call fragments in arrival order,
/// terminated by a single [`StreamEvent::Stop`].
#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    /// Model name for display
    fn name(&self) -> &str;

    /// Send the conversation to the model and stream the response.
    ///
    /// # Arguments
    /// * `messages` - the conversation history
    /// * `tools` - tool definitions available to the model
    /// * `system_prompt` - optional system prompt
    async fn generate_stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        system_prompt: Option<String>,
    ) -> Result<BoxStream<'static, Result<StreamEvent, ProviderError>>, ProviderError>;
}

#[async_trait::async_trait]
impl ModelProvider for std::sync::Arc<dyn ModelProvider> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn generate_stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        system_prompt: Option<String>,
    ) -> Result<BoxStream<'static, Result<StreamEvent, ProviderError>>, ProviderError> {
        (**self)
            .generate_stream(messages, tools, system_prompt)
            .await
    }
}
