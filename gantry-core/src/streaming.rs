//! Streaming callbacks toward the caller.
//!
//! One handler observes one conversation turn. Callbacks are invoked
//! synchronously, in strict arrival order, on whatever task drives the
//! provider stream — an implementation must not block indefinitely, since
//! that stalls the whole turn.
//!
//! The event sequence for a turn is `on_token*` interleaved with
//! `(on_tool_call_start, on_tool_call_complete)*`, terminated by exactly
//! one of `on_complete` / `on_error`.

use std::time::Duration;

use serde_json::Value;

use crate::conversation::ConversationError;
use crate::executor::ActionResult;
use crate::types::TokenUsage;

/// A tool call about to be authorized and executed
#[derive(Debug, Clone)]
pub struct ToolCallStart {
    pub tool_use_id: String,
    pub tool_name: String,
    pub input: Value,
}

/// A finished tool call. Fires exactly once per call, whether the action
/// succeeded, failed, or was denied by policy.
#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    pub tool_use_id: String,
    pub tool_name: String,
    pub result: ActionResult,
    pub duration: Duration,
}

/// Final assembled response for a completed turn
#[derive(Debug, Clone)]
pub struct TurnCompletion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Capability interface for observing a streaming turn.
///
/// All methods default to no-ops, so an implementation only overrides what
/// it needs.
///
/// # Example
///
/// ```rust
/// use gantry_core::StreamingResponseHandler;
///
/// struct Printer;
///
/// impl StreamingResponseHandler for Printer {
///     fn on_token(&self, token: &str) {
///         print!("{}", token);
///     }
/// }
/// ```
pub trait StreamingResponseHandler: Send + Sync {
    /// An incremental text token arrived from the model
    fn on_token(&self, _token: &str) {}

    /// A tool call was requested and is entering authorization
    fn on_tool_call_start(&self, _call: &ToolCallStart) {}

    /// A tool call finished; its result is being fed back to the model
    fn on_tool_call_complete(&self, _call: &ToolCallOutcome) {}

    /// The turn completed with a final response
    fn on_complete(&self, _completion: &TurnCompletion) {}

    /// The turn failed; already-appended history is preserved for a retry
    fn on_error(&self, _error: &ConversationError) {}
}

/// Handler that ignores every event, for callers that don't need streaming.
pub struct NullStreamingHandler;

impl StreamingResponseHandler for NullStreamingHandler {}
