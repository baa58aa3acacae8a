//! The conversation manager and its streaming turn loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};

use crate::action::{action_tool_definitions, action_type_for_tool, Action, ActionRequest};
use crate::audit::{AuditCategory, AuditEntry, AuditLogger, NewAuditEntry};
use crate::auth::AuthContext;
use crate::executor::{ActionExecutor, ActionResult};
use crate::policy::PolicyEngine;
use crate::provider::{ModelProvider, StreamEvent};
use crate::streaming::{StreamingResponseHandler, ToolCallOutcome, ToolCallStart, TurnCompletion};
use crate::types::{
    Message, StopReason, TokenUsage, ToolResultBlock, ToolResultStatus, ToolUseBlock,
};
use crate::validation::ValidationResult;

use super::{Conversation, ConversationError};

/// Default idle timeout before a conversation is considered expired
pub const DEFAULT_CONVERSATION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Configuration for a [`ConversationManager`]
pub struct ConversationManagerConfig {
    /// Idle timeout for [`Conversation::is_expired`]
    pub conversation_timeout: Duration,
    /// System prompt sent with every model call
    pub system_prompt: Option<String>,
    /// Bound on concurrently executing turns across all conversations
    pub max_concurrent_turns: usize,
}

impl Default for ConversationManagerConfig {
    fn default() -> Self {
        Self {
            conversation_timeout: DEFAULT_CONVERSATION_TIMEOUT,
            system_prompt: None,
            max_concurrent_turns: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// Record of one tool call made during a turn
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub name: String,
    pub input: Value,
    pub result: ActionResult,
    pub duration: Duration,
}

/// Summary of a completed turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Final text response from the model
    pub text: String,
    /// All tool calls made during the turn, in order
    pub tool_calls: Vec<ToolCallRecord>,
    /// Cumulative token usage across model calls, if reported
    pub usage: Option<TokenUsage>,
    /// Number of model calls (1 + one per tool round)
    pub model_calls: usize,
    pub duration: Duration,
}

/// Owns per-session conversations and drives the agent loop.
///
/// Each turn: send history to the provider, stream tokens to the handler,
/// authorize and execute every tool call the model requests through the
/// policy engine and executor, feed results back, and finish with exactly
/// one of `on_complete` / `on_error`. A policy refusal becomes a failed
/// tool result the model can explain to the user — never a silent retry
/// with `force`, and never a turn abort.
///
/// Turns across conversations run concurrently up to the configured bound;
/// tool calls within one turn run sequentially so streaming callbacks fire
/// in strict arrival order. No lock is held across a provider or handler
/// call.
pub struct ConversationManager {
    provider: Arc<dyn ModelProvider>,
    policy: Arc<PolicyEngine>,
    executor: Arc<ActionExecutor>,
    audit: Arc<dyn AuditLogger>,
    conversations: RwLock<HashMap<String, Arc<Conversation>>>,
    conversation_timeout: Duration,
    system_prompt: Option<String>,
    turn_permits: Semaphore,
    shutting_down: AtomicBool,
    forced: AtomicBool,
    in_flight: AtomicUsize,
    idle_notify: Notify,
    force_notify: Notify,
}

impl ConversationManager {
    pub fn new(
        config: ConversationManagerConfig,
        provider: Arc<dyn ModelProvider>,
        policy: Arc<PolicyEngine>,
        executor: Arc<ActionExecutor>,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        Self {
            provider,
            policy,
            executor,
            audit,
            conversations: RwLock::new(HashMap::new()),
            conversation_timeout: config.conversation_timeout,
            system_prompt: config.system_prompt,
            turn_permits: Semaphore::new(config.max_concurrent_turns.max(1)),
            shutting_down: AtomicBool::new(false),
            forced: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            idle_notify: Notify::new(),
            force_notify: Notify::new(),
        }
    }

    /// Start a conversation for an authenticated caller.
    ///
    /// The context is fixed for the conversation's lifetime.
    pub fn create_conversation(&self, auth: AuthContext) -> Arc<Conversation> {
        let conversation = Arc::new(Conversation::new(auth));
        self.conversations
            .write()
            .insert(conversation.id().to_string(), conversation.clone());
        conversation
    }

    pub fn get_conversation(&self, id: &str) -> Option<Arc<Conversation>> {
        self.conversations.read().get(id).cloned()
    }

    pub fn remove_conversation(&self, id: &str) -> bool {
        self.conversations.write().remove(id).is_some()
    }

    pub fn list_conversations(&self) -> Vec<Arc<Conversation>> {
        self.conversations.read().values().cloned().collect()
    }

    /// Conversations past the idle timeout. Advisory: reaping them is an
    /// external scheduler's job.
    pub fn expired_conversations(&self) -> Vec<Arc<Conversation>> {
        self.conversations
            .read()
            .values()
            .filter(|c| c.is_expired(self.conversation_timeout))
            .cloned()
            .collect()
    }

    pub fn conversation_timeout(&self) -> Duration {
        self.conversation_timeout
    }

    /// Drive one conversational turn.
    ///
    /// Appends the user message, then loops: stream the model response
    /// (tokens go to `handler.on_token`), execute any requested tool calls,
    /// feed their results back, and repeat until the model ends its turn.
    /// Returns the assembled [`TurnOutcome`]; the same data was already
    /// delivered through the handler.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        handler: &dyn StreamingResponseHandler,
    ) -> Result<TurnOutcome, ConversationError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(ConversationError::ShuttingDown);
        }
        let conversation = self
            .get_conversation(conversation_id)
            .ok_or_else(|| ConversationError::NotFound(conversation_id.to_string()))?;

        let _permit = self
            .turn_permits
            .acquire()
            .await
            .map_err(|_| ConversationError::ShuttingDown)?;
        let _guard = TurnGuard::new(self);

        let turn_start = Instant::now();
        conversation.append(Message::user(text));

        let tools = action_tool_definitions();
        let mut records: Vec<ToolCallRecord> = Vec::new();
        let mut total_usage: Option<TokenUsage> = None;
        let mut model_calls = 0usize;

        loop {
            let history = conversation.messages();
            let mut stream = match self
                .provider
                .generate_stream(history, tools.clone(), self.system_prompt.clone())
                .await
            {
                Ok(stream) => stream,
                Err(e) => return Err(self.fail(handler, e.into())),
            };

            let mut text_content = String::new();
            let mut tool_uses: Vec<ToolUseBlock> = Vec::new();
            let mut stop_reason = StopReason::EndTurn;
            let mut usage: Option<TokenUsage> = None;

            while let Some(event) = stream.next().await {
                match event {
                    Ok(StreamEvent::TextDelta(delta)) => {
                        handler.on_token(&delta);
                        text_content.push_str(&delta);
                    }
                    Ok(StreamEvent::ToolCall(tool_use)) => tool_uses.push(tool_use),
                    Ok(StreamEvent::Stop {
                        stop_reason: reason,
                        usage: stop_usage,
                    }) => {
                        stop_reason = reason;
                        usage = stop_usage;
                    }
                    Err(e) => return Err(self.fail(handler, e.into())),
                }
            }

            model_calls += 1;
            if let Some(u) = usage {
                let total = total_usage.get_or_insert(TokenUsage::default());
                total.input_tokens += u.input_tokens;
                total.output_tokens += u.output_tokens;
            }

            if text_content.is_empty() && tool_uses.is_empty() {
                return Err(self.fail(handler, ConversationError::EmptyResponse));
            }
            conversation.append(Message::assistant_with_tool_use(
                text_content.clone(),
                tool_uses.clone(),
            ));

            match stop_reason {
                StopReason::ToolUse => {
                    let mut result_blocks = Vec::with_capacity(tool_uses.len());
                    for tool_use in &tool_uses {
                        let outcome = self.run_tool_call(&conversation, tool_use, handler).await?;
                        let status = if outcome.result.is_success() {
                            ToolResultStatus::Success
                        } else {
                            ToolResultStatus::Error
                        };
                        result_blocks.push(ToolResultBlock {
                            tool_use_id: tool_use.id.clone(),
                            content: serde_json::to_value(&outcome.result)
                                .unwrap_or(Value::Null),
                            status,
                        });
                        records.push(ToolCallRecord {
                            name: tool_use.name.clone(),
                            input: tool_use.input.clone(),
                            result: outcome.result,
                            duration: outcome.duration,
                        });
                    }
                    conversation.append(Message::tool_results(result_blocks));
                }
                StopReason::EndTurn | StopReason::StopSequence => {
                    let completion = TurnCompletion {
                        text: text_content,
                        usage: total_usage,
                    };
                    handler.on_complete(&completion);
                    return Ok(TurnOutcome {
                        text: completion.text,
                        tool_calls: records,
                        usage: total_usage,
                        model_calls,
                        duration: turn_start.elapsed(),
                    });
                }
                StopReason::MaxTokens => {
                    return Err(self.fail(
                        handler,
                        ConversationError::Model(
                            "response exceeded maximum token limit".to_string(),
                        ),
                    ));
                }
                StopReason::ContentFiltered => {
                    return Err(self.fail(
                        handler,
                        ConversationError::Model(
                            "response was filtered by content moderation".to_string(),
                        ),
                    ));
                }
                StopReason::Unknown => {
                    return Err(self.fail(
                        handler,
                        ConversationError::Model("unknown stop reason".to_string()),
                    ));
                }
            }
        }
    }

    /// Stop accepting turns, drain in-flight work for up to `grace`, then
    /// force-terminate.
    ///
    /// A tool call still pending at forced shutdown is reported through its
    /// turn's `on_error`, never silently dropped.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutting_down.store(true, Ordering::SeqCst);

        let drained = tokio::time::timeout(grace, async {
            loop {
                let notified = self.idle_notify.notified();
                if self.in_flight.load(Ordering::SeqCst) == 0 {
                    break;
                }
                notified.await;
            }
        })
        .await;

        if drained.is_err() {
            self.forced.store(true, Ordering::SeqCst);
            self.force_notify.notify_waiters();
        }
    }

    /// Whether shutdown has been initiated
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    fn fail(
        &self,
        handler: &dyn StreamingResponseHandler,
        error: ConversationError,
    ) -> ConversationError {
        handler.on_error(&error);
        error
    }

    /// Authorize and execute one tool call, firing the start/complete
    /// callbacks around it. Only forced shutdown makes this an error; every
    /// action-level outcome (including denial) is an [`ActionResult`].
    async fn run_tool_call(
        &self,
        conversation: &Conversation,
        tool_use: &ToolUseBlock,
        handler: &dyn StreamingResponseHandler,
    ) -> Result<ToolCallOutcome, ConversationError> {
        let start = Instant::now();
        handler.on_tool_call_start(&ToolCallStart {
            tool_use_id: tool_use.id.clone(),
            tool_name: tool_use.name.clone(),
            input: tool_use.input.clone(),
        });

        if self.forced.load(Ordering::SeqCst) {
            return Err(self.interrupt(handler, tool_use));
        }

        let forced = self.force_notify.notified();
        tokio::pin!(forced);
        let result = tokio::select! {
            _ = &mut forced => {
                return Err(self.interrupt(handler, tool_use));
            }
            result = self.perform_tool_call(conversation, tool_use) => result,
        };

        let outcome = ToolCallOutcome {
            tool_use_id: tool_use.id.clone(),
            tool_name: tool_use.name.clone(),
            result,
            duration: start.elapsed(),
        };
        handler.on_tool_call_complete(&outcome);
        Ok(outcome)
    }

    fn interrupt(
        &self,
        handler: &dyn StreamingResponseHandler,
        tool_use: &ToolUseBlock,
    ) -> ConversationError {
        let error = ConversationError::Interrupted(format!(
            "tool call {} aborted by forced shutdown",
            tool_use.name
        ));
        handler.on_error(&error);
        error
    }

    /// Parse, authorize, and execute the action behind a tool call.
    ///
    /// The correlation id carries the conversation's lineage:
    /// `{conversation_id}:{tool_use_id}`.
    async fn perform_tool_call(
        &self,
        conversation: &Conversation,
        tool_use: &ToolUseBlock,
    ) -> ActionResult {
        let correlation_id = format!("{}:{}", conversation.id(), tool_use.id);
        let auth = conversation.auth();

        let Some(action_type) = action_type_for_tool(&tool_use.name) else {
            let validation =
                ValidationResult::invalid("tool", format!("unknown tool: {}", tool_use.name));
            return self.reject_tool_call(auth, &correlation_id, &validation);
        };

        let Some(mut object) = tool_use.input.as_object().cloned() else {
            let validation =
                ValidationResult::invalid("input", "tool input must be a JSON object");
            return self.reject_tool_call(auth, &correlation_id, &validation);
        };
        object.insert("action".to_string(), serde_json::json!(action_type));
        object.insert(
            "correlationId".to_string(),
            serde_json::json!(correlation_id),
        );

        let mut request: ActionRequest = match serde_json::from_value(Value::Object(object)) {
            Ok(request) => request,
            Err(e) => {
                let validation = ValidationResult::invalid("input", e.to_string());
                return self.reject_tool_call(auth, &correlation_id, &validation);
            }
        };
        request.resource_path = conversation.resolve_path(&request.resource_path);

        let action = match Action::from_request(request) {
            Ok(action) => action,
            Err(validation) => {
                return self.reject_tool_call(auth, &correlation_id, &validation);
            }
        };

        match self.policy.authorize(auth, &action) {
            Ok(()) => self.executor.execute(&action, auth).await,
            // The engine already audited the refusal; it becomes a failed
            // tool result the model can explain. Re-attempting with force is
            // an explicit user decision, never ours.
            Err(e) => ActionResult::failure(correlation_id, e.to_string()),
        }
    }

    /// Record the single audit entry for a tool call that never became a
    /// well-formed action, and build its failure result.
    fn reject_tool_call(
        &self,
        auth: &AuthContext,
        correlation_id: &str,
        validation: &ValidationResult,
    ) -> ActionResult {
        self.audit.record(AuditEntry::new(NewAuditEntry {
            correlation_id: correlation_id.to_string(),
            category: AuditCategory::Action,
            event_type: "action.invalid".to_string(),
            user_id: auth.user_id().to_string(),
            resource_type: None,
            resource_path: None,
            action_type: None,
            details: HashMap::from([(
                "errors".to_string(),
                serde_json::to_value(validation).unwrap_or(Value::Null),
            )]),
        }));
        ActionResult::validation_failed(correlation_id, validation)
    }
}

/// Tracks one in-flight turn for shutdown draining
struct TurnGuard<'a> {
    manager: &'a ConversationManager,
}

impl<'a> TurnGuard<'a> {
    fn new(manager: &'a ConversationManager) -> Self {
        manager.in_flight.fetch_add(1, Ordering::SeqCst);
        Self { manager }
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if self.manager.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.manager.idle_notify.notify_one();
        }
    }
}
