//! Conversations and the streaming tool-call loop.
//!
//! A [`Conversation`] owns an append-only message history bound to one
//! authenticated caller; the [`ConversationManager`] drives turns against a
//! model provider, authorizing and executing each tool call the model
//! requests.

mod manager;

pub use manager::{
    ConversationManager, ConversationManagerConfig, ToolCallRecord, TurnOutcome,
    DEFAULT_CONVERSATION_TIMEOUT,
};

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;

use crate::auth::AuthContext;
use crate::provider::ProviderError;
use crate::types::Message;

/// Errors that abort a conversation turn.
///
/// Tool-level faults (denied or failed actions) are *not* errors here —
/// they become failed tool results fed back to the model. Only
/// provider-level and lifecycle failures are turn-fatal; already-appended
/// history is preserved for a retry.
#[derive(Debug, Error)]
pub enum ConversationError {
    /// The model backend failed or is unreachable
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The model misbehaved (token limit, content filter, unknown stop)
    #[error("model error: {0}")]
    Model(String),

    /// The model returned neither text nor a tool call
    #[error("model returned an empty response")]
    EmptyResponse,

    /// No conversation with the given id
    #[error("conversation not found: {0}")]
    NotFound(String),

    /// The manager is shutting down and not accepting new turns
    #[error("conversation manager is shutting down")]
    ShuttingDown,

    /// Forced shutdown interrupted an in-flight tool call
    #[error("interrupted: {0}")]
    Interrupted(String),
}

/// Scoping hints used to disambiguate relative resource paths the model
/// emits.
#[derive(Debug, Clone, Default)]
pub struct ConversationScope {
    pub project: Option<String>,
    pub path: Option<String>,
}

/// One agent session: identity, history, and activity tracking.
///
/// The authentication context is fixed for the conversation's lifetime.
/// History is append-only and guarded for concurrent read-while-append: a
/// snapshot never observes a partially-appended message. Expiry is
/// advisory — [`Conversation::is_expired`] is read-only, and reaping is an
/// external scheduler's job.
pub struct Conversation {
    id: String,
    auth: AuthContext,
    created_at: DateTime<Utc>,
    messages: RwLock<Vec<Message>>,
    last_activity: RwLock<DateTime<Utc>>,
    scope: RwLock<ConversationScope>,
}

impl Conversation {
    pub(crate) fn new(auth: AuthContext) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            auth,
            created_at: now,
            messages: RwLock::new(Vec::new()),
            last_activity: RwLock::new(now),
            scope: RwLock::new(ConversationScope::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Append a message and bump the activity timestamp
    pub fn append(&self, message: Message) {
        self.messages.write().push(message);
        *self.last_activity.write() = Utc::now();
    }

    /// Snapshot of the full history
    pub fn messages(&self) -> Vec<Message> {
        self.messages.read().clone()
    }

    pub fn message_count(&self) -> usize {
        self.messages.read().len()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read()
    }

    /// Whether the idle time exceeds the given timeout. Advisory only.
    pub fn is_expired(&self, timeout: Duration) -> bool {
        let idle = Utc::now() - self.last_activity();
        idle.to_std().map(|idle| idle > timeout).unwrap_or(false)
    }

    /// Set the scoping hints for relative path resolution
    pub fn set_scope(&self, scope: ConversationScope) {
        *self.scope.write() = scope;
    }

    pub fn scope(&self) -> ConversationScope {
        self.scope.read().clone()
    }

    /// Resolve a resource path the model emitted.
    ///
    /// A `./`-prefixed path is joined onto the conversation's current path
    /// hint; anything else passes through with a leading `/` stripped.
    pub fn resolve_path(&self, path: &str) -> String {
        if let Some(rest) = path.strip_prefix("./") {
            let scope = self.scope.read();
            if let Some(base) = &scope.path {
                return format!("{}/{}", base.trim_end_matches('/'), rest);
            }
            return rest.to_string();
        }
        path.trim_start_matches('/').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Conversation {
        Conversation::new(AuthContext::admin("tester"))
    }

    #[test]
    fn test_append_bumps_activity() {
        let conv = conversation();
        let before = conv.last_activity();
        std::thread::sleep(std::time::Duration::from_millis(5));
        conv.append(Message::user("hello"));
        assert!(conv.last_activity() > before);
        assert_eq!(conv.message_count(), 1);
    }

    #[test]
    fn test_messages_snapshot_is_stable() {
        let conv = conversation();
        conv.append(Message::user("one"));
        let snapshot = conv.messages();
        conv.append(Message::user("two"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(conv.message_count(), 2);
    }

    #[test]
    fn test_fresh_conversation_not_expired() {
        let conv = conversation();
        assert!(!conv.is_expired(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_timeout_expires() {
        let conv = conversation();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(conv.is_expired(Duration::from_millis(1)));
    }

    #[test]
    fn test_resolve_path_relative() {
        let conv = conversation();
        conv.set_scope(ConversationScope {
            project: Some("site-a".to_string()),
            path: Some("plc/line1".to_string()),
        });
        assert_eq!(conv.resolve_path("./motor1"), "plc/line1/motor1");
        assert_eq!(conv.resolve_path("other/tag"), "other/tag");
        assert_eq!(conv.resolve_path("/rooted/tag"), "rooted/tag");
    }

    #[test]
    fn test_resolve_path_without_scope() {
        let conv = conversation();
        assert_eq!(conv.resolve_path("./motor1"), "motor1");
    }
}
