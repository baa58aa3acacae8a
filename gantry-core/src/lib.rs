//! # Gantry
//!
//! A policy-gated action layer between conversational AI agents and
//! destructive configuration operations on a host gateway.
//!
//! The resource CRUD itself is thin and lives elsewhere (behind the
//! [`ResourceHandler`] seam). What this crate provides is the trust and
//! orchestration layer around it: authenticating callers, deciding per
//! action whether an operation may proceed, forcing explicit confirmation
//! for destructive operations, recording an immutable audit trail, and
//! driving multi-turn conversations in which a model requests tool calls
//! that must be authorized, executed, and streamed back.
//!
//! ## Components
//!
//! - [`Action`] - immutable description of one requested operation
//! - [`ApiKeyManager`] - issues and validates salted-hash API keys,
//!   resolving them to an [`AuthContext`]
//! - [`PolicyEngine`] - allows, denies, or demands confirmation per action,
//!   aware of the [`EnvironmentMode`]
//! - [`AuditLogger`] - append-only sink for [`AuditEntry`] records
//! - [`ActionExecutor`] - dispatches authorized actions to resource
//!   handlers and normalizes outcomes into [`ActionResult`]
//! - [`ConversationManager`] - owns sessions and drives the streaming
//!   tool-call loop against a [`ModelProvider`]
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use gantry_core::{
//!     ActionExecutor, ApiKeyConfig, ApiKeyManager, ConversationManager,
//!     ConversationManagerConfig, EnvironmentMode, MemoryAuditLogger,
//!     NullStreamingHandler, PolicyEngine, PolicyEngineConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> gantry_core::Result<()> {
//!     let audit = Arc::new(MemoryAuditLogger::new());
//!     let keys = ApiKeyManager::with_audit(audit.clone());
//!     let policy = Arc::new(PolicyEngine::new(
//!         PolicyEngineConfig::for_mode(EnvironmentMode::Production),
//!         audit.clone(),
//!     ));
//!     let mut executor = ActionExecutor::new(audit.clone());
//!     // executor.register_handler(...) for each resource type
//!
//!     let manager = ConversationManager::new(
//!         ConversationManagerConfig::default(),
//!         Arc::new(my_provider),
//!         policy,
//!         Arc::new(executor),
//!         audit,
//!     );
//!
//!     let created = keys.create_key(ApiKeyConfig {
//!         name: "ops".to_string(),
//!         permissions: ["tag:read".parse().unwrap()].into_iter().collect(),
//!         ..Default::default()
//!     });
//!     let ctx = keys.authenticate(&created.raw_key)?;
//!     let conversation = manager.create_conversation(ctx);
//!     let outcome = manager
//!         .send_message(conversation.id(), "How is motor1 doing?", &NullStreamingHandler)
//!         .await?;
//!     println!("{}", outcome.text);
//!     Ok(())
//! }
//! ```
//!
//! ## Scope
//!
//! Concrete resource handlers, LLM backend wire formats, rate limiting,
//! and HTTP routing are external collaborators. All stores are in-memory;
//! durability across restarts is an acknowledged gap, not a silent feature.

pub mod action;
pub mod audit;
pub mod auth;
pub mod conversation;
pub mod error;
pub mod executor;
pub mod policy;
pub mod provider;
pub mod streaming;
pub mod test_utils;
pub mod types;
pub mod validation;

pub use action::{
    action_tool_definitions, action_type_for_tool, Action, ActionDetail, ActionOptions,
    ActionRequest, ActionType, ResourceType, UnknownResourceType, MAX_COMMENT_LEN,
    MAX_RESOURCE_PATH_LEN,
};
pub use audit::{
    AuditCategory, AuditEntry, AuditLogger, MemoryAuditLogger, NewAuditEntry, NullAuditLogger,
};
pub use auth::{
    ApiKey, ApiKeyConfig, ApiKeyManager, AuthContext, CreatedKey, CrudVerb, InvalidPermission,
    Permission, KEY_PREFIX,
};
pub use conversation::{
    Conversation, ConversationError, ConversationManager, ConversationManagerConfig,
    ConversationScope, ToolCallRecord, TurnOutcome, DEFAULT_CONVERSATION_TIMEOUT,
};
pub use error::{Error, Result};
pub use executor::{ActionExecutor, ActionResult, ActionStatus, HandlerError, ResourceHandler};
pub use policy::{
    EnvironmentMode, PolicyDecision, PolicyEngine, PolicyEngineConfig, PolicyError, PolicyRule,
};
pub use provider::{ModelProvider, ProviderError, StreamEvent};
pub use streaming::{
    NullStreamingHandler, StreamingResponseHandler, ToolCallOutcome, ToolCallStart, TurnCompletion,
};
pub use types::{
    ContentBlock, Message, Role, StopReason, TokenUsage, ToolDefinition, ToolResultBlock,
    ToolResultStatus, ToolUseBlock,
};
pub use validation::{ValidationError, ValidationResult};
