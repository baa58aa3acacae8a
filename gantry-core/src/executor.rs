//! Dispatch of authorized actions to resource handlers.
//!
//! The executor is the seam toward the out-of-scope resource handlers (tag
//! store, view/script/named-query CRUD). It performs no authorization —
//! that already happened — and upholds two contract obligations: it never
//! executes an action that was not separately authorized (callers go
//! through [`crate::policy::PolicyEngine::authorize`] first), and every
//! invocation produces exactly one audit entry, success or failure.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::action::{Action, ActionType, ResourceType};
use crate::audit::{AuditCategory, AuditEntry, AuditLogger, NewAuditEntry};
use crate::auth::AuthContext;
use crate::validation::ValidationResult;

/// Errors a resource handler may surface.
///
/// Whatever the handler throws, the executor normalizes it into an
/// [`ActionResult`] rather than letting it propagate.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

/// CRUD operations for one resource type.
///
/// Implementations live outside this crate; the default method bodies
/// reject, so a handler only implements the verbs its resource supports.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// The resource type this handler serves
    fn resource_type(&self) -> ResourceType;

    async fn create(&self, action: &Action) -> Result<Value, HandlerError> {
        Err(HandlerError::Unsupported(format!(
            "create is not supported for {}",
            action.resource_type()
        )))
    }

    async fn read(&self, action: &Action) -> Result<Value, HandlerError> {
        Err(HandlerError::Unsupported(format!(
            "read is not supported for {}",
            action.resource_type()
        )))
    }

    async fn update(&self, action: &Action) -> Result<Value, HandlerError> {
        Err(HandlerError::Unsupported(format!(
            "update is not supported for {}",
            action.resource_type()
        )))
    }

    async fn delete(&self, action: &Action) -> Result<Value, HandlerError> {
        Err(HandlerError::Unsupported(format!(
            "delete is not supported for {}",
            action.resource_type()
        )))
    }

    async fn list(&self, action: &Action) -> Result<Value, HandlerError> {
        Err(HandlerError::Unsupported(format!(
            "list is not supported for {}",
            action.resource_type()
        )))
    }

    /// Validate without side effects, for dry-run support.
    ///
    /// The default accepts everything; handlers override to check payloads
    /// against their own schemas.
    async fn validate(&self, _action: &Action) -> ValidationResult {
        ValidationResult::new()
    }
}

/// Outcome status of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionStatus {
    Success,
    Failure,
    ValidationFailed,
}

/// Normalized outcome of one action, echoing the caller's correlation id
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub status: ActionStatus,
    pub correlation_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionResult {
    pub fn success(
        correlation_id: impl Into<String>,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            status: ActionStatus::Success,
            correlation_id: correlation_id.into(),
            message: message.into(),
            data,
        }
    }

    pub fn failure(correlation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Failure,
            correlation_id: correlation_id.into(),
            message: message.into(),
            data: None,
        }
    }

    /// Failure carrying the field-level errors that caused it
    pub fn validation_failed(
        correlation_id: impl Into<String>,
        validation: &ValidationResult,
    ) -> Self {
        Self {
            status: ActionStatus::ValidationFailed,
            correlation_id: correlation_id.into(),
            message: validation.summary(),
            data: serde_json::to_value(validation).ok(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }
}

/// Routes authorized actions to the handler for their resource type.
pub struct ActionExecutor {
    handlers: HashMap<ResourceType, Arc<dyn ResourceHandler>>,
    audit: Arc<dyn AuditLogger>,
}

impl ActionExecutor {
    pub fn new(audit: Arc<dyn AuditLogger>) -> Self {
        Self {
            handlers: HashMap::new(),
            audit,
        }
    }

    /// Register a handler, keyed by its declared resource type. A later
    /// registration for the same type replaces the earlier one.
    pub fn register_handler(&mut self, handler: Arc<dyn ResourceHandler>) {
        self.handlers.insert(handler.resource_type(), handler);
    }

    pub fn has_handler(&self, resource_type: ResourceType) -> bool {
        self.handlers.contains_key(&resource_type)
    }

    /// Execute an already-authorized action.
    ///
    /// Local validation failures come back as field-level errors, handler
    /// faults as `Failure` results; nothing propagates as a panic or an
    /// uncaught error. `options.dry_run` invokes the handler's validate-only
    /// path. Exactly one audit entry is recorded per call.
    pub async fn execute(&self, action: &Action, ctx: &AuthContext) -> ActionResult {
        let result = self.execute_inner(action).await;
        self.record(action, ctx, &result);
        result
    }

    async fn execute_inner(&self, action: &Action) -> ActionResult {
        let validation = action.validate();
        if !validation.is_valid() {
            return ActionResult::validation_failed(action.correlation_id(), &validation);
        }

        let Some(handler) = self.handlers.get(&action.resource_type()) else {
            return ActionResult::failure(
                action.correlation_id(),
                format!("no handler registered for {}", action.resource_type()),
            );
        };

        if action.options().dry_run {
            let mut combined = validation;
            combined.merge(handler.validate(action).await);
            return if combined.is_valid() {
                ActionResult::success(
                    action.correlation_id(),
                    format!(
                        "dry run: {} {} would succeed, no changes applied",
                        action.action_type(),
                        action.resource_path()
                    ),
                    Some(serde_json::json!({ "dryRun": true })),
                )
            } else {
                ActionResult::validation_failed(action.correlation_id(), &combined)
            };
        }

        let outcome = match action.action_type() {
            ActionType::Create => handler.create(action).await,
            ActionType::Read => handler.read(action).await,
            ActionType::Update => handler.update(action).await,
            ActionType::Delete => handler.delete(action).await,
            ActionType::List => handler.list(action).await,
        };

        match outcome {
            Ok(data) => ActionResult::success(
                action.correlation_id(),
                format!(
                    "{} {} succeeded",
                    action.action_type(),
                    action.resource_path()
                ),
                Some(data),
            ),
            Err(e) => ActionResult::failure(action.correlation_id(), e.to_string()),
        }
    }

    fn record(&self, action: &Action, ctx: &AuthContext, result: &ActionResult) {
        let mut details = HashMap::from([
            ("status".to_string(), serde_json::json!(result.status)),
            ("message".to_string(), serde_json::json!(result.message)),
            (
                "dryRun".to_string(),
                serde_json::json!(action.options().dry_run),
            ),
        ]);
        if let Some(comment) = &action.options().comment {
            details.insert("comment".to_string(), serde_json::json!(comment));
        }
        self.audit.record(AuditEntry::new(NewAuditEntry {
            correlation_id: action.correlation_id().to_string(),
            category: AuditCategory::Action,
            event_type: format!("action.{}", action.action_type()),
            user_id: ctx.user_id().to_string(),
            resource_type: Some(action.resource_type()),
            resource_path: Some(action.resource_path().to_string()),
            action_type: Some(action.action_type()),
            details,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLogger;
    use serde_json::json;

    /// Handler that serves reads from a fixed value and fails deletes
    struct FixedHandler;

    #[async_trait]
    impl ResourceHandler for FixedHandler {
        fn resource_type(&self) -> ResourceType {
            ResourceType::Tag
        }

        async fn read(&self, action: &Action) -> Result<Value, HandlerError> {
            Ok(json!({ "path": action.resource_path(), "value": 42 }))
        }

        async fn delete(&self, action: &Action) -> Result<Value, HandlerError> {
            Err(HandlerError::NotFound(action.resource_path().to_string()))
        }
    }

    fn executor() -> (ActionExecutor, Arc<MemoryAuditLogger>) {
        let audit = Arc::new(MemoryAuditLogger::new());
        let mut executor = ActionExecutor::new(audit.clone());
        executor.register_handler(Arc::new(FixedHandler));
        (executor, audit)
    }

    fn ctx() -> AuthContext {
        AuthContext::admin("tester")
    }

    #[tokio::test]
    async fn test_successful_read() {
        let (executor, audit) = executor();
        let action = Action::read("c1", ResourceType::Tag, "plc/motor1");

        let result = executor.execute(&action, &ctx()).await;
        assert!(result.is_success());
        assert_eq!(result.correlation_id, "c1");
        assert_eq!(result.data.as_ref().unwrap()["value"], 42);

        let entries = audit.entries_for_correlation("c1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].category, AuditCategory::Action);
        assert_eq!(entries[0].event_type, "action.read");
    }

    #[tokio::test]
    async fn test_handler_fault_normalized() {
        let (executor, audit) = executor();
        let action = Action::delete("c2", ResourceType::Tag, "plc/ghost", false);

        let result = executor.execute(&action, &ctx()).await;
        assert_eq!(result.status, ActionStatus::Failure);
        assert!(result.message.contains("not found"));

        // Failure still produces exactly one entry
        assert_eq!(audit.entries_for_correlation("c2").len(), 1);
    }

    #[tokio::test]
    async fn test_missing_handler() {
        let (executor, _) = executor();
        let action = Action::read("c3", ResourceType::Script, "util/helpers");

        let result = executor.execute(&action, &ctx()).await;
        assert_eq!(result.status, ActionStatus::Failure);
        assert!(result.message.contains("no handler"));
    }

    #[tokio::test]
    async fn test_local_validation_failure() {
        let (executor, audit) = executor();
        let action = Action::read("c4", ResourceType::Tag, "");

        let result = executor.execute(&action, &ctx()).await;
        assert_eq!(result.status, ActionStatus::ValidationFailed);
        assert!(result.data.is_some());
        assert_eq!(audit.entries_for_correlation("c4").len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_skips_handler_mutation() {
        let (executor, _) = executor();
        // Delete would fail against FixedHandler, but a dry run only validates
        let action = Action::delete("c5", ResourceType::Tag, "plc/ghost", false).with_options(
            crate::action::ActionOptions {
                dry_run: true,
                force: true,
                ..Default::default()
            },
        );

        let result = executor.execute(&action, &ctx()).await;
        assert!(result.is_success());
        assert_eq!(result.data.as_ref().unwrap()["dryRun"], true);
    }

    #[tokio::test]
    async fn test_unsupported_verb_default() {
        let (executor, _) = executor();
        let action = Action::create(
            "c6",
            ResourceType::Tag,
            "plc/new",
            serde_json::Map::new(),
        );

        let result = executor.execute(&action, &ctx()).await;
        assert_eq!(result.status, ActionStatus::Failure);
        assert!(result.message.contains("not supported"));
    }

    #[tokio::test]
    async fn test_comment_carried_into_audit() {
        let (executor, audit) = executor();
        let action = Action::read("c7", ResourceType::Tag, "plc/motor1").with_options(
            crate::action::ActionOptions {
                comment: Some("routine check".to_string()),
                ..Default::default()
            },
        );

        executor.execute(&action, &ctx()).await;
        let entries = audit.entries_for_correlation("c7");
        assert_eq!(entries[0].details["comment"], json!("routine check"));
    }
}
