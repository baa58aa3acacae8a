//! Streaming conversation turns: tool calls authorized, executed, audited,
//! and fed back to the model.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use gantry_core::test_utils::{CollectingHandler, HandlerEvent, MemoryResourceHandler, MockProvider};
use gantry_core::{
    ActionExecutor, ActionStatus, AuditCategory, AuthContext, ConversationError,
    ConversationManager, ConversationManagerConfig, EnvironmentMode, MemoryAuditLogger,
    Permission, PolicyEngine, PolicyEngineConfig, ProviderError, ResourceType,
};

fn perms(codes: &[&str]) -> HashSet<Permission> {
    codes.iter().map(|c| c.parse().unwrap()).collect()
}

struct Fixture {
    manager: ConversationManager,
    audit: Arc<MemoryAuditLogger>,
    tags: Arc<MemoryResourceHandler>,
}

fn fixture(provider: MockProvider) -> Fixture {
    let audit = Arc::new(MemoryAuditLogger::new());
    let policy = Arc::new(PolicyEngine::new(
        PolicyEngineConfig::for_mode(EnvironmentMode::Production),
        audit.clone(),
    ));
    let tags = Arc::new(
        MemoryResourceHandler::new(ResourceType::Tag)
            .with_resource("plc/motor1", json!({"value": 1, "units": "rpm"})),
    );
    let mut executor = ActionExecutor::new(audit.clone());
    executor.register_handler(tags.clone());

    let manager = ConversationManager::new(
        ConversationManagerConfig::default(),
        Arc::new(provider),
        policy,
        Arc::new(executor),
        audit.clone(),
    );
    Fixture {
        manager,
        audit,
        tags,
    }
}

#[tokio::test]
async fn text_only_turn_streams_tokens_and_completes() {
    let fixture = fixture(MockProvider::new().with_text("All systems nominal."));
    let conversation = fixture
        .manager
        .create_conversation(AuthContext::new("user-1", perms(&["tag:read"])));
    let collector = CollectingHandler::new();

    let outcome = fixture
        .manager
        .send_message(conversation.id(), "Status?", &collector)
        .await
        .unwrap();

    assert_eq!(outcome.text, "All systems nominal.");
    assert_eq!(outcome.model_calls, 1);
    assert!(outcome.tool_calls.is_empty());

    assert_eq!(collector.tokens(), "All systems nominal.");
    assert_eq!(
        collector.completion_text().as_deref(),
        Some("All systems nominal.")
    );
    assert!(!collector.has_event("error"));

    // Text-only turns touch no actions and leave no action/policy entries
    assert!(fixture.audit.is_empty());
    // History: user message + assistant response
    assert_eq!(conversation.message_count(), 2);
}

#[tokio::test]
async fn tool_call_is_executed_and_result_fed_back() {
    let provider = MockProvider::new()
        .with_text_and_tool_call(
            "Checking the tag. ",
            "read_resource",
            json!({"resourceType": "tag", "resourcePath": "plc/motor1"}),
        )
        .with_text("The value is 1.");
    let fixture = fixture(provider);
    let conversation = fixture
        .manager
        .create_conversation(AuthContext::new("user-1", perms(&["tag:read"])));
    let collector = CollectingHandler::new();

    let outcome = fixture
        .manager
        .send_message(conversation.id(), "How is motor1?", &collector)
        .await
        .unwrap();

    assert_eq!(outcome.text, "The value is 1.");
    assert_eq!(outcome.model_calls, 2);
    assert_eq!(outcome.tool_calls.len(), 1);
    assert!(outcome.tool_calls[0].result.is_success());

    // Callbacks fire in strict arrival order
    assert_eq!(
        collector.event_types(),
        vec![
            "token",
            "tool_call_start",
            "tool_call_complete",
            "token",
            "token",
            "token",
            "token",
            "complete",
        ]
    );

    // One action entry, correlation carrying the conversation's lineage
    let actions = fixture.audit.entries_in_category(AuditCategory::Action);
    assert_eq!(actions.len(), 1);
    assert!(actions[0]
        .correlation_id
        .starts_with(&format!("{}:", conversation.id())));

    // History: user, assistant tool use, tool result, final assistant text
    assert_eq!(conversation.message_count(), 4);
}

#[tokio::test]
async fn denied_tool_call_is_recoverable_and_audited_once() {
    let provider = MockProvider::new()
        .with_tool_call(
            "delete_resource",
            json!({
                "resourceType": "tag",
                "resourcePath": "plc/motor1",
                "options": {"force": true}
            }),
        )
        .with_text("I am not allowed to delete that tag.");
    let fixture = fixture(provider);
    // Read-only key: the forced delete is denied for missing tag:delete
    let conversation = fixture
        .manager
        .create_conversation(AuthContext::new("user-1", perms(&["tag:read"])));
    let collector = CollectingHandler::new();

    let outcome = fixture
        .manager
        .send_message(conversation.id(), "Delete motor1", &collector)
        .await
        .unwrap();

    // The turn completed; the refusal became a failed tool result
    assert_eq!(outcome.text, "I am not allowed to delete that tag.");
    assert!(!collector.has_event("error"));
    assert_eq!(collector.count_event("tool_call_complete"), 1);
    let failed = collector
        .events()
        .into_iter()
        .find_map(|e| match e {
            HandlerEvent::ToolCallComplete { status, .. } => Some(status),
            _ => None,
        })
        .unwrap();
    assert_eq!(failed, ActionStatus::Failure);

    // Exactly one audit entry for the denial, and nothing executed
    assert_eq!(fixture.audit.entries_in_category(AuditCategory::Policy).len(), 1);
    assert_eq!(fixture.audit.entries_in_category(AuditCategory::Action).len(), 0);
    assert!(fixture.tags.contains("plc/motor1"));
}

#[tokio::test]
async fn confirmation_demand_is_never_silently_forced() {
    let provider = MockProvider::new()
        .with_tool_call(
            "delete_resource",
            json!({"resourceType": "tag", "resourcePath": "plc/motor1"}),
        )
        .with_text("That delete needs your explicit confirmation.");
    let fixture = fixture(provider);
    // The key holds tag:delete, but the call lacks force
    let conversation = fixture
        .manager
        .create_conversation(AuthContext::new("user-1", perms(&["tag:delete"])));
    let collector = CollectingHandler::new();

    let outcome = fixture
        .manager
        .send_message(conversation.id(), "Delete motor1", &collector)
        .await
        .unwrap();

    assert_eq!(outcome.tool_calls.len(), 1);
    let result = &outcome.tool_calls[0].result;
    assert_eq!(result.status, ActionStatus::Failure);
    assert!(result.message.contains("confirmation required"));

    // The resource survived, and no retry with force happened behind the
    // user's back
    assert!(fixture.tags.contains("plc/motor1"));
    assert_eq!(fixture.audit.entries_in_category(AuditCategory::Policy).len(), 1);
    assert_eq!(fixture.audit.entries_in_category(AuditCategory::Action).len(), 0);
}

#[tokio::test]
async fn forced_delete_with_permission_executes() {
    let provider = MockProvider::new()
        .with_tool_call(
            "delete_resource",
            json!({
                "resourceType": "tag",
                "resourcePath": "plc/motor1",
                "options": {"force": true, "comment": "user confirmed in chat"}
            }),
        )
        .with_text("Deleted.");
    let fixture = fixture(provider);
    let conversation = fixture
        .manager
        .create_conversation(AuthContext::new("user-1", perms(&["tag:delete"])));

    let outcome = fixture
        .manager
        .send_message(conversation.id(), "Yes, really delete it", &CollectingHandler::new())
        .await
        .unwrap();

    assert!(outcome.tool_calls[0].result.is_success());
    assert!(!fixture.tags.contains("plc/motor1"));

    let actions = fixture.audit.entries_in_category(AuditCategory::Action);
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].details["comment"], json!("user confirmed in chat"));
}

#[tokio::test]
async fn provider_failure_fails_turn_but_preserves_history() {
    let provider =
        MockProvider::new().with_stream_error(ProviderError::ServiceUnavailable("503".into()));
    let fixture = fixture(provider);
    let conversation = fixture
        .manager
        .create_conversation(AuthContext::new("user-1", perms(&["tag:read"])));
    let collector = CollectingHandler::new();

    let err = fixture
        .manager
        .send_message(conversation.id(), "Status?", &collector)
        .await
        .unwrap_err();

    assert!(matches!(err, ConversationError::Provider(_)));
    assert!(collector.has_event("error"));
    assert!(!collector.has_event("complete"));

    // The user message is still there for a retry
    assert_eq!(conversation.message_count(), 1);
}

#[tokio::test]
async fn malformed_tool_input_becomes_validation_failure() {
    let provider = MockProvider::new()
        .with_tool_call("read_resource", json!({"resourcePath": "plc/motor1"}))
        .with_text("Sorry, that request was malformed.");
    let fixture = fixture(provider);
    let conversation = fixture
        .manager
        .create_conversation(AuthContext::new("user-1", perms(&["tag:read"])));
    let collector = CollectingHandler::new();

    let outcome = fixture
        .manager
        .send_message(conversation.id(), "Read the tag", &collector)
        .await
        .unwrap();

    // Missing resourceType: rejected locally, fed back, turn continues
    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(
        outcome.tool_calls[0].result.status,
        ActionStatus::ValidationFailed
    );
    assert!(!collector.has_event("error"));

    let actions = fixture.audit.entries_in_category(AuditCategory::Action);
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].event_type, "action.invalid");
}

#[tokio::test]
async fn unknown_tool_is_rejected_not_fatal() {
    let provider = MockProvider::new()
        .with_tool_call("reboot_gateway", json!({}))
        .with_text("There is no such tool.");
    let fixture = fixture(provider);
    let conversation = fixture
        .manager
        .create_conversation(AuthContext::new("user-1", perms(&["tag:read"])));

    let outcome = fixture
        .manager
        .send_message(conversation.id(), "Reboot it", &CollectingHandler::new())
        .await
        .unwrap();

    assert_eq!(
        outcome.tool_calls[0].result.status,
        ActionStatus::ValidationFailed
    );
    assert_eq!(outcome.text, "There is no such tool.");
}

#[tokio::test]
async fn relative_paths_resolve_against_conversation_scope() {
    let provider = MockProvider::new()
        .with_tool_call(
            "read_resource",
            json!({"resourceType": "tag", "resourcePath": "./motor1"}),
        )
        .with_text("Found it.");
    let fixture = fixture(provider);
    let conversation = fixture
        .manager
        .create_conversation(AuthContext::new("user-1", perms(&["tag:read"])));
    conversation.set_scope(gantry_core::ConversationScope {
        project: Some("site-a".to_string()),
        path: Some("plc".to_string()),
    });

    let outcome = fixture
        .manager
        .send_message(conversation.id(), "Read motor1", &CollectingHandler::new())
        .await
        .unwrap();

    assert!(outcome.tool_calls[0].result.is_success());
    let actions = fixture.audit.entries_in_category(AuditCategory::Action);
    assert_eq!(actions[0].resource_path.as_deref(), Some("plc/motor1"));
}

#[tokio::test]
async fn dry_run_tool_call_changes_nothing() {
    let provider = MockProvider::new()
        .with_tool_call(
            "delete_resource",
            json!({
                "resourceType": "tag",
                "resourcePath": "plc/motor1",
                "options": {"dryRun": true, "force": true}
            }),
        )
        .with_text("A real delete would succeed.");
    let fixture = fixture(provider);
    let conversation = fixture
        .manager
        .create_conversation(AuthContext::new("user-1", perms(&["tag:delete"])));

    let outcome = fixture
        .manager
        .send_message(conversation.id(), "Would a delete work?", &CollectingHandler::new())
        .await
        .unwrap();

    assert!(outcome.tool_calls[0].result.is_success());
    assert!(fixture.tags.contains("plc/motor1"));
}

#[tokio::test]
async fn shutdown_rejects_new_turns() {
    let fixture = fixture(MockProvider::new().with_text("never sent"));
    let conversation = fixture
        .manager
        .create_conversation(AuthContext::new("user-1", perms(&["tag:read"])));

    fixture.manager.shutdown(Duration::from_millis(50)).await;
    assert!(fixture.manager.is_shutting_down());

    let err = fixture
        .manager
        .send_message(conversation.id(), "Status?", &CollectingHandler::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ConversationError::ShuttingDown));
}

#[tokio::test]
async fn unknown_conversation_id_errors() {
    let fixture = fixture(MockProvider::new());
    let err = fixture
        .manager
        .send_message("no-such-id", "hello", &CollectingHandler::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ConversationError::NotFound(_)));
}
