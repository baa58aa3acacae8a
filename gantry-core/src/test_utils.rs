//! Test utilities for gantry-core.
//!
//! Mock implementations for exercising the conversation loop, policy
//! engine, and executor without a real LLM backend or resource store.
//!
//! # Example
//!
//! ```rust
//! use gantry_core::test_utils::MockProvider;
//! use serde_json::json;
//!
//! // One turn of text, then a turn that requests a tool call
//! let provider = MockProvider::new()
//!     .with_tool_call("read_resource", json!({
//!         "resourceType": "tag",
//!         "resourcePath": "plc/motor1"
//!     }))
//!     .with_text("The tag is healthy.");
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::RwLock;
use serde_json::Value;

use crate::action::{Action, ActionDetail, ResourceType};
use crate::conversation::ConversationError;
use crate::executor::{ActionStatus, HandlerError, ResourceHandler};
use crate::provider::{ModelProvider, ProviderError, StreamEvent};
use crate::streaming::{StreamingResponseHandler, ToolCallOutcome, ToolCallStart, TurnCompletion};
use crate::types::{Message, StopReason, ToolDefinition, ToolUseBlock};
use crate::validation::ValidationResult;

/// A mock model provider that replays scripted response streams in order.
///
/// Each `with_*` call queues one model turn. Text is split into
/// word-by-word deltas so token streaming is actually exercised.
pub struct MockProvider {
    scripts: Mutex<Vec<Vec<Result<StreamEvent, ProviderError>>>>,
    call_count: Mutex<usize>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(Vec::new()),
            call_count: Mutex::new(0),
        }
    }

    /// Queue a text-only turn ending with `StopReason::EndTurn`
    pub fn with_text(self, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut events: Vec<Result<StreamEvent, ProviderError>> = text
            .split_inclusive(' ')
            .map(|chunk| Ok(StreamEvent::TextDelta(chunk.to_string())))
            .collect();
        events.push(Ok(StreamEvent::Stop {
            stop_reason: StopReason::EndTurn,
            usage: None,
        }));
        self.scripts.lock().unwrap().push(events);
        self
    }

    /// Queue a turn that requests one tool call
    pub fn with_tool_call(self, tool_name: impl Into<String>, input: Value) -> Self {
        self.with_text_and_tool_call("", tool_name, input)
    }

    /// Queue a turn with leading text followed by a tool call
    pub fn with_text_and_tool_call(
        self,
        text: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
    ) -> Self {
        let text = text.into();
        let mut events: Vec<Result<StreamEvent, ProviderError>> = Vec::new();
        if !text.is_empty() {
            events.push(Ok(StreamEvent::TextDelta(text)));
        }
        events.push(Ok(StreamEvent::ToolCall(ToolUseBlock {
            id: format!("tool_{}", uuid::Uuid::new_v4()),
            name: tool_name.into(),
            input,
        })));
        events.push(Ok(StreamEvent::Stop {
            stop_reason: StopReason::ToolUse,
            usage: None,
        }));
        self.scripts.lock().unwrap().push(events);
        self
    }

    /// Queue a turn that fails mid-stream
    pub fn with_stream_error(self, error: ProviderError) -> Self {
        self.scripts.lock().unwrap().push(vec![Err(error)]);
        self
    }

    /// Queue a raw event sequence
    pub fn with_events(self, events: Vec<Result<StreamEvent, ProviderError>>) -> Self {
        self.scripts.lock().unwrap().push(events);
        self
    }

    /// How many times `generate_stream` was called
    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "MockProvider"
    }

    async fn generate_stream(
        &self,
        _messages: Vec<Message>,
        _tools: Vec<ToolDefinition>,
        _system_prompt: Option<String>,
    ) -> Result<BoxStream<'static, Result<StreamEvent, ProviderError>>, ProviderError> {
        *self.call_count.lock().unwrap() += 1;

        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            return Err(ProviderError::Other(
                "MockProvider: no more scripted responses".to_string(),
            ));
        }
        let events = scripts.remove(0);

        let stream = async_stream::stream! {
            for event in events {
                yield event;
            }
        };
        Ok(stream.boxed())
    }
}

/// In-memory resource handler: a path-to-value store implementing the
/// handler seam, with merge-vs-replace update semantics and recursive
/// delete.
///
/// # Example
///
/// ```rust
/// use gantry_core::test_utils::MemoryResourceHandler;
/// use gantry_core::{Action, ResourceHandler, ResourceType};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let handler = MemoryResourceHandler::new(ResourceType::Tag)
///     .with_resource("plc/motor1", json!({"value": 1}));
///
/// let read = Action::read("c1", ResourceType::Tag, "plc/motor1");
/// let value = handler.read(&read).await.unwrap();
/// assert_eq!(value["value"], 1);
/// # });
/// ```
pub struct MemoryResourceHandler {
    resource_type: ResourceType,
    store: RwLock<HashMap<String, Value>>,
}

impl MemoryResourceHandler {
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            store: RwLock::new(HashMap::new()),
        }
    }

    /// Seed a resource
    pub fn with_resource(self, path: impl Into<String>, value: Value) -> Self {
        self.store.write().insert(path.into(), value);
        self
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.store.read().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.store.read().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    fn list_prefix(path: &str) -> &str {
        path.trim_end_matches('*').trim_end_matches('/')
    }
}

#[async_trait]
impl ResourceHandler for MemoryResourceHandler {
    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    async fn create(&self, action: &Action) -> Result<Value, HandlerError> {
        let ActionDetail::Create { payload } = action.detail() else {
            return Err(HandlerError::Other("not a create action".to_string()));
        };
        let mut store = self.store.write();
        let path = action.resource_path().to_string();
        if store.contains_key(&path) {
            return Err(HandlerError::AlreadyExists(path));
        }
        store.insert(path.clone(), Value::Object(payload.clone()));
        Ok(serde_json::json!({ "path": path, "created": true }))
    }

    async fn read(&self, action: &Action) -> Result<Value, HandlerError> {
        let store = self.store.read();
        let value = store
            .get(action.resource_path())
            .ok_or_else(|| HandlerError::NotFound(action.resource_path().to_string()))?;

        if let ActionDetail::Read { fields, .. } = action.detail() {
            if !fields.is_empty() {
                if let Value::Object(map) = value {
                    let projected: serde_json::Map<String, Value> = map
                        .iter()
                        .filter(|(k, _)| fields.contains(k))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    return Ok(Value::Object(projected));
                }
            }
        }
        Ok(value.clone())
    }

    async fn update(&self, action: &Action) -> Result<Value, HandlerError> {
        let ActionDetail::Update { payload, merge } = action.detail() else {
            return Err(HandlerError::Other("not an update action".to_string()));
        };
        let mut store = self.store.write();
        let path = action.resource_path().to_string();
        let Some(existing) = store.get_mut(&path) else {
            return Err(HandlerError::NotFound(path));
        };

        if *merge {
            if let Value::Object(existing_map) = existing {
                for (k, v) in payload {
                    existing_map.insert(k.clone(), v.clone());
                }
            } else {
                *existing = Value::Object(payload.clone());
            }
        } else {
            *existing = Value::Object(payload.clone());
        }
        Ok(existing.clone())
    }

    async fn delete(&self, action: &Action) -> Result<Value, HandlerError> {
        let ActionDetail::Delete { recursive } = action.detail() else {
            return Err(HandlerError::Other("not a delete action".to_string()));
        };
        let mut store = self.store.write();
        let path = action.resource_path().to_string();
        let mut deleted = 0usize;

        if store.remove(&path).is_some() {
            deleted += 1;
        }
        if *recursive {
            let child_prefix = format!("{}/", path);
            let children: Vec<String> = store
                .keys()
                .filter(|k| k.starts_with(&child_prefix))
                .cloned()
                .collect();
            for child in children {
                store.remove(&child);
                deleted += 1;
            }
        }

        if deleted == 0 {
            return Err(HandlerError::NotFound(path));
        }
        Ok(serde_json::json!({ "deleted": deleted }))
    }

    async fn list(&self, action: &Action) -> Result<Value, HandlerError> {
        let prefix = Self::list_prefix(action.resource_path());
        let store = self.store.read();
        let mut paths: Vec<String> = store
            .keys()
            .filter(|k| prefix.is_empty() || k.starts_with(prefix))
            .cloned()
            .collect();
        paths.sort();
        Ok(serde_json::json!({ "paths": paths }))
    }

    async fn validate(&self, action: &Action) -> ValidationResult {
        let mut result = ValidationResult::new();
        match action.detail() {
            ActionDetail::Create { .. } => {
                if self.contains(action.resource_path()) {
                    result.add_error("resourcePath", "resource already exists");
                }
            }
            ActionDetail::Update { .. } | ActionDetail::Delete { .. } => {
                if !self.contains(action.resource_path()) {
                    result.add_error("resourcePath", "resource does not exist");
                }
            }
            _ => {}
        }
        result
    }
}

/// One recorded streaming callback invocation
#[derive(Debug, Clone)]
pub enum HandlerEvent {
    Token(String),
    ToolCallStart {
        tool_name: String,
    },
    ToolCallComplete {
        tool_name: String,
        status: ActionStatus,
    },
    Complete {
        text: String,
    },
    Error(String),
}

/// Records streaming callbacks for verification in tests.
#[derive(Clone, Default)]
pub struct CollectingHandler {
    events: Arc<Mutex<Vec<HandlerEvent>>>,
}

impl CollectingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HandlerEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Short type names of recorded events, in order
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(Self::event_type_name)
            .collect()
    }

    pub fn has_event(&self, event_type: &str) -> bool {
        self.event_types().contains(&event_type)
    }

    pub fn count_event(&self, event_type: &str) -> usize {
        self.event_types()
            .iter()
            .filter(|t| **t == event_type)
            .count()
    }

    /// All tokens concatenated
    pub fn tokens(&self) -> String {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                HandlerEvent::Token(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Final text from `on_complete`, if the turn completed
    pub fn completion_text(&self) -> Option<String> {
        self.events.lock().unwrap().iter().rev().find_map(|e| {
            if let HandlerEvent::Complete { text } = e {
                Some(text.clone())
            } else {
                None
            }
        })
    }

    fn event_type_name(event: &HandlerEvent) -> &'static str {
        match event {
            HandlerEvent::Token(_) => "token",
            HandlerEvent::ToolCallStart { .. } => "tool_call_start",
            HandlerEvent::ToolCallComplete { .. } => "tool_call_complete",
            HandlerEvent::Complete { .. } => "complete",
            HandlerEvent::Error(_) => "error",
        }
    }
}

impl StreamingResponseHandler for CollectingHandler {
    fn on_token(&self, token: &str) {
        self.events
            .lock()
            .unwrap()
            .push(HandlerEvent::Token(token.to_string()));
    }

    fn on_tool_call_start(&self, call: &ToolCallStart) {
        self.events.lock().unwrap().push(HandlerEvent::ToolCallStart {
            tool_name: call.tool_name.clone(),
        });
    }

    fn on_tool_call_complete(&self, call: &ToolCallOutcome) {
        self.events
            .lock()
            .unwrap()
            .push(HandlerEvent::ToolCallComplete {
                tool_name: call.tool_name.clone(),
                status: call.result.status,
            });
    }

    fn on_complete(&self, completion: &TurnCompletion) {
        self.events.lock().unwrap().push(HandlerEvent::Complete {
            text: completion.text.clone(),
        });
    }

    fn on_error(&self, error: &ConversationError) {
        self.events
            .lock()
            .unwrap()
            .push(HandlerEvent::Error(error.to_string()));
    }
}
