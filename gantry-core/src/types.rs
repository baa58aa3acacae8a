//! Provider-agnostic conversation types
//!
//! These types abstract over model-backend SDKs so the conversation loop
//! works with any backend behind the [`crate::provider::ModelProvider`] seam.
//! Tool results carry the serialized [`crate::executor::ActionResult`] that
//! was produced for the corresponding tool call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Create a new user message with text content
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text(text.into())],
        }
    }

    /// Create a new assistant message with text content
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text(text.into())],
        }
    }

    /// Create a new user message carrying tool results
    pub fn tool_results(results: Vec<ToolResultBlock>) -> Self {
        Self {
            role: Role::User,
            content: results.into_iter().map(ContentBlock::ToolResult).collect(),
        }
    }

    /// Create an assistant message with text and tool use blocks
    pub fn assistant_with_tool_use(text: impl Into<String>, tool_uses: Vec<ToolUseBlock>) -> Self {
        let text = text.into();
        let mut content = Vec::new();
        if !text.is_empty() {
            content.push(ContentBlock::Text(text));
        }
        content.extend(tool_uses.into_iter().map(ContentBlock::ToolUse));
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Get all text content concatenated
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ContentBlock::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Get all tool use blocks
    pub fn tool_uses(&self) -> Vec<&ToolUseBlock> {
        self.content
            .iter()
            .filter_map(|c| match c {
                ContentBlock::ToolUse(t) => Some(t),
                _ => None,
            })
            .collect()
    }
}

/// Content block within a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content
    Text(String),
    /// Tool use request from the assistant
    ToolUse(ToolUseBlock),
    /// Tool result fed back to the model
    ToolResult(ToolResultBlock),
}

/// A tool use request from the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseBlock {
    /// Unique ID for this tool use (used to match with its result)
    pub id: String,
    /// Tool name
    pub name: String,
    /// Tool input parameters as JSON
    pub input: Value,
}

/// Result of a tool execution, fed back to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultBlock {
    /// ID of the tool use this is a result for
    pub tool_use_id: String,
    /// Serialized action result
    pub content: Value,
    /// Whether the tool execution succeeded
    pub status: ToolResultStatus,
}

/// Status of a tool result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultStatus {
    Success,
    Error,
}

/// Definition of a tool available to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for input parameters
    pub input_schema: Value,
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of response
    EndTurn,
    /// Model wants to use a tool
    ToolUse,
    /// Hit max token limit
    MaxTokens,
    /// Content was filtered
    ContentFiltered,
    /// Stop sequence encountered
    StopSequence,
    /// Unknown/other reason
    #[default]
    Unknown,
}

/// Token usage statistics from the model
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}
