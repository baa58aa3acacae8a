//! Action model: immutable descriptions of requested operations.
//!
//! An [`Action`] describes exactly one requested CRUD/list operation against
//! a named configuration resource: a shared header (correlation id, resource
//! type, resource path, options) plus a variant-specific [`ActionDetail`].
//! Actions are immutable once constructed; a rejected or retried action is a
//! new instance, never a mutation.
//!
//! The [`ActionRequest`] DTO is the JSON wire format accepted at the external
//! boundary, and [`action_tool_definitions`] derives the tool schemas the
//! conversation loop advertises to the model.

use std::collections::HashSet;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::ToolDefinition;
use crate::validation::ValidationResult;

/// Maximum length of a resource path
pub const MAX_RESOURCE_PATH_LEN: usize = 500;
/// Maximum length of an audit comment
pub const MAX_COMMENT_LEN: usize = 1000;

/// Resource types the action surface can address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    Tag,
    PerspectiveView,
    Script,
    NamedQuery,
    Project,
    GatewayConfig,
}

impl ResourceType {
    /// All known resource types
    pub const ALL: [ResourceType; 6] = [
        ResourceType::Tag,
        ResourceType::PerspectiveView,
        ResourceType::Script,
        ResourceType::NamedQuery,
        ResourceType::Project,
        ResourceType::GatewayConfig,
    ];

    /// Canonical kebab-case code
    pub fn code(&self) -> &'static str {
        match self {
            ResourceType::Tag => "tag",
            ResourceType::PerspectiveView => "perspective-view",
            ResourceType::Script => "script",
            ResourceType::NamedQuery => "named-query",
            ResourceType::Project => "project",
            ResourceType::GatewayConfig => "gateway-config",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error for unrecognized resource type codes
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown resource type: {0}")]
pub struct UnknownResourceType(pub String);

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    /// Parse a resource type code, normalizing aliases (`view` is accepted
    /// for `perspective-view`, `query` for `named-query`) before lookup.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tag" => Ok(ResourceType::Tag),
            "perspective-view" | "view" => Ok(ResourceType::PerspectiveView),
            "script" => Ok(ResourceType::Script),
            "named-query" | "query" => Ok(ResourceType::NamedQuery),
            "project" => Ok(ResourceType::Project),
            "gateway-config" => Ok(ResourceType::GatewayConfig),
            other => Err(UnknownResourceType(other.to_string())),
        }
    }
}

/// The CRUD/list verb of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl ActionType {
    /// All action verbs
    pub const ALL: [ActionType; 5] = [
        ActionType::Create,
        ActionType::Read,
        ActionType::Update,
        ActionType::Delete,
        ActionType::List,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ActionType::Create => "create",
            ActionType::Read => "read",
            ActionType::Update => "update",
            ActionType::Delete => "delete",
            ActionType::List => "list",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Execution options carried on every action.
///
/// Defaults make the safest choice explicit: omitting every field yields
/// `dry_run = false`, `force = false`, no comment, and therefore never
/// bypasses the confirmation gate for a destructive operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionOptions {
    /// Validate without side effects
    pub dry_run: bool,
    /// Bypass the confirmation gate (requires explicit user confirmation upstream)
    pub force: bool,
    /// Free-form note carried into the audit trail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Variant-specific payload of an [`Action`]
#[derive(Debug, Clone, PartialEq)]
pub enum ActionDetail {
    Create {
        payload: Map<String, Value>,
    },
    Read {
        /// Field projection; empty means all fields
        fields: Vec<String>,
        depth: Option<u32>,
    },
    Update {
        payload: Map<String, Value>,
        /// Merge into the existing resource (`true`, default) or replace it
        /// wholesale (`false`, destructive)
        merge: bool,
    },
    Delete {
        recursive: bool,
    },
    List,
}

/// One requested operation against a named resource.
///
/// # Example
///
/// ```rust
/// use gantry_core::{Action, ActionOptions, ResourceType};
///
/// let action = Action::delete("req-1", ResourceType::Tag, "plc/motor1", false);
/// assert!(action.is_destructive());
/// assert!(action.requires_confirmation());
///
/// let forced = action.with_options(ActionOptions {
///     force: true,
///     ..Default::default()
/// });
/// assert!(!forced.requires_confirmation());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    correlation_id: String,
    resource_type: ResourceType,
    resource_path: String,
    options: ActionOptions,
    detail: ActionDetail,
}

impl Action {
    /// Create-resource action
    pub fn create(
        correlation_id: impl Into<String>,
        resource_type: ResourceType,
        resource_path: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            resource_type,
            resource_path: resource_path.into(),
            options: ActionOptions::default(),
            detail: ActionDetail::Create { payload },
        }
    }

    /// Read-resource action
    pub fn read(
        correlation_id: impl Into<String>,
        resource_type: ResourceType,
        resource_path: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            resource_type,
            resource_path: resource_path.into(),
            options: ActionOptions::default(),
            detail: ActionDetail::Read {
                fields: Vec::new(),
                depth: None,
            },
        }
    }

    /// Update-resource action. `merge = true` (the default at the wire
    /// boundary) folds the payload into the existing resource; `merge = false`
    /// replaces it wholesale and is treated as destructive.
    pub fn update(
        correlation_id: impl Into<String>,
        resource_type: ResourceType,
        resource_path: impl Into<String>,
        payload: Map<String, Value>,
        merge: bool,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            resource_type,
            resource_path: resource_path.into(),
            options: ActionOptions::default(),
            detail: ActionDetail::Update { payload, merge },
        }
    }

    /// Delete-resource action
    pub fn delete(
        correlation_id: impl Into<String>,
        resource_type: ResourceType,
        resource_path: impl Into<String>,
        recursive: bool,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            resource_type,
            resource_path: resource_path.into(),
            options: ActionOptions::default(),
            detail: ActionDetail::Delete { recursive },
        }
    }

    /// List-resources action. The path may end in a wildcard segment.
    pub fn list(
        correlation_id: impl Into<String>,
        resource_type: ResourceType,
        resource_path: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            resource_type,
            resource_path: resource_path.into(),
            options: ActionOptions::default(),
            detail: ActionDetail::List,
        }
    }

    /// Return a copy of this action with different options.
    ///
    /// Actions are immutable; this consumes and rebuilds rather than
    /// mutating in place.
    pub fn with_options(mut self, options: ActionOptions) -> Self {
        self.options = options;
        self
    }

    /// Build an action from the wire-format request, normalizing resource
    /// type aliases and applying variant defaults (`merge = true`,
    /// `recursive = false`).
    ///
    /// Malformed requests come back as field-level errors, never a panic.
    pub fn from_request(request: ActionRequest) -> Result<Self, ValidationResult> {
        let resource_type = match ResourceType::from_str(&request.resource_type) {
            Ok(rt) => rt,
            Err(e) => {
                return Err(ValidationResult::invalid("resourceType", e.to_string()));
            }
        };

        let detail = match request.action {
            ActionType::Create => ActionDetail::Create {
                payload: request.payload.unwrap_or_default(),
            },
            ActionType::Read => ActionDetail::Read {
                fields: request.fields.unwrap_or_default(),
                depth: request.depth,
            },
            ActionType::Update => ActionDetail::Update {
                payload: request.payload.unwrap_or_default(),
                merge: request.merge.unwrap_or(true),
            },
            ActionType::Delete => ActionDetail::Delete {
                recursive: request.recursive.unwrap_or(false),
            },
            ActionType::List => ActionDetail::List,
        };

        let action = Self {
            correlation_id: request.correlation_id,
            resource_type,
            resource_path: request.resource_path,
            options: request.options,
            detail,
        };

        let validation = action.validate();
        if validation.is_valid() {
            Ok(action)
        } else {
            Err(validation)
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    pub fn options(&self) -> &ActionOptions {
        &self.options
    }

    pub fn detail(&self) -> &ActionDetail {
        &self.detail
    }

    /// The verb of this action
    pub fn action_type(&self) -> ActionType {
        match self.detail {
            ActionDetail::Create { .. } => ActionType::Create,
            ActionDetail::Read { .. } => ActionType::Read,
            ActionDetail::Update { .. } => ActionType::Update,
            ActionDetail::Delete { .. } => ActionType::Delete,
            ActionDetail::List => ActionType::List,
        }
    }

    /// Whether this action deletes or wholesale-replaces data.
    ///
    /// Delete is always destructive; Update only when not merging.
    pub fn is_destructive(&self) -> bool {
        match self.detail {
            ActionDetail::Delete { .. } => true,
            ActionDetail::Update { merge, .. } => !merge,
            _ => false,
        }
    }

    /// Whether this action needs explicit confirmation before it may run.
    ///
    /// Destructive actions require confirmation unless `options.force` is
    /// set; Read and List never do.
    pub fn requires_confirmation(&self) -> bool {
        self.is_destructive() && !self.options.force
    }

    /// Validate the action's own fields (no handler involvement).
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.correlation_id.trim().is_empty() {
            result.add_error("correlationId", "must not be empty");
        }

        if self.resource_path.len() > MAX_RESOURCE_PATH_LEN {
            result.add_error_code(
                "resourcePath",
                format!("exceeds {} characters", MAX_RESOURCE_PATH_LEN),
                "path-too-long",
            );
        }

        let is_list = self.action_type() == ActionType::List;
        if self.resource_path.trim().is_empty() && !is_list {
            result.add_error("resourcePath", "must not be empty");
        }

        if self.resource_path.contains('*') {
            // Only a trailing wildcard segment, and only for List
            let trailing = self.resource_path == "*" || self.resource_path.ends_with("/*");
            if !is_list {
                result.add_error_code(
                    "resourcePath",
                    "wildcards are only valid for list actions",
                    "wildcard-not-allowed",
                );
            } else if !trailing || self.resource_path.matches('*').count() > 1 {
                result.add_error_code(
                    "resourcePath",
                    "wildcard must be a single trailing segment",
                    "wildcard-malformed",
                );
            }
        }

        if let Some(comment) = &self.options.comment {
            if comment.len() > MAX_COMMENT_LEN {
                result.add_error_code(
                    "options.comment",
                    format!("exceeds {} characters", MAX_COMMENT_LEN),
                    "comment-too-long",
                );
            }
        }

        match &self.detail {
            ActionDetail::Create { payload } | ActionDetail::Update { payload, .. } => {
                if payload.is_empty() {
                    result.add_warning("payload is empty");
                }
            }
            ActionDetail::Read { fields, .. } => {
                let unique: HashSet<&String> = fields.iter().collect();
                if unique.len() != fields.len() {
                    result.add_warning("duplicate entries in field projection");
                }
            }
            _ => {}
        }

        result
    }
}

/// Wire-format action request (JSON over the external boundary).
///
/// Variant-specific fields (`payload`, `fields`, `depth`, `recursive`,
/// `merge`) are optional; defaults are applied by [`Action::from_request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub correlation_id: String,
    pub action: ActionType,
    pub resource_type: String,
    #[serde(default)]
    pub resource_path: String,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub recursive: Option<bool>,
    #[serde(default)]
    pub merge: Option<bool>,
    #[serde(default)]
    pub options: ActionOptions,
}

// ============================================================================
// Tool definitions for the conversation loop
// ============================================================================

/// Input schema for the `create_resource` tool
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateInput {
    /// Resource type: tag, perspective-view, script, named-query, project, or gateway-config
    pub resource_type: String,
    /// Path of the resource to create
    pub resource_path: String,
    /// Initial resource content
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub options: ActionOptions,
}

/// Input schema for the `read_resource` tool
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadInput {
    /// Resource type: tag, perspective-view, script, named-query, project, or gateway-config
    pub resource_type: String,
    /// Path of the resource to read
    pub resource_path: String,
    /// Optional field projection; omit for all fields
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    /// Optional traversal depth for nested resources
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub options: ActionOptions,
}

/// Input schema for the `update_resource` tool
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInput {
    /// Resource type: tag, perspective-view, script, named-query, project, or gateway-config
    pub resource_type: String,
    /// Path of the resource to update
    pub resource_path: String,
    /// New or changed resource content
    pub payload: Map<String, Value>,
    /// Merge into the existing resource (default true); false replaces it wholesale
    #[serde(default)]
    pub merge: Option<bool>,
    #[serde(default)]
    pub options: ActionOptions,
}

/// Input schema for the `delete_resource` tool
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteInput {
    /// Resource type: tag, perspective-view, script, named-query, project, or gateway-config
    pub resource_type: String,
    /// Path of the resource to delete
    pub resource_path: String,
    /// Also delete children of the path (default false)
    #[serde(default)]
    pub recursive: Option<bool>,
    #[serde(default)]
    pub options: ActionOptions,
}

/// Input schema for the `list_resources` tool
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListInput {
    /// Resource type: tag, perspective-view, script, named-query, project, or gateway-config
    pub resource_type: String,
    /// Path to list under; may end in a trailing `/*` wildcard segment
    #[serde(default)]
    pub resource_path: String,
    #[serde(default)]
    pub options: ActionOptions,
}

fn schema_value<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).expect("Failed to serialize schema")
}

/// Tool definitions derived from the registered action types.
///
/// These are the tools the conversation loop advertises to the model; each
/// maps back to an [`ActionType`] via [`action_type_for_tool`].
pub fn action_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "create_resource".to_string(),
            description: "Create a new configuration resource at the given path".to_string(),
            input_schema: schema_value::<CreateInput>(),
        },
        ToolDefinition {
            name: "read_resource".to_string(),
            description: "Read a configuration resource".to_string(),
            input_schema: schema_value::<ReadInput>(),
        },
        ToolDefinition {
            name: "update_resource".to_string(),
            description: "Update a configuration resource. Merges by default; set merge=false to replace wholesale (requires confirmation)".to_string(),
            input_schema: schema_value::<UpdateInput>(),
        },
        ToolDefinition {
            name: "delete_resource".to_string(),
            description: "Delete a configuration resource (requires confirmation unless forced)".to_string(),
            input_schema: schema_value::<DeleteInput>(),
        },
        ToolDefinition {
            name: "list_resources".to_string(),
            description: "List configuration resources under a path".to_string(),
            input_schema: schema_value::<ListInput>(),
        },
    ]
}

/// Map a tool name back to its action verb
pub fn action_type_for_tool(name: &str) -> Option<ActionType> {
    match name {
        "create_resource" => Some(ActionType::Create),
        "read_resource" => Some(ActionType::Read),
        "update_resource" => Some(ActionType::Update),
        "delete_resource" => Some(ActionType::Delete),
        "list_resources" => Some(ActionType::List),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    // ===== Resource Type Tests =====

    #[test]
    fn test_resource_type_roundtrip() {
        for rt in ResourceType::ALL {
            assert_eq!(ResourceType::from_str(rt.code()).unwrap(), rt);
        }
    }

    #[test]
    fn test_resource_type_aliases_normalize() {
        assert_eq!(
            ResourceType::from_str("view").unwrap(),
            ResourceType::PerspectiveView
        );
        assert_eq!(
            ResourceType::from_str("query").unwrap(),
            ResourceType::NamedQuery
        );
        assert_eq!(
            ResourceType::from_str("VIEW").unwrap(),
            ResourceType::PerspectiveView
        );
    }

    #[test]
    fn test_resource_type_unknown() {
        assert!(ResourceType::from_str("widget").is_err());
    }

    // ===== Destructiveness Tests =====

    #[test]
    fn test_delete_is_destructive() {
        let action = Action::delete("c1", ResourceType::Tag, "plc/motor1", false);
        assert!(action.is_destructive());
        assert!(action.requires_confirmation());
    }

    #[test]
    fn test_forced_delete_skips_confirmation() {
        let action = Action::delete("c1", ResourceType::Tag, "plc/motor1", false).with_options(
            ActionOptions {
                force: true,
                ..Default::default()
            },
        );
        assert!(action.is_destructive());
        assert!(!action.requires_confirmation());
    }

    #[test]
    fn test_merge_update_is_not_destructive() {
        let action = Action::update(
            "c1",
            ResourceType::Tag,
            "plc/motor1",
            payload(json!({"x": 1})),
            true,
        );
        assert!(!action.is_destructive());
        assert!(!action.requires_confirmation());
    }

    #[test]
    fn test_replace_update_is_destructive() {
        let action = Action::update(
            "c1",
            ResourceType::Tag,
            "plc/motor1",
            payload(json!({"x": 1})),
            false,
        );
        assert!(action.is_destructive());
        assert!(action.requires_confirmation());
    }

    #[test]
    fn test_read_and_list_never_confirm() {
        assert!(!Action::read("c1", ResourceType::Script, "util/helpers").requires_confirmation());
        assert!(!Action::list("c1", ResourceType::Script, "util/*").requires_confirmation());
    }

    // ===== Default Safety Tests =====

    #[test]
    fn test_options_default_safe() {
        let options = ActionOptions::default();
        assert!(!options.dry_run);
        assert!(!options.force);
        assert!(options.comment.is_none());
    }

    #[test]
    fn test_request_defaults_are_safe() {
        // merge omitted => true (non-destructive); recursive omitted => false
        let request: ActionRequest = serde_json::from_value(json!({
            "correlationId": "c1",
            "action": "update",
            "resourceType": "tag",
            "resourcePath": "plc/motor1",
            "payload": {"x": 1}
        }))
        .unwrap();
        let action = Action::from_request(request).unwrap();
        assert!(!action.is_destructive());
        assert!(!action.requires_confirmation());

        let request: ActionRequest = serde_json::from_value(json!({
            "correlationId": "c2",
            "action": "delete",
            "resourceType": "tag",
            "resourcePath": "plc/motor1"
        }))
        .unwrap();
        let action = Action::from_request(request).unwrap();
        assert!(matches!(
            action.detail(),
            ActionDetail::Delete { recursive: false }
        ));
        assert!(action.requires_confirmation());
    }

    // ===== Validation Tests =====

    #[test]
    fn test_validate_empty_correlation_id() {
        let action = Action::read("", ResourceType::Tag, "plc/motor1");
        let result = action.validate();
        assert!(!result.is_valid());
        assert_eq!(result.errors[0].field, "correlationId");
    }

    #[test]
    fn test_validate_path_too_long() {
        let long_path = "a/".repeat(300);
        let action = Action::read("c1", ResourceType::Tag, long_path);
        assert!(!action.validate().is_valid());
    }

    #[test]
    fn test_validate_wildcard_only_for_list() {
        let action = Action::read("c1", ResourceType::Tag, "plc/*");
        assert!(!action.validate().is_valid());

        let action = Action::list("c1", ResourceType::Tag, "plc/*");
        assert!(action.validate().is_valid());
    }

    #[test]
    fn test_validate_wildcard_must_be_trailing() {
        let action = Action::list("c1", ResourceType::Tag, "plc/*/motor");
        assert!(!action.validate().is_valid());
    }

    #[test]
    fn test_validate_comment_too_long() {
        let action =
            Action::read("c1", ResourceType::Tag, "plc/motor1").with_options(ActionOptions {
                comment: Some("x".repeat(MAX_COMMENT_LEN + 1)),
                ..Default::default()
            });
        assert!(!action.validate().is_valid());
    }

    #[test]
    fn test_from_request_unknown_resource_type() {
        let request: ActionRequest = serde_json::from_value(json!({
            "correlationId": "c1",
            "action": "read",
            "resourceType": "widget",
            "resourcePath": "a/b"
        }))
        .unwrap();
        let err = Action::from_request(request).unwrap_err();
        assert_eq!(err.errors[0].field, "resourceType");
    }

    #[test]
    fn test_from_request_alias_normalizes() {
        let request: ActionRequest = serde_json::from_value(json!({
            "correlationId": "c1",
            "action": "read",
            "resourceType": "view",
            "resourcePath": "dash/overview"
        }))
        .unwrap();
        let action = Action::from_request(request).unwrap();
        assert_eq!(action.resource_type(), ResourceType::PerspectiveView);
    }

    // ===== Tool Definition Tests =====

    #[test]
    fn test_tool_definitions_cover_all_verbs() {
        let defs = action_tool_definitions();
        assert_eq!(defs.len(), ActionType::ALL.len());
        for def in &defs {
            let verb = action_type_for_tool(&def.name);
            assert!(verb.is_some(), "no verb mapping for tool {}", def.name);
            assert!(def.input_schema.is_object());
        }
    }

    #[test]
    fn test_action_type_for_unknown_tool() {
        assert!(action_type_for_tool("drop_database").is_none());
    }
}
