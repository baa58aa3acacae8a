//! The authorization algorithm.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use crate::action::{Action, ActionType, ResourceType};
use crate::audit::{AuditCategory, AuditEntry, AuditLogger, NewAuditEntry};
use crate::auth::{AuthContext, Permission};

use super::environment::EnvironmentMode;

/// Why an action may not proceed.
///
/// `ConfirmationRequired` is deliberately distinct from `Denied`: callers
/// should retry with `force` after explicit user confirmation rather than
/// treat it as a hard no.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The caller lacks a required permission or hit an environment
    /// restriction
    #[error("authorization denied: {reason}")]
    Denied {
        reason: String,
        /// The permission that would have satisfied the check, when one exists
        missing_permission: Option<Permission>,
    },

    /// Destructive action without `force` in an environment that requires
    /// confirmation
    #[error("confirmation required: {reason}")]
    ConfirmationRequired { reason: String },
}

impl PolicyError {
    pub fn is_denied(&self) -> bool {
        matches!(self, PolicyError::Denied { .. })
    }

    pub fn is_confirmation_required(&self) -> bool {
        matches!(self, PolicyError::ConfirmationRequired { .. })
    }
}

/// Tri-state outcome of the advisory [`PolicyEngine::evaluate`] path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny { reason: String },
    RequireConfirmation { reason: String },
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, PolicyDecision::Deny { .. })
    }

    pub fn requires_confirmation(&self) -> bool {
        matches!(self, PolicyDecision::RequireConfirmation { .. })
    }
}

/// A pluggable rule consulted by [`PolicyEngine::evaluate`], after the
/// built-in checks.
pub trait PolicyRule: Send + Sync {
    fn name(&self) -> &str;

    /// Return `Some` to decide, `None` to abstain
    fn evaluate(&self, action: &Action, user_id: &str) -> Option<PolicyDecision>;
}

/// Configuration for a [`PolicyEngine`].
///
/// The allow-lists feed only the coarse `evaluate` path; the default admits
/// every known action and resource combination.
pub struct PolicyEngineConfig {
    pub mode: EnvironmentMode,
    pub allowed_actions: HashSet<ActionType>,
    pub allowed_resources: HashSet<ResourceType>,
}

impl PolicyEngineConfig {
    /// Allow-everything configuration for the given mode
    pub fn for_mode(mode: EnvironmentMode) -> Self {
        Self {
            mode,
            allowed_actions: ActionType::ALL.into_iter().collect(),
            allowed_resources: ResourceType::ALL.into_iter().collect(),
        }
    }
}

impl Default for PolicyEngineConfig {
    fn default() -> Self {
        Self::for_mode(EnvironmentMode::default())
    }
}

/// Decides, per action, whether an operation may proceed.
///
/// The engine holds two overlapping rule sets. `authorize` checks the
/// caller's per-key permissions and is the authoritative gate at execution
/// time; `evaluate` checks the environment's global allow-lists and any
/// registered extension rules, returning an explicit tri-state for
/// pre-flight UI filtering where exceptions are inappropriate. When both
/// could apply, `authorize` wins.
///
/// Denials and confirmation demands are written to the audit log before
/// they are surfaced. Allowed outcomes are recorded by the execution layer,
/// so N attempted actions yield exactly N action/policy entries.
pub struct PolicyEngine {
    mode: EnvironmentMode,
    permission_table: HashMap<(ResourceType, ActionType), Permission>,
    allowed_actions: HashSet<ActionType>,
    allowed_resources: HashSet<ResourceType>,
    rules: Vec<Box<dyn PolicyRule>>,
    audit: Arc<dyn AuditLogger>,
}

impl PolicyEngine {
    /// Build an engine for the given configuration.
    ///
    /// The permission table maps every known (resource, action) pair to its
    /// `{resourceType}:{verb}` permission; combinations outside the table
    /// are denied by default (allow-listing, not deny-listing).
    pub fn new(config: PolicyEngineConfig, audit: Arc<dyn AuditLogger>) -> Self {
        let mut permission_table = HashMap::new();
        for resource in ResourceType::ALL {
            for action in ActionType::ALL {
                permission_table
                    .insert((resource, action), Permission::required_for(resource, action));
            }
        }
        Self {
            mode: config.mode,
            permission_table,
            allowed_actions: config.allowed_actions,
            allowed_resources: config.allowed_resources,
            rules: Vec::new(),
            audit,
        }
    }

    pub fn mode(&self) -> EnvironmentMode {
        self.mode
    }

    /// Register an extension rule, evaluated after the built-in checks in
    /// registration order
    pub fn add_rule(&mut self, rule: Box<dyn PolicyRule>) {
        self.rules.push(rule);
    }

    /// Authorize an action for a caller. Success is the absence of an error;
    /// callers record the authorized outcome when they execute.
    ///
    /// The checks run in a fixed order:
    ///
    /// 1. Admin short-circuits to success.
    /// 2. In production, a destructive action requires the resource-specific
    ///    delete permission even when a coarser grant would satisfy step 5 —
    ///    `project:update` must not imply irreversible deletes.
    /// 3. A dry-run-only caller fails unless the action itself is a dry run.
    /// 4. The required permission is resolved from the (resource, action)
    ///    table; unknown combinations are denied.
    /// 5. The resolved permission is checked against the caller's set; the
    ///    missing permission is attached to the error for diagnostics.
    /// 6. A destructive action without `force` fails with
    ///    [`PolicyError::ConfirmationRequired`] when the environment demands
    ///    confirmation.
    pub fn authorize(&self, ctx: &AuthContext, action: &Action) -> Result<(), PolicyError> {
        if ctx.is_admin() {
            return Ok(());
        }

        if self.mode.is_production() && action.is_destructive() {
            let delete_permission = Permission::delete_for(action.resource_type());
            if !ctx.has(delete_permission) {
                return Err(self.deny(
                    ctx,
                    action,
                    format!(
                        "destructive actions in production require {}",
                        delete_permission
                    ),
                    Some(delete_permission),
                ));
            }
        }

        if ctx.is_dry_run_only() && !action.options().dry_run {
            return Err(self.deny(
                ctx,
                action,
                "caller is restricted to dry-run actions".to_string(),
                None,
            ));
        }

        let required = match self
            .permission_table
            .get(&(action.resource_type(), action.action_type()))
        {
            Some(p) => *p,
            None => {
                return Err(self.deny(
                    ctx,
                    action,
                    format!(
                        "no permission mapping for {} on {}",
                        action.action_type(),
                        action.resource_type()
                    ),
                    None,
                ));
            }
        };

        if !ctx.has(required) {
            return Err(self.deny(
                ctx,
                action,
                format!("missing permission {}", required),
                Some(required),
            ));
        }

        if action.is_destructive()
            && self.mode.requires_destructive_confirmation()
            && !action.options().force
        {
            return Err(self.confirmation_required(ctx, action));
        }

        Ok(())
    }

    /// Coarse, advisory evaluation against the environment's global
    /// allow-lists and registered extension rules.
    ///
    /// This path never errors and never audits; it exists for pre-flight
    /// filtering (e.g. graying out operations in a UI). The per-key
    /// [`authorize`](Self::authorize) path is what gates actual execution.
    pub fn evaluate(&self, action: &Action, user_id: &str) -> PolicyDecision {
        if !self.allowed_actions.contains(&action.action_type()) {
            return PolicyDecision::Deny {
                reason: format!(
                    "{} actions are not allowed in {}",
                    action.action_type(),
                    self.mode
                ),
            };
        }

        if !self.allowed_resources.contains(&action.resource_type()) {
            return PolicyDecision::Deny {
                reason: format!(
                    "{} resources are not allowed in {}",
                    action.resource_type(),
                    self.mode
                ),
            };
        }

        if action.is_destructive()
            && self.mode.requires_destructive_confirmation()
            && !action.options().force
        {
            return PolicyDecision::RequireConfirmation {
                reason: format!(
                    "{} on {} is destructive and requires confirmation",
                    action.action_type(),
                    action.resource_path()
                ),
            };
        }

        for rule in &self.rules {
            if let Some(decision) = rule.evaluate(action, user_id) {
                return decision;
            }
        }

        PolicyDecision::Allow
    }

    fn deny(
        &self,
        ctx: &AuthContext,
        action: &Action,
        reason: String,
        missing_permission: Option<Permission>,
    ) -> PolicyError {
        self.record_policy_entry(ctx, action, "policy.denied", &reason, missing_permission);
        PolicyError::Denied {
            reason,
            missing_permission,
        }
    }

    fn confirmation_required(&self, ctx: &AuthContext, action: &Action) -> PolicyError {
        let reason = format!(
            "{} on {} is destructive; retry with force after explicit confirmation",
            action.action_type(),
            action.resource_path()
        );
        self.record_policy_entry(ctx, action, "policy.confirmation_required", &reason, None);
        PolicyError::ConfirmationRequired { reason }
    }

    fn record_policy_entry(
        &self,
        ctx: &AuthContext,
        action: &Action,
        event_type: &str,
        reason: &str,
        missing_permission: Option<Permission>,
    ) {
        let mut details = HashMap::from([
            ("reason".to_string(), serde_json::json!(reason)),
            ("mode".to_string(), serde_json::json!(self.mode.code())),
        ]);
        if let Some(p) = missing_permission {
            details.insert("missingPermission".to_string(), serde_json::json!(p.code()));
        }
        if let Some(comment) = &action.options().comment {
            details.insert("comment".to_string(), serde_json::json!(comment));
        }
        self.audit.record(AuditEntry::new(NewAuditEntry {
            correlation_id: action.correlation_id().to_string(),
            category: AuditCategory::Policy,
            event_type: event_type.to_string(),
            user_id: ctx.user_id().to_string(),
            resource_type: Some(action.resource_type()),
            resource_path: Some(action.resource_path().to_string()),
            action_type: Some(action.action_type()),
            details,
        }));
    }
}
