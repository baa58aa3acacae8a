//! The resolved identity for an authenticated request.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::permission::Permission;

/// Identity and capability set resolved from a validated API key.
///
/// The context is fixed for the lifetime of whatever owns it (a direct
/// request, or an entire conversation). A context flagged `dry_run_only`
/// must never be able to cause a real mutation, regardless of the
/// permissions it holds; the policy engine enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    user_id: String,
    permissions: HashSet<Permission>,
    dry_run_only: bool,
}

impl AuthContext {
    /// Create a context with an explicit permission set
    pub fn new(user_id: impl Into<String>, permissions: HashSet<Permission>) -> Self {
        Self {
            user_id: user_id.into(),
            permissions,
            dry_run_only: false,
        }
    }

    /// Create a context holding the unconditional admin permission
    pub fn admin(user_id: impl Into<String>) -> Self {
        let mut permissions = HashSet::new();
        permissions.insert(Permission::Admin);
        Self::new(user_id, permissions)
    }

    /// Restrict this context to simulation-only use
    pub fn with_dry_run_only(mut self, dry_run_only: bool) -> Self {
        self.dry_run_only = dry_run_only;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn permissions(&self) -> &HashSet<Permission> {
        &self.permissions
    }

    /// Whether this context holds the admin permission
    pub fn is_admin(&self) -> bool {
        self.permissions.contains(&Permission::Admin)
    }

    /// Whether this context may only perform dry-run actions
    pub fn is_dry_run_only(&self) -> bool {
        self.dry_run_only
    }

    /// Check a permission against this context's set.
    ///
    /// Admin satisfies every check.
    pub fn has(&self, permission: Permission) -> bool {
        self.is_admin() || self.permissions.contains(&permission)
    }
}
