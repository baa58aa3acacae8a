//! Caller identity: permission codes, API keys, and the resolved
//! authentication context.
//!
//! [`ApiKeyManager`] issues and validates keys; a validated key resolves to
//! an [`AuthContext`] carrying the caller's capability set, which the policy
//! engine checks per action.

mod context;
mod keys;
mod permission;

pub use context::AuthContext;
pub use keys::{ApiKey, ApiKeyConfig, ApiKeyManager, CreatedKey, KEY_PREFIX};
pub use permission::{CrudVerb, InvalidPermission, Permission};
