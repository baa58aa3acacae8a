//! API key issuance, validation, and administration.
//!
//! Keys are issued as `gk_`-prefixed random secrets. Only a salted SHA-256
//! digest of the secret is retained; the raw value is returned exactly once
//! at creation and is unrecoverable afterwards. Losing it means issuing a
//! new key.
//!
//! Validation is O(active keys): the candidate is hashed against each stored
//! salt. Key counts are tens, not millions, and the per-key salt prevents
//! any reverse index from raw key to entity — compromise of the store never
//! discloses usable secrets.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::audit::{AuditCategory, AuditEntry, AuditLogger, NewAuditEntry, NullAuditLogger};
use crate::error::Error;

use super::context::AuthContext;
use super::permission::Permission;

/// Marker prefix on every issued raw key. Validators reject un-prefixed
/// input before any hashing is attempted.
pub const KEY_PREFIX: &str = "gk_";

const SECRET_LEN: usize = 32;
const SALT_LEN: usize = 16;
/// Leading characters of the raw key that are safe to display.
const DISPLAY_PREFIX_LEN: usize = 12;

/// Configuration for creating a new API key.
///
/// Defaults are applied at the call site: no expiry, not dry-run-only,
/// empty metadata.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyConfig {
    pub name: String,
    pub permissions: HashSet<Permission>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Restrict the key to simulation-only use
    pub dry_run_only: bool,
    pub metadata: HashMap<String, String>,
}

/// A stored API key entity.
///
/// The raw secret is never stored; `key_hash` is `SHA-256(salt || raw)` with
/// an independent per-key salt. The entity is shared as `Arc<ApiKey>`;
/// permission updates replace the entity wholesale (copy-on-write) so
/// concurrent readers never observe a half-updated key. Enable/disable is
/// the one in-place mutation, an atomic flag toggle.
pub struct ApiKey {
    id: String,
    name: String,
    key_hash: String,
    salt: String,
    key_prefix: String,
    permissions: HashSet<Permission>,
    enabled: AtomicBool,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    last_used_at: Mutex<Option<DateTime<Utc>>>,
    dry_run_only: bool,
    metadata: HashMap<String, String>,
}

impl ApiKey {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display-safe fragment of the raw key
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn permissions(&self) -> &HashSet<Permission> {
        &self.permissions
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the key last passed validation, if ever
    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        *self.last_used_at.lock()
    }

    pub fn dry_run_only(&self) -> bool {
        self.dry_run_only
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// A key is valid iff it is enabled and unexpired
    pub fn is_valid(&self) -> bool {
        self.is_enabled() && self.expires_at.map(|t| Utc::now() < t).unwrap_or(true)
    }

    /// Resolve this key into an authentication context
    pub fn to_auth_context(&self) -> AuthContext {
        AuthContext::new(self.id.clone(), self.permissions.clone())
            .with_dry_run_only(self.dry_run_only)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn touch(&self) {
        *self.last_used_at.lock() = Some(Utc::now());
    }
}

impl std::fmt::Debug for ApiKey {
    // Redacts hash and salt; only the display prefix identifies the key.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("key_prefix", &self.key_prefix)
            .field("permissions", &self.permissions)
            .field("enabled", &self.is_enabled())
            .field("expires_at", &self.expires_at)
            .field("created_at", &self.created_at)
            .field("dry_run_only", &self.dry_run_only)
            .finish_non_exhaustive()
    }
}

/// A freshly created key together with its raw secret.
///
/// The raw value is available here and nowhere else.
pub struct CreatedKey {
    pub key: Arc<ApiKey>,
    pub raw_key: String,
}

/// Issues, validates, and administers API keys.
///
/// All state is in-memory; durability across restarts is intentionally out
/// of scope.
///
/// # Example
///
/// ```rust
/// use gantry_core::{ApiKeyConfig, ApiKeyManager};
///
/// let manager = ApiKeyManager::new();
/// let created = manager.create_key(ApiKeyConfig {
///     name: "ops".to_string(),
///     permissions: ["tag:read".parse().unwrap()].into_iter().collect(),
///     ..Default::default()
/// });
///
/// let ctx = manager.validate_key(&created.raw_key).expect("fresh key validates");
/// assert_eq!(ctx.user_id(), created.key.id());
/// ```
pub struct ApiKeyManager {
    keys: RwLock<HashMap<String, Arc<ApiKey>>>,
    hash_index: RwLock<HashMap<String, String>>,
    audit: Arc<dyn AuditLogger>,
}

impl ApiKeyManager {
    /// Create a manager that does not audit
    pub fn new() -> Self {
        Self::with_audit(Arc::new(NullAuditLogger))
    }

    /// Create a manager recording auth events to the given sink
    pub fn with_audit(audit: Arc<dyn AuditLogger>) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            hash_index: RwLock::new(HashMap::new()),
            audit,
        }
    }

    /// Create a new key and return it together with its raw secret.
    ///
    /// The secret is drawn from the OS entropy source (32 bytes), salted
    /// independently (16 bytes), and only the salted digest is stored. The
    /// raw value in the returned [`CreatedKey`] is shown exactly once.
    pub fn create_key(&self, config: ApiKeyConfig) -> CreatedKey {
        let mut secret = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut secret);
        let raw_key = format!("{}{}", KEY_PREFIX, hex::encode(secret));

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let salt = hex::encode(salt);

        let key_hash = hash_key(&salt, &raw_key);
        let key = Arc::new(ApiKey {
            id: uuid::Uuid::new_v4().to_string(),
            name: config.name,
            key_hash: key_hash.clone(),
            salt,
            key_prefix: raw_key[..DISPLAY_PREFIX_LEN].to_string(),
            permissions: config.permissions,
            enabled: AtomicBool::new(true),
            expires_at: config.expires_at,
            created_at: Utc::now(),
            last_used_at: Mutex::new(None),
            dry_run_only: config.dry_run_only,
            metadata: config.metadata,
        });

        self.keys.write().insert(key.id.clone(), key.clone());
        self.hash_index.write().insert(key_hash, key.id.clone());

        self.record_key_event("auth.key_created", &key);
        CreatedKey { key, raw_key }
    }

    /// Validate a raw key and resolve it to an [`AuthContext`].
    ///
    /// Fails closed: null-ish or un-prefixed input is rejected before any
    /// hashing. No match, a disabled key, and an expired key all come back
    /// as `None` — the caller must treat all of them as unauthenticated,
    /// never partial trust, and must not be able to tell them apart.
    pub fn validate_key(&self, raw_key: &str) -> Option<AuthContext> {
        if raw_key.is_empty() || !raw_key.starts_with(KEY_PREFIX) {
            self.record_auth_failure(raw_key, "malformed key");
            return None;
        }

        let keys = self.keys.read();
        for key in keys.values() {
            if hash_key(&key.salt, raw_key) == key.key_hash {
                if !key.is_valid() {
                    self.record_auth_failure(raw_key, "key disabled or expired");
                    return None;
                }
                key.touch();
                return Some(key.to_auth_context());
            }
        }

        self.record_auth_failure(raw_key, "no matching key");
        None
    }

    /// Validate a raw key, surfacing failure as an authentication error.
    ///
    /// The error message never distinguishes an unknown key from a revoked
    /// one, to avoid key enumeration.
    pub fn authenticate(&self, raw_key: &str) -> Result<AuthContext, Error> {
        self.validate_key(raw_key)
            .ok_or_else(|| Error::Authentication("invalid or expired API key".to_string()))
    }

    /// Disable a key in place. Returns false if the id is unknown.
    pub fn revoke_key(&self, id: &str) -> bool {
        let Some(key) = self.keys.read().get(id).cloned() else {
            return false;
        };
        key.set_enabled(false);
        self.record_key_event("auth.key_revoked", &key);
        true
    }

    /// Re-enable a previously revoked key. Returns false if the id is unknown.
    pub fn enable_key(&self, id: &str) -> bool {
        let Some(key) = self.keys.read().get(id).cloned() else {
            return false;
        };
        key.set_enabled(true);
        self.record_key_event("auth.key_enabled", &key);
        true
    }

    /// Remove a key entirely, dropping both indices.
    pub fn delete_key(&self, id: &str) -> bool {
        let Some(key) = self.keys.write().remove(id) else {
            return false;
        };
        self.hash_index.write().remove(&key.key_hash);
        self.record_key_event("auth.key_deleted", &key);
        true
    }

    /// Replace a key's permission set.
    ///
    /// Copy-on-write: a replacement entity is built preserving id, hash,
    /// salt, and creation metadata, then swapped in wholesale. Concurrent
    /// validators either see the old set or the new one, never a mix.
    pub fn update_key_permissions(&self, id: &str, permissions: HashSet<Permission>) -> bool {
        let mut keys = self.keys.write();
        let Some(existing) = keys.get(id) else {
            return false;
        };
        let replacement = Arc::new(ApiKey {
            id: existing.id.clone(),
            name: existing.name.clone(),
            key_hash: existing.key_hash.clone(),
            salt: existing.salt.clone(),
            key_prefix: existing.key_prefix.clone(),
            permissions,
            enabled: AtomicBool::new(existing.is_enabled()),
            expires_at: existing.expires_at,
            created_at: existing.created_at,
            last_used_at: Mutex::new(existing.last_used_at()),
            dry_run_only: existing.dry_run_only,
            metadata: existing.metadata.clone(),
        });
        self.record_key_event("auth.permissions_updated", &replacement);
        keys.insert(id.to_string(), replacement);
        true
    }

    /// Look up a key by id
    pub fn get_key(&self, id: &str) -> Option<Arc<ApiKey>> {
        self.keys.read().get(id).cloned()
    }

    /// Look up keys whose displayable prefix starts with the given fragment
    pub fn find_by_prefix(&self, prefix: &str) -> Vec<Arc<ApiKey>> {
        self.keys
            .read()
            .values()
            .filter(|k| k.key_prefix.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// All keys, regardless of state
    pub fn list_keys(&self) -> Vec<Arc<ApiKey>> {
        self.keys.read().values().cloned().collect()
    }

    /// Keys that are currently enabled and unexpired
    pub fn list_active_keys(&self) -> Vec<Arc<ApiKey>> {
        self.keys
            .read()
            .values()
            .filter(|k| k.is_valid())
            .cloned()
            .collect()
    }

    fn record_key_event(&self, event_type: &str, key: &ApiKey) {
        self.audit.record(AuditEntry::new(NewAuditEntry {
            correlation_id: key.id.clone(),
            category: AuditCategory::Auth,
            event_type: event_type.to_string(),
            user_id: key.id.clone(),
            resource_type: None,
            resource_path: None,
            action_type: None,
            details: HashMap::from([
                ("keyName".to_string(), serde_json::json!(key.name)),
                ("keyPrefix".to_string(), serde_json::json!(key.key_prefix)),
            ]),
        }));
    }

    fn record_auth_failure(&self, raw_key: &str, reason: &str) {
        // Only the display-safe slice of the attempted key is recorded.
        let attempted = raw_key.chars().take(DISPLAY_PREFIX_LEN).collect::<String>();
        self.audit.record(AuditEntry::new(NewAuditEntry {
            correlation_id: String::new(),
            category: AuditCategory::Auth,
            event_type: "auth.failed".to_string(),
            user_id: "anonymous".to_string(),
            resource_type: None,
            resource_path: None,
            action_type: None,
            details: HashMap::from([
                ("reason".to_string(), serde_json::json!(reason)),
                ("attemptedPrefix".to_string(), serde_json::json!(attempted)),
            ]),
        }));
    }
}

impl Default for ApiKeyManager {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_key(salt: &str, raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}
