//! Append-only audit records for security-relevant events.
//!
//! Every authorization outcome and every executed action produces exactly
//! one [`AuditEntry`]. Entries are created once and never mutated or deleted
//! by this crate; retention and durable storage belong to an external
//! collaborator behind the [`AuditLogger`] contract.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{ActionType, ResourceType};

/// Category of a security-relevant event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditCategory {
    /// An action was executed (or failed executing)
    Action,
    /// Authentication and key lifecycle events
    Auth,
    /// Authorization denials and confirmation demands
    Policy,
    /// Component lifecycle events
    System,
}

/// Field set for constructing an [`AuditEntry`].
///
/// Defaults (`None`, empty map) are applied at the call site; id and
/// timestamp are assigned by the constructor.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub correlation_id: String,
    pub category: AuditCategory,
    pub event_type: String,
    pub user_id: String,
    pub resource_type: Option<ResourceType>,
    pub resource_path: Option<String>,
    pub action_type: Option<ActionType>,
    pub details: HashMap<String, Value>,
}

/// Immutable record of one security-relevant event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    pub event_type: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ActionType>,
    pub details: HashMap<String, Value>,
}

impl AuditEntry {
    /// Construct an entry, assigning its id and timestamp
    pub fn new(fields: NewAuditEntry) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            correlation_id: fields.correlation_id,
            timestamp: Utc::now(),
            category: fields.category,
            event_type: fields.event_type,
            user_id: fields.user_id,
            resource_type: fields.resource_type,
            resource_path: fields.resource_path,
            action_type: fields.action_type,
            details: fields.details,
        }
    }
}

/// Append-only sink for audit entries.
///
/// `record` is called synchronously on the hot path; implementations must
/// be local and non-blocking (hand off to a writer task if durable storage
/// is slow).
pub trait AuditLogger: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// In-memory audit sink.
///
/// Keeps every entry in insertion order. Suitable for tests and for
/// processes where an external collaborator drains the log.
#[derive(Default)]
pub struct MemoryAuditLogger {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded entries
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Entries whose correlation id matches
    pub fn entries_for_correlation(&self, correlation_id: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .cloned()
            .collect()
    }

    /// Entries in a given category
    pub fn entries_in_category(&self, category: AuditCategory) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect()
    }
}

impl AuditLogger for MemoryAuditLogger {
    fn record(&self, entry: AuditEntry) {
        self.entries.write().push(entry);
    }
}

/// Audit sink that discards everything
pub struct NullAuditLogger;

impl AuditLogger for NullAuditLogger {
    fn record(&self, _entry: AuditEntry) {}
}
