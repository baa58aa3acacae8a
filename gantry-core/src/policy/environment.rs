//! Deployment environment modes.
//!
//! The mode is supplied once at startup and is immutable for the lifetime
//! of the policy engine instance. Each mode carries two fixed knobs; there
//! is no per-mode configuration beyond them.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment posture controlling default policy strictness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentMode {
    #[default]
    Development,
    Test,
    Production,
}

impl EnvironmentMode {
    /// Whether policy outcomes must be written to the audit log
    pub fn requires_audit_log(&self) -> bool {
        !matches!(self, EnvironmentMode::Development)
    }

    /// Whether destructive actions demand explicit confirmation (`force`)
    pub fn requires_destructive_confirmation(&self) -> bool {
        !matches!(self, EnvironmentMode::Development)
    }

    /// Production additionally gates destructive actions behind the
    /// resource-specific delete permission, even for otherwise-privileged
    /// callers short of admin.
    pub fn is_production(&self) -> bool {
        matches!(self, EnvironmentMode::Production)
    }

    pub fn code(&self) -> &'static str {
        match self {
            EnvironmentMode::Development => "development",
            EnvironmentMode::Test => "test",
            EnvironmentMode::Production => "production",
        }
    }
}

impl std::fmt::Display for EnvironmentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for EnvironmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(EnvironmentMode::Development),
            "test" => Ok(EnvironmentMode::Test),
            "production" | "prod" => Ok(EnvironmentMode::Production),
            other => Err(format!("unknown environment mode: {}", other)),
        }
    }
}
