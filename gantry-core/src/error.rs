//! Top-level error types for gantry
//!
//! This module provides a simplified, user-facing error type that flattens
//! the internal error taxonomy into the categories callers handle
//! differently at the boundary.

use thiserror::Error;

use crate::conversation::ConversationError;
use crate::executor::HandlerError;
use crate::policy::PolicyError;
use crate::provider::ProviderError;

/// Top-level error type for gantry operations
///
/// - [`Error::Authentication`] - unrecognized, expired, or disabled key;
///   deliberately uniform so callers cannot enumerate keys
/// - [`Error::Authorization`] - missing permission or environment restriction
/// - [`Error::ConfirmationRequired`] - destructive action lacking `force`;
///   retry with force after explicit user confirmation
/// - [`Error::Validation`] - malformed action, reported as field errors
/// - [`Error::Execution`] - resource handler fault
/// - [`Error::Provider`] - LLM backend unreachable or erroring
#[derive(Debug, Error)]
pub enum Error {
    /// Authentication failed
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Authorization denied
    #[error("authorization denied: {0}")]
    Authorization(String),

    /// Destructive action requires explicit confirmation
    #[error("confirmation required: {0}")]
    ConfirmationRequired(String),

    /// Action failed validation
    #[error("validation failed: {0}")]
    Validation(String),

    /// Resource handler failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// Model provider failed
    #[error("provider error: {0}")]
    Provider(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization(_))
    }

    pub fn is_confirmation_required(&self) -> bool {
        matches!(self, Self::ConfirmationRequired(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider(_))
    }

    /// Whether a conversation survives this error.
    ///
    /// Authorization denials, confirmation demands, validation failures,
    /// and handler faults become failed tool results fed back to the model;
    /// only provider-level failures are conversation-fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Authorization(_)
                | Self::ConfirmationRequired(_)
                | Self::Validation(_)
                | Self::Execution(_)
        )
    }
}

impl From<PolicyError> for Error {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Denied { reason, .. } => Self::Authorization(reason),
            PolicyError::ConfirmationRequired { reason } => Self::ConfirmationRequired(reason),
        }
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err.to_string())
    }
}

impl From<HandlerError> for Error {
    fn from(err: HandlerError) -> Self {
        Self::Execution(err.to_string())
    }
}

impl From<ConversationError> for Error {
    fn from(err: ConversationError) -> Self {
        match err {
            ConversationError::Provider(e) => Self::Provider(e.to_string()),
            ConversationError::Model(msg) => Self::Provider(msg),
            ConversationError::EmptyResponse => {
                Self::Provider("model returned an empty response".to_string())
            }
            other => Self::Other(other.to_string()),
        }
    }
}

/// Result type for gantry operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Permission;

    #[test]
    fn test_from_policy_error() {
        let err: Error = PolicyError::Denied {
            reason: "missing permission tag:delete".to_string(),
            missing_permission: Some("tag:delete".parse::<Permission>().unwrap()),
        }
        .into();
        assert!(err.is_authorization());
        assert!(err.is_recoverable());

        let err: Error = PolicyError::ConfirmationRequired {
            reason: "delete is destructive".to_string(),
        }
        .into();
        assert!(err.is_confirmation_required());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_provider_errors_are_fatal() {
        let err: Error = ProviderError::Network("connection refused".to_string()).into();
        assert!(err.is_provider());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_from_conversation_error() {
        let err: Error =
            ConversationError::Provider(ProviderError::RateLimited("slow down".to_string()))
                .into();
        assert!(err.is_provider());

        let err: Error = ConversationError::NotFound("conv-1".to_string()).into();
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn test_authentication_not_recoverable() {
        let err = Error::Authentication("invalid or expired API key".to_string());
        assert!(err.is_authentication());
        assert!(!err.is_recoverable());
    }
}
