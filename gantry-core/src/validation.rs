//! Field-level validation results.
//!
//! Malformed actions are reported as structured field errors rather than
//! thrown past the boundary. A result is valid iff its error list is empty;
//! warnings and infos never affect validity.

use serde::{Deserialize, Serialize};

/// A single field-level validation error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field the error applies to (e.g. `resourcePath`)
    pub field: String,
    /// Human-readable message
    pub message: String,
    /// Optional machine-readable error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Outcome of validating an action or payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
    pub infos: Vec<String>,
}

impl ValidationResult {
    /// Create an empty (valid) result
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a result with a single error
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = Self::new();
        result.add_error(field, message);
        result
    }

    /// A result is valid iff it has no errors
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Append an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
            code: None,
        });
    }

    /// Append an error with a machine-readable code
    pub fn add_error_code(
        &mut self,
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
            code: Some(code.into()),
        });
    }

    /// Append a warning (does not affect validity)
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Append an informational note
    pub fn add_info(&mut self, message: impl Into<String>) {
        self.infos.push(message.into());
    }

    /// Fold another result's findings into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.infos.extend(other.infos);
    }

    /// One-line summary of all errors, for result messages
    pub fn summary(&self) -> String {
        if self.is_valid() {
            "valid".to_string()
        } else {
            self.errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join("; ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_is_valid() {
        let result = ValidationResult::new();
        assert!(result.is_valid());
        assert_eq!(result.summary(), "valid");
    }

    #[test]
    fn test_errors_invalidate() {
        let mut result = ValidationResult::new();
        result.add_error("resourcePath", "must not be empty");
        assert!(!result.is_valid());
        assert_eq!(result.errors.len(), 1);
        assert!(result.summary().contains("resourcePath"));
    }

    #[test]
    fn test_warnings_do_not_invalidate() {
        let mut result = ValidationResult::new();
        result.add_warning("payload is empty");
        result.add_info("resolved against conversation scope");
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.infos.len(), 1);
    }

    #[test]
    fn test_error_ordering_preserved() {
        let mut result = ValidationResult::new();
        result.add_error("a", "first");
        result.add_error_code("b", "second", "E002");
        assert_eq!(result.errors[0].field, "a");
        assert_eq!(result.errors[1].code.as_deref(), Some("E002"));
    }

    #[test]
    fn test_merge() {
        let mut a = ValidationResult::invalid("x", "bad");
        let mut b = ValidationResult::new();
        b.add_warning("careful");
        a.merge(b);
        assert!(!a.is_valid());
        assert_eq!(a.warnings.len(), 1);
    }
}
