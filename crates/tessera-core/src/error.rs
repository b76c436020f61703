use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One violated field in a rejected write, with a caller-facing message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error taxonomy for the reconciliation and ledger layer.
///
/// `TransientRemote` is internal: the reconciliation service always recovers
/// it into a local fallback or a clean `NotFound`, so it must never cross the
/// service boundary.
#[derive(Debug, Error)]
pub enum TesseraError {
    #[error("Validation failed: {}", format_violations(.0))]
    Validation(Vec<FieldViolation>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Remote platform unavailable: {0}")]
    TransientRemote(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TesseraError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound(format!("{entity} '{id}' does not exist"))
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldViolation::new(field, message)])
    }

    /// Fields named by a `Validation` error; empty for every other kind.
    pub fn violated_fields(&self) -> Vec<&str> {
        match self {
            Self::Validation(violations) => {
                violations.iter().map(|v| v.field.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_field() {
        let err = TesseraError::Validation(vec![
            FieldViolation::new("amount_minor", "must be greater than zero"),
            FieldViolation::new("amount_paid_minor", "cannot exceed amount"),
        ]);

        let message = err.to_string();
        assert!(message.contains("amount_minor"));
        assert!(message.contains("amount_paid_minor"));
        assert_eq!(
            err.violated_fields(),
            vec!["amount_minor", "amount_paid_minor"]
        );
    }

    #[test]
    fn non_validation_errors_have_no_fields() {
        assert!(TesseraError::not_found("entry", "e-1")
            .violated_fields()
            .is_empty());
    }
}
