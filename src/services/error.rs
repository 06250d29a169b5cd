//! Service error type
//!
//! Caller errors are reported synchronously and never retried. Persistence
//! failures surface as `Internal`; batch operations fold them into their
//! reports instead.

/// Error types for governance operations
#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    /// Request, rule or document not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation clashes with existing state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The request already reached a terminal status
    #[error("Already resolved: {0}")]
    AlreadyResolved(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Reject blank identifiers such as user ids and approver names
pub(crate) fn require_non_blank(value: &str, field: &str) -> Result<(), GovernanceError> {
    if value.trim().is_empty() {
        return Err(GovernanceError::InvalidInput(format!(
            "{} cannot be empty",
            field
        )));
    }
    Ok(())
}
