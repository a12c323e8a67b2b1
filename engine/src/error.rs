//! Error types for the Lounge engine.

use crate::RecordId;
use thiserror::Error;

/// All possible errors from the Lounge engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Caller errors
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("record not found: {category}[{id}]")]
    RecordNotFound { category: String, id: RecordId },

    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    #[error("confirmation required: {0}")]
    ConfirmationRequired(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    // Domain rejections
    #[error("{employee} already has an attendance record on {day}")]
    DuplicateAttendanceConflict { employee: String, day: String },

    #[error("an active employee named '{0}' already exists")]
    DuplicateEmployee(String),

    #[error("no daily menu is configured for {0}")]
    MissingMenuConfig(String),

    // State errors
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),
}

impl Error {
    /// Whether this error is a user-facing rejection rather than a fault.
    ///
    /// Rejections are reported as transient notices and never change state.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::DuplicateAttendanceConflict { .. }
                | Error::DuplicateEmployee(_)
                | Error::InvalidAmount(_)
                | Error::ConfirmationRequired(_)
                | Error::MissingField(_)
                | Error::MissingMenuConfig(_)
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::UnknownCategory("drinks".into());
        assert_eq!(err.to_string(), "unknown category: drinks");

        let err = Error::RecordNotFound {
            category: "expenses".into(),
            id: RecordId::Int(7),
        };
        assert_eq!(err.to_string(), "record not found: expenses[7]");

        let err = Error::DuplicateAttendanceConflict {
            employee: "Aiko".into(),
            day: "2024-01-01".into(),
        };
        assert_eq!(
            err.to_string(),
            "Aiko already has an attendance record on 2024-01-01"
        );
    }

    #[test]
    fn rejections_are_distinguished_from_faults() {
        assert!(Error::DuplicateEmployee("Aiko".into()).is_rejection());
        assert!(!Error::MalformedSnapshot("bad".into()).is_rejection());
        assert!(!Error::UnknownCategory("x".into()).is_rejection());
    }
}
