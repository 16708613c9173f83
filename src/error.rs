/// Unified error types for the moderation ledger
use crate::registry::Variant;
use crate::types::EntryId;
use thiserror::Error;

/// Main error type for ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Referenced entry, evidence or extension row is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Extension payload shape does not belong to the requested variant
    #[error("Variant mismatch: {variant} cannot carry a {shape} extension")]
    VariantMismatch {
        variant: Variant,
        shape: &'static str,
    },

    /// A link or lifecycle target has the wrong variant
    #[error("Entry {entry_id} is a {found}, expected {expected}")]
    WrongEntryKind {
        entry_id: EntryId,
        expected: &'static str,
        found: Variant,
    },

    /// Missing or malformed fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// Punishment was already forgiven; original forgiveness is kept
    #[error("Punishment {0} already forgiven")]
    AlreadyForgiven(EntryId),

    /// Reputation was already finalized
    #[error("Reputation for entry {0} already finalized")]
    AlreadyFinalized(EntryId),

    /// Punishment has expired and can no longer be forgiven
    #[error("Punishment {0} is not active")]
    NotActive(EntryId),

    /// Write would orphan a reference or collide with an existing row
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Optimistic concurrency check failed
    #[error("Entry {entry_id} is at version {actual}, expected {expected}")]
    VersionConflict {
        entry_id: EntryId,
        expected: i64,
        actual: i64,
    },

    /// Internal errors (corrupt rows, migration failures)
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Guards that fire when a caller re-applies an operation that already
    /// took effect. Callers retrying after a timeout may treat these as success.
    pub fn is_idempotent_replay(&self) -> bool {
        matches!(
            self,
            LedgerError::AlreadyForgiven(_) | LedgerError::AlreadyFinalized(_)
        )
    }

    pub(crate) fn entry_not_found(id: EntryId) -> Self {
        LedgerError::NotFound(format!("Entry {} not found", id))
    }

    /// Map unique-constraint violations onto `Conflict`, pass the rest through
    pub(crate) fn from_insert(err: sqlx::Error, what: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                LedgerError::Conflict(format!("{} already exists", what))
            }
            _ => LedgerError::Database(err),
        }
    }
}

/// Result type alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotent_replay_guards() {
        assert!(LedgerError::AlreadyForgiven(EntryId(1)).is_idempotent_replay());
        assert!(LedgerError::AlreadyFinalized(EntryId(1)).is_idempotent_replay());
        assert!(!LedgerError::NotActive(EntryId(1)).is_idempotent_replay());
        assert!(!LedgerError::NotFound("x".to_string()).is_idempotent_replay());
    }

    #[test]
    fn test_wrong_kind_message() {
        let err = LedgerError::WrongEntryKind {
            entry_id: EntryId(7),
            expected: "appeal",
            found: Variant::Ban,
        };
        assert_eq!(err.to_string(), "Entry 7 is a ban, expected appeal");
    }
}
