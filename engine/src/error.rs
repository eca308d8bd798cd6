//! Error types for the reconciliation engine.

use thiserror::Error;

/// All possible errors from the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Change validation errors
    #[error("{set} index {index} out of bounds for collection of length {len}")]
    IndexOutOfBounds {
        set: IndexSetKind,
        index: usize,
        len: usize,
    },

    #[error("inconsistent change: expected {expected} entries, got {actual}")]
    InconsistentChange { expected: usize, actual: usize },

    #[error("fetch returned {actual} records for {requested} requested indices")]
    FetchLengthMismatch { requested: usize, actual: usize },

    // Materialization errors
    #[error("unknown entry discriminant: {0}")]
    UnknownDiscriminant(String),

    #[error("unexpected entry kind: expected {expected}, got {actual}")]
    UnexpectedKind {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Which index set of a change descriptor an index came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSetKind {
    Removed,
    Inserted,
    Updated,
}

impl std::fmt::Display for IndexSetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexSetKind::Removed => f.write_str("removed"),
            IndexSetKind::Inserted => f.write_str("inserted"),
            IndexSetKind::Updated => f.write_str("updated"),
        }
    }
}

impl Error {
    /// Whether the error means the change itself cannot be applied to the
    /// current collection (as opposed to a bad record).
    pub fn is_inconsistent_change(&self) -> bool {
        matches!(
            self,
            Error::IndexOutOfBounds { .. }
                | Error::InconsistentChange { .. }
                | Error::FetchLengthMismatch { .. }
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
        let err = Error::UnknownDiscriminant("audio".into());
        assert_eq!(err.to_string(), "unknown entry discriminant: audio");

        let err = Error::InconsistentChange {
            expected: 4,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "inconsistent change: expected 4 entries, got 3"
        );

        let err = Error::IndexOutOfBounds {
            set: IndexSetKind::Removed,
            index: 9,
            len: 4,
        };
        assert_eq!(
            err.to_string(),
            "removed index 9 out of bounds for collection of length 4"
        );
    }

    #[test]
    fn inconsistent_classification() {
        assert!(Error::FetchLengthMismatch {
            requested: 2,
            actual: 1
        }
        .is_inconsistent_change());
        assert!(!Error::UnknownDiscriminant("x".into()).is_inconsistent_change());
    }
}
