use trustdb_types::TypeError;

/// Errors from trust database operations.
///
/// Every operation returns one of these explicitly; re-inserting identical
/// content at an occupied key is the only duplicate that is not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrustDbError {
    /// Malformed input: wildcard scope key, zero version, empty payload, or a
    /// write through a read-only transaction. Never worth retrying.
    #[error("validation error: {0}")]
    Validation(String),

    /// The key already holds different content, or a concurrent transaction
    /// committed first. Re-read and retry.
    #[error("conflict at {key}: {reason}")]
    Conflict { key: String, reason: String },

    /// No record matches an exact-version or max-version query.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient failure of the backing engine (log I/O, poisoned lock).
    #[error("trust database unavailable: {0}")]
    Unavailable(String),

    /// The caller's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's context deadline passed.
    #[error("deadline exceeded")]
    Timeout,

    /// The database or transaction has already been closed.
    #[error("{0} is closed")]
    Closed(&'static str),
}

impl TrustDbError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether retrying (after a fresh read, or with backoff) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Unavailable(_))
    }
}

impl From<TypeError> for TrustDbError {
    fn from(e: TypeError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<std::io::Error> for TrustDbError {
    fn from(e: std::io::Error) -> Self {
        Self::Unavailable(format!("I/O error: {e}"))
    }
}

/// Result alias for trust database operations.
pub type TrustDbResult<T> = Result<T, TrustDbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_errors_become_validation() {
        let err: TrustDbError = TypeError::EmptyField("trc.signatures").into();
        assert!(matches!(err, TrustDbError::Validation(ref m) if m.contains("trc.signatures")));
        assert!(!err.is_retryable());
    }

    #[test]
    fn io_errors_become_unavailable() {
        let err: TrustDbError = std::io::Error::other("disk gone").into();
        assert!(matches!(err, TrustDbError::Unavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn closed_display_names_the_resource() {
        assert_eq!(TrustDbError::Closed("transaction").to_string(), "transaction is closed");
    }
}
