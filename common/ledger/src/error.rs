use thiserror::Error;

/// Failure talking to the relational store, split by whether a retry can help.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection loss, pool exhaustion, serialization conflicts and similar.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected operation: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

// serialization_failure, deadlock_detected, lock_not_available, admin_shutdown
const TRANSIENT_SQLSTATES: &[&str] = &["40001", "40P01", "55P03", "57P01"];

fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || TRANSIENT_SQLSTATES.contains(&code)
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let transient = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => true,
            sqlx::Error::Database(db) => db.code().map(|c| is_transient_sqlstate(&c)).unwrap_or(false),
            _ => false,
        };
        if transient {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Rejected(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_failures_are_transient() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(StoreError::from(sqlx::Error::PoolClosed).is_transient());
    }

    #[test]
    fn decode_and_missing_rows_are_permanent() {
        assert!(!StoreError::from(sqlx::Error::RowNotFound).is_transient());
        assert!(!StoreError::from(sqlx::Error::ColumnNotFound("x".into())).is_transient());
    }

    #[test]
    fn sqlstate_classification() {
        assert!(is_transient_sqlstate("40001"));
        assert!(is_transient_sqlstate("08006"));
        assert!(is_transient_sqlstate("57P01"));
        assert!(!is_transient_sqlstate("23505"));
        assert!(!is_transient_sqlstate("23503"));
    }
}
