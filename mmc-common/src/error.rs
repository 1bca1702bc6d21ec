//! Common error types for the catalog

use thiserror::Error;

/// Common result type for catalog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the catalog crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested track, collection or tag not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Another track already holds this url or fingerprint
    #[error("Duplicate: track {other_track} has same {attribute}")]
    DuplicateTrack { other_track: i64, attribute: String },

    /// Another collection already uses this name
    #[error("Duplicate: collection {other_slug} has same name")]
    DuplicateCollection { other_slug: String },

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Writer slot not acquired within the busy timeout
    #[error("Database busy: {0}")]
    Contention(String),

    /// Internal error (invariant violation, unexpected state)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
        if let sqlx::Error::Database(db_err) = &err {
            if let Some(code) = db_err.code() {
                if let Ok(code) = code.parse::<i64>() {
                    let primary = code & 0xff;
                    if primary == 5 || primary == 6 {
                        return Error::Contention(db_err.message().to_string());
                    }
                }
            }
        }
        if matches!(err, sqlx::Error::PoolTimedOut) {
            return Error::Contention("timed out waiting for a database connection".to_string());
        }
        Error::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_message_names_other_track() {
        let err = Error::DuplicateTrack {
            other_track: 1,
            attribute: "url".to_string(),
        };
        assert_eq!(err.to_string(), "Duplicate: track 1 has same url");
    }

    #[test]
    fn test_pool_timeout_is_contention() {
        let err: Error = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, Error::Contention(_)));
    }
}
