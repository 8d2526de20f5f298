//! Error types for distrocache-db.

use diesel::result::DatabaseErrorKind;
use miette::Diagnostic;
use thiserror::Error;

/// Database error type for distrocache-db operations.
#[derive(Error, Diagnostic, Debug)]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    #[diagnostic(
        code(distrocache_db::connection),
        help("Check if the database file exists and is accessible")
    )]
    ConnectionError(String),

    #[error("Database query failed: {0}")]
    #[diagnostic(code(distrocache_db::query))]
    QueryError(String),

    #[error("Record not found: {0}")]
    #[diagnostic(code(distrocache_db::not_found))]
    NotFound(String),

    #[error("Database integrity error: {0}")]
    #[diagnostic(
        code(distrocache_db::integrity),
        help("The cache database may be corrupted. Try removing it and letting it repopulate.")
    )]
    IntegrityError(String),

    #[error("Stored JSON could not be decoded: {0}")]
    #[diagnostic(code(distrocache_db::json))]
    JsonError(#[from] serde_json::Error),
}

impl From<diesel::result::Error> for DbError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => DbError::NotFound("Record not found".to_string()),
            diesel::result::Error::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::UniqueViolation
                | DatabaseErrorKind::NotNullViolation
                | DatabaseErrorKind::CheckViolation,
                info,
            ) => DbError::IntegrityError(info.message().to_string()),
            diesel::result::Error::DatabaseError(_, info) => {
                DbError::QueryError(info.message().to_string())
            }
            other => DbError::QueryError(other.to_string()),
        }
    }
}

impl From<diesel::result::ConnectionError> for DbError {
    fn from(err: diesel::result::ConnectionError) -> Self {
        DbError::ConnectionError(err.to_string())
    }
}

/// Result type alias for distrocache-db operations.
pub type Result<T> = std::result::Result<T, DbError>;
