use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(sqlx::Error),

    /// A CHECK constraint fired. The ledger pre-validates balances under a row
    /// lock, so this surfacing means either a concurrent writer bypassed the
    /// lock or a code path skipped the ledger entirely.
    #[error("Check constraint violated: {constraint}")]
    CheckViolation { constraint: String },

    #[error("Row not found")]
    NotFound,
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23514") => DbError::CheckViolation {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            },
            _ => DbError::Sqlx(e),
        }
    }
}
