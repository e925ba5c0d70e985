//! Error types for the lending engine

use thiserror::Error;

/// Numeric error codes handed to the outer (HTTP) layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NotFound = 4,
    OutOfStock = 5,
    DuplicateLoan = 6,
    PatronInactive = 7,
    NoActiveLoan = 8,
    AccountLocked = 9,
    BadValue = 10,
    Transient = 11,
}

/// Business conflicts raised by the lending operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    OutOfStock,
    DuplicateLoan,
    PatronInactive,
    NoActiveLoan,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            ConflictKind::OutOfStock => "This book is not available for borrowing",
            ConflictKind::DuplicateLoan => "This patron already has this book borrowed",
            ConflictKind::PatronInactive => "This patron is not active",
            ConflictKind::NoActiveLoan => "No active borrowing record found for this book and patron",
        };
        write!(f, "{}", msg)
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    #[error("Account is locked, try again in {minutes_remaining} minute(s)")]
    Locked { minutes_remaining: i64 },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Only storage contention is ever retried by the engine itself
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Conflict(ConflictKind::OutOfStock) => ErrorCode::OutOfStock,
            AppError::Conflict(ConflictKind::DuplicateLoan) => ErrorCode::DuplicateLoan,
            AppError::Conflict(ConflictKind::PatronInactive) => ErrorCode::PatronInactive,
            AppError::Conflict(ConflictKind::NoActiveLoan) => ErrorCode::NoActiveLoan,
            AppError::Locked { .. } => ErrorCode::AccountLocked,
            AppError::Authentication(_) => ErrorCode::NotAuthorized,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Transient(_) => ErrorCode::Transient,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }
}

/// Name of the partial unique index guarding one active loan per (book, patron)
pub const ACTIVE_LOAN_INDEX: &str = "borrowing_records_one_active_loan";
const BOOK_ISBN_KEY: &str = "books_isbn_key";

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            match db.code().as_deref() {
                // serialization_failure, deadlock_detected, lock_not_available
                Some("40001") | Some("40P01") | Some("55P03") => {
                    return AppError::Transient(db.message().to_string());
                }
                Some("23505") if db.constraint() == Some(ACTIVE_LOAN_INDEX) => {
                    return AppError::Conflict(ConflictKind::DuplicateLoan);
                }
                Some("23505") if db.constraint() == Some(BOOK_ISBN_KEY) => {
                    return AppError::Validation("Book with this ISBN already exists".to_string());
                }
                _ => {}
            }
        }
        if matches!(err, sqlx::Error::PoolTimedOut) {
            return AppError::Transient("Timed out waiting for a database connection".to_string());
        }
        AppError::Database(err)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
