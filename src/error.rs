use thiserror::Error;

/// Domain error taxonomy.
///
/// Every fallible path in the service resolves to one of these classes:
/// - `InvalidInput` is rejected at ingress with no side effects.
/// - `Forbidden` covers blocked users and missing/expired bearer tokens.
/// - `NotFound` surfaces as 404 at the API and as "skip candidate" in ingest.
/// - `Conflict` marks idempotency hits; engines skip these silently.
/// - `Transient` covers upstream timeouts and database contention; the
///   current candidate is abandoned and the next sweep retries.
/// - `Fatal` marks invariant violations detected post-hoc; the enclosing
///   transaction aborts and the error is raised to the operator.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl AppError {
    /// Stable reason string for the API error triple.
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Transient(_) => "TRANSIENT",
            AppError::Fatal(_) => "FATAL",
        }
    }

    /// Numeric code for the API error triple.
    pub fn code(&self) -> u16 {
        match self {
            AppError::InvalidInput(_) => 400,
            AppError::Forbidden(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::Transient(_) => 503,
            AppError::Fatal(_) => 500,
        }
    }

    /// Idempotency hits are skipped, not surfaced.
    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                AppError::Conflict(format!("unique violation: {}", db.message()))
            }
            // Check-constraint violations mean an invariant was about to break
            // (negative balance, current > current_max).
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23514") => {
                AppError::Fatal(format!("check violation: {}", db.message()))
            }
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Protocol(_) => AppError::Transient(e.to_string()),
            _ => AppError::Transient(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Transient(e.to_string())
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
