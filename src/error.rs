use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProgressError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgressError {
    /// Malformed event or identifier. Reported to the caller, never retried.
    #[error("validation error for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("unsupported event kind '{0}'")]
    UnsupportedEvent(String),

    /// Certificate requested before every lesson and quiz is done.
    #[error(
        "course '{course_id}' not completed: {missing_lessons} lesson(s) and {missing_quizzes} quiz(zes) outstanding"
    )]
    NotEligible {
        course_id: String,
        missing_lessons: i64,
        missing_quizzes: i64,
    },

    /// A uniqueness constraint rejected the write. Converted into an
    /// "already done" result inside the engine; callers never see it.
    #[error("uniqueness conflict on {constraint}")]
    Conflict { constraint: &'static str },

    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
}

impl ProgressError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::UnsupportedEvent(_) => "UNSUPPORTED_EVENT",
            Self::NotEligible { .. } => "NOT_ELIGIBLE",
            Self::Conflict { .. } => "CONFLICT",
            Self::PersistenceUnavailable(_) => "PERSISTENCE_UNAVAILABLE",
            Self::NotFound { .. } => "NOT_FOUND",
        }
    }

    /// Only storage outages are worth retrying; the caller owns the backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PersistenceUnavailable(_))
    }
}

impl From<sqlx::Error> for ProgressError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict {
                constraint: "unique index",
            },
            _ => Self::PersistenceUnavailable(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for ProgressError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::PersistenceUnavailable(err.to_string())
    }
}
