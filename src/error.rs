use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::sanitizer::SanitizeError;

/// ApiError
///
/// Every failure a handler or extractor can report. The response body is the
/// plain-text message, in Spanish, exactly as the browser client displays it.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Rejection for a single named field that failed sanitization.
    pub fn field(field: &str, err: SanitizeError) -> Self {
        ApiError::Validation(format!("{err} Campo: {field}."))
    }
}

impl From<SanitizeError> for ApiError {
    fn from(err: SanitizeError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Internal(msg) = &self {
            tracing::error!(error = %msg, "request failed with internal error");
        }
        (status, self.to_string()).into_response()
    }
}

/// RepoError
///
/// Persistence failures as seen by handlers. Unique-key violations are split out
/// so they can surface as 409 instead of 500.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("unique constraint violated")]
    Conflict,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => RepoError::Conflict,
            _ => RepoError::Database(err),
        }
    }
}

impl RepoError {
    /// Maps to a response error, using `conflict` for duplicate keys and
    /// `internal` for everything else. Database details go to the log only.
    pub fn into_api(self, conflict: &str, internal: &str) -> ApiError {
        match self {
            RepoError::Conflict => ApiError::Conflict(conflict.to_string()),
            RepoError::Database(e) => {
                tracing::error!(error = ?e, "store error");
                ApiError::Internal(internal.to_string())
            }
        }
    }

    /// For reads and deletes, where a conflict cannot occur.
    pub fn into_internal(self, internal: &str) -> ApiError {
        tracing::error!(error = ?self, "store error");
        ApiError::Internal(internal.to_string())
    }
}
