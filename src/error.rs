use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::AttemptId;

/// Postgres `query_canceled`, raised when `statement_timeout` fires.
const PG_QUERY_CANCELED: &str = "57014";

#[derive(Debug, Error)]
pub enum ExamError {
    #[error("module {0} not found")]
    ModuleNotFound(Uuid),

    #[error("lesson {0} not found")]
    LessonNotFound(Uuid),

    #[error("prerequisite lessons incomplete ({completed_count}/{total_count})")]
    NotEligible {
        completed_count: i64,
        total_count: i64,
    },

    #[error("an attempt is already in progress for this module")]
    AttemptAlreadyInProgress,

    #[error("cooldown active, next attempt allowed in {remaining_seconds}s")]
    CooldownActive { remaining_seconds: i64 },

    #[error("attempt {0} not found")]
    AttemptNotFound(AttemptId),

    #[error("attempt {0} belongs to another user")]
    AttemptNotOwned(AttemptId),

    #[error("attempt {0} has already been submitted")]
    AttemptAlreadySubmitted(AttemptId),

    #[error("datastore call timed out")]
    DatastoreTimeout,

    #[error("datastore unavailable: {0}")]
    DatastoreUnavailable(String),
}

pub type ExamResult<T> = Result<T, ExamError>;

impl ExamError {
    /// Stable machine-readable name, used as `error.kind` in responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ExamError::ModuleNotFound(_) => "ModuleNotFound",
            ExamError::LessonNotFound(_) => "LessonNotFound",
            ExamError::NotEligible { .. } => "NotEligible",
            ExamError::AttemptAlreadyInProgress => "AttemptAlreadyInProgress",
            ExamError::CooldownActive { .. } => "CooldownActive",
            ExamError::AttemptNotFound(_) => "AttemptNotFound",
            ExamError::AttemptNotOwned(_) => "AttemptNotOwned",
            ExamError::AttemptAlreadySubmitted(_) => "AttemptAlreadySubmitted",
            ExamError::DatastoreTimeout => "DatastoreTimeout",
            ExamError::DatastoreUnavailable(_) => "DatastoreUnavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ExamError::ModuleNotFound(_)
            | ExamError::LessonNotFound(_)
            | ExamError::AttemptNotFound(_) => StatusCode::NOT_FOUND,
            ExamError::NotEligible { .. } | ExamError::AttemptNotOwned(_) => StatusCode::FORBIDDEN,
            ExamError::AttemptAlreadyInProgress | ExamError::AttemptAlreadySubmitted(_) => {
                StatusCode::CONFLICT
            }
            ExamError::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
            ExamError::DatastoreTimeout => StatusCode::GATEWAY_TIMEOUT,
            ExamError::DatastoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn is_datastore(&self) -> bool {
        matches!(
            self,
            ExamError::DatastoreTimeout | ExamError::DatastoreUnavailable(_)
        )
    }
}

impl From<sqlx::Error> for ExamError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => ExamError::DatastoreTimeout,
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some(PG_QUERY_CANCELED) => {
                ExamError::DatastoreTimeout
            }
            other => ExamError::DatastoreUnavailable(other.to_string()),
        }
    }
}

impl IntoResponse for ExamError {
    fn into_response(self) -> Response {
        if self.is_datastore() {
            tracing::error!(error = %self, "datastore failure");
        }

        let mut body = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        match &self {
            ExamError::NotEligible {
                completed_count,
                total_count,
            } => {
                body["completedCount"] = json!(completed_count);
                body["totalCount"] = json!(total_count);
            }
            ExamError::CooldownActive { remaining_seconds } => {
                body["remainingSeconds"] = json!(remaining_seconds);
            }
            _ => {}
        }

        let mut response = (self.status(), Json(json!({ "error": body }))).into_response();
        if let ExamError::CooldownActive { remaining_seconds } = self {
            if let Ok(value) = HeaderValue::from_str(&remaining_seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_maps_to_datastore_timeout() {
        assert!(matches!(
            ExamError::from(sqlx::Error::PoolTimedOut),
            ExamError::DatastoreTimeout
        ));
        assert!(matches!(
            ExamError::from(sqlx::Error::PoolClosed),
            ExamError::DatastoreUnavailable(_)
        ));
    }

    #[test]
    fn cooldown_response_carries_retry_after() {
        let response = ExamError::CooldownActive {
            remaining_seconds: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn race_losers_are_conflicts() {
        assert_eq!(
            ExamError::AttemptAlreadyInProgress.status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ExamError::AttemptAlreadySubmitted(7).status(),
            StatusCode::CONFLICT
        );
    }
}
