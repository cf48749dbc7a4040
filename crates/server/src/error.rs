use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use services::{
    CertificateServiceError, CourseConfigError, ProgressServiceError, StageGateError,
};
use storage::repository::StorageError;

/// Error body returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    fn not_enrolled(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "not_enrolled", message)
    }

    fn invalid(err: &lms_core::Error) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", err.to_string())
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: self.code,
            message: self.message,
            retryable: self.status == StatusCode::SERVICE_UNAVAILABLE,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::not_found(err.to_string()),
            StorageError::Conflict => Self::new(StatusCode::CONFLICT, "conflict", err.to_string()),
            StorageError::Connection(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "storage_unavailable",
                err.to_string(),
            ),
            _ => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                err.to_string(),
            ),
        }
    }
}

impl From<ProgressServiceError> for ApiError {
    fn from(err: ProgressServiceError) -> Self {
        match err {
            ProgressServiceError::NotEnrolled { .. } => Self::not_enrolled(err.to_string()),
            ProgressServiceError::CourseNotFound(_) | ProgressServiceError::UserNotFound(_) => {
                Self::not_found(err.to_string())
            }
            ProgressServiceError::Invalid(inner) => Self::invalid(&inner),
            ProgressServiceError::Certificate(inner) => inner.into(),
            ProgressServiceError::Storage(inner) => inner.into(),
            _ => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                err.to_string(),
            ),
        }
    }
}

impl From<StageGateError> for ApiError {
    fn from(err: StageGateError) -> Self {
        match err {
            StageGateError::Forbidden => Self::forbidden(err.to_string()),
            StageGateError::CourseNotFound(_) => Self::not_found(err.to_string()),
            StageGateError::Invalid(inner) => Self::invalid(&inner),
            StageGateError::Storage(inner) => inner.into(),
            _ => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                err.to_string(),
            ),
        }
    }
}

impl From<CertificateServiceError> for ApiError {
    fn from(err: CertificateServiceError) -> Self {
        match err {
            CertificateServiceError::NotEnrolled { .. } => Self::not_enrolled(err.to_string()),
            CertificateServiceError::Forbidden => Self::forbidden(err.to_string()),
            CertificateServiceError::NotEligible { .. } => {
                Self::new(StatusCode::CONFLICT, "not_eligible", err.to_string())
            }
            CertificateServiceError::NotPending { .. } => {
                Self::new(StatusCode::CONFLICT, "not_pending", err.to_string())
            }
            CertificateServiceError::NotFound(_)
            | CertificateServiceError::CourseNotFound(_)
            | CertificateServiceError::UserNotFound(_) => Self::not_found(err.to_string()),
            CertificateServiceError::Invalid(inner) => Self::invalid(&inner),
            CertificateServiceError::Storage(inner) => inner.into(),
            _ => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "storage_unavailable",
                err.to_string(),
            ),
        }
    }
}

impl From<CourseConfigError> for ApiError {
    fn from(err: CourseConfigError) -> Self {
        match err {
            CourseConfigError::Forbidden => Self::forbidden(err.to_string()),
            CourseConfigError::CourseNotFound(_) => Self::not_found(err.to_string()),
            CourseConfigError::Invalid(inner) => Self::invalid(&inner),
            CourseConfigError::Storage(inner) => inner.into(),
            _ => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                err.to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lms_core::model::{CertificateStatus, CourseId, UserId};

    #[test]
    fn taxonomy_maps_to_distinct_statuses() {
        let not_enrolled: ApiError = ProgressServiceError::NotEnrolled {
            user_id: UserId::new(1),
            course_id: CourseId::new(2),
        }
        .into();
        assert_eq!(not_enrolled.status(), StatusCode::FORBIDDEN);
        assert_eq!(not_enrolled.code(), "not_enrolled");

        let not_pending: ApiError = CertificateServiceError::NotPending {
            status: CertificateStatus::Approved,
        }
        .into();
        assert_eq!(not_pending.status(), StatusCode::CONFLICT);

        let down: ApiError =
            ProgressServiceError::Storage(StorageError::Connection("pool timed out".into())).into();
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
