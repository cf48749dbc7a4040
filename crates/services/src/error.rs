//! Shared error types for the services crate.

use thiserror::Error;

use lms_core::model::{CertificateId, CertificateStatus, CourseId, UserId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error("user {user_id} is not enrolled in course {course_id}")]
    NotEnrolled { user_id: UserId, course_id: CourseId },
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error(transparent)]
    Invalid(#[from] lms_core::Error),
    #[error(transparent)]
    Certificate(#[from] CertificateServiceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `StageGateService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StageGateError {
    #[error("only administrators can manage stage locks")]
    Forbidden,
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error(transparent)]
    Invalid(#[from] lms_core::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `CertificateService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CertificateServiceError {
    #[error("user {user_id} is not enrolled in course {course_id}")]
    NotEnrolled { user_id: UserId, course_id: CourseId },
    #[error("only administrators can review certificates")]
    Forbidden,
    #[error("course not completed yet ({current}%)")]
    NotEligible { current: u8 },
    #[error("certificate is {status}, not pending")]
    NotPending { status: CertificateStatus },
    #[error("certificate {0} not found")]
    NotFound(CertificateId),
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("could not allocate a unique certificate number")]
    NumberExhausted,
    #[error(transparent)]
    Invalid(#[from] lms_core::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `CourseConfigService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CourseConfigError {
    #[error("only administrators can change course configuration")]
    Forbidden,
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error(transparent)]
    Invalid(#[from] lms_core::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Invalid(#[from] lms_core::Error),
}
