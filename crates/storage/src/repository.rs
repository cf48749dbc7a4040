use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lms_core::model::{
    Certificate, CertificateDecision, CertificateId, CertificateStatus, CourseConfig, CourseId,
    CourseProfile, CourseProgress, CourseProgressUpdate, Enrollment, LessonDelta, LessonId,
    LessonProgress, NewCertificate, Stage, StageLock, StageSet, UserId, UserProfile,
};
use std::sync::Arc;
use thiserror::Error;

use crate::memory::InMemoryRepository;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A unique constraint rejected the write.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── COLLABORATOR DATA ─────────────────────────────────────────────────────────
//

/// Users and courses as the engine sees them.
#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the user cannot be stored.
    async fn upsert_user(&self, user: &UserProfile) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(&self, course: &CourseProfile) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_course(&self, id: CourseId) -> Result<Option<CourseProfile>, StorageError>;

    /// Replace the progress configuration of an existing course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course does not exist.
    async fn update_course_config(
        &self,
        id: CourseId,
        config: &CourseConfig,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Enroll a user; enrolling twice returns the existing row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the user or course is unknown to the backend
    /// or the write fails.
    async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> Result<Enrollment, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn is_enrolled(&self, user_id: UserId, course_id: CourseId) -> Result<bool, StorageError> {
        Ok(self.get_enrollment(user_id, course_id).await?.is_some())
    }

    /// Copy merged course progress onto the enrollment row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn mirror_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
        progress: u8,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError>;
}

//
// ─── PROGRESS ──────────────────────────────────────────────────────────────────
//

/// Lesson and course progress. Every write is a monotonic merge performed by
/// the backend in one step, so concurrent writers converge.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fold a lesson delta into the stored row, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn apply_lesson_delta(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        delta: LessonDelta,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_lesson_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError>;

    /// Number of lessons the user has completed in the course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn count_completed_lessons(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<u32, StorageError>;

    /// Add stages to the stored completed set and return the whole set.
    ///
    /// Stages already present keep their original position.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn record_completed_stages(
        &self,
        user_id: UserId,
        course_id: CourseId,
        stages: &StageSet,
        at: DateTime<Utc>,
    ) -> Result<StageSet, StorageError>;

    /// Merge a sync into the course progress row and return the stored row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn merge_course_progress(
        &self,
        update: &CourseProgressUpdate,
    ) -> Result<CourseProgress, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError>;

    /// All course progress of a user, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_course_progress(&self, user_id: UserId)
    -> Result<Vec<CourseProgress>, StorageError>;
}

//
// ─── STAGE LOCKS ───────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait StageLockRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_stage_lock(
        &self,
        course_id: CourseId,
        stage: Stage,
    ) -> Result<Option<StageLock>, StorageError>;

    /// Stored locks of a course, in catalog order. Stages never written are
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_stage_locks(&self, course_id: CourseId) -> Result<Vec<StageLock>, StorageError>;

    /// Insert or update the lock keyed by (course, stage).
    ///
    /// Returns `false` when the stored lock already had the same state; the
    /// row is then left untouched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn upsert_stage_lock(&self, lock: &StageLock) -> Result<bool, StorageError>;
}

//
// ─── CERTIFICATES ──────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait CertificateRepository: Send + Sync {
    /// Store a new pending certificate.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when a certificate already exists for
    /// the (user, course) pair or the number is taken.
    async fn insert_pending(&self, cert: &NewCertificate) -> Result<Certificate, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn find_for_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Certificate>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_certificate(&self, id: CertificateId)
    -> Result<Option<Certificate>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn find_by_number(&self, cert_number: &str) -> Result<Option<Certificate>, StorageError>;

    /// Apply a decision if and only if the certificate is still pending.
    ///
    /// Returns `false` when no pending row matched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn record_decision(
        &self,
        id: CertificateId,
        decision: &CertificateDecision,
        admin: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// A user's certificates, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Certificate>, StorageError>;

    /// All certificates, optionally in one status. Pending certificates are
    /// listed oldest first, everything else newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_certificates(
        &self,
        status: Option<CertificateStatus>,
    ) -> Result<Vec<Certificate>, StorageError>;
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub directory: Arc<dyn DirectoryRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub stage_locks: Arc<dyn StageLockRepository>,
    pub certificates: Arc<dyn CertificateRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            directory: Arc::new(repo.clone()),
            enrollments: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            stage_locks: Arc::new(repo.clone()),
            certificates: Arc::new(repo),
        }
    }
}
