use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lms_core::model::{
    Certificate, CertificateDecision, CertificateId, CertificateStatus, CourseConfig, CourseId,
    CourseProfile, CourseProgress, CourseProgressUpdate, Enrollment, LessonDelta, LessonId,
    LessonProgress, NewCertificate, Stage, StageLock, StageSet, UserId, UserProfile,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::repository::{
    CertificateRepository, DirectoryRepository, EnrollmentRepository, ProgressRepository,
    StageLockRepository, StorageError,
};

type Pair = (UserId, CourseId);

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Each method holds its mutex for the whole read-merge-write, which gives the
/// same atomicity the `SQLite` backend gets from single statements. Where two
/// maps are touched, `stage_sets` is always locked before `course_progress`.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    users: Arc<Mutex<HashMap<UserId, UserProfile>>>,
    courses: Arc<Mutex<HashMap<CourseId, CourseProfile>>>,
    enrollments: Arc<Mutex<HashMap<Pair, Enrollment>>>,
    lessons: Arc<Mutex<HashMap<(UserId, CourseId, LessonId), LessonProgress>>>,
    stage_sets: Arc<Mutex<HashMap<Pair, StageSet>>>,
    course_progress: Arc<Mutex<HashMap<Pair, CourseProgress>>>,
    locks: Arc<Mutex<HashMap<(CourseId, Stage), StageLock>>>,
    certificates: Arc<Mutex<Vec<Certificate>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn guard<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    m.lock().map_err(|e| StorageError::Connection(e.to_string()))
}

#[async_trait]
impl DirectoryRepository for InMemoryRepository {
    async fn upsert_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        guard(&self.users)?.insert(user.id(), user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>, StorageError> {
        Ok(guard(&self.users)?.get(&id).cloned())
    }

    async fn upsert_course(&self, course: &CourseProfile) -> Result<(), StorageError> {
        guard(&self.courses)?.insert(course.id(), course.clone());
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<CourseProfile>, StorageError> {
        Ok(guard(&self.courses)?.get(&id).cloned())
    }

    async fn update_course_config(
        &self,
        id: CourseId,
        config: &CourseConfig,
    ) -> Result<(), StorageError> {
        let mut courses = guard(&self.courses)?;
        let course = courses.remove(&id).ok_or(StorageError::NotFound)?;
        courses.insert(id, course.with_config(*config));
        Ok(())
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> Result<Enrollment, StorageError> {
        if !guard(&self.users)?.contains_key(&user_id)
            || !guard(&self.courses)?.contains_key(&course_id)
        {
            return Err(StorageError::NotFound);
        }
        let mut enrollments = guard(&self.enrollments)?;
        Ok(enrollments
            .entry((user_id, course_id))
            .or_insert_with(|| Enrollment::new(user_id, course_id, at))
            .clone())
    }

    async fn get_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        Ok(guard(&self.enrollments)?.get(&(user_id, course_id)).cloned())
    }

    async fn mirror_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
        progress: u8,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        if let Some(enrollment) = guard(&self.enrollments)?.get_mut(&(user_id, course_id)) {
            enrollment.mirror(progress, completed_at);
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn apply_lesson_delta(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        delta: LessonDelta,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        let mut lessons = guard(&self.lessons)?;
        let row = lessons
            .entry((user_id, course_id, lesson_id))
            .or_insert_with(|| LessonProgress::untouched(user_id, course_id, lesson_id, at));
        row.apply(delta, at);
        Ok(row.clone())
    }

    async fn get_lesson_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        Ok(guard(&self.lessons)?
            .get(&(user_id, course_id, lesson_id))
            .cloned())
    }

    async fn count_completed_lessons(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<u32, StorageError> {
        let lessons = guard(&self.lessons)?;
        let count = lessons
            .values()
            .filter(|l| l.user_id == user_id && l.course_id == course_id && l.completed)
            .count();
        u32::try_from(count).map_err(|_| StorageError::Serialization("lesson count overflow".into()))
    }

    async fn record_completed_stages(
        &self,
        user_id: UserId,
        course_id: CourseId,
        stages: &StageSet,
        _at: DateTime<Utc>,
    ) -> Result<StageSet, StorageError> {
        let mut sets = guard(&self.stage_sets)?;
        let stored = sets.entry((user_id, course_id)).or_default();
        for stage in stages.iter() {
            stored.insert(stage);
        }
        let merged = stored.clone();
        if let Some(row) = guard(&self.course_progress)?.get_mut(&(user_id, course_id)) {
            row.completed_stages = merged.clone();
        }
        Ok(merged)
    }

    async fn merge_course_progress(
        &self,
        update: &CourseProgressUpdate,
    ) -> Result<CourseProgress, StorageError> {
        let key = (update.user_id, update.course_id);
        let sets = guard(&self.stage_sets)?;
        let completed = sets.get(&key).cloned().unwrap_or_default();
        let mut rows = guard(&self.course_progress)?;
        let row = rows
            .entry(key)
            .and_modify(|row| row.merge(update))
            .or_insert_with(|| CourseProgress::from_update(update, StageSet::new()));
        row.completed_stages = completed;
        Ok(row.clone())
    }

    async fn get_course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        Ok(guard(&self.course_progress)?
            .get(&(user_id, course_id))
            .cloned())
    }

    async fn list_course_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CourseProgress>, StorageError> {
        let rows = guard(&self.course_progress)?;
        let mut mine: Vec<CourseProgress> = rows
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then(a.course_id.cmp(&b.course_id))
        });
        Ok(mine)
    }
}

#[async_trait]
impl StageLockRepository for InMemoryRepository {
    async fn get_stage_lock(
        &self,
        course_id: CourseId,
        stage: Stage,
    ) -> Result<Option<StageLock>, StorageError> {
        Ok(guard(&self.locks)?.get(&(course_id, stage)).cloned())
    }

    async fn list_stage_locks(&self, course_id: CourseId) -> Result<Vec<StageLock>, StorageError> {
        let locks = guard(&self.locks)?;
        Ok(Stage::CATALOG
            .iter()
            .filter_map(|stage| locks.get(&(course_id, *stage)).cloned())
            .collect())
    }

    async fn upsert_stage_lock(&self, lock: &StageLock) -> Result<bool, StorageError> {
        let mut locks = guard(&self.locks)?;
        let key = (lock.course_id, lock.stage);
        if locks.get(&key).is_some_and(|stored| stored.same_state(lock)) {
            return Ok(false);
        }
        locks.insert(key, lock.clone());
        Ok(true)
    }
}

#[async_trait]
impl CertificateRepository for InMemoryRepository {
    async fn insert_pending(&self, cert: &NewCertificate) -> Result<Certificate, StorageError> {
        let mut rows = guard(&self.certificates)?;
        let taken = rows.iter().any(|row| {
            (row.user_id == cert.user_id && row.course_id == cert.course_id)
                || row.cert_number == cert.cert_number
        });
        if taken {
            return Err(StorageError::Conflict);
        }
        let next = u64::try_from(rows.len())
            .map_err(|_| StorageError::Serialization("certificate id overflow".into()))?;
        let id = CertificateId::new(next + 1);
        let stored = cert.clone().into_pending(id);
        rows.push(stored.clone());
        Ok(stored)
    }

    async fn find_for_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Certificate>, StorageError> {
        Ok(guard(&self.certificates)?
            .iter()
            .find(|row| row.user_id == user_id && row.course_id == course_id)
            .cloned())
    }

    async fn get_certificate(
        &self,
        id: CertificateId,
    ) -> Result<Option<Certificate>, StorageError> {
        Ok(guard(&self.certificates)?
            .iter()
            .find(|row| row.id == id)
            .cloned())
    }

    async fn find_by_number(&self, cert_number: &str) -> Result<Option<Certificate>, StorageError> {
        Ok(guard(&self.certificates)?
            .iter()
            .find(|row| row.cert_number == cert_number)
            .cloned())
    }

    async fn record_decision(
        &self,
        id: CertificateId,
        decision: &CertificateDecision,
        admin: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut rows = guard(&self.certificates)?;
        match rows.iter_mut().find(|row| row.id == id) {
            Some(row) => Ok(row.decide(decision, admin, at).is_ok()),
            None => Ok(false),
        }
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Certificate>, StorageError> {
        let rows = guard(&self.certificates)?;
        let mut mine: Vec<Certificate> = rows
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.issued_at.cmp(&a.issued_at).then(b.id.cmp(&a.id)));
        Ok(mine)
    }

    async fn list_certificates(
        &self,
        status: Option<CertificateStatus>,
    ) -> Result<Vec<Certificate>, StorageError> {
        let rows = guard(&self.certificates)?;
        let mut out: Vec<Certificate> = rows
            .iter()
            .filter(|row| status.is_none_or(|s| row.status == s))
            .cloned()
            .collect();
        if status == Some(CertificateStatus::Pending) {
            out.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then(a.id.cmp(&b.id)));
        } else {
            out.sort_by(|a, b| b.issued_at.cmp(&a.issued_at).then(b.id.cmp(&a.id)));
        }
        Ok(out)
    }
}
