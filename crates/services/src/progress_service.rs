use std::collections::HashMap;
use std::sync::Arc;

use lms_core::aggregator::MAX_PERCENT;
use lms_core::model::{
    CertificateStatus, CourseId, CourseProfile, CourseProgressUpdate, LessonDelta, LessonId,
    StageSet, UserId, checked_time_spent,
};
use lms_core::resume::resolve_resume;
use lms_core::time::client_timestamp;
use storage::repository::{DirectoryRepository, EnrollmentRepository, ProgressRepository};
use tracing::{debug, warn};

use crate::Clock;
use crate::certificate_service::CertificateService;
use crate::error::ProgressServiceError;
use crate::views::{
    EnrollmentView, LessonProgressView, LessonUpdate, ProgressSnapshot, SyncRequest,
};

/// Progress sync and the progress reads built on the same store.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    directory: Arc<dyn DirectoryRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    progress: Arc<dyn ProgressRepository>,
    certificates: Arc<CertificateService>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        directory: Arc<dyn DirectoryRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        progress: Arc<dyn ProgressRepository>,
        certificates: Arc<CertificateService>,
    ) -> Self {
        Self {
            clock,
            directory,
            enrollments,
            progress,
            certificates,
        }
    }

    /// Merge a client's view of a course into stored progress.
    ///
    /// Every lesson delta is validated before anything is written. Each write
    /// after that is a monotonic merge, so a sync that fails halfway can be
    /// retried as is. The returned snapshot carries stored values only.
    ///
    /// A learner whose stored stages cover the whole catalog is issued a
    /// pending certificate; a failure there is logged and leaves the
    /// certificate status empty.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::NotEnrolled` if the user is not enrolled.
    /// Returns `ProgressServiceError::CourseNotFound` if the course is missing.
    /// Returns `ProgressServiceError::Invalid` for out-of-range lesson progress
    /// or time spent.
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    #[tracing::instrument(skip(self, request), fields(course_id = %request.course_id))]
    pub async fn sync(
        &self,
        user_id: UserId,
        request: SyncRequest,
    ) -> Result<ProgressSnapshot, ProgressServiceError> {
        let course_id = request.course_id;
        let course = self.enrolled_course(user_id, course_id).await?;

        let parsed = StageSet::parse_lenient(&request.completed_steps);
        if !parsed.unknown.is_empty() {
            warn!(unknown = ?parsed.unknown, "ignoring unknown stage names");
        }
        if let Some(hint) = request.current_step.as_deref() {
            debug!(client_step = hint, "client resume hint ignored");
        }

        let deltas = request
            .lesson_progress
            .iter()
            .map(|(lesson_id, update)| Ok((*lesson_id, to_delta(*update)?)))
            .collect::<Result<Vec<_>, lms_core::Error>>()?;
        let total_time_spent =
            checked_time_spent(request.total_time_spent).map_err(lms_core::Error::from)?;

        let now = self.clock.now();
        for (lesson_id, delta) in deltas {
            self.progress
                .apply_lesson_delta(user_id, course_id, lesson_id, delta, now)
                .await?;
        }

        let completed = self
            .progress
            .record_completed_stages(user_id, course_id, &parsed.stages, now)
            .await?;
        let overall = course.config().step_weights.weighted_progress(&completed);
        let lessons_completed = self
            .progress
            .count_completed_lessons(user_id, course_id)
            .await?;

        let completed_at = (overall >= MAX_PERCENT).then(|| {
            request
                .completed_at
                .as_deref()
                .and_then(|raw| client_timestamp(raw, now))
                .unwrap_or(now)
        });

        let stored = self
            .progress
            .merge_course_progress(&CourseProgressUpdate {
                user_id,
                course_id,
                current_step: resolve_resume(&completed),
                overall_progress: overall,
                time_spent_secs: total_time_spent,
                lessons_completed,
                total_lessons: course.lesson_count(),
                completed_at,
                at: now,
            })
            .await?;
        self.enrollments
            .mirror_progress(
                user_id,
                course_id,
                stored.overall_progress,
                stored.completed_at,
            )
            .await?;
        debug!(
            overall = stored.overall_progress,
            stages = stored.completed_stages.len(),
            "progress merged"
        );

        let certificate_status = if stored.completed_stages.is_complete() {
            match self.certificates.issue(user_id, course_id).await {
                Ok(outcome) => Some(outcome.certificate().status),
                Err(err) => {
                    warn!(error = %err, "automatic certificate issuance failed");
                    None
                }
            }
        } else {
            self.certificate_status(user_id, course_id).await?
        };

        Ok(ProgressSnapshot::stored(&stored, certificate_status))
    }

    /// Stored progress for one course, or the not-started snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::NotEnrolled` if the user is not enrolled.
    /// Returns `ProgressServiceError::CourseNotFound` if the course is missing.
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<ProgressSnapshot, ProgressServiceError> {
        let course = self.enrolled_course(user_id, course_id).await?;
        let status = self.certificate_status(user_id, course_id).await?;
        let snapshot = match self.progress.get_course_progress(user_id, course_id).await? {
            Some(stored) => ProgressSnapshot::stored(&stored, status),
            None => ProgressSnapshot::not_started(course_id, course.lesson_count()),
        };
        Ok(snapshot)
    }

    /// All of a user's course progress, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn list_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ProgressSnapshot>, ProgressServiceError> {
        let statuses: HashMap<_, _> = self
            .certificates
            .list_mine(user_id)
            .await?
            .into_iter()
            .map(|cert| (cert.course_id, cert.status))
            .collect();

        let rows = self.progress.list_course_progress(user_id).await?;
        Ok(rows
            .iter()
            .map(|row| ProgressSnapshot::stored(row, statuses.get(&row.course_id).copied()))
            .collect())
    }

    /// Standalone lesson update with the same merge rules as a sync.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::NotEnrolled` if the user is not enrolled.
    /// Returns `ProgressServiceError::Invalid` for progress above 100.
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_lesson(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        update: LessonUpdate,
    ) -> Result<LessonProgressView, ProgressServiceError> {
        self.require_enrollment(user_id, course_id).await?;
        let delta = to_delta(update)?;
        let stored = self
            .progress
            .apply_lesson_delta(user_id, course_id, lesson_id, delta, self.clock.now())
            .await?;
        Ok(LessonProgressView::stored(&stored))
    }

    /// Stored lesson progress, or a zeroed row for an untouched lesson.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::NotEnrolled` if the user is not enrolled.
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn lesson_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
    ) -> Result<LessonProgressView, ProgressServiceError> {
        self.require_enrollment(user_id, course_id).await?;
        let stored = self
            .progress
            .get_lesson_progress(user_id, course_id, lesson_id)
            .await?;
        Ok(stored.map_or_else(
            || LessonProgressView::untouched(course_id, lesson_id),
            |lesson| LessonProgressView::stored(&lesson),
        ))
    }

    /// Enroll a user; enrolling twice returns the first enrollment.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::UserNotFound`/`CourseNotFound` for unknown ids.
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    #[tracing::instrument(skip(self))]
    pub async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<EnrollmentView, ProgressServiceError> {
        if self.directory.get_user(user_id).await?.is_none() {
            return Err(ProgressServiceError::UserNotFound(user_id));
        }
        if self.directory.get_course(course_id).await?.is_none() {
            return Err(ProgressServiceError::CourseNotFound(course_id));
        }
        let enrollment = self
            .enrollments
            .enroll(user_id, course_id, self.clock.now())
            .await?;
        Ok(EnrollmentView {
            user_id: enrollment.user_id,
            course_id: enrollment.course_id,
            enrolled_at: enrollment.enrolled_at,
            progress: enrollment.progress,
            completed_at: enrollment.completed_at,
        })
    }

    async fn require_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<(), ProgressServiceError> {
        if self.enrollments.is_enrolled(user_id, course_id).await? {
            Ok(())
        } else {
            Err(ProgressServiceError::NotEnrolled { user_id, course_id })
        }
    }

    async fn enrolled_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseProfile, ProgressServiceError> {
        self.require_enrollment(user_id, course_id).await?;
        self.directory
            .get_course(course_id)
            .await?
            .ok_or(ProgressServiceError::CourseNotFound(course_id))
    }

    async fn certificate_status(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CertificateStatus>, ProgressServiceError> {
        Ok(self.certificates.status_for(user_id, course_id).await?)
    }
}

fn to_delta(update: LessonUpdate) -> Result<LessonDelta, lms_core::Error> {
    Ok(LessonDelta::new(
        update.progress,
        update.completed,
        update.time_spent,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use chrono::Duration;
    use lms_core::model::{CourseConfig, Stage, UserProfile};
    use lms_core::time::{fixed_clock, fixed_now};
    use storage::repository::Storage;

    const LEARNER: UserId = UserId::new(2);
    const COURSE: CourseId = CourseId::new(7);

    async fn setup() -> ProgressService {
        let storage = Storage::in_memory();
        storage
            .directory
            .upsert_user(&UserProfile::new(LEARNER, "Ada").unwrap())
            .await
            .unwrap();
        storage
            .directory
            .upsert_course(
                &CourseProfile::new(COURSE, "Rust", "Ferris", 4, CourseConfig::default(), fixed_now())
                    .unwrap(),
            )
            .await
            .unwrap();
        let certificates = Arc::new(CertificateService::new(
            fixed_clock(),
            Arc::clone(&storage.directory),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.certificates),
        ));
        ProgressService::new(
            fixed_clock(),
            Arc::clone(&storage.directory),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.progress),
            certificates,
        )
    }

    fn request(steps: &[&str]) -> SyncRequest {
        SyncRequest {
            course_id: COURSE,
            current_step: None,
            completed_steps: steps.iter().map(|s| (*s).to_owned()).collect(),
            lesson_progress: BTreeMap::new(),
            total_time_spent: 0,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn sync_requires_enrollment() {
        let service = setup().await;
        let err = service.sync(LEARNER, request(&["intro"])).await.unwrap_err();
        assert!(matches!(err, ProgressServiceError::NotEnrolled { .. }));
    }

    #[tokio::test]
    async fn sync_recomputes_resume_pointer_and_ignores_hint() {
        let service = setup().await;
        service.enroll(LEARNER, COURSE).await.unwrap();

        let mut req = request(&["pretest", "intro", "bogus"]);
        req.current_step = Some("finalproject".into());
        let snap = service.sync(LEARNER, req).await.unwrap();

        assert_eq!(snap.current_step, Stage::Lessons);
        assert_eq!(snap.overall_progress, 15);
        assert_eq!(snap.completed_steps, vec![Stage::Pretest, Stage::Intro]);
        assert_eq!(snap.certificate_status, None);
    }

    #[tokio::test]
    async fn partial_replay_never_regresses() {
        let service = setup().await;
        service.enroll(LEARNER, COURSE).await.unwrap();

        let mut first = request(&["intro", "pretest", "lessons"]);
        first.total_time_spent = 900;
        let snap = service.sync(LEARNER, first).await.unwrap();
        assert_eq!(snap.overall_progress, 65);

        let mut replay = request(&["intro"]);
        replay.total_time_spent = 100;
        let snap = service.sync(LEARNER, replay).await.unwrap();
        assert_eq!(snap.overall_progress, 65);
        assert_eq!(snap.total_time_spent, 900);
        assert_eq!(snap.current_step, Stage::Posttest);
    }

    #[tokio::test]
    async fn invalid_lesson_rejects_whole_sync() {
        let service = setup().await;
        service.enroll(LEARNER, COURSE).await.unwrap();

        let mut req = request(&["intro"]);
        req.lesson_progress.insert(
            LessonId::new(1),
            LessonUpdate { progress: 50, completed: false, time_spent: 10 },
        );
        req.lesson_progress.insert(
            LessonId::new(2),
            LessonUpdate { progress: 150, completed: false, time_spent: 10 },
        );
        let err = service.sync(LEARNER, req).await.unwrap_err();
        assert!(matches!(err, ProgressServiceError::Invalid(_)));

        let lesson = service
            .lesson_progress(LEARNER, COURSE, LessonId::new(1))
            .await
            .unwrap();
        assert_eq!(lesson.progress, 0);
        assert_eq!(lesson.updated_at, None);
    }

    #[tokio::test]
    async fn oversized_total_time_writes_nothing() {
        let service = setup().await;
        service.enroll(LEARNER, COURSE).await.unwrap();

        let mut req = request(&["intro", "pretest"]);
        req.lesson_progress.insert(
            LessonId::new(1),
            LessonUpdate { progress: 50, completed: true, time_spent: 10 },
        );
        req.total_time_spent = u64::MAX;
        let err = service.sync(LEARNER, req).await.unwrap_err();
        assert!(matches!(err, ProgressServiceError::Invalid(_)));

        let lesson = service
            .lesson_progress(LEARNER, COURSE, LessonId::new(1))
            .await
            .unwrap();
        assert_eq!(lesson.updated_at, None);
        let snap = service.course_progress(LEARNER, COURSE).await.unwrap();
        assert_eq!(snap.overall_progress, 0);
        assert!(snap.completed_steps.is_empty());
    }

    #[tokio::test]
    async fn lessons_feed_the_ratio() {
        let service = setup().await;
        service.enroll(LEARNER, COURSE).await.unwrap();

        let mut req = request(&["intro", "pretest"]);
        req.lesson_progress.insert(
            LessonId::new(1),
            LessonUpdate { progress: 100, completed: true, time_spent: 60 },
        );
        let snap = service.sync(LEARNER, req).await.unwrap();
        assert_eq!(snap.lessons_completed, 1);
        assert_eq!(snap.total_lessons, 4);
        assert_eq!(snap.lesson_completion, 25);
    }

    #[tokio::test]
    async fn finishing_issues_a_pending_certificate() {
        let service = setup().await;
        service.enroll(LEARNER, COURSE).await.unwrap();

        let mut req = request(&Stage::CATALOG.map(Stage::as_str));
        let earlier = fixed_now() - Duration::hours(2);
        req.completed_at = Some(earlier.to_rfc3339());
        let snap = service.sync(LEARNER, req).await.unwrap();

        assert_eq!(snap.overall_progress, 100);
        assert_eq!(snap.current_step, Stage::FinalProject);
        assert_eq!(snap.completed_at, Some(earlier));
        assert_eq!(snap.certificate_status, Some(CertificateStatus::Pending));

        let again = service
            .sync(LEARNER, request(&Stage::CATALOG.map(Stage::as_str)))
            .await
            .unwrap();
        assert_eq!(again.completed_at, Some(earlier));
        assert_eq!(again.certificate_status, Some(CertificateStatus::Pending));
    }

    #[tokio::test]
    async fn future_completion_time_falls_back_to_clock() {
        let service = setup().await;
        service.enroll(LEARNER, COURSE).await.unwrap();

        let mut req = request(&Stage::CATALOG.map(Stage::as_str));
        req.completed_at = Some((fixed_now() + Duration::days(1)).to_rfc3339());
        let snap = service.sync(LEARNER, req).await.unwrap();
        assert_eq!(snap.completed_at, Some(fixed_now()));
    }

    #[tokio::test]
    async fn unsynced_course_reads_as_not_started() {
        let service = setup().await;
        service.enroll(LEARNER, COURSE).await.unwrap();

        let snap = service.course_progress(LEARNER, COURSE).await.unwrap();
        assert_eq!(snap.current_step, Stage::Intro);
        assert_eq!(snap.total_lessons, 4);
        assert!(service.list_progress(LEARNER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn enroll_rejects_unknown_course() {
        let service = setup().await;
        let err = service
            .enroll(LEARNER, CourseId::new(404))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressServiceError::CourseNotFound(_)));
    }
}
