use std::sync::Arc;

use lms_core::model::{Caller, CourseId, Stage, StageAccess, StageLock};
use storage::repository::{DirectoryRepository, StageLockRepository};
use tracing::info;

use crate::Clock;
use crate::error::StageGateError;
use crate::views::{StageAccessView, StageLockUpdate, StageLockView};

/// Answers access checks and lets admins lock stages.
#[derive(Clone)]
pub struct StageGateService {
    clock: Clock,
    directory: Arc<dyn DirectoryRepository>,
    locks: Arc<dyn StageLockRepository>,
}

impl StageGateService {
    #[must_use]
    pub fn new(
        clock: Clock,
        directory: Arc<dyn DirectoryRepository>,
        locks: Arc<dyn StageLockRepository>,
    ) -> Self {
        Self {
            clock,
            directory,
            locks,
        }
    }

    /// Whether `caller` may enter `stage_name` of a course.
    ///
    /// # Errors
    ///
    /// Returns `StageGateError::Invalid` for a name outside the stage catalog.
    /// Returns `StageGateError::CourseNotFound` if the course is missing.
    /// Returns `StageGateError::Storage` if repository access fails.
    pub async fn check_access(
        &self,
        caller: &Caller,
        course_id: CourseId,
        stage_name: &str,
    ) -> Result<StageAccessView, StageGateError> {
        let stage = parse_stage(stage_name)?;
        self.require_course(course_id).await?;

        let lock = if caller.is_privileged() {
            None
        } else {
            self.locks.get_stage_lock(course_id, stage).await?
        };
        let access = StageAccess::evaluate(lock.as_ref(), caller.role);
        Ok(StageAccessView::new(course_id, stage, access))
    }

    /// Every catalog stage of a course with its lock state. Stages never
    /// locked show as unlocked.
    ///
    /// # Errors
    ///
    /// Returns `StageGateError::Forbidden` unless the caller is an admin.
    /// Returns `StageGateError::CourseNotFound` if the course is missing.
    /// Returns `StageGateError::Storage` if repository access fails.
    pub async fn list_locks(
        &self,
        caller: &Caller,
        course_id: CourseId,
    ) -> Result<Vec<StageLockView>, StageGateError> {
        if !caller.is_privileged() {
            return Err(StageGateError::Forbidden);
        }
        self.require_course(course_id).await?;

        let mut stored = self.locks.list_stage_locks(course_id).await?;
        Ok(Stage::CATALOG
            .iter()
            .map(|&stage| {
                stored
                    .iter()
                    .position(|lock| lock.stage == stage)
                    .map_or_else(
                        || StageLock::unlocked(course_id, stage),
                        |idx| stored.swap_remove(idx),
                    )
                    .into()
            })
            .collect())
    }

    /// Engage or release a lock. Writing the state already stored changes
    /// nothing, audit stamp included.
    ///
    /// # Errors
    ///
    /// Returns `StageGateError::Forbidden` unless the caller is an admin.
    /// Returns `StageGateError::Invalid` for a name outside the stage catalog.
    /// Returns `StageGateError::CourseNotFound` if the course is missing.
    /// Returns `StageGateError::Storage` if repository access fails.
    #[tracing::instrument(skip(self, caller, update), fields(admin = %caller.user_id, stage = %update.stage_name))]
    pub async fn set_lock(
        &self,
        caller: &Caller,
        course_id: CourseId,
        update: StageLockUpdate,
    ) -> Result<StageLockView, StageGateError> {
        if !caller.is_privileged() {
            return Err(StageGateError::Forbidden);
        }
        let stage = parse_stage(&update.stage_name)?;
        self.require_course(course_id).await?;

        let lock = StageLock::set_by(
            course_id,
            stage,
            update.is_locked,
            update.lock_message,
            caller,
            self.clock.now(),
        );
        if self.locks.upsert_stage_lock(&lock).await? {
            info!(is_locked = lock.is_locked, "stage lock changed");
        }

        let stored = self
            .locks
            .get_stage_lock(course_id, stage)
            .await?
            .unwrap_or(lock);
        Ok(stored.into())
    }

    async fn require_course(&self, course_id: CourseId) -> Result<(), StageGateError> {
        match self.directory.get_course(course_id).await? {
            Some(_) => Ok(()),
            None => Err(StageGateError::CourseNotFound(course_id)),
        }
    }
}

fn parse_stage(name: &str) -> Result<Stage, lms_core::Error> {
    Ok(name.parse::<Stage>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use lms_core::model::{CourseConfig, CourseProfile, Role, UserId};
    use lms_core::time::{fixed_clock, fixed_now};
    use storage::repository::Storage;

    const COURSE: CourseId = CourseId::new(3);

    async fn setup(clock: Clock) -> StageGateService {
        let storage = Storage::in_memory();
        storage
            .directory
            .upsert_course(
                &CourseProfile::new(COURSE, "Rust", "Ferris", 2, CourseConfig::default(), fixed_now())
                    .unwrap(),
            )
            .await
            .unwrap();
        StageGateService::new(
            clock,
            Arc::clone(&storage.directory),
            Arc::clone(&storage.stage_locks),
        )
    }

    fn admin() -> Caller {
        Caller::new(UserId::new(1), Role::Admin)
    }

    fn student() -> Caller {
        Caller::new(UserId::new(2), Role::Student)
    }

    fn lock(stage: &str, is_locked: bool, message: &str) -> StageLockUpdate {
        StageLockUpdate {
            stage_name: stage.into(),
            is_locked,
            lock_message: message.into(),
        }
    }

    #[tokio::test]
    async fn missing_lock_means_open() {
        let gate = setup(fixed_clock()).await;
        let access = gate.check_access(&student(), COURSE, "posttest").await.unwrap();
        assert!(access.can_access);
        assert!(!access.is_locked);
    }

    #[tokio::test]
    async fn locked_stage_denies_learners_but_not_admins() {
        let gate = setup(fixed_clock()).await;
        gate.set_lock(&admin(), COURSE, lock("posttest", true, "Opens Monday"))
            .await
            .unwrap();

        let learner = gate.check_access(&student(), COURSE, "posttest").await.unwrap();
        assert!(!learner.can_access);
        assert_eq!(learner.lock_message, "Opens Monday");

        let instructor = Caller::new(UserId::new(3), Role::Instructor);
        let access = gate.check_access(&instructor, COURSE, "posttest").await.unwrap();
        assert!(!access.can_access);

        let access = gate.check_access(&admin(), COURSE, "posttest").await.unwrap();
        assert!(access.can_access);
        assert_eq!(access.lock_message, "");
    }

    #[tokio::test]
    async fn repeated_lock_keeps_first_stamp() {
        let mut clock = fixed_clock();
        let gate = setup(clock).await;
        let first = gate
            .set_lock(&admin(), COURSE, lock("lessons", true, "soon"))
            .await
            .unwrap();
        assert_eq!(first.locked_at, Some(fixed_now()));

        clock.advance(Duration::hours(1));
        let gate = StageGateService { clock, ..gate };
        let again = gate
            .set_lock(&admin(), COURSE, lock("lessons", true, "soon"))
            .await
            .unwrap();
        assert_eq!(again, first);

        let released = gate
            .set_lock(&admin(), COURSE, lock("lessons", false, ""))
            .await
            .unwrap();
        assert!(!released.is_locked);
        assert_eq!(released.locked_by, None);
    }

    #[tokio::test]
    async fn admin_operations_are_guarded_and_validated() {
        let gate = setup(fixed_clock()).await;
        let err = gate
            .set_lock(&student(), COURSE, lock("intro", true, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, StageGateError::Forbidden));

        let err = gate
            .set_lock(&admin(), COURSE, lock("capstone", true, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, StageGateError::Invalid(_)));

        let err = gate
            .check_access(&student(), CourseId::new(404), "intro")
            .await
            .unwrap_err();
        assert!(matches!(err, StageGateError::CourseNotFound(_)));
    }

    #[tokio::test]
    async fn listing_covers_the_whole_catalog() {
        let gate = setup(fixed_clock()).await;
        gate.set_lock(&admin(), COURSE, lock("postwork", true, "closed"))
            .await
            .unwrap();
        let locks = gate.list_locks(&admin(), COURSE).await.unwrap();
        let stages: Vec<_> = locks.iter().map(|l| l.stage).collect();
        assert_eq!(stages, Stage::CATALOG.to_vec());
        assert!(locks[4].is_locked);
        assert!(locks.iter().filter(|l| l.is_locked).count() == 1);
    }
}
