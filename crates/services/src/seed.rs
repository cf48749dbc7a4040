//! Demo data for exercising a fresh database by hand.

use lms_core::model::{CourseConfig, CourseId, CourseProfile, UserId, UserProfile};
use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;

/// What `seed_demo` writes. Re-running it overwrites the same ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoSeed {
    pub admin_id: UserId,
    pub learner_id: UserId,
    pub course_id: CourseId,
    pub course_title: String,
    pub lesson_count: u32,
}

impl Default for DemoSeed {
    fn default() -> Self {
        Self {
            admin_id: UserId::new(1),
            learner_id: UserId::new(2),
            course_id: CourseId::new(1),
            course_title: "Systems Programming in Rust".into(),
            lesson_count: 8,
        }
    }
}

/// Write an admin, a learner and one course, and enroll the learner.
///
/// Re-seeding keeps whatever configuration the course already has.
///
/// # Errors
///
/// Returns `AppServicesError::Invalid` for an empty course title.
/// Returns `AppServicesError::Storage` if any write fails.
pub async fn seed_demo(
    storage: &Storage,
    clock: Clock,
    seed: &DemoSeed,
) -> Result<(), AppServicesError> {
    let now = clock.now();
    let admin = UserProfile::new(seed.admin_id, "Course Admin").map_err(lms_core::Error::from)?;
    let learner =
        UserProfile::new(seed.learner_id, "Demo Learner").map_err(lms_core::Error::from)?;
    storage.directory.upsert_user(&admin).await?;
    storage.directory.upsert_user(&learner).await?;

    let config = storage
        .directory
        .get_course(seed.course_id)
        .await?
        .map_or_else(CourseConfig::default, |existing| *existing.config());
    let course = CourseProfile::new(
        seed.course_id,
        seed.course_title.as_str(),
        "Ferris Crab",
        seed.lesson_count,
        config,
        now,
    )
    .map_err(lms_core::Error::from)?;
    storage.directory.upsert_course(&course).await?;
    storage
        .enrollments
        .enroll(seed.learner_id, seed.course_id, now)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use lms_core::aggregator::StepWeights;
    use lms_core::time::fixed_clock;

    #[tokio::test]
    async fn seeding_twice_is_harmless() {
        let storage = Storage::in_memory();
        let seed = DemoSeed::default();
        seed_demo(&storage, fixed_clock(), &seed).await.unwrap();
        seed_demo(&storage, fixed_clock(), &seed).await.unwrap();

        let course = storage.directory.get_course(seed.course_id).await.unwrap().unwrap();
        assert_eq!(course.lesson_count(), 8);
        assert!(
            storage
                .enrollments
                .is_enrolled(seed.learner_id, seed.course_id)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn reseeding_keeps_configured_weights() {
        let storage = Storage::in_memory();
        let seed = DemoSeed::default();
        seed_demo(&storage, fixed_clock(), &seed).await.unwrap();

        let weights = StepWeights::from_named([
            ("intro", 10),
            ("pretest", 10),
            ("lessons", 40),
            ("posttest", 20),
            ("postwork", 10),
            ("finalproject", 10),
        ])
        .unwrap();
        let configured = CourseConfig {
            step_weights: weights,
            ..CourseConfig::default()
        };
        storage
            .directory
            .update_course_config(seed.course_id, &configured)
            .await
            .unwrap();

        seed_demo(&storage, fixed_clock(), &seed).await.unwrap();
        let course = storage.directory.get_course(seed.course_id).await.unwrap().unwrap();
        assert_eq!(*course.config(), configured);
    }
}
