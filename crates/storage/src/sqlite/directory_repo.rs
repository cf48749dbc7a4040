use chrono::{DateTime, Utc};
use lms_core::model::{CourseConfig, CourseId, CourseProfile, Enrollment, UserId, UserProfile};

use super::SqliteRepository;
use super::mapping::{
    db_err, id_to_i64, map_course_row, map_enrollment_row, map_user_row, weights_to_json,
};
use crate::repository::{DirectoryRepository, EnrollmentRepository, StorageError};

#[async_trait::async_trait]
impl DirectoryRepository for SqliteRepository {
    async fn upsert_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO users (id, display_name)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name
            ",
        )
        .bind(id_to_i64("user_id", user.id().value())?)
        .bind(user.display_name())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>, StorageError> {
        let row = sqlx::query("SELECT id, display_name FROM users WHERE id = ?1")
            .bind(id_to_i64("user_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(map_user_row).transpose()
    }

    async fn upsert_course(&self, course: &CourseProfile) -> Result<(), StorageError> {
        let config = course.config();
        sqlx::query(
            r"
            INSERT INTO courses (id, title, instructor, lesson_count, has_post_work, has_final_project, step_weights, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                instructor = excluded.instructor,
                lesson_count = excluded.lesson_count,
                has_post_work = excluded.has_post_work,
                has_final_project = excluded.has_final_project,
                step_weights = excluded.step_weights
            ",
        )
        .bind(id_to_i64("course_id", course.id().value())?)
        .bind(course.title())
        .bind(course.instructor())
        .bind(i64::from(course.lesson_count()))
        .bind(i64::from(config.has_post_work))
        .bind(i64::from(config.has_final_project))
        .bind(weights_to_json(&config.step_weights)?)
        .bind(course.created_at())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<CourseProfile>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, title, instructor, lesson_count, has_post_work, has_final_project, step_weights, created_at
            FROM courses WHERE id = ?1
            ",
        )
        .bind(id_to_i64("course_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(map_course_row).transpose()
    }

    async fn update_course_config(
        &self,
        id: CourseId,
        config: &CourseConfig,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE courses
            SET has_post_work = ?2, has_final_project = ?3, step_weights = ?4
            WHERE id = ?1
            ",
        )
        .bind(id_to_i64("course_id", id.value())?)
        .bind(i64::from(config.has_post_work))
        .bind(i64::from(config.has_final_project))
        .bind(weights_to_json(&config.step_weights)?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> Result<Enrollment, StorageError> {
        sqlx::query(
            r"
            INSERT INTO enrollments (user_id, course_id, enrolled_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id, course_id) DO NOTHING
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(id_to_i64("course_id", course_id.value())?)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.get_enrollment(user_id, course_id)
            .await?
            .ok_or(StorageError::NotFound)
    }

    async fn get_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, course_id, enrolled_at, progress, completed_at
            FROM enrollments WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(id_to_i64("course_id", course_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(map_enrollment_row).transpose()
    }

    async fn mirror_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
        progress: u8,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            UPDATE enrollments
            SET progress = MAX(progress, ?3),
                completed_at = COALESCE(completed_at, ?4)
            WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(id_to_i64("course_id", course_id.value())?)
        .bind(i64::from(progress))
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
