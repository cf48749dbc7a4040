use chrono::{DateTime, Utc};
use lms_core::model::{
    CourseId, CourseProgress, CourseProgressUpdate, LessonDelta, LessonId, LessonProgress,
    MAX_TIME_SPENT_SECS, StageSet, UserId,
};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    db_err, id_to_i64, map_course_progress_row, map_lesson_row, parse_stage, secs_to_i64, ser,
};
use crate::repository::{ProgressRepository, StorageError};

const LESSON_COLUMNS: &str = "user_id, course_id, lesson_id, completed, progress, time_spent, started_at, updated_at, completed_at";

const COURSE_COLUMNS: &str = "user_id, course_id, current_step, time_spent, overall_progress, lessons_completed, total_lessons, started_at, updated_at, completed_at";

impl SqliteRepository {
    async fn stored_stages(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<StageSet, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT stage FROM course_progress_stages
            WHERE user_id = ?1 AND course_id = ?2
            ORDER BY position ASC, recorded_at ASC
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut stages = StageSet::new();
        for row in rows {
            let name: String = row.try_get("stage").map_err(ser)?;
            stages.insert(parse_stage(&name)?);
        }
        Ok(stages)
    }
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn apply_lesson_delta(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        delta: LessonDelta,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        let sql = format!(
            r"
            INSERT INTO lesson_progress ({LESSON_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, CASE WHEN ?4 = 1 THEN ?7 END)
            ON CONFLICT(user_id, course_id, lesson_id) DO UPDATE SET
                completed = MAX(lesson_progress.completed, excluded.completed),
                progress = MAX(lesson_progress.progress, excluded.progress),
                time_spent = MIN(?8, lesson_progress.time_spent + excluded.time_spent),
                updated_at = excluded.updated_at,
                completed_at = COALESCE(lesson_progress.completed_at, excluded.completed_at)
            RETURNING {LESSON_COLUMNS}
            "
        );
        let row = sqlx::query(&sql)
            .bind(id_to_i64("user_id", user_id.value())?)
            .bind(id_to_i64("course_id", course_id.value())?)
            .bind(id_to_i64("lesson_id", lesson_id.value())?)
            .bind(i64::from(delta.completed()))
            .bind(i64::from(delta.progress()))
            .bind(secs_to_i64(delta.time_spent_secs())?)
            .bind(at)
            .bind(secs_to_i64(MAX_TIME_SPENT_SECS)?)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        map_lesson_row(&row)
    }

    async fn get_lesson_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let sql = format!(
            "SELECT {LESSON_COLUMNS} FROM lesson_progress WHERE user_id = ?1 AND course_id = ?2 AND lesson_id = ?3"
        );
        let row = sqlx::query(&sql)
            .bind(id_to_i64("user_id", user_id.value())?)
            .bind(id_to_i64("course_id", course_id.value())?)
            .bind(id_to_i64("lesson_id", lesson_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(map_lesson_row).transpose()
    }

    async fn count_completed_lessons(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<u32, StorageError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM lesson_progress
            WHERE user_id = ?1 AND course_id = ?2 AND completed = 1
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(id_to_i64("course_id", course_id.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        u32::try_from(count).map_err(ser)
    }

    async fn record_completed_stages(
        &self,
        user_id: UserId,
        course_id: CourseId,
        stages: &StageSet,
        at: DateTime<Utc>,
    ) -> Result<StageSet, StorageError> {
        let uid = id_to_i64("user_id", user_id.value())?;
        let cid = id_to_i64("course_id", course_id.value())?;

        // Appends at the next position; stages already stored keep theirs.
        for stage in stages.iter() {
            sqlx::query(
                r"
                INSERT INTO course_progress_stages (user_id, course_id, stage, position, recorded_at)
                SELECT ?1, ?2, ?3, COALESCE(MAX(position), -1) + 1, ?4
                FROM course_progress_stages
                WHERE user_id = ?1 AND course_id = ?2
                ON CONFLICT(user_id, course_id, stage) DO NOTHING
                ",
            )
            .bind(uid)
            .bind(cid)
            .bind(stage.as_str())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        }

        self.stored_stages(uid, cid).await
    }

    async fn merge_course_progress(
        &self,
        update: &CourseProgressUpdate,
    ) -> Result<CourseProgress, StorageError> {
        let uid = id_to_i64("user_id", update.user_id.value())?;
        let cid = id_to_i64("course_id", update.course_id.value())?;

        let sql = format!(
            r"
            INSERT INTO course_progress ({COURSE_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9)
            ON CONFLICT(user_id, course_id) DO UPDATE SET
                current_step = excluded.current_step,
                time_spent = MAX(course_progress.time_spent, excluded.time_spent),
                overall_progress = MIN(100, MAX(course_progress.overall_progress, excluded.overall_progress)),
                lessons_completed = MAX(course_progress.lessons_completed, excluded.lessons_completed),
                total_lessons = excluded.total_lessons,
                updated_at = excluded.updated_at,
                completed_at = COALESCE(course_progress.completed_at, excluded.completed_at)
            RETURNING {COURSE_COLUMNS}
            "
        );
        let row = sqlx::query(&sql)
            .bind(uid)
            .bind(cid)
            .bind(update.current_step.as_str())
            .bind(secs_to_i64(update.time_spent_secs)?)
            .bind(i64::from(update.overall_progress.min(100)))
            .bind(i64::from(update.lessons_completed))
            .bind(i64::from(update.total_lessons))
            .bind(update.at)
            .bind(update.completed_at)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let stages = self.stored_stages(uid, cid).await?;
        map_course_progress_row(&row, stages)
    }

    async fn get_course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        let uid = id_to_i64("user_id", user_id.value())?;
        let cid = id_to_i64("course_id", course_id.value())?;
        let sql = format!(
            "SELECT {COURSE_COLUMNS} FROM course_progress WHERE user_id = ?1 AND course_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(uid)
            .bind(cid)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => {
                let stages = self.stored_stages(uid, cid).await?;
                map_course_progress_row(&row, stages).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn list_course_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CourseProgress>, StorageError> {
        let uid = id_to_i64("user_id", user_id.value())?;
        let sql = format!(
            "SELECT {COURSE_COLUMNS} FROM course_progress WHERE user_id = ?1 ORDER BY updated_at DESC, course_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(uid)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let cid: i64 = row.try_get("course_id").map_err(ser)?;
            let stages = self.stored_stages(uid, cid).await?;
            out.push(map_course_progress_row(&row, stages)?);
        }
        Ok(out)
    }
}
