use lms_core::model::{CourseId, Stage, StageLock};

use super::SqliteRepository;
use super::mapping::{db_err, id_to_i64, map_stage_lock_row};
use crate::repository::{StageLockRepository, StorageError};

#[async_trait::async_trait]
impl StageLockRepository for SqliteRepository {
    async fn get_stage_lock(
        &self,
        course_id: CourseId,
        stage: Stage,
    ) -> Result<Option<StageLock>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT course_id, stage, is_locked, lock_message, locked_by, locked_at
            FROM course_stage_locks WHERE course_id = ?1 AND stage = ?2
            ",
        )
        .bind(id_to_i64("course_id", course_id.value())?)
        .bind(stage.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(map_stage_lock_row).transpose()
    }

    async fn list_stage_locks(&self, course_id: CourseId) -> Result<Vec<StageLock>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT course_id, stage, is_locked, lock_message, locked_by, locked_at
            FROM course_stage_locks WHERE course_id = ?1
            ",
        )
        .bind(id_to_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut locks = rows
            .iter()
            .map(map_stage_lock_row)
            .collect::<Result<Vec<_>, _>>()?;
        locks.sort_by_key(|lock| lock.stage);
        Ok(locks)
    }

    async fn upsert_stage_lock(&self, lock: &StageLock) -> Result<bool, StorageError> {
        // The WHERE turns a repeat of the stored state into a no-op, so the
        // audit columns keep the first write.
        let res = sqlx::query(
            r"
            INSERT INTO course_stage_locks (course_id, stage, is_locked, lock_message, locked_by, locked_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(course_id, stage) DO UPDATE SET
                is_locked = excluded.is_locked,
                lock_message = excluded.lock_message,
                locked_by = excluded.locked_by,
                locked_at = excluded.locked_at
            WHERE course_stage_locks.is_locked <> excluded.is_locked
               OR course_stage_locks.lock_message <> excluded.lock_message
            ",
        )
        .bind(id_to_i64("course_id", lock.course_id.value())?)
        .bind(lock.stage.as_str())
        .bind(i64::from(lock.is_locked))
        .bind(lock.lock_message.as_str())
        .bind(
            lock.locked_by
                .map(|id| id_to_i64("locked_by", id.value()))
                .transpose()?,
        )
        .bind(lock.locked_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(res.rows_affected() > 0)
    }
}
