use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const V1_STATEMENTS: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            display_name TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            instructor TEXT NOT NULL,
            lesson_count INTEGER NOT NULL CHECK (lesson_count >= 0),
            has_post_work INTEGER NOT NULL,
            has_final_project INTEGER NOT NULL,
            step_weights TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS enrollments (
            user_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            enrolled_at TEXT NOT NULL,
            progress INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
            completed_at TEXT,
            PRIMARY KEY (user_id, course_id),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS lesson_progress (
            user_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            lesson_id INTEGER NOT NULL,
            completed INTEGER NOT NULL CHECK (completed IN (0, 1)),
            progress INTEGER NOT NULL CHECK (progress BETWEEN 0 AND 100),
            time_spent INTEGER NOT NULL CHECK (time_spent >= 0),
            started_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT,
            PRIMARY KEY (user_id, course_id, lesson_id),
            FOREIGN KEY (user_id, course_id)
                REFERENCES enrollments(user_id, course_id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS course_progress (
            user_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            current_step TEXT NOT NULL,
            time_spent INTEGER NOT NULL CHECK (time_spent >= 0),
            overall_progress INTEGER NOT NULL CHECK (overall_progress BETWEEN 0 AND 100),
            lessons_completed INTEGER NOT NULL CHECK (lessons_completed >= 0),
            total_lessons INTEGER NOT NULL CHECK (total_lessons >= 0),
            started_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT,
            PRIMARY KEY (user_id, course_id),
            FOREIGN KEY (user_id, course_id)
                REFERENCES enrollments(user_id, course_id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS course_progress_stages (
            user_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            stage TEXT NOT NULL CHECK (stage IN
                ('intro', 'pretest', 'lessons', 'posttest', 'postwork', 'finalproject')),
            position INTEGER NOT NULL CHECK (position >= 0),
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (user_id, course_id, stage),
            FOREIGN KEY (user_id, course_id)
                REFERENCES enrollments(user_id, course_id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS course_stage_locks (
            course_id INTEGER NOT NULL,
            stage TEXT NOT NULL CHECK (stage IN
                ('intro', 'pretest', 'lessons', 'posttest', 'postwork', 'finalproject')),
            is_locked INTEGER NOT NULL CHECK (is_locked IN (0, 1)),
            lock_message TEXT NOT NULL DEFAULT '',
            locked_by INTEGER,
            locked_at TEXT,
            PRIMARY KEY (course_id, stage),
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS certificates (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            cert_number TEXT NOT NULL UNIQUE,
            user_name TEXT NOT NULL,
            course_name TEXT NOT NULL,
            instructor TEXT NOT NULL,
            completion_date TEXT NOT NULL,
            issued_at TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'approved', 'rejected')),
            approved_by INTEGER,
            approved_at TEXT,
            rejection_reason TEXT,
            UNIQUE (user_id, course_id),
            FOREIGN KEY (user_id, course_id)
                REFERENCES enrollments(user_id, course_id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_course_progress_user_updated
            ON course_progress (user_id, updated_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_certificates_status_issued
            ON certificates (status, issued_at);
    ",
];

/// Runs versioned migrations for the current schema.
///
/// Version 1 creates the collaborator tables (users, courses, enrollments),
/// progress, stage locks and certificates.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in V1_STATEMENTS {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
