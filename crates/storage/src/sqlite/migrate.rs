use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use super::SqliteInitError;

const SCHEMA_V1: [&str; 9] = [
    r"
        CREATE TABLE IF NOT EXISTS students (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            grade_level INTEGER NOT NULL CHECK (grade_level >= 0),
            curriculum_level INTEGER NOT NULL CHECK (curriculum_level >= 0)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS curriculum_topics (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            strand TEXT NOT NULL,
            sub_strand TEXT,
            level INTEGER NOT NULL CHECK (level >= 0),
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            elaborations TEXT NOT NULL DEFAULT '[]'
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS student_progress (
            student_id TEXT NOT NULL,
            topic_id TEXT NOT NULL,
            skill_level TEXT NOT NULL,
            confidence_score REAL NOT NULL CHECK (confidence_score BETWEEN 0 AND 1),
            questions_attempted INTEGER NOT NULL CHECK (questions_attempted >= 0),
            questions_correct INTEGER NOT NULL CHECK (questions_correct >= 0),
            last_practiced_at TEXT,
            mastered_at TEXT,
            strengths TEXT NOT NULL DEFAULT '[]',
            weaknesses TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (student_id, topic_id),
            CHECK (questions_correct <= questions_attempted),
            FOREIGN KEY (student_id) REFERENCES students(id) ON DELETE CASCADE,
            FOREIGN KEY (topic_id) REFERENCES curriculum_topics(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS learning_sessions (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            topic_id TEXT NOT NULL,
            session_type TEXT NOT NULL DEFAULT 'practice',
            status TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            questions_completed INTEGER NOT NULL DEFAULT 0 CHECK (questions_completed >= 0),
            performance_summary TEXT,
            FOREIGN KEY (student_id) REFERENCES students(id) ON DELETE CASCADE,
            FOREIGN KEY (topic_id) REFERENCES curriculum_topics(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS question_interactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            topic_id TEXT NOT NULL,
            question_text TEXT NOT NULL,
            question_type TEXT NOT NULL,
            difficulty_level TEXT NOT NULL,
            correct_answer TEXT,
            student_answer TEXT,
            is_correct INTEGER CHECK (is_correct IN (0, 1)),
            llm_evaluation TEXT,
            llm_feedback TEXT,
            hints_used INTEGER NOT NULL DEFAULT 0 CHECK (hints_used >= 0),
            created_at TEXT NOT NULL,
            FOREIGN KEY (session_id) REFERENCES learning_sessions(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_sessions_student_topic_status
            ON learning_sessions (student_id, topic_id, status);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_interactions_session_text
            ON question_interactions (session_id, question_text);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_interactions_student
            ON question_interactions (student_id, id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_progress_student_level
            ON student_progress (student_id, skill_level);
    ",
];

/// Applies schema migrations that have not run yet, each in its own transaction.
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

    // Version 1: tutoring schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
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
        info!(version = 1, "applied schema migration");
    }

    Ok(())
}
