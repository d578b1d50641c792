use tutor_core::model::{StudentId, StudentProgress, TopicId};

use super::SqliteRepository;
use super::mapping::{conn, map_progress_row, to_json};
use crate::repository::{ProgressRepository, StorageError};

const PROGRESS_COLUMNS: &str = "student_id, topic_id, skill_level, confidence_score, \
                                questions_attempted, questions_correct, last_practiced_at, \
                                mastered_at, strengths, weaknesses";

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn upsert_progress(&self, progress: &StudentProgress) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO student_progress (
                student_id, topic_id, skill_level, confidence_score, questions_attempted,
                questions_correct, last_practiced_at, mastered_at, strengths, weaknesses
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(student_id, topic_id) DO UPDATE SET
                skill_level = excluded.skill_level,
                confidence_score = excluded.confidence_score,
                questions_attempted = excluded.questions_attempted,
                questions_correct = excluded.questions_correct,
                last_practiced_at = excluded.last_practiced_at,
                -- written once, never cleared
                mastered_at = COALESCE(student_progress.mastered_at, excluded.mastered_at),
                strengths = excluded.strengths,
                weaknesses = excluded.weaknesses
            ",
        )
        .bind(progress.student_id().to_string())
        .bind(progress.topic_id().to_string())
        .bind(progress.skill_level().as_str())
        .bind(progress.confidence_score())
        .bind(i64::from(progress.questions_attempted()))
        .bind(i64::from(progress.questions_correct()))
        .bind(progress.last_practiced_at())
        .bind(progress.mastered_at())
        .bind(to_json(&progress.strengths())?)
        .bind(to_json(&progress.weaknesses())?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_progress(
        &self,
        student_id: StudentId,
        topic_id: TopicId,
    ) -> Result<Option<StudentProgress>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM student_progress \
             WHERE student_id = ?1 AND topic_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(student_id.to_string())
            .bind(topic_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn list_progress(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<StudentProgress>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM student_progress \
             WHERE student_id = ?1 ORDER BY topic_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(student_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_progress_row).collect()
    }
}
