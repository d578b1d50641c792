use sqlx::Row;
use tracing::debug;
use tutor_core::model::{NewInteraction, QuestionInteraction, SessionId, StudentId};

use super::SqliteRepository;
use super::mapping::{conn, map_interaction_row, ser, to_json};
use crate::repository::{InteractionRepository, StorageError};

const INTERACTION_COLUMNS: &str = "id, session_id, student_id, topic_id, question_text, \
                                   question_type, difficulty_level, correct_answer, \
                                   student_answer, is_correct, llm_evaluation, llm_feedback, \
                                   hints_used, created_at";

#[async_trait::async_trait]
impl InteractionRepository for SqliteRepository {
    async fn save_interaction(
        &self,
        interaction: &NewInteraction,
    ) -> Result<QuestionInteraction, StorageError> {
        let evaluation = interaction.evaluation.as_ref().map(to_json).transpose()?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let existing: Option<i64> = sqlx::query(
            r"
            SELECT id FROM question_interactions
            WHERE session_id = ?1 AND question_text = ?2
            ORDER BY id DESC
            LIMIT 1
            ",
        )
        .bind(interaction.session_id.to_string())
        .bind(&interaction.question_text)
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?
        .map(|row| row.try_get::<i64, _>("id"))
        .transpose()
        .map_err(ser)?;

        let id = match existing {
            Some(id) if interaction.student_answer.is_none() => id,
            Some(id) => {
                sqlx::query(
                    r"
                    UPDATE question_interactions SET
                        student_answer = ?2,
                        is_correct = ?3,
                        llm_evaluation = ?4,
                        llm_feedback = ?5,
                        hints_used = ?6,
                        correct_answer = COALESCE(?7, correct_answer)
                    WHERE id = ?1
                    ",
                )
                .bind(id)
                .bind(interaction.student_answer.as_deref())
                .bind(interaction.is_correct)
                .bind(evaluation.as_deref())
                .bind(interaction.feedback())
                .bind(i64::from(interaction.hints_used))
                .bind(interaction.correct_answer.as_deref())
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
                debug!(interaction_id = id, "updated interaction for resubmitted answer");
                id
            }
            None => sqlx::query(
                r"
                INSERT INTO question_interactions (
                    session_id, student_id, topic_id, question_text, question_type,
                    difficulty_level, correct_answer, student_answer, is_correct,
                    llm_evaluation, llm_feedback, hints_used, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                ",
            )
            .bind(interaction.session_id.to_string())
            .bind(interaction.student_id.to_string())
            .bind(interaction.topic_id.to_string())
            .bind(&interaction.question_text)
            .bind(interaction.question_type.as_str())
            .bind(interaction.difficulty.as_str())
            .bind(interaction.correct_answer.as_deref())
            .bind(interaction.student_answer.as_deref())
            .bind(interaction.is_correct)
            .bind(evaluation.as_deref())
            .bind(interaction.feedback())
            .bind(i64::from(interaction.hints_used))
            .bind(interaction.created_at)
            .execute(&mut *tx)
            .await
            .map_err(conn)?
            .last_insert_rowid(),
        };

        let sql = format!("SELECT {INTERACTION_COLUMNS} FROM question_interactions WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(conn)?;
        let stored = map_interaction_row(&row)?;

        tx.commit().await.map_err(conn)?;
        Ok(stored)
    }

    async fn load_interactions(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<QuestionInteraction>, StorageError> {
        let sql = format!(
            "SELECT {INTERACTION_COLUMNS} FROM question_interactions \
             WHERE session_id = ?1 ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(session_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_interaction_row).collect()
    }

    async fn list_student_interactions(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<QuestionInteraction>, StorageError> {
        let sql = format!(
            "SELECT {INTERACTION_COLUMNS} FROM question_interactions \
             WHERE student_id = ?1 ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(student_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_interaction_row).collect()
    }
}
