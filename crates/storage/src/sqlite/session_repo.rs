use tutor_core::model::{SessionId, SessionRecord, SessionStatus, StudentId, TopicId};

use super::SqliteRepository;
use super::mapping::{PerformanceDoc, conn, map_session_row, to_json};
use crate::repository::{SessionRepository, StorageError};

const SESSION_COLUMNS: &str = "id, student_id, topic_id, status, started_at, ended_at, \
                               questions_completed, performance_summary";

fn performance_json(session: &SessionRecord) -> Result<Option<String>, StorageError> {
    PerformanceDoc::from_session(session)
        .map(|doc| to_json(&doc))
        .transpose()
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn create_session(&self, session: &SessionRecord) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO learning_sessions (
                id, student_id, topic_id, status, started_at, ended_at,
                questions_completed, performance_summary
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(session.id().to_string())
        .bind(session.student_id().to_string())
        .bind(session.topic_id().to_string())
        .bind(session.status().as_str())
        .bind(session.started_at())
        .bind(session.ended_at())
        .bind(i64::from(session.questions_completed()))
        .bind(performance_json(session)?)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StorageError::Conflict)
            }
            Err(e) => Err(conn(e)),
        }
    }

    async fn load_session(&self, id: SessionId) -> Result<SessionRecord, StorageError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM learning_sessions WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_session_row(&row)
    }

    async fn save_session(&self, session: &SessionRecord) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE learning_sessions SET
                status = ?2,
                ended_at = ?3,
                questions_completed = ?4,
                performance_summary = ?5
            WHERE id = ?1
            ",
        )
        .bind(session.id().to_string())
        .bind(session.status().as_str())
        .bind(session.ended_at())
        .bind(i64::from(session.questions_completed()))
        .bind(performance_json(session)?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn find_in_progress(
        &self,
        student_id: StudentId,
        topic_id: TopicId,
    ) -> Result<Option<SessionRecord>, StorageError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM learning_sessions \
             WHERE student_id = ?1 AND topic_id = ?2 AND status = ?3 \
             ORDER BY julianday(started_at) DESC, rowid DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(student_id.to_string())
            .bind(topic_id.to_string())
            .bind(SessionStatus::InProgress.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_session_row).transpose()
    }

    async fn recent_completed(
        &self,
        student_id: StudentId,
        topic_id: TopicId,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, StorageError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM learning_sessions \
             WHERE student_id = ?1 AND topic_id = ?2 AND status = ?3 \
             ORDER BY julianday(ended_at) DESC, rowid DESC LIMIT ?4"
        );
        let rows = sqlx::query(&sql)
            .bind(student_id.to_string())
            .bind(topic_id.to_string())
            .bind(SessionStatus::Completed.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_session_row).collect()
    }

    async fn list_sessions(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<SessionRecord>, StorageError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM learning_sessions \
             WHERE student_id = ?1 \
             ORDER BY julianday(started_at) DESC, rowid DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(student_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_session_row).collect()
    }
}
