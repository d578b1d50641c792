use tutor_core::model::{StudentId, StudentProfile, Topic, TopicId};

use super::SqliteRepository;
use super::mapping::{conn, map_student_row, map_topic_row, to_json};
use crate::repository::{CatalogRepository, StorageError};

#[async_trait::async_trait]
impl CatalogRepository for SqliteRepository {
    async fn upsert_student(&self, student: &StudentProfile) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO students (id, first_name, grade_level, curriculum_level)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                first_name = excluded.first_name,
                grade_level = excluded.grade_level,
                curriculum_level = excluded.curriculum_level
            ",
        )
        .bind(student.id.to_string())
        .bind(&student.first_name)
        .bind(i64::from(student.grade_level))
        .bind(i64::from(student.curriculum_level))
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn get_student(&self, id: StudentId) -> Result<StudentProfile, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, first_name, grade_level, curriculum_level
            FROM students
            WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_student_row(&row)
    }

    async fn upsert_topic(&self, topic: &Topic) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO curriculum_topics (
                id, code, strand, sub_strand, level, title, description, elaborations
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                code = excluded.code,
                strand = excluded.strand,
                sub_strand = excluded.sub_strand,
                level = excluded.level,
                title = excluded.title,
                description = excluded.description,
                elaborations = excluded.elaborations
            ",
        )
        .bind(topic.id.to_string())
        .bind(&topic.code)
        .bind(&topic.strand)
        .bind(topic.sub_strand.as_deref())
        .bind(i64::from(topic.level))
        .bind(&topic.title)
        .bind(&topic.description)
        .bind(to_json(&topic.elaborations)?)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            // duplicate `code` on a different id
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StorageError::Conflict)
            }
            Err(e) => Err(conn(e)),
        }
    }

    async fn get_topic(&self, id: TopicId) -> Result<Topic, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, code, strand, sub_strand, level, title, description, elaborations
            FROM curriculum_topics
            WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_topic_row(&row)
    }

    async fn list_topics(&self) -> Result<Vec<Topic>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, code, strand, sub_strand, level, title, description, elaborations
            FROM curriculum_topics
            ORDER BY level ASC, code ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_topic_row).collect()
    }
}
