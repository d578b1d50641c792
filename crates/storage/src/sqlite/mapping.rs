use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tutor_core::model::{
    Evaluation, InteractionId, Question, QuestionInteraction, SessionRecord, SessionSummary,
    StudentProfile, StudentProgress, Topic,
};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn u8_from_i64(field: &'static str, v: i64) -> Result<u8, StorageError> {
    u8::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

/// Parse a TEXT column into any `FromStr` domain type (ids, enum labels).
fn parse_col<T>(row: &SqliteRow, column: &'static str) -> Result<T, StorageError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    let raw: String = row.try_get(column).map_err(ser)?;
    raw.parse::<T>().map_err(ser)
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

fn json_col<T: for<'de> Deserialize<'de>>(
    row: &SqliteRow,
    column: &'static str,
) -> Result<T, StorageError> {
    let raw: String = row.try_get(column).map_err(ser)?;
    serde_json::from_str(&raw).map_err(ser)
}

//
// ─── PERFORMANCE SUMMARY DOCUMENT ──────────────────────────────────────────────
//

/// JSON stored in `learning_sessions.performance_summary`.
///
/// Carries the batch snapshot while the session runs and the summary
/// counters once it completes.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct PerformanceDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    questions: Option<Vec<Question>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_questions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correct_answers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    accuracy: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    concepts_covered: Vec<String>,
}

impl PerformanceDoc {
    pub(crate) fn from_session(session: &SessionRecord) -> Option<Self> {
        if session.batch().is_none() && session.summary().is_none() {
            return None;
        }
        let summary = session.summary();
        Some(Self {
            questions: session.batch().map(<[Question]>::to_vec),
            total_questions: summary.map(SessionSummary::total),
            correct_answers: summary.map(SessionSummary::correct),
            accuracy: summary.map(SessionSummary::accuracy_percent),
            concepts_covered: summary
                .map(|s| s.concepts_covered().to_vec())
                .unwrap_or_default(),
        })
    }

    fn into_parts(self) -> Result<(Option<Vec<Question>>, Option<SessionSummary>), StorageError> {
        let summary = match (self.total_questions, self.correct_answers, self.accuracy) {
            (Some(total), Some(correct), Some(accuracy)) => Some(
                SessionSummary::from_persisted(total, correct, accuracy, self.concepts_covered)
                    .map_err(ser)?,
            ),
            _ => None,
        };
        Ok((self.questions, summary))
    }
}

//
// ─── ROW MAPPERS ───────────────────────────────────────────────────────────────
//

pub(crate) fn map_student_row(row: &SqliteRow) -> Result<StudentProfile, StorageError> {
    Ok(StudentProfile {
        id: parse_col(row, "id")?,
        first_name: row.try_get("first_name").map_err(ser)?,
        grade_level: u8_from_i64("grade_level", row.try_get("grade_level").map_err(ser)?)?,
        curriculum_level: u8_from_i64(
            "curriculum_level",
            row.try_get("curriculum_level").map_err(ser)?,
        )?,
    })
}

pub(crate) fn map_topic_row(row: &SqliteRow) -> Result<Topic, StorageError> {
    Ok(Topic {
        id: parse_col(row, "id")?,
        code: row.try_get("code").map_err(ser)?,
        title: row.try_get("title").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        strand: row.try_get("strand").map_err(ser)?,
        sub_strand: row.try_get("sub_strand").map_err(ser)?,
        level: u8_from_i64("level", row.try_get("level").map_err(ser)?)?,
        elaborations: json_col(row, "elaborations")?,
    })
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<StudentProgress, StorageError> {
    StudentProgress::from_persisted(
        parse_col(row, "student_id")?,
        parse_col(row, "topic_id")?,
        parse_col(row, "skill_level")?,
        row.try_get("confidence_score").map_err(ser)?,
        u32_from_i64(
            "questions_attempted",
            row.try_get("questions_attempted").map_err(ser)?,
        )?,
        u32_from_i64(
            "questions_correct",
            row.try_get("questions_correct").map_err(ser)?,
        )?,
        row.try_get("last_practiced_at").map_err(ser)?,
        row.try_get("mastered_at").map_err(ser)?,
        json_col(row, "strengths")?,
        json_col(row, "weaknesses")?,
    )
    .map_err(ser)
}

pub(crate) fn map_session_row(row: &SqliteRow) -> Result<SessionRecord, StorageError> {
    let doc: Option<String> = row.try_get("performance_summary").map_err(ser)?;
    let (batch, summary) = match doc {
        Some(raw) => serde_json::from_str::<PerformanceDoc>(&raw)
            .map_err(ser)?
            .into_parts()?,
        None => (None, None),
    };
    let started_at: DateTime<Utc> = row.try_get("started_at").map_err(ser)?;

    SessionRecord::from_persisted(
        parse_col(row, "id")?,
        parse_col(row, "student_id")?,
        parse_col(row, "topic_id")?,
        parse_col(row, "status")?,
        started_at,
        row.try_get("ended_at").map_err(ser)?,
        u32_from_i64(
            "questions_completed",
            row.try_get("questions_completed").map_err(ser)?,
        )?,
        batch,
        summary,
    )
    .map_err(ser)
}

pub(crate) fn map_interaction_row(row: &SqliteRow) -> Result<QuestionInteraction, StorageError> {
    let evaluation: Option<String> = row.try_get("llm_evaluation").map_err(ser)?;
    let evaluation = evaluation
        .map(|raw| serde_json::from_str::<Evaluation>(&raw))
        .transpose()
        .map_err(ser)?;
    let is_correct: Option<i64> = row.try_get("is_correct").map_err(ser)?;

    Ok(QuestionInteraction {
        id: InteractionId::new(row.try_get("id").map_err(ser)?),
        session_id: parse_col(row, "session_id")?,
        student_id: parse_col(row, "student_id")?,
        topic_id: parse_col(row, "topic_id")?,
        question_text: row.try_get("question_text").map_err(ser)?,
        question_type: parse_col(row, "question_type")?,
        difficulty: parse_col(row, "difficulty_level")?,
        correct_answer: row.try_get("correct_answer").map_err(ser)?,
        student_answer: row.try_get("student_answer").map_err(ser)?,
        is_correct: is_correct.map(|v| v != 0),
        evaluation,
        hints_used: u32_from_i64("hints_used", row.try_get("hints_used").map_err(ser)?)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::model::{Difficulty, QuestionType, SessionId, StudentId, TopicId};
    use tutor_core::time::fixed_now;

    fn question() -> Question {
        Question {
            text: "Round 347 to the nearest ten".into(),
            kind: QuestionType::ShortAnswer,
            difficulty: Difficulty::Easy,
            hints: vec!["Look at the ones digit".into()],
            correct_answer: "350".into(),
            solution_steps: vec!["7 rounds up".into()],
            focuses_on: Some("rounding".into()),
            builds_on: None,
        }
    }

    #[test]
    fn doc_is_absent_for_fresh_sessions() {
        let session = SessionRecord::start(
            SessionId::generate(),
            StudentId::generate(),
            TopicId::generate(),
            fixed_now(),
        );
        assert!(PerformanceDoc::from_session(&session).is_none());
    }

    #[test]
    fn doc_carries_batch_and_summary() {
        let mut session = SessionRecord::start(
            SessionId::generate(),
            StudentId::generate(),
            TopicId::generate(),
            fixed_now(),
        );
        session.set_batch(vec![question()]);
        let summary = SessionSummary::for_batch(&[question()], 1).unwrap();
        session.complete(summary.clone(), fixed_now()).unwrap();

        let doc = PerformanceDoc::from_session(&session).unwrap();
        let raw = to_json(&doc).unwrap();
        let (batch, restored) = serde_json::from_str::<PerformanceDoc>(&raw)
            .unwrap()
            .into_parts()
            .unwrap();
        assert_eq!(batch.map(|b| b.len()), Some(1));
        assert_eq!(restored, Some(summary));
    }
}
