use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::{ParseEnumError, Question, SessionId, StudentId, TopicId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionSummaryError {
    #[error("ended_at is before started_at")]
    InvalidTimeRange,

    #[error("too many questions for a single session: {len}")]
    TooManyQuestions { len: usize },

    #[error("correct answers ({correct}) exceeds total questions ({total})")]
    CountMismatch { total: u32, correct: u32 },

    #[error("accuracy must be a percentage, got {0}")]
    InvalidAccuracy(u32),

    #[error("session is {0} and cannot change status")]
    AlreadyClosed(SessionStatus),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "abandoned" => Ok(SessionStatus::Abandoned),
            other => Err(ParseEnumError::new("session status", other)),
        }
    }
}

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

/// Aggregate result stored on a completed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    total: u32,
    correct: u32,
    accuracy_percent: u32,
    concepts_covered: Vec<String>,
}

impl SessionSummary {
    /// Rehydrate a summary from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionSummaryError` if the counts or accuracy are out of range.
    pub fn from_persisted(
        total: u32,
        correct: u32,
        accuracy_percent: u32,
        concepts_covered: Vec<String>,
    ) -> Result<Self, SessionSummaryError> {
        if correct > total {
            return Err(SessionSummaryError::CountMismatch { total, correct });
        }
        if accuracy_percent > 100 {
            return Err(SessionSummaryError::InvalidAccuracy(accuracy_percent));
        }
        Ok(Self {
            total,
            correct,
            accuracy_percent,
            concepts_covered,
        })
    }

    /// Summarise a finished batch.
    ///
    /// Concepts are the distinct `focuses_on` tags of the batch, in batch order.
    ///
    /// # Errors
    ///
    /// Returns `SessionSummaryError::TooManyQuestions` if the batch length cannot fit in `u32`,
    /// or `CountMismatch` if `correct` exceeds the batch length.
    pub fn for_batch(questions: &[Question], correct: u32) -> Result<Self, SessionSummaryError> {
        let total = u32::try_from(questions.len()).map_err(|_| {
            SessionSummaryError::TooManyQuestions {
                len: questions.len(),
            }
        })?;
        if correct > total {
            return Err(SessionSummaryError::CountMismatch { total, correct });
        }

        let mut concepts_covered: Vec<String> = Vec::new();
        for concept in questions.iter().filter_map(|q| q.focuses_on.as_deref()) {
            let concept = concept.trim();
            if !concept.is_empty() && !concepts_covered.iter().any(|c| c == concept) {
                concepts_covered.push(concept.to_string());
            }
        }

        Ok(Self {
            total,
            correct,
            accuracy_percent: accuracy_percent(correct, total),
            concepts_covered,
        })
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn correct(&self) -> u32 {
        self.correct
    }

    #[must_use]
    pub fn accuracy_percent(&self) -> u32 {
        self.accuracy_percent
    }

    #[must_use]
    pub fn concepts_covered(&self) -> &[String] {
        &self.concepts_covered
    }
}

/// Rounded percentage, 0 for an empty total.
#[must_use]
pub fn accuracy_percent(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let ratio = f64::from(correct.min(total)) / f64::from(total) * 100.0;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rounded = ratio.round() as u32;
    rounded
}

//
// ─── SESSION RECORD ────────────────────────────────────────────────────────────
//

/// Persisted learning session.
///
/// Holds the opaque batch snapshot so a reopened session can rebuild its
/// questions exactly, hints and answers included.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    id: SessionId,
    student_id: StudentId,
    topic_id: TopicId,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    questions_completed: u32,
    batch: Option<Vec<Question>>,
    summary: Option<SessionSummary>,
}

impl SessionRecord {
    /// New in-progress session with no batch yet.
    #[must_use]
    pub fn start(
        id: SessionId,
        student_id: StudentId,
        topic_id: TopicId,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            student_id,
            topic_id,
            status: SessionStatus::InProgress,
            started_at,
            ended_at: None,
            questions_completed: 0,
            batch: None,
            summary: None,
        }
    }

    /// Rehydrate a session from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionSummaryError::InvalidTimeRange` if `ended_at` is before `started_at`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: SessionId,
        student_id: StudentId,
        topic_id: TopicId,
        status: SessionStatus,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        questions_completed: u32,
        batch: Option<Vec<Question>>,
        summary: Option<SessionSummary>,
    ) -> Result<Self, SessionSummaryError> {
        if ended_at.is_some_and(|ended| ended < started_at) {
            return Err(SessionSummaryError::InvalidTimeRange);
        }
        Ok(Self {
            id,
            student_id,
            topic_id,
            status,
            started_at,
            ended_at,
            questions_completed,
            batch,
            summary,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    #[must_use]
    pub fn topic_id(&self) -> TopicId {
        self.topic_id
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn questions_completed(&self) -> u32 {
        self.questions_completed
    }

    /// Stored batch snapshot, if one was saved.
    #[must_use]
    pub fn batch(&self) -> Option<&[Question]> {
        self.batch.as_deref()
    }

    #[must_use]
    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status == SessionStatus::InProgress
    }

    /// Replace the batch snapshot with a freshly generated one.
    pub fn set_batch(&mut self, questions: Vec<Question>) {
        self.batch = Some(questions);
    }

    pub fn set_questions_completed(&mut self, count: u32) {
        self.questions_completed = count;
    }

    /// Close the session with its summary.
    ///
    /// # Errors
    ///
    /// Returns `SessionSummaryError::AlreadyClosed` if the session is not in progress,
    /// or `InvalidTimeRange` if `ended_at` precedes the start.
    pub fn complete(
        &mut self,
        summary: SessionSummary,
        ended_at: DateTime<Utc>,
    ) -> Result<(), SessionSummaryError> {
        self.close(SessionStatus::Completed, ended_at)?;
        self.questions_completed = summary.total();
        self.summary = Some(summary);
        Ok(())
    }

    /// Mark the session abandoned. Progress is left untouched.
    ///
    /// # Errors
    ///
    /// Same conditions as [`SessionRecord::complete`].
    pub fn abandon(&mut self, ended_at: DateTime<Utc>) -> Result<(), SessionSummaryError> {
        self.close(SessionStatus::Abandoned, ended_at)
    }

    fn close(
        &mut self,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
    ) -> Result<(), SessionSummaryError> {
        if !self.is_in_progress() {
            return Err(SessionSummaryError::AlreadyClosed(self.status));
        }
        if ended_at < self.started_at {
            return Err(SessionSummaryError::InvalidTimeRange);
        }
        self.status = status;
        self.ended_at = Some(ended_at);
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, QuestionType};
    use crate::time::fixed_now;
    use chrono::Duration;

    fn question(focus: Option<&str>) -> Question {
        Question {
            text: "Q".into(),
            kind: QuestionType::ShortAnswer,
            difficulty: Difficulty::Medium,
            hints: vec!["h".into()],
            correct_answer: "1".into(),
            solution_steps: vec!["s".into()],
            focuses_on: focus.map(str::to_string),
            builds_on: None,
        }
    }

    fn record() -> SessionRecord {
        SessionRecord::start(
            SessionId::generate(),
            StudentId::generate(),
            TopicId::generate(),
            fixed_now(),
        )
    }

    #[test]
    fn summary_collects_distinct_concepts() {
        let batch = vec![
            question(Some("place value")),
            question(None),
            question(Some("rounding")),
            question(Some("place value")),
            question(Some("  ")),
        ];
        let summary = SessionSummary::for_batch(&batch, 4).unwrap();
        assert_eq!(summary.total(), 5);
        assert_eq!(summary.correct(), 4);
        assert_eq!(summary.accuracy_percent(), 80);
        assert_eq!(summary.concepts_covered(), ["place value", "rounding"]);
    }

    #[test]
    fn summary_rejects_more_correct_than_total() {
        let err = SessionSummary::for_batch(&[question(None)], 2).unwrap_err();
        assert_eq!(err, SessionSummaryError::CountMismatch { total: 1, correct: 2 });
        assert!(SessionSummary::from_persisted(3, 2, 101, Vec::new()).is_err());
    }

    #[test]
    fn accuracy_rounds_to_nearest_percent() {
        assert_eq!(accuracy_percent(2, 3), 67);
        assert_eq!(accuracy_percent(1, 3), 33);
        assert_eq!(accuracy_percent(0, 0), 0);
    }

    #[test]
    fn complete_sets_status_and_end_time() {
        let mut session = record();
        let summary = SessionSummary::for_batch(&[question(None), question(None)], 1).unwrap();
        let ended = fixed_now() + Duration::minutes(12);
        session.complete(summary, ended).unwrap();

        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.ended_at(), Some(ended));
        assert_eq!(session.questions_completed(), 2);
        assert_eq!(session.summary().map(SessionSummary::accuracy_percent), Some(50));
    }

    #[test]
    fn closed_sessions_cannot_change_status() {
        let mut session = record();
        session.abandon(fixed_now()).unwrap();
        let err = session.abandon(fixed_now()).unwrap_err();
        assert_eq!(err, SessionSummaryError::AlreadyClosed(SessionStatus::Abandoned));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut session = record();
        let err = session.abandon(fixed_now() - Duration::seconds(1)).unwrap_err();
        assert_eq!(err, SessionSummaryError::InvalidTimeRange);
        assert!(session.is_in_progress());
    }

    #[test]
    fn status_labels_round_trip() {
        for status in [
            SessionStatus::InProgress,
            SessionStatus::Completed,
            SessionStatus::Abandoned,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
    }
}
