use chrono::{DateTime, Utc};

use crate::model::{
    Difficulty, Evaluation, InteractionId, Question, QuestionType, SessionId, StudentId, TopicId,
};

/// One question shown to a student within a session, with its latest answer.
///
/// `is_correct` stays `None` until the answer is scored; resume reads that as
/// "not answered yet".
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionInteraction {
    pub id: InteractionId,
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub topic_id: TopicId,
    pub question_text: String,
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    pub correct_answer: Option<String>,
    pub student_answer: Option<String>,
    pub is_correct: Option<bool>,
    pub evaluation: Option<Evaluation>,
    pub hints_used: u32,
    pub created_at: DateTime<Utc>,
}

impl QuestionInteraction {
    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.is_correct.is_some()
    }

    /// Question rebuilt from this row when the batch snapshot is missing.
    #[must_use]
    pub fn to_question(&self) -> Question {
        Question::from_interaction(
            self.question_text.clone(),
            self.question_type,
            self.difficulty,
            self.correct_answer.clone(),
        )
    }
}

/// Write model for an interaction.
///
/// Persisting it for a question text that already has a row in the same
/// session updates that row instead of inserting.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInteraction {
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub topic_id: TopicId,
    pub question_text: String,
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    pub correct_answer: Option<String>,
    pub student_answer: Option<String>,
    pub is_correct: Option<bool>,
    pub evaluation: Option<Evaluation>,
    pub hints_used: u32,
    pub created_at: DateTime<Utc>,
}

impl NewInteraction {
    /// Scored answer to a batch question.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn answered(
        session_id: SessionId,
        student_id: StudentId,
        topic_id: TopicId,
        question: &Question,
        student_answer: impl Into<String>,
        evaluation: Evaluation,
        hints_used: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        let correct_answer = Some(question.correct_answer.clone()).filter(|a| !a.is_empty());
        Self {
            session_id,
            student_id,
            topic_id,
            question_text: question.text.clone(),
            question_type: question.kind,
            difficulty: question.difficulty,
            correct_answer,
            student_answer: Some(student_answer.into()),
            is_correct: Some(evaluation.is_correct),
            evaluation: Some(evaluation),
            hints_used,
            created_at,
        }
    }

    /// Placeholder row for a batch question that has not been answered yet.
    #[must_use]
    pub fn pending(
        session_id: SessionId,
        student_id: StudentId,
        topic_id: TopicId,
        question: &Question,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            student_id,
            topic_id,
            question_text: question.text.clone(),
            question_type: question.kind,
            difficulty: question.difficulty,
            correct_answer: Some(question.correct_answer.clone()).filter(|a| !a.is_empty()),
            student_answer: None,
            is_correct: None,
            evaluation: None,
            hints_used: 0,
            created_at,
        }
    }

    /// Feedback text carried by the evaluation, if any.
    #[must_use]
    pub fn feedback(&self) -> Option<&str> {
        self.evaluation.as_ref().map(|e| e.feedback.as_str())
    }

    /// Materialise as a stored row.
    #[must_use]
    pub fn into_interaction(self, id: InteractionId) -> QuestionInteraction {
        QuestionInteraction {
            id,
            session_id: self.session_id,
            student_id: self.student_id,
            topic_id: self.topic_id,
            question_text: self.question_text,
            question_type: self.question_type,
            difficulty: self.difficulty,
            correct_answer: self.correct_answer,
            student_answer: self.student_answer,
            is_correct: self.is_correct,
            evaluation: self.evaluation,
            hints_used: self.hints_used,
            created_at: self.created_at,
        }
    }
}
