//! The question generator / answer evaluator collaborator, and the tutor
//! that chats with the student about the question in front of them.
//!
//! Services only ever talk to them through [`QuestionOracle`] and
//! [`TutorChat`]; prompt wording and wire formats stay inside the implementations.

mod http;
mod json;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tutor_core::difficulty::{AdaptiveInstruction, Recommendation};
use tutor_core::model::{
    Evaluation, Question, SessionRecord, SkillLevel, StudentId, StudentProfile, StudentProgress,
    Topic, TopicId,
};

use crate::error::OracleError;

pub use http::{HttpOracle, OracleConfig};
pub use json::extract_json_object;

//
// ─── CONTEXT ───────────────────────────────────────────────────────────────────
//

/// What the oracle may know about the student when pitching or marking a question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentContext {
    pub student_id: StudentId,
    pub first_name: String,
    pub grade_level: u8,
    pub curriculum_level: u8,
    pub skill_level: SkillLevel,
    /// Rounded percentage; 0 before any history exists.
    pub recent_accuracy: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adaptive_instruction: Option<AdaptiveInstruction>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

impl StudentContext {
    /// Context for the next batch, carrying the difficulty recommendation.
    #[must_use]
    pub fn build(
        student: &StudentProfile,
        topic: &Topic,
        progress: Option<&StudentProgress>,
        recommendation: Recommendation,
        recent_accuracy: Option<f64>,
    ) -> Self {
        let curriculum_level = if student.curriculum_level == 0 {
            topic.level
        } else {
            student.curriculum_level
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let recent_accuracy = recent_accuracy
            .filter(|a| a.is_finite())
            .map_or(0, |a| a.clamp(0.0, 100.0).round() as u32);

        Self {
            student_id: student.id,
            first_name: student.first_name.clone(),
            grade_level: student.grade_level,
            curriculum_level,
            skill_level: recommendation.recommended_skill_level,
            recent_accuracy,
            adaptive_instruction: recommendation.instruction,
            strengths: progress.map(|p| p.strengths().to_vec()).unwrap_or_default(),
            weaknesses: progress.map(|p| p.weaknesses().to_vec()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicContext {
    pub topic_id: TopicId,
    pub code: String,
    pub title: String,
    pub description: String,
    pub strand: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_strand: Option<String>,
    pub level: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub elaborations: Vec<String>,
}

impl From<&Topic> for TopicContext {
    fn from(topic: &Topic) -> Self {
        Self {
            topic_id: topic.id,
            code: topic.code.clone(),
            title: topic.title.clone(),
            description: topic.description.clone(),
            strand: topic.strand.clone(),
            sub_strand: topic.sub_strand.clone(),
            level: topic.level,
            elaborations: topic.elaborations.clone(),
        }
    }
}

/// Concepts already practised on a topic, so new batches avoid repeating them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LearningHistory {
    pub concepts_covered: Vec<String>,
    pub total_sessions: u32,
}

impl LearningHistory {
    /// Distinct concepts across completed sessions, newest session first.
    #[must_use]
    pub fn from_sessions(completed: &[SessionRecord]) -> Self {
        let mut concepts_covered: Vec<String> = Vec::new();
        let mut total_sessions = 0_u32;
        for summary in completed.iter().filter_map(SessionRecord::summary) {
            total_sessions += 1;
            for concept in summary.concepts_covered() {
                if !concepts_covered.contains(concept) {
                    concepts_covered.push(concept.clone());
                }
            }
        }
        Self {
            concepts_covered,
            total_sessions,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_sessions == 0
    }
}

//
// ─── ORACLE ────────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait QuestionOracle: Send + Sync {
    /// Produce up to `count` questions for the student and topic.
    ///
    /// Implementations do their own retrying and only return questions that
    /// pass [`Question::validate`].
    ///
    /// # Errors
    ///
    /// Returns `OracleError` once every attempt has failed.
    async fn generate_questions(
        &self,
        student: &StudentContext,
        topic: &TopicContext,
        count: usize,
        history: Option<&LearningHistory>,
    ) -> Result<Vec<Question>, OracleError>;

    /// Mark a student's answer.
    ///
    /// # Errors
    ///
    /// Returns `OracleError` when no verdict could be obtained. Callers turn
    /// that into [`Evaluation::fallback`].
    async fn evaluate_answer(
        &self,
        question: &Question,
        student_answer: &str,
        student: &StudentContext,
    ) -> Result<Evaluation, OracleError>;
}

//
// ─── TUTOR CHAT ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    Student,
    Tutor,
}

/// One message of a help conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    #[must_use]
    pub fn student(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Student,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn tutor(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tutor,
            content: content.into(),
        }
    }
}

/// Conversational help on the current question.
///
/// Replies guide the student toward the answer without stating it.
#[async_trait]
pub trait TutorChat: Send + Sync {
    /// Reply to `message`, given the conversation so far (oldest first).
    ///
    /// # Errors
    ///
    /// Returns `OracleError` when no reply could be obtained.
    async fn reply(
        &self,
        student: &StudentContext,
        topic: &TopicContext,
        question: &Question,
        history: &[ChatTurn],
        message: &str,
    ) -> Result<String, OracleError>;
}
