use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::skill::ParseEnumError;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,
    #[error("correct answer cannot be empty")]
    EmptyAnswer,
    #[error("question has no hints")]
    NoHints,
    #[error("question has no solution steps")]
    NoSolutionSteps,
}

//
// ─── LABELS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(ParseEnumError::new("difficulty", other)),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer format expected by a question.
///
/// Unrecognised labels coming back from the generator collapse into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    #[default]
    ShortAnswer,
    ProblemSolving,
    #[serde(other)]
    Other,
}

impl QuestionType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::ShortAnswer => "short_answer",
            QuestionType::ProblemSolving => "problem_solving",
            QuestionType::Other => "other",
        }
    }
}

impl FromStr for QuestionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multiple_choice" => Ok(QuestionType::MultipleChoice),
            "short_answer" => Ok(QuestionType::ShortAnswer),
            "problem_solving" => Ok(QuestionType::ProblemSolving),
            "other" => Ok(QuestionType::Other),
            other => Err(ParseEnumError::new("question type", other)),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A generated question. Immutable once part of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "question_text")]
    pub text: String,
    #[serde(rename = "question_type", default)]
    pub kind: QuestionType,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub correct_answer: String,
    #[serde(default)]
    pub solution_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focuses_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builds_on: Option<String>,
}

impl Question {
    /// Rebuild a question from an interaction row when no batch snapshot exists.
    ///
    /// The row never carries hints or solution steps, and the correct answer may be missing.
    #[must_use]
    pub fn from_interaction(
        text: impl Into<String>,
        kind: QuestionType,
        difficulty: Difficulty,
        correct_answer: Option<String>,
    ) -> Self {
        Self {
            text: text.into(),
            kind,
            difficulty,
            hints: Vec::new(),
            correct_answer: correct_answer.unwrap_or_default(),
            solution_steps: Vec::new(),
            focuses_on: None,
            builds_on: None,
        }
    }

    /// Checks the fields a freshly generated question must carry.
    ///
    /// # Errors
    ///
    /// Returns the first missing field as a `QuestionError`.
    pub fn validate(&self) -> Result<(), QuestionError> {
        if self.text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if self.correct_answer.trim().is_empty() {
            return Err(QuestionError::EmptyAnswer);
        }
        if self.hints.iter().all(|h| h.trim().is_empty()) {
            return Err(QuestionError::NoHints);
        }
        if self.solution_steps.iter().all(|s| s.trim().is_empty()) {
            return Err(QuestionError::NoSolutionSteps);
        }
        Ok(())
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// First stored hint that has not been shown yet.
    #[must_use]
    pub fn next_hint(&self, used: usize) -> Option<&str> {
        self.hints.get(used).map(String::as_str)
    }
}

/// Keeps only the questions that pass [`Question::validate`], preserving order.
#[must_use]
pub fn retain_valid(questions: Vec<Question>) -> Vec<Question> {
    questions.into_iter().filter(Question::is_valid).collect()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
