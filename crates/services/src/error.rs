//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use tutor_core::model::{ProgressError, SessionId, SessionSummaryError, StudentId, TopicId};

/// Errors emitted by a `QuestionOracle`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OracleError {
    #[error("question oracle is not configured")]
    Disabled,
    #[error("question oracle did not answer in time")]
    Timeout,
    #[error("question oracle request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("question oracle returned an empty response")]
    EmptyResponse,
    #[error("could not parse oracle response: {0}")]
    Parse(String),
    #[error("oracle produced no valid questions")]
    NoValidQuestions,
    #[error("question generation failed after {attempts} attempts: {last}")]
    Generation {
        attempts: u32,
        last: Box<OracleError>,
    },
}

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("could not generate questions for session {session_id}")]
    GenerationFailure {
        session_id: SessionId,
        #[source]
        source: OracleError,
    },
    #[error("session {session_id} not found")]
    NotFound { session_id: SessionId },
    #[error("student {student_id} not found")]
    StudentNotFound { student_id: StudentId },
    #[error("topic {topic_id} not found")]
    TopicNotFound { topic_id: TopicId },
    #[error("no tutor is configured for session {session_id}")]
    TutorUnavailable { session_id: SessionId },
    #[error("session {session_id} rejected action at question {question_index}: {reason}")]
    InvalidTransition {
        session_id: SessionId,
        question_index: usize,
        reason: &'static str,
    },
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Summary(#[from] SessionSummaryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error("student {student_id} not found")]
    StudentNotFound { student_id: StudentId },
    #[error("no topic with code {code}")]
    TopicCodeNotFound { code: String },
    #[error("the topic catalogue is empty; run the seed binary first")]
    NoTopics,
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by the badge service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BadgeServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
