#![forbid(unsafe_code)]

pub mod app_services;
pub mod badge_service;
pub mod error;
pub mod oracle;
pub mod sessions;

pub use tutor_core::Clock;

pub use app_services::AppServices;
pub use badge_service::BadgeService;
pub use error::{AppServicesError, BadgeServiceError, OracleError, SessionError};
pub use oracle::{
    ChatRole, ChatTurn, HttpOracle, LearningHistory, OracleConfig, QuestionOracle,
    StudentContext, TopicContext, TutorChat,
};
pub use sessions::{
    ActiveSession, CompletionOutcome, NextOutcome, ProgressionService, SessionConfig,
    SubmitOutcome, TUTOR_FALLBACK_REPLY,
};
