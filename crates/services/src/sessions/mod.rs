mod engine;
mod resume;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use engine::{Advance, MAX_RETRIES, Navigation, Phase, SessionEngine};
pub use resume::ResumePoint;
pub use workflow::{
    ActiveSession, CompletionOutcome, NextOutcome, ProgressionService, SessionConfig,
    SubmitOutcome, TUTOR_FALLBACK_REPLY,
};
