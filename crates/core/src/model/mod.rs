mod evaluation;
mod ids;
mod interaction;
mod profile;
mod progress;
mod question;
mod session;
mod skill;

pub use ids::{InteractionId, ParseIdError, SessionId, StudentId, TopicId};
pub use skill::{ParseEnumError, SkillLevel};

pub use evaluation::{ConceptualUnderstanding, Evaluation};
pub use interaction::{NewInteraction, QuestionInteraction};
pub use profile::{StudentProfile, Topic};
pub use progress::{ProgressError, StudentProgress};
pub use question::{Difficulty, Question, QuestionError, QuestionType, retain_valid};
pub use session::{
    SessionRecord, SessionStatus, SessionSummary, SessionSummaryError, accuracy_percent,
};
