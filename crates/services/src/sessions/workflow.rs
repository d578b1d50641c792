use std::sync::Arc;

use tracing::{debug, info, warn};

use storage::repository::{
    CatalogRepository, InteractionRepository, ProgressRepository, SessionRepository, Storage,
    StorageError,
};
use tutor_core::answer::{QuickCheck, quick_check};
use tutor_core::difficulty::{self, Recommendation, RECENT_SESSION_WINDOW};
use tutor_core::model::{
    Evaluation, NewInteraction, SessionId, SessionRecord, SessionStatus, SessionSummary,
    StudentId, StudentProfile, StudentProgress, Topic, TopicId, retain_valid,
};
use tutor_core::scoring::{self, BatchScore, PerformanceBand};

use super::engine::{Advance, MAX_RETRIES, SessionEngine};
use super::resume::ResumePoint;
use crate::Clock;
use crate::error::{OracleError, SessionError};
use crate::oracle::{
    ChatTurn, LearningHistory, QuestionOracle, StudentContext, TopicContext, TutorChat,
};

/// Shown in place of a tutor reply that could not be fetched.
pub const TUTOR_FALLBACK_REPLY: &str = "I'm sorry, I had trouble responding. Please try again!";

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Questions requested per batch.
    pub batch_size: usize,
    pub max_retries: u32,
    /// Completed sessions feeding the recent-accuracy mean.
    pub recent_session_window: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_retries: MAX_RETRIES,
            recent_session_window: u32::try_from(RECENT_SESSION_WINDOW).unwrap_or(3),
        }
    }
}

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

/// A session being worked through, owned by the caller between calls.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    record: SessionRecord,
    engine: SessionEngine,
    student: StudentProfile,
    topic: Topic,
    context: StudentContext,
    history: LearningHistory,
    conversation: Vec<ChatTurn>,
    // computed once so a failed completion can be retried without re-crediting
    pending_completion: Option<PendingCompletion>,
}

#[derive(Debug, Clone)]
struct PendingCompletion {
    record: SessionRecord,
    summary: SessionSummary,
    progress: StudentProgress,
}

impl ActiveSession {
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.record.id()
    }

    #[must_use]
    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    #[must_use]
    pub fn engine(&self) -> &SessionEngine {
        &self.engine
    }

    #[must_use]
    pub fn student(&self) -> &StudentProfile {
        &self.student
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    #[must_use]
    pub fn context(&self) -> &StudentContext {
        &self.context
    }

    /// Help conversation so far, oldest first.
    #[must_use]
    pub fn conversation(&self) -> &[ChatTurn] {
        &self.conversation
    }

    /// Update the unsent answer for the current question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` unless answering.
    pub fn set_draft(&mut self, draft: impl Into<String>) -> Result<(), SessionError> {
        self.engine.set_draft(draft)
    }

    /// Leave review mode and look at the current question again.
    pub fn return_to_current(&mut self) {
        self.engine.return_to_current();
    }
}

/// Outcome of submitting one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub question_index: usize,
    pub evaluation: Evaluation,
    /// Advisory match against the stored answer; never overrides `evaluation`.
    pub quick_check: QuickCheck,
    /// The evaluator failed and `evaluation` is the fallback.
    pub evaluator_failed: bool,
    pub can_retry: bool,
    pub can_advance: bool,
}

/// What the workflow produced when a session completes.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub summary: SessionSummary,
    pub progress: StudentProgress,
    /// Directive for the next batch on this topic.
    pub recommendation: Recommendation,
    /// Recency-weighted accuracy over this batch's verdicts.
    pub weighted_confidence: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextOutcome {
    Question(usize),
    Completed(Box<CompletionOutcome>),
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Orchestrates sessions over persistence and the question oracle.
#[derive(Clone)]
pub struct ProgressionService {
    clock: Clock,
    config: SessionConfig,
    catalog: Arc<dyn CatalogRepository>,
    sessions: Arc<dyn SessionRepository>,
    interactions: Arc<dyn InteractionRepository>,
    progress: Arc<dyn ProgressRepository>,
    oracle: Arc<dyn QuestionOracle>,
    tutor: Option<Arc<dyn TutorChat>>,
}

impl ProgressionService {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage, oracle: Arc<dyn QuestionOracle>) -> Self {
        Self {
            clock,
            config: SessionConfig::default(),
            catalog: Arc::clone(&storage.catalog),
            sessions: Arc::clone(&storage.sessions),
            interactions: Arc::clone(&storage.interactions),
            progress: Arc::clone(&storage.progress),
            oracle,
            tutor: None,
        }
    }

    #[must_use]
    pub fn with_tutor(mut self, tutor: Arc<dyn TutorChat>) -> Self {
        self.tutor = Some(tutor);
        self
    }

    #[must_use]
    pub fn tutor_enabled(&self) -> bool {
        self.tutor.is_some()
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> SessionConfig {
        self.config
    }

    /// Create a session and load its first batch.
    ///
    /// # Errors
    ///
    /// Returns `StudentNotFound`/`TopicNotFound` for unknown ids,
    /// `GenerationFailure` when no questions could be produced, or storage errors.
    pub async fn start(
        &self,
        student_id: StudentId,
        topic_id: TopicId,
    ) -> Result<ActiveSession, SessionError> {
        let (student, topic) = self.load_participants(student_id, topic_id).await?;
        let record = SessionRecord::start(
            SessionId::generate(),
            student_id,
            topic_id,
            self.clock.now(),
        );
        self.sessions.create_session(&record).await?;
        info!(session_id = %record.id(), topic = %topic.code, "started session");

        let mut active = self.activate(record, student, topic).await?;
        active.engine.begin_loading()?;
        self.fetch_batch(&mut active).await?;
        Ok(active)
    }

    /// Resume the student's in-progress session on a topic, or start a new one.
    ///
    /// # Errors
    ///
    /// Same as [`Self::start`] and [`Self::resume`].
    pub async fn open(
        &self,
        student_id: StudentId,
        topic_id: TopicId,
    ) -> Result<ActiveSession, SessionError> {
        match self.sessions.find_in_progress(student_id, topic_id).await? {
            Some(existing) => self.resume(existing.id()).await,
            None => self.start(student_id, topic_id).await,
        }
    }

    /// Rebuild a stored in-progress session.
    ///
    /// Picks up at the first question without a verdict. A batch with every
    /// question scored is replaced by a freshly generated one.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown session, `InvalidTransition` for a
    /// closed one, `GenerationFailure` if a new batch was needed and failed.
    pub async fn resume(&self, session_id: SessionId) -> Result<ActiveSession, SessionError> {
        let record = match self.sessions.load_session(session_id).await {
            Ok(record) => record,
            Err(StorageError::NotFound) => return Err(SessionError::NotFound { session_id }),
            Err(err) => return Err(err.into()),
        };
        if !record.is_in_progress() {
            return Err(SessionError::InvalidTransition {
                session_id,
                question_index: 0,
                reason: "session is not in progress",
            });
        }

        let (student, topic) = self
            .load_participants(record.student_id(), record.topic_id())
            .await?;
        let rows = self.interactions.load_interactions(session_id).await?;
        let point = ResumePoint::reconstruct(record.batch(), &rows);

        let mut active = self.activate(record, student, topic).await?;
        active.engine.begin_loading()?;
        if point.questions.is_empty() || point.is_exhausted() {
            info!(%session_id, "stored batch is used up; loading a fresh one");
            self.fetch_batch(&mut active).await?;
        } else {
            info!(%session_id, resume_index = point.resume_index, "resuming session");
            active.engine.restore(point)?;
        }
        Ok(active)
    }

    /// Mark the current answer.
    ///
    /// The evaluator's verdict is authoritative. If it fails, the fallback
    /// verdict is shown and nothing is persisted, so the question stays open.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` when no answer is expected, or storage errors.
    pub async fn submit_answer(
        &self,
        active: &mut ActiveSession,
        answer: &str,
    ) -> Result<SubmitOutcome, SessionError> {
        let session_id = active.id();
        let (question_index, question) = active.engine.begin_evaluation(answer)?;
        let question = question.clone();

        let hint = quick_check(&question.correct_answer, answer);
        debug!(
            %session_id,
            question_index,
            likely_correct = hint.likely_correct,
            confidence = hint.confidence,
            "quick answer check"
        );

        let verdict = self
            .oracle
            .evaluate_answer(&question, answer, &active.context)
            .await;
        let (evaluation, evaluator_failed) = match verdict {
            Ok(evaluation) => (
                active
                    .engine
                    .record_evaluation(evaluation.normalized())?
                    .clone(),
                false,
            ),
            Err(err) => {
                warn!(
                    %session_id,
                    question_index,
                    error = %err,
                    "answer evaluation failed; using fallback"
                );
                (active.engine.record_evaluation_failure()?.clone(), true)
            }
        };

        if !evaluator_failed {
            let draft = NewInteraction::answered(
                session_id,
                active.record.student_id(),
                active.record.topic_id(),
                &question,
                answer,
                evaluation.clone(),
                active.engine.hints_used(question_index),
                self.clock.now(),
            );
            let stored = self.interactions.save_interaction(&draft).await?;
            debug!(%session_id, question_index, interaction_id = %stored.id, "saved interaction");

            active
                .record
                .set_questions_completed(active.engine.answered_count());
            self.sessions.save_session(&active.record).await?;
        }

        Ok(SubmitOutcome {
            question_index,
            evaluation,
            quick_check: hint,
            evaluator_failed,
            can_retry: active.engine.can_retry(),
            can_advance: active.engine.can_advance(),
        })
    }

    /// Answer the current question again.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` when the retry budget is spent or the
    /// answer was correct.
    pub fn try_again(&self, active: &mut ActiveSession) -> Result<(), SessionError> {
        active.engine.try_again()
    }

    /// Move to the next question, completing the session after the last one.
    ///
    /// The session only closes once progress and the summary are stored. If
    /// storing fails the last question stays finished and `next` can be
    /// called again.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` while the current question is unfinished,
    /// or completion errors.
    pub async fn next(&self, active: &mut ActiveSession) -> Result<NextOutcome, SessionError> {
        match active.engine.next()? {
            Advance::Question(index) => Ok(NextOutcome::Question(index)),
            Advance::BatchFinished => {
                let outcome = self.complete(active).await?;
                Ok(NextOutcome::Completed(Box::new(outcome)))
            }
        }
    }

    /// Look at a question up to the current one.
    ///
    /// Past verdicts are always in memory, restored from the stored
    /// interactions on resume. The oracle is never called.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` for a question past the current one.
    pub fn review(
        &self,
        active: &mut ActiveSession,
        index: usize,
    ) -> Result<Option<Evaluation>, SessionError> {
        Ok(active.engine.review(index)?.cloned())
    }

    /// Ask the tutor about the question on screen.
    ///
    /// The exchange is appended to the session's conversation. A failed
    /// reply is logged and answered with [`TUTOR_FALLBACK_REPLY`].
    ///
    /// # Errors
    ///
    /// Returns `TutorUnavailable` without a tutor, `InvalidTransition` for a
    /// blank message or when no question is on screen.
    pub async fn ask(
        &self,
        active: &mut ActiveSession,
        message: &str,
    ) -> Result<String, SessionError> {
        let session_id = active.id();
        let Some(tutor) = &self.tutor else {
            return Err(SessionError::TutorUnavailable { session_id });
        };
        let question = active.engine.discussed_question()?;
        let message = message.trim();
        if message.is_empty() {
            return Err(SessionError::InvalidTransition {
                session_id,
                question_index: active.engine.viewing_index(),
                reason: "message is empty",
            });
        }

        let topic = TopicContext::from(&active.topic);
        let reply = match tutor
            .reply(&active.context, &topic, question, &active.conversation, message)
            .await
        {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => {
                warn!(%session_id, "tutor sent an empty reply");
                TUTOR_FALLBACK_REPLY.to_string()
            }
            Err(err) => {
                warn!(%session_id, error = %err, "tutor reply failed");
                TUTOR_FALLBACK_REPLY.to_string()
            }
        };

        active.conversation.push(ChatTurn::student(message));
        active.conversation.push(ChatTurn::tutor(reply.clone()));
        Ok(reply)
    }

    /// Next unused hint for the current question.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` when there is no open question.
    pub fn hint(&self, active: &mut ActiveSession) -> Result<Option<String>, SessionError> {
        Ok(active.engine.take_hint()?.map(str::to_string))
    }

    /// Close the session without touching progress.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if already closed, or storage errors.
    pub async fn abandon(&self, active: &mut ActiveSession) -> Result<(), SessionError> {
        active.engine.abandon()?;
        active.record.abandon(self.clock.now())?;
        self.sessions.save_session(&active.record).await?;
        info!(session_id = %active.id(), "abandoned session");
        Ok(())
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    async fn load_participants(
        &self,
        student_id: StudentId,
        topic_id: TopicId,
    ) -> Result<(StudentProfile, Topic), SessionError> {
        let student = match self.catalog.get_student(student_id).await {
            Ok(student) => student,
            Err(StorageError::NotFound) => return Err(SessionError::StudentNotFound { student_id }),
            Err(err) => return Err(err.into()),
        };
        let topic = match self.catalog.get_topic(topic_id).await {
            Ok(topic) => topic,
            Err(StorageError::NotFound) => return Err(SessionError::TopicNotFound { topic_id }),
            Err(err) => return Err(err.into()),
        };
        Ok((student, topic))
    }

    async fn recent_accuracies(
        &self,
        student_id: StudentId,
        topic_id: TopicId,
    ) -> Result<Vec<u32>, SessionError> {
        let recent = self
            .sessions
            .recent_completed(student_id, topic_id, self.config.recent_session_window)
            .await?;
        Ok(recent
            .iter()
            .filter_map(SessionRecord::summary)
            .map(SessionSummary::accuracy_percent)
            .collect())
    }

    async fn activate(
        &self,
        record: SessionRecord,
        student: StudentProfile,
        topic: Topic,
    ) -> Result<ActiveSession, SessionError> {
        let progress = self.progress.get_progress(student.id, topic.id).await?;
        let accuracies = self.recent_accuracies(student.id, topic.id).await?;
        let recommendation = difficulty::recommend_for_history(&accuracies, progress.as_ref());
        let recent = difficulty::recent_accuracy(&accuracies, progress.as_ref());
        let context =
            StudentContext::build(&student, &topic, progress.as_ref(), recommendation, recent);
        debug!(
            session_id = %record.id(),
            skill_level = %context.skill_level,
            instruction = ?recommendation.instruction,
            "built student context"
        );

        let completed: Vec<SessionRecord> = self
            .sessions
            .list_sessions(student.id)
            .await?
            .into_iter()
            .filter(|s| s.topic_id() == topic.id && s.status() == SessionStatus::Completed)
            .collect();
        let history = LearningHistory::from_sessions(&completed);

        Ok(ActiveSession {
            engine: SessionEngine::with_max_retries(record.id(), self.config.max_retries),
            record,
            student,
            topic,
            context,
            history,
            conversation: Vec::new(),
            pending_completion: None,
        })
    }

    /// Generate a batch, snapshot it, and open a pending row per question.
    ///
    /// The engine must already be loading.
    async fn fetch_batch(&self, active: &mut ActiveSession) -> Result<(), SessionError> {
        let session_id = active.id();
        let topic = TopicContext::from(&active.topic);
        let history = Some(&active.history).filter(|h| !h.is_empty());

        let generated = self
            .oracle
            .generate_questions(&active.context, &topic, self.config.batch_size, history)
            .await
            .map_err(|source| SessionError::GenerationFailure { session_id, source })?;

        let mut questions = retain_valid(generated);
        questions.truncate(self.config.batch_size);
        if questions.is_empty() {
            return Err(SessionError::GenerationFailure {
                session_id,
                source: OracleError::NoValidQuestions,
            });
        }

        active.record.set_batch(questions.clone());
        active.record.set_questions_completed(0);
        self.sessions.save_session(&active.record).await?;

        let now = self.clock.now();
        for question in &questions {
            let pending = NewInteraction::pending(
                session_id,
                active.record.student_id(),
                active.record.topic_id(),
                question,
                now,
            );
            self.interactions.save_interaction(&pending).await?;
        }

        info!(%session_id, count = questions.len(), "loaded question batch");
        active.engine.load_questions(questions)
    }

    async fn settle_batch(&self, active: &ActiveSession) -> Result<PendingCompletion, SessionError> {
        let now = self.clock.now();
        let questions = active.engine.questions();
        let total = u32::try_from(questions.len()).unwrap_or(u32::MAX);
        let correct = active.engine.correct_count();

        let summary = SessionSummary::for_batch(questions, correct)?;
        let mut record = active.record.clone();
        record.complete(summary.clone(), now)?;

        let student_id = record.student_id();
        let topic_id = record.topic_id();
        let mut progress = self
            .progress
            .get_progress(student_id, topic_id)
            .await?
            .unwrap_or_else(|| StudentProgress::new(student_id, topic_id));
        let weaknesses = scoring::extract_weaknesses(active.engine.evaluations().values());
        progress.apply_batch(BatchScore::from_counts(total, correct), &weaknesses, now);

        Ok(PendingCompletion {
            record,
            summary,
            progress,
        })
    }

    async fn complete(&self, active: &mut ActiveSession) -> Result<CompletionOutcome, SessionError> {
        let session_id = active.id();
        let pending = match &active.pending_completion {
            Some(pending) => pending.clone(),
            None => {
                let pending = self.settle_batch(active).await?;
                active.pending_completion = Some(pending.clone());
                pending
            }
        };

        self.progress.upsert_progress(&pending.progress).await?;
        self.sessions.save_session(&pending.record).await?;
        active.engine.mark_completed()?;
        active.pending_completion = None;

        let PendingCompletion {
            record,
            summary,
            progress,
        } = pending;
        active.record = record;

        let student_id = active.record.student_id();
        let topic_id = active.record.topic_id();
        let total = summary.total();
        let correct = summary.correct();
        info!(
            %session_id,
            correct,
            total,
            skill_level = %progress.skill_level(),
            confidence = progress.confidence_score(),
            "completed session"
        );

        let accuracies = self
            .recent_accuracies(student_id, topic_id)
            .await
            .unwrap_or_else(|err| {
                warn!(%session_id, error = %err, "recent sessions unavailable; recommending from progress");
                Vec::new()
            });
        let recommendation = difficulty::recommend_for_history(&accuracies, Some(&progress));

        let newest_first: Vec<f64> = active
            .engine
            .evaluations()
            .values()
            .rev()
            .map(|e| e.accuracy_score)
            .collect();

        Ok(CompletionOutcome {
            summary,
            progress,
            recommendation,
            weighted_confidence: scoring::weighted_confidence(&newest_first),
            message: PerformanceBand::for_counts(correct, total).message(&active.student.first_name),
        })
    }
}
