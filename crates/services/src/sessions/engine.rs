use std::collections::BTreeMap;

use tutor_core::model::{Evaluation, Question, SessionId, SessionStatus};

use super::resume::ResumePoint;
use crate::error::SessionError;

/// Retries allowed on one question before only skipping remains.
pub const MAX_RETRIES: u32 = 2;

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    LoadingQuestions,
    Answering,
    Evaluating,
    ShowingFeedback,
    Completed,
}

/// Which question the student is looking at.
///
/// Reviewing never moves the progression pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Progressing { index: usize },
    Reviewing { index: usize, return_index: usize },
}

/// Result of moving past the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Question(usize),
    BatchFinished,
}

/// In-memory state machine for one batch of a session.
///
/// `answers` and `evaluations` are sparse and keyed by question index.
#[derive(Debug, Clone)]
pub struct SessionEngine {
    session_id: SessionId,
    phase: Phase,
    status: SessionStatus,
    questions: Vec<Question>,
    current_index: usize,
    navigation: Navigation,
    answers: BTreeMap<usize, String>,
    evaluations: BTreeMap<usize, Evaluation>,
    hints_used: BTreeMap<usize, u32>,
    retry_count: u32,
    max_retries: u32,
    // last verdict came from the fallback, so a retry is free
    last_was_fallback: bool,
}

impl SessionEngine {
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self::with_max_retries(session_id, MAX_RETRIES)
    }

    #[must_use]
    pub fn with_max_retries(session_id: SessionId, max_retries: u32) -> Self {
        Self {
            session_id,
            phase: Phase::Initializing,
            status: SessionStatus::InProgress,
            questions: Vec::new(),
            current_index: 0,
            navigation: Navigation::Progressing { index: 0 },
            answers: BTreeMap::new(),
            evaluations: BTreeMap::new(),
            hints_used: BTreeMap::new(),
            retry_count: 0,
            max_retries,
            last_was_fallback: false,
        }
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn navigation(&self) -> Navigation {
        self.navigation
    }

    #[must_use]
    pub fn viewing_index(&self) -> usize {
        match self.navigation {
            Navigation::Progressing { index } | Navigation::Reviewing { index, .. } => index,
        }
    }

    #[must_use]
    pub fn is_reviewing(&self) -> bool {
        matches!(self.navigation, Navigation::Reviewing { .. })
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    #[must_use]
    pub fn viewed_question(&self) -> Option<&Question> {
        self.questions.get(self.viewing_index())
    }

    #[must_use]
    pub fn answer(&self, index: usize) -> Option<&str> {
        self.answers.get(&index).map(String::as_str)
    }

    #[must_use]
    pub fn evaluation(&self, index: usize) -> Option<&Evaluation> {
        self.evaluations.get(&index)
    }

    #[must_use]
    pub fn evaluations(&self) -> &BTreeMap<usize, Evaluation> {
        &self.evaluations
    }

    #[must_use]
    pub fn hints_used(&self, index: usize) -> u32 {
        self.hints_used.get(&index).copied().unwrap_or(0)
    }

    /// Questions in the batch whose stored verdict is correct.
    #[must_use]
    pub fn correct_count(&self) -> u32 {
        let correct = self
            .evaluations
            .iter()
            .filter(|(index, e)| **index < self.questions.len() && e.is_correct)
            .count();
        u32::try_from(correct).unwrap_or(u32::MAX)
    }

    /// Questions in the batch with a stored verdict.
    #[must_use]
    pub fn answered_count(&self) -> u32 {
        let answered = self
            .evaluations
            .keys()
            .filter(|index| **index < self.questions.len())
            .count();
        u32::try_from(answered).unwrap_or(u32::MAX)
    }

    fn current_evaluation(&self) -> Option<&Evaluation> {
        self.evaluations.get(&self.current_index)
    }

    fn invalid(&self, reason: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            session_id: self.session_id,
            question_index: self.current_index,
            reason,
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.phase == Phase::Completed || self.status != SessionStatus::InProgress {
            return Err(self.invalid("session is closed"));
        }
        Ok(())
    }

    //
    // ─── LOADING ───────────────────────────────────────────────────────────────
    //

    /// `initializing → loading_questions`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` from any other phase.
    pub fn begin_loading(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.phase != Phase::Initializing {
            return Err(self.invalid("questions are already loaded"));
        }
        self.phase = Phase::LoadingQuestions;
        Ok(())
    }

    /// `loading_questions → answering` with a fresh batch.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` outside `loading_questions`
    /// or for an empty batch.
    pub fn load_questions(&mut self, questions: Vec<Question>) -> Result<(), SessionError> {
        self.restore(ResumePoint::fresh(questions))
    }

    /// `loading_questions → answering` from a reconstructed resume point.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` outside `loading_questions`,
    /// for an empty batch, or when the resume point is already past the end.
    pub fn restore(&mut self, point: ResumePoint) -> Result<(), SessionError> {
        if self.phase != Phase::LoadingQuestions {
            return Err(self.invalid("not waiting for questions"));
        }
        if point.questions.is_empty() {
            return Err(self.invalid("question batch is empty"));
        }
        if point.resume_index >= point.questions.len() {
            return Err(self.invalid("resume point is past the end of the batch"));
        }

        self.questions = point.questions;
        self.current_index = point.resume_index;
        self.navigation = Navigation::Progressing {
            index: point.resume_index,
        };
        self.answers = point.answers;
        self.evaluations = point.evaluations;
        self.hints_used = point.hints_used;
        self.retry_count = 0;
        self.last_was_fallback = false;
        self.phase = Phase::Answering;
        Ok(())
    }

    //
    // ─── ANSWERING ─────────────────────────────────────────────────────────────
    //

    /// Keep an in-progress draft for the current question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` unless answering the current question.
    pub fn set_draft(&mut self, draft: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.phase != Phase::Answering || self.is_reviewing() {
            return Err(self.invalid("not answering the current question"));
        }
        self.answers.insert(self.current_index, draft.into());
        Ok(())
    }

    /// `answering → evaluating`. Returns the index and question being marked.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` outside `answering`, while
    /// reviewing, or for a blank answer.
    pub fn begin_evaluation(&mut self, answer: &str) -> Result<(usize, &Question), SessionError> {
        self.ensure_open()?;
        if self.phase != Phase::Answering {
            return Err(self.invalid("not waiting for an answer"));
        }
        if self.is_reviewing() {
            return Err(self.invalid("cannot answer while reviewing a past question"));
        }
        if answer.trim().is_empty() {
            return Err(self.invalid("answer is empty"));
        }

        let index = self.current_index;
        self.answers.insert(index, answer.to_string());
        self.phase = Phase::Evaluating;
        let question = self
            .questions
            .get(index)
            .ok_or_else(|| self.invalid("no current question"))?;
        Ok((index, question))
    }

    /// `evaluating → showing_feedback` with an authoritative verdict.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` outside `evaluating`.
    pub fn record_evaluation(&mut self, evaluation: Evaluation) -> Result<&Evaluation, SessionError> {
        self.finish_evaluation(evaluation, false)
    }

    /// `evaluating → showing_feedback` after the evaluator failed.
    ///
    /// Stores [`Evaluation::fallback`]; the retry it enables does not count
    /// against the retry budget.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` outside `evaluating`.
    pub fn record_evaluation_failure(&mut self) -> Result<&Evaluation, SessionError> {
        self.finish_evaluation(Evaluation::fallback(), true)
    }

    fn finish_evaluation(
        &mut self,
        evaluation: Evaluation,
        fallback: bool,
    ) -> Result<&Evaluation, SessionError> {
        if self.phase != Phase::Evaluating {
            return Err(self.invalid("no answer is being evaluated"));
        }
        let index = self.current_index;
        self.last_was_fallback = fallback;
        self.phase = Phase::ShowingFeedback;
        self.evaluations.insert(index, evaluation);
        self.evaluations
            .get(&index)
            .ok_or_else(|| self.invalid("evaluation was not stored"))
    }

    //
    // ─── FEEDBACK ──────────────────────────────────────────────────────────────
    //

    /// Whether `showing_feedback → answering (retry)` is available.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.phase == Phase::ShowingFeedback
            && self
                .current_evaluation()
                .is_some_and(|e| !e.is_correct)
            && (self.last_was_fallback || self.retry_count < self.max_retries)
    }

    /// Whether `showing_feedback → answering (next)` is available.
    #[must_use]
    pub fn can_advance(&self) -> bool {
        self.phase == Phase::ShowingFeedback
            && self
                .current_evaluation()
                .is_some_and(|e| e.is_correct || self.retry_count >= self.max_retries)
    }

    /// Go back to answering the same question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` when [`Self::can_retry`] is false.
    pub fn try_again(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        if !self.can_retry() {
            return Err(self.invalid("no retries left for this question"));
        }
        if !self.last_was_fallback {
            self.retry_count += 1;
        }
        self.last_was_fallback = false;
        self.navigation = Navigation::Progressing {
            index: self.current_index,
        };
        self.phase = Phase::Answering;
        Ok(())
    }

    /// Move past the current question, after a correct answer or once the
    /// retries are used up.
    ///
    /// On the last question nothing moves: [`Advance::BatchFinished`] asks the
    /// caller to persist the batch and then call [`Self::mark_completed`].
    /// Until then the last question stays finished and `next` can be repeated.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` when [`Self::can_advance`] is false.
    pub fn next(&mut self) -> Result<Advance, SessionError> {
        self.ensure_open()?;
        if !self.can_advance() {
            return Err(self.invalid("current question is not finished"));
        }
        if self.current_index + 1 >= self.questions.len() {
            return Ok(Advance::BatchFinished);
        }

        self.current_index += 1;
        self.retry_count = 0;
        self.last_was_fallback = false;
        self.navigation = Navigation::Progressing {
            index: self.current_index,
        };
        self.answers.remove(&self.current_index);
        self.phase = Phase::Answering;
        Ok(Advance::Question(self.current_index))
    }

    /// `showing_feedback → completed` once the finished batch is stored.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` unless the last question is finished.
    pub fn mark_completed(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        if !self.can_advance() || self.current_index + 1 < self.questions.len() {
            return Err(self.invalid("batch is not finished"));
        }
        self.current_index = self.questions.len();
        self.retry_count = 0;
        self.last_was_fallback = false;
        self.navigation = Navigation::Progressing {
            index: self.current_index,
        };
        self.phase = Phase::Completed;
        self.status = SessionStatus::Completed;
        Ok(())
    }

    //
    // ─── REVIEW ────────────────────────────────────────────────────────────────
    //

    /// View any question up to the current one without moving progression.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` for an index past the current
    /// question or outside `answering`/`showing_feedback`.
    pub fn review(&mut self, index: usize) -> Result<Option<&Evaluation>, SessionError> {
        self.ensure_open()?;
        if !matches!(self.phase, Phase::Answering | Phase::ShowingFeedback) {
            return Err(self.invalid("cannot review right now"));
        }
        if index > self.current_index || index >= self.questions.len() {
            return Err(self.invalid("cannot navigate past the current question"));
        }

        self.navigation = if index == self.current_index {
            Navigation::Progressing { index }
        } else {
            Navigation::Reviewing {
                index,
                return_index: self.current_index,
            }
        };
        Ok(self.evaluations.get(&index))
    }

    /// Leave review mode.
    pub fn return_to_current(&mut self) {
        self.navigation = Navigation::Progressing {
            index: self.current_index,
        };
    }

    //
    // ─── HINTS / CLOSING ───────────────────────────────────────────────────────
    //

    /// Next unused stored hint for the current question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` unless answering or showing feedback.
    pub fn take_hint(&mut self) -> Result<Option<&str>, SessionError> {
        self.ensure_open()?;
        if !matches!(self.phase, Phase::Answering | Phase::ShowingFeedback) {
            return Err(self.invalid("no question to hint"));
        }
        let index = self.current_index;
        let used = self.hints_used(index);
        let Some(question) = self.questions.get(index) else {
            return Ok(None);
        };
        let Some(hint) = question.next_hint(usize::try_from(used).unwrap_or(usize::MAX)) else {
            return Ok(None);
        };
        self.hints_used.insert(index, used + 1);
        Ok(Some(hint))
    }

    /// The question on screen, current or under review, for a help conversation.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` unless answering or showing feedback.
    pub fn discussed_question(&self) -> Result<&Question, SessionError> {
        self.ensure_open()?;
        if !matches!(self.phase, Phase::Answering | Phase::ShowingFeedback) {
            return Err(self.invalid("no question to discuss"));
        }
        self.viewed_question()
            .ok_or_else(|| self.invalid("no question to discuss"))
    }

    /// Close the engine without completing the batch.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` if already closed.
    pub fn abandon(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.phase = Phase::Completed;
        self.status = SessionStatus::Abandoned;
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::model::{Difficulty, QuestionType};

    fn question(n: usize) -> Question {
        Question {
            text: format!("What is {n} + {n}?"),
            kind: QuestionType::ShortAnswer,
            difficulty: Difficulty::Easy,
            hints: vec!["Count on".into(), "Double it".into()],
            correct_answer: (n * 2).to_string(),
            solution_steps: vec![format!("{n} + {n} = {}", n * 2)],
            focuses_on: Some("doubles".into()),
            builds_on: None,
        }
    }

    fn verdict(is_correct: bool) -> Evaluation {
        Evaluation {
            is_correct,
            accuracy_score: if is_correct { 1.0 } else { 0.0 },
            feedback: "ok".into(),
            ..Evaluation::fallback()
        }
    }

    fn loaded(n: usize) -> SessionEngine {
        let mut engine = SessionEngine::new(SessionId::generate());
        engine.begin_loading().unwrap();
        engine
            .load_questions((0..n).map(question).collect())
            .unwrap();
        engine
    }

    fn answer(engine: &mut SessionEngine, is_correct: bool) {
        engine.begin_evaluation("x").unwrap();
        engine.record_evaluation(verdict(is_correct)).unwrap();
    }

    #[test]
    fn walks_a_batch_to_completion() {
        let mut engine = loaded(2);
        assert_eq!(engine.phase(), Phase::Answering);

        answer(&mut engine, true);
        assert_eq!(engine.phase(), Phase::ShowingFeedback);
        assert!(!engine.can_retry());
        assert_eq!(engine.next().unwrap(), Advance::Question(1));

        answer(&mut engine, true);
        assert_eq!(engine.next().unwrap(), Advance::BatchFinished);
        assert_eq!(engine.phase(), Phase::ShowingFeedback);
        assert_eq!(engine.next().unwrap(), Advance::BatchFinished);
        engine.mark_completed().unwrap();
        assert_eq!(engine.phase(), Phase::Completed);
        assert_eq!(engine.status(), SessionStatus::Completed);
        assert_eq!(engine.correct_count(), 2);

        let err = engine.begin_evaluation("4").unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    #[test]
    fn retries_are_bounded() {
        let mut engine = loaded(2);

        answer(&mut engine, false);
        assert!(!engine.can_advance());
        engine.try_again().unwrap();
        answer(&mut engine, false);
        engine.try_again().unwrap();
        answer(&mut engine, false);

        assert_eq!(engine.retry_count(), MAX_RETRIES);
        assert!(!engine.can_retry());
        assert!(engine.try_again().is_err());
        assert!(engine.can_advance());
        assert_eq!(engine.current_index(), 0);

        assert_eq!(engine.next().unwrap(), Advance::Question(1));
        assert_eq!(engine.retry_count(), 0);
        assert_eq!(engine.correct_count(), 0);
    }

    #[test]
    fn completion_requires_a_finished_last_question() {
        let mut engine = loaded(2);
        answer(&mut engine, true);
        assert!(engine.mark_completed().is_err());
        engine.next().unwrap();
        assert!(engine.mark_completed().is_err());
        answer(&mut engine, true);
        engine.mark_completed().unwrap();
        assert!(engine.mark_completed().is_err());
    }

    #[test]
    fn incorrect_answer_cannot_skip_before_retries_run_out() {
        let mut engine = loaded(1);
        answer(&mut engine, false);
        let err = engine.next().unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition {
                question_index: 0,
                ..
            }
        ));
        assert_eq!(engine.current_index(), 0);
    }

    #[test]
    fn fallback_verdict_does_not_spend_a_retry() {
        let mut engine = loaded(1);
        engine.begin_evaluation("7").unwrap();
        let shown = engine.record_evaluation_failure().unwrap();
        assert!(!shown.is_correct);

        assert!(engine.can_retry());
        engine.try_again().unwrap();
        assert_eq!(engine.retry_count(), 0);
        assert_eq!(engine.phase(), Phase::Answering);
    }

    #[test]
    fn review_never_moves_forward_or_changes_progress() {
        let mut engine = loaded(3);
        answer(&mut engine, true);
        engine.next().unwrap();

        let past = engine.review(0).unwrap();
        assert!(past.is_some_and(|e| e.is_correct));
        assert!(engine.is_reviewing());
        assert_eq!(engine.viewing_index(), 0);
        assert_eq!(engine.current_index(), 1);
        assert!(engine.begin_evaluation("2").is_err());

        assert!(engine.review(2).is_err());
        assert_eq!(engine.current_index(), 1);

        engine.return_to_current();
        assert!(!engine.is_reviewing());
        engine.begin_evaluation("2").unwrap();
    }

    #[test]
    fn evaluations_imply_answers() {
        let mut engine = loaded(2);
        engine.set_draft("draft").unwrap();
        assert_eq!(engine.answer(0), Some("draft"));
        assert!(engine.evaluation(0).is_none());

        answer(&mut engine, true);
        for index in engine.evaluations().keys() {
            assert!(engine.answer(*index).is_some());
        }
    }

    #[test]
    fn hints_are_handed_out_in_order() {
        let mut engine = loaded(1);
        assert_eq!(engine.take_hint().unwrap(), Some("Count on"));
        assert_eq!(engine.take_hint().unwrap(), Some("Double it"));
        assert_eq!(engine.take_hint().unwrap(), None);
        assert_eq!(engine.hints_used(0), 2);
    }

    #[test]
    fn loading_rejects_empty_batches_and_double_loads() {
        let mut engine = SessionEngine::new(SessionId::generate());
        assert!(engine.load_questions(vec![question(1)]).is_err());
        engine.begin_loading().unwrap();
        assert!(engine.load_questions(Vec::new()).is_err());
        engine.load_questions(vec![question(1)]).unwrap();
        assert!(engine.begin_loading().is_err());
    }

    #[test]
    fn discussion_follows_the_viewed_question() {
        let mut engine = SessionEngine::new(SessionId::generate());
        assert!(engine.discussed_question().is_err());
        engine.begin_loading().unwrap();
        engine.load_questions((1..=2).map(question).collect()).unwrap();

        answer(&mut engine, true);
        engine.next().unwrap();
        assert_eq!(engine.discussed_question().unwrap().text, "What is 2 + 2?");
        engine.review(0).unwrap();
        assert_eq!(engine.discussed_question().unwrap().text, "What is 1 + 1?");

        engine.abandon().unwrap();
        assert!(engine.discussed_question().is_err());
    }

    #[test]
    fn abandon_closes_the_engine() {
        let mut engine = loaded(2);
        engine.abandon().unwrap();
        assert_eq!(engine.status(), SessionStatus::Abandoned);
        assert!(engine.take_hint().is_err());
        assert!(engine.abandon().is_err());
    }
}
