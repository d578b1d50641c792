use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use services::sessions::Phase;
use services::{
    ActiveSession, BadgeService, ChatRole, ChatTurn, Clock, LearningHistory, NextOutcome,
    OracleError, ProgressionService, QuestionOracle, SessionError, StudentContext,
    TUTOR_FALLBACK_REPLY, TopicContext, TutorChat,
};
use storage::repository::{ProgressRepository, Storage, StorageError};
use tutor_core::badges::BadgeId;
use tutor_core::model::{
    ConceptualUnderstanding, Difficulty, Evaluation, Question, QuestionType, SessionStatus,
    SkillLevel, StudentId, StudentProfile, StudentProgress, Topic, TopicId,
};
use tutor_core::time::fixed_now;

/// Oracle that marks answers by exact match and can be told to fail.
#[derive(Default)]
struct ScriptedOracle {
    batches: AtomicUsize,
    fail_generation: AtomicBool,
    fail_evaluation: AtomicBool,
    fail_tutor: AtomicBool,
}

impl ScriptedOracle {
    fn question(batch: usize, n: usize) -> Question {
        Question {
            text: format!("Batch {batch}: what is {n} + {n}?"),
            kind: QuestionType::ShortAnswer,
            difficulty: Difficulty::Easy,
            hints: vec!["Count on from the first number".into(), "Double it".into()],
            correct_answer: (n * 2).to_string(),
            solution_steps: vec![format!("{n} + {n} = {}", n * 2)],
            focuses_on: Some(format!("doubles to {}", n * 2)),
            builds_on: None,
        }
    }
}

#[async_trait]
impl QuestionOracle for ScriptedOracle {
    async fn generate_questions(
        &self,
        _student: &StudentContext,
        _topic: &TopicContext,
        count: usize,
        _history: Option<&LearningHistory>,
    ) -> Result<Vec<Question>, OracleError> {
        if self.fail_generation.load(Ordering::SeqCst) {
            return Err(OracleError::Timeout);
        }
        let batch = self.batches.fetch_add(1, Ordering::SeqCst);
        Ok((1..=count).map(|n| Self::question(batch, n)).collect())
    }

    async fn evaluate_answer(
        &self,
        question: &Question,
        answer: &str,
        _student: &StudentContext,
    ) -> Result<Evaluation, OracleError> {
        if self.fail_evaluation.load(Ordering::SeqCst) {
            return Err(OracleError::EmptyResponse);
        }
        let is_correct = answer.trim() == question.correct_answer;
        Ok(Evaluation {
            is_correct,
            accuracy_score: if is_correct { 1.0 } else { 0.0 },
            feedback: if is_correct { "Correct!" } else { "Not quite." }.into(),
            conceptual_understanding: if is_correct {
                ConceptualUnderstanding::Strong
            } else {
                ConceptualUnderstanding::NeedsWork
            },
            identified_weakness: (!is_correct).then(|| "doubling".to_string()),
            suggested_hint: None,
            encouragement: "Keep going".into(),
        })
    }
}

#[async_trait]
impl TutorChat for ScriptedOracle {
    async fn reply(
        &self,
        _student: &StudentContext,
        _topic: &TopicContext,
        question: &Question,
        history: &[ChatTurn],
        message: &str,
    ) -> Result<String, OracleError> {
        if self.fail_tutor.load(Ordering::SeqCst) {
            return Err(OracleError::Timeout);
        }
        Ok(format!(
            "[{} earlier] {message} -> think about {}",
            history.len(),
            question.text
        ))
    }
}

/// Progress store whose first `failures` writes fail.
struct FlakyProgress {
    inner: Arc<dyn ProgressRepository>,
    failures: AtomicUsize,
}

#[async_trait]
impl ProgressRepository for FlakyProgress {
    async fn upsert_progress(&self, progress: &StudentProgress) -> Result<(), StorageError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(StorageError::Connection("transient".into()));
        }
        self.inner.upsert_progress(progress).await
    }

    async fn get_progress(
        &self,
        student_id: StudentId,
        topic_id: TopicId,
    ) -> Result<Option<StudentProgress>, StorageError> {
        self.inner.get_progress(student_id, topic_id).await
    }

    async fn list_progress(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<StudentProgress>, StorageError> {
        self.inner.list_progress(student_id).await
    }
}

struct Fixture {
    storage: Storage,
    oracle: Arc<ScriptedOracle>,
    service: ProgressionService,
    student: StudentId,
    topic: TopicId,
}

async fn fixture() -> Fixture {
    fixture_over(Storage::in_memory()).await
}

async fn fixture_over(storage: Storage) -> Fixture {
    let student = StudentProfile {
        id: StudentId::generate(),
        first_name: "Sam".into(),
        grade_level: 3,
        curriculum_level: 2,
    };
    let topic = Topic {
        id: TopicId::generate(),
        code: "MA2-AR-01".into(),
        title: "Doubles and near doubles".into(),
        description: "Mental strategies for addition".into(),
        strand: "Number and Algebra".into(),
        sub_strand: Some("Additive relations".into()),
        level: 2,
        elaborations: Vec::new(),
    };
    storage.catalog.upsert_student(&student).await.unwrap();
    storage.catalog.upsert_topic(&topic).await.unwrap();

    let oracle = Arc::new(ScriptedOracle::default());
    let service = ProgressionService::new(
        Clock::fixed(fixed_now()),
        &storage,
        Arc::clone(&oracle) as Arc<dyn QuestionOracle>,
    );
    Fixture {
        storage,
        oracle,
        service,
        student: student.id,
        topic: topic.id,
    }
}

fn current_answer(active: &ActiveSession) -> String {
    active
        .engine()
        .current_question()
        .expect("open question")
        .correct_answer
        .clone()
}

async fn answer_correctly(service: &ProgressionService, active: &mut ActiveSession) {
    let answer = current_answer(active);
    let outcome = service.submit_answer(active, &answer).await.unwrap();
    assert!(outcome.evaluation.is_correct);
    assert!(outcome.quick_check.likely_correct);
}

/// Answer wrong until the retry budget is spent.
async fn exhaust_retries(service: &ProgressionService, active: &mut ActiveSession) {
    loop {
        let outcome = service.submit_answer(active, "999").await.unwrap();
        assert!(!outcome.evaluation.is_correct);
        if outcome.can_advance {
            assert!(!outcome.can_retry);
            return;
        }
        service.try_again(active).unwrap();
    }
}

#[tokio::test]
async fn four_of_five_completes_at_practicing() {
    let fx = fixture().await;
    let mut active = fx.service.start(fx.student, fx.topic).await.unwrap();
    assert_eq!(active.engine().questions().len(), 5);
    assert_eq!(active.engine().phase(), Phase::Answering);

    let mut completion = None;
    for index in 0..5 {
        if index == 2 {
            exhaust_retries(&fx.service, &mut active).await;
        } else {
            answer_correctly(&fx.service, &mut active).await;
        }
        match fx.service.next(&mut active).await.unwrap() {
            NextOutcome::Question(next) => assert_eq!(next, index + 1),
            NextOutcome::Completed(outcome) => completion = Some(outcome),
        }
    }

    let outcome = completion.expect("batch completed");
    assert_eq!(outcome.summary.total(), 5);
    assert_eq!(outcome.summary.correct(), 4);
    assert_eq!(outcome.summary.accuracy_percent(), 80);
    assert!((outcome.progress.confidence_score() - 0.8).abs() < 1e-9);
    assert_eq!(outcome.progress.skill_level(), SkillLevel::Practicing);
    assert_eq!(outcome.progress.weaknesses(), ["doubling".to_string()]);
    assert!(outcome.message.starts_with("Great job, Sam!"));
    assert!(outcome.weighted_confidence > 0.7 && outcome.weighted_confidence < 0.9);

    let stored = fx
        .storage
        .progress
        .get_progress(fx.student, fx.topic)
        .await
        .unwrap()
        .expect("progress persisted");
    assert_eq!(stored.questions_attempted(), 5);
    assert_eq!(stored.questions_correct(), 4);

    let record = fx.storage.sessions.load_session(active.id()).await.unwrap();
    assert_eq!(record.status(), SessionStatus::Completed);
    assert_eq!(record.summary().map(|s| s.correct()), Some(4));
}

#[tokio::test]
async fn reopening_resumes_at_first_unanswered_question() {
    let fx = fixture().await;
    let mut active = fx.service.start(fx.student, fx.topic).await.unwrap();
    let session_id = active.id();
    for _ in 0..3 {
        answer_correctly(&fx.service, &mut active).await;
        let _ = fx.service.next(&mut active).await.unwrap();
    }
    drop(active);

    let mut resumed = fx.service.open(fx.student, fx.topic).await.unwrap();
    assert_eq!(resumed.id(), session_id);
    assert_eq!(resumed.engine().current_index(), 3);
    assert_eq!(resumed.engine().answered_count(), 3);
    assert_eq!(fx.oracle.batches.load(Ordering::SeqCst), 1);

    let past = fx.service.review(&mut resumed, 1).unwrap();
    assert!(past.is_some_and(|e| e.is_correct));
    assert_eq!(resumed.engine().current_index(), 3);
}

#[tokio::test]
async fn retries_stop_after_the_budget() {
    let fx = fixture().await;
    let mut active = fx.service.start(fx.student, fx.topic).await.unwrap();

    let first = fx.service.submit_answer(&mut active, "1").await.unwrap();
    assert!(first.can_retry && !first.can_advance);
    assert!(matches!(
        fx.service.next(&mut active).await,
        Err(SessionError::InvalidTransition { .. })
    ));

    fx.service.try_again(&mut active).unwrap();
    let _ = fx.service.submit_answer(&mut active, "1").await.unwrap();
    fx.service.try_again(&mut active).unwrap();
    let last = fx.service.submit_answer(&mut active, "1").await.unwrap();
    assert!(!last.can_retry && last.can_advance);
    assert!(matches!(
        fx.service.try_again(&mut active),
        Err(SessionError::InvalidTransition { .. })
    ));

    let rows = fx
        .storage
        .interactions
        .load_interactions(active.id())
        .await
        .unwrap();
    let answered: Vec<_> = rows.iter().filter(|r| r.is_answered()).collect();
    assert_eq!(answered.len(), 1);
}

#[tokio::test]
async fn evaluator_failure_shows_fallback_and_persists_nothing() {
    let fx = fixture().await;
    let mut active = fx.service.start(fx.student, fx.topic).await.unwrap();
    fx.oracle.fail_evaluation.store(true, Ordering::SeqCst);

    let answer = current_answer(&active);
    let outcome = fx.service.submit_answer(&mut active, &answer).await.unwrap();
    assert!(outcome.evaluator_failed);
    assert_eq!(outcome.evaluation, Evaluation::fallback());
    assert!(outcome.can_retry);

    let rows = fx
        .storage
        .interactions
        .load_interactions(active.id())
        .await
        .unwrap();
    assert!(rows.iter().all(|r| !r.is_answered()));

    fx.oracle.fail_evaluation.store(false, Ordering::SeqCst);
    fx.service.try_again(&mut active).unwrap();
    assert_eq!(active.engine().retry_count(), 0);
    answer_correctly(&fx.service, &mut active).await;
}

#[tokio::test]
async fn generation_failure_leaves_session_open() {
    let fx = fixture().await;
    fx.oracle.fail_generation.store(true, Ordering::SeqCst);

    let err = fx.service.start(fx.student, fx.topic).await.unwrap_err();
    let SessionError::GenerationFailure { session_id, .. } = err else {
        panic!("expected GenerationFailure, got {err:?}");
    };
    let record = fx.storage.sessions.load_session(session_id).await.unwrap();
    assert_eq!(record.status(), SessionStatus::InProgress);

    fx.oracle.fail_generation.store(false, Ordering::SeqCst);
    let active = fx.service.open(fx.student, fx.topic).await.unwrap();
    assert_eq!(active.id(), session_id);
    assert_eq!(active.engine().questions().len(), 5);
}

#[tokio::test]
async fn abandon_leaves_progress_untouched() {
    let fx = fixture().await;
    let mut active = fx.service.start(fx.student, fx.topic).await.unwrap();
    answer_correctly(&fx.service, &mut active).await;
    fx.service.abandon(&mut active).await.unwrap();

    let progress = fx
        .storage
        .progress
        .get_progress(fx.student, fx.topic)
        .await
        .unwrap();
    assert!(progress.is_none());
    assert!(matches!(
        fx.service.resume(active.id()).await,
        Err(SessionError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn completed_session_earns_badges() {
    let fx = fixture().await;
    let mut active = fx.service.start(fx.student, fx.topic).await.unwrap();
    loop {
        answer_correctly(&fx.service, &mut active).await;
        if let NextOutcome::Completed(_) = fx.service.next(&mut active).await.unwrap() {
            break;
        }
    }

    let badges = BadgeService::new(
        Clock::fixed(fixed_now()),
        Arc::clone(&fx.storage.sessions),
        Arc::clone(&fx.storage.interactions),
        Arc::clone(&fx.storage.progress),
    );
    let stats = badges.student_stats(fx.student).await.unwrap();
    assert_eq!(stats.total_questions, 5);
    assert_eq!(stats.current_streak, 5);
    assert_eq!(stats.total_sessions, 1);
    assert_eq!(stats.daily_streak, 1);

    let earned = badges.earned_badges(fx.student).await.unwrap();
    assert!(earned.contains(&BadgeId::FirstAnswer));
    assert!(earned.contains(&BadgeId::Flawless));
    assert!(!earned.contains(&BadgeId::CuriousLearner));
}

#[tokio::test]
async fn reopening_a_fully_scored_batch_loads_a_fresh_one() {
    let fx = fixture().await;
    let mut active = fx.service.start(fx.student, fx.topic).await.unwrap();
    let session_id = active.id();
    let first_batch = active.engine().questions().to_vec();
    for index in 0..5 {
        answer_correctly(&fx.service, &mut active).await;
        if index < 4 {
            let _ = fx.service.next(&mut active).await.unwrap();
        }
    }
    drop(active);

    let reopened = fx.service.open(fx.student, fx.topic).await.unwrap();
    assert_eq!(reopened.id(), session_id);
    assert_eq!(reopened.engine().current_index(), 0);
    assert_eq!(reopened.engine().answered_count(), 0);
    assert_eq!(fx.oracle.batches.load(Ordering::SeqCst), 2);
    assert_ne!(reopened.engine().questions(), first_batch.as_slice());

    let record = fx.storage.sessions.load_session(session_id).await.unwrap();
    assert_eq!(record.batch(), Some(reopened.engine().questions()));
    assert_eq!(record.status(), SessionStatus::InProgress);
}

#[tokio::test]
async fn failed_completion_can_be_retried() {
    let base = Storage::in_memory();
    let progress: Arc<dyn ProgressRepository> = Arc::new(FlakyProgress {
        inner: Arc::clone(&base.progress),
        failures: AtomicUsize::new(1),
    });
    let fx = fixture_over(Storage { progress, ..base }).await;

    let mut active = fx.service.start(fx.student, fx.topic).await.unwrap();
    for _ in 0..4 {
        answer_correctly(&fx.service, &mut active).await;
        let _ = fx.service.next(&mut active).await.unwrap();
    }
    answer_correctly(&fx.service, &mut active).await;

    let err = fx.service.next(&mut active).await.unwrap_err();
    assert!(matches!(err, SessionError::Storage(StorageError::Connection(_))));
    assert_eq!(active.engine().phase(), Phase::ShowingFeedback);
    assert!(fx.storage.progress.get_progress(fx.student, fx.topic).await.unwrap().is_none());

    let NextOutcome::Completed(outcome) = fx.service.next(&mut active).await.unwrap() else {
        panic!("expected the batch to complete");
    };
    assert_eq!(outcome.summary.correct(), 5);
    assert_eq!(active.engine().phase(), Phase::Completed);

    let stored = fx
        .storage
        .progress
        .get_progress(fx.student, fx.topic)
        .await
        .unwrap()
        .expect("progress persisted");
    assert_eq!(stored.questions_attempted(), 5);
    let record = fx.storage.sessions.load_session(active.id()).await.unwrap();
    assert_eq!(record.status(), SessionStatus::Completed);
    assert_eq!(fx.oracle.batches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bare_decimal_answer_is_marked() {
    let fx = fixture().await;
    let mut active = fx.service.start(fx.student, fx.topic).await.unwrap();
    let outcome = fx.service.submit_answer(&mut active, ".5").await.unwrap();
    assert!(!outcome.evaluation.is_correct);
    assert!(!outcome.quick_check.likely_correct);
}

#[tokio::test]
async fn tutor_chat_keeps_the_conversation() {
    let fx = fixture().await;
    let service = fx
        .service
        .clone()
        .with_tutor(Arc::clone(&fx.oracle) as Arc<dyn TutorChat>);
    let mut active = service.start(fx.student, fx.topic).await.unwrap();
    let question = active.engine().current_question().unwrap().text.clone();

    let first = service.ask(&mut active, "  where do I start? ").await.unwrap();
    assert_eq!(first, format!("[0 earlier] where do I start? -> think about {question}"));
    let second = service.ask(&mut active, "is it a double?").await.unwrap();
    assert!(second.starts_with("[2 earlier]"));

    fx.oracle.fail_tutor.store(true, Ordering::SeqCst);
    assert_eq!(service.ask(&mut active, "help").await.unwrap(), TUTOR_FALLBACK_REPLY);

    let roles: Vec<ChatRole> = active.conversation().iter().map(|t| t.role).collect();
    assert_eq!(roles.len(), 6);
    assert_eq!(roles[0], ChatRole::Student);
    assert_eq!(roles[5], ChatRole::Tutor);
    assert_eq!(active.conversation()[0].content, "where do I start?");

    assert!(matches!(
        service.ask(&mut active, "   ").await,
        Err(SessionError::InvalidTransition { .. })
    ));
    assert!(matches!(
        fx.service.ask(&mut active, "hello?").await,
        Err(SessionError::TutorUnavailable { .. })
    ));
}
