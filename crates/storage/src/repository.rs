use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tutor_core::model::{
    InteractionId, NewInteraction, QuestionInteraction, SessionId, SessionRecord, SessionStatus,
    StudentId, StudentProfile, StudentProgress, Topic, TopicId,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Students and curriculum topics. Read-mostly; written by seeding.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Persist or update a student profile.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the profile cannot be stored.
    async fn upsert_student(&self, student: &StudentProfile) -> Result<(), StorageError>;

    /// Fetch a student by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_student(&self, id: StudentId) -> Result<StudentProfile, StorageError>;

    /// Persist or update a topic.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if another topic already uses the same code.
    async fn upsert_topic(&self, topic: &Topic) -> Result<(), StorageError>;

    /// Fetch a topic by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_topic(&self, id: TopicId) -> Result<Topic, StorageError>;

    /// All topics ordered by level, then code.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_topics(&self) -> Result<Vec<Topic>, StorageError>;
}

/// Learning sessions, including the stored batch snapshot and summary.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a new session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the ID is already used.
    async fn create_session(&self, session: &SessionRecord) -> Result<(), StorageError>;

    /// Fetch a session by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn load_session(&self, id: SessionId) -> Result<SessionRecord, StorageError>;

    /// Overwrite the mutable parts of an existing session (status, end time,
    /// completed count, batch snapshot, summary).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session was never created.
    async fn save_session(&self, session: &SessionRecord) -> Result<(), StorageError>;

    /// Most recently started in-progress session for the pair, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_in_progress(
        &self,
        student_id: StudentId,
        topic_id: TopicId,
    ) -> Result<Option<SessionRecord>, StorageError>;

    /// Completed sessions for the pair, newest `ended_at` first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn recent_completed(
        &self,
        student_id: StudentId,
        topic_id: TopicId,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, StorageError>;

    /// Every session of a student, newest `started_at` first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_sessions(&self, student_id: StudentId)
    -> Result<Vec<SessionRecord>, StorageError>;
}

/// Question interactions.
#[async_trait]
pub trait InteractionRepository: Send + Sync {
    /// Insert an interaction, or update the latest one with the same question
    /// text in the same session.
    ///
    /// An update only rewrites the answer fields (answer, verdict, evaluation,
    /// hints used, and the correct answer when the draft has one); a draft
    /// with no student answer leaves an existing row untouched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn save_interaction(
        &self,
        interaction: &NewInteraction,
    ) -> Result<QuestionInteraction, StorageError>;

    /// Interactions of one session in creation order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn load_interactions(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<QuestionInteraction>, StorageError>;

    /// Every interaction of a student in creation order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_student_interactions(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<QuestionInteraction>, StorageError>;
}

/// Per (student, topic) progress records.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Insert or replace the record for its (student, topic) pair.
    ///
    /// A stored `mastered_at` is never cleared by a later write.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert_progress(&self, progress: &StudentProgress) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_progress(
        &self,
        student_id: StudentId,
        topic_id: TopicId,
    ) -> Result<Option<StudentProgress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_progress(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<StudentProgress>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct InteractionLog {
    rows: Vec<QuestionInteraction>,
    next_id: i64,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    students: Arc<Mutex<HashMap<StudentId, StudentProfile>>>,
    topics: Arc<Mutex<HashMap<TopicId, Topic>>>,
    sessions: Arc<Mutex<HashMap<SessionId, SessionRecord>>>,
    interactions: Arc<Mutex<InteractionLog>>,
    progress: Arc<Mutex<HashMap<(StudentId, TopicId), StudentProgress>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Connection(e.to_string()))
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn upsert_student(&self, student: &StudentProfile) -> Result<(), StorageError> {
        lock(&self.students)?.insert(student.id, student.clone());
        Ok(())
    }

    async fn get_student(&self, id: StudentId) -> Result<StudentProfile, StorageError> {
        lock(&self.students)?
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn upsert_topic(&self, topic: &Topic) -> Result<(), StorageError> {
        let mut guard = lock(&self.topics)?;
        if guard
            .values()
            .any(|t| t.code == topic.code && t.id != topic.id)
        {
            return Err(StorageError::Conflict);
        }
        guard.insert(topic.id, topic.clone());
        Ok(())
    }

    async fn get_topic(&self, id: TopicId) -> Result<Topic, StorageError> {
        lock(&self.topics)?
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_topics(&self) -> Result<Vec<Topic>, StorageError> {
        let mut topics: Vec<Topic> = lock(&self.topics)?.values().cloned().collect();
        topics.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.code.cmp(&b.code)));
        Ok(topics)
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn create_session(&self, session: &SessionRecord) -> Result<(), StorageError> {
        let mut guard = lock(&self.sessions)?;
        if guard.contains_key(&session.id()) {
            return Err(StorageError::Conflict);
        }
        guard.insert(session.id(), session.clone());
        Ok(())
    }

    async fn load_session(&self, id: SessionId) -> Result<SessionRecord, StorageError> {
        lock(&self.sessions)?
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn save_session(&self, session: &SessionRecord) -> Result<(), StorageError> {
        let mut guard = lock(&self.sessions)?;
        let slot = guard.get_mut(&session.id()).ok_or(StorageError::NotFound)?;
        *slot = session.clone();
        Ok(())
    }

    async fn find_in_progress(
        &self,
        student_id: StudentId,
        topic_id: TopicId,
    ) -> Result<Option<SessionRecord>, StorageError> {
        Ok(lock(&self.sessions)?
            .values()
            .filter(|s| {
                s.student_id() == student_id && s.topic_id() == topic_id && s.is_in_progress()
            })
            .max_by_key(|s| s.started_at())
            .cloned())
    }

    async fn recent_completed(
        &self,
        student_id: StudentId,
        topic_id: TopicId,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, StorageError> {
        let mut completed: Vec<SessionRecord> = lock(&self.sessions)?
            .values()
            .filter(|s| {
                s.student_id() == student_id
                    && s.topic_id() == topic_id
                    && s.status() == SessionStatus::Completed
            })
            .cloned()
            .collect();
        completed.sort_by(|a, b| b.ended_at().cmp(&a.ended_at()));
        completed.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(completed)
    }

    async fn list_sessions(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<SessionRecord>, StorageError> {
        let mut sessions: Vec<SessionRecord> = lock(&self.sessions)?
            .values()
            .filter(|s| s.student_id() == student_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.started_at().cmp(&a.started_at()));
        Ok(sessions)
    }
}

#[async_trait]
impl InteractionRepository for InMemoryRepository {
    async fn save_interaction(
        &self,
        interaction: &NewInteraction,
    ) -> Result<QuestionInteraction, StorageError> {
        let mut guard = lock(&self.interactions)?;

        let existing = guard.rows.iter_mut().rev().find(|row| {
            row.session_id == interaction.session_id
                && row.question_text == interaction.question_text
        });
        if let Some(row) = existing {
            if interaction.student_answer.is_some() {
                row.student_answer.clone_from(&interaction.student_answer);
                row.is_correct = interaction.is_correct;
                row.evaluation.clone_from(&interaction.evaluation);
                row.hints_used = interaction.hints_used;
                if interaction.correct_answer.is_some() {
                    row.correct_answer.clone_from(&interaction.correct_answer);
                }
            }
            return Ok(row.clone());
        }

        guard.next_id += 1;
        let row = interaction
            .clone()
            .into_interaction(InteractionId::new(guard.next_id));
        guard.rows.push(row.clone());
        Ok(row)
    }

    async fn load_interactions(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<QuestionInteraction>, StorageError> {
        Ok(lock(&self.interactions)?
            .rows
            .iter()
            .filter(|row| row.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn list_student_interactions(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<QuestionInteraction>, StorageError> {
        Ok(lock(&self.interactions)?
            .rows
            .iter()
            .filter(|row| row.student_id == student_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn upsert_progress(&self, progress: &StudentProgress) -> Result<(), StorageError> {
        let key = (progress.student_id(), progress.topic_id());
        let mut guard = lock(&self.progress)?;
        let keep_mastered = guard
            .get(&key)
            .and_then(StudentProgress::mastered_at)
            .filter(|_| progress.mastered_at().is_none());
        let record = match keep_mastered {
            Some(mastered_at) => StudentProgress::from_persisted(
                progress.student_id(),
                progress.topic_id(),
                progress.skill_level(),
                progress.confidence_score(),
                progress.questions_attempted(),
                progress.questions_correct(),
                progress.last_practiced_at(),
                Some(mastered_at),
                progress.strengths().to_vec(),
                progress.weaknesses().to_vec(),
            )
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
            None => progress.clone(),
        };
        guard.insert(key, record);
        Ok(())
    }

    async fn get_progress(
        &self,
        student_id: StudentId,
        topic_id: TopicId,
    ) -> Result<Option<StudentProgress>, StorageError> {
        Ok(lock(&self.progress)?.get(&(student_id, topic_id)).cloned())
    }

    async fn list_progress(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<StudentProgress>, StorageError> {
        Ok(lock(&self.progress)?
            .values()
            .filter(|p| p.student_id() == student_id)
            .cloned()
            .collect())
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CatalogRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub interactions: Arc<dyn InteractionRepository>,
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self::from_repository(repo)
    }

    /// Share one backend across every repository slot.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: CatalogRepository
            + SessionRepository
            + InteractionRepository
            + ProgressRepository
            + Clone
            + 'static,
    {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo.clone());
        let sessions: Arc<dyn SessionRepository> = Arc::new(repo.clone());
        let interactions: Arc<dyn InteractionRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo);
        Self {
            catalog,
            sessions,
            interactions,
            progress,
        }
    }
}
