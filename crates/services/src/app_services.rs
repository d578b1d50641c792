use std::sync::Arc;

use storage::repository::{CatalogRepository, Storage, StorageError};
use tutor_core::model::{StudentId, StudentProfile, Topic};

use crate::Clock;
use crate::badge_service::BadgeService;
use crate::error::AppServicesError;
use crate::oracle::{HttpOracle, QuestionOracle, TutorChat};
use crate::sessions::ProgressionService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    catalog: Arc<dyn CatalogRepository>,
    progression: Arc<ProgressionService>,
    badges: Arc<BadgeService>,
    oracle_enabled: bool,
}

impl AppServices {
    /// Build services backed by `SQLite` storage and the HTTP oracle from env.
    ///
    /// The same HTTP client serves as the tutor when credentials are set.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let oracle = Arc::new(HttpOracle::from_env());
        let oracle_enabled = oracle.enabled();
        let tutor = oracle_enabled.then(|| Arc::clone(&oracle) as Arc<dyn TutorChat>);
        Ok(Self::from_storage(&storage, clock, oracle, tutor).with_oracle_enabled(oracle_enabled))
    }

    /// Build services over existing storage, any oracle and an optional tutor.
    #[must_use]
    pub fn from_storage(
        storage: &Storage,
        clock: Clock,
        oracle: Arc<dyn QuestionOracle>,
        tutor: Option<Arc<dyn TutorChat>>,
    ) -> Self {
        let mut progression = ProgressionService::new(clock, storage, oracle);
        if let Some(tutor) = tutor {
            progression = progression.with_tutor(tutor);
        }
        let progression = Arc::new(progression);
        let badges = Arc::new(BadgeService::new(
            clock,
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.interactions),
            Arc::clone(&storage.progress),
        ));
        Self {
            catalog: Arc::clone(&storage.catalog),
            progression,
            badges,
            oracle_enabled: true,
        }
    }

    fn with_oracle_enabled(mut self, enabled: bool) -> Self {
        self.oracle_enabled = enabled;
        self
    }

    /// False when no oracle credentials were configured; sessions will fail to load.
    #[must_use]
    pub fn oracle_enabled(&self) -> bool {
        self.oracle_enabled
    }

    #[must_use]
    pub fn progression(&self) -> Arc<ProgressionService> {
        Arc::clone(&self.progression)
    }

    #[must_use]
    pub fn badges(&self) -> Arc<BadgeService> {
        Arc::clone(&self.badges)
    }

    /// Load a student profile.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::StudentNotFound` for an unknown id.
    pub async fn student(&self, student_id: StudentId) -> Result<StudentProfile, AppServicesError> {
        match self.catalog.get_student(student_id).await {
            Ok(student) => Ok(student),
            Err(StorageError::NotFound) => Err(AppServicesError::StudentNotFound { student_id }),
            Err(err) => Err(err.into()),
        }
    }

    /// Resolve a topic by code, or fall back to the first topic in the catalogue.
    ///
    /// # Errors
    ///
    /// Returns `TopicCodeNotFound` for an unknown code, `NoTopics` when the
    /// catalogue is empty, or storage errors.
    pub async fn resolve_topic(&self, code: Option<&str>) -> Result<Topic, AppServicesError> {
        let topics = self.catalog.list_topics().await?;
        match code {
            Some(code) => topics
                .into_iter()
                .find(|t| t.code.eq_ignore_ascii_case(code))
                .ok_or_else(|| AppServicesError::TopicCodeNotFound {
                    code: code.to_string(),
                }),
            None => topics.into_iter().next().ok_or(AppServicesError::NoTopics),
        }
    }

    /// Every topic in the catalogue.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn topics(&self) -> Result<Vec<Topic>, AppServicesError> {
        Ok(self.catalog.list_topics().await?)
    }
}
