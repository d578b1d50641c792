use std::collections::BTreeSet;
use std::sync::Arc;

use storage::repository::{InteractionRepository, ProgressRepository, SessionRepository};
use tutor_core::badges::{self, BadgeCategory, BadgeDefinition, BadgeId, StudentStats};
use tutor_core::model::{SessionStatus, SkillLevel, StudentId};

use crate::error::BadgeServiceError;
use crate::Clock;

/// Derives a student's stats and badges from stored history.
#[derive(Clone)]
pub struct BadgeService {
    clock: Clock,
    sessions: Arc<dyn SessionRepository>,
    interactions: Arc<dyn InteractionRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl BadgeService {
    #[must_use]
    pub fn new(
        clock: Clock,
        sessions: Arc<dyn SessionRepository>,
        interactions: Arc<dyn InteractionRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            sessions,
            interactions,
            progress,
        }
    }

    /// Aggregate counters for a student.
    ///
    /// Only scored interactions count. The daily streak runs over UTC days
    /// with a completed session.
    ///
    /// # Errors
    ///
    /// Returns `BadgeServiceError::Storage` if repository access fails.
    pub async fn student_stats(
        &self,
        student_id: StudentId,
    ) -> Result<StudentStats, BadgeServiceError> {
        let answered: Vec<bool> = self
            .interactions
            .list_student_interactions(student_id)
            .await?
            .into_iter()
            .filter_map(|row| row.is_correct)
            .collect();
        let total = u32::try_from(answered.len()).unwrap_or(u32::MAX);
        let correct = u32::try_from(answered.iter().filter(|c| **c).count()).unwrap_or(u32::MAX);

        let topics_mastered = self
            .progress
            .list_progress(student_id)
            .await?
            .iter()
            .filter(|p| p.skill_level() == SkillLevel::Mastered)
            .count();

        let completed: Vec<_> = self
            .sessions
            .list_sessions(student_id)
            .await?
            .into_iter()
            .filter(|s| s.status() == SessionStatus::Completed)
            .collect();
        let active_days: BTreeSet<_> = completed
            .iter()
            .filter_map(|s| s.ended_at())
            .map(|at| at.date_naive())
            .collect();

        Ok(StudentStats {
            topics_mastered: u32::try_from(topics_mastered).unwrap_or(u32::MAX),
            total_sessions: u32::try_from(completed.len()).unwrap_or(u32::MAX),
            current_streak: badges::current_correct_streak(answered.iter().rev().copied()),
            daily_streak: badges::daily_streak(&active_days, self.clock.today()),
            ..StudentStats::from_counts(total, correct)
        })
    }

    /// Badges the student currently qualifies for.
    ///
    /// # Errors
    ///
    /// Returns `BadgeServiceError::Storage` if repository access fails.
    pub async fn earned_badges(
        &self,
        student_id: StudentId,
    ) -> Result<BTreeSet<BadgeId>, BadgeServiceError> {
        let stats = self.student_stats(student_id).await?;
        Ok(badges::evaluate(&stats))
    }

    /// The next badge to aim for, optionally within one category.
    ///
    /// # Errors
    ///
    /// Returns `BadgeServiceError::Storage` if repository access fails.
    pub async fn next_badge(
        &self,
        student_id: StudentId,
        category: Option<BadgeCategory>,
    ) -> Result<Option<&'static BadgeDefinition>, BadgeServiceError> {
        let earned = self.earned_badges(student_id).await?;
        Ok(badges::next_badge(&earned, category))
    }
}
