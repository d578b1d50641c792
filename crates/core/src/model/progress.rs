use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{SkillLevel, StudentId, TopicId};
use crate::scoring::{self, BatchScore, ScoreSnapshot};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("questions correct ({correct}) exceeds questions attempted ({attempted})")]
    CorrectExceedsAttempted { attempted: u32, correct: u32 },

    #[error("confidence score must be within [0, 1], got {0}")]
    InvalidConfidence(f64),

    #[error("mastered_at is set but skill level is {0}")]
    MasteredAtWithoutMastery(SkillLevel),
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Per (student, topic) progress.
///
/// Created on the first completed batch for the pair, updated after every
/// completed session, never deleted. `mastered_at` is written once.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentProgress {
    student_id: StudentId,
    topic_id: TopicId,
    skill_level: SkillLevel,
    confidence_score: f64,
    questions_attempted: u32,
    questions_correct: u32,
    last_practiced_at: Option<DateTime<Utc>>,
    mastered_at: Option<DateTime<Utc>>,
    strengths: Vec<String>,
    weaknesses: Vec<String>,
}

impl StudentProgress {
    /// Fresh record for a pair that has never been practiced.
    #[must_use]
    pub fn new(student_id: StudentId, topic_id: TopicId) -> Self {
        Self {
            student_id,
            topic_id,
            skill_level: SkillLevel::NotStarted,
            confidence_score: 0.0,
            questions_attempted: 0,
            questions_correct: 0,
            last_practiced_at: None,
            mastered_at: None,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
        }
    }

    /// Rehydrate a progress record from storage.
    ///
    /// `mastered_at` may outlive a later drop in skill level, but cannot exist
    /// for a pair that was never practiced.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` when the persisted counters are inconsistent.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        student_id: StudentId,
        topic_id: TopicId,
        skill_level: SkillLevel,
        confidence_score: f64,
        questions_attempted: u32,
        questions_correct: u32,
        last_practiced_at: Option<DateTime<Utc>>,
        mastered_at: Option<DateTime<Utc>>,
        strengths: Vec<String>,
        weaknesses: Vec<String>,
    ) -> Result<Self, ProgressError> {
        if questions_correct > questions_attempted {
            return Err(ProgressError::CorrectExceedsAttempted {
                attempted: questions_attempted,
                correct: questions_correct,
            });
        }
        if !confidence_score.is_finite() || !(0.0..=1.0).contains(&confidence_score) {
            return Err(ProgressError::InvalidConfidence(confidence_score));
        }
        if mastered_at.is_some() && skill_level == SkillLevel::NotStarted {
            return Err(ProgressError::MasteredAtWithoutMastery(skill_level));
        }

        Ok(Self {
            student_id,
            topic_id,
            skill_level,
            confidence_score,
            questions_attempted,
            questions_correct,
            last_practiced_at,
            mastered_at,
            strengths,
            weaknesses,
        })
    }

    #[must_use]
    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    #[must_use]
    pub fn topic_id(&self) -> TopicId {
        self.topic_id
    }

    #[must_use]
    pub fn skill_level(&self) -> SkillLevel {
        self.skill_level
    }

    #[must_use]
    pub fn confidence_score(&self) -> f64 {
        self.confidence_score
    }

    #[must_use]
    pub fn questions_attempted(&self) -> u32 {
        self.questions_attempted
    }

    #[must_use]
    pub fn questions_correct(&self) -> u32 {
        self.questions_correct
    }

    #[must_use]
    pub fn last_practiced_at(&self) -> Option<DateTime<Utc>> {
        self.last_practiced_at
    }

    #[must_use]
    pub fn mastered_at(&self) -> Option<DateTime<Utc>> {
        self.mastered_at
    }

    #[must_use]
    pub fn strengths(&self) -> &[String] {
        &self.strengths
    }

    #[must_use]
    pub fn weaknesses(&self) -> &[String] {
        &self.weaknesses
    }

    #[must_use]
    pub fn snapshot(&self) -> ScoreSnapshot {
        ScoreSnapshot {
            confidence: self.confidence_score,
            attempted: self.questions_attempted,
            correct: self.questions_correct,
        }
    }

    /// Lifetime accuracy as a percentage, `None` before the first attempt.
    #[must_use]
    pub fn lifetime_accuracy_percent(&self) -> Option<f64> {
        if self.questions_attempted == 0 {
            return None;
        }
        Some(f64::from(self.questions_correct) / f64::from(self.questions_attempted) * 100.0)
    }

    /// Fold a completed batch into this record.
    ///
    /// Recomputes confidence and skill level, stamps `last_practiced_at`, and
    /// sets `mastered_at` the first time the level reaches `Mastered`.
    /// New weaknesses are appended without duplicates.
    pub fn apply_batch(&mut self, batch: BatchScore, weaknesses: &[String], now: DateTime<Utc>) {
        let next = scoring::update(self.snapshot(), batch);
        self.confidence_score = next.confidence;
        self.questions_attempted = next.attempted;
        self.questions_correct = next.correct;
        self.skill_level = next.skill_level();
        self.last_practiced_at = Some(now);

        if self.skill_level == SkillLevel::Mastered && self.mastered_at.is_none() {
            self.mastered_at = Some(now);
        }

        for weakness in weaknesses {
            if !self.weaknesses.iter().any(|w| w == weakness) {
                self.weaknesses.push(weakness.clone());
            }
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn fresh() -> StudentProgress {
        StudentProgress::new(StudentId::generate(), TopicId::generate())
    }

    #[test]
    fn first_batch_creates_practicing_record() {
        let mut progress = fresh();
        progress.apply_batch(BatchScore::from_counts(5, 4), &[], fixed_now());

        assert_eq!(progress.questions_attempted(), 5);
        assert_eq!(progress.questions_correct(), 4);
        assert!((progress.confidence_score() - 0.8).abs() < 1e-9);
        assert_eq!(progress.skill_level(), SkillLevel::Practicing);
        assert_eq!(progress.last_practiced_at(), Some(fixed_now()));
        assert_eq!(progress.mastered_at(), None);
    }

    #[test]
    fn mastered_at_is_set_once() {
        let mut progress = fresh();
        let first = fixed_now();
        for _ in 0..4 {
            progress.apply_batch(BatchScore::from_counts(5, 5), &[], first);
        }
        assert_eq!(progress.skill_level(), SkillLevel::Mastered);
        assert_eq!(progress.mastered_at(), Some(first));

        let later = first + Duration::days(2);
        progress.apply_batch(BatchScore::from_counts(5, 0), &[], later);
        assert_eq!(progress.skill_level(), SkillLevel::Practicing);
        assert_eq!(progress.mastered_at(), Some(first));

        for _ in 0..10 {
            progress.apply_batch(BatchScore::from_counts(5, 5), &[], later);
        }
        assert_eq!(progress.mastered_at(), Some(first));
    }

    #[test]
    fn weaknesses_accumulate_without_duplicates() {
        let mut progress = fresh();
        progress.apply_batch(
            BatchScore::from_counts(2, 1),
            &["fractions".to_string()],
            fixed_now(),
        );
        progress.apply_batch(
            BatchScore::from_counts(2, 1),
            &["fractions".to_string(), "ratios".to_string()],
            fixed_now(),
        );
        assert_eq!(progress.weaknesses(), ["fractions", "ratios"]);
    }

    #[test]
    fn from_persisted_rejects_inconsistent_counts() {
        let err = StudentProgress::from_persisted(
            StudentId::generate(),
            TopicId::generate(),
            SkillLevel::Learning,
            0.5,
            3,
            4,
            None,
            None,
            Vec::new(),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::CorrectExceedsAttempted { .. }));

        let err = StudentProgress::from_persisted(
            StudentId::generate(),
            TopicId::generate(),
            SkillLevel::Learning,
            1.5,
            3,
            2,
            None,
            None,
            Vec::new(),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::InvalidConfidence(_)));
    }

    #[test]
    fn lifetime_accuracy_is_none_before_attempts() {
        let mut progress = fresh();
        assert_eq!(progress.lifetime_accuracy_percent(), None);
        progress.apply_batch(BatchScore::from_counts(4, 3), &[], fixed_now());
        assert_eq!(progress.lifetime_accuracy_percent(), Some(75.0));
    }
}
