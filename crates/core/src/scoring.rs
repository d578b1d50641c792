//! Rolling confidence and skill-level computation.
//!
//! Everything here is pure: callers load the previous snapshot, fold a finished
//! batch into it and persist the result themselves.

use crate::model::{Evaluation, SkillLevel};

/// Confidence at or above which a topic can be mastered.
pub const MASTERED_CONFIDENCE: f64 = 0.9;
/// Attempts required before a topic can be mastered.
pub const MASTERED_MIN_ATTEMPTS: u32 = 20;
/// Confidence at or above which a topic counts as practicing.
pub const PRACTICING_CONFIDENCE: f64 = 0.7;
/// Attempts required for the confidence-based practicing rule.
pub const PRACTICING_MIN_ATTEMPTS: u32 = 10;
/// Attempts after which a topic is practicing regardless of confidence.
pub const PRACTICING_ANY_CONFIDENCE_ATTEMPTS: u32 = 5;

/// Cumulative score for a (student, topic) pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreSnapshot {
    pub confidence: f64,
    pub attempted: u32,
    pub correct: u32,
}

/// Result of one finished batch of questions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchScore {
    /// Fraction of the batch answered correctly, in `[0, 1]`.
    pub accuracy: f64,
    pub attempted: u32,
    pub correct: u32,
}

impl BatchScore {
    /// Build a batch score from raw counts; accuracy is `correct / attempted` (0 for an empty batch).
    #[must_use]
    pub fn from_counts(attempted: u32, correct: u32) -> Self {
        let correct = correct.min(attempted);
        let accuracy = if attempted == 0 {
            0.0
        } else {
            f64::from(correct) / f64::from(attempted)
        };
        Self {
            accuracy,
            attempted,
            correct,
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Fold a batch into the previous snapshot.
///
/// Confidence is the attempt-weighted mean of the previous confidence and the
/// batch accuracy, or simply the batch accuracy when nothing was attempted before.
#[must_use]
pub fn update(previous: ScoreSnapshot, batch: BatchScore) -> ScoreSnapshot {
    let batch_accuracy = clamp_unit(batch.accuracy);
    let attempted = previous.attempted.saturating_add(batch.attempted);
    let correct = previous
        .correct
        .saturating_add(batch.correct)
        .min(attempted);

    let confidence = if previous.attempted == 0 {
        batch_accuracy
    } else if batch.attempted == 0 {
        clamp_unit(previous.confidence)
    } else {
        let prev_weight = f64::from(previous.attempted);
        let batch_weight = f64::from(batch.attempted);
        clamp_unit(
            (clamp_unit(previous.confidence) * prev_weight + batch_accuracy * batch_weight)
                / (prev_weight + batch_weight),
        )
    };

    ScoreSnapshot {
        confidence,
        attempted,
        correct,
    }
}

/// Skill level as a pure function of confidence and attempt count.
///
/// Rules are checked top-down: mastered, then the two practicing rules, then learning.
#[must_use]
pub fn skill_level_for(confidence: f64, attempted: u32) -> SkillLevel {
    if attempted == 0 {
        return SkillLevel::NotStarted;
    }
    if confidence >= MASTERED_CONFIDENCE && attempted >= MASTERED_MIN_ATTEMPTS {
        return SkillLevel::Mastered;
    }
    if (confidence >= PRACTICING_CONFIDENCE && attempted >= PRACTICING_MIN_ATTEMPTS)
        || attempted >= PRACTICING_ANY_CONFIDENCE_ATTEMPTS
    {
        return SkillLevel::Practicing;
    }
    SkillLevel::Learning
}

impl ScoreSnapshot {
    #[must_use]
    pub fn skill_level(&self) -> SkillLevel {
        skill_level_for(self.confidence, self.attempted)
    }
}

/// Recency-weighted mean of accuracy scores, newest first, rounded to two decimals.
///
/// The i-th score carries weight `exp(-i / 5)`. Returns 0 for an empty slice.
#[must_use]
pub fn weighted_confidence(newest_first: &[f64]) -> f64 {
    if newest_first.is_empty() {
        return 0.0;
    }
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for (index, score) in newest_first.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let weight = (-(index as f64) / 5.0).exp();
        weighted_sum += clamp_unit(*score) * weight;
        total_weight += weight;
    }
    ((weighted_sum / total_weight) * 100.0).round() / 100.0
}

/// Distinct, trimmed weaknesses named by a set of evaluations, in first-seen order.
#[must_use]
pub fn extract_weaknesses<'a>(evaluations: impl IntoIterator<Item = &'a Evaluation>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for evaluation in evaluations {
        let Some(weakness) = evaluation.identified_weakness.as_deref() else {
            continue;
        };
        let weakness = weakness.trim();
        if !weakness.is_empty() && !out.iter().any(|w| w == weakness) {
            out.push(weakness.to_string());
        }
    }
    out
}

/// Coarse band for the end-of-session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceBand {
    Excellent,
    Great,
    Good,
    Fair,
    KeepGoing,
}

impl PerformanceBand {
    #[must_use]
    pub fn for_counts(correct: u32, total: u32) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            f64::from(correct.min(total)) / f64::from(total) * 100.0
        };
        match percent {
            p if p >= 90.0 => PerformanceBand::Excellent,
            p if p >= 75.0 => PerformanceBand::Great,
            p if p >= 60.0 => PerformanceBand::Good,
            p if p >= 40.0 => PerformanceBand::Fair,
            _ => PerformanceBand::KeepGoing,
        }
    }

    #[must_use]
    pub fn message(self, first_name: &str) -> String {
        match self {
            PerformanceBand::Excellent => {
                format!("Excellent work, {first_name}! You're mastering this topic!")
            }
            PerformanceBand::Great => {
                format!("Great job, {first_name}! You're doing really well! Keep it up!")
            }
            PerformanceBand::Good => {
                format!("Good effort, {first_name}! You're making solid progress!")
            }
            PerformanceBand::Fair => format!(
                "Nice try, {first_name}! You're learning and improving! Keep practicing!"
            ),
            PerformanceBand::KeepGoing => format!(
                "Keep going, {first_name}! Every mistake is a chance to learn something new!"
            ),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
