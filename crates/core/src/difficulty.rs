//! Adaptive difficulty for the next question batch.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{SkillLevel, StudentProgress};

/// How many completed sessions feed the recent-accuracy mean.
pub const RECENT_SESSION_WINDOW: usize = 3;

/// Directive passed to the question generator alongside the skill level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdaptiveInstruction {
    StepBack,
    SlowDown,
    Consolidate,
    StandardProgression,
    Challenge,
}

impl AdaptiveInstruction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AdaptiveInstruction::StepBack => "STEP_BACK",
            AdaptiveInstruction::SlowDown => "SLOW_DOWN",
            AdaptiveInstruction::Consolidate => "CONSOLIDATE",
            AdaptiveInstruction::StandardProgression => "STANDARD_PROGRESSION",
            AdaptiveInstruction::Challenge => "CHALLENGE",
        }
    }

    /// Short student-facing description of the adjustment.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            AdaptiveInstruction::StepBack => "simpler questions to rebuild the basics",
            AdaptiveInstruction::SlowDown => "a gentler pace with more scaffolding",
            AdaptiveInstruction::Consolidate => "more practice at this level",
            AdaptiveInstruction::StandardProgression => "keep building at a steady pace",
            AdaptiveInstruction::Challenge => "harder questions to stretch you",
        }
    }

    /// Tier for a recent accuracy percentage. First matching row wins.
    #[must_use]
    pub fn for_accuracy(recent_accuracy_percent: f64) -> Self {
        match recent_accuracy_percent {
            p if p < 40.0 => AdaptiveInstruction::StepBack,
            p if p < 60.0 => AdaptiveInstruction::SlowDown,
            p if p < 70.0 => AdaptiveInstruction::Consolidate,
            p if p < 85.0 => AdaptiveInstruction::StandardProgression,
            _ => AdaptiveInstruction::Challenge,
        }
    }
}

impl fmt::Display for AdaptiveInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of [`recommend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// `None` when there was no history to adapt from.
    pub instruction: Option<AdaptiveInstruction>,
    pub recommended_skill_level: SkillLevel,
}

impl Recommendation {
    /// Stored level passed through without adaptation.
    #[must_use]
    pub fn pass_through(level: SkillLevel) -> Self {
        Self {
            instruction: None,
            recommended_skill_level: level,
        }
    }
}

/// Map the stored level and recent accuracy to the next batch's directive.
///
/// NaN accuracy is treated as 0.
#[must_use]
pub fn recommend(level: SkillLevel, recent_accuracy_percent: f64) -> Recommendation {
    let accuracy = if recent_accuracy_percent.is_nan() {
        0.0
    } else {
        recent_accuracy_percent
    };
    let instruction = AdaptiveInstruction::for_accuracy(accuracy);

    let recommended_skill_level = match (instruction, level) {
        (AdaptiveInstruction::StepBack, _) => SkillLevel::Learning,
        (AdaptiveInstruction::StandardProgression, SkillLevel::Learning) => SkillLevel::Practicing,
        (AdaptiveInstruction::Challenge, SkillLevel::Practicing) => SkillLevel::Mastered,
        (_, unchanged) => unchanged,
    };

    Recommendation {
        instruction: Some(instruction),
        recommended_skill_level,
    }
}

/// Recent accuracy for the policy.
///
/// Mean of the newest [`RECENT_SESSION_WINDOW`] completed-session accuracies
/// (newest first), else the lifetime ratio from `progress`. `None` means there
/// is no history at all.
#[must_use]
pub fn recent_accuracy(
    newest_session_accuracies: &[u32],
    progress: Option<&StudentProgress>,
) -> Option<f64> {
    let window: Vec<f64> = newest_session_accuracies
        .iter()
        .take(RECENT_SESSION_WINDOW)
        .map(|&a| f64::from(a.min(100)))
        .collect();
    if !window.is_empty() {
        #[allow(clippy::cast_precision_loss)]
        let len = window.len() as f64;
        return Some(window.iter().sum::<f64>() / len);
    }
    progress.and_then(StudentProgress::lifetime_accuracy_percent)
}

/// Directive for the next batch, skipping adaptation when there is no history.
#[must_use]
pub fn recommend_for_history(
    newest_session_accuracies: &[u32],
    progress: Option<&StudentProgress>,
) -> Recommendation {
    let level = progress.map_or(SkillLevel::NotStarted, StudentProgress::skill_level);
    match recent_accuracy(newest_session_accuracies, progress) {
        Some(accuracy) => recommend(level, accuracy),
        None => Recommendation::pass_through(level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StudentId, TopicId};
    use crate::scoring::BatchScore;
    use crate::time::fixed_now;

    #[test]
    fn tier_boundaries() {
        assert_eq!(AdaptiveInstruction::for_accuracy(39.9), AdaptiveInstruction::StepBack);
        assert_eq!(AdaptiveInstruction::for_accuracy(40.0), AdaptiveInstruction::SlowDown);
        assert_eq!(AdaptiveInstruction::for_accuracy(59.9), AdaptiveInstruction::SlowDown);
        assert_eq!(AdaptiveInstruction::for_accuracy(60.0), AdaptiveInstruction::Consolidate);
        assert_eq!(
            AdaptiveInstruction::for_accuracy(70.0),
            AdaptiveInstruction::StandardProgression
        );
        assert_eq!(
            AdaptiveInstruction::for_accuracy(84.9),
            AdaptiveInstruction::StandardProgression
        );
        assert_eq!(AdaptiveInstruction::for_accuracy(85.0), AdaptiveInstruction::Challenge);
        assert_eq!(AdaptiveInstruction::for_accuracy(100.0), AdaptiveInstruction::Challenge);
    }

    #[test]
    fn step_back_forces_learning() {
        let rec = recommend(SkillLevel::Mastered, 20.0);
        assert_eq!(rec.instruction, Some(AdaptiveInstruction::StepBack));
        assert_eq!(rec.recommended_skill_level, SkillLevel::Learning);
    }

    #[test]
    fn middle_tiers_keep_level() {
        assert_eq!(
            recommend(SkillLevel::Practicing, 45.0).recommended_skill_level,
            SkillLevel::Practicing
        );
        assert_eq!(
            recommend(SkillLevel::Learning, 65.0).recommended_skill_level,
            SkillLevel::Learning
        );
    }

    #[test]
    fn standard_progression_promotes_learning_only() {
        assert_eq!(
            recommend(SkillLevel::Learning, 75.0).recommended_skill_level,
            SkillLevel::Practicing
        );
        assert_eq!(
            recommend(SkillLevel::Practicing, 75.0).recommended_skill_level,
            SkillLevel::Practicing
        );
    }

    #[test]
    fn challenge_promotes_practicing_to_mastered() {
        let rec = recommend(SkillLevel::Practicing, 92.0);
        assert_eq!(rec.instruction, Some(AdaptiveInstruction::Challenge));
        assert_eq!(rec.recommended_skill_level, SkillLevel::Mastered);

        assert_eq!(
            recommend(SkillLevel::Learning, 92.0).recommended_skill_level,
            SkillLevel::Learning
        );
    }

    #[test]
    fn recent_accuracy_uses_last_three_sessions() {
        assert_eq!(recent_accuracy(&[90, 60, 30, 0], None), Some(60.0));
        assert_eq!(recent_accuracy(&[80], None), Some(80.0));
    }

    #[test]
    fn recent_accuracy_falls_back_to_lifetime_ratio() {
        let mut progress = StudentProgress::new(StudentId::generate(), TopicId::generate());
        assert_eq!(recent_accuracy(&[], Some(&progress)), None);

        progress.apply_batch(BatchScore::from_counts(10, 7), &[], fixed_now());
        assert_eq!(recent_accuracy(&[], Some(&progress)), Some(70.0));
    }

    #[test]
    fn no_history_passes_stored_level_through() {
        let rec = recommend_for_history(&[], None);
        assert_eq!(rec, Recommendation::pass_through(SkillLevel::NotStarted));
    }

    #[test]
    fn instruction_labels_serialize_in_upper_case() {
        let raw = serde_json::to_string(&AdaptiveInstruction::StandardProgression).unwrap();
        assert_eq!(raw, "\"STANDARD_PROGRESSION\"");
    }
}
