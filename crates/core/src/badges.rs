//! Achievement badges derived from cumulative statistics.
//!
//! Badges are never stored. [`evaluate`] recomputes the earned set from
//! counters every time, and every criterion is an "at least" threshold so the
//! set can only grow as the counters do.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

//
// ─── CATALOGUE ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeId {
    FirstAnswer,
    CuriousLearner,
    DedicatedStudent,
    MathChampion,
    MathLegend,
    SharpMind,
    Perfectionist,
    Flawless,
    Unstoppable,
    TopicMaster,
    SubjectExpert,
    MathGenius,
    DailyLearner,
    WeeklyWarrior,
    DedicationMaster,
    SpeedDemon,
    NightOwl,
    EarlyBird,
}

impl BadgeId {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BadgeId::FirstAnswer => "first_answer",
            BadgeId::CuriousLearner => "curious_learner",
            BadgeId::DedicatedStudent => "dedicated_student",
            BadgeId::MathChampion => "math_champion",
            BadgeId::MathLegend => "math_legend",
            BadgeId::SharpMind => "sharp_mind",
            BadgeId::Perfectionist => "perfectionist",
            BadgeId::Flawless => "flawless",
            BadgeId::Unstoppable => "unstoppable",
            BadgeId::TopicMaster => "topic_master",
            BadgeId::SubjectExpert => "subject_expert",
            BadgeId::MathGenius => "math_genius",
            BadgeId::DailyLearner => "daily_learner",
            BadgeId::WeeklyWarrior => "weekly_warrior",
            BadgeId::DedicationMaster => "dedication_master",
            BadgeId::SpeedDemon => "speed_demon",
            BadgeId::NightOwl => "night_owl",
            BadgeId::EarlyBird => "early_bird",
        }
    }

    /// Catalogue entry for this badge.
    #[must_use]
    pub fn definition(self) -> &'static BadgeDefinition {
        // every variant has exactly one row, in declaration order
        &BADGES[self as usize]
    }
}

impl fmt::Display for BadgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeCategory {
    Achievement,
    Performance,
    Mastery,
    Streak,
    Special,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeRarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

/// What a badge requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criteria {
    QuestionsAnswered(u32),
    /// At least 80% accuracy over at least this many questions.
    Accuracy80(u32),
    /// At least 90% accuracy over at least this many questions.
    Accuracy90(u32),
    /// Consecutive correct answers.
    Streak(u32),
    TopicsMastered(u32),
    /// Consecutive calendar days with a completed session.
    DailyStreak(u32),
    /// Needs per-session timing; not awarded from aggregate stats.
    SessionSpeed { max_seconds: u32 },
    LateNightSession,
    EarlyMorningSession,
}

impl Criteria {
    /// Whether aggregate stats alone can decide this criterion.
    #[must_use]
    pub fn is_evaluable(self) -> bool {
        !matches!(
            self,
            Criteria::SessionSpeed { .. } | Criteria::LateNightSession | Criteria::EarlyMorningSession
        )
    }

    fn is_met(self, stats: &StudentStats) -> bool {
        match self {
            Criteria::QuestionsAnswered(n) => stats.total_questions >= n,
            Criteria::Accuracy80(n) => stats.accuracy_percent >= 80 && stats.total_questions >= n,
            Criteria::Accuracy90(n) => stats.accuracy_percent >= 90 && stats.total_questions >= n,
            Criteria::Streak(n) => stats.current_streak >= n,
            Criteria::TopicsMastered(n) => stats.topics_mastered >= n,
            Criteria::DailyStreak(n) => stats.daily_streak >= n,
            Criteria::SessionSpeed { .. }
            | Criteria::LateNightSession
            | Criteria::EarlyMorningSession => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeDefinition {
    pub id: BadgeId,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub category: BadgeCategory,
    pub rarity: BadgeRarity,
    pub criteria: Criteria,
}

const fn badge(
    id: BadgeId,
    name: &'static str,
    description: &'static str,
    icon: &'static str,
    category: BadgeCategory,
    rarity: BadgeRarity,
    criteria: Criteria,
) -> BadgeDefinition {
    BadgeDefinition {
        id,
        name,
        description,
        icon,
        category,
        rarity,
        criteria,
    }
}

use BadgeCategory::{Achievement, Mastery, Performance, Special, Streak as StreakCategory};
use BadgeRarity::{Common, Epic, Legendary, Rare};

/// Full catalogue, in display order.
#[rustfmt::skip]
pub static BADGES: [BadgeDefinition; 18] = [
    badge(BadgeId::FirstAnswer, "First Steps", "Answered your first question", "👣", Achievement, Common, Criteria::QuestionsAnswered(1)),
    badge(BadgeId::CuriousLearner, "Curious Learner", "Answered 10 questions", "🤔", Achievement, Common, Criteria::QuestionsAnswered(10)),
    badge(BadgeId::DedicatedStudent, "Dedicated Student", "Answered 50 questions", "📚", Achievement, Rare, Criteria::QuestionsAnswered(50)),
    badge(BadgeId::MathChampion, "Math Champion", "Answered 100 questions", "🏆", Achievement, Epic, Criteria::QuestionsAnswered(100)),
    badge(BadgeId::MathLegend, "Math Legend", "Answered 250 questions", "⭐", Achievement, Legendary, Criteria::QuestionsAnswered(250)),
    badge(BadgeId::SharpMind, "Sharp Mind", "Achieved 80% accuracy on 10+ questions", "🎯", Performance, Common, Criteria::Accuracy80(10)),
    badge(BadgeId::Perfectionist, "Perfectionist", "Achieved 90% accuracy on 20+ questions", "💯", Performance, Rare, Criteria::Accuracy90(20)),
    badge(BadgeId::Flawless, "Flawless", "Answered 5 questions in a row correctly", "✨", Performance, Epic, Criteria::Streak(5)),
    badge(BadgeId::Unstoppable, "Unstoppable", "Answered 10 questions in a row correctly", "🔥", Performance, Legendary, Criteria::Streak(10)),
    badge(BadgeId::TopicMaster, "Topic Master", "Mastered your first topic", "🎓", Mastery, Rare, Criteria::TopicsMastered(1)),
    badge(BadgeId::SubjectExpert, "Subject Expert", "Mastered 3 topics", "🧠", Mastery, Epic, Criteria::TopicsMastered(3)),
    badge(BadgeId::MathGenius, "Math Genius", "Mastered 5 topics", "👑", Mastery, Legendary, Criteria::TopicsMastered(5)),
    badge(BadgeId::DailyLearner, "Daily Learner", "Learned for 3 days in a row", "📅", StreakCategory, Common, Criteria::DailyStreak(3)),
    badge(BadgeId::WeeklyWarrior, "Weekly Warrior", "Learned for 7 days in a row", "💪", StreakCategory, Rare, Criteria::DailyStreak(7)),
    badge(BadgeId::DedicationMaster, "Dedication Master", "Learned for 30 days in a row", "🌟", StreakCategory, Legendary, Criteria::DailyStreak(30)),
    badge(BadgeId::SpeedDemon, "Speed Demon", "Completed a session in under 10 minutes", "⚡", Special, Rare, Criteria::SessionSpeed { max_seconds: 600 }),
    badge(BadgeId::NightOwl, "Night Owl", "Completed a session after 9 PM", "🦉", Special, Common, Criteria::LateNightSession),
    badge(BadgeId::EarlyBird, "Early Bird", "Completed a session before 7 AM", "🐦", Special, Common, Criteria::EarlyMorningSession),
];

//
// ─── STATS ─────────────────────────────────────────────────────────────────────
//

/// Cumulative counters a student's badges are derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StudentStats {
    pub total_questions: u32,
    pub correct_questions: u32,
    /// Rounded percentage of correct answers.
    pub accuracy_percent: u32,
    pub topics_mastered: u32,
    pub total_sessions: u32,
    /// Trailing run of correct answers.
    pub current_streak: u32,
    /// Consecutive days with a completed session.
    pub daily_streak: u32,
}

impl StudentStats {
    /// Stats from raw counters, deriving `accuracy_percent`.
    #[must_use]
    pub fn from_counts(total_questions: u32, correct_questions: u32) -> Self {
        let correct_questions = correct_questions.min(total_questions);
        Self {
            total_questions,
            correct_questions,
            accuracy_percent: crate::model::accuracy_percent(correct_questions, total_questions),
            ..Self::default()
        }
    }
}

//
// ─── EVALUATION ────────────────────────────────────────────────────────────────
//

/// Every badge the stats satisfy.
#[must_use]
pub fn evaluate(stats: &StudentStats) -> BTreeSet<BadgeId> {
    BADGES
        .iter()
        .filter(|b| b.criteria.is_met(stats))
        .map(|b| b.id)
        .collect()
}

/// First catalogue badge not yet earned, optionally within one category.
#[must_use]
pub fn next_badge(
    earned: &BTreeSet<BadgeId>,
    category: Option<BadgeCategory>,
) -> Option<&'static BadgeDefinition> {
    BADGES
        .iter()
        .filter(|b| category.is_none_or(|c| b.category == c))
        .find(|b| !earned.contains(&b.id))
}

/// Length of the trailing run of `true` in `newest_first`.
#[must_use]
pub fn current_correct_streak(newest_first: impl IntoIterator<Item = bool>) -> u32 {
    let run = newest_first.into_iter().take_while(|correct| *correct).count();
    u32::try_from(run).unwrap_or(u32::MAX)
}

/// Consecutive days with activity, ending today or yesterday.
///
/// A streak that last ticked yesterday is still alive; one whose latest day is
/// older than that is broken and counts as 0.
#[must_use]
pub fn daily_streak(active_days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let yesterday = today - Duration::days(1);
    let mut cursor = if active_days.contains(&today) {
        today
    } else if active_days.contains(&yesterday) {
        yesterday
    } else {
        return 0;
    };

    let mut streak = 0_u32;
    while active_days.contains(&cursor) {
        streak = streak.saturating_add(1);
        cursor -= Duration::days(1);
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn catalogue_is_indexed_by_id() {
        for (index, definition) in BADGES.iter().enumerate() {
            assert_eq!(definition.id as usize, index);
            assert_eq!(definition.id.definition().name, definition.name);
        }
    }

    #[test]
    fn empty_stats_earn_nothing() {
        assert!(evaluate(&StudentStats::default()).is_empty());
    }

    #[test]
    fn thresholds_are_inclusive() {
        let mut stats = StudentStats::from_counts(10, 8);
        stats.current_streak = 5;
        stats.topics_mastered = 1;
        stats.daily_streak = 3;
        let earned = evaluate(&stats);
        let expected: BTreeSet<_> = [
            BadgeId::FirstAnswer,
            BadgeId::CuriousLearner,
            BadgeId::SharpMind,
            BadgeId::Flawless,
            BadgeId::TopicMaster,
            BadgeId::DailyLearner,
        ]
        .into_iter()
        .collect();
        assert_eq!(earned, expected);
    }

    #[test]
    fn accuracy_badges_need_volume() {
        let few = StudentStats::from_counts(9, 9);
        assert!(!evaluate(&few).contains(&BadgeId::SharpMind));

        let many = StudentStats::from_counts(20, 18);
        let earned = evaluate(&many);
        assert!(earned.contains(&BadgeId::SharpMind));
        assert!(earned.contains(&BadgeId::Perfectionist));
    }

    #[test]
    fn timing_badges_are_never_awarded() {
        let stats = StudentStats {
            total_questions: u32::MAX,
            correct_questions: u32::MAX,
            accuracy_percent: 100,
            topics_mastered: u32::MAX,
            total_sessions: u32::MAX,
            current_streak: u32::MAX,
            daily_streak: u32::MAX,
        };
        let earned = evaluate(&stats);
        assert_eq!(earned.len(), 15);
        for id in [BadgeId::SpeedDemon, BadgeId::NightOwl, BadgeId::EarlyBird] {
            assert!(!earned.contains(&id));
            assert!(!id.definition().criteria.is_evaluable());
        }
    }

    #[test]
    fn evaluate_is_idempotent() {
        let stats = StudentStats {
            current_streak: 7,
            daily_streak: 8,
            topics_mastered: 2,
            ..StudentStats::from_counts(64, 55)
        };
        assert_eq!(evaluate(&stats), evaluate(&stats));
    }

    #[test]
    fn evaluate_is_monotonic_in_every_counter() {
        let grid = [0_u32, 1, 3, 5, 10, 20, 50, 100, 250];
        let accuracies = [0_u32, 79, 80, 89, 90, 100];
        for &total in &grid {
            for &accuracy in &accuracies {
                for &other in &grid {
                    let base = StudentStats {
                        total_questions: total,
                        correct_questions: total / 2,
                        accuracy_percent: accuracy,
                        topics_mastered: other.min(6),
                        total_sessions: other,
                        current_streak: other,
                        daily_streak: other,
                    };
                    let bigger = StudentStats {
                        total_questions: total + 1,
                        correct_questions: base.correct_questions + 1,
                        accuracy_percent: (accuracy + 1).min(100),
                        topics_mastered: base.topics_mastered + 1,
                        total_sessions: other + 1,
                        current_streak: other + 1,
                        daily_streak: other + 1,
                    };
                    assert!(evaluate(&base).is_subset(&evaluate(&bigger)));
                }
            }
        }
    }

    #[test]
    fn next_badge_respects_category() {
        let earned: BTreeSet<_> = [BadgeId::FirstAnswer, BadgeId::TopicMaster].into_iter().collect();
        assert_eq!(next_badge(&earned, None).map(|b| b.id), Some(BadgeId::CuriousLearner));
        assert_eq!(
            next_badge(&earned, Some(BadgeCategory::Mastery)).map(|b| b.id),
            Some(BadgeId::SubjectExpert)
        );

        let all_mastery: BTreeSet<_> = BADGES
            .iter()
            .filter(|b| b.category == BadgeCategory::Mastery)
            .map(|b| b.id)
            .collect();
        assert!(next_badge(&all_mastery, Some(BadgeCategory::Mastery)).is_none());
    }

    #[test]
    fn correct_streak_counts_trailing_run() {
        assert_eq!(current_correct_streak([true, true, false, true]), 2);
        assert_eq!(current_correct_streak([false, true]), 0);
        assert_eq!(current_correct_streak(Vec::<bool>::new()), 0);
    }

    #[test]
    fn daily_streak_ends_today_or_yesterday() {
        let days: BTreeSet<_> = [day(1), day(2), day(3), day(5)].into_iter().collect();
        assert_eq!(daily_streak(&days, day(3)), 3);
        assert_eq!(daily_streak(&days, day(4)), 3);
        assert_eq!(daily_streak(&days, day(5)), 1);
        assert_eq!(daily_streak(&days, day(7)), 0);
        assert_eq!(daily_streak(&BTreeSet::new(), day(7)), 0);
    }
}
