use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a stored label does not name a known variant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

/// Coarse mastery bucket for a (student, topic) pair.
///
/// Ordered from least to most advanced so comparisons read naturally
/// (`level >= SkillLevel::Practicing`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    #[default]
    NotStarted,
    Learning,
    Practicing,
    Mastered,
}

impl SkillLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SkillLevel::NotStarted => "not_started",
            SkillLevel::Learning => "learning",
            SkillLevel::Practicing => "practicing",
            SkillLevel::Mastered => "mastered",
        }
    }
}

impl fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkillLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(SkillLevel::NotStarted),
            "learning" => Ok(SkillLevel::Learning),
            "practicing" => Ok(SkillLevel::Practicing),
            "mastered" => Ok(SkillLevel::Mastered),
            other => Err(ParseEnumError::new("skill level", other)),
        }
    }
}
