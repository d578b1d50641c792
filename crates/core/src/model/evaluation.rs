use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::skill::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConceptualUnderstanding {
    Strong,
    #[default]
    Developing,
    NeedsWork,
}

impl ConceptualUnderstanding {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConceptualUnderstanding::Strong => "strong",
            ConceptualUnderstanding::Developing => "developing",
            ConceptualUnderstanding::NeedsWork => "needs_work",
        }
    }
}

impl FromStr for ConceptualUnderstanding {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strong" => Ok(ConceptualUnderstanding::Strong),
            "developing" => Ok(ConceptualUnderstanding::Developing),
            "needs_work" => Ok(ConceptualUnderstanding::NeedsWork),
            other => Err(ParseEnumError::new("conceptual understanding", other)),
        }
    }
}

/// Authoritative verdict on a submitted answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub is_correct: bool,
    pub accuracy_score: f64,
    pub feedback: String,
    #[serde(default)]
    pub conceptual_understanding: ConceptualUnderstanding,
    #[serde(default)]
    pub identified_weakness: Option<String>,
    #[serde(default)]
    pub suggested_hint: Option<String>,
    #[serde(default)]
    pub encouragement: String,
}

impl Evaluation {
    /// Verdict used when the evaluator could not be reached or answered garbage.
    ///
    /// Always incorrect so a failed call can never award credit.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            is_correct: false,
            accuracy_score: 0.0,
            feedback: "I'm having trouble evaluating your answer right now. Please try again or ask for help!"
                .to_string(),
            conceptual_understanding: ConceptualUnderstanding::Developing,
            identified_weakness: None,
            suggested_hint: None,
            encouragement: "Keep trying! You can do this!".to_string(),
        }
    }

    /// Clamp the accuracy score into `[0, 1]` (NaN becomes 0) and drop blank weaknesses.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.accuracy_score = if self.accuracy_score.is_finite() {
            self.accuracy_score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.identified_weakness = self
            .identified_weakness
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty());
        self
    }
}
