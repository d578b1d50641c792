//! Advisory answer matching.
//!
//! [`quick_check`] is a cheap pre-check for optimistic feedback. It never
//! decides correctness; the evaluator's verdict always wins.

/// Confidence for an exact match after normalisation.
pub const EXACT_CONFIDENCE: f64 = 1.0;
/// Confidence for numbers within tolerance.
pub const NUMERIC_CONFIDENCE: f64 = 0.95;
/// Confidence when one answer contains the other.
pub const CONTAINS_CONFIDENCE: f64 = 0.7;

const CURRENCY_SYMBOLS: [char; 4] = ['$', '€', '£', '¥'];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuickCheck {
    pub likely_correct: bool,
    pub confidence: f64,
}

impl QuickCheck {
    const NO_MATCH: Self = Self {
        likely_correct: false,
        confidence: 0.0,
    };

    fn matched(confidence: f64) -> Self {
        Self {
            likely_correct: true,
            confidence,
        }
    }
}

/// Canonical comparison form of an answer.
///
/// Lowercases, trims, collapses whitespace, drops thousands separators and
/// currency symbols, then strips redundant zeros from plain numbers
/// (`"007"` becomes `"7"`, `"5.00"` becomes `"5"`, `"0.5"` stays).
#[must_use]
pub fn normalize(answer: &str) -> String {
    let collapsed = answer
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let stripped: String = collapsed
        .chars()
        .filter(|c| *c != ',' && !CURRENCY_SYMBOLS.contains(c))
        .collect();
    let stripped = stripped.trim();

    if stripped.parse::<f64>().is_ok() {
        canonical_number(stripped)
    } else {
        strip_leading_zeros(stripped).to_string()
    }
}

fn strip_leading_zeros(s: &str) -> &str {
    if s.is_empty() {
        return s;
    }
    let trimmed = s.trim_start_matches('0');
    if trimmed.len() == s.len() {
        s
    } else if trimmed.is_empty() || trimmed.starts_with('.') {
        // keep one zero so "0" and "0.5" survive
        &s[s.len() - trimmed.len() - 1..]
    } else {
        trimmed
    }
}

fn canonical_number(s: &str) -> String {
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.strip_prefix('+').unwrap_or(s)),
    };
    let digits = strip_leading_zeros(digits);
    let digits = if digits.contains('.') && !digits.contains(['e', 'E']) {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    };
    let digits = if digits.is_empty() { "0" } else { digits };
    if digits == "0" {
        return digits.to_string();
    }
    let lead = if digits.starts_with('.') { "0" } else { "" };
    format!("{sign}{lead}{digits}")
}

/// Heuristic match between a canonical answer and a student's answer.
///
/// Tiers, first match wins: exact after [`normalize`] (1.0), numeric within
/// `max(0.1% of |correct|, 0.01)` (0.95), either string contains the other (0.7).
/// Blank input on either side never matches.
#[must_use]
pub fn quick_check(correct: &str, student: &str) -> QuickCheck {
    let correct = normalize(correct);
    let student = normalize(student);
    if correct.is_empty() || student.is_empty() {
        return QuickCheck::NO_MATCH;
    }

    if correct == student {
        return QuickCheck::matched(EXACT_CONFIDENCE);
    }

    if let (Ok(c), Ok(s)) = (correct.parse::<f64>(), student.parse::<f64>()) {
        let tolerance = (c.abs() * 0.001).max(0.01);
        if (c - s).abs() < tolerance {
            return QuickCheck::matched(NUMERIC_CONFIDENCE);
        }
    }

    if correct.contains(student.as_str()) || student.contains(correct.as_str()) {
        return QuickCheck::matched(CONTAINS_CONFIDENCE);
    }

    QuickCheck::NO_MATCH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_and_trailing_zeros_match_exactly() {
        let check = quick_check("$5.00", "5");
        assert!(check.likely_correct);
        assert_eq!(check.confidence, EXACT_CONFIDENCE);
        assert_eq!(quick_check("5.00", "5").confidence, EXACT_CONFIDENCE);
    }

    #[test]
    fn normalisation_rules() {
        assert_eq!(normalize("  The   Answer IS 12 "), "the answer is 12");
        assert_eq!(normalize("1,250"), "1250");
        assert_eq!(normalize("007"), "7");
        assert_eq!(normalize("0"), "0");
        assert_eq!(normalize("0.50"), "0.5");
        assert_eq!(normalize("-03.10"), "-3.1");
        assert_eq!(normalize("£12"), "12");
    }

    #[test]
    fn bare_decimal_point_is_handled() {
        assert_eq!(normalize(".5"), "0.5");
        assert_eq!(normalize("-.50"), "-0.5");
        assert_eq!(normalize("."), ".");
        assert_eq!(normalize(".abc"), ".abc");
        assert_eq!(quick_check("0.5", ".5").confidence, EXACT_CONFIDENCE);
    }

    #[test]
    fn numeric_tolerance_tier() {
        let check = quick_check("3.14159", "3.14");
        assert!(check.likely_correct);
        assert_eq!(check.confidence, NUMERIC_CONFIDENCE);

        let close = quick_check("1000", "1000.5");
        assert!(close.likely_correct);
        assert_eq!(close.confidence, NUMERIC_CONFIDENCE);

        let small = quick_check("0.5", "0.505");
        assert_eq!(small.confidence, NUMERIC_CONFIDENCE);

        let far = quick_check("12", "13");
        assert!(!far.likely_correct);
    }

    #[test]
    fn containment_tier() {
        let check = quick_check("x = 4", "4");
        assert!(check.likely_correct);
        assert_eq!(check.confidence, CONTAINS_CONFIDENCE);
    }

    #[test]
    fn blank_answers_never_match() {
        assert_eq!(quick_check("5", "   "), QuickCheck::NO_MATCH);
        assert_eq!(quick_check("", "5"), QuickCheck::NO_MATCH);
    }

    #[test]
    fn unrelated_answers_do_not_match() {
        let check = quick_check("triangle", "square");
        assert!(!check.likely_correct);
        assert_eq!(check.confidence, 0.0);
    }
}
