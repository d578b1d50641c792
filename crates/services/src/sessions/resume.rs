//! Rebuilding engine state from a stored session.

use std::collections::BTreeMap;

use tutor_core::model::{ConceptualUnderstanding, Evaluation, Question, QuestionInteraction};

/// Engine state recovered from persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    pub questions: Vec<Question>,
    /// First question without a verdict; equals `questions.len()` when the batch is used up.
    pub resume_index: usize,
    pub answers: BTreeMap<usize, String>,
    pub evaluations: BTreeMap<usize, Evaluation>,
    pub hints_used: BTreeMap<usize, u32>,
}

impl ResumePoint {
    /// Start of a freshly generated batch.
    #[must_use]
    pub fn fresh(questions: Vec<Question>) -> Self {
        Self {
            questions,
            resume_index: 0,
            answers: BTreeMap::new(),
            evaluations: BTreeMap::new(),
            hints_used: BTreeMap::new(),
        }
    }

    /// Whether every question already has a verdict, so a new batch is needed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.resume_index >= self.questions.len()
    }

    /// Rebuild from the stored batch snapshot when there is one, else from
    /// the interaction rows themselves.
    ///
    /// `interactions` must be in creation order.
    #[must_use]
    pub fn reconstruct(snapshot: Option<&[Question]>, interactions: &[QuestionInteraction]) -> Self {
        let questions: Vec<Question> = match snapshot {
            Some(batch) if !batch.is_empty() => batch.to_vec(),
            _ => questions_from_rows(interactions),
        };

        let mut point = Self::fresh(questions);
        let mut resume_index = None;
        for (index, question) in point.questions.iter().enumerate() {
            let row = interactions
                .iter()
                .rev()
                .find(|row| row.question_text == question.text);

            match row {
                Some(row) if row.is_answered() => {
                    point
                        .answers
                        .insert(index, row.student_answer.clone().unwrap_or_default());
                    point.evaluations.insert(index, stored_evaluation(row));
                    if row.hints_used > 0 {
                        point.hints_used.insert(index, row.hints_used);
                    }
                }
                other => {
                    if let Some(row) = other.filter(|row| row.hints_used > 0) {
                        point.hints_used.insert(index, row.hints_used);
                    }
                    if resume_index.is_none() {
                        resume_index = Some(index);
                    }
                }
            }
        }

        point.resume_index = resume_index.unwrap_or(point.questions.len());
        point
    }
}

/// One question per distinct text, in first-seen order.
fn questions_from_rows(interactions: &[QuestionInteraction]) -> Vec<Question> {
    let mut questions: Vec<Question> = Vec::new();
    for row in interactions {
        if !questions.iter().any(|q| q.text == row.question_text) {
            questions.push(row.to_question());
        }
    }
    questions
}

/// Stored verdict, or a minimal one rebuilt from `is_correct` when the blob is gone.
fn stored_evaluation(row: &QuestionInteraction) -> Evaluation {
    if let Some(evaluation) = &row.evaluation {
        return evaluation.clone();
    }
    let is_correct = row.is_correct.unwrap_or(false);
    Evaluation {
        is_correct,
        accuracy_score: if is_correct { 1.0 } else { 0.0 },
        feedback: String::new(),
        conceptual_understanding: ConceptualUnderstanding::Developing,
        identified_weakness: None,
        suggested_hint: None,
        encouragement: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tutor_core::model::{
        Difficulty, InteractionId, QuestionType, SessionId, StudentId, TopicId,
    };
    use tutor_core::time::fixed_now;

    fn question(n: usize) -> Question {
        Question {
            text: format!("Round {n}47 to the nearest hundred"),
            kind: QuestionType::ShortAnswer,
            difficulty: Difficulty::Medium,
            hints: vec!["Look at the tens digit".into()],
            correct_answer: format!("{}00", n + 1),
            solution_steps: vec!["4 tens rounds down".into()],
            focuses_on: Some("rounding".into()),
            builds_on: None,
        }
    }

    fn row(id: i64, question: &Question, is_correct: Option<bool>) -> QuestionInteraction {
        QuestionInteraction {
            id: InteractionId::new(id),
            session_id: SessionId::generate(),
            student_id: StudentId::generate(),
            topic_id: TopicId::generate(),
            question_text: question.text.clone(),
            question_type: question.kind,
            difficulty: question.difficulty,
            correct_answer: None,
            student_answer: is_correct.map(|_| "100".to_string()),
            is_correct,
            evaluation: None,
            hints_used: 0,
            created_at: fixed_now() + Duration::seconds(id),
        }
    }

    fn batch() -> Vec<Question> {
        (0..5).map(question).collect()
    }

    fn rows(batch: &[Question]) -> Vec<QuestionInteraction> {
        batch
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let id = i64::try_from(i).unwrap();
                row(id, q, (i < 3).then_some(i != 1))
            })
            .collect()
    }

    #[test]
    fn resumes_at_first_unscored_question_from_snapshot() {
        let batch = batch();
        let point = ResumePoint::reconstruct(Some(&batch), &rows(&batch));

        assert_eq!(point.resume_index, 3);
        assert_eq!(point.questions, batch);
        assert_eq!(point.evaluations.len(), 3);
        assert!(!point.evaluations[&1].is_correct);
        assert_eq!(point.answers.len(), 3);
        assert!(!point.is_exhausted());
    }

    #[test]
    fn resumes_from_rows_without_snapshot() {
        let batch = batch();
        let point = ResumePoint::reconstruct(None, &rows(&batch));

        assert_eq!(point.resume_index, 3);
        assert_eq!(point.questions.len(), 5);
        assert!(point.questions.iter().all(|q| q.correct_answer.is_empty()));
    }

    #[test]
    fn snapshot_questions_without_rows_are_unanswered() {
        let batch = batch();
        let only_first = vec![row(1, &batch[0], Some(true))];
        let point = ResumePoint::reconstruct(Some(&batch), &only_first);
        assert_eq!(point.resume_index, 1);
    }

    #[test]
    fn fully_scored_batch_is_exhausted() {
        let batch = batch();
        let all: Vec<_> = batch
            .iter()
            .enumerate()
            .map(|(i, q)| row(i64::try_from(i).unwrap(), q, Some(true)))
            .collect();
        let point = ResumePoint::reconstruct(Some(&batch), &all);
        assert_eq!(point.resume_index, 5);
        assert!(point.is_exhausted());
    }

    #[test]
    fn latest_row_for_a_question_wins() {
        let batch = batch();
        let mut history = vec![row(1, &batch[0], None)];
        let mut retried = row(2, &batch[0], Some(true));
        retried.hints_used = 2;
        history.push(retried);

        let point = ResumePoint::reconstruct(Some(&batch), &history);
        assert_eq!(point.resume_index, 1);
        assert_eq!(point.hints_used.get(&0), Some(&2));
        assert!(point.evaluations[&0].is_correct);
    }
}
