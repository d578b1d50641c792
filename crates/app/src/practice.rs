//! Interactive practice loop over stdin.

use services::{ActiveSession, CompletionOutcome, NextOutcome, ProgressionService, SessionError};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tutor_core::model::Evaluation;

/// One line of student input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Answer(String),
    Hint,
    Retry,
    Next,
    /// 1-based question number.
    Review(usize),
    Back,
    Quit,
    Abandon,
    /// Question for the tutor.
    Ask(String),
    Help,
    Empty,
    Unknown(String),
}

impl Input {
    /// Lines starting with `:` are commands, anything else is an answer.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }
        let Some(command) = line.strip_prefix(':') else {
            return Input::Answer(line.to_string());
        };

        if let Some(message) = command.strip_prefix("ask ") {
            let message = message.trim();
            if !message.is_empty() {
                return Input::Ask(message.to_string());
            }
        }

        let mut parts = command.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("hint" | "h"), None) => Input::Hint,
            (Some("retry" | "r"), None) => Input::Retry,
            (Some("next" | "n"), None) => Input::Next,
            (Some("back" | "b"), None) => Input::Back,
            (Some("quit" | "q"), None) => Input::Quit,
            (Some("abandon"), None) => Input::Abandon,
            (Some("help" | "?"), None) => Input::Help,
            (Some("review"), Some(n)) => match n.parse::<usize>() {
                Ok(n) if n > 0 => Input::Review(n),
                _ => Input::Unknown(line.to_string()),
            },
            _ => Input::Unknown(line.to_string()),
        }
    }
}

fn print_commands() {
    println!("Type your answer, or one of:");
    println!("  :hint        show the next hint");
    println!("  :retry       try the current question again");
    println!("  :next        move on");
    println!("  :ask <text>  ask the tutor about this question");
    println!("  :review <n>  look back at question n");
    println!("  :back        return to the current question");
    println!("  :quit        stop for now (progress is kept)");
    println!("  :abandon     end this session without scoring it");
}

fn show_question(active: &ActiveSession) {
    let engine = active.engine();
    let Some(question) = engine.current_question() else {
        return;
    };
    println!();
    println!(
        "Question {}/{} ({}):",
        engine.current_index() + 1,
        engine.questions().len(),
        question.difficulty.as_str()
    );
    println!("  {}", question.text);
}

fn show_evaluation(evaluation: &Evaluation) {
    let mark = if evaluation.is_correct { "✔" } else { "✘" };
    println!("{mark} {}", evaluation.feedback);
    if let Some(hint) = &evaluation.suggested_hint {
        println!("  Hint: {hint}");
    }
    if !evaluation.encouragement.is_empty() {
        println!("  {}", evaluation.encouragement);
    }
}

fn show_completion(outcome: &CompletionOutcome) {
    println!();
    println!(
        "Session complete: {}/{} correct ({}%).",
        outcome.summary.correct(),
        outcome.summary.total(),
        outcome.summary.accuracy_percent()
    );
    println!("{}", outcome.message);
    println!(
        "Skill level: {} (confidence {:.0}%)",
        outcome.progress.skill_level(),
        outcome.progress.confidence_score() * 100.0
    );
    if !outcome.summary.concepts_covered().is_empty() {
        println!("Covered: {}", outcome.summary.concepts_covered().join(", "));
    }
    if let Some(instruction) = outcome.recommendation.instruction {
        println!("Next time: {}", instruction.describe());
    }
}

/// Drive `active` until it completes or the student leaves.
///
/// # Errors
///
/// Returns storage and generation failures; invalid moves are reported inline.
pub async fn run(
    progression: &ProgressionService,
    mut active: ActiveSession,
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "Hi {}! Practising {}: {}",
        active.student().first_name,
        active.topic().code,
        active.topic().title
    );
    print_commands();
    show_question(&active);

    while let Some(line) = lines.next_line().await? {
        let step = match Input::parse(&line) {
            Input::Empty => Ok(()),
            Input::Help => {
                print_commands();
                Ok(())
            }
            Input::Unknown(raw) => {
                println!("Unknown command {raw}; type :help for the list.");
                Ok(())
            }
            Input::Quit => {
                println!("Progress saved. See you next time!");
                return Ok(());
            }
            Input::Abandon => {
                progression.abandon(&mut active).await?;
                println!("Session ended without scoring.");
                return Ok(());
            }
            Input::Answer(answer) => submit(progression, &mut active, &answer).await,
            Input::Ask(message) => match progression.ask(&mut active, &message).await {
                Ok(reply) => {
                    println!("Tutor: {reply}");
                    Ok(())
                }
                Err(SessionError::TutorUnavailable { .. }) => {
                    println!("The tutor is offline; set TUTOR_AI_API_KEY to chat.");
                    Ok(())
                }
                Err(err) => Err(err),
            },
            Input::Hint => progression.hint(&mut active).map(|hint| match hint {
                Some(hint) => println!("Hint: {hint}"),
                None => println!("No more hints for this question."),
            }),
            Input::Retry => progression.try_again(&mut active).map(|()| show_question(&active)),
            Input::Back => {
                active.return_to_current();
                show_question(&active);
                Ok(())
            }
            Input::Review(number) => review(progression, &mut active, number - 1),
            Input::Next => match progression.next(&mut active).await {
                Ok(NextOutcome::Question(_)) => {
                    show_question(&active);
                    Ok(())
                }
                Ok(NextOutcome::Completed(outcome)) => {
                    show_completion(&outcome);
                    return Ok(());
                }
                Err(err) => Err(err),
            },
        };

        match step {
            Ok(()) => {}
            Err(SessionError::InvalidTransition { reason, .. }) => println!("Can't do that: {reason}."),
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

async fn submit(
    progression: &ProgressionService,
    active: &mut ActiveSession,
    answer: &str,
) -> Result<(), SessionError> {
    let outcome = progression.submit_answer(active, answer).await?;
    show_evaluation(&outcome.evaluation);
    if outcome.can_advance {
        println!("Type :next to continue.");
    } else if outcome.can_retry {
        println!("Type :retry to have another go, or :hint for help.");
    }
    Ok(())
}

fn review(
    progression: &ProgressionService,
    active: &mut ActiveSession,
    index: usize,
) -> Result<(), SessionError> {
    let evaluation = progression.review(active, index)?;
    if let Some(question) = active.engine().viewed_question() {
        println!("Question {}: {}", index + 1, question.text);
    }
    if let Some(answer) = active.engine().answer(index) {
        println!("  Your answer: {answer}");
    }
    match evaluation {
        Some(evaluation) => show_evaluation(&evaluation),
        None => println!("  Not answered yet."),
    }
    println!("Type :back to return.");
    Ok(())
}

/// Stdin as an async line reader.
pub fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_an_answer() {
        assert_eq!(Input::parse(" 42 "), Input::Answer("42".into()));
        assert_eq!(Input::parse("next"), Input::Answer("next".into()));
        assert_eq!(Input::parse("   "), Input::Empty);
    }

    #[test]
    fn colon_prefix_selects_commands() {
        assert_eq!(Input::parse(":hint"), Input::Hint);
        assert_eq!(Input::parse(":n"), Input::Next);
        assert_eq!(Input::parse(":review 2"), Input::Review(2));
        assert_eq!(Input::parse(":abandon"), Input::Abandon);
        assert_eq!(
            Input::parse(":ask why  do we carry?"),
            Input::Ask("why  do we carry?".into())
        );
    }

    #[test]
    fn malformed_commands_are_unknown() {
        assert!(matches!(Input::parse(":review 0"), Input::Unknown(_)));
        assert!(matches!(Input::parse(":review x"), Input::Unknown(_)));
        assert!(matches!(Input::parse(":dance"), Input::Unknown(_)));
        assert!(matches!(Input::parse(":ask   "), Input::Unknown(_)));
    }
}
