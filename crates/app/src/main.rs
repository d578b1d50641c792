use std::fmt;

use services::{AppServices, Clock};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tutor_core::badges::{BADGES, BadgeCategory};
use tutor_core::model::StudentId;

mod practice;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidDbUrl { raw: String },
    InvalidStudentId { raw: String },
    MissingStudent,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidStudentId { raw } => {
                write!(f, "invalid --student value (expected UUID): {raw}")
            }
            ArgsError::MissingStudent => {
                write!(f, "no student given; pass --student or set TUTOR_STUDENT_ID")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Practice,
    Badges,
    Topics,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "practice" => Some(Self::Practice),
            "badges" => Some(Self::Badges),
            "topics" => Some(Self::Topics),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Args {
    command: Command,
    db_url: String,
    student_id: Option<StudentId>,
    topic_code: Option<String>,
}

impl Args {
    fn parse(argv: impl IntoIterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mut db_url =
            std::env::var("TUTOR_DB_URL").unwrap_or_else(|_| "sqlite:tutor.sqlite3".into());
        let mut student_id = std::env::var("TUTOR_STUDENT_ID")
            .ok()
            .and_then(|value| value.parse::<StudentId>().ok());
        let mut topic_code = std::env::var("TUTOR_TOPIC").ok().filter(|c| !c.is_empty());

        let mut args = argv.into_iter().peekable();
        let command = match args.peek().map(String::as_str) {
            None => Command::Practice,
            Some(first) if first.starts_with('-') => Command::Practice,
            Some(first) => {
                let command = Command::from_arg(first)
                    .ok_or_else(|| ArgsError::UnknownCommand(first.to_string()))?;
                args.next();
                command
            }
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--student" => {
                    let value = require_value(&mut args, "--student")?;
                    let parsed = value
                        .parse::<StudentId>()
                        .map_err(|_| ArgsError::InvalidStudentId { raw: value.clone() })?;
                    student_id = Some(parsed);
                }
                "--topic" => {
                    topic_code = Some(require_value(&mut args, "--topic")?);
                }
                "--help" | "-h" => return Ok(None),
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Some(Self {
            command,
            db_url,
            student_id,
            topic_code,
        }))
    }

    fn student(&self) -> Result<StudentId, ArgsError> {
        self.student_id.ok_or(ArgsError::MissingStudent)
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p tutor -- practice [--db <sqlite_url>] [--student <uuid>] [--topic <code>]");
    eprintln!("  cargo run -p tutor -- badges   [--db <sqlite_url>] [--student <uuid>]");
    eprintln!("  cargo run -p tutor -- topics   [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Seed a student and topics first with: cargo run -p storage --bin seed");
    eprintln!();
    eprintln!("Environment (also read from .env):");
    eprintln!("  TUTOR_DB_URL, TUTOR_STUDENT_ID, TUTOR_TOPIC");
    eprintln!("  TUTOR_AI_API_KEY, TUTOR_AI_BASE_URL, TUTOR_AI_MODEL, TUTOR_AI_FALLBACK_MODEL,");
    eprintln!("  TUTOR_AI_TIMEOUT_SECS, RUST_LOG");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutor=info,services=info,storage=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn practice(services: &AppServices, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let student = services.student(args.student()?).await?;
    let topic = services.resolve_topic(args.topic_code.as_deref()).await?;
    if !services.oracle_enabled() {
        eprintln!("TUTOR_AI_API_KEY is not set; questions cannot be generated.");
    }

    let progression = services.progression();
    let active = progression.open(student.id, topic.id).await?;
    info!(session_id = %active.id(), topic = %topic.code, "practice session ready");

    let mut lines = practice::stdin_lines();
    practice::run(&progression, active, &mut lines).await
}

async fn badges(services: &AppServices, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let student = services.student(args.student()?).await?;
    let badges = services.badges();
    let stats = badges.student_stats(student.id).await?;
    let earned = badges.earned_badges(student.id).await?;

    println!("{}'s progress", student.first_name);
    println!(
        "  {} questions, {} correct ({}%)",
        stats.total_questions, stats.correct_questions, stats.accuracy_percent
    );
    println!(
        "  {} sessions, {} topics mastered, streak {} correct, {} days in a row",
        stats.total_sessions, stats.topics_mastered, stats.current_streak, stats.daily_streak
    );
    println!();
    println!("Badges ({}/{}):", earned.len(), BADGES.len());
    for badge in BADGES.iter().filter(|b| earned.contains(&b.id)) {
        println!("  {} {}: {}", badge.icon, badge.name, badge.description);
    }

    for category in [
        BadgeCategory::Achievement,
        BadgeCategory::Performance,
        BadgeCategory::Mastery,
        BadgeCategory::Streak,
    ] {
        if let Some(next) = badges.next_badge(student.id, Some(category)).await? {
            println!("Next up: {} {} ({})", next.icon, next.name, next.description);
        }
    }
    Ok(())
}

async fn topics(services: &AppServices) -> Result<(), Box<dyn std::error::Error>> {
    for topic in services.topics().await? {
        println!("{:<12} L{} {}", topic.code, topic.level, topic.title);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let Some(args) = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?
    else {
        print_usage();
        return Ok(());
    };

    let services = AppServices::new_sqlite(&args.db_url, Clock::default()).await?;
    match args.command {
        Command::Practice => practice(&services, &args).await,
        Command::Badges => badges(&services, &args).await,
        Command::Topics => topics(&services).await,
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn defaults_to_practice() {
        let args = Args::parse(argv(&["--topic", "MA2-FR-01"])).unwrap().unwrap();
        assert_eq!(args.command, Command::Practice);
        assert_eq!(args.topic_code.as_deref(), Some("MA2-FR-01"));
    }

    #[test]
    fn parses_subcommand_and_student() {
        let id = StudentId::generate();
        let args = Args::parse(argv(&["badges", "--student", &id.to_string()]))
            .unwrap()
            .unwrap();
        assert_eq!(args.command, Command::Badges);
        assert_eq!(args.student().unwrap(), id);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            Args::parse(argv(&["dance"])),
            Err(ArgsError::UnknownCommand(_))
        ));
        assert!(matches!(
            Args::parse(argv(&["--student", "nope"])),
            Err(ArgsError::InvalidStudentId { .. })
        ));
        assert!(matches!(
            Args::parse(argv(&["--db"])),
            Err(ArgsError::MissingValue { flag: "--db" })
        ));
        assert!(Args::parse(argv(&["topics", "-h"])).unwrap().is_none());
    }
}
