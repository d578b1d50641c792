use std::fmt;

use storage::repository::Storage;
use tutor_core::model::{StudentId, StudentProfile, Topic, TopicId};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    student_id: Option<StudentId>,
    student_name: String,
    grade: u8,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidStudentId { raw: String },
    InvalidGrade { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidStudentId { raw } => {
                write!(f, "invalid --student-id value (expected UUID): {raw}")
            }
            ArgsError::InvalidGrade { raw } => {
                write!(f, "invalid --grade value (expected 1-6): {raw}")
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

fn parse_grade(raw: String) -> Result<u8, ArgsError> {
    match raw.parse::<u8>() {
        Ok(grade) if (1..=6).contains(&grade) => Ok(grade),
        _ => Err(ArgsError::InvalidGrade { raw }),
    }
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("TUTOR_DB_URL").unwrap_or_else(|_| "sqlite:tutor.sqlite3".into());
        let mut student_id = std::env::var("TUTOR_STUDENT_ID")
            .ok()
            .and_then(|value| value.parse::<StudentId>().ok());
        let mut student_name =
            std::env::var("TUTOR_STUDENT_NAME").unwrap_or_else(|_| "Alex".into());
        let mut grade = std::env::var("TUTOR_GRADE")
            .ok()
            .and_then(|value| value.parse::<u8>().ok())
            .filter(|grade| (1..=6).contains(grade))
            .unwrap_or(4);

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--student-id" => {
                    let value = require_value(&mut args, "--student-id")?;
                    let parsed = value
                        .parse::<StudentId>()
                        .map_err(|_| ArgsError::InvalidStudentId { raw: value.clone() })?;
                    student_id = Some(parsed);
                }
                "--student-name" => {
                    student_name = require_value(&mut args, "--student-name")?;
                }
                "--grade" => {
                    grade = parse_grade(require_value(&mut args, "--grade")?)?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            student_id,
            student_name,
            grade,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:tutor.sqlite3)");
    eprintln!("  --student-id <uuid>       Student id to upsert (default: random)");
    eprintln!("  --student-name <name>     Student first name (default: Alex)");
    eprintln!("  --grade <1-6>             Grade and curriculum level (default: 4)");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  TUTOR_DB_URL, TUTOR_STUDENT_ID, TUTOR_STUDENT_NAME, TUTOR_GRADE");
}

/// Stage 2 number, measurement and statistics outcomes used for local practice.
fn sample_topics(level: u8) -> Vec<Topic> {
    let samples: [(&str, &str, &str, &str, Option<&str>, &[&str]); 4] = [
        (
            "MA2-RN-01",
            "Place value to 10 000",
            "Apply an understanding of place value to read, represent and order numbers",
            "Number and Algebra",
            Some("Representing numbers using place value"),
            &[
                "partition numbers in standard and non-standard ways",
                "round numbers to the nearest ten, hundred or thousand",
            ],
        ),
        (
            "MA2-AR-01",
            "Addition and subtraction",
            "Select and use efficient strategies to add and subtract numbers up to 4 digits",
            "Number and Algebra",
            Some("Additive relations"),
            &["use the jump strategy on an empty number line"],
        ),
        (
            "MA2-FR-01",
            "Fractions and decimals",
            "Represent and compare unit fractions and decimals to tenths",
            "Number and Algebra",
            Some("Representing numbers using fractions"),
            &["model halves, quarters and eighths of collections"],
        ),
        (
            "MA2-DATA-01",
            "Data displays",
            "Collect data, organise it into categories and create displays",
            "Statistics and Probability",
            None,
            &["interpret column graphs with a scale of many-to-one"],
        ),
    ];

    samples
        .into_iter()
        .map(
            |(code, title, description, strand, sub_strand, elaborations)| Topic {
                id: TopicId::generate(),
                code: code.to_string(),
                title: title.to_string(),
                description: description.to_string(),
                strand: strand.to_string(),
                sub_strand: sub_strand.map(str::to_string),
                level,
                elaborations: elaborations.iter().map(|e| (*e).to_string()).collect(),
            },
        )
        .collect()
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;

    let student = StudentProfile {
        id: args.student_id.unwrap_or_else(StudentId::generate),
        first_name: args.student_name.clone(),
        grade_level: args.grade,
        curriculum_level: args.grade,
    };
    storage.catalog.upsert_student(&student).await?;

    let existing = storage.catalog.list_topics().await?;
    let mut added = 0_usize;
    for topic in sample_topics(args.grade) {
        // topic codes are unique; keep whatever is already there
        if existing.iter().any(|t| t.code == topic.code) {
            continue;
        }
        storage.catalog.upsert_topic(&topic).await?;
        added += 1;
    }

    println!(
        "Seeded student {} ({}) and {} new topics into {}",
        student.first_name, student.id, added, args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
