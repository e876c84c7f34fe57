use std::fmt;

use chrono::{DateTime, Duration, Utc};
use pagemark_core::model::{
    DocumentDraft, DocumentId, PageNumber, ProgressEstimate, ProgressPercent, ProgressWrite, UserId,
};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    owner: UserId,
    pages: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidOwner { raw: String },
    InvalidPages { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidOwner { raw } => write!(f, "invalid --owner value: {raw:?}"),
            ArgsError::InvalidPages { raw } => write!(f, "invalid --pages value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
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

fn parse_pages(raw: String) -> Result<u32, ArgsError> {
    match raw.parse::<u32>() {
        Ok(pages) if pages > 0 => Ok(pages),
        _ => Err(ArgsError::InvalidPages { raw }),
    }
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("PAGEMARK_DB_URL")
            .unwrap_or_else(|_| "sqlite://pagemark.sqlite3?mode=rwc".into());
        let mut owner = std::env::var("PAGEMARK_USER_ID").unwrap_or_else(|_| "local".into());
        let mut pages = 24;
        let mut now: Option<DateTime<Utc>> = None;

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
                "--owner" => owner = require_value(&mut args, "--owner")?,
                "--pages" => pages = parse_pages(require_value(&mut args, "--pages")?)?,
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let owner = UserId::new(owner.clone()).map_err(|_| ArgsError::InvalidOwner { raw: owner })?;
        Ok(Self {
            db_url,
            owner,
            pages,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://pagemark.sqlite3?mode=rwc)");
    eprintln!("  --owner <user>            Owner of the sample documents (default: local)");
    eprintln!("  --pages <n>               Page count of each sample document (default: 24)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  PAGEMARK_DB_URL, PAGEMARK_USER_ID");
}

/// One unread, one half-read and one finished document, so every resume
/// path can be tried against the seeded database.
const SAMPLES: [(&str, &str, f64); 3] = [
    ("sample-unread", "Unread sample", 0.0),
    ("sample-halfway", "Half-read sample", 45.0),
    ("sample-finished", "Finished sample", 100.0),
];

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    for (offset, (id, title, percent)) in (0_i64..).zip(SAMPLES) {
        let id = DocumentId::new(id)?;
        let accessed_at = now - Duration::hours(offset);
        let document = DocumentDraft::new(args.owner.clone(), title)
            .with_id(id.clone())
            .with_total_pages(args.pages)
            .validate(accessed_at)?;
        storage.progress.upsert_document(&document).await?;

        let percent = ProgressPercent::clamped(percent);
        let page = reading_page(percent, args.pages)?;
        let write = ProgressWrite::new(id, ProgressEstimate::new(page, percent));
        storage.progress.set_progress(&write, accessed_at).await?;
    }

    println!(
        "Seeded {} documents of {} pages for {} into {}",
        SAMPLES.len(),
        args.pages,
        args.owner,
        args.db_url
    );

    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn reading_page(
    percent: ProgressPercent,
    pages: u32,
) -> Result<PageNumber, pagemark_core::model::PageError> {
    let page = (percent.value() / 100.0 * f64::from(pages)).ceil();
    PageNumber::new((page as u32).max(1))
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
