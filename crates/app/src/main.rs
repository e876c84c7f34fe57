use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use pagemark_core::Clock;
use pagemark_core::model::{
    Document, DocumentDraft, DocumentId, PageNumber, ProgressEstimate, ProgressPercent,
    ProgressWrite, UserId,
};
use pagemark_core::resume::ResumeChoice;
use pagemark_core::session::{SessionOpening, ViewerCommand};
use services::{
    GatewayConfig, HttpProgressGateway, ProgressGateway, StoredProgressGateway, TrackerConfig,
};
use storage::repository::{ProgressRepository, Storage};
use tracing_subscriber::EnvFilter;

mod replay;

use replay::{ScrollTrace, replay};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArg { what: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidDbUrl { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
    InvalidChoice { raw: String },
    InvalidId { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArg { what } => write!(f, "missing {what}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidChoice { raw } => {
                write!(f, "invalid --choice value (expected resume or restart): {raw}")
            }
            ArgsError::InvalidId { raw } => write!(f, "invalid id: {raw:?}"),
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

fn parse_number<T: std::str::FromStr>(raw: String, flag: &'static str) -> Result<T, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn parse_document_id(raw: String) -> Result<DocumentId, ArgsError> {
    DocumentId::new(raw.clone()).map_err(|_| ArgsError::InvalidId { raw })
}

fn parse_user_id(raw: String) -> Result<UserId, ArgsError> {
    UserId::new(raw.clone()).map_err(|_| ArgsError::InvalidId { raw })
}

fn parse_choice(raw: String) -> Result<ResumeChoice, ArgsError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "resume" => Ok(ResumeChoice::Resume),
        "restart" => Ok(ResumeChoice::Restart),
        _ => Err(ArgsError::InvalidChoice { raw }),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Add {
        title: String,
        pages: u32,
        id: Option<DocumentId>,
    },
    List,
    Show {
        id: DocumentId,
    },
    Set {
        id: DocumentId,
        page: u32,
        percent: f64,
    },
    Replay {
        id: DocumentId,
        trace: PathBuf,
        choice: ResumeChoice,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Args {
    db_url: String,
    remote: bool,
    owner: Option<UserId>,
    command: Command,
}

/// Flags collected before the command-specific ones are checked.
#[derive(Default)]
struct Flags {
    title: Option<String>,
    pages: Option<u32>,
    id: Option<DocumentId>,
    page: Option<u32>,
    percent: Option<f64>,
    trace: Option<PathBuf>,
    choice: Option<ResumeChoice>,
    positional: Vec<String>,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  pagemark [--db <sqlite_url>] [--remote] [--owner <user>] <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  add --title <title> --pages <n> [--id <id>]   Register a document");
    eprintln!("  list                                          List documents, recent first");
    eprintln!("  show <id>                                     Show one document's progress");
    eprintln!("  set <id> --page <n> --percent <x>             Overwrite saved progress");
    eprintln!("  replay <id> --trace <file.json> [--choice resume|restart]");
    eprintln!("                                                Replay a recorded scroll trace");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://pagemark.sqlite3");
    eprintln!("  --owner local");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PAGEMARK_DB_URL, PAGEMARK_USER_ID");
    eprintln!("  PAGEMARK_API_URL, PAGEMARK_API_TOKEN (used with --remote)");
    eprintln!("  PAGEMARK_MIN_INTERVAL_MS, PAGEMARK_CHANGE_THRESHOLD, PAGEMARK_BOUNDARY_TOLERANCE,");
    eprintln!("  PAGEMARK_RESUME_SETTLE_MS, PAGEMARK_RESTART_SETTLE_MS");
    eprintln!("  RUST_LOG (default: info)");
}

impl Args {
    fn parse(
        argv: impl IntoIterator<Item = String>,
        env_db_url: Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut db_url = env_db_url.map_or_else(
            || "sqlite://pagemark.sqlite3".into(),
            normalize_sqlite_url,
        );
        let mut remote = false;
        let mut owner = None;
        let mut flags = Flags::default();

        let mut args = argv.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--remote" => remote = true,
                "--owner" => owner = Some(parse_user_id(require_value(&mut args, "--owner")?)?),
                "--title" => flags.title = Some(require_value(&mut args, "--title")?),
                "--pages" => {
                    flags.pages = Some(parse_number(require_value(&mut args, "--pages")?, "--pages")?);
                }
                "--id" => flags.id = Some(parse_document_id(require_value(&mut args, "--id")?)?),
                "--page" => {
                    flags.page = Some(parse_number(require_value(&mut args, "--page")?, "--page")?);
                }
                "--percent" => {
                    flags.percent = Some(parse_number(
                        require_value(&mut args, "--percent")?,
                        "--percent",
                    )?);
                }
                "--trace" => flags.trace = Some(require_value(&mut args, "--trace")?.into()),
                "--choice" => flags.choice = Some(parse_choice(require_value(&mut args, "--choice")?)?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                other if other.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => flags.positional.push(arg),
            }
        }

        let command = Self::command(flags)?;
        Ok(Self {
            db_url,
            remote,
            owner,
            command,
        })
    }

    fn command(flags: Flags) -> Result<Command, ArgsError> {
        let mut positional = flags.positional.into_iter();
        let name = positional.next().ok_or(ArgsError::MissingArg { what: "command" })?;
        let mut target = || {
            positional
                .next()
                .ok_or(ArgsError::MissingArg { what: "document id" })
                .and_then(parse_document_id)
        };

        let command = match name.as_str() {
            "add" => Command::Add {
                title: flags.title.ok_or(ArgsError::MissingArg { what: "--title" })?,
                pages: flags.pages.ok_or(ArgsError::MissingArg { what: "--pages" })?,
                id: flags.id,
            },
            "list" => Command::List,
            "show" => Command::Show { id: target()? },
            "set" => Command::Set {
                id: target()?,
                page: flags.page.ok_or(ArgsError::MissingArg { what: "--page" })?,
                percent: flags.percent.ok_or(ArgsError::MissingArg { what: "--percent" })?,
            },
            "replay" => Command::Replay {
                id: target()?,
                trace: flags.trace.ok_or(ArgsError::MissingArg { what: "--trace" })?,
                choice: flags.choice.unwrap_or(ResumeChoice::Resume),
            },
            _ => return Err(ArgsError::UnknownCommand(name)),
        };

        if let Some(extra) = positional.next() {
            return Err(ArgsError::UnknownArg(extra));
        }
        Ok(command)
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn print_document(doc: &Document) {
    let pages = doc
        .total_pages
        .map_or_else(|| "?".to_string(), |total| total.to_string());
    println!(
        "{id}\t{title}\tpage {page}/{pages}\t{percent}\t{accessed}",
        id = doc.id,
        title = doc.title,
        page = doc.current_page,
        percent = doc.progress_percent,
        accessed = doc.last_accessed_at.to_rfc3339(),
    );
}

fn describe_opening(doc: &Document) -> &'static str {
    if doc.progress_percent.is_partial() {
        "opening will ask to resume or restart"
    } else if doc.is_complete() {
        "finished; opening goes straight to the last saved page"
    } else {
        "not started; opening starts at page 1"
    }
}

fn describe_command(command: &ViewerCommand) -> String {
    match command {
        ViewerCommand::ScrollToPage { page, settle_ms } => {
            format!("scroll to page {page} (settle {settle_ms} ms)")
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse(std::env::args().skip(1), std::env::var("PAGEMARK_DB_URL").ok())
        .map_err(|e| {
            eprintln!("{e}");
            print_usage();
            e
        })?;

    let settings = TrackerConfig::from_env()?;
    let clock = Clock::default();

    let mut local = None;
    let gateway: Arc<dyn ProgressGateway> = if args.remote {
        let mut context = GatewayConfig::from_env()?
            .ok_or("--remote needs PAGEMARK_API_URL and PAGEMARK_USER_ID")?;
        if let Some(owner) = args.owner.clone() {
            context.user_id = owner;
        }
        tracing::info!(base_url = %context.base_url, user = %context.user_id, "using remote gateway");
        Arc::new(HttpProgressGateway::new(context))
    } else {
        let owner = match args.owner.clone() {
            Some(owner) => owner,
            None => parse_user_id(std::env::var("PAGEMARK_USER_ID").unwrap_or_else(|_| "local".into()))?,
        };
        prepare_sqlite_file(&args.db_url)?;
        let storage = Storage::sqlite(&args.db_url).await?;
        tracing::debug!(db = %args.db_url, owner = %owner, "using local storage");
        let gateway = StoredProgressGateway::new(Arc::clone(&storage.progress), owner.clone())
            .with_clock(clock);
        local = Some((storage, owner));
        Arc::new(gateway)
    };

    match args.command {
        Command::Add { title, pages, id } => {
            let Some((storage, owner)) = local else {
                return Err("add only works against local storage".into());
            };
            let mut draft = DocumentDraft::new(owner, title).with_total_pages(pages);
            if let Some(id) = id {
                draft = draft.with_id(id);
            }
            let document = draft.validate(clock.now())?;
            storage.progress.upsert_document(&document).await?;
            tracing::info!(document = %document.id, pages, "registered document");
            println!("{}", document.id);
        }
        Command::List => {
            for doc in gateway.list_documents().await? {
                print_document(&doc);
            }
        }
        Command::Show { id } => {
            let doc = gateway
                .get_document(&id)
                .await?
                .ok_or_else(|| format!("no document with id {id}"))?;
            print_document(&doc);
            println!("{}", describe_opening(&doc));
        }
        Command::Set { id, page, percent } => {
            let write = ProgressWrite::new(
                id,
                ProgressEstimate::new(PageNumber::new(page)?, ProgressPercent::clamped(percent)),
            );
            let stored = gateway.set_progress(&write).await?;
            println!(
                "{}\tpage {}\t{}",
                stored.document_id, stored.current_page, stored.progress_percent
            );
        }
        Command::Replay { id, trace, choice } => {
            let trace = ScrollTrace::load(&trace)?;
            let report = replay(Arc::clone(&gateway), id, &trace, settings, choice).await?;

            match report.opening {
                SessionOpening::Started { start, .. } => {
                    println!("opened at page {} ({})", start.page, start.percent);
                }
                SessionOpening::AwaitingChoice { saved } => println!(
                    "saved at page {} ({}); chose {choice:?}",
                    saved.page, saved.percent
                ),
            }
            for command in &report.commands {
                println!("viewer: {}", describe_command(command));
            }
            for (at_ms, update) in &report.updates {
                let finished = if update.completed_now { "\tfinished" } else { "" };
                println!(
                    "{at_ms:>8} ms\tpage {}\t{}{finished}",
                    update.estimate.page, update.estimate.percent
                );
            }
            println!(
                "closed at page {} ({})",
                report.last_position.page, report.last_position.percent
            );
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        Args::parse(args.iter().map(|a| (*a).to_string()), None)
    }

    #[test]
    fn parses_add_with_defaults() {
        let args = parse(&["add", "--title", "Paper", "--pages", "12"]).unwrap();
        assert_eq!(args.db_url, "sqlite://pagemark.sqlite3");
        assert!(!args.remote);
        assert_eq!(
            args.command,
            Command::Add {
                title: "Paper".into(),
                pages: 12,
                id: None,
            }
        );
    }

    #[test]
    fn global_flags_may_follow_the_command() {
        let args = parse(&["list", "--remote", "--owner", "reader"]).unwrap();
        assert!(args.remote);
        assert_eq!(args.owner, Some(UserId::new("reader").unwrap()));
        assert_eq!(args.command, Command::List);
    }

    #[test]
    fn parses_set_and_replay() {
        let set = parse(&["set", "doc", "--page", "4", "--percent", "67.5"]).unwrap();
        assert_eq!(
            set.command,
            Command::Set {
                id: DocumentId::new("doc").unwrap(),
                page: 4,
                percent: 67.5,
            }
        );

        let replay = parse(&["replay", "doc", "--trace", "t.json", "--choice", "Restart"]).unwrap();
        assert_eq!(
            replay.command,
            Command::Replay {
                id: DocumentId::new("doc").unwrap(),
                trace: PathBuf::from("t.json"),
                choice: ResumeChoice::Restart,
            }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(parse(&[]), Err(ArgsError::MissingArg { what: "command" })));
        assert!(matches!(parse(&["frobnicate"]), Err(ArgsError::UnknownCommand(_))));
        assert!(matches!(parse(&["show"]), Err(ArgsError::MissingArg { .. })));
        assert!(matches!(parse(&["add", "--title", "x"]), Err(ArgsError::MissingArg { what: "--pages" })));
        assert!(matches!(
            parse(&["set", "doc", "--page", "four", "--percent", "1"]),
            Err(ArgsError::InvalidNumber { flag: "--page", .. })
        ));
        assert!(matches!(
            parse(&["replay", "doc", "--trace", "t.json", "--choice", "later"]),
            Err(ArgsError::InvalidChoice { .. })
        ));
        assert!(matches!(parse(&["list", "--verbose"]), Err(ArgsError::UnknownArg(_))));
        assert!(matches!(parse(&["show", "a", "b"]), Err(ArgsError::UnknownArg(_))));
    }

    #[test]
    fn env_db_url_is_normalized() {
        let args = Args::parse(["list".to_string()], Some("sqlite:/tmp/pm.sqlite3".into())).unwrap();
        assert_eq!(args.db_url, "sqlite:///tmp/pm.sqlite3");
    }

    #[test]
    fn prepares_sqlite_file_in_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pm.sqlite3");
        let url = format!("sqlite://{}?mode=rwc", path.display());
        prepare_sqlite_file(&url).unwrap();
        assert!(path.exists());
        assert!(prepare_sqlite_file("sqlite::memory:").is_ok());
        assert!(prepare_sqlite_file("postgres://nope").is_err());
    }

    #[test]
    fn describes_resume_behaviour() {
        let mut doc = DocumentDraft::new(UserId::new("u").unwrap(), "Doc")
            .with_total_pages(3)
            .validate(pagemark_core::time::fixed_now())
            .unwrap();
        assert!(describe_opening(&doc).contains("page 1"));
        doc.progress_percent = ProgressPercent::clamped(40.0);
        assert!(describe_opening(&doc).contains("resume"));
        doc.progress_percent = ProgressPercent::COMPLETE;
        assert!(describe_opening(&doc).contains("finished"));
    }
}
