use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use course_core::model::{CourseId, LessonKey, LessonRef, UserId};
use services::{
    Clock, CourseView, CourseViewDeps, EmbedNode, EngineConfig, HttpSummarySource,
    JsonFileCourseContent, LessonRenderer, MediaError, MediaHandle, NoopAffordances,
    PlayerFactory, ReconcileOutcome, RenderError, SelectOutcome, SyncOutcome, TracingTelemetry,
};
use storage::repository::Storage;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingLesson { command: &'static str },
    UnknownArg(String),
    InvalidUserId { raw: String },
    InvalidCourseId { raw: String },
    InvalidLessonKey { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingLesson { command } => {
                write!(f, "{command} requires a lesson key such as 0-1")
            }
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidCourseId { raw } => write!(f, "invalid --course value: {raw}"),
            ArgsError::InvalidLessonKey { raw } => write!(f, "invalid lesson key: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- status          [options]");
    eprintln!("  cargo run -p app -- complete <u-l>  [options]");
    eprintln!("  cargo run -p app -- select <u-l>    [options]");
    eprintln!("  cargo run -p app -- sync            [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>       default sqlite:course.sqlite3");
    eprintln!("  --user <id>             default 1");
    eprintln!("  --course <id>           default 1");
    eprintln!("  --structure <json>      default course.json");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  COURSE_DB_URL, COURSE_USER_ID, COURSE_ID, COURSE_STRUCTURE_PATH,");
    eprintln!("  COURSE_SYNC_BASE_URL, COURSE_SYNC_TOKEN, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Status,
    Complete,
    Select,
    Sync,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "status" => Some(Self::Status),
            "complete" => Some(Self::Complete),
            "select" => Some(Self::Select),
            "sync" => Some(Self::Sync),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Complete => "complete",
            Self::Select => "select",
            Self::Sync => "sync",
        }
    }

    fn takes_lesson(self) -> bool {
        matches!(self, Self::Complete | Self::Select)
    }
}

struct Args {
    db_url: String,
    user_id: UserId,
    course_id: CourseId,
    structure_path: PathBuf,
    lesson: Option<LessonKey>,
}

impl Args {
    fn parse(command: Command, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("COURSE_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://course.sqlite3".into(), normalize_sqlite_url);
        let mut user_id = std::env::var("COURSE_USER_ID")
            .ok()
            .and_then(|value| value.parse::<UserId>().ok())
            .unwrap_or_else(|| UserId::new(1));
        let mut course_id = std::env::var("COURSE_ID")
            .ok()
            .and_then(|value| value.parse::<CourseId>().ok())
            .unwrap_or_else(|| CourseId::new(1));
        let mut structure_path = std::env::var("COURSE_STRUCTURE_PATH")
            .ok()
            .map_or_else(|| PathBuf::from("course.json"), PathBuf::from);
        let mut lesson = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    let value = require_value(args, "--user")?;
                    user_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                }
                "--course" => {
                    let value = require_value(args, "--course")?;
                    course_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidCourseId { raw: value.clone() })?;
                }
                "--structure" => {
                    structure_path = PathBuf::from(require_value(args, "--structure")?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                raw if command.takes_lesson() && lesson.is_none() && !raw.starts_with("--") => {
                    lesson = Some(
                        raw.parse::<LessonKey>()
                            .map_err(|_| ArgsError::InvalidLessonKey { raw: arg.clone() })?,
                    );
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        if command.takes_lesson() && lesson.is_none() {
            return Err(ArgsError::MissingLesson {
                command: command.name(),
            });
        }

        Ok(Self {
            db_url,
            user_id,
            course_id,
            structure_path,
            lesson,
        })
    }

    fn lesson(&self, command: Command) -> Result<LessonKey, ArgsError> {
        self.lesson.ok_or(ArgsError::MissingLesson {
            command: command.name(),
        })
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
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Terminal stand-in for the lesson content pipeline. It has no media
/// backend, so lessons render without embeds.
struct ConsoleRenderer;

#[async_trait]
impl LessonRenderer for ConsoleRenderer {
    async fn render_lesson(&self, lesson: &LessonRef) -> Result<Vec<EmbedNode>, RenderError> {
        println!("loading lesson {} ({})", lesson.key, lesson.lesson_id);
        Ok(Vec::new())
    }
}

struct NoPlayers;

#[async_trait]
impl PlayerFactory for NoPlayers {
    async fn create_player(&self, node: &EmbedNode) -> Result<Box<dyn MediaHandle>, MediaError> {
        Err(MediaError::Unsupported(node.source.clone()))
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Status,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(cmd, &mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;
    let config = EngineConfig::from_env();
    let summaries = HttpSummarySource::from_env()?;
    if cmd == Command::Sync && !summaries.enabled() {
        eprintln!("sync: COURSE_SYNC_BASE_URL is not set; nothing to reconcile against");
    }

    let deps = CourseViewDeps {
        renderer: Arc::new(ConsoleRenderer),
        players: Arc::new(NoPlayers),
        summaries: Arc::new(summaries),
        affordances: Arc::new(NoopAffordances),
        telemetry: Arc::new(TracingTelemetry),
    };
    let content = JsonFileCourseContent::new(&parsed.structure_path);
    let view = CourseView::open(
        &content,
        Arc::clone(&storage.progress),
        parsed.user_id,
        parsed.course_id,
        config,
        Clock::System,
        deps,
    )
    .await?;

    match cmd {
        Command::Status => {
            let progress = view.progress().await;
            println!(
                "user {} course {}: {}/{} lessons completed ({}%)",
                parsed.user_id,
                parsed.course_id,
                progress.completed,
                progress.total,
                progress.percent
            );
        }
        Command::Complete => {
            let key = parsed.lesson(cmd)?;
            match view.on_lesson_completed(key).await {
                Some(progress) => println!(
                    "completed {key}: {}/{} lessons ({}%)",
                    progress.completed, progress.total, progress.percent
                ),
                None => {
                    return Err(ArgsError::InvalidLessonKey {
                        raw: key.to_string(),
                    }
                    .into());
                }
            }
        }
        Command::Select => {
            let key = parsed.lesson(cmd)?;
            match view.on_lesson_selected(key).await {
                SelectOutcome::Loaded { generation, players } => {
                    println!("lesson {key} loaded (transition {generation}, {players} players)");
                }
                SelectOutcome::Failed { generation } => {
                    println!("lesson {key} failed to load (transition {generation})");
                }
                SelectOutcome::Abandoned { generation } => {
                    println!("lesson {key} abandoned (transition {generation})");
                }
                SelectOutcome::Rejected(rejection) => {
                    println!("lesson {key} not selected: {rejection:?}");
                }
            }
        }
        Command::Sync => match view.sync_now().await {
            SyncOutcome::Skipped => println!("sync skipped; local progress kept"),
            SyncOutcome::Reconciled(ReconcileOutcome::Rejected { validation }) => {
                println!(
                    "server summary rejected ({} issues, severe: {})",
                    validation.errors.len(),
                    validation.is_severe()
                );
            }
            SyncOutcome::Reconciled(ReconcileOutcome::Applied {
                merged,
                resolution,
                local_percent,
                displayed_percent,
                ..
            }) => {
                println!(
                    "merged {merged} lessons; showing {displayed_percent}% \
                     (local {local_percent}%, {})",
                    resolution.reason.as_str()
                );
            }
        },
    }

    Ok(())
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

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
