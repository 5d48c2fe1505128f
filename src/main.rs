//! SMS Ledger - command line front end
//!
//! Lists, watches or classifies bank SMS notifications.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use sms_ledger::classifier::{classify, ClassifiedMessage};
use sms_ledger::config::Config;
use sms_ledger::ledger::{Ledger, PermissionState};
use sms_ledger::messages::{JsonExport, ListFilter, MessageSource, RawMessage, SqliteInbox};
use sms_ledger::monitor::{Intent, MonitorHandle, Snapshot};
use sms_ledger::view::{DirectionFilter, ViewState};
use sms_ledger::Error;
use std::io::Read;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const PERMISSION_NOTICE: &str =
    "SMS permission denied: the inbox could not be read. Grant access and run again (or type `grant` in watch mode).";

const BODY_PREVIEW_CHARS: usize = 60;

/// SMS Ledger - bank SMS classifier
#[derive(Parser)]
#[command(name = "sms-ledger")]
#[command(about = "Classify bank debit/credit SMS notifications from the inbox")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, classify and print the inbox once
    List {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        view: ViewArgs,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// chrono format string for the date column
        #[arg(long)]
        date_format: Option<String>,
    },

    /// Poll the inbox and print every update; reads commands from stdin
    Watch {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        view: ViewArgs,

        /// Refresh interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Classify a JSON array of raw messages (file or stdin) and print JSON
    Classify {
        /// Input file (omit to read stdin)
        file: Option<PathBuf>,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// SMS database with an Android `sms` table
    #[arg(long, conflicts_with = "json")]
    db: Option<PathBuf>,

    /// JSON export of raw messages instead of a database
    #[arg(long)]
    json: Option<PathBuf>,

    /// Maximum messages fetched per refresh
    #[arg(long)]
    max: Option<usize>,
}

#[derive(Args)]
struct ViewArgs {
    /// Direction filter
    #[arg(long, value_enum, default_value = "all")]
    filter: DirectionFilter,

    /// Case-insensitive search over body and sender
    #[arg(long, default_value = "")]
    search: String,
}

impl ViewArgs {
    fn view_state(&self) -> ViewState {
        ViewState::new(self.filter, self.search.clone())
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

/// Message source picked on the command line
enum Inbox {
    Sqlite(SqliteInbox),
    Json(JsonExport),
}

impl MessageSource for Inbox {
    fn request_permission(&self) -> bool {
        match self {
            Inbox::Sqlite(inbox) => inbox.request_permission(),
            Inbox::Json(export) => export.request_permission(),
        }
    }

    fn list_messages(&self, filter: &ListFilter) -> sms_ledger::Result<Vec<RawMessage>> {
        match self {
            Inbox::Sqlite(inbox) => inbox.list_messages(filter),
            Inbox::Json(export) => export.list_messages(filter),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging (stderr, so stdout stays parseable)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::default();

    match cli.command {
        Commands::List {
            source,
            view,
            format,
            date_format,
        } => {
            if let Some(date_format) = date_format {
                config.date_format = date_format;
            }
            let inbox = open_source(&mut config, &source);
            cmd_list(&config, inbox, view.view_state(), format)
        }
        Commands::Watch {
            source,
            view,
            interval_ms,
        } => {
            if let Some(interval_ms) = interval_ms {
                if interval_ms == 0 {
                    return Err(Error::Config("--interval-ms must be positive".to_string()).into());
                }
                config.poll_interval_ms = interval_ms;
            }
            let inbox = open_source(&mut config, &source);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(cmd_watch(&config, inbox, view.view_state()))
        }
        Commands::Classify { file, pretty } => cmd_classify(file, pretty),
    }
}

fn open_source(config: &mut Config, args: &SourceArgs) -> Inbox {
    if let Some(max) = args.max {
        config.max_count = max;
    }
    if let Some(db) = &args.db {
        config.inbox_db = db.clone();
    }

    match &args.json {
        Some(path) => Inbox::Json(JsonExport::new(path)),
        None => Inbox::Sqlite(SqliteInbox::new(&config.inbox_db)),
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

fn cmd_list(config: &Config, inbox: Inbox, view: ViewState, format: OutputFormat) -> anyhow::Result<()> {
    let mut ledger = Ledger::new(inbox, config);
    if !ledger.grant_permission() {
        eprintln!("{}", PERMISSION_NOTICE);
        return Ok(());
    }

    ledger.set_direction_filter(view.direction);
    ledger.set_search_text(view.search);
    ledger.refresh().context("Failed to read SMS inbox")?;

    let visible = ledger.visible();
    debug!(visible = visible.len(), total = ledger.len(), "Listing messages");

    match format {
        OutputFormat::Table => print!("{}", render_table(&visible, &config.date_format)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&visible)?),
    }
    Ok(())
}

fn cmd_classify(file: Option<PathBuf>, pretty: bool) -> anyhow::Result<()> {
    let content = match &file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let raw = JsonExport::parse(&content)?;
    let classified = classify(&raw);
    info!(input = raw.len(), classified = classified.len(), "Classified batch");

    let json = if pretty {
        serde_json::to_string_pretty(&classified)?
    } else {
        serde_json::to_string(&classified)?
    };
    println!("{}", json);
    Ok(())
}

async fn cmd_watch(config: &Config, inbox: Inbox, view: ViewState) -> anyhow::Result<()> {
    let mut ledger = Ledger::new(inbox, config);
    ledger.set_direction_filter(view.direction);
    ledger.set_search_text(view.search);

    let handle = MonitorHandle::spawn(ledger, config.poll_interval());
    let mut snapshots = handle.subscribe();
    handle.send(Intent::GrantPermission).await?;

    let mut input = tokio::spawn(read_intents(handle.sender()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = &mut input => {
                debug!("stdin closed");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                print!("{}", render_snapshot(&snapshot, &config.date_format));
            }
        }
    }

    input.abort();
    handle.shutdown().await;
    Ok(())
}

/// Forward stdin commands to the monitor until stdin closes
async fn read_intents(intents: mpsc::Sender<Intent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Intent>() {
            Ok(intent) => {
                if intents.send(intent).await.is_err() {
                    break;
                }
            }
            Err(e) => eprintln!(
                "{} (commands: filter <all|debited|credited>, search [text], refresh, grant, revoke)",
                e
            ),
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn render_snapshot(snapshot: &Snapshot, date_format: &str) -> String {
    if snapshot.permission == PermissionState::Denied {
        return format!("{}\n", PERMISSION_NOTICE);
    }

    let mut out = format!(
        "\n== {} of {} messages | filter: {} | search: \"{}\"",
        snapshot.visible.len(),
        snapshot.total,
        snapshot.view.direction,
        snapshot.view.search
    );
    if let Some(at) = snapshot.last_refreshed {
        out.push_str(&format!(
            " | refreshed {}",
            at.with_timezone(&chrono::Local).format("%H:%M:%S")
        ));
    }
    out.push('\n');
    if let Some(err) = &snapshot.last_error {
        out.push_str(&format!("Last refresh failed: {}\n", err));
    }
    out.push_str(&render_table(&snapshot.visible, date_format));
    out
}

fn render_table(messages: &[ClassifiedMessage], date_format: &str) -> String {
    if messages.is_empty() {
        return "No transactions found\n".to_string();
    }

    let mut out = format!(
        "{:<10}  {:<16}  {:<8}  {:>12}  {:<8}  {:<12}  {}\n",
        "DATE", "AGE", "TYPE", "AMOUNT", "CATEGORY", "SENDER", "MESSAGE"
    );
    for m in messages {
        out.push_str(&format!(
            "{:<10}  {:<16}  {:<8}  {:>12}  {:<8}  {:<12}  {}\n",
            m.formatted_date(date_format),
            m.relative_age,
            m.direction.to_string(),
            m.amount,
            m.category.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
            m.sender,
            preview(&m.body),
        ));
    }
    out
}

fn preview(body: &str) -> String {
    let flat = body.replace(['\n', '\r'], " ");
    if flat.chars().count() > BODY_PREVIEW_CHARS {
        let cut: String = flat.chars().take(BODY_PREVIEW_CHARS - 3).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sms_ledger::classifier::classify_at;

    fn sample() -> Vec<ClassifiedMessage> {
        classify_at(
            &[
                RawMessage::new("1", Some("HDFCBK"), "Rs.500 debited at grocery", None),
                RawMessage::new("2", None, "INR 1,000 credited", None),
            ],
            Utc::now(),
        )
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short\nbody"), "short body");
        let long = "x".repeat(100);
        let p = preview(&long);
        assert_eq!(p.chars().count(), BODY_PREVIEW_CHARS);
        assert!(p.ends_with("..."));
    }

    #[test]
    fn test_render_table() {
        let table = render_table(&sample(), "%d/%m/%Y");
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("DATE"));
        assert!(lines[1].contains("debited"));
        assert!(lines[1].contains("Grocery"));
        assert!(lines[2].contains("Unknown"));
        assert!(lines[2].contains("1,000"));
        assert_eq!(render_table(&[], "%d/%m/%Y"), "No transactions found\n");
    }

    #[test]
    fn test_render_denied_snapshot() {
        let snapshot = Snapshot {
            permission: PermissionState::Denied,
            ..Snapshot::default()
        };
        assert!(render_snapshot(&snapshot, "%d/%m/%Y").contains("permission denied"));
    }

    #[test]
    fn test_render_snapshot_header() {
        let visible = sample();
        let snapshot = Snapshot {
            permission: PermissionState::Granted,
            view: ViewState::new(DirectionFilter::Debited, "rs"),
            total: 5,
            visible,
            last_refreshed: Some(Utc::now()),
            last_error: Some("disk gone".to_string()),
        };
        let out = render_snapshot(&snapshot, "%d/%m/%Y");
        assert!(out.contains("2 of 5 messages"));
        assert!(out.contains("filter: debited"));
        assert!(out.contains("Last refresh failed: disk gone"));
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["sms-ledger", "list", "--filter", "credited", "--search", "sbi"]).unwrap();
        match cli.command {
            Commands::List { view, .. } => {
                assert_eq!(view.filter, DirectionFilter::Credited);
                assert_eq!(view.search, "sbi");
            }
            _ => panic!("expected list"),
        }
        assert!(Cli::try_parse_from(["sms-ledger", "list", "--db", "a.db", "--json", "b.json"]).is_err());
        assert!(Cli::try_parse_from(["sms-ledger", "list", "--filter", "sideways"]).is_err());
    }
}
