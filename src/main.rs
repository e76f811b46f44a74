//! CLI entry point for `replyscan`.

use std::path::PathBuf;
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use replyscan::cache::{resolve_item_reference, ItemReference, NumberedCache};
use replyscan::config::Config;
use replyscan::conversation::{related_emails, ConversationQuery};
use replyscan::folders::{self, FolderNode, FolderSelector};
use replyscan::model::{EmailRecord, Importance};
use replyscan::pending::{list_pending_replies, PendingRequest, PendingScan};
use replyscan::scan::collect_emails_across_folders;
use replyscan::session::Session;
use replyscan::store::memory::MemoryStore;
use replyscan::store::{DefaultFolder, FolderRef, ItemKind};

#[derive(Parser)]
#[command(
    name = "replyscan",
    version,
    about = "Find the mails still waiting for your answer"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON mailbox snapshot to operate on
    #[arg(short, long, global = true, value_name = "FILE", env = "REPLYSCAN_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Where a listing reads from: one named folder (default: the inbox) or all.
#[derive(clap::Args, Clone)]
struct FolderScope {
    /// Folder name (case-insensitive); defaults to the inbox
    #[arg(long)]
    folder: Option<String>,
    /// Scan every mail folder
    #[arg(long, conflicts_with = "folder")]
    all: bool,
    /// How many days back to look
    #[arg(long, default_value_t = 7)]
    days: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// List the folder tree
    Folders {
        /// Start from the folder with this name
        #[arg(long)]
        root_name: Option<String>,
        /// Start from the folder at this path
        #[arg(long)]
        root_path: Option<String>,
        /// Start from the folder with this id
        #[arg(long)]
        root_id: Option<String>,
        #[arg(long, default_value_t = 2)]
        depth: usize,
        #[arg(long)]
        json: bool,
    },
    /// List recent messages, newest first
    Recent {
        #[command(flatten)]
        scope: FolderScope,
        /// Stop after this many messages
        #[arg(long)]
        max: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Search recent messages (terms are AND-ed, groups split by " OR ")
    Search {
        term: String,
        #[command(flatten)]
        scope: FolderScope,
        #[arg(long)]
        json: bool,
    },
    /// Show the conversation of a message
    Thread {
        /// Listing number from `recent` (same scope flags) or a message id
        reference: String,
        #[command(flatten)]
        scope: FolderScope,
        /// Related messages to show
        #[arg(long, default_value_t = 5)]
        max_items: usize,
        /// Days of conversation history to search
        #[arg(long, default_value_t = 30)]
        lookback: u32,
        #[arg(long)]
        json: bool,
    },
    /// List messages still waiting for your reply
    Pending {
        #[arg(long, default_value_t = 14)]
        days: u32,
        #[arg(long)]
        folder: Option<String>,
        #[arg(long, default_value_t = 10)]
        max_results: usize,
        #[arg(long, conflicts_with = "folder")]
        all: bool,
        #[arg(long)]
        unread_only: bool,
        /// Days of conversation history checked for replies
        #[arg(long)]
        lookback: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Resolve a folder by id, path or name
    Resolve {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Save it to the config file instead ($REPLYSCAN_CONFIG or the user config dir)
        #[arg(long)]
        write: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = replyscan::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
        Commands::Config { write } => cmd_config(&config, write),
        command => {
            let path = cli
                .snapshot
                .ok_or_else(|| anyhow::anyhow!("No mailbox snapshot given (use --snapshot)"))?;
            let store = MemoryStore::load(&path)?;
            let session = Session::from_config(&store, &config);
            run(&session, &config, command)
        }
    }
}

fn run(session: &Session<'_>, config: &Config, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Folders {
            root_name,
            root_path,
            root_id,
            depth,
            json,
        } => {
            let selector = FolderSelector {
                id: root_id,
                path: root_path,
                name: root_name,
            };
            let nodes = folders::list_folders(session, Some(&selector), depth)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else {
                print_folder_tree(&nodes);
            }
            Ok(())
        }
        Commands::Recent { scope, max, json } => {
            let records = collect(session, &scope, None, max)?;
            print_listing(&records, json)
        }
        Commands::Search { term, scope, json } => {
            let records = collect(session, &scope, Some(&term), None)?;
            print_listing(&records, json)
        }
        Commands::Thread {
            reference,
            scope,
            max_items,
            lookback,
            json,
        } => cmd_thread(session, config, &reference, &scope, max_items, lookback, json),
        Commands::Pending {
            days,
            folder,
            max_results,
            all,
            unread_only,
            lookback,
            json,
        } => {
            let request = PendingRequest {
                days,
                folder_name: folder,
                max_results,
                all_folders: all,
                unread_only,
                conversation_lookback_days: lookback,
            };
            cmd_pending(session, &request, json)
        }
        Commands::Resolve {
            id,
            path,
            name,
            json,
        } => {
            let selector = FolderSelector { id, path, name };
            if selector.is_empty() {
                anyhow::bail!("Give at least one of --id, --path or --name");
            }
            let (folder, attempts) = folders::resolve(session, &selector);
            if json {
                let output = serde_json::json!({
                    "folder": folder,
                    "attempts": attempts,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                match folder {
                    Some(folder) => println!(
                        "  {} ({})",
                        folder.name,
                        folder.path.as_deref().unwrap_or("no path")
                    ),
                    None => {
                        println!("  Folder not found");
                        for attempt in &attempts {
                            println!("    tried {attempt}");
                        }
                    }
                }
            }
            Ok(())
        }
        Commands::Completions { .. } | Commands::Manpage | Commands::Config { .. } => Ok(()),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = replyscan::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "replyscan.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Folders a scope points at.
fn scope_folders(session: &Session<'_>, scope: &FolderScope) -> anyhow::Result<Vec<FolderRef>> {
    if scope.all {
        return Ok(folders::all_mail_folders(session));
    }
    let folder = match scope.folder.as_deref() {
        Some(name) => folders::folder_by_name(session, name)?
            .ok_or_else(|| anyhow::anyhow!("Folder '{name}' not found"))?,
        None => session.call("open inbox", |store| store.default_folder(DefaultFolder::Inbox))?,
    };
    Ok(vec![folder])
}

fn collect(
    session: &Session<'_>,
    scope: &FolderScope,
    term: Option<&str>,
    max: Option<usize>,
) -> anyhow::Result<Vec<EmailRecord>> {
    let max_days = session.scan().max_days;
    if scope.days < 1 || scope.days > max_days {
        anyhow::bail!("--days must be between 1 and {max_days}");
    }
    let folders = scope_folders(session, scope)?;
    let mut records = collect_emails_across_folders(session, &folders, scope.days, term, max);
    if let Some(max) = max {
        records.truncate(max);
    }
    Ok(records)
}

fn cmd_thread(
    session: &Session<'_>,
    config: &Config,
    reference: &str,
    scope: &FolderScope,
    max_items: usize,
    lookback: u32,
    json: bool,
) -> anyhow::Result<()> {
    let reference = ItemReference::parse(reference);
    let mut cache = NumberedCache::from_config(&config.cache);
    if matches!(reference, ItemReference::Number(_)) {
        // Numbers refer to the listing `recent` prints for the same scope.
        cache.replace_with(collect(session, scope, None, None)?);
    }

    let (cached, item) = resolve_item_reference(session, &cache, &reference)?;
    let seed = match cached {
        Some(record) => record,
        None => replyscan::format::format_item(item.as_ref(), &session.format_options())?,
    };
    let query = ConversationQuery::new(max_items, lookback);
    let related = related_emails(session, item.as_ref(), &query);

    if json {
        let output = serde_json::json!({
            "message": seed,
            "related_count": related.len(),
            "related": related,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("  {}", seed.subject);
    println!("  From: {} <{}>", seed.sender, seed.sender_email);
    println!("  Date: {}", received_display(&seed));
    if seed.importance != Importance::Normal {
        println!("  Importance: {}", seed.importance.label());
    }
    if let Some(id) = seed
        .conversation_id
        .as_deref()
        .and_then(|id| replyscan::format::trim_conversation_id(id, 16))
    {
        println!("  Conversation: {id}");
    }
    println!();
    print_records_table(&related);
    Ok(())
}

fn cmd_pending(session: &Session<'_>, request: &PendingRequest, json: bool) -> anyhow::Result<()> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Checking replies [{bar:40.cyan/blue}] {pos}/{len}")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let result = list_pending_replies(
        session,
        request,
        Some(&|current, total| {
            pb.set_length(total);
            pb.set_position(current);
        }),
    )?;
    pb.finish_and_clear();
    tracing::info!(elapsed = ?start.elapsed(), "Pending scan finished");

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_pending(&result);
    }
    Ok(())
}

/// Print records numbered from 1, the numbers `thread` accepts.
fn print_listing(records: &[EmailRecord], json: bool) -> anyhow::Result<()> {
    if json {
        let items: Vec<serde_json::Value> = records
            .iter()
            .enumerate()
            .map(|(i, r)| {
                serde_json::json!({
                    "number": i + 1,
                    "message": r,
                })
            })
            .collect();
        let output = serde_json::json!({
            "result_count": items.len(),
            "results": items,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_records_table(records);
    }
    Ok(())
}

fn received_display(record: &EmailRecord) -> &str {
    record
        .received
        .as_ref()
        .map(|t| t.display.as_str())
        .unwrap_or("Unknown")
}

fn print_records_table(records: &[EmailRecord]) {
    println!();
    println!("  {} message(s)", records.len());
    println!();

    if records.is_empty() {
        return;
    }

    println!(
        "  {:<4} {:<19} {:<25} {}",
        "#", "Received", "From", "Subject"
    );
    println!("  {}", "-".repeat(92));

    for (i, record) in records.iter().enumerate() {
        let from = if record.sender.is_empty() {
            &record.sender_email
        } else {
            &record.sender
        };
        let from_trunc: String = from.chars().take(24).collect();
        let subj_trunc: String = record.subject.chars().take(39).collect();
        let marker = if record.unread { "*" } else { "" };

        println!(
            "  {:<4} {:<19} {:<25} {:<40} {}",
            i + 1,
            received_display(record),
            from_trunc,
            subj_trunc,
            marker
        );
    }
    println!();
}

fn print_pending(result: &PendingScan) {
    if !result.owner_known {
        println!("  Warning: no owner address known; only reply flags were checked.");
    }
    println!();
    println!(
        "  {} pending of {} checked{}",
        result.items.len(),
        result.processed,
        if result.truncated { " (scan cut short)" } else { "" }
    );
    println!();

    for (i, pending) in result.items.iter().enumerate() {
        let record = &pending.record;
        println!(
            "  {:>3}. {}  {}  {}",
            i + 1,
            received_display(record),
            record.sender,
            record.subject
        );
        if let Some(outline) = &pending.outline {
            for line in outline.lines() {
                println!("       {line}");
            }
        }
        println!();
    }
}

fn print_folder_tree(nodes: &[FolderNode]) {
    println!();
    for node in nodes {
        let counts = match (node.folder.unread_count, node.folder.total_count) {
            (Some(unread), Some(total)) => format!("  ({unread}/{total})"),
            (None, Some(total)) => format!("  ({total})"),
            _ => String::new(),
        };
        let kind = match node.folder.default_item_kind {
            Some(kind) if kind != ItemKind::Mail => format!("  [{}]", kind.label()),
            _ => String::new(),
        };
        println!(
            "  {}{}{}{}",
            "  ".repeat(node.depth),
            node.folder.name,
            counts,
            kind
        );
    }
    println!();
}

/// Print the effective configuration, or save it and report where.
fn cmd_config(config: &Config, write: bool) -> anyhow::Result<()> {
    if write {
        let path = replyscan::config::save_config(config)?;
        println!("  Saved config to {}", path.display());
    } else {
        print!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "replyscan", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
