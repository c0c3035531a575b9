//! dashcache - command-line driver for the dashboard cache.
//!
//! Reads words, quotations and tasks through the freshness policy, or runs
//! explicit syncs, and prints the result as JSON on stdout. Logs go to
//! stderr (and to `$DASHCACHE_LOG_DIR/dashcache.log` when set).

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dashcache_core::cache::StoreHandle;
use dashcache_core::models::RecordKind;
use dashcache_core::{Config, FreshnessPolicy, HttpFetcher};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// Words returned by `dashcache words` when no count is given
const DEFAULT_WORD_COUNT: usize = 1;

/// Log file name inside `$DASHCACHE_LOG_DIR`
const LOG_FILE: &str = "dashcache.log";

const USAGE: &str = "\
usage: dashcache <command>

commands:
  sync <words|quotations|tasks|all>   reconcile from the remote sources
  words [N | --all]                   N random words, or every cached word
  quotation                           one random quotation
  quotations --all                    every cached quotation
  tasks [--refresh]                   tasks due today or earlier
  info <kind>                         last sync time and row count
  direct <kind> [--all]               remote data, bypassing the cache";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer and must be held until exit.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os("DASHCACHE_LOG_DIR") {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(PathBuf::from(dir), LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

fn parse_kind(arg: &str) -> Result<RecordKind> {
    Ok(arg.parse()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let Some((&command, rest)) = args.split_first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let config = Config::load()?;
    let db_path = config.database_path()?;
    info!(path = %db_path.display(), "dashcache starting");

    let store = Arc::new(StoreHandle::new(db_path));
    let fetcher = HttpFetcher::from_config(&config).context("Failed to build HTTP client")?;
    let policy = FreshnessPolicy::new(Arc::clone(&store), fetcher);

    let result = run(&policy, command, rest).await;
    store.close()?;
    result
}

async fn run(policy: &FreshnessPolicy<HttpFetcher>, command: &str, rest: &[&str]) -> Result<()> {
    match (command, rest) {
        ("sync", ["all"]) => {
            let results =
                futures::future::join_all(RecordKind::ALL.iter().map(|&kind| policy.sync(kind)))
                    .await;
            let summaries = results.into_iter().collect::<Result<Vec<_>, _>>()?;
            print_json(&summaries)
        }
        ("sync", [kind]) => {
            let summary = policy.sync(parse_kind(kind)?).await?;
            print_json(&summary)
        }
        ("words", ["--all"]) => print_json(&policy.all_words().await?),
        ("words", []) => print_json(&policy.random_words(DEFAULT_WORD_COUNT).await?),
        ("words", [count]) => {
            let n: usize = count
                .parse()
                .with_context(|| format!("invalid word count: {}", count))?;
            print_json(&policy.random_words(n).await?)
        }
        ("quotation", []) => print_json(&policy.random_quotation().await?),
        ("quotations", ["--all"]) => print_json(&policy.all_quotations().await?),
        ("tasks", []) => print_json(&policy.due_tasks(false).await?),
        ("tasks", ["--refresh"]) => print_json(&policy.due_tasks(true).await?),
        ("info", [kind]) => {
            let kind = parse_kind(kind)?;
            let sync = policy.sync_info(kind).await?;
            let mut info = json!({
                "kind": kind,
                "lastSync": sync.as_ref().map(|s| s.last_sync),
                "recordCount": sync.as_ref().map(|s| s.record_count),
                "age": sync.as_ref().map(|s| s.age_display()),
                "stale": sync.as_ref().map_or(true, |s| s.is_stale()),
            });
            if kind == RecordKind::Word {
                info["cache"] = serde_json::to_value(policy.words_cache_info().await?)?;
            }
            print_json(&info)
        }
        ("direct", [kind]) => print_json(&policy.direct(parse_kind(kind)?, false).await?),
        ("direct", [kind, "--all"]) => {
            print_json(&policy.direct(parse_kind(kind)?, true).await?)
        }
        ("sync" | "info" | "direct", []) => {
            bail!("missing record kind (words, quotations or tasks)")
        }
        _ => bail!("unrecognized command: {} {}\n\n{}", command, rest.join(" "), USAGE),
    }
}
