use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{Level, debug};

use tminus::clock::{Clock, SystemClock};
use tminus::counter::config::{Digit, encode, parse_instant};
use tminus::counter::history::HistoryLedger;
use tminus::display::{format_counter, unit_label};
use tminus::ticker::TickerHandle;
use tminus::{ConfigPatch, FieldValue, FileStore, MemoryParams, Session};

#[derive(Parser, Debug)]
#[command(
    name = "tminus",
    version,
    about = "Shareable countdown links with a local history"
)]
struct Cli {
    /// Directory the history list is stored in.
    #[arg(long, default_value = ".tminus")]
    history: PathBuf,

    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a link, record it in the history and print the counter.
    Show {
        query: String,

        /// Live ticks to print after the initial value.
        #[arg(long, default_value_t = 0)]
        ticks: u32,
    },
    /// Apply changes to a link and print the resulting query.
    Set {
        query: String,

        #[arg(long)]
        end_date: Option<String>,

        /// Comma separated subset of d,h,m,s.
        #[arg(long)]
        digits: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        image_id: Option<String>,

        /// Print a fresh link without recording it.
        #[arg(long)]
        new: bool,
    },
    /// List recently shown counters, newest first.
    History,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .compact()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    debug!("using history directory {}", cli.history.display());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    match cli.command {
        Command::Show { query, ticks } => show(&cli.history, &query, ticks, clock),
        Command::Set {
            query,
            end_date,
            digits,
            title,
            image_id,
            new,
        } => {
            let patch = ConfigPatch {
                end_date: end_date.as_deref().map(parse_end_date_arg).transpose()?,
                digits: digits.as_deref().map(parse_digits_arg).transpose()?,
                title,
                image_id,
            };
            set(&cli.history, &query, &patch, new, clock)
        }
        Command::History => history(&cli.history),
    }
}

fn show(history_dir: &Path, query: &str, ticks: u32, clock: Arc<dyn Clock>) -> Result<()> {
    let session = Session::open(
        MemoryParams::from_query(query_part(query)),
        FileStore::new(history_dir),
        Arc::clone(&clock),
    )
    .context("failed to record history")?;
    let config = session.config();

    println!(
        "Title: {}",
        if config.title.is_empty() { "-" } else { config.title.as_str() }
    );
    println!("End date: {}", encode(&FieldValue::EndDate(config.end_date)));
    println!(
        "Digits: {}",
        encode(&FieldValue::Digits(config.digits.clone()))
    );
    if !config.image_id.is_empty() {
        println!("Image: {}", config.image_id);
    }
    for digit in &config.digits {
        println!(
            "  {}: {}",
            unit_label(*digit, session.is_countdown()),
            session.delta().get(*digit)
        );
    }

    if ticks == 0 {
        println!(
            "{}",
            format_counter(&session.delta(), &config.digits, session.is_countdown())
        );
        return Ok(());
    }

    let (tx, rx) = mpsc::channel();
    let mut handle = TickerHandle::spawn(config.end_date, clock, move |delta| {
        let _ = tx.send(delta);
    });
    let countdown = handle.is_countdown();
    for _ in 0..=ticks {
        let delta = rx
            .recv_timeout(Duration::from_secs(3))
            .context("ticker stopped unexpectedly")?;
        println!("{}", format_counter(&delta, &config.digits, countdown));
    }
    handle.stop();
    Ok(())
}

fn set(
    history_dir: &Path,
    query: &str,
    patch: &ConfigPatch,
    new: bool,
    clock: Arc<dyn Clock>,
) -> Result<()> {
    let mut session = Session::open(
        MemoryParams::from_query(query_part(query)),
        FileStore::new(history_dir),
        clock,
    )
    .context("failed to record history")?;

    if new {
        println!("?{}", session.preview_merge(patch));
        return Ok(());
    }
    session
        .merge(patch)
        .context("failed to record history")?;
    println!("?{}", session.params());
    Ok(())
}

fn history(history_dir: &Path) -> Result<()> {
    let ledger = HistoryLedger::new(FileStore::new(history_dir));
    let items = ledger.items().context("failed to read history")?;
    if items.is_empty() {
        println!("No history yet");
        return Ok(());
    }
    for item in items {
        println!(
            "{}  {}  ?{}",
            item.date.to_rfc3339(),
            item.title,
            item.serialized_params
        );
    }
    Ok(())
}

/// Accepts a bare query or a full link.
fn query_part(input: &str) -> &str {
    match input.split_once('?') {
        Some((_, query)) => query,
        None => input,
    }
}

fn parse_end_date_arg(input: &str) -> Result<chrono::DateTime<chrono::FixedOffset>> {
    match parse_instant(input) {
        Some(instant) => Ok(instant),
        None => bail!("invalid --end-date '{input}', expected an ISO-8601 date-time"),
    }
}

fn parse_digits_arg(input: &str) -> Result<Vec<Digit>> {
    let mut digits = Vec::new();
    for token in input.split(',').map(str::trim).filter(|token| !token.is_empty()) {
        let Some(digit) = Digit::from_token(token) else {
            bail!("invalid digit '{token}', expected a subset of d,h,m,s");
        };
        if !digits.contains(&digit) {
            digits.push(digit);
        }
    }
    Ok(digits)
}
