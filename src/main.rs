use anyhow::Context;
use camarabot::backfill::{Backfill, BackfillLimits, BackfillReport, BackfillTarget};
use camarabot::format::format_currency;
use camarabot::prelude::*;
use camarabot::processor::RunSummary;
use camarabot::store::Store;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Modules logging at `warn` unless `RUST_LOG` says otherwise
const NOISY_MODULES: &[&str] = &["hyper", "reqwest", "h2", "rustls"];

/// Monitor of bills, votes, provisional decrees and expenses of the Câmara dos Deputados
#[derive(Parser, Debug)]
#[command(name = "camarabot")]
#[command(about = "Collect, rank and publish Câmara dos Deputados records")]
#[command(version)]
struct Args {
    /// Directory holding estado.json, monitor_pl.db and outbox.jsonl
    /// (default: $HOME/.camarabot, or CAMARABOT_DIR env var)
    #[arg(long = "data-dir", global = true)]
    data_dir: Option<String>,

    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Track recently presented bills and publish the most relevant one
    Bills {
        /// Print the thread instead of queueing it in the outbox
        #[arg(long)]
        dry_run: bool,
    },

    /// Track recent votes and publish the most relevant one
    Votes {
        #[arg(long)]
        dry_run: bool,
    },

    /// Track provisional decrees and publish the most relevant one
    Decrees {
        #[arg(long)]
        dry_run: bool,
    },

    /// Publish the expenses of the next legislator in the rotation
    Expenses {
        #[arg(long)]
        dry_run: bool,
    },

    /// Publish a digest of the bills in the collection window
    Summary {
        #[arg(long)]
        dry_run: bool,
    },

    /// Load historical data into the database
    Backfill {
        /// What to collect
        #[arg(value_parser = ["all", "expenses", "bills", "votes", "decrees"])]
        target: String,

        /// Years of history, counting the current one
        #[arg(long, default_value_t = 5)]
        years: u32,

        /// Collect a small sample of the last year only
        #[arg(long)]
        test: bool,

        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Create the database schema
    InitDb {
        /// Drop every table first
        #[arg(long)]
        reset: bool,

        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Print row counts of the database
    Stats,
}

fn print_available_commands() {
    println!("Available commands:");
    println!("  bills     Track recently presented bills");
    println!("  votes     Track recent votes");
    println!("  decrees   Track provisional decrees");
    println!("  expenses  Publish the next legislator's expenses");
    println!("  summary   Publish a digest of recent bills");
    println!("  backfill  Load historical data into the database");
    println!("  init-db   Create (or reset) the database schema");
    println!("  stats     Print database row counts");
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let mut directives = level;
        for module in NOISY_MODULES {
            directives.push_str(&format!(",{}=warn", module));
        }
        EnvFilter::new(directives)
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Data directory named by `--data-dir` or `CAMARABOT_DIR`
fn explicit_data_dir(data_dir: Option<String>) -> Option<PathBuf> {
    data_dir
        .or_else(|| std::env::var("CAMARABOT_DIR").ok())
        .map(PathBuf::from)
}

fn home_data_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".camarabot"))
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let explicit = explicit_data_dir(args.data_dir.clone());
    let config = match &args.config {
        // the file's data_dir sits between the flag/env and the home default
        Some(path) => Config::from_yaml_file(path, explicit, home_data_dir())
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => {
            let data_dir = explicit
                .or_else(home_data_dir)
                .context("HOME is not set; pass --data-dir")?;
            ConfigBuilder::new(data_dir).build()?
        }
    };
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data directory: {}", config.data_dir.display()))?;
    Ok(config)
}

/// Read one line from stdin after printing `prompt`; `None` on end of input.
fn prompt_line(prompt: &str) -> anyhow::Result<Option<String>> {
    eprint!("{}", prompt);
    io::stderr().flush().ok();
    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn print_run_summary(summary: &RunSummary) {
    println!(
        "{:<10} {:>9} {:>5} {:>8} {:>7}  {:<28} {}",
        "task", "collected", "new", "changed", "pruned", "selected", "outcome"
    );
    println!(
        "{:<10} {:>9} {:>5} {:>8} {:>7}  {:<28} {}",
        summary.task,
        summary.collected,
        summary.new_count,
        summary.changed_count,
        summary.pruned,
        summary.selected.as_deref().unwrap_or("-"),
        summary.outcome
    );
}

fn print_backfill_reports(reports: &[BackfillReport]) {
    println!(
        "{:<10} {:>9} {:>9} {:>7}  {}",
        "stage", "records", "requests", "failed", "status"
    );
    for report in reports {
        let status = match &report.error {
            None => "ok".to_string(),
            Some(e) => format!("error: {}", e),
        };
        println!(
            "{:<10} {:>9} {:>9} {:>7}  {}",
            report.target.as_str(),
            report.records,
            report.requests,
            report.failed_units,
            status
        );
    }
}

fn print_stats(store: &Store) -> anyhow::Result<()> {
    let stats = store.statistics()?;
    let rows = [
        ("deputados", stats.legislators),
        ("gastos", stats.expenses),
        ("projetos_lei", stats.bills),
        ("votacoes", stats.votes),
        ("votos_deputados", stats.ballots),
        ("medidas_provisorias", stats.decrees),
        ("coletas em andamento", stats.unfinished_collections),
    ];
    println!("{:<22} {:>10}", "table", "rows");
    for (name, count) in rows {
        println!("{:<22} {:>10}", name, count);
    }
    println!("{:<22} {:>10}", "total gastos", format_currency(stats.expense_total));
    Ok(())
}

async fn run_publishing_command(args: &Args, command: &Command) -> anyhow::Result<()> {
    let (task, dry_run) = match command {
        Command::Bills { dry_run } => ("bills", *dry_run),
        Command::Votes { dry_run } => ("votes", *dry_run),
        Command::Decrees { dry_run } => ("decrees", *dry_run),
        Command::Expenses { dry_run } => ("expenses", *dry_run),
        Command::Summary { dry_run } => ("summary", *dry_run),
        _ => unreachable!(),
    };

    let config = load_config(args)?;
    let outbox_path = config.outbox_path();
    let processor = TrackerProcessor::new(config)?;
    let now = Utc::now();

    let mut publisher: Box<dyn Publisher> = if dry_run {
        Box::new(StdoutPublisher::new())
    } else {
        Box::new(OutboxPublisher::open(&outbox_path)?)
    };

    let summary = match task {
        "bills" => processor.run_tracker(EntityKind::Bill, publisher.as_mut(), now).await?,
        "votes" => processor.run_tracker(EntityKind::Vote, publisher.as_mut(), now).await?,
        "decrees" => processor.run_tracker(EntityKind::Decree, publisher.as_mut(), now).await?,
        "expenses" => processor.run_expenses(publisher.as_mut(), now).await?,
        _ => processor.run_summary(publisher.as_mut(), now).await?,
    };

    print_run_summary(&summary);
    if summary.failed() {
        anyhow::bail!("publishing failed: {}", summary.outcome);
    }
    Ok(())
}

async fn run_backfill_command(args: &Args, command: &Command) -> anyhow::Result<()> {
    let Command::Backfill {
        target,
        years,
        test,
        yes,
    } = command
    else {
        unreachable!()
    };

    let targets = BackfillTarget::parse_list(target)?;
    let limits = if *test {
        BackfillLimits::test()
    } else {
        BackfillLimits::full(*years)
    };

    if targets.len() > 1 && !*test && !*yes {
        eprintln!(
            "About to backfill {} years of expenses, bills, votes and decrees. This takes hours.",
            limits.years
        );
        if prompt_line("Press ENTER to start (Ctrl-D to cancel)... ")?.is_none() {
            eprintln!("Cancelled");
            return Ok(());
        }
    }

    let config = load_config(args)?;
    let store = Store::open(&config.database_path())?;
    let api = camarabot::ApiClient::new(&config.api)?;
    let backfill = Backfill::new(&api, &store, &config, limits, Utc::now());

    let reports = backfill.run(&targets).await;
    print_backfill_reports(&reports);
    println!();
    print_stats(&store)?;

    if reports.iter().all(|r| !r.succeeded()) {
        anyhow::bail!("every backfill stage failed");
    }
    Ok(())
}

fn run_init_db_command(args: &Args, reset: bool, yes: bool) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let path = config.database_path();

    if reset && !yes {
        let answer = prompt_line("Really drop every table? Type 'sim' to confirm: ")?;
        if !matches!(answer.as_deref().map(str::to_lowercase).as_deref(), Some("sim")) {
            println!("Cancelled");
            return Ok(());
        }
    }

    let store = Store::open(&path)?;
    if reset {
        store.reset()?;
    }
    println!("Database ready: {}", path.display());
    println!();
    print_stats(&store)
}

fn run_stats_command(args: &Args) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let store = Store::open(&config.database_path())?;
    print_stats(&store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    let result = match &args.command {
        Some(
            cmd @ (Command::Bills { .. }
            | Command::Votes { .. }
            | Command::Decrees { .. }
            | Command::Expenses { .. }
            | Command::Summary { .. }),
        ) => run_publishing_command(&args, cmd).await,
        Some(cmd @ Command::Backfill { .. }) => run_backfill_command(&args, cmd).await,
        Some(Command::InitDb { reset, yes }) => run_init_db_command(&args, *reset, *yes),
        Some(Command::Stats) => run_stats_command(&args),
        None => {
            print_available_commands();
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %format!("{:#}", e), "run failed");
    }
    result
}
