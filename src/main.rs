//! VO CPU-hour accounting CLI
//!
//! Usage:
//!   vo-cpu-accounting run --date-from 2024/01 --date-to 2024/03
//!   vo-cpu-accounting run --records-dir ./captured --save-registry
//!   vo-cpu-accounting show --worksheet cpu-hours
//!
//! Every `run` option can also come from the environment (a `.env` file is
//! honoured) or from a TOML file given with `--config`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use vo_cpu_accounting::{
    accounting::{AccountingPortalClient, AccountingSource, RecordsDirectory},
    config::{log_directive, Config, FileSettings, GridArgs, RunArgs, DEFAULT_LOG},
    grid::SqliteWorksheet,
    Aggregator, Registry, ReportGrid,
};

#[derive(Parser, Debug)]
#[command(name = "vo-cpu-accounting")]
#[command(about = "Reconcile VO CPU-hour accounting into the period x VO report")]
struct Cli {
    /// Optional TOML configuration file
    #[arg(short, long, global = true, env = "ACCOUNTING_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch the reporting window's accounting and update the worksheet
    Run(RunArgs),

    /// Print the stored worksheet
    Show(GridArgs),
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directive(level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => FileSettings::load(path)?,
        None => FileSettings::default(),
    };

    match cli.command {
        Commands::Run(args) => {
            let config = Config::resolve(args, file)?;
            init_tracing(&config.log);
            run(&config)
        }
        Commands::Show(args) => {
            init_tracing(file.log.as_deref().unwrap_or(DEFAULT_LOG));
            let (path, worksheet) = args.resolve(&file);
            show(&path, &worksheet)
        }
    }
}

fn run(config: &Config) -> Result<()> {
    info!(log = %config.log, "log level");
    info!(
        "📋 Environmental settings\n{}",
        serde_json::to_string_pretty(config)?
    );

    let mut registry = Registry::load(&config.vos_file)
        .with_context(|| format!("Failed to load VO registry {:?}", config.vos_file))?;

    let sheet = SqliteWorksheet::open(&config.grid_db_path, &config.worksheet)
        .with_context(|| format!("Failed to open worksheet {:?}", config.grid_db_path))?;
    let mut grid = ReportGrid::new(sheet).context("Failed to prepare worksheet header")?;

    let source: Box<dyn AccountingSource> = match (&config.records_dir, &config.server_url) {
        (Some(dir), _) => {
            let replay = RecordsDirectory::new(dir);
            info!(dir = ?replay.root(), "📼 Replaying captured accounting records");
            Box::new(replay)
        }
        (None, Some(url)) => Box::new(AccountingPortalClient::new(url, config.timeout)?),
        (None, None) => anyhow::bail!("no accounting source configured"),
    };

    let settings = config.run_settings();
    let report = Aggregator::new(&settings, source.as_ref())
        .run(&registry, &mut grid)
        .context("Worksheet update failed, the run was aborted")?;

    if config.is_debug() {
        for outcome in &report.outcomes {
            debug!(vo = %outcome.name, status = ?outcome.status, "outcome");
        }
    }

    if config.save_registry {
        let updated = report.apply_to(&mut registry);
        registry
            .save(&config.vos_file)
            .with_context(|| format!("Failed to write VO registry {:?}", config.vos_file))?;
        info!(updated, path = ?config.vos_file, "💾 Cumulative CPU/h counters saved");
    }

    println!("\n{}", report.summary());
    Ok(())
}

fn show(path: &std::path::Path, worksheet: &str) -> Result<()> {
    let sheet = SqliteWorksheet::open(path, worksheet)
        .with_context(|| format!("Failed to open worksheet {:?}", path))?;
    let rows = sheet.snapshot()?;

    println!("Worksheet: {} ({:?})", sheet.name(), path);
    if rows.is_empty() {
        println!("(empty)");
        return Ok(());
    }

    let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..cols)
        .map(|c| {
            rows.iter()
                .filter_map(|r| r.get(c))
                .map(|v| v.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    for (i, row) in rows.iter().enumerate() {
        let line: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(c, w)| {
                let value = row.get(c).map(String::as_str).unwrap_or("");
                if c == 0 {
                    format!("{:<w$}", value, w = *w)
                } else {
                    format!("{:>w$}", value, w = *w)
                }
            })
            .collect();
        println!("{}", line.join(" | "));
        if i == 0 {
            println!("{}", "-".repeat(widths.iter().sum::<usize>() + 3 * cols.saturating_sub(1)));
        }
    }
    Ok(())
}
