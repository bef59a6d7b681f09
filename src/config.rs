//! Run configuration
//!
//! Precedence: command line, then environment (a `.env` file is loaded by
//! the binary), then the optional TOML file, then built-in defaults.

use crate::accounting::portal::DEFAULT_TIMEOUT;
use crate::aggregator::RunSettings;
use crate::models::{ReportingWindow, Scope, YearMonth};
use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_VOS_FILE: &str = "VOs.json";
pub const DEFAULT_GRID_DB_PATH: &str = "./accounting_report.db";
pub const DEFAULT_WORKSHEET: &str = "cpu-hours";
pub const DEFAULT_LOG: &str = "INFO";

/// Values read from the TOML configuration file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub server_url: Option<String>,
    pub scope: Option<Scope>,
    pub metric: Option<String>,
    pub date_from: Option<YearMonth>,
    pub date_to: Option<YearMonth>,
    pub local_job_selector: Option<String>,
    pub data_selector: Option<String>,
    pub log: Option<String>,
    pub vos_file: Option<PathBuf>,
    pub grid_db_path: Option<PathBuf>,
    pub worksheet: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl FileSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Worksheet location, shared by `run` and `show`.
#[derive(Debug, Clone, Default, Args)]
pub struct GridArgs {
    /// SQLite file holding the report worksheet
    #[arg(long, env = "GRID_DB_PATH")]
    pub grid_db_path: Option<PathBuf>,

    /// Worksheet name inside the SQLite file
    #[arg(long, env = "GRID_WORKSHEET")]
    pub worksheet: Option<String>,
}

impl GridArgs {
    pub fn resolve(&self, file: &FileSettings) -> (PathBuf, String) {
        let path = self
            .grid_db_path
            .clone()
            .or_else(|| file.grid_db_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_GRID_DB_PATH));
        let worksheet = self
            .worksheet
            .clone()
            .or_else(|| file.worksheet.clone())
            .unwrap_or_else(|| DEFAULT_WORKSHEET.to_string());
        (path, worksheet)
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Accounting portal base URL
    #[arg(long, env = "ACCOUNTING_SERVER_URL")]
    pub server_url: Option<String>,

    /// Accounting scope: htc or cloud
    #[arg(long, env = "ACCOUNTING_SCOPE")]
    pub scope: Option<Scope>,

    /// Portal metric, e.g. sum_elap_processors
    #[arg(long, env = "ACCOUNTING_METRIC")]
    pub metric: Option<String>,

    /// First month of the reporting window (YYYY/MM)
    #[arg(long, env = "DATE_FROM")]
    pub date_from: Option<YearMonth>,

    /// Last month of the reporting window (YYYY/MM)
    #[arg(long, env = "DATE_TO")]
    pub date_to: Option<YearMonth>,

    /// Portal local-job selector path segment
    #[arg(long, env = "ACCOUNTING_LOCAL_JOB_SELECTOR")]
    pub local_job_selector: Option<String>,

    /// Portal data selector path segment
    #[arg(long, env = "ACCOUNTING_DATA_SELECTOR")]
    pub data_selector: Option<String>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(long, env = "LOG")]
    pub log: Option<String>,

    /// VO registry file
    #[arg(long, env = "VOS_FILE")]
    pub vos_file: Option<PathBuf>,

    /// HTTP timeout for one portal request, in seconds
    #[arg(long, env = "ACCOUNTING_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Replay captured responses (<dir>/<vo>.json) instead of calling the portal
    #[arg(long)]
    pub records_dir: Option<PathBuf>,

    /// Write the updated CPU/h counters back to the registry file
    #[arg(long)]
    pub save_registry: bool,

    #[command(flatten)]
    pub grid: GridArgs,
}

/// Fully resolved settings of one run.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub server_url: Option<String>,
    pub scope: Scope,
    pub metric: String,
    pub window: ReportingWindow,
    pub local_job_selector: String,
    pub data_selector: String,
    pub log: String,
    pub vos_file: PathBuf,
    pub grid_db_path: PathBuf,
    pub worksheet: String,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub records_dir: Option<PathBuf>,
    pub save_registry: bool,
}

fn required<T>(value: Option<T>, name: &str, env: &str) -> Result<T> {
    value.ok_or_else(|| anyhow!("{} is not set (use --{} or {})", name, name.replace('_', "-"), env))
}

impl Config {
    pub fn resolve(args: RunArgs, file: FileSettings) -> Result<Self> {
        let (grid_db_path, worksheet) = args.grid.resolve(&file);

        let server_url = args.server_url.or(file.server_url);
        if server_url.is_none() && args.records_dir.is_none() {
            return Err(anyhow!(
                "server_url is not set (use --server-url or ACCOUNTING_SERVER_URL, or replay with --records-dir)"
            ));
        }

        let date_from = required(args.date_from.or(file.date_from), "date_from", "DATE_FROM")?;
        let date_to = required(args.date_to.or(file.date_to), "date_to", "DATE_TO")?;
        let window = ReportingWindow::new(date_from, date_to).context("Invalid reporting window")?;

        Ok(Self {
            server_url,
            scope: args.scope.or(file.scope).unwrap_or(Scope::Htc),
            metric: required(args.metric.or(file.metric), "metric", "ACCOUNTING_METRIC")?,
            window,
            local_job_selector: required(
                args.local_job_selector.or(file.local_job_selector),
                "local_job_selector",
                "ACCOUNTING_LOCAL_JOB_SELECTOR",
            )?,
            data_selector: required(
                args.data_selector.or(file.data_selector),
                "data_selector",
                "ACCOUNTING_DATA_SELECTOR",
            )?,
            log: args
                .log
                .or(file.log)
                .unwrap_or_else(|| DEFAULT_LOG.to_string()),
            vos_file: args
                .vos_file
                .or(file.vos_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_VOS_FILE)),
            grid_db_path,
            worksheet,
            timeout: args
                .timeout_secs
                .or(file.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
            records_dir: args.records_dir,
            save_registry: args.save_registry,
        })
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            scope: self.scope,
            metric: self.metric.clone(),
            window: self.window,
            local_job_selector: self.local_job_selector.clone(),
            data_selector: self.data_selector.clone(),
        }
    }

    /// Whether the configured level asks for request URLs and raw payloads.
    pub fn is_debug(&self) -> bool {
        let level = self.log.to_ascii_uppercase();
        level.contains("DEBUG") || level.contains("TRACE")
    }
}

/// `EnvFilter` directive for a `LOG` value such as `INFO` or `debug`.
pub fn log_directive(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
    .to_string()
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}
