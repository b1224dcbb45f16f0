//! # CLI
//!
//! Runs suites from CI pipelines and exposes the pattern classifier for
//! debugging suite files.
//!
//! - `nfcheck run suite.json --parallel --format json --report out.json`
//! - `nfcheck classify 'status.code:200'`

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::ValidationConfig;
use crate::error::{Error, Result};
use crate::http::client::HttpTransport;
use crate::testing::{RunMode, RunReport, Runner, Suite};
use crate::validation::classify;

/// nfcheck - validate network-function API responses
#[derive(Parser, Debug)]
#[command(name = "nfcheck")]
#[command(version, about, long_about = None)]
#[command(after_help = "Examples:
  nfcheck run suite.json                      Run steps one after another
  nfcheck run suite.json --parallel           One worker per target host
  nfcheck run suite.json --format json        Machine-readable report
  nfcheck classify '$.nfInstances[0].nfType==\"UDM\"'
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a suite file and report every step's verdict
    Run {
        /// Suite file (JSON)
        suite: PathBuf,

        /// Validation config file (JSON)
        #[arg(long, env = "NFCHECK_CONFIG")]
        config: Option<PathBuf>,

        /// Directory holding expected-payload files (overrides config)
        #[arg(long)]
        reference_dir: Option<PathBuf>,

        /// Run one worker per target host
        #[arg(long)]
        parallel: bool,

        /// Output format for stdout
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Also write the JSON report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Show how a pattern string would be interpreted
    Classify {
        pattern: String,
    },
}

/// Output format for CLI reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Execute a parsed command line; `Ok(false)` means at least one step failed.
pub async fn execute(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Run {
            suite,
            config,
            reference_dir,
            parallel,
            format,
            report,
        } => {
            let mut validation = match config {
                Some(path) => ValidationConfig::load(&path)?,
                None => ValidationConfig::default(),
            };
            if let Some(dir) = reference_dir {
                validation.reference_dir = dir;
            }
            let suite = Suite::load(&suite)?;
            let mode = if parallel {
                RunMode::Parallel
            } else {
                RunMode::Serial
            };

            let runner = Runner::new(validation, Arc::new(HttpTransport::new()?));
            let outcome = runner.run(&suite, mode).await;

            println!("{}", render(&outcome, format)?);
            if let Some(path) = report {
                let json = render(&outcome, OutputFormat::Json)?;
                fs::write(&path, json).map_err(|e| Error::io(&path, e))?;
            }
            Ok(outcome.all_passed())
        }
        Commands::Classify { pattern } => {
            println!("{}", serde_json::to_string_pretty(&classify(&pattern))?);
            Ok(true)
        }
    }
}

pub fn render(report: &RunReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(report.render_text()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}
