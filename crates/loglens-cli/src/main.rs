//! LogLens command-line interface.
//!
//! This binary runs offline analytics over HTTP access logs (NCSA
//! combined/common, `.gz` transparently decompressed) and emits
//! deterministic JSON or CSV. It is a thin wrapper over the
//! `loglens-core` pipeline: parsing, aggregation, SLAQ queries, security
//! detection and trend comparison all live in the library.
//!
//! Typical usage:
//! - `loglens analyse access.log -o report.json`
//! - `loglens query "SELECT status, COUNT() FROM logs GROUP BY status" access.log`
//! - `loglens security access.log.gz`
//! - `loglens trends access.log`
//!
//! Errors are reported to stderr; a non-zero exit code indicates failure
//! to read the inputs or an invalid query.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use glob::glob;
use loglens_core::{
    QueryFormat, Record, SecurityConfig, TrendConfig, analyze, analyze_security,
    detect_degradation, parse_files, render_query_result, results_to_csv, results_to_json,
    results_to_json_pretty, run_query,
};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "loglens")]
#[command(
    version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (commit ",
        env!("LOGLENS_BUILD_COMMIT"),
        ", built ",
        env!("LOGLENS_BUILD_DATE"),
        ")"
    )
)]
#[command(
    about = "Offline analytics for HTTP access logs (NCSA combined/common).",
    long_about = None,
    after_help = "Examples:\n  loglens analyse access.log -o report.json\n  loglens analyse 'logs/*.gz' --format csv\n  loglens query \"SELECT status, COUNT() FROM logs GROUP BY status\" access.log\n  loglens security access.log\n  loglens trends access.log"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum QueryOutput {
    Table,
    Csv,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Aggregate analytics over one or more log files.
    #[command(alias = "analyze")]
    Analyse {
        /// Log files or glob patterns (`.gz` accepted)
        inputs: Vec<String>,

        /// Output path; defaults to stdout when omitted
        #[arg(short = 'o', long)]
        report: Option<PathBuf>,

        /// Only include records at or after this RFC3339 instant
        #[arg(long)]
        since: Option<String>,

        /// Only include records at or before this RFC3339 instant
        #[arg(long)]
        until: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Suppress the parse summary on stderr
        #[arg(long)]
        quiet: bool,
    },
    /// Run a SLAQ query over the parsed records.
    Query {
        /// Query text, e.g. "SELECT COUNT() FROM logs"
        sql: String,

        /// Log files or glob patterns (`.gz` accepted)
        inputs: Vec<String>,

        /// Output format
        #[arg(long, value_enum, default_value_t = QueryOutput::Table)]
        format: QueryOutput,

        /// Suppress the parse summary on stderr
        #[arg(long)]
        quiet: bool,
    },
    /// Full security report: threats, anomalies, profiles, score.
    Security {
        /// Log files or glob patterns (`.gz` accepted)
        inputs: Vec<String>,

        /// Output path; defaults to stdout when omitted
        #[arg(short = 'o', long)]
        report: Option<PathBuf>,

        /// Detection sensitivity 1-10
        #[arg(long, default_value_t = 7)]
        sensitivity: u8,

        /// Suppress the parse summary on stderr
        #[arg(long)]
        quiet: bool,
    },
    /// Split the stream in half and report degradation.
    Trends {
        /// Log files or glob patterns (`.gz` accepted)
        inputs: Vec<String>,

        /// Output path; defaults to stdout when omitted
        #[arg(short = 'o', long)]
        report: Option<PathBuf>,

        /// Minimum records required for the comparison
        #[arg(long, default_value_t = 100)]
        min_samples: usize,

        /// Suppress the parse summary on stderr
        #[arg(long)]
        quiet: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyse {
            inputs,
            report,
            since,
            until,
            format,
            pretty,
            quiet,
        } => {
            let records = load_records(&inputs, quiet)?;
            let since = parse_instant(since.as_deref()).context("invalid --since")?;
            let until = parse_instant(until.as_deref()).context("invalid --until")?;
            let results = analyze(&records, since, until)?;
            let output = match (format, pretty) {
                (ReportFormat::Json, true) => results_to_json_pretty(&results),
                (ReportFormat::Json, false) => results_to_json(&results),
                (ReportFormat::Csv, _) => results_to_csv(&results),
            };
            emit(report.as_deref(), &output)
        }
        Commands::Query {
            sql,
            inputs,
            format,
            quiet,
        } => {
            let records = load_records(&inputs, quiet)?;
            let result = match run_query(&records, &sql) {
                Ok(result) => result,
                Err(err) => bail!("{err}"),
            };
            let format = match format {
                QueryOutput::Table => QueryFormat::Table,
                QueryOutput::Csv => QueryFormat::Csv,
                QueryOutput::Json => QueryFormat::Json,
            };
            print!("{}", render_query_result(&result, format));
            Ok(())
        }
        Commands::Security {
            inputs,
            report,
            sensitivity,
            quiet,
        } => {
            let records = load_records(&inputs, quiet)?;
            let config = SecurityConfig {
                threat_sensitivity: sensitivity,
                ..SecurityConfig::default()
            };
            let security = analyze_security(&records, &config)?;
            let output = serde_json::to_string_pretty(&security)
                .context("serialize security report")?;
            emit(report.as_deref(), &output)
        }
        Commands::Trends {
            inputs,
            report,
            min_samples,
            quiet,
        } => {
            let records = load_records(&inputs, quiet)?;
            let config = TrendConfig {
                minimum_sample_size: min_samples,
                ..TrendConfig::default()
            };
            let comparison = detect_degradation(&records, &config)?;
            let output =
                serde_json::to_string_pretty(&comparison).context("serialize trend report")?;
            emit(report.as_deref(), &output)
        }
    }
}

fn expand_inputs(inputs: &[String]) -> Result<Vec<PathBuf>> {
    if inputs.is_empty() {
        bail!("no input files given");
    }
    let mut paths = Vec::new();
    for input in inputs {
        let mut matched = false;
        for entry in glob(input).with_context(|| format!("invalid glob pattern `{input}`"))? {
            match entry {
                Ok(path) => {
                    matched = true;
                    paths.push(path);
                }
                Err(err) => warn!("skipping unreadable glob entry: {err}"),
            }
        }
        if !matched {
            // Literal paths that match nothing still surface a clear
            // open error from the parser.
            paths.push(PathBuf::from(input));
        }
    }
    Ok(paths)
}

fn load_records(inputs: &[String], quiet: bool) -> Result<Vec<Record>> {
    let paths = expand_inputs(inputs)?;
    let batch = parse_files(&paths);

    if !quiet {
        for summary in &batch.summaries {
            eprintln!(
                "{}: {} lines, {} records, {} skipped",
                summary.path, summary.lines_read, summary.records_parsed, summary.lines_skipped
            );
        }
    }
    for failure in &batch.failures {
        eprintln!("{}: {}", failure.path, failure.error);
    }
    if batch.records.is_empty() {
        bail!("no records parsed from {} input file(s)", paths.len());
    }
    Ok(batch.records)
}

fn parse_instant(value: Option<&str>) -> Result<Option<OffsetDateTime>> {
    match value {
        None => Ok(None),
        Some(text) => {
            let instant = OffsetDateTime::parse(text, &Rfc3339)
                .with_context(|| format!("`{text}` is not an RFC3339 timestamp"))?;
            Ok(Some(instant))
        }
    }
}

fn emit(report: Option<&std::path::Path>, output: &str) -> Result<()> {
    match report {
        Some(path) => {
            fs::write(path, output).with_context(|| format!("write {}", path.display()))?;
            Ok(())
        }
        None => {
            println!("{output}");
            Ok(())
        }
    }
}
