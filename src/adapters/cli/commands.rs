//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the FundWatch risk pipeline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::json_store::JsonTableStore;
use crate::application::{QualityOutput, RiskPipeline};
use crate::config::{load_config, Config};
use crate::strategy::{PipelineParams, QualityReport};

/// FundWatch - risk signals and recommendations for mutual funds
#[derive(Parser, Debug)]
#[command(
    name = "fundwatch",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Batch risk-signal pipeline for mutual funds",
    long_about = "FundWatch scores daily and weekly fund performance for anomalies, fuses the \
                  two signals into a daily risk level, projects the next 30 days and emits a \
                  recommendation per fund."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full pipeline and write every output table
    Run(RunCmd),

    /// Data-quality report on the input tables
    Check(CheckCmd),

    /// Validate a configuration file
    Validate(ValidateCmd),
}

/// Run the pipeline
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/fundwatch.toml")]
    pub config: PathBuf,

    /// Override input directory
    #[arg(long, value_name = "DIR")]
    pub input_dir: Option<String>,

    /// Override output directory
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<String>,

    /// Override the peer-group company pattern (e.g. WAFA)
    #[arg(long, value_name = "PATTERN")]
    pub peer_group: Option<String>,
}

/// Check input data quality
#[derive(Parser, Debug)]
pub struct CheckCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/fundwatch.toml")]
    pub config: PathBuf,

    /// Override input directory
    #[arg(long, value_name = "DIR")]
    pub input_dir: Option<String>,

    /// Output format (text, json)
    #[arg(short, long, value_name = "FORMAT", default_value = "text")]
    pub format: String,
}

/// Validate configuration
#[derive(Parser, Debug)]
pub struct ValidateCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/fundwatch.toml")]
    pub config: PathBuf,
}

/// Execute the CLI command
pub fn execute(app: CliApp) -> Result<()> {
    match app.command {
        Command::Run(cmd) => {
            let config = load(&cmd.config)?;
            init_logging(app.verbose, app.debug, &config.logging.level)?;
            run_command(cmd, config)
        }
        Command::Check(cmd) => {
            let config = load(&cmd.config)?;
            init_logging(app.verbose, app.debug, &config.logging.level)?;
            check_command(cmd, config)
        }
        Command::Validate(cmd) => {
            init_logging(app.verbose, app.debug, "warn")?;
            validate_command(cmd)
        }
    }
}

fn load(path: &std::path::Path) -> Result<Config> {
    load_config(path).with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Initialize logging system. Flags win over RUST_LOG, which wins over the config level.
fn init_logging(verbose: bool, debug: bool, config_level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

fn build_pipeline(config: &Config, peer_group: Option<String>) -> Result<RiskPipeline> {
    let mut params = PipelineParams::from(config);
    if let Some(pattern) = peer_group {
        params = params.with_peer_group(pattern);
    }
    let mut pipeline = RiskPipeline::new(params).context("Invalid pipeline parameters")?;
    if let Some(ref pattern) = config.data.code_pattern {
        pipeline = pipeline
            .with_code_pattern(pattern)
            .context("Invalid code pattern")?;
    }
    Ok(pipeline)
}

/// Handle run command
fn run_command(cmd: RunCmd, config: Config) -> Result<()> {
    let input_dir = cmd.input_dir.unwrap_or_else(|| config.data.get_input_dir());
    let output_dir = cmd.output_dir.unwrap_or_else(|| config.data.get_output_dir());
    tracing::info!("Starting FundWatch pipeline...");
    tracing::info!("Config: {}", cmd.config.display());
    tracing::info!("Input: {}  Output: {}", input_dir, output_dir);

    let pipeline = build_pipeline(&config, cmd.peer_group)?;
    let source = JsonTableStore::new(&input_dir);
    let sink = JsonTableStore::new(&output_dir);

    let output = pipeline
        .run(&source)
        .with_context(|| format!("Pipeline failed on input {}", input_dir))?;
    output
        .write_to(&sink)
        .with_context(|| format!("Failed to write output tables to {}", output_dir))?;

    println!("✓ Pipeline complete");
    println!("  Risk records:    {}", output.risk_records.len());
    println!("  Funds:           {}", output.fund_risk_summary.len());
    println!("  Predictions:     {}", output.predictions.len());
    if let Some(acc) = output.evaluation.accuracy {
        println!("  Test accuracy:   {:.2}%", acc * 100.0);
    }
    println!("  Output:          {}", sink.dir().display());
    println!();
    println!("  {:<16} {:>6} {:>10} {:>10} {:>10}", "ACTION", "FUNDS", "PRIORITY", "SCORE30", "P(M/H)%");
    for row in &output.recommendation_summary {
        println!(
            "  {:<16} {:>6} {:>10.4} {:>10.4} {:>10.2}",
            row.action.label(),
            row.funds,
            row.avg_priority,
            row.avg_projected_score,
            row.avg_p_medium_or_high_pct
        );
    }
    if let Some(ref report) = output.peer_report {
        println!();
        let score = |s: Option<f64>| s.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v));
        println!(
            "  Peer group '{}': {} funds, mean risk score {} (market {})",
            report.pattern,
            report.historical.group.funds,
            score(report.historical.group.avg_risk_score),
            score(report.historical.market.avg_risk_score)
        );
    }
    Ok(())
}

fn print_quality(report: &QualityReport) {
    let date = |d: Option<chrono::NaiveDate>| d.map_or_else(|| "-".to_string(), |d| d.to_string());
    println!("[{}]", report.granularity);
    println!("  Rows:                 {}", report.rows);
    println!("  Instruments:          {}", report.instruments);
    println!("  Dates:                {} .. {}", date(report.min_date), date(report.max_date));
    println!("  Missing value:        {}", report.missing_value);
    println!("  Missing period ret.:  {}", report.missing_period_return);
    println!("  Missing week ret.:    {}", report.missing_week_return);
    println!("  Duplicates:           {}", report.duplicates);
    println!("  Dropped rows:         {}", report.dropped_rows);
    for s in &report.suspects {
        println!("  Suspect {:<14} {}", format!("{}:", s.rule), s.count);
    }
}

/// Handle check command
fn check_command(cmd: CheckCmd, config: Config) -> Result<()> {
    let input_dir = cmd.input_dir.unwrap_or_else(|| config.data.get_input_dir());
    let pipeline = build_pipeline(&config, None)?;
    let source = JsonTableStore::new(&input_dir);

    let QualityOutput { daily, weekly } = pipeline
        .check(&source)
        .with_context(|| format!("Quality check failed on input {}", input_dir))?;

    match cmd.format.as_str() {
        "json" => {
            let value = serde_json::json!({ "daily": daily, "weekly": weekly });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        _ => {
            print_quality(&daily);
            println!();
            print_quality(&weekly);
        }
    }
    Ok(())
}

/// Handle validate command
fn validate_command(cmd: ValidateCmd) -> Result<()> {
    let config = load(&cmd.config)?;
    let params = PipelineParams::from(&config);

    println!("✓ Configuration valid: {}", cmd.config.display());
    println!("  Contamination:   {}", params.outlier.contamination);
    println!("  Windows:         {} daily / {} weekly", params.features.daily_window, params.features.weekly_window);
    println!("  Fusion weights:  {} weekly / {} daily", params.fusion.weekly_weight, params.fusion.daily_weight);
    println!("  Cutoff:          {}", params.predictor.cutoff);
    match params.outlier.fallback_rule_threshold {
        Some(t) => println!("  Fallback:        rule score >= {}", t),
        None => println!("  Fallback:        off"),
    }
    if let Some(ref pattern) = params.peer_group {
        println!("  Peer group:      {}", pattern);
    }
    Ok(())
}
