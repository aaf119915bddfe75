//! CLI entry point for anomaly detection.

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use datasentry_core::{
    AnomalyEnsemble, AnomalyReport, AnomalyScorer, Cardinality, DetectionConfig, DetectionMode,
    ReportGenerator, ScoredFinding, analyze_relationship, ingest,
};
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// CLI-compatible detection mode enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    /// Column detectors, learned detector and the mutation rules
    Sql,
    /// Column detectors and learned detector only
    Ml,
}

impl From<CliMode> for DetectionMode {
    fn from(cli: CliMode) -> Self {
        match cli {
            CliMode::Sql => DetectionMode::Sql,
            CliMode::Ml => DetectionMode::Ml,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author = "DataSentry Team",
    version,
    about = "Data-quality anomaly detection",
    long_about = "Runs an ensemble of anomaly detectors over a CSV, JSON or Excel table \
                  and ranks what it finds.\n\n\
                  EXAMPLES:\n  \
                  # Full analysis with the mutation rules\n  \
                  datasentry detect -i orders.csv\n\n  \
                  # Column and learned detectors only, as JSON\n  \
                  datasentry detect -i orders.csv --mode ml --json\n\n  \
                  # Save a report and the full anomaly list\n  \
                  datasentry detect -i orders.csv -r -o reports/\n\n  \
                  # Check two tables against each other\n  \
                  datasentry relate --left orders.csv --right payments.csv --cardinality 1:1"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output JSON to stdout instead of human-readable summary
    ///
    /// Disables all progress logs; only outputs the final JSON.
    /// Useful for piping to other tools: `... --json | jq .quality_metrics`
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the anomaly-detection ensemble over one table
    Detect(DetectArgs),
    /// Check the relationship between two tables, or a table and itself
    Relate(RelateArgs),
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// Path to the CSV, JSON or Excel file to analyze
    #[arg(short, long)]
    input: String,

    /// Which detector families to run
    #[arg(short, long, value_enum, default_value = "sql")]
    mode: CliMode,

    /// Share of rows labelled anomalous when training the learned detector
    #[arg(long, default_value = "0.1")]
    contamination: f64,

    /// Findings below this confidence are dropped (0.0 - 1.0)
    #[arg(long, default_value = "0.3")]
    min_confidence: f64,

    /// Absolute z-score above which a numeric value is an outlier
    #[arg(long, default_value = "3.0")]
    z_threshold: f64,

    /// Categories rarer than this share of rows are flagged
    #[arg(long, default_value = "0.01")]
    min_category_frequency: f64,

    /// Seed for label synthesis, splitting and bagging
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Compare only these columns when looking for duplicate rows (comma-separated)
    #[arg(long, value_delimiter = ',')]
    duplicate_subset: Vec<String>,

    /// Output directory for reports
    #[arg(short, long, default_value = "./outputs")]
    output: String,

    /// Write a JSON report and a CSV of every anomaly to the output directory
    ///
    /// Saved as <input_name>_report.json and <input_name>_anomalies.csv
    #[arg(short = 'r', long)]
    emit_report: bool,
}

#[derive(Args, Debug)]
struct RelateArgs {
    /// Left table (CSV, JSON or Excel)
    #[arg(long)]
    left: String,

    /// Right table; the same path as --left checks a self-referencing hierarchy
    #[arg(long)]
    right: String,

    /// Declared cardinality: 1:1, 1:M or M:1
    #[arg(short, long, default_value = "1:1")]
    cardinality: Cardinality,

    /// Findings below this confidence are dropped (0.0 - 1.0)
    #[arg(long, default_value = "0.3")]
    min_confidence: f64,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.quiet, cli.json);

    // Load environment variables from .env file
    dotenv().ok();

    match &cli.command {
        Command::Detect(args) => run_detect(args, cli.json),
        Command::Relate(args) => run_relate(args, cli.json),
    }
}

fn require_file(path: &str) -> Result<()> {
    if !Path::new(path).exists() {
        return Err(anyhow!("Input file not found: {}", path));
    }
    Ok(())
}

fn run_detect(args: &DetectArgs, json: bool) -> Result<()> {
    require_file(&args.input)?;

    let config = DetectionConfig::builder()
        .contamination(args.contamination)
        .min_confidence(args.min_confidence)
        .z_threshold(args.z_threshold)
        .min_category_frequency(args.min_category_frequency)
        .seed(args.seed)
        .duplicate_subset(args.duplicate_subset.iter().map(String::as_str))
        .build()?;

    info!("Loading dataset from: {}", args.input);
    let dataset = ingest::read_table_file(&args.input).map_err(|e| {
        error!("Could not load {}: {}", args.input, e);
        anyhow!("Could not load {}: {}", args.input, e)
    })?;

    let run = AnomalyEnsemble::new(config).run(&dataset, args.mode.into());

    if json {
        println!("{}", serde_json::to_string_pretty(&run.report)?);
        return Ok(());
    }

    if args.emit_report {
        let input_stem = extract_file_stem(&args.input);
        let generator = ReportGenerator::new(PathBuf::from(&args.output));
        let report_path = generator.write_report_to_file(&run.report, &input_stem)?;
        let csv_path = generator.write_findings_csv(&run.ranked, &input_stem)?;
        info!("Report written to: {}", report_path.display());
        info!("Anomalies written to: {}", csv_path.display());
    }

    print_human_readable_summary(&run.report, &args.input);

    Ok(())
}

fn run_relate(args: &RelateArgs, json: bool) -> Result<()> {
    require_file(&args.left)?;
    require_file(&args.right)?;

    let left_name = ingest::table_name_for(&args.left);
    let left = ingest::read_table_file(&args.left)?;

    let same_file = Path::new(&args.left) == Path::new(&args.right);
    let (right_name, right) = if same_file {
        (left_name.clone(), left.clone())
    } else {
        let mut name = ingest::table_name_for(&args.right);
        if name == left_name {
            name.push_str("_right");
        }
        (name, ingest::read_table_file(&args.right)?)
    };

    let findings = analyze_relationship(&left_name, &left, &right_name, &right, args.cardinality)?;
    let ranked = AnomalyScorer::new(args.min_confidence).score(findings);

    if json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
        return Ok(());
    }

    print_relationship_summary(&left_name, &right_name, args.cardinality, &ranked);
    Ok(())
}

/// Extract the file stem (name without extension) from a path.
fn extract_file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}

/// Truncate a string for column display.
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

/// Print a human-readable summary of a detection run.
///
/// This is the default output when `--json` is not specified.
fn print_human_readable_summary(report: &AnomalyReport, input: &str) {
    println!();
    println!("{}", "=".repeat(80));
    println!("ANOMALY DETECTION COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!(
        "Input: {} ({} rows x {} columns)",
        input, report.dataset_info.total_rows, report.dataset_info.total_columns
    );
    println!("Mode:  {}", report.mode);
    println!();

    println!("Summary:");
    println!(
        "  Quality score: {:.2} ({:.2}% anomalous)",
        report.quality_metrics.quality_score, report.quality_metrics.anomaly_percentage
    );
    println!(
        "  Anomalies: {} events across {} rows",
        report.anomaly_event_count, report.unique_rows_flagged
    );
    if report.anomaly_event_count > 0 {
        println!(
            "  Confidence: {:.2} - {:.2}",
            report.anomaly_summary.confidence_range.min, report.anomaly_summary.confidence_range.max
        );
    }
    println!();

    if !report.method_breakdown.is_empty() {
        println!("By Method:");
        for (method, count) in &report.method_breakdown {
            println!("  {:<13} {}", method, count);
        }
        println!();
    }

    if !report.top_anomalies.is_empty() {
        println!("Top Anomalies:");
        for finding in &report.top_anomalies {
            println!(
                "  row {:<6} {:<32} {:.2}  {}",
                finding.row_index,
                finding.issue_type,
                finding.severity_score,
                truncate_str(&finding.value, 30)
            );
        }
        println!();
    }

    if !report.feature_importance.is_empty() {
        println!("Top Features:");
        for record in report.feature_importance.iter().take(5) {
            println!("  {:<24} {:.4}", truncate_str(&record.feature, 24), record.importance);
        }
        println!();
    }

    if !report.diagnostics.is_empty() {
        println!("Skipped Checks:");
        for diagnostic in &report.diagnostics {
            println!("  ! {}: {}", diagnostic.detector, diagnostic.message);
        }
        println!();
    }

    println!("Recommendations:");
    for rec in &report.recommendations {
        println!("  - {}", rec);
    }
    println!();

    println!("Use --json for machine-readable output");
    println!("Use --emit-report to save detailed JSON report");
    println!("{}", "=".repeat(80));
}

fn print_relationship_summary(
    left: &str,
    right: &str,
    cardinality: Cardinality,
    ranked: &[ScoredFinding],
) {
    println!();
    println!("{}", "=".repeat(80));
    if left == right {
        println!("HIERARCHY CHECK: {}", left);
    } else {
        println!("RELATIONSHIP CHECK: {} ~ {} ({})", left, right, cardinality);
    }
    println!("{}", "=".repeat(80));
    println!();

    if ranked.is_empty() {
        println!("No relationship anomalies found.");
    } else {
        println!("{} anomalies:", ranked.len());
        for finding in ranked.iter().take(20) {
            println!(
                "  {:<12} {:<28} {:.2}  {}",
                format!(
                    "{}[{}]",
                    finding.table.as_deref().unwrap_or("?"),
                    finding.row_index
                ),
                finding.issue_type,
                finding.severity_score,
                truncate_str(&finding.value, 30)
            );
        }
        if ranked.len() > 20 {
            println!("  ... and {} more", ranked.len() - 20);
        }
    }
    println!("{}", "=".repeat(80));
}
