use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use parametric_qa_engine::arrow_handler::{
    build_anomaly_result, build_validation_result, parse_arrow_ipc,
};
use parametric_qa_engine::{
    AnomalyEngine, Dataset, DetectionReport, EngineConfig, ReferenceBaseline, ValidUnitTable,
    ValidationReport,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Rows printed when no output file is given
const PREVIEW_ROWS: usize = 10;

#[derive(Parser)]
#[command(name = "parametric-qa")]
#[command(version)]
#[command(about = "Anomaly detection and baseline validation for component parametric data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flag unit, outlier and value-type anomalies in a parametric table
    Detect {
        /// Input table (.csv, .json, .arrow)
        #[arg(short, long)]
        file: PathBuf,

        /// Engine configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Valid unit table (TOML), overrides the configured one
        #[arg(short, long)]
        units: Option<PathBuf>,

        /// Write reported anomalies here (.csv, .json, .arrow)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a new table against a reference table
    Validate {
        /// New records (.csv, .json, .arrow)
        #[arg(short, long)]
        file: PathBuf,

        /// Reference records used to build the baseline
        #[arg(short, long)]
        reference: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        units: Option<PathBuf>,

        /// Write every validated row here (.csv, .json, .arrow)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check a single unit against a feature name
    CheckUnit {
        #[arg(long)]
        feature: String,

        #[arg(long)]
        unit: String,

        #[arg(short = 't', long)]
        units: Option<PathBuf>,
    },
}

/// Output encodings chosen by file extension
enum OutputFormat {
    Csv,
    Json,
    Arrow,
}

impl OutputFormat {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        match extension(path).as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "arrow" | "ipc" => Ok(Self::Arrow),
            other => bail!("unsupported output format '{}' for {}", other, path.display()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Detect {
            file,
            config,
            units,
            output,
        } => {
            let engine = build_engine(config.as_deref(), units.as_deref())?;
            let dataset = load_dataset(&file)?;
            info!(file = %file.display(), rows = dataset.len(), "loaded input table");

            let report = engine.detect_dataset(&dataset)?;
            match output {
                Some(path) => {
                    write_detection(&report, &engine, &path)?;
                    info!(output = %path.display(), reported = report.summary.reported, "wrote anomalies");
                }
                None => print_detection(&report),
            }
        }

        Commands::Validate {
            file,
            reference,
            config,
            units,
            output,
        } => {
            let engine = build_engine(config.as_deref(), units.as_deref())?;

            let reference_data = load_dataset(&reference)?;
            let reference_records = reference_data
                .extract_records(&engine.config().columns, false)
                .with_context(|| format!("reading reference table {}", reference.display()))?;
            let baseline = ReferenceBaseline::from_records(&reference_records.records);
            info!(
                reference = %reference.display(),
                groups = baseline.len(),
                "built reference baseline"
            );

            let dataset = load_dataset(&file)?;
            let report = engine.validate_dataset(&dataset, &baseline)?;
            match output {
                Some(path) => {
                    write_validation(&report, &engine, &path)?;
                    info!(output = %path.display(), issues = report.summary.issues, "wrote validation results");
                }
                None => print_validation(&report),
            }
        }

        Commands::CheckUnit {
            feature,
            unit,
            units,
        } => {
            let table = match units {
                Some(path) => ValidUnitTable::load(&path)
                    .with_context(|| format!("loading unit table {}", path.display()))?,
                None => ValidUnitTable::builtin()?,
            };
            let valid = table.validate_unit(Some(unit.as_str()), &feature);
            let keywords = table.matching_keywords(&feature);

            println!("Feature:  {}", feature);
            println!("Unit:     {}", unit);
            if keywords.is_empty() {
                println!("Keywords: (none)");
            }
            for keyword in &keywords {
                let allowed = table
                    .units_for(keyword)
                    .map(|units| {
                        units
                            .iter()
                            .map(|u| format!("{:?}", u))
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default();
                println!("Keyword:  {} -> [{}]", keyword, allowed);
            }
            println!("Valid:    {}", valid);
        }
    }

    Ok(())
}

fn build_engine(config: Option<&Path>, units: Option<&Path>) -> anyhow::Result<AnomalyEngine> {
    let mut config = match config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(path) = units {
        config.units_path = Some(path.to_path_buf());
    }
    Ok(AnomalyEngine::with_config(config)?)
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn load_dataset(path: &Path) -> anyhow::Result<Dataset> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("input")
        .to_string();

    let dataset = match extension(path).as_str() {
        "csv" => {
            let file = fs::File::open(path)
                .with_context(|| format!("opening {}", path.display()))?;
            Dataset::from_csv_reader(name, file)?
        }
        "json" => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Dataset::from_json(name, &content)?
        }
        "arrow" | "ipc" => {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            parse_arrow_ipc(name, &bytes)?
        }
        other => bail!("unsupported input format '{}' for {}", other, path.display()),
    };
    Ok(dataset)
}

fn write_detection(
    report: &DetectionReport,
    engine: &AnomalyEngine,
    path: &Path,
) -> anyhow::Result<()> {
    let columns = &engine.config().columns;
    match OutputFormat::from_path(path)? {
        OutputFormat::Csv => report.write_csv(fs::File::create(path)?, columns)?,
        OutputFormat::Json => fs::write(path, report.to_json()?)?,
        OutputFormat::Arrow => fs::write(path, build_anomaly_result(report, columns)?)?,
    }
    Ok(())
}

fn write_validation(
    report: &ValidationReport,
    engine: &AnomalyEngine,
    path: &Path,
) -> anyhow::Result<()> {
    let columns = &engine.config().columns;
    match OutputFormat::from_path(path)? {
        OutputFormat::Csv => report.write_csv(fs::File::create(path)?, columns)?,
        OutputFormat::Json => fs::write(path, report.to_json()?)?,
        OutputFormat::Arrow => fs::write(path, build_validation_result(report, columns)?)?,
    }
    Ok(())
}

fn print_detection(report: &DetectionReport) {
    let summary = &report.summary;
    println!("\n=== Anomaly detection ===");
    println!("Rows:        {} ({} dropped)", summary.total_rows, summary.dropped_rows);
    println!("Analysed:    {}", summary.analysed_rows);
    println!("Families:    {}", summary.unique_families);
    println!("Features:    {}", summary.unique_features);
    println!("Flagged:     {}", summary.flagged);
    println!("Controlled:  {}", summary.controlled);
    println!("Reported:    {}", summary.reported);
    for (reason, count) in &summary.reason_counts {
        println!("  {:<48} {}", reason.as_str(), count);
    }

    if summary.reported > 0 {
        println!("\nFirst {} reported anomalies:", PREVIEW_ROWS.min(summary.reported));
        for r in report.anomalies().take(PREVIEW_ROWS) {
            println!(
                "  {} | {} | {} {} | {}",
                r.family,
                r.feature,
                r.value.as_deref().unwrap_or(""),
                r.unit.as_deref().unwrap_or(""),
                r.reason_text()
            );
        }
    }
}

fn print_validation(report: &ValidationReport) {
    let summary = &report.summary;
    println!("\n=== Baseline validation ===");
    println!("Rows:      {} ({} dropped)", summary.total_rows, summary.dropped_rows);
    println!("Analysed:  {}", summary.analysed_rows);
    println!("Issues:    {}", summary.issues);
    for (status, count) in &summary.status_counts {
        println!("  {:<10} {}", status.as_str(), count);
    }

    if !report.records.is_empty() {
        println!("\nFirst {} rows:", PREVIEW_ROWS.min(report.records.len()));
        for r in report.records.iter().take(PREVIEW_ROWS) {
            println!(
                "  {} | {} | {} {} | {} | {}",
                r.family,
                r.feature,
                r.value.as_deref().unwrap_or(""),
                r.unit.as_deref().unwrap_or(""),
                r.validation_status,
                r.reason_text()
            );
        }
    }
}
