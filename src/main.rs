use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sqlprism::batch::{run_batch, BatchItem, BatchOptions, BatchStatus};
use sqlprism::config::AnalyzerConfig;
use sqlprism::joins::SourceText;
use sqlprism::pipeline::{analyze_sql, AnalysisReport};
use sqlprism::schema::TableType;
use sqlprism::summary;

/// Analyze MySQL dumps and suggest a Prisma schema
#[derive(Parser, Debug)]
#[command(name = "sqlprism", version)]
struct Cli {
    /// MySQL dump files
    #[arg(required = true)]
    dumps: Vec<PathBuf>,

    /// Directory for schema.prisma.suggestion and analysis.json
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Mine JOIN conditions for relations without constraints
    #[arg(long)]
    analyze_joins: bool,

    /// Application source files searched for JOINs
    #[arg(short, long = "source")]
    sources: Vec<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Table type for tables no rule recognises
    #[arg(long, value_parser = parse_table_type)]
    fallback_type: Option<TableType>,

    /// Print the JSON report instead of the summary
    #[arg(long)]
    json: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Dumps analyzed concurrently
    #[arg(long, default_value_t = 10)]
    batch_size: usize,
}

fn parse_table_type(s: &str) -> std::result::Result<TableType, String> {
    TableType::from_str(s).ok_or_else(|| format!("unknown table type: {s}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&cli)?;
    let sources = read_sources(&cli.sources);

    if let [dump] = cli.dumps.as_slice() {
        let sql = fs::read_to_string(dump).with_context(|| format!("Failed to read {}", dump.display()))?;
        let report = analyze_sql(&sql, &sources, &config).with_context(|| format!("Failed to analyze {}", dump.display()))?;
        if let Some(dir) = &cli.out_dir {
            write_outputs(dir, &report)?;
        }
        return print_report(&report, cli.json);
    }

    let mut items = Vec::with_capacity(cli.dumps.len());
    for dump in &cli.dumps {
        let sql = fs::read_to_string(dump).with_context(|| format!("Failed to read {}", dump.display()))?;
        items.push(BatchItem {
            name: dump.display().to_string(),
            sql,
            sources: sources.clone(),
        });
    }

    let outcomes = run_batch(
        &items,
        &config,
        BatchOptions {
            batch_size: cli.batch_size,
            cancel: None,
        },
    );

    let mut failed = 0;
    for (dump, outcome) in cli.dumps.iter().zip(&outcomes) {
        match &outcome.status {
            BatchStatus::Done(report) => {
                if let Some(dir) = &cli.out_dir {
                    let stem = dump.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
                    write_outputs(&dir.join(stem), report)?;
                }
                if !cli.json {
                    println!("== {}", outcome.name);
                }
                print_report(report, cli.json)?;
            }
            BatchStatus::Failed(reason) => {
                failed += 1;
                eprintln!("{}: {}", outcome.name, reason);
            }
            BatchStatus::Skipped => {}
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} dumps failed", outcomes.len());
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<AnalyzerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
            AnalyzerConfig::from_json(&json).with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => AnalyzerConfig::default(),
    };
    if cli.analyze_joins {
        config.analyze_joins = true;
    }
    if let Some(fallback) = cli.fallback_type {
        config.classifier.fallback = fallback;
    }
    Ok(config)
}

fn read_sources(paths: &[PathBuf]) -> Vec<SourceText> {
    paths
        .iter()
        .filter_map(|path| match fs::read_to_string(path) {
            Ok(content) => Some(SourceText::new(path.display().to_string(), content)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable source file");
                None
            }
        })
        .collect()
}

fn write_outputs(dir: &Path, report: &AnalysisReport) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let prisma_path = dir.join("schema.prisma.suggestion");
    fs::write(&prisma_path, &report.prisma_schema)
        .with_context(|| format!("Failed to write {}", prisma_path.display()))?;

    let json_path = dir.join("analysis.json");
    let json = serde_json::to_string_pretty(report)?;
    fs::write(&json_path, json).with_context(|| format!("Failed to write {}", json_path.display()))?;

    info!(dir = %dir.display(), "wrote analysis");
    Ok(())
}

fn print_report(report: &AnalysisReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", summary::render(report));
    }
    Ok(())
}
