use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use intake_etl::config::PipelineConfig;
use intake_etl::constants::DEFAULT_LOG_DIR;
use intake_etl::pipeline::graph::{TaskGraph, TaskId};
use intake_etl::pipeline::ingestion::PreconditionValidator;
use intake_etl::pipeline::{PipelineOrchestrator, RunReport};
use intake_etl::{logging, observability};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "intake-etl")]
#[command(about = "Validate, load, check and archive a multi-format dataset drop")]
#[command(version = "0.1.0")]
struct Cli {
    /// TOML configuration file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the rolling JSON log
    #[arg(long, global = true, default_value = DEFAULT_LOG_DIR)]
    log_dir: PathBuf,

    /// Write Prometheus exposition text here when the command ends
    #[arg(long, global = true)]
    metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole graph once
    Run {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check the intake directory without touching the database
    Check,
    /// Run a single node, as an external scheduler would
    Task {
        /// Node name, e.g. file_validation or load_orders
        name: String,
    },
    /// Print the nodes in execution order with their upstream edges
    Plan,
}

fn print_report(report: &RunReport) {
    println!("\n📊 Run {}", report.run_id);
    for (task, state) in &report.states {
        println!("   {:<16} {:?}", task.name(), state);
    }
    for load in &report.loads {
        println!("   {} ← {} ({} rows)", load.dataset, load.source, load.rows);
    }
    if let Some(completion) = &report.completion {
        println!("   {}", completion.summary);
    }
    for failure in &report.failures {
        println!("   ❌ {} [{}]: {}", failure.task, failure.code, failure.message);
    }
}

fn write_metrics(path: &Path) {
    let Some(text) = observability::render() else {
        return;
    };
    match std::fs::write(path, text) {
        Ok(()) => info!("Wrote metrics to {}", path.display()),
        Err(e) => warn!("Could not write metrics to {}: {}", path.display(), e),
    }
}

async fn execute(cli: &Cli, config: PipelineConfig) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Run { json } => {
            let orchestrator = PipelineOrchestrator::new(config).await?;
            let report = orchestrator.run().await;
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            if !report.succeeded() {
                bail!("run {} failed", report.run_id);
            }
        }
        Commands::Check => {
            let report = PreconditionValidator::new(&config.data_dir, config.input_policy).validate()?;
            println!("✅ {} input file(s) ready in {}", report.files.len(), report.data_dir.display());
        }
        Commands::Task { name } => {
            let task: TaskId = name.parse()?;
            let orchestrator = PipelineOrchestrator::new(config).await?;
            let output = orchestrator
                .run_task(task)
                .await
                .with_context(|| format!("task '{task}' failed"))?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Plan => {
            for task in TaskGraph::topological_order() {
                let upstream: Vec<&str> = task.upstream().iter().map(|t| t.name()).collect();
                if upstream.is_empty() {
                    println!("{}", task);
                } else {
                    println!("{} <- {}", task, upstream.join(", "));
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let _guard = logging::init_logging(&cli.log_dir);
    if let Err(e) = observability::init() {
        warn!("Metrics disabled: {}", e);
    }

    let config = PipelineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    let result = execute(&cli, config).await;
    if let Some(path) = &cli.metrics_file {
        write_metrics(path);
    }
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
