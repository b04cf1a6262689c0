use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use triad_loop::WorkflowPhase;
use triad_models::TriadConfig;

#[derive(Parser, Debug)]
#[command(name = "triad", about = "Iterative multi-agent equity research")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/triad.toml")]
    config: String,

    /// Override the convergence loop ceiling
    #[arg(long)]
    max_loops: Option<u32>,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    /// Skip persisting the run to the run store
    #[arg(long)]
    no_store: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(max_loops) = cli.max_loops {
        config.convergence.max_loops = max_loops;
    }

    let mut controller = triad::build_controller(&config);

    // Ctrl-C aborts between layers instead of killing the process mid-run.
    let cancel = controller.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling run");
            cancel.cancel();
        }
    });

    let run = controller
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Research run failed: {e}"))?;

    // The controller stops at Converged; the report/persistence phases are
    // driven from here.
    controller
        .machine_mut()
        .transition(WorkflowPhase::GeneratingReport, serde_json::json!({}))
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    if !cli.no_store {
        let store = triad::open_run_store(&config).context("Failed to open run store")?;
        store.save(&run).context("Failed to persist run")?;
        info!(run_id = %run.run_id, "Run persisted");
    }

    let output = if cli.pretty {
        serde_json::to_string_pretty(&run)?
    } else {
        serde_json::to_string(&run)?
    };
    println!("{output}");

    controller
        .machine_mut()
        .transition(WorkflowPhase::Completed, serde_json::json!({}))
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    Ok(())
}

fn load_config(path: &str) -> Result<TriadConfig> {
    if !std::path::Path::new(path).exists() {
        info!(path = %path, "No config file found; using defaults");
        return Ok(TriadConfig::default());
    }
    let config_str =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config: {path}"))?;
    toml::from_str(&config_str).with_context(|| format!("Failed to parse config: {path}"))
}
