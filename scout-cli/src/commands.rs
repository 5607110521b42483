//! Subcommand handlers for the Scout CLI.

use clap::{Args, Subcommand};
use scout_core::config::{config_exists, load_config};
use scout_core::{ExecutionMode, Orchestrator, ResearchOptions, RunSummary, ScoutConfig};
use scout_tools::InvocationClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Research a topic and write a Markdown report
    Research(ResearchArgs),
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug, Default)]
pub struct ResearchArgs {
    /// Topic to research
    pub topic: String,

    /// Comma-separated search languages (zh, en)
    #[arg(short, long)]
    pub langs: Option<String>,

    /// Search depth, 1 to 5
    #[arg(short, long)]
    pub depth: Option<u8>,

    /// Ignore sources published before this date (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<String>,

    /// Maximum number of sources to enrich
    #[arg(long)]
    pub max_sources: Option<usize>,

    /// Tool execution mode: real, mock or test
    #[arg(short, long)]
    pub mode: Option<ExecutionMode>,

    /// Recorded responses for test mode
    #[arg(long)]
    pub recordings: Option<PathBuf>,

    /// Directory for the generated report
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Create a default configuration file in the workspace
    Init,
    /// Show the current merged configuration
    Show,
}

pub async fn handle_command(command: Command, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Command::Research(args) => handle_research(args, workspace).await,
        Command::Config { action } => handle_config(action, workspace),
    }
}

async fn handle_research(args: ResearchArgs, workspace: &Path) -> anyhow::Result<()> {
    if !config_exists(Some(workspace)) {
        tracing::debug!("No config file found, using defaults");
    }
    let mut config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let options = research_options(&config, &args)?;
    let client = InvocationClient::from_config(&config)?;
    tracing::info!(mode = %config.tools.mode, topic = %args.topic, "Starting research run");

    let mut orchestrator = Orchestrator::from_config(&config, Arc::new(client));
    let summary = orchestrator.execute(&args.topic, options).await?;

    if args.json {
        println!("{}", summary_json(&summary));
    } else {
        print_summary(&summary);
    }
    Ok(())
}

/// Fold command-line flags that live in the config into it.
fn apply_overrides(config: &mut ScoutConfig, args: &ResearchArgs) {
    if let Some(mode) = args.mode {
        config.tools.mode = mode;
    }
    if let Some(path) = &args.recordings {
        config.tools.recordings_path = Some(path.clone());
    }
    if let Some(dir) = &args.output {
        config.output.report_dir = dir.clone();
    }
}

/// Per-run options: configured defaults, then command-line flags.
fn research_options(config: &ScoutConfig, args: &ResearchArgs) -> anyhow::Result<ResearchOptions> {
    let mut options = config.defaults.clone();
    if let Some(langs) = &args.langs {
        options.langs = ResearchOptions::parse_langs(langs);
    }
    if let Some(depth) = args.depth {
        options.depth = depth;
    }
    if let Some(since) = &args.since {
        options.since = Some(ResearchOptions::parse_since(since)?);
    }
    if args.max_sources.is_some() {
        options.max_sources_to_enrich = args.max_sources;
    }
    Ok(options)
}

fn print_summary(summary: &RunSummary) {
    println!("Report:   {}", summary.report_path.display());
    println!("Sources:  {}", summary.sources_count);
    println!("Enriched: {}", summary.enriched_count);
    if !summary.degraded_stages.is_empty() {
        let stages: Vec<String> = summary.degraded_stages.iter().map(|s| s.to_string()).collect();
        println!("Degraded: {}", stages.join(", "));
    }
    println!("Duration: {:.1}s", summary.duration.as_secs_f64());
}

fn summary_json(summary: &RunSummary) -> serde_json::Value {
    serde_json::json!({
        "run_id": summary.run_id.to_string(),
        "success": summary.success,
        "topic": summary.topic,
        "report_path": summary.report_path,
        "sources_count": summary.sources_count,
        "enriched_count": summary.enriched_count,
        "degraded_stages": summary.degraded_stages.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        "duration_ms": summary.duration.as_millis() as u64,
    })
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let path = init_config(workspace)?;
            println!("Created config at {}", path.display());
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn init_config(workspace: &Path) -> anyhow::Result<PathBuf> {
    let config_dir = workspace.join(".scout");
    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        anyhow::bail!("config already exists at {}", config_path.display());
    }
    std::fs::create_dir_all(&config_dir)?;
    let toml_str = toml::to_string_pretty(&ScoutConfig::default())?;
    std::fs::write(&config_path, toml_str)?;
    Ok(config_path)
}
