mod pipeline;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use ferry_core::config::AppConfig;
use ferry_llm::OpenAiTranscriber;
use ferry_workflow::{InputStream, RunOptions, WorkflowEvent};

use pipeline::{Document, LinguaDetector, Services, SummaryChunk};

const DEFAULT_LOG_FILTER: &str = "ferry=info,warn";

#[derive(Parser)]
#[command(name = "ferry", version, about = "Typed dataflow workflows with streaming events")]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "FERRY_CONFIG", default_value = "ferry.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transcribe an audio file, translate it to Italian if needed, and save a summary
    Transcribe {
        /// Audio file to process
        audio: PathBuf,
        /// Directory for the summary document (default: system temp dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Print the transcription workflow graph
    Graph,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "ferry", &mut io::stdout());
        return Ok(());
    }

    let config = AppConfig::load(&cli.config);
    let filter = config
        .as_ref()
        .map(|c| c.log.filter.as_str())
        .unwrap_or(DEFAULT_LOG_FILTER);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = config
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    debug!(path = %cli.config.display(), "Config loaded");

    match cli.command {
        Commands::Transcribe { audio, output_dir } => {
            let output_dir = output_dir.unwrap_or_else(std::env::temp_dir);
            transcribe(&config, &audio, &output_dir).await?;
        }
        Commands::Graph => print_graph(&config)?,
        Commands::Config => println!("{}", toml::to_string_pretty(&config)?),
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn services(config: &AppConfig) -> Services {
    Services {
        transcriber: Arc::new(OpenAiTranscriber::new(config.transcription.clone())),
        detector: Arc::new(LinguaDetector::new()),
        chat: ferry_llm::create_client(&config.model),
        model: config.model.clone(),
    }
}

fn print_graph(config: &AppConfig) -> anyhow::Result<()> {
    let workflow = pipeline::transcription_workflow(
        services(config),
        RunOptions::from(&config.workflow),
    )?;

    println!("workflow: {}", workflow.name());
    println!("start:    {}", workflow.start_executor());
    for id in workflow.executor_ids() {
        let marker = if workflow.is_output(id) { " (output)" } else { "" };
        println!("  {}{}", id, marker);
        for edge in workflow.edges().iter().filter(|e| e.from == id) {
            let kind = if edge.is_conditional() { "when" } else { "always" };
            println!("    -> {} [{}]", edge.to, kind);
        }
    }
    Ok(())
}

async fn transcribe(config: &AppConfig, audio: &Path, output_dir: &Path) -> anyhow::Result<()> {
    let workflow = pipeline::transcription_workflow(
        services(config),
        RunOptions::from(&config.workflow),
    )?;
    let input = InputStream::open(audio)
        .await
        .with_context(|| format!("opening {}", audio.display()))?;

    let mut run = workflow.run(input);
    info!(run_id = %run.run_id(), file = %audio.display(), "Transcription started");

    // Graceful cancellation on Ctrl-C
    let cancel = run.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Cancelling workflow run...");
            cancel.cancel();
        }
    });

    let mut stdout = io::stdout();
    while let Some(event) = run.next_event().await {
        match &event {
            WorkflowEvent::ExecutorCompleted {
                executor_id,
                value: Some(value),
            } => {
                if let Some(text) = pipeline::printable(value) {
                    println!("\n{}\n{}\n", executor_id, text);
                }
            }
            WorkflowEvent::ExecutorCompleted { executor_id, .. } => {
                debug!(executor_id = %executor_id, "Executor completed without a value");
            }
            WorkflowEvent::WorkflowOutput { value, .. } => {
                if let Some(chunk) = value.downcast_ref::<SummaryChunk>() {
                    print!("{}", chunk);
                    stdout.flush()?;
                } else if let Some(document) = value.downcast_ref::<Document>() {
                    let path = document
                        .save(output_dir)
                        .await
                        .with_context(|| format!("saving summary to {}", output_dir.display()))?;
                    println!("\n\nSummary saved to: {}", path.display());
                }
            }
            WorkflowEvent::WorkflowError { executor_id, error } => {
                error!(executor_id = %executor_id, error = %error, "Workflow error");
            }
        }
    }

    let summary = run.finish().await?;
    if summary.cancelled {
        warn!(run_id = %summary.run_id, "Transcription cancelled");
    } else {
        info!(
            run_id = %summary.run_id,
            invocations = summary.invocations.len(),
            failures = summary.failures().count(),
            elapsed_ms = summary.elapsed_ms,
            "Transcription finished"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_test_utils::test_config;

    #[test]
    fn test_graph_builds_from_config() {
        let config = test_config();
        let workflow = pipeline::transcription_workflow(
            services(&config),
            RunOptions::from(&config.workflow),
        )
        .unwrap();
        assert_eq!(workflow.name(), pipeline::WORKFLOW_NAME);
        assert!(print_graph(&config).is_ok());
    }
}
