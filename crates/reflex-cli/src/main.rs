//! reflex - draft, critique and revise with tool-using models

mod artifacts;
mod config;
mod dataset;
mod progress;
mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use reflex_agent::{
    ArtifactPrompts, ChartCodePrompts, EssayPrompts, Orchestrator, ResearchReportPrompts,
    RunConfig, metric_by_name,
};
use reflex_ai::BackendKind;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::dataset::DatasetSummary;
use crate::tools::Toolset;

/// Rows of a CSV dataset shown to the model
const SAMPLE_ROWS: usize = 5;

/// reflex - iterative refinement with tool-using models
#[derive(Parser, Debug)]
#[command(name = "reflex")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Backend API shape (responses, chat-completions)
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Model for every step
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Model for the draft step
    #[arg(long, global = true)]
    draft_model: Option<String>,

    /// Model for the critique step
    #[arg(long, global = true)]
    reflection_model: Option<String>,

    /// Model for the revision step
    #[arg(long, global = true)]
    revision_model: Option<String>,

    /// Artifact versions to produce at most
    #[arg(long, global = true)]
    max_iterations: Option<u32>,

    /// Model calls allowed per conversation
    #[arg(long, global = true)]
    max_turns: Option<u32>,

    /// Change below this value stops the run early
    #[arg(long, global = true)]
    convergence_threshold: Option<f64>,

    /// Keep revising until max-iterations even if versions stop changing
    #[arg(long, global = true)]
    no_stop_on_convergence: bool,

    /// Change metric between versions (diff_ratio, size_delta)
    #[arg(long, global = true)]
    metric: Option<String>,

    /// Directory for saved artifacts
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// File name prefix for saved artifacts
    #[arg(long, global = true)]
    basename: Option<String>,

    /// Print the result without writing files
    #[arg(long, global = true)]
    no_save_artifacts: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write and refine an essay
    Essay {
        topic: String,
    },
    /// Research a topic with web and arXiv search, then refine the report
    Research {
        topic: String,
    },
    /// Generate and refine plotting code for a dataset
    Chart {
        /// What the chart should show
        instruction: String,
        /// CSV dataset; its column types and first rows are shown to the model
        #[arg(long, conflicts_with = "schema")]
        data: Option<PathBuf>,
        /// File describing the dataset's columns, when no CSV is at hand
        #[arg(long, required_unless_present = "data")]
        schema: Option<PathBuf>,
        /// Where the generated code should save the image
        #[arg(long, default_value = "chart.png")]
        chart_path: String,
    },
    /// Ask a single question with every built-in tool available
    Ask {
        prompt: String,
    },
    /// Write an example config file
    InitConfig,
}

/// Config file values with command-line overrides applied
fn build_run_config(cfg: &config::Config, args: &Args) -> RunConfig {
    let mut run = cfg.run.clone();
    if let Some(model) = args.model.as_ref().or(cfg.model.as_ref()) {
        run = run.with_model(model);
    }
    if let Some(model) = &args.draft_model {
        run.draft.model = model.clone();
    }
    if let Some(model) = &args.reflection_model {
        run.reflection.model = model.clone();
    }
    if let Some(model) = &args.revision_model {
        run.revision.model = model.clone();
    }
    if let Some(n) = args.max_iterations {
        run.max_iterations = n;
    }
    if let Some(n) = args.max_turns {
        run.max_turns = n;
    }
    if let Some(t) = args.convergence_threshold {
        run.convergence_threshold = t;
    }
    if args.no_stop_on_convergence {
        run.stop_on_convergence = false;
    }
    run
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "reflex=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Command::InitConfig = args.command {
        let path = config::Config::init().with_context(|| {
            format!(
                "Error creating config at {}",
                config::Config::config_path().display()
            )
        })?;
        println!("Config file at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let cfg = config::Config::load();
    let run_config = build_run_config(&cfg, &args);
    run_config.validate()?;
    cfg.executor.validate()?;

    let metric_name = args
        .metric
        .as_deref()
        .or(cfg.metric.as_deref())
        .unwrap_or("diff_ratio");
    let Some(metric) = metric_by_name(metric_name) else {
        bail!("Unknown metric '{}' (expected diff_ratio or size_delta)", metric_name);
    };

    let kind: BackendKind = args
        .backend
        .as_deref()
        .or(cfg.backend.as_deref())
        .unwrap_or("responses")
        .parse()?;

    let Some(api_key) = cfg.get_api_key("openai") else {
        eprintln!("Error: No API key found");
        eprintln!("Set your API key with: export OPENAI_API_KEY=your-key");
        eprintln!("Or add it to the config file: reflex init-config");
        std::process::exit(1);
    };
    let base_url = args.base_url.clone().or(cfg.base_url.clone());
    let backend = reflex_ai::create_backend(kind, Some(&api_key), base_url.as_deref())?;

    let toolset = match &args.command {
        Command::Research { .. } => Toolset::Research,
        Command::Ask { .. } => Toolset::All,
        _ => Toolset::None,
    };
    let registry = tools::registry(toolset, cfg.get_api_key("tavily"))?;
    tracing::debug!("registered tools: {:?}", registry.names());

    let orchestrator = Orchestrator::new(backend, Arc::new(registry))
        .with_executor_config(cfg.executor.clone())
        .with_metric(metric);
    let printer = progress::spawn_printer(orchestrator.subscribe());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling...");
                cancel.cancel();
            }
        });
    }

    let (task, prompts): (String, Box<dyn ArtifactPrompts>) = match args.command {
        Command::Ask { prompt } => {
            let result = orchestrator
                .run_conversation(&prompt, &run_config, &cancel)
                .await;
            drop(orchestrator);
            let _ = printer.await;
            let result = result?;
            println!("{}", result.final_text);
            eprintln!(
                "[{} turn(s), {} tool call(s), {} input / {} output tokens]",
                result.turns,
                result.tool_calls.len(),
                result.usage.input,
                result.usage.output
            );
            return Ok(());
        }
        Command::Essay { topic } => (topic, Box::new(EssayPrompts) as Box<dyn ArtifactPrompts>),
        Command::Research { topic } => (topic, Box::new(ResearchReportPrompts) as _),
        Command::Chart {
            instruction,
            data,
            schema,
            chart_path,
        } => {
            let prompts = match (data, schema) {
                (Some(data), _) => {
                    let summary = DatasetSummary::from_path(&data, SAMPLE_ROWS)?;
                    ChartCodePrompts::new(summary.schema_text(), chart_path)
                        .with_sample(summary.sample_json())
                }
                (None, Some(schema)) => {
                    let text = std::fs::read_to_string(&schema).with_context(|| {
                        format!("Failed to read schema file {}", schema.display())
                    })?;
                    ChartCodePrompts::new(text, chart_path)
                }
                (None, None) => bail!("chart needs --data or --schema"),
            };
            (instruction, Box::new(prompts) as _)
        }
        Command::InitConfig => bail!("init-config is handled before loading the backend"),
    };

    let result = orchestrator
        .run_reflection(&task, &run_config, prompts.as_ref(), &cancel)
        .await;
    drop(orchestrator);
    let _ = printer.await;
    let result = result?;

    println!("{}", result.final_artifact);
    match result.final_iteration() {
        Some(last) => eprintln!(
            "[{} iteration(s), {}; final version {} words]",
            result.total_iterations, result.termination, last.size
        ),
        None => eprintln!("[{} iteration(s), {}]", result.total_iterations, result.termination),
    }

    let save = !args.no_save_artifacts && cfg.save_artifacts.unwrap_or(true);
    if save {
        let dir = args
            .output_dir
            .clone()
            .or(cfg.output_dir.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));
        let basename = args.basename.clone().unwrap_or_else(|| result.kind.clone());
        let written = artifacts::ArtifactWriter::new(dir, basename).save(&result)?;
        for path in written {
            eprintln!("saved {}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "reflex",
            "essay",
            "photosynthesis",
            "--model",
            "gpt-4.1",
            "--revision-model",
            "gpt-4o",
            "--max-iterations",
            "3",
            "--no-stop-on-convergence",
        ]);
        let cfg = config::Config {
            model: Some("ignored".into()),
            ..config::Config::default()
        };

        let run = build_run_config(&cfg, &args);
        assert_eq!(run.draft.model, "gpt-4.1");
        assert_eq!(run.reflection.model, "gpt-4.1");
        assert_eq!(run.revision.model, "gpt-4o");
        assert_eq!(run.max_iterations, 3);
        assert!(!run.stop_on_convergence);
        assert_eq!(run.max_turns, 10);
    }

    #[test]
    fn test_config_model_used_without_flag() {
        let args = Args::parse_from(["reflex", "ask", "what time is it?"]);
        let cfg = config::Config {
            model: Some("gpt-4.1-mini".into()),
            ..config::Config::default()
        };
        assert_eq!(build_run_config(&cfg, &args).draft.model, "gpt-4.1-mini");
    }

    #[test]
    fn test_chart_requires_dataset() {
        assert!(Args::try_parse_from(["reflex", "chart", "sales by quarter"]).is_err());
        let args =
            Args::try_parse_from(["reflex", "chart", "sales", "--schema", "cols.txt"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Chart { chart_path, data: None, .. } if chart_path == "chart.png"
        ));
        let args =
            Args::try_parse_from(["reflex", "chart", "sales", "--data", "sales.csv"]).unwrap();
        assert!(matches!(args.command, Command::Chart { data: Some(_), schema: None, .. }));
        assert!(
            Args::try_parse_from([
                "reflex", "chart", "sales", "--data", "a.csv", "--schema", "b.txt"
            ])
            .is_err()
        );
    }

    #[test]
    fn test_metric_flag() {
        let args = Args::parse_from(["reflex", "essay", "tides", "--metric", "size_delta"]);
        assert_eq!(args.metric.as_deref(), Some("size_delta"));
        assert_eq!(
            metric_by_name(args.metric.as_deref().unwrap()).unwrap().name(),
            "size_delta"
        );
    }
}
