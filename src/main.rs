use anyhow::{Context, Result};
use ci_runner::cache::{CacheStore, InMemoryCacheStore};
use ci_runner::cli::commands::{CacheBackendArg, ListCommand, RunCommand, ValidateCommand};
use ci_runner::cli::output::*;
use ci_runner::cli::terminal_output::TerminalReporter;
use ci_runner::cli::{Cli, Command};
use ci_runner::core::config::{load_pipelines, ConfigError};
use ci_runner::core::secrets::{ChainedSecrets, EnvSecrets, SecretStore, StaticSecrets};
use ci_runner::core::{Pipeline, PipelineResult, TriggerEvent};
use ci_runner::execution::{EngineConfig, ExecutionEngine};
use ci_runner::runner::{RunnerConfig, ShellRunner};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

const EXIT_FAILED: i32 = 1;
const EXIT_CONFIG: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match &cli.command {
        Command::Run(cmd) => run_pipelines(cmd).await,
        Command::Validate(cmd) => validate_pipelines(cmd),
        Command::List(cmd) => list_pipelines(cmd),
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {}", CROSS, style(format!("{:#}", e)).red());
            if e.downcast_ref::<ConfigError>().is_some() {
                std::process::exit(EXIT_CONFIG);
            }
            error!("{:#}", e);
            std::process::exit(EXIT_FAILED);
        }
    }
}

async fn run_pipelines(cmd: &RunCommand) -> Result<i32> {
    let pipelines = load_pipelines(&cmd.file)?;
    let event = TriggerEvent::new(&cmd.event);

    let selected = ExecutionEngine::<ShellRunner>::select(&pipelines, &event);
    if selected.is_empty() {
        println!("{} No pipeline is triggered by {}", INFO, style(&event).cyan());
        return Ok(0);
    }
    let total: usize = selected.iter().map(|p| p.instance_count()).sum();

    let cache = open_cache(cmd).await?;
    let secrets = build_secrets(cmd);

    let workspace = match &cmd.workspace {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Failed to resolve the current directory")?,
    };
    let runner = ShellRunner::new(RunnerConfig::new().with_inherit_env(!cmd.clean_env));
    let config = EngineConfig::new(workspace)
        .with_strategy(cmd.strategy.into_strategy(cmd.max_parallel))
        .with_step_timeout(cmd.timeout_secs.map(Duration::from_secs));

    let engine = ExecutionEngine::new(runner, cache, secrets, config);
    let reporter = TerminalReporter::new(total, cmd.show_output);
    let handler = reporter.clone();
    engine.add_event_handler(move |event| handler.handle(&event));

    let results = engine.trigger(&pipelines, &event).await;
    reporter.finish(&results);

    for result in &results {
        reporter.print_separator();
        print_result(result, cmd.show_output);
    }

    let code = results
        .iter()
        .map(PipelineResult::exit_code)
        .max()
        .unwrap_or(0);
    Ok(code)
}

async fn open_cache(cmd: &RunCommand) -> Result<Arc<dyn CacheStore>> {
    match cmd.cache {
        CacheBackendArg::Memory => Ok(Arc::new(InMemoryCacheStore::new())),
        #[cfg(feature = "sqlite")]
        CacheBackendArg::Sqlite => {
            use ci_runner::cache::SqliteCacheStore;
            let store = match &cmd.cache_path {
                Some(path) => SqliteCacheStore::new(path).await,
                None => SqliteCacheStore::with_default_path().await,
            }
            .context("Failed to open the cache database")?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        CacheBackendArg::Sqlite => {
            anyhow::bail!("this build has no sqlite support; use --cache memory")
        }
    }
}

fn build_secrets(cmd: &RunCommand) -> Arc<dyn SecretStore> {
    let provided: StaticSecrets = cmd.secret.iter().cloned().collect();
    if cmd.env_secrets {
        Arc::new(ChainedSecrets::new(vec![
            Box::new(provided),
            Box::new(EnvSecrets),
        ]))
    } else {
        Arc::new(provided)
    }
}

fn print_result(result: &PipelineResult, show_output: bool) {
    println!("{}", format_result_summary(result));

    if show_output {
        for outcome in &result.outcomes {
            for step in outcome.steps.iter().filter(|s| !s.output.trim().is_empty()) {
                println!("\n{}", format_step_heading(&outcome.id, step));
                println!("{}", format_output(&step.output, 40));
            }
        }
    }

    for outcome in &result.outcomes {
        for warning in &outcome.warnings {
            println!("{}{}: {}", WARN, style(&outcome.id).dim(), warning);
        }
    }

    for outcome in result.failed_instances() {
        println!("{}", format_failure(outcome));
    }
}

fn validate_pipelines(cmd: &ValidateCommand) -> Result<i32> {
    if cmd.json {
        // stdout carries the JSON document only
        let pipelines = load_pipelines(&cmd.file)?;
        let data: Vec<_> = pipelines.iter().map(|p| pipeline_json(p, false)).collect();
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(0);
    }

    println!("{} Validating {}...", INFO, cmd.file.display());
    let pipelines = load_pipelines(&cmd.file)?;
    println!(
        "{} {} pipeline definition(s) are valid",
        CHECK,
        style(pipelines.len()).cyan()
    );
    for pipeline in &pipelines {
        println!("  {}", format_pipeline(pipeline, false));
    }
    Ok(0)
}

fn list_pipelines(cmd: &ListCommand) -> Result<i32> {
    let pipelines = load_pipelines(&cmd.file)?;
    let pipelines: Vec<&Pipeline> = match &cmd.event {
        Some(kind) => {
            ExecutionEngine::<ShellRunner>::select(&pipelines, &TriggerEvent::new(kind))
        }
        None => pipelines.iter().collect(),
    };

    if cmd.json {
        let data: Vec<_> = pipelines
            .iter()
            .map(|p| pipeline_json(p, cmd.instances))
            .collect();
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(0);
    }

    if pipelines.is_empty() {
        println!("{} No pipelines found", INFO);
        return Ok(0);
    }

    println!("{} Pipelines:", INFO);
    for pipeline in pipelines {
        println!("  {}", format_pipeline(pipeline, cmd.instances));
    }
    Ok(0)
}

fn pipeline_json(pipeline: &Pipeline, with_instances: bool) -> serde_json::Value {
    let jobs: Vec<_> = pipeline
        .jobs
        .iter()
        .map(|job| {
            let instances = job.instances();
            let mut value = serde_json::json!({
                "name": job.name,
                "runs_on": job.target.source(),
                "fail_fast": job.fail_fast,
                "max_parallel": job.max_parallel,
                "continue_on_error": job.continue_on_error,
                "steps": job.steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
                "matrix": job.matrix.as_ref().map(|m| m.dimensions().to_vec()),
                "instance_count": instances.len(),
            });
            if with_instances {
                value["instances"] = serde_json::json!(instances);
            }
            value
        })
        .collect();

    serde_json::json!({
        "name": pipeline.name,
        "on": pipeline.triggers,
        "jobs": jobs,
    })
}
