use anyhow::{Context, Result};
use deployline::cli::commands::{
    EndpointCommand, HistoryCommand, ListCommand, RenderCommand, RunCommand, StatusCommand,
    ValidateCommand,
};
use deployline::cli::output::*;
use deployline::cli::{Cli, Command};
use deployline::cloud::{
    AwsCliClient, CloudAdapter, InMemoryCloud, PollPolicy, StatusReporter,
};
use deployline::core::task_definition::{parse_environment, TaskDefinitionDocument};
use deployline::core::{Pipeline, PipelineConfig};
use deployline::error::DeployError;
use deployline::execution::{ExecutionEngine, ExecutionEvent, RunReport};
use deployline::persistence::{
    create_summary, ExecutionStatus, ExecutionSummary, InMemoryPersistence, PersistenceBackend,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG overrides the verbosity flag
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("deployline={}", log_level)));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let succeeded = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Render(cmd) => render_task_definition(cmd)?,
        Command::Status(cmd) => show_status(cmd).await?,
        Command::Endpoint(cmd) => resolve_endpoint(cmd).await?,
        Command::List(cmd) => list_pipelines(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    #[cfg(feature = "sqlite")]
    {
        let store = deployline::persistence::SqliteExecutionStore::with_default_path().await?;
        Ok(Arc::new(store))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        Ok(Arc::new(InMemoryPersistence::new()))
    }
}

async fn run_pipeline(cmd: &RunCommand) -> Result<bool> {
    let config = PipelineConfig::from_file(&cmd.file)
        .with_context(|| format!("Failed to load pipeline {}", cmd.file.display()))?;

    println!("{} Loaded pipeline: {}", INFO, style(&config.name).bold());

    let trigger = cmd.trigger();
    let mut pipeline = config
        .pipeline_for(&trigger)
        .with_context(|| format!("Cannot start '{}' from {}", config.name, trigger))?;

    for (key, value) in &cmd.env {
        pipeline.env.insert(key.clone(), value.clone());
        println!(
            "{} Env override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let store: Arc<dyn PersistenceBackend> = if cmd.records_history() {
        open_store().await?
    } else {
        Arc::new(InMemoryPersistence::new())
    };

    println!("{}", separator());
    let result = if cmd.dry_run {
        println!("{} Dry run against a simulated service", WARN);
        execute(Arc::new(InMemoryCloud::permissive()), &mut pipeline).await
    } else {
        execute(Arc::new(AwsCliClient::new(cmd.cloud.client_config())), &mut pipeline).await
    };
    println!("{}", separator());

    if cmd.records_history() {
        let summary = create_summary(&pipeline, &trigger);
        store.save_execution(&summary).await?;
        println!(
            "{} Run saved to history (ID: {})",
            INFO,
            style(&summary.execution_id.to_string()[..8]).dim()
        );
    }

    match result {
        Ok(report) => {
            print_report(&report);
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&pipeline.name).bold(),
                style("successfully").green()
            );
            Ok(true)
        }
        Err(e) => {
            for step in &pipeline.steps {
                println!("  {} {}", style(&step.id).bold(), format_step_state(&step.state));
            }
            println!(
                "\n{} {} {}",
                CROSS,
                style(&pipeline.name).bold(),
                style("failed").red()
            );
            error!("{}", e);
            Ok(false)
        }
    }
}

async fn execute<C: CloudAdapter>(cloud: Arc<C>, pipeline: &mut Pipeline) -> Result<RunReport, DeployError> {
    let spinner = create_spinner(pipeline.steps.len());
    let handle = spinner.clone();
    let engine = ExecutionEngine::new(cloud).with_event_handler(move |event| {
        match &event {
            ExecutionEvent::StepStarted { step_id, .. } => handle.set_message(step_id.clone()),
            ExecutionEvent::StepCompleted { .. } | ExecutionEvent::StepWarned { .. } => handle.inc(1),
            _ => {}
        }
        handle.println(format_execution_event(&event));
    });

    let result = engine.execute(pipeline).await;
    spinner.finish_and_clear();
    result
}

fn print_report(report: &RunReport) {
    if let Some(deployment) = report.deployment {
        println!("{} Deployment: {}", INFO, format_deployment_state(deployment));
    }
    for (step_id, warning) in &report.warnings {
        println!("{} {}: {}", WARN, style(step_id).yellow(), warning);
    }
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<bool> {
    println!("{} Validating pipeline...", INFO);

    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Steps: {}", style(config.steps.len()).cyan());
            for step in config.to_pipeline().steps {
                println!(
                    "    {} {} -> {}",
                    style(&step.id).bold(),
                    style(step.action).dim(),
                    step.declared_outputs().join(", ")
                );
            }
            println!("  Env bindings: {}", style(config.env.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(true)
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            Ok(false)
        }
    }
}

fn render_task_definition(cmd: &RenderCommand) -> Result<bool> {
    let template = TaskDefinitionDocument::from_file(&cmd.template)?;
    let environment = parse_environment(&cmd.environment.join("\n"))?;
    let rendered = template.with_container_image(&cmd.container, &cmd.image, &environment)?;
    rendered.validate()?;

    let json = rendered.to_json_pretty()?;
    match &cmd.output {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{} Rendered {} into {}",
                CHECK,
                style(&rendered.family).bold(),
                style(path.display()).cyan()
            );
        }
        None => println!("{}", json),
    }
    Ok(true)
}

async fn show_status(cmd: &StatusCommand) -> Result<bool> {
    let reporter = StatusReporter::new(Arc::new(AwsCliClient::new(cmd.cloud.client_config())));

    let status = reporter.service_status(&cmd.cluster, &cmd.service).await?;
    let deployment_status = match &cmd.deployment_id {
        Some(id) => Some(reporter.deployment_status(&cmd.cluster, &cmd.service, id).await?),
        None => None,
    };

    if cmd.json {
        let data = serde_json::json!({
            "cluster": cmd.cluster,
            "service": cmd.service,
            "status": status.status,
            "running_count": status.running_count,
            "desired_count": status.desired_count,
            "deployment_id": cmd.deployment_id,
            "deployment_status": deployment_status,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!(
            "{} {}/{}: {} ({}/{} running)",
            INFO,
            style(&cmd.cluster).dim(),
            style(&cmd.service).bold(),
            format_deployment_status(status.status),
            status.running_count,
            status.desired_count
        );
        if let (Some(id), Some(s)) = (&cmd.deployment_id, deployment_status) {
            println!("  Deployment {}: {}", style(id).cyan(), format_deployment_status(s));
        }
    }
    Ok(true)
}

async fn resolve_endpoint(cmd: &EndpointCommand) -> Result<bool> {
    let reporter = StatusReporter::new(Arc::new(AwsCliClient::new(cmd.cloud.client_config())));
    let policy = PollPolicy::attempts(cmd.attempts, Duration::from_secs(cmd.interval_secs));

    match reporter
        .resolve_public_endpoint(&cmd.cluster, &cmd.service, cmd.port, &cmd.scheme, &policy)
        .await
    {
        Ok(endpoint) => {
            println!("{}", endpoint.url());
            Ok(true)
        }
        Err(e @ DeployError::EndpointNotFound { .. }) => {
            println!("{} {}", WARN, e);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

async fn list_pipelines(cmd: &ListCommand) -> Result<bool> {
    let store = open_store().await?;
    let pipelines = store.list_pipelines().await?;

    if cmd.json {
        let mut json_data = Vec::new();
        for pipeline in &pipelines {
            let runs = store.list_executions(pipeline, usize::MAX).await?;
            json_data.push(serde_json::json!({
                "name": pipeline,
                "run_count": runs.len(),
            }));
        }
        let data = serde_json::json!({ "pipelines": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(true);
    }

    if pipelines.is_empty() {
        println!("{} No pipelines found in history", INFO);
        return Ok(true);
    }

    println!("{} Pipelines in history:", INFO);
    for pipeline_name in &pipelines {
        if cmd.with_counts {
            let runs = store.list_executions(pipeline_name, usize::MAX).await?;
            let completed = runs.iter().filter(|e| e.status == ExecutionStatus::Completed).count();
            let failed = runs.iter().filter(|e| e.status == ExecutionStatus::Failed).count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(pipeline_name).bold(),
                style(runs.len()).cyan(),
                style(completed).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(pipeline_name).bold());
        }
    }

    Ok(true)
}

async fn show_history(cmd: &HistoryCommand) -> Result<bool> {
    let store = open_store().await?;

    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;
        match store.load_execution(exec_id).await? {
            Some(summary) => print_execution_details(&summary, cmd.details)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(true);
    }

    let executions = match &cmd.pipeline {
        Some(pipeline_name) => store.list_executions(pipeline_name, cmd.limit).await?,
        None => {
            let mut all = Vec::new();
            for pipeline in store.list_pipelines().await? {
                all.extend(store.list_executions(&pipeline, cmd.limit).await?);
            }
            all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all.truncate(cmd.limit);
            all
        }
    };

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(true);
    }

    if executions.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(true);
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &executions {
        println!("  {}", format_execution_summary(summary));
    }

    Ok(true)
}

fn print_execution_details(summary: &ExecutionSummary, details: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Trigger: {}", style(&summary.trigger).cyan());
    println!("  Status: {}", format_status(summary.status));
    if let Some(deployment) = summary.deployment {
        println!("  Deployment: {}", format_deployment_state(deployment));
    }
    if let Some(step) = &summary.failed_step {
        println!("  Failed step: {}", style(step).red());
    }
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Some(duration) = summary.duration().and_then(|d| d.to_std().ok()) {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!("  Steps: {}/{}", summary.completed_steps, summary.total_steps);

    if details && !summary.outputs.is_empty() {
        println!("\n  {}", style("Outputs:").bold());
        for (key, value) in &summary.outputs {
            println!("    {} = {}", style(key).dim(), truncate(value, 120));
        }
    }

    Ok(())
}
