//! CLI output formatting

use crate::{
    core::{DeploymentState, DeploymentStatus, ExecutionStatus, StepState},
    execution::ExecutionEvent,
    persistence::ExecutionSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Spinner shown while steps run
pub fn create_spinner(total_steps: usize) -> ProgressBar {
    let spinner = ProgressBar::new(total_steps as u64);
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Horizontal rule as wide as the terminal
pub fn separator() -> String {
    let width = term_size::dimensions_stdout()
        .map(|(w, _)| w)
        .unwrap_or(80)
        .min(120);
    style("─".repeat(width)).dim().to_string()
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Completed { .. } => style("COMPLETED").green().to_string(),
        StepState::Warned { .. } => style("WARNED").yellow().to_string(),
        StepState::Failed { .. } => style("FAILED").red().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

pub fn format_deployment_state(state: DeploymentState) -> String {
    let text = state.to_string();
    match state {
        DeploymentState::Stable => style(text).green().to_string(),
        DeploymentState::Failed | DeploymentState::TimedOut => style(text).red().to_string(),
        DeploymentState::Pending | DeploymentState::Running => style(text).yellow().to_string(),
    }
}

pub fn format_deployment_status(status: DeploymentStatus) -> String {
    let text = status.to_string();
    match status {
        DeploymentStatus::Primary => style(text).green().to_string(),
        DeploymentStatus::Active => style(text).cyan().to_string(),
        DeploymentStatus::Draining => style(text).yellow().to_string(),
        DeploymentStatus::Unknown => style(text).dim().to_string(),
    }
}

/// Format run summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Pending => INFO,
    };

    let deployment = summary
        .deployment
        .map(|d| format!(" - {}", format_deployment_state(d)))
        .unwrap_or_default();

    format!(
        "{} {} - {} - {} [{}] ({}/{}){} - {}",
        status_icon,
        style(short_id(&summary.execution_id.to_string())).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        style(&summary.trigger).cyan(),
        summary.completed_steps,
        summary.total_steps,
        deployment,
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            total_steps,
        } => format!(
            "{} Starting pipeline {} ({}, {} steps)",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(&execution_id.to_string())).dim(),
            total_steps
        ),
        ExecutionEvent::StepStarted {
            step_id,
            action,
            index,
        } => format!(
            "{} [{}] {} {}",
            SPINNER,
            index + 1,
            style(step_id).cyan(),
            style(action).dim()
        ),
        ExecutionEvent::StepCompleted { step_id, outputs } => {
            let mut line = format!("{} {}", CHECK, style(step_id).green());
            let sorted: BTreeMap<_, _> = outputs.iter().collect();
            for (key, value) in sorted {
                line.push_str(&format!(
                    "\n    {} = {}",
                    style(key).dim(),
                    truncate(value, 100)
                ));
            }
            line
        }
        ExecutionEvent::StepWarned { step_id, warning } => {
            format!("{} {}: {}", WARN, style(step_id).yellow(), style(warning).dim())
        }
        ExecutionEvent::StepFailed { step_id, error } => {
            format!("{} {}: {}", CROSS, style(step_id).red(), style(error).dim())
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        } => {
            let status_str = match status {
                ExecutionStatus::Completed => format!("completed {}", style("successfully").green()),
                ExecutionStatus::Failed => style("failed").red().to_string(),
                other => format!("{:?}", other),
            };
            format!(
                "{} Pipeline ({}) {}",
                INFO,
                style(short_id(&execution_id.to_string())).dim(),
                status_str
            )
        }
    }
}

/// Single-line value, cut to `max` characters
pub fn truncate(value: &str, max: usize) -> String {
    let single_line = value.replace('\n', " ");
    if single_line.chars().count() <= max {
        single_line
    } else {
        let cut: String = single_line.chars().take(max).collect();
        format!("{}{}", cut, style("…").dim())
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
