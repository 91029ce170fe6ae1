mod config;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use events::{EventBus, RunSubscription};
use handoff_core::{RoleRegistry, RunState, WorkItem};
use orchestrator::{
    DelegationCoordinator, FileOwnershipPlanner, ReportFormatter, RunOutcome, ScriptedInvoker,
};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{HandoffConfig, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "handoff")]
#[command(about = "Plan and coordinate development work across specialised roles", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered roles and their permissions
    Roles,
    /// Render the execution plan for a JSON list of work items
    Plan { items: PathBuf },
    /// Drive a full run against scripted role results
    Replay {
        script: PathBuf,

        #[arg(long)]
        request: String,

        /// Answer for the next clarification round; repeatable
        #[arg(long = "answer")]
        answers: Vec<String>,

        /// Blocker finding to accept; repeatable
        #[arg(long = "accept")]
        accept: Vec<String>,

        /// Print run events as JSON lines on stderr
        #[arg(long)]
        events: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = HandoffConfig::read(&cli.config).await;
    let registry = config
        .registry()
        .with_context(|| format!("Invalid roles in {}", cli.config.display()))?;

    match cli.command {
        Commands::Roles => list_roles(&registry),
        Commands::Plan { items } => plan(&registry, &items).await,
        Commands::Replay {
            script,
            request,
            answers,
            accept,
            events,
        } => replay(config, registry, &script, request, answers, accept, events).await,
    }
}

fn list_roles(registry: &RoleRegistry) -> Result<()> {
    println!();
    for role in registry.roles() {
        let mut tags = Vec::new();
        if role.can_write_code {
            tags.push("writes code");
        }
        if role.can_block_completion {
            tags.push("can block");
        }

        println!("  {} {}", role.id.bold(), role.description.dimmed());
        let permissions: Vec<&str> = role.permissions.iter().map(|p| p.as_str()).collect();
        println!("    permissions: {}", permissions.join(", "));
        if !tags.is_empty() {
            println!("    tags:        {}", tags.join(", "));
        }
        if let Some(ref target) = role.escalates_to {
            println!("    escalates:   {} {}", "->".dimmed(), target);
        }
    }
    println!();
    Ok(())
}

async fn plan(registry: &RoleRegistry, path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let items: Vec<WorkItem> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse work items in {}", path.display()))?;

    for item in &items {
        if !registry.contains(&item.role) {
            bail!("Work item {} is assigned to unknown role {}", item.id, item.role);
        }
    }

    let plan = FileOwnershipPlanner::plan(&items)?;
    print!("{}", ReportFormatter::render_plan(&plan));
    Ok(())
}

async fn replay(
    config: HandoffConfig,
    registry: RoleRegistry,
    script: &Path,
    request: String,
    answers: Vec<String>,
    accept: Vec<String>,
    print_events: bool,
) -> Result<()> {
    let content = tokio::fs::read_to_string(script)
        .await
        .with_context(|| format!("Failed to read {}", script.display()))?;
    let invoker = ScriptedInvoker::from_json(&content)
        .with_context(|| format!("Failed to parse script {}", script.display()))?;

    let bus = EventBus::new();
    let printer = print_events
        .then(|| tokio::spawn(forward_events(bus.subscribe_all(), std::io::stderr())));
    let coordinator = DelegationCoordinator::new(registry, Arc::new(invoker), config.coordinator)
        .with_event_bus(bus);

    let (mut state, mut outcome) = coordinator.run(request).await;
    let mut answers = answers.into_iter();
    let mut accept = Some(accept).filter(|ids| !ids.is_empty());

    let result = loop {
        outcome = match outcome {
            RunOutcome::NeedsClarification { questions } => {
                println!("{}", "Clarification needed:".yellow().bold());
                for question in &questions {
                    println!("  ? {question}");
                }
                match answers.next() {
                    Some(answer) => {
                        println!("  > {answer}");
                        coordinator.reply(&mut state, answer).await?
                    }
                    None => break paused(&state, "no answer left to give"),
                }
            }
            RunOutcome::AwaitingAcceptance { blockers } => {
                println!("{}", "Blockers awaiting acceptance:".yellow().bold());
                for finding in &blockers {
                    println!("  ! {} {}", finding.id, finding.message);
                }
                match accept.take() {
                    Some(ids) => coordinator.accept_findings(&mut state, &ids).await?,
                    None => break paused(&state, "no findings accepted"),
                }
            }
            RunOutcome::Completed { report } => {
                println!();
                print!("{report}");
                println!("{}", "Run completed".green().bold());
                break Ok(());
            }
            RunOutcome::Halted { error, report } => {
                println!();
                print!("{report}");
                break Err(anyhow::Error::new(error).context("Run halted"));
            }
        };
    };

    // Closes the bus so the printer sees the end of the stream.
    drop(coordinator);
    if let Some(printer) = printer {
        let (_, missed) = printer.await.context("Event printer panicked")??;
        if missed > 0 {
            warn!(missed, "Some run events were dropped before they could be printed");
        }
    }
    result
}

/// Write every event as a JSON line until the bus closes.
///
/// Returns the writer and how many events were lost to lag.
async fn forward_events<W: Write>(mut events: RunSubscription, mut out: W) -> Result<(W, u64)> {
    while let Some(envelope) = events.next().await {
        writeln!(out, "{}", serde_json::to_string(&envelope)?)?;
    }
    Ok((out, events.missed()))
}

fn paused(state: &RunState, why: &str) -> Result<()> {
    println!();
    print!("{}", ReportFormatter::render(state));
    println!("{} ({why})", "Run paused".yellow().bold());
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "handoff=warn,orchestrator=warn".into()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::{Event, EventEnvelope};

    fn finished(state: &RunState, seq: u64) -> EventEnvelope {
        EventEnvelope::sequenced(
            Event::RunFinished {
                run_id: state.id,
                success: true,
                reason: None,
            },
            seq,
        )
    }

    #[tokio::test]
    async fn test_forward_events_prints_more_than_bus_capacity() {
        let bus = EventBus::new();
        let printer = tokio::spawn(forward_events(bus.subscribe_all(), Vec::new()));
        let state = RunState::new("req");

        for seq in 0..300 {
            bus.publish(finished(&state, seq));
            tokio::task::yield_now().await;
        }
        drop(bus);

        let (out, missed) = printer.await.unwrap().unwrap();
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.lines().count(), 300);
        assert_eq!(missed, 0);
        assert!(out.lines().last().unwrap().contains("\"sequence\":299"));
    }

    #[tokio::test]
    async fn test_forward_events_reports_lag() {
        let bus = EventBus::with_capacity(2);
        let events = bus.subscribe_all();
        let state = RunState::new("req");

        for seq in 0..5 {
            bus.publish(finished(&state, seq));
        }
        drop(bus);

        let (out, missed) = forward_events(events, Vec::new()).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
        assert_eq!(missed, 3);
    }
}
