//! Demo mode - simulated market agents driven by the scheduler
//!
//! Registers `agent_count` market agents, starts them, dispatches rounds and
//! stops them, printing every batch report and the final per-agent counters. Agents listed in `failing_agents`
//! get a market feed that is down, so their tasks fail while the rest proceed.

use anyhow::Result;
use clap::Args;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::agents::{MarketTask, SimulatedMarketApi, WorkerAgent};
use crate::config::{AppConfig, DemoConfig};
use crate::coordination::{install_signal_handlers, ShutdownController, ShutdownToken};
use crate::coordinator::{AgentOutcome, AgentSnapshot, BatchReport, Scheduler};

#[derive(Args, Debug, Default)]
pub struct DemoArgs {
    /// Number of market agents
    #[arg(short, long)]
    pub agents: Option<usize>,

    /// Agent whose market feed is down (repeatable)
    #[arg(long = "fail", value_name = "NAME")]
    pub fail: Vec<String>,

    /// Dispatch rounds (0 = until Ctrl-C)
    #[arg(short, long)]
    pub rounds: Option<u64>,

    /// Pause between rounds in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Deadline for one dispatch round in milliseconds
    #[arg(long)]
    pub dispatch_timeout_ms: Option<u64>,

    /// JSON logs and reports
    #[arg(long)]
    pub json: bool,
}

impl DemoArgs {
    /// Override configuration values given on the command line
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(agents) = self.agents {
            config.demo.agent_count = agents;
        }
        if !self.fail.is_empty() {
            config.demo.failing_agents = self.fail.clone();
        }
        if let Some(rounds) = self.rounds {
            config.demo.rounds = rounds;
        }
        if let Some(interval) = self.interval_ms {
            config.demo.round_interval_ms = interval;
        }
        if let Some(timeout) = self.dispatch_timeout_ms {
            config.scheduler.dispatch_timeout_ms = timeout;
        }
        if self.json {
            config.logging.json = true;
        }
    }
}

/// Build a scheduler holding one market agent per configured name
pub async fn build_scheduler(config: &AppConfig) -> crate::Result<Scheduler> {
    let scheduler = Scheduler::new(config.scheduler.clone());

    for name in config.demo.agent_names() {
        let failing = config.demo.is_failing(&name);
        let api = SimulatedMarketApi::new(dec!(3000)).with_outage(failing);
        let agent = WorkerAgent::new(name.clone(), MarketTask::new(api, config.demo.market.clone()))
            .with_command_buffer(config.scheduler.command_buffer());
        scheduler.register_agent(agent).await?;
        if failing {
            warn!(agent = %name, "market feed disabled for this agent");
        }
    }

    Ok(scheduler)
}

/// Dispatch the configured number of rounds, or until shutdown is requested.
///
/// An urgent shutdown abandons the in-flight round without a report.
pub async fn run_rounds(
    scheduler: &Scheduler,
    demo: &DemoConfig,
    mut shutdown: ShutdownToken,
    mut on_report: impl FnMut(&BatchReport),
) -> Vec<BatchReport> {
    let interval = Duration::from_millis(demo.round_interval_ms);
    let mut reports = Vec::new();
    let mut round = 0u64;

    loop {
        if shutdown.is_shutdown_requested() {
            info!(rounds = round, "shutdown requested, ending dispatch");
            break;
        }

        let mut urgent = shutdown.clone();
        let report = tokio::select! {
            report = scheduler.dispatch_tasks() => report,
            _ = urgent.wait_for_urgent() => {
                warn!(round = round + 1, "urgent shutdown, abandoning in-flight round");
                break;
            }
        };
        on_report(&report);
        reports.push(report);
        round += 1;

        if demo.rounds != 0 && round >= demo.rounds {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            signal = shutdown.wait_for_shutdown() => {
                info!(?signal, rounds = round, "shutdown requested between rounds");
                break;
            }
        }
    }

    reports
}

pub async fn run(config: AppConfig) -> Result<()> {
    if let Err(errors) = config.validate() {
        anyhow::bail!("invalid configuration: {}", errors.join("; "));
    }

    let json = config.logging.json;
    let scheduler = build_scheduler(&config).await?;
    info!(
        agents = scheduler.agent_count().await,
        rounds = config.demo.rounds,
        "demo scheduler ready"
    );

    let shutdown = Arc::new(ShutdownController::new());
    install_signal_handlers(Arc::clone(&shutdown));

    print_report(&scheduler.start_all().await, json)?;

    let mut print_error = None;
    run_rounds(&scheduler, &config.demo, shutdown.token(), |report| {
        if let Err(e) = print_report(report, json) {
            print_error.get_or_insert(e);
        }
    })
    .await;

    print_report(&scheduler.stop_all().await, json)?;
    print_snapshots(&scheduler.agent_snapshots().await, json)?;
    scheduler.shutdown().await;

    match print_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn print_report(report: &BatchReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&report.summary())?);
        return Ok(());
    }

    let title = match report.round {
        Some(round) => format!("{} round {}", report.operation, round),
        None => report.operation.to_string(),
    };
    println!(
        "\n\x1b[36m{title}\x1b[0m ({:?}, {}ms)",
        report.status(),
        report.duration_ms
    );

    for entry in &report.entries {
        match &entry.outcome {
            AgentOutcome::Success(output) => {
                let payload = output
                    .payload
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_default();
                println!("  \x1b[32m✓\x1b[0m {:<12} {}", entry.agent, payload);
            }
            AgentOutcome::Failed(e) => {
                println!("  \x1b[31m✗\x1b[0m {:<12} {}", entry.agent, e);
            }
            AgentOutcome::TimedOut => {
                println!("  \x1b[33m⏱\x1b[0m {:<12} timed out", entry.agent);
            }
            other => {
                println!("  \x1b[32m✓\x1b[0m {:<12} {}", entry.agent, other.label());
            }
        }
    }
    Ok(())
}

fn print_snapshots(snapshots: &[AgentSnapshot], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshots)?);
        return Ok(());
    }

    println!("\n\x1b[36magents\x1b[0m");
    for snapshot in snapshots {
        println!(
            "  {:<12} {:<8} completed {}/{} discarded {}",
            snapshot.agent_id,
            snapshot.state.to_string(),
            snapshot.tasks_completed,
            snapshot.tasks_attempted(),
            snapshot.tasks_discarded,
        );
        if let Some(error) = &snapshot.last_error {
            println!("  {:<12} last error: {}", "", error);
        }
    }
    Ok(())
}
