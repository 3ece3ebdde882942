//! Scheduler: registers agents and drives them in batches
//!
//! Every batch operation (`start_all`, `dispatch_tasks`, `stop_all`, `shutdown`)
//! has the same shape:
//!   - snapshot the registered set (later registrations do not join the batch)
//!   - issue the per-agent operation in registration order
//!   - await all of them concurrently under one deadline
//!   - record an outcome per agent identity, never stopping at a failure
//!
//! A deadline only stops the scheduler from waiting. The agent keeps running an
//! operation it already began and discards the late result; a task it had not
//! begun yet is skipped.
//!
//! Registered agents report their own state changes to the scheduler's event sink.

use chrono::Utc;
use futures::future::join_all;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::agents::Agent;
use crate::coordination::{AgentState, EventSink, LifecycleEvent, TracingSink};
use crate::error::{Result, SchedulerError};

use super::config::SchedulerConfig;
use super::report::{AgentOutcome, AgentReport, BatchOperation, BatchReport};
use super::state::{AgentSnapshot, SchedulerState};

/// Process-local coordinator owning a set of agents
pub struct Scheduler {
    config: SchedulerConfig,
    /// Registration order is dispatch order
    agents: RwLock<Vec<Arc<dyn Agent>>>,
    state: RwLock<SchedulerState>,
    rounds: AtomicU64,
    events: Arc<dyn EventSink>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_event_sink(config, Arc::new(TracingSink))
    }

    pub fn with_defaults() -> Self {
        Self::new(SchedulerConfig::default())
    }

    pub fn with_event_sink(config: SchedulerConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            agents: RwLock::new(Vec::new()),
            state: RwLock::new(SchedulerState::Created),
            rounds: AtomicU64::new(0),
            events,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub async fn state(&self) -> SchedulerState {
        *self.state.read().await
    }

    /// Register an agent; the scheduler becomes its only owner.
    ///
    /// The agent's lifecycle events are routed to the scheduler's event sink.
    pub async fn register_agent<A: Agent>(&self, agent: A) -> Result<()> {
        let agent: Arc<dyn Agent> = Arc::new(agent);

        let state = self.state.read().await;
        if !state.accepts_registrations() {
            return Err(SchedulerError::SchedulerShutDown);
        }

        let mut agents = self.agents.write().await;
        if agents.iter().any(|a| a.id() == agent.id()) {
            warn!(agent = %agent.id(), "rejected duplicate agent registration");
            return Err(SchedulerError::DuplicateAgent(agent.id().to_string()));
        }

        agent.attach_event_sink(Arc::clone(&self.events)).await;
        let id = agent.id().to_string();
        agents.push(agent);
        debug!(agent = %id, total = agents.len(), "agent added to scheduler");
        self.events.emit(LifecycleEvent::AgentRegistered {
            agent: id,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Remove an agent and request a bounded graceful stop.
    ///
    /// The agent leaves the collection even if its stop fails or times out;
    /// the returned outcome reports how the stop went.
    pub async fn unregister_agent(&self, id: &str) -> Result<AgentOutcome> {
        let agent = {
            let mut agents = self.agents.write().await;
            let idx = agents
                .iter()
                .position(|a| a.id() == id)
                .ok_or_else(|| SchedulerError::AgentNotFound(id.to_string()))?;
            agents.remove(idx)
        };

        self.events.emit(LifecycleEvent::AgentUnregistered {
            agent: id.to_string(),
            at: Utc::now(),
        });

        let timeout = self.config.stop_timeout();
        let outcome = match tokio::time::timeout(timeout, agent.stop()).await {
            Ok(Ok(())) => AgentOutcome::Stopped,
            Ok(Err(e)) => AgentOutcome::Failed(e),
            Err(_) => AgentOutcome::TimedOut,
        };
        self.emit_outcome(id, "unregister", None, &outcome, timeout);
        Ok(outcome)
    }

    /// Start one registered agent, e.g. one added after `start_all`.
    ///
    /// Bounded by the start timeout like a `start_all` entry.
    pub async fn start_agent(&self, id: &str) -> Result<AgentOutcome> {
        {
            let mut state = self.state.write().await;
            match *state {
                SchedulerState::ShutDown => return Err(SchedulerError::SchedulerShutDown),
                SchedulerState::Created => *state = SchedulerState::Running,
                SchedulerState::Running => {}
            }
        }

        let agent = self
            .find(id)
            .await
            .ok_or_else(|| SchedulerError::AgentNotFound(id.to_string()))?;

        let timeout = self.config.start_timeout();
        let outcome = match tokio::time::timeout(timeout, agent.start()).await {
            Ok(Ok(())) => AgentOutcome::Started,
            Ok(Err(e)) => AgentOutcome::Failed(e),
            Err(_) => AgentOutcome::TimedOut,
        };
        self.emit_outcome(id, "start", None, &outcome, timeout);
        Ok(outcome)
    }

    /// Start every registered agent.
    ///
    /// Agents that are already running are reported `Failed(InvalidState)`;
    /// use `start_agent` for agents registered after the first `start_all`.
    pub async fn start_all(&self) -> BatchReport {
        {
            let mut state = self.state.write().await;
            match *state {
                SchedulerState::ShutDown => {
                    warn!("start_all called on shut down scheduler");
                    return BatchReport::empty(BatchOperation::StartAll, None);
                }
                SchedulerState::Created => *state = SchedulerState::Running,
                SchedulerState::Running => {}
            }
        }

        let agents = self.snapshot().await;
        info!(agents = agents.len(), "starting all agents");
        self.run_batch(
            BatchOperation::StartAll,
            None,
            agents,
            self.config.start_timeout(),
            |agent| async move {
                match agent.start().await {
                    Ok(()) => AgentOutcome::Started,
                    Err(e) => AgentOutcome::Failed(e),
                }
            },
        )
        .await
    }

    /// One dispatch round with the configured deadline
    pub async fn dispatch_tasks(&self) -> BatchReport {
        self.dispatch_tasks_with_timeout(self.config.dispatch_timeout())
            .await
    }

    /// One dispatch round: every registered agent performs one task.
    ///
    /// Returns once all agents answered or `timeout` elapsed. Agents still
    /// working at the deadline are reported `TimedOut`.
    pub async fn dispatch_tasks_with_timeout(&self, timeout: Duration) -> BatchReport {
        if self.state().await == SchedulerState::ShutDown {
            warn!("dispatch_tasks called on shut down scheduler");
            return BatchReport::empty(BatchOperation::Dispatch, None);
        }

        let agents = self.snapshot().await;
        let round = self.rounds.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            round,
            agents = agents.len(),
            timeout_ms = timeout.as_millis() as u64,
            "dispatching tasks"
        );

        self.run_batch(
            BatchOperation::Dispatch,
            Some(round),
            agents,
            timeout,
            |agent| async move {
                match agent.perform_task().await {
                    Ok(output) => AgentOutcome::Success(output),
                    Err(e) => AgentOutcome::Failed(e),
                }
            },
        )
        .await
    }

    /// Request a graceful stop of every registered agent.
    pub async fn stop_all(&self) -> BatchReport {
        let agents = self.snapshot().await;
        info!(agents = agents.len(), "stopping all agents");
        self.stop_batch(BatchOperation::StopAll, agents).await
    }

    /// Tear the scheduler down: stop every agent, then release them.
    /// Later registrations fail and batches return empty reports.
    pub async fn shutdown(&self) -> BatchReport {
        {
            let mut state = self.state.write().await;
            if *state == SchedulerState::ShutDown {
                return BatchReport::empty(BatchOperation::Shutdown, None);
            }
            *state = SchedulerState::ShutDown;
        }

        let agents = self.snapshot().await;
        info!(agents = agents.len(), "shutting down scheduler");
        let report = self.stop_batch(BatchOperation::Shutdown, agents).await;

        let released = {
            let mut agents = self.agents.write().await;
            std::mem::take(&mut *agents)
        };
        for agent in &released {
            self.events.emit(LifecycleEvent::AgentUnregistered {
                agent: agent.id().to_string(),
                at: Utc::now(),
            });
        }
        report
    }

    async fn stop_batch(&self, operation: BatchOperation, agents: Vec<Arc<dyn Agent>>) -> BatchReport {
        self.run_batch(
            operation,
            None,
            agents,
            self.config.stop_timeout(),
            |agent| async move {
                match agent.stop().await {
                    Ok(()) => AgentOutcome::Stopped,
                    Err(e) => AgentOutcome::Failed(e),
                }
            },
        )
        .await
    }

    async fn find(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.agents
            .read()
            .await
            .iter()
            .find(|a| a.id() == id)
            .cloned()
    }

    /// Consistent copy of the registered set
    async fn snapshot(&self) -> Vec<Arc<dyn Agent>> {
        self.agents.read().await.clone()
    }

    /// Fault-isolated batch: every agent is attempted, every outcome recorded
    async fn run_batch<F, Fut>(
        &self,
        operation: BatchOperation,
        round: Option<u64>,
        agents: Vec<Arc<dyn Agent>>,
        timeout: Duration,
        op: F,
    ) -> BatchReport
    where
        F: Fn(Arc<dyn Agent>) -> Fut,
        Fut: Future<Output = AgentOutcome>,
    {
        let started_at = Utc::now();
        let start = std::time::Instant::now();
        let deadline = tokio::time::Instant::now() + timeout;

        // join_all polls in order, so each operation is issued in registration order
        let attempts = agents.iter().map(|agent| {
            let id = agent.id().to_string();
            let attempt = op(Arc::clone(agent));
            async move {
                let outcome = match tokio::time::timeout_at(deadline, attempt).await {
                    Ok(outcome) => outcome,
                    Err(_) => AgentOutcome::TimedOut,
                };
                (id, outcome)
            }
        });
        let results = join_all(attempts).await;

        let entries: Vec<AgentReport> = results
            .into_iter()
            .map(|(agent, outcome)| {
                self.emit_outcome(&agent, operation.as_str(), round, &outcome, timeout);
                AgentReport { agent, outcome }
            })
            .collect();

        let report = BatchReport {
            operation,
            round,
            entries,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        self.events.emit(LifecycleEvent::BatchCompleted {
            operation: operation.to_string(),
            round,
            total: report.len(),
            succeeded: report.succeeded(),
            failed: report.failed(),
            timed_out: report.timed_out(),
            duration_ms: report.duration_ms,
            at: Utc::now(),
        });
        report
    }

    fn emit_outcome(
        &self,
        agent: &str,
        operation: &'static str,
        round: Option<u64>,
        outcome: &AgentOutcome,
        timeout: Duration,
    ) {
        let detail = match outcome {
            AgentOutcome::Failed(e) => Some(format!("{}: {}", e.kind(), e)),
            AgentOutcome::TimedOut => Some(
                SchedulerError::TimedOut {
                    agent: agent.to_string(),
                    operation,
                    timeout_ms: timeout.as_millis() as u64,
                }
                .to_string(),
            ),
            _ => None,
        };
        self.events.emit(LifecycleEvent::AgentOutcome {
            agent: agent.to_string(),
            operation: operation.to_string(),
            round,
            outcome: outcome.label().to_string(),
            detail,
            at: Utc::now(),
        });
    }

    // === Queries ===

    pub async fn agent_count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Registered identities in registration order
    pub async fn agent_ids(&self) -> Vec<String> {
        self.agents
            .read()
            .await
            .iter()
            .map(|a| a.id().to_string())
            .collect()
    }

    pub async fn agent_state(&self, id: &str) -> Option<AgentState> {
        self.agents
            .read()
            .await
            .iter()
            .find(|a| a.id() == id)
            .map(|a| a.state())
    }

    pub async fn agent_states(&self) -> Vec<(String, AgentState)> {
        self.agents
            .read()
            .await
            .iter()
            .map(|a| (a.id().to_string(), a.state()))
            .collect()
    }

    pub async fn agent_snapshot(&self, id: &str) -> Option<AgentSnapshot> {
        Some(self.find(id).await?.snapshot().await)
    }

    pub async fn agent_snapshots(&self) -> Vec<AgentSnapshot> {
        let agents = self.snapshot().await;
        let mut snapshots = Vec::with_capacity(agents.len());
        for agent in agents {
            snapshots.push(agent.snapshot().await);
        }
        snapshots
    }

    /// Dispatch rounds issued so far
    pub fn rounds_dispatched(&self) -> u64 {
        self.rounds.load(Ordering::SeqCst)
    }
}
