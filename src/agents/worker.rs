//! WorkerAgent: an agent hosted on its own tokio task
//!
//! `start()` spawns the worker task, which owns the `TaskExecutor` for the rest of
//! the agent's life. The handle talks to it only through `AgentCommand`s: a
//! dispatched task is a `PerformTask` message answered on a oneshot, so task code
//! never runs on the caller's stack. A panic inside the executor is caught in the
//! worker and faults only this agent.

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use async_trait::async_trait;

use crate::coordination::{AgentState, EventSink, LifecycleEvent, TracingSink};
use crate::coordinator::{AgentCommand, AgentSnapshot, SchedulerConfig};
use crate::error::{Result, SchedulerError};

use super::context::{TaskContext, TaskOutput};
use super::traits::{Agent, TaskExecutor};

/// State shared between the handle and the worker task
struct AgentShared {
    id: String,
    state_tx: watch::Sender<AgentState>,
    stats: RwLock<AgentSnapshot>,
    events: RwLock<Arc<dyn EventSink>>,
}

impl AgentShared {
    fn new(id: String, events: Arc<dyn EventSink>) -> Self {
        let (state_tx, _) = watch::channel(AgentState::Created);
        let stats = RwLock::new(AgentSnapshot::new(&id));
        Self {
            id,
            state_tx,
            stats,
            events: RwLock::new(events),
        }
    }

    fn state(&self) -> AgentState {
        *self.state_tx.borrow()
    }

    /// Apply a lifecycle transition if legal; illegal transitions are ignored
    async fn transition(&self, to: AgentState, reason: Option<String>) -> bool {
        let mut from = to;
        let changed = self.state_tx.send_if_modified(|state| {
            if state.can_transition_to(to) {
                from = *state;
                *state = to;
                true
            } else {
                false
            }
        });
        if !changed {
            debug!(agent = %self.id, state = %self.state(), %to, "ignored lifecycle transition");
            return false;
        }

        {
            let mut stats = self.stats.write().await;
            stats.state = to;
            match to {
                AgentState::Running => stats.started_at = Some(Utc::now()),
                AgentState::Stopped | AgentState::Faulted => stats.stopped_at = Some(Utc::now()),
                AgentState::Created => {}
            }
            if to == AgentState::Faulted {
                stats.last_error = reason.clone();
            }
        }

        self.events
            .read()
            .await
            .emit(LifecycleEvent::state_changed(&self.id, from, to, reason));
        true
    }

    async fn record_discarded(&self) {
        self.stats.write().await.tasks_discarded += 1;
    }

    async fn record_task(&self, error: Option<String>) {
        let mut stats = self.stats.write().await;
        stats.last_task_at = Some(Utc::now());
        match error {
            None => stats.tasks_completed += 1,
            Some(e) => {
                stats.tasks_failed += 1;
                stats.last_error = Some(e);
            }
        }
    }

    fn invalid_state(&self, operation: &'static str) -> SchedulerError {
        SchedulerError::InvalidState {
            agent: self.id.clone(),
            state: self.state(),
            operation,
        }
    }
}

/// Start/stop bookkeeping, serialized by a mutex
struct Lifecycle {
    /// Present until the agent is started (or stopped before starting)
    executor: Option<Box<dyn TaskExecutor>>,
    worker: Option<JoinHandle<()>>,
}

/// Agent whose execution context lives on a dedicated tokio task
pub struct WorkerAgent {
    shared: Arc<AgentShared>,
    lifecycle: Mutex<Lifecycle>,
    commands: Mutex<Option<mpsc::Sender<AgentCommand>>>,
    command_buffer: usize,
}

impl WorkerAgent {
    pub fn new(id: impl Into<String>, executor: impl TaskExecutor) -> Self {
        Self::from_boxed(id.into(), Box::new(executor))
    }

    pub fn from_boxed(id: String, executor: Box<dyn TaskExecutor>) -> Self {
        Self {
            shared: Arc::new(AgentShared::new(id, Arc::new(TracingSink))),
            lifecycle: Mutex::new(Lifecycle {
                executor: Some(executor),
                worker: None,
            }),
            commands: Mutex::new(None),
            command_buffer: SchedulerConfig::default().command_buffer(),
        }
    }

    /// Send lifecycle events to `events` instead of tracing.
    /// Registering with a scheduler replaces it with the scheduler's sink.
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        let id = self.shared.id.clone();
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => *shared.events.get_mut() = events,
            None => warn!(agent = %id, "event sink must be set before start"),
        }
        self
    }

    /// Capacity of the command channel (minimum 1)
    pub fn with_command_buffer(mut self, capacity: usize) -> Self {
        self.command_buffer = capacity.max(1);
        self
    }
}

#[async_trait]
impl Agent for WorkerAgent {
    fn id(&self) -> &str {
        &self.shared.id
    }

    fn state(&self) -> AgentState {
        self.shared.state()
    }

    async fn snapshot(&self) -> AgentSnapshot {
        self.shared.stats.read().await.clone()
    }

    async fn attach_event_sink(&self, events: Arc<dyn EventSink>) {
        *self.shared.events.write().await = events;
    }

    async fn start(&self) -> Result<()> {
        let ready_rx = {
            let mut lifecycle = self.lifecycle.lock().await;
            let Some(executor) = lifecycle.executor.take() else {
                return Err(self.shared.invalid_state("start"));
            };

            let (cmd_tx, cmd_rx) = mpsc::channel(self.command_buffer);
            let (ready_tx, ready_rx) = oneshot::channel();
            let shared = self.shared.clone();
            lifecycle.worker = Some(tokio::spawn(run_worker(shared, executor, cmd_rx, ready_tx)));
            *self.commands.lock().await = Some(cmd_tx);
            ready_rx
        };

        // The worker owns the transition to Running; if this future is dropped
        // (start timeout) the worker still finishes starting on its own.
        match ready_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(SchedulerError::StartFailed {
                agent: self.shared.id.clone(),
                reason,
            }),
            Err(_) => Err(SchedulerError::StartFailed {
                agent: self.shared.id.clone(),
                reason: "worker exited before becoming ready".to_string(),
            }),
        }
    }

    async fn perform_task(&self) -> Result<TaskOutput> {
        if !self.state().can_work() {
            return Err(self.shared.invalid_state("perform_task"));
        }

        let cmd_tx = self
            .commands
            .lock()
            .await
            .clone()
            .ok_or_else(|| self.shared.invalid_state("perform_task"))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        cmd_tx
            .send(AgentCommand::PerformTask { reply: reply_tx })
            .await
            .map_err(|_| self.shared.invalid_state("perform_task"))?;

        // Dropped reply means the worker exited before running the task
        reply_rx
            .await
            .map_err(|_| self.shared.invalid_state("perform_task"))?
    }

    async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;

        if lifecycle.executor.take().is_some() {
            // Never started: release the context without spawning anything
            self.shared
                .transition(AgentState::Stopped, Some("stopped before start".to_string()))
                .await;
            return Ok(());
        }

        if let Some(cmd_tx) = self.commands.lock().await.take() {
            // Closed channel means the worker already exited (faulted)
            let _ = cmd_tx.send(AgentCommand::Stop).await;
        }

        if let Some(worker) = lifecycle.worker.as_mut() {
            let joined = worker.await;
            lifecycle.worker = None;
            if let Err(e) = joined {
                self.shared
                    .transition(AgentState::Faulted, Some(format!("worker task failed: {}", e)))
                    .await;
            }
        }

        Ok(())
    }
}

/// Worker task body: start the executor, then serve commands until stopped
async fn run_worker(
    shared: Arc<AgentShared>,
    mut executor: Box<dyn TaskExecutor>,
    mut commands: mpsc::Receiver<AgentCommand>,
    ready: oneshot::Sender<std::result::Result<(), String>>,
) {
    let started = AssertUnwindSafe(executor.on_start(&shared.id))
        .catch_unwind()
        .await;
    let startup_error = match started {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("{:#}", e)),
        Err(panic) => Some(format!("start panicked: {}", panic_message(&panic))),
    };
    if let Some(reason) = startup_error {
        shared
            .transition(AgentState::Faulted, Some(reason.clone()))
            .await;
        let _ = ready.send(Err(reason));
        return;
    }

    shared.transition(AgentState::Running, None).await;
    let _ = ready.send(Ok(()));

    let mut sequence: u64 = 0;
    let stop_reason = loop {
        let cmd = match commands.recv().await {
            Some(cmd) => cmd,
            None => break "command channel closed",
        };
        debug!(agent = %shared.id, command = cmd.name(), "agent received command");

        match cmd {
            AgentCommand::PerformTask { reply } => {
                // The dispatcher gave up on this task before it began
                if reply.is_closed() {
                    debug!(agent = %shared.id, "discarding task nobody is waiting for");
                    shared.record_discarded().await;
                    continue;
                }

                sequence += 1;
                let ctx = TaskContext::new(&shared.id, sequence);
                let started = Instant::now();
                let outcome = AssertUnwindSafe(executor.execute(&ctx))
                    .catch_unwind()
                    .await;
                let duration_ms = started.elapsed().as_millis() as u64;

                match outcome {
                    Ok(Ok(payload)) => {
                        shared.record_task(None).await;
                        let _ = reply.send(Ok(TaskOutput::new(&ctx, payload, duration_ms)));
                    }
                    Ok(Err(e)) => {
                        shared.record_task(Some(format!("{:#}", e))).await;
                        let _ = reply.send(Err(SchedulerError::TaskExecution {
                            agent: shared.id.clone(),
                            source: e,
                        }));
                    }
                    Err(panic) => {
                        let reason = format!("task panicked: {}", panic_message(&panic));
                        shared.record_task(Some(reason.clone())).await;
                        shared
                            .transition(AgentState::Faulted, Some(reason.clone()))
                            .await;
                        let _ = reply.send(Err(SchedulerError::TaskExecution {
                            agent: shared.id.clone(),
                            source: anyhow::anyhow!(reason),
                        }));
                        // Executor state is unknown after a panic; queued work is dropped
                        return;
                    }
                }
            }
            AgentCommand::Stop => break "stop requested",
        }
    };

    match AssertUnwindSafe(executor.on_stop(&shared.id))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(agent = %shared.id, error = %e, "executor stop hook failed"),
        Err(panic) => warn!(
            agent = %shared.id,
            panic = %panic_message(&panic),
            "executor stop hook panicked"
        ),
    }
    drop(executor);

    shared
        .transition(AgentState::Stopped, Some(stop_reason.to_string()))
        .await;
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
