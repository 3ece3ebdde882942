use async_trait::async_trait;
use liquid_agents::agents::{Agent, TaskContext, TaskExecutor, TaskOutput, WorkerAgent};
use liquid_agents::coordination::{AgentState, BroadcastSink, LifecycleEvent};
use liquid_agents::coordinator::{
    AgentOutcome, AgentSnapshot, BatchOperation, BatchStatus, Scheduler, SchedulerConfig,
    SchedulerState,
};
use liquid_agents::error::{Result, SchedulerError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

struct Echo;

#[async_trait]
impl TaskExecutor for Echo {
    async fn execute(&mut self, ctx: &TaskContext) -> anyhow::Result<Option<serde_json::Value>> {
        Ok(Some(serde_json::json!({ "agent": ctx.agent_id, "sequence": ctx.sequence })))
    }
}

struct Broken;

#[async_trait]
impl TaskExecutor for Broken {
    async fn execute(&mut self, _ctx: &TaskContext) -> anyhow::Result<Option<serde_json::Value>> {
        anyhow::bail!("market feed unavailable")
    }
}

struct Slow(Duration);

#[async_trait]
impl TaskExecutor for Slow {
    async fn execute(&mut self, _ctx: &TaskContext) -> anyhow::Result<Option<serde_json::Value>> {
        tokio::time::sleep(self.0).await;
        Ok(Some(serde_json::json!("late")))
    }
}

struct Panics;

#[async_trait]
impl TaskExecutor for Panics {
    async fn execute(&mut self, _ctx: &TaskContext) -> anyhow::Result<Option<serde_json::Value>> {
        panic!("model weights corrupted")
    }
}

/// Agent that records the order in which the scheduler issues operations
struct Recording {
    id: String,
    log: Arc<Mutex<Vec<String>>>,
    state: Mutex<AgentState>,
}

impl Recording {
    fn new(id: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            id: id.to_string(),
            log: Arc::clone(log),
            state: Mutex::new(AgentState::Created),
        }
    }

    fn record(&self, op: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", op, self.id));
    }

    fn set(&self, state: AgentState) {
        *self.state.lock().unwrap() = state;
    }
}

#[async_trait]
impl Agent for Recording {
    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> AgentState {
        *self.state.lock().unwrap()
    }

    async fn snapshot(&self) -> AgentSnapshot {
        let mut snapshot = AgentSnapshot::new(&self.id);
        snapshot.state = self.state();
        snapshot
    }

    async fn start(&self) -> Result<()> {
        self.record("start");
        self.set(AgentState::Running);
        Ok(())
    }

    async fn perform_task(&self) -> Result<TaskOutput> {
        self.record("task");
        tokio::task::yield_now().await;
        Ok(TaskOutput::new(&TaskContext::new(&self.id, 1), None, 0))
    }

    async fn stop(&self) -> Result<()> {
        self.record("stop");
        self.set(AgentState::Stopped);
        Ok(())
    }
}

async fn scheduler_with(agents: Vec<WorkerAgent>) -> Scheduler {
    let scheduler = Scheduler::with_defaults();
    for agent in agents {
        assert_ok!(scheduler.register_agent(agent).await);
    }
    scheduler
}

/// Every batch report has exactly one entry per registered agent.
#[tokio::test]
async fn reports_cover_every_registered_agent() {
    let scheduler = scheduler_with(vec![
        WorkerAgent::new("A", Echo),
        WorkerAgent::new("B", Broken),
        WorkerAgent::new("C", Echo),
    ])
    .await;

    for report in [
        scheduler.start_all().await,
        scheduler.dispatch_tasks().await,
        scheduler.stop_all().await,
    ] {
        assert_eq!(report.len(), 3);
        assert_eq!(report.agents(), vec!["A", "B", "C"]);
    }
}

/// A failing agent does not prevent the others from being attempted.
#[tokio::test]
async fn failing_agent_is_isolated() {
    let scheduler = scheduler_with(vec![
        WorkerAgent::new("A", Echo),
        WorkerAgent::new("B", Broken),
        WorkerAgent::new("C", Echo),
    ])
    .await;
    assert_eq!(scheduler.start_all().await.status(), BatchStatus::AllSucceeded);

    let report = scheduler.dispatch_tasks().await;
    assert_eq!(report.status(), BatchStatus::PartiallySucceeded);
    assert!(report.get("A").unwrap().is_success());
    assert!(report.get("C").unwrap().is_success());

    let err = report.get("B").unwrap().error().unwrap();
    assert!(err.is_task_execution());
    assert!(err.to_string().contains("market feed unavailable"));

    // failure stays local to the agent; B keeps its state
    assert_eq!(scheduler.agent_state("B").await, Some(AgentState::Running));
    scheduler.stop_all().await;
}

#[tokio::test]
async fn failing_agent_is_retried_next_round() {
    let scheduler = scheduler_with(vec![
        WorkerAgent::new("A1", Echo),
        WorkerAgent::new("A2", Broken),
    ])
    .await;
    scheduler.start_all().await;

    for round in 1..=2 {
        let report = scheduler.dispatch_tasks().await;
        assert_eq!(report.round, Some(round));
        assert!(report.get("A1").unwrap().is_success());
        assert!(report.get("A2").unwrap().is_failure());
        assert_eq!(report.failures().len(), 1);
    }

    let a2 = scheduler.agent_snapshot("A2").await.unwrap();
    assert_eq!(a2.tasks_failed, 2);
    assert_eq!(a2.state, AgentState::Running);

    let a1 = scheduler.agent_snapshot("A1").await.unwrap();
    assert_eq!(a1.tasks_completed, 2);

    let report = scheduler.stop_all().await;
    assert_eq!(report.status(), BatchStatus::AllSucceeded);
}

#[tokio::test]
async fn start_then_stop_leaves_all_stopped() {
    let scheduler = scheduler_with(vec![
        WorkerAgent::new("A1", Echo),
        WorkerAgent::new("A2", Echo),
    ])
    .await;

    scheduler.start_all().await;
    assert!(scheduler
        .agent_states()
        .await
        .iter()
        .all(|(_, s)| *s == AgentState::Running));
    assert_eq!(scheduler.state().await, SchedulerState::Running);

    let report = scheduler.stop_all().await;
    assert!(report.entries.iter().all(|e| matches!(e.outcome, AgentOutcome::Stopped)));
    assert!(scheduler
        .agent_states()
        .await
        .iter()
        .all(|(_, s)| *s == AgentState::Stopped));

    // stopping again is a no-op that still succeeds
    assert_eq!(scheduler.stop_all().await.status(), BatchStatus::AllSucceeded);
}

#[tokio::test]
async fn dispatch_before_start_fails_per_agent() {
    let scheduler = scheduler_with(vec![WorkerAgent::new("A1", Echo)]).await;

    let report = scheduler.dispatch_tasks().await;
    assert_eq!(report.status(), BatchStatus::NoneSucceeded);
    assert!(report.get("A1").unwrap().error().unwrap().is_invalid_state());
    assert_eq!(scheduler.agent_state("A1").await, Some(AgentState::Created));
}

#[tokio::test]
async fn double_start_is_reported_as_invalid_state() {
    let scheduler = scheduler_with(vec![WorkerAgent::new("A1", Echo)]).await;
    scheduler.start_all().await;

    let report = scheduler.start_all().await;
    assert!(report.get("A1").unwrap().error().unwrap().is_invalid_state());
    assert_eq!(scheduler.agent_state("A1").await, Some(AgentState::Running));
    scheduler.stop_all().await;
}

#[tokio::test]
async fn zero_timeout_times_out_without_aborting() {
    let scheduler = scheduler_with(vec![
        WorkerAgent::new("A1", Slow(Duration::from_millis(50))),
        WorkerAgent::new("A2", Slow(Duration::from_millis(50))),
    ])
    .await;
    scheduler.start_all().await;

    let report = scheduler.dispatch_tasks_with_timeout(Duration::ZERO).await;
    assert_eq!(report.len(), 2);
    assert_eq!(report.timed_out(), 2);
    assert_eq!(report.status(), BatchStatus::NoneSucceeded);

    // each task either ran to completion or was skipped before it began
    let stop = scheduler.stop_all().await;
    assert_eq!(stop.status(), BatchStatus::AllSucceeded);
    for snapshot in scheduler.agent_snapshots().await {
        assert_eq!(snapshot.tasks_completed + snapshot.tasks_discarded, 1);
        assert_eq!(snapshot.tasks_failed, 0);
        assert_eq!(snapshot.state, AgentState::Stopped);
    }
}

#[tokio::test]
async fn timed_out_task_already_running_completes() {
    let scheduler =
        scheduler_with(vec![WorkerAgent::new("A1", Slow(Duration::from_millis(100)))]).await;
    scheduler.start_all().await;

    let report = scheduler
        .dispatch_tasks_with_timeout(Duration::from_millis(20))
        .await;
    assert!(report.get("A1").unwrap().is_timed_out());

    // the scheduler stopped waiting but the agent finished the work
    scheduler.stop_all().await;
    let snapshot = scheduler.agent_snapshot("A1").await.unwrap();
    assert_eq!(snapshot.tasks_completed, 1);
    assert_eq!(snapshot.tasks_discarded, 0);
}

#[tokio::test]
async fn timed_out_rounds_do_not_pile_up() {
    let scheduler =
        scheduler_with(vec![WorkerAgent::new("A1", Slow(Duration::from_millis(100)))]).await;
    scheduler.start_all().await;

    for _ in 0..5 {
        let report = scheduler
            .dispatch_tasks_with_timeout(Duration::from_millis(1))
            .await;
        assert!(report.get("A1").unwrap().is_timed_out());
    }

    // only the task in progress delays this round, not the four abandoned behind it
    let report = scheduler
        .dispatch_tasks_with_timeout(Duration::from_secs(2))
        .await;
    assert!(report.get("A1").unwrap().is_success());
    assert!(report.duration_ms < 350, "round took {}ms", report.duration_ms);

    scheduler.stop_all().await;
    let snapshot = scheduler.agent_snapshot("A1").await.unwrap();
    assert_eq!(snapshot.tasks_completed + snapshot.tasks_discarded, 6);
    assert!(snapshot.tasks_completed <= 2);
    assert!(snapshot.tasks_discarded >= 4);
}

struct BrokenStart;

#[async_trait]
impl TaskExecutor for BrokenStart {
    async fn on_start(&mut self, _agent_id: &str) -> anyhow::Result<()> {
        anyhow::bail!("wallet locked")
    }

    async fn execute(&mut self, _ctx: &TaskContext) -> anyhow::Result<Option<serde_json::Value>> {
        Ok(None)
    }
}

struct HungStart;

#[async_trait]
impl TaskExecutor for HungStart {
    async fn on_start(&mut self, _agent_id: &str) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }

    async fn execute(&mut self, _ctx: &TaskContext) -> anyhow::Result<Option<serde_json::Value>> {
        Ok(None)
    }
}

/// Start and stop failures or timeouts stay with the agent that caused them.
#[tokio::test]
async fn start_and_stop_failures_are_isolated() {
    let scheduler = Scheduler::new(SchedulerConfig {
        start_timeout_ms: 50,
        stop_timeout_ms: 50,
        ..Default::default()
    });
    for agent in [
        WorkerAgent::new("ok", Echo),
        WorkerAgent::new("broken", BrokenStart),
        WorkerAgent::new("hung", HungStart),
        WorkerAgent::new("ok2", Echo),
    ] {
        assert_ok!(scheduler.register_agent(agent).await);
    }

    let start = scheduler.start_all().await;
    assert_eq!(start.len(), 4);
    assert_eq!(start.status(), BatchStatus::PartiallySucceeded);
    assert!(start.get("ok").unwrap().is_success());
    assert!(start.get("ok2").unwrap().is_success());
    assert!(matches!(
        start.get("broken").unwrap().error(),
        Some(SchedulerError::StartFailed { reason, .. }) if reason.contains("wallet locked")
    ));
    assert!(start.get("hung").unwrap().is_timed_out());
    assert_eq!(scheduler.agent_state("broken").await, Some(AgentState::Faulted));
    assert_eq!(scheduler.agent_state("hung").await, Some(AgentState::Created));

    let round = scheduler.dispatch_tasks().await;
    assert!(round.get("ok").unwrap().is_success());
    assert!(round.get("ok2").unwrap().is_success());
    assert!(round.get("broken").unwrap().error().unwrap().is_invalid_state());
    assert!(round.get("hung").unwrap().error().unwrap().is_invalid_state());

    let stop = scheduler.stop_all().await;
    assert_eq!(stop.len(), 4);
    assert!(stop.get("hung").unwrap().is_timed_out());
    for agent in ["ok", "broken", "ok2"] {
        assert!(matches!(stop.get(agent).unwrap(), AgentOutcome::Stopped));
    }
    assert_eq!(scheduler.agent_state("ok").await, Some(AgentState::Stopped));
    assert_eq!(scheduler.agent_state("broken").await, Some(AgentState::Faulted));
}

#[tokio::test]
async fn slow_agent_does_not_hold_back_fast_ones() {
    let scheduler = scheduler_with(vec![
        WorkerAgent::new("fast", Echo),
        WorkerAgent::new("slow", Slow(Duration::from_secs(5))),
    ])
    .await;
    scheduler.start_all().await;

    let report = scheduler
        .dispatch_tasks_with_timeout(Duration::from_millis(100))
        .await;
    assert!(report.get("fast").unwrap().is_success());
    assert!(report.get("slow").unwrap().is_timed_out());
    assert!(report.duration_ms < 5_000);
}

#[tokio::test]
async fn panicking_agent_faults_alone() {
    let scheduler = scheduler_with(vec![
        WorkerAgent::new("A1", Echo),
        WorkerAgent::new("A2", Panics),
    ])
    .await;
    scheduler.start_all().await;

    let report = scheduler.dispatch_tasks().await;
    assert!(report.get("A1").unwrap().is_success());
    assert!(report.get("A2").unwrap().is_failure());
    assert_eq!(scheduler.agent_state("A2").await, Some(AgentState::Faulted));

    // a faulted agent is still attempted and reported, never silently skipped
    let report = scheduler.dispatch_tasks().await;
    assert_eq!(report.len(), 2);
    assert!(report.get("A2").unwrap().error().unwrap().is_invalid_state());

    // stopping a faulted agent succeeds and leaves it faulted
    let stop = scheduler.stop_all().await;
    assert!(stop.get("A2").unwrap().is_success());
    assert_eq!(scheduler.agent_state("A2").await, Some(AgentState::Faulted));
}

#[tokio::test]
async fn operations_issued_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let scheduler = Scheduler::with_defaults();
    for id in ["c", "a", "b"] {
        assert_ok!(scheduler.register_agent(Recording::new(id, &log)).await);
    }

    scheduler.start_all().await;
    scheduler.dispatch_tasks().await;
    scheduler.stop_all().await;

    let log = log.lock().unwrap().clone();
    assert_eq!(
        log,
        vec![
            "start:c", "start:a", "start:b", "task:c", "task:a", "task:b", "stop:c", "stop:a",
            "stop:b",
        ]
    );
}

#[tokio::test]
async fn duplicate_identity_rejected() {
    let scheduler = scheduler_with(vec![WorkerAgent::new("A1", Echo)]).await;

    let err = assert_err!(scheduler.register_agent(WorkerAgent::new("A1", Broken)).await);
    assert!(matches!(err, SchedulerError::DuplicateAgent(_)));
    assert_eq!(scheduler.agent_count().await, 1);

    // the first registration is the one that stays
    scheduler.start_all().await;
    assert!(scheduler.dispatch_tasks().await.get("A1").unwrap().is_success());
    scheduler.stop_all().await;
}

#[tokio::test]
async fn registration_mid_round_waits_for_next_round() {
    let scheduler = Arc::new(
        scheduler_with(vec![WorkerAgent::new("A1", Slow(Duration::from_millis(100)))]).await,
    );
    scheduler.start_all().await;

    let round = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.dispatch_tasks().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_ok!(scheduler.register_agent(WorkerAgent::new("A2", Echo)).await);

    let report = round.await.unwrap();
    assert_eq!(report.agents(), vec!["A1"]);

    let outcome = assert_ok!(scheduler.start_agent("A2").await);
    assert!(matches!(outcome, AgentOutcome::Started));
    let report = scheduler.dispatch_tasks().await;
    assert_eq!(report.agents(), vec!["A1", "A2"]);
    assert_eq!(report.status(), BatchStatus::AllSucceeded);
    scheduler.stop_all().await;
}

#[tokio::test]
async fn start_agent_targets_one_agent() {
    let scheduler = scheduler_with(vec![
        WorkerAgent::new("A1", Echo),
        WorkerAgent::new("A2", Echo),
    ])
    .await;

    let outcome = assert_ok!(scheduler.start_agent("A2").await);
    assert!(matches!(outcome, AgentOutcome::Started));
    assert_eq!(scheduler.state().await, SchedulerState::Running);
    assert_eq!(scheduler.agent_state("A1").await, Some(AgentState::Created));
    assert_eq!(scheduler.agent_state("A2").await, Some(AgentState::Running));

    // already running: reported, not raised
    let again = assert_ok!(scheduler.start_agent("A2").await);
    assert!(again.error().unwrap().is_invalid_state());

    let err = assert_err!(scheduler.start_agent("missing").await);
    assert!(matches!(err, SchedulerError::AgentNotFound(_)));

    scheduler.shutdown().await;
    let err = assert_err!(scheduler.start_agent("A1").await);
    assert!(matches!(err, SchedulerError::SchedulerShutDown));
}

#[tokio::test]
async fn unregister_stops_and_removes_agent() {
    let scheduler = scheduler_with(vec![
        WorkerAgent::new("A1", Echo),
        WorkerAgent::new("A2", Echo),
    ])
    .await;
    scheduler.start_all().await;

    let outcome = assert_ok!(scheduler.unregister_agent("A1").await);
    assert!(matches!(outcome, AgentOutcome::Stopped));
    assert_eq!(scheduler.agent_ids().await, vec!["A2"]);
    assert!(scheduler.agent_state("A1").await.is_none());

    // the freed identity can be registered again
    assert_ok!(scheduler.register_agent(WorkerAgent::new("A1", Echo)).await);
    assert_eq!(scheduler.agent_ids().await, vec!["A2", "A1"]);

    let err = assert_err!(scheduler.unregister_agent("missing").await);
    assert!(matches!(err, SchedulerError::AgentNotFound(_)));
    scheduler.stop_all().await;
}

#[tokio::test]
async fn shutdown_releases_agents_and_rejects_registration() {
    let scheduler = scheduler_with(vec![
        WorkerAgent::new("A1", Echo),
        WorkerAgent::new("A2", Echo),
    ])
    .await;
    scheduler.start_all().await;

    let report = scheduler.shutdown().await;
    assert_eq!(report.operation, BatchOperation::Shutdown);
    assert_eq!(report.status(), BatchStatus::AllSucceeded);
    assert_eq!(scheduler.state().await, SchedulerState::ShutDown);
    assert_eq!(scheduler.agent_count().await, 0);

    let err = assert_err!(scheduler.register_agent(WorkerAgent::new("A3", Echo)).await);
    assert!(matches!(err, SchedulerError::SchedulerShutDown));
    assert!(scheduler.dispatch_tasks().await.is_empty());
    assert!(scheduler.start_all().await.is_empty());
    assert!(scheduler.shutdown().await.is_empty());
}

#[tokio::test]
async fn batch_events_carry_identity_and_outcome() {
    let sink = Arc::new(BroadcastSink::default());
    let mut events = sink.subscribe();
    let scheduler = Scheduler::with_event_sink(SchedulerConfig::default(), sink.clone());

    assert_ok!(
        scheduler
            .register_agent(WorkerAgent::new("A1", Echo).with_event_sink(sink.clone()))
            .await
    );
    assert_ok!(
        scheduler
            .register_agent(WorkerAgent::new("A2", Broken).with_event_sink(sink.clone()))
            .await
    );
    scheduler.start_all().await;
    scheduler.dispatch_tasks().await;

    let mut outcomes = Vec::new();
    let mut batch = None;
    while let Ok(event) = events.try_recv() {
        match event {
            LifecycleEvent::AgentOutcome {
                agent,
                operation,
                round: Some(1),
                outcome,
                ..
            } if operation == "dispatch" => outcomes.push((agent, outcome)),
            LifecycleEvent::BatchCompleted {
                operation,
                total,
                succeeded,
                failed,
                ..
            } if operation == "dispatch" => batch = Some((total, succeeded, failed)),
            _ => {}
        }
    }

    assert_eq!(
        outcomes,
        vec![
            ("A1".to_string(), "success".to_string()),
            ("A2".to_string(), "failed".to_string()),
        ]
    );
    assert_eq!(batch, Some((2, 1, 1)));
    scheduler.stop_all().await;
}

/// Agents registered without their own sink report state changes through the scheduler's.
#[tokio::test]
async fn registration_routes_agent_events_to_scheduler_sink() {
    let sink = Arc::new(BroadcastSink::default());
    let mut events = sink.subscribe();
    let scheduler = Scheduler::with_event_sink(SchedulerConfig::default(), sink.clone());

    assert_ok!(scheduler.register_agent(WorkerAgent::new("A1", Echo)).await);
    assert_ok!(scheduler.register_agent(WorkerAgent::new("A2", Panics)).await);
    scheduler.start_all().await;
    scheduler.dispatch_tasks().await;
    scheduler.stop_all().await;

    let mut transitions = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let LifecycleEvent::StateChanged { agent, from, to, .. } = event {
            transitions.push((agent, from, to));
        }
    }

    let of = |id: &str| -> Vec<(AgentState, AgentState)> {
        transitions
            .iter()
            .filter(|(agent, ..)| agent == id)
            .map(|(_, from, to)| (*from, *to))
            .collect()
    };
    assert_eq!(
        of("A1"),
        vec![
            (AgentState::Created, AgentState::Running),
            (AgentState::Running, AgentState::Stopped),
        ]
    );
    assert_eq!(
        of("A2"),
        vec![
            (AgentState::Created, AgentState::Running),
            (AgentState::Running, AgentState::Faulted),
        ]
    );
}
