pub mod agents;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod coordinator;
pub mod error;

pub use agents::{
    Agent, MarketApi, MarketTask, SimulatedMarketApi, TaskContext, TaskExecutor, TaskOutput,
    WorkerAgent,
};
pub use config::{AppConfig, DemoConfig, LoggingConfig};
pub use coordination::{
    AgentState, BroadcastSink, EventSink, LifecycleEvent, ShutdownController, ShutdownSignal,
    ShutdownToken, TracingSink,
};
pub use coordinator::{
    AgentOutcome, AgentReport, AgentSnapshot, BatchOperation, BatchReport, BatchStatus,
    BatchSummary, Scheduler, SchedulerConfig, SchedulerState,
};
pub use error::{Result, SchedulerError};
