//! Scheduler
//!
//! Owns the registered agents, drives them through their lifecycle in batches
//! and reports one outcome per agent for every batch.

pub mod command;
pub mod config;
pub mod report;
pub mod scheduler;
pub mod state;

pub use command::AgentCommand;
pub use config::SchedulerConfig;
pub use report::{
    AgentOutcome, AgentReport, BatchOperation, BatchReport, BatchStatus, BatchSummary,
    OutcomeSummary,
};
pub use scheduler::Scheduler;
pub use state::{AgentSnapshot, SchedulerState};
