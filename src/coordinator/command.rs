//! Agent Commands: messages from an agent handle to its worker task

use tokio::sync::oneshot;

use crate::agents::TaskOutput;
use crate::error::Result;

/// Commands delivered over an agent's command channel
#[derive(Debug)]
pub enum AgentCommand {
    /// Run one task and reply with its result.
    /// If the reply receiver is gone (round timed out) the result is discarded.
    PerformTask {
        reply: oneshot::Sender<Result<TaskOutput>>,
    },
    /// Graceful stop after the current task finishes
    Stop,
}

impl AgentCommand {
    pub fn name(&self) -> &'static str {
        match self {
            AgentCommand::PerformTask { .. } => "perform_task",
            AgentCommand::Stop => "stop",
        }
    }
}
