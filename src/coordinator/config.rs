//! Scheduler Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound for one agent's `start()` inside `start_all` (ms)
    pub start_timeout_ms: u64,
    /// Upper bound for one agent's `stop()` inside `stop_all` / `unregister_agent` (ms)
    pub stop_timeout_ms: u64,
    /// Default deadline for a dispatch round (ms)
    pub dispatch_timeout_ms: u64,
    /// Capacity of each agent's command channel
    pub command_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: 5_000,
            stop_timeout_ms: 5_000,
            dispatch_timeout_ms: 30_000,
            command_buffer: 32,
        }
    }
}

impl SchedulerConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    /// Command channels need at least one slot
    pub fn command_buffer(&self) -> usize {
        self.command_buffer.max(1)
    }
}
