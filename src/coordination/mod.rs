//! Coordination Layer
//!
//! Shared infrastructure used by agents and the scheduler:
//! - Agent lifecycle states and diagnostic events
//! - Shutdown signalling for long-running dispatch loops

pub mod lifecycle;
pub mod shutdown;

pub use lifecycle::{AgentState, BroadcastSink, EventSink, LifecycleEvent, TracingSink};
pub use shutdown::{install_signal_handlers, ShutdownController, ShutdownSignal, ShutdownToken};
