//! Agents: independently running units of work
//!
//! Each agent implements `Agent` and hosts its own execution context.
//! `WorkerAgent` runs a `TaskExecutor` on a dedicated tokio task and is driven
//! by commands from the scheduler.

pub mod context;
pub mod market;
pub mod traits;
pub mod worker;

pub use context::{TaskContext, TaskOutput};
pub use market::{
    MarketApi, MarketData, MarketTask, Prediction, PredictionModel, SimulatedMarketApi,
    TradeAction, TradeDecision, Trend,
};
pub use traits::{Agent, TaskExecutor};
pub use worker::WorkerAgent;
