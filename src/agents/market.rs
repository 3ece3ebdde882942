//! Market agent: fetch data, predict a trend, act on it
//!
//! The agent's api is the [`MarketApi`] capability. The scheduler never sees it;
//! [`MarketTask`] owns it and drives one fetch → predict → act cycle per task.
//! [`SimulatedMarketApi`] stands in for real data and execution venues.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::context::TaskContext;
use super::traits::TaskExecutor;

/// Market observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub market: String,
    pub price: Decimal,
    pub previous_price: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl MarketData {
    /// Percentage move since the previous observation
    pub fn change_pct(&self) -> Decimal {
        if self.previous_price.is_zero() {
            return Decimal::ZERO;
        }
        (self.price - self.previous_price) / self.previous_price * dec!(100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionModel {
    SimpleMovingAverage,
    TrendFollowing,
    MeanReversion,
}

impl PredictionModel {
    pub const ALL: [PredictionModel; 3] = [
        PredictionModel::SimpleMovingAverage,
        PredictionModel::TrendFollowing,
        PredictionModel::MeanReversion,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl Trend {
    /// Classify a percentage move; ±1.5% is the neutral band
    pub fn from_change_pct(change_pct: Decimal) -> Self {
        if change_pct > dec!(1.5) {
            Trend::Bullish
        } else if change_pct < dec!(-1.5) {
            Trend::Bearish
        } else {
            Trend::Neutral
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub model: PredictionModel,
    pub trend: Trend,
    /// 0.70 – 0.90 for the simulated predictor
    pub confidence: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

/// Decision the agent took in one task; becomes the task payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub market: String,
    pub action: TradeAction,
    pub price: Decimal,
    pub trend: Trend,
    pub confidence: Decimal,
    pub simulated: bool,
}

/// Capability an agent uses to observe the market and act on it
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketApi: Send {
    async fn fetch_market_data(&mut self, market: &str) -> anyhow::Result<MarketData>;

    async fn predict_trend(&mut self, data: &MarketData) -> anyhow::Result<Prediction>;

    async fn execute_decision(
        &mut self,
        data: &MarketData,
        prediction: &Prediction,
    ) -> anyhow::Result<TradeDecision>;
}

/// Random-walk market with a mocked predictor. No network.
pub struct SimulatedMarketApi {
    rng: StdRng,
    price: Decimal,
    /// Largest per-observation move in basis points
    max_move_bps: i64,
    min_confidence: Decimal,
    outage: bool,
}

impl SimulatedMarketApi {
    pub fn new(base_price: Decimal) -> Self {
        Self::with_rng(base_price, StdRng::from_entropy())
    }

    /// Deterministic price walk
    pub fn seeded(base_price: Decimal, seed: u64) -> Self {
        Self::with_rng(base_price, StdRng::seed_from_u64(seed))
    }

    fn with_rng(base_price: Decimal, rng: StdRng) -> Self {
        Self {
            rng,
            price: base_price,
            max_move_bps: 300,
            min_confidence: dec!(0.75),
            outage: false,
        }
    }

    /// Make every data fetch fail (fault injection for demos)
    pub fn with_outage(mut self, outage: bool) -> Self {
        self.outage = outage;
        self
    }
}

#[async_trait]
impl MarketApi for SimulatedMarketApi {
    async fn fetch_market_data(&mut self, market: &str) -> anyhow::Result<MarketData> {
        if self.outage {
            anyhow::bail!("market data unavailable for {}", market);
        }

        let previous_price = self.price;
        let bps = self.rng.gen_range(-self.max_move_bps..=self.max_move_bps);
        self.price = (previous_price * (Decimal::ONE + Decimal::new(bps, 4))).round_dp(2);

        Ok(MarketData {
            market: market.to_string(),
            price: self.price,
            previous_price,
            observed_at: Utc::now(),
        })
    }

    async fn predict_trend(&mut self, data: &MarketData) -> anyhow::Result<Prediction> {
        let idx = self.rng.gen_range(0..PredictionModel::ALL.len());
        let confidence = Decimal::new(self.rng.gen_range(70..=90), 2);

        Ok(Prediction {
            model: PredictionModel::ALL[idx],
            trend: Trend::from_change_pct(data.change_pct()),
            confidence,
        })
    }

    async fn execute_decision(
        &mut self,
        data: &MarketData,
        prediction: &Prediction,
    ) -> anyhow::Result<TradeDecision> {
        let action = decide(prediction, self.min_confidence);
        Ok(TradeDecision {
            market: data.market.clone(),
            action,
            price: data.price,
            trend: prediction.trend,
            confidence: prediction.confidence,
            simulated: true,
        })
    }
}

/// Trade only on a directional trend with enough confidence
pub fn decide(prediction: &Prediction, min_confidence: Decimal) -> TradeAction {
    if prediction.confidence < min_confidence {
        return TradeAction::Hold;
    }
    match prediction.trend {
        Trend::Bullish => TradeAction::Buy,
        Trend::Bearish => TradeAction::Sell,
        Trend::Neutral => TradeAction::Hold,
    }
}

/// Task executor running one fetch → predict → act cycle per task
pub struct MarketTask<A: MarketApi> {
    api: A,
    market: String,
    decisions: u64,
}

impl<A: MarketApi + 'static> MarketTask<A> {
    pub fn new(api: A, market: impl Into<String>) -> Self {
        Self {
            api,
            market: market.into(),
            decisions: 0,
        }
    }

    /// Decisions taken so far
    pub fn decisions(&self) -> u64 {
        self.decisions
    }
}

#[async_trait]
impl<A: MarketApi + 'static> TaskExecutor for MarketTask<A> {
    async fn on_start(&mut self, agent_id: &str) -> anyhow::Result<()> {
        info!(agent = %agent_id, market = %self.market, "market agent waiting for tasks");
        Ok(())
    }

    async fn execute(&mut self, ctx: &TaskContext) -> anyhow::Result<Option<serde_json::Value>> {
        let data = self.api.fetch_market_data(&self.market).await?;
        let prediction = self.api.predict_trend(&data).await?;
        let decision = self.api.execute_decision(&data, &prediction).await?;
        self.decisions += 1;

        debug!(
            agent = %ctx.agent_id,
            sequence = ctx.sequence,
            market = %decision.market,
            price = %decision.price,
            trend = ?decision.trend,
            action = ?decision.action,
            "market decision taken"
        );

        Ok(Some(serde_json::to_value(&decision)?))
    }

    async fn on_stop(&mut self, agent_id: &str) -> anyhow::Result<()> {
        info!(agent = %agent_id, decisions = self.decisions, "market agent released");
        Ok(())
    }
}
