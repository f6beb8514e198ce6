use crate::models::Direction;
use alloy_primitives::Address;
use serde::Serialize;

/// Thresholds for the derived signals.
#[derive(Debug, Clone)]
pub struct SignalConfig {
    /// `|delta_vs_ma|` above this percentage flags a record as anomalous.
    pub anomaly_threshold_pct: f64,
    /// `|spread_pct|` above this percentage raises a cross-pool alert.
    pub spread_alert_pct: f64,
    /// Latest prices older than this are not used for spreads.
    pub latest_max_age_secs: i64,
    /// Two records of different pools count as simultaneous within this window.
    pub match_window_secs: i64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold_pct: 50.0,
            spread_alert_pct: 0.5,
            latest_max_age_secs: 600,
            match_window_secs: 60,
        }
    }
}

/// The two pools compared for cross-pool signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolPair {
    pub pool_a: Address,
    pub pool_b: Address,
}

/// Which way an arbitrage between the pair would run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadLeg {
    /// Pool B is cheaper: buy on B, sell on A.
    BuyBSellA,
    /// Pool A is cheaper: buy on A, sell on B.
    BuyASellB,
}

/// Latest-price comparison between the two monitored pools.
#[derive(Debug, Clone, Serialize)]
pub struct CrossPoolSpread {
    pub direction: Direction,
    pub price_a: f64,
    pub price_b: f64,
    /// `price_a - price_b`
    pub difference: f64,
    /// `(price_a - price_b) / price_b * 100`
    pub spread_pct: f64,
    pub alert: Option<SpreadLeg>,
}
