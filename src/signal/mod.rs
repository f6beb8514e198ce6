pub mod evaluator;
pub mod types;

pub use evaluator::{
    apply_cross_pool_deltas, cross_pool_spread, delta_vs_moving_average, is_anomaly,
    percent_change, symmetric_price_delta,
};
pub use types::{CrossPoolSpread, PoolPair, SignalConfig, SpreadLeg};
