use super::types::{CrossPoolSpread, PoolPair, SignalConfig, SpreadLeg};
use crate::history::RollingPriceBuffer;
use crate::models::{Direction, EnrichedRecord};
use alloy_primitives::Address;

/// Percentage deviation of `observed` from the series' filtered moving average.
///
/// `None` when the series has no usable average or the average is zero.
pub fn delta_vs_moving_average(
    buffer: &RollingPriceBuffer,
    pool_id: Address,
    direction: Direction,
    observed: f64,
) -> Option<f64> {
    let ma = buffer.moving_average(pool_id, direction)?;
    percent_change(ma, observed)
}

/// `(current - reference) / reference * 100`, undefined for a zero reference.
pub fn percent_change(reference: f64, current: f64) -> Option<f64> {
    if reference == 0.0 || !reference.is_finite() || !current.is_finite() {
        return None;
    }
    Some((current - reference) / reference * 100.0)
}

pub fn is_anomaly(delta_vs_ma: Option<f64>, config: &SignalConfig) -> bool {
    delta_vs_ma.is_some_and(|d| d.abs() > config.anomaly_threshold_pct)
}

/// Compare the latest sane, fresh prices of both pools for one direction.
pub fn cross_pool_spread(
    buffer: &RollingPriceBuffer,
    pair: PoolPair,
    direction: Direction,
    now: i64,
    config: &SignalConfig,
) -> Option<CrossPoolSpread> {
    let max_age = config.latest_max_age_secs;
    let price_a = buffer.latest_price_within(pair.pool_a, direction, now, max_age)?;
    let price_b = buffer.latest_price_within(pair.pool_b, direction, now, max_age)?;
    let spread_pct = percent_change(price_b, price_a)?;

    let alert = if spread_pct.abs() > config.spread_alert_pct {
        if spread_pct > 0.0 {
            Some(SpreadLeg::BuyBSellA)
        } else {
            Some(SpreadLeg::BuyASellB)
        }
    } else {
        None
    };

    Some(CrossPoolSpread {
        direction,
        price_a,
        price_b,
        difference: price_a - price_b,
        spread_pct,
        alert,
    })
}

/// Symmetric percentage gap between two prices, relative to the smaller one.
pub fn symmetric_price_delta(price_a: f64, price_b: f64) -> Option<f64> {
    if price_a <= 0.0 || price_b <= 0.0 || !price_a.is_finite() || !price_b.is_finite() {
        return None;
    }
    Some((price_a - price_b).abs() / price_a.min(price_b) * 100.0)
}

/// Fill `delta_vs_other_pool` for records of the pair that happened together.
///
/// Records match when they share a direction and either the same block or a
/// timestamp gap below the match window. Pool A's record gets `+d`, pool B's
/// `-d`. Later matches overwrite earlier ones.
pub fn apply_cross_pool_deltas(records: &mut [EnrichedRecord], pair: PoolPair, config: &SignalConfig) {
    let window = config.match_window_secs.max(0).unsigned_abs();
    let a_idx: Vec<usize> = (0..records.len())
        .filter(|&i| records[i].swap.pool_id == pair.pool_a)
        .collect();
    let b_idx: Vec<usize> = (0..records.len())
        .filter(|&i| records[i].swap.pool_id == pair.pool_b)
        .collect();

    for &i in &a_idx {
        for &j in &b_idx {
            let (a, b) = (&records[i], &records[j]);
            if a.direction != b.direction {
                continue;
            }
            let same_block = matches!(
                (a.swap.block_number, b.swap.block_number),
                (Some(x), Some(y)) if x == y
            );
            let close_in_time = a.swap.timestamp.abs_diff(b.swap.timestamp) < window;
            if !(same_block || close_in_time) {
                continue;
            }
            if let Some(delta) = symmetric_price_delta(a.price, b.price) {
                records[i].delta_vs_other_pool = Some(delta);
                records[j].delta_vs_other_pool = Some(-delta);
            }
        }
    }
}
