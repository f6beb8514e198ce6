//! One ingestion batch: validate, dedupe, insert, enrich.

use crate::config::EngineConfig;
use crate::models::{Direction, EnrichedRecord, PriceObservation, SwapRecord};
use crate::signal::{apply_cross_pool_deltas, delta_vs_moving_average, is_anomaly, percent_change};
use crate::state::EngineState;
use tracing::{debug, warn};

/// Counters and output of a processed batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub received: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub unpriced: usize,
    pub records: Vec<EnrichedRecord>,
    /// Largest record timestamp accepted in this batch.
    pub newest_timestamp: Option<i64>,
}

impl BatchOutcome {
    pub fn anomalies(&self) -> usize {
        self.records.iter().filter(|r| r.anomaly).count()
    }
}

struct Accepted {
    swap: SwapRecord,
    direction: Direction,
    price: f64,
    delta_vs_prev: Option<f64>,
}

/// Run a batch of decoder output through the engine.
///
/// Every record is checked against the dedupe store before it can touch the
/// price history. All survivors are inserted first; signals are then read
/// from the updated windows. Bad records are skipped and logged; they never
/// fail the batch.
pub fn process_batch(
    state: &mut EngineState,
    cfg: &EngineConfig,
    batch: Vec<serde_json::Value>,
) -> BatchOutcome {
    let mut outcome = BatchOutcome {
        received: batch.len(),
        ..BatchOutcome::default()
    };
    let mut accepted = Vec::new();

    for (idx, raw) in batch.into_iter().enumerate() {
        let swap = match SwapRecord::from_value(raw) {
            Ok(swap) => swap,
            Err(e) => {
                warn!(index = idx, error = %e, "[PIPELINE] skipping malformed record");
                outcome.malformed += 1;
                continue;
            }
        };
        let key = swap.dedup_key();
        if state.dedupe.seen(&key) {
            debug!(%key, "[PIPELINE] duplicate skipped");
            outcome.duplicates += 1;
            continue;
        }
        let Some(direction) = swap.direction() else {
            outcome.malformed += 1;
            continue;
        };

        let price = match swap.price(cfg.price_convention) {
            Ok(price) => price,
            Err(e) => {
                // amounts are part of the event; a refetch cannot fix them
                warn!(%key, error = %e, "[PIPELINE] record has no usable price");
                state.dedupe.mark_seen(key);
                outcome.unpriced += 1;
                continue;
            }
        };

        let delta_vs_prev = state
            .prices
            .latest_price(swap.pool_id, direction)
            .and_then(|prev| percent_change(prev, price));

        let obs = PriceObservation {
            pool_id: swap.pool_id,
            direction,
            price,
            timestamp: swap.timestamp,
        };
        if let Err(e) = state.prices.insert_observation(&obs) {
            warn!(%key, error = %e, "[PIPELINE] price rejected by buffer");
            state.dedupe.mark_seen(key);
            outcome.unpriced += 1;
            continue;
        }
        state.dedupe.mark_seen(key);

        outcome.newest_timestamp = outcome.newest_timestamp.max(Some(swap.timestamp));
        accepted.push(Accepted {
            swap,
            direction,
            price,
            delta_vs_prev,
        });
    }

    outcome.records = accepted
        .into_iter()
        .map(|a| {
            let delta_vs_ma =
                delta_vs_moving_average(&state.prices, a.swap.pool_id, a.direction, a.price);
            EnrichedRecord {
                anomaly: is_anomaly(delta_vs_ma, &cfg.signal),
                swap: a.swap,
                direction: a.direction,
                price: a.price,
                delta_vs_ma,
                delta_vs_prev: a.delta_vs_prev,
                delta_vs_other_pool: None,
            }
        })
        .collect();

    if let Some(pair) = cfg.pool_pair {
        apply_cross_pool_deltas(&mut outcome.records, pair, &cfg.signal);
    }

    if let (Some(max_age), Some(newest)) = (cfg.history_max_age_secs, outcome.newest_timestamp) {
        let dropped = state.prices.prune_older_than(newest.saturating_sub(max_age));
        if dropped > 0 {
            debug!(dropped, "[PIPELINE] retired aged observations");
        }
    }

    outcome
}
