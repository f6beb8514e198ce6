//! The engine's mutable state and its read-only view.

use crate::config::EngineConfig;
use crate::dedup::DedupeStore;
use crate::history::{RollingPriceBuffer, WindowStats};
use crate::models::Direction;
use crate::persistence;
use crate::signal::{CrossPoolSpread, PoolPair, cross_pool_spread};
use alloy_primitives::Address;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// All price histories plus the dedupe store, persisted as one unit.
///
/// Owned by the ingestion loop; nothing else mutates it.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub dedupe: DedupeStore,
    pub prices: RollingPriceBuffer,
    /// Read position of the swap source covered by this state.
    pub source_cursor: u64,
}

impl EngineState {
    pub fn empty(cfg: &EngineConfig) -> Self {
        Self {
            dedupe: DedupeStore::new(cfg.dedup_capacity, cfg.dedup_prune_fraction),
            prices: RollingPriceBuffer::new(cfg.buffer_capacity, cfg.ratio_band),
            source_cursor: 0,
        }
    }

    /// Restore from the snapshot at `path`, degrading to an empty state when
    /// it is missing or unreadable.
    pub fn restore(path: &Path, cfg: &EngineConfig) -> Self {
        match persistence::load_snapshot(path, cfg) {
            Ok(Some(state)) => {
                info!(
                    path = %path.display(),
                    dedupe_keys = state.dedupe.len(),
                    series = state.prices.series_keys().count(),
                    points = state.prices.total_points(),
                    source_cursor = state.source_cursor,
                    "[SNAPSHOT] restored engine state"
                );
                state
            }
            Ok(None) => {
                info!(path = %path.display(), "[SNAPSHOT] no snapshot found, cold start");
                Self::empty(cfg)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "[SNAPSHOT] unreadable snapshot, cold start");
                Self::empty(cfg)
            }
        }
    }

    /// Immutable summary for readers outside the ingestion loop.
    pub fn view(&self, cfg: &EngineConfig, now: i64, cycle: u64) -> EngineView {
        let series = self
            .prices
            .iter()
            .map(|(key, window)| SeriesSummary {
                pool_id: key.pool_id,
                direction: key.direction,
                observations: window.len(),
                newest_timestamp: window.back().map(|p| p.timestamp),
                moving_average: self.prices.moving_average(key.pool_id, key.direction),
                latest_price: self.prices.latest_price(key.pool_id, key.direction),
                stats: self.prices.window_stats(key.pool_id, key.direction),
            })
            .collect();

        let spreads = cfg
            .pool_pair
            .map(|pair| spreads_for(&self.prices, pair, now, cfg))
            .unwrap_or_default();

        EngineView {
            cycle,
            generated_at: now,
            dedupe_keys: self.dedupe.len(),
            series,
            spreads,
        }
    }
}

fn spreads_for(
    prices: &RollingPriceBuffer,
    pair: PoolPair,
    now: i64,
    cfg: &EngineConfig,
) -> Vec<CrossPoolSpread> {
    [Direction::ZeroToOne, Direction::OneToZero]
        .into_iter()
        .filter_map(|dir| cross_pool_spread(prices, pair, dir, now, &cfg.signal))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesSummary {
    pub pool_id: Address,
    pub direction: Direction,
    pub observations: usize,
    pub newest_timestamp: Option<i64>,
    pub moving_average: Option<f64>,
    pub latest_price: Option<f64>,
    pub stats: Option<WindowStats>,
}

/// Snapshot of derived values taken after a cycle completes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineView {
    pub cycle: u64,
    pub generated_at: i64,
    pub dedupe_keys: usize,
    pub series: Vec<SeriesSummary>,
    pub spreads: Vec<CrossPoolSpread>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_reports_series_and_spreads() {
        let pool_a = Address::repeat_byte(0xaa);
        let pool_b = Address::repeat_byte(0xbb);
        let cfg = EngineConfig {
            pool_pair: Some(PoolPair { pool_a, pool_b }),
            ..EngineConfig::default()
        };
        let mut state = EngineState::empty(&cfg);
        state.prices.insert(pool_a, Direction::ZeroToOne, 102.0, 100).unwrap();
        state.prices.insert(pool_b, Direction::ZeroToOne, 100.0, 100).unwrap();

        let view = state.view(&cfg, 120, 3);
        assert_eq!(view.cycle, 3);
        assert_eq!(view.series.len(), 2);
        assert_eq!(view.spreads.len(), 1);
        assert!(view.spreads[0].alert.is_some());
        assert_eq!(view.series[0].moving_average, Some(102.0));
    }

    #[test]
    fn missing_snapshot_restores_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = EngineState::restore(&dir.path().join("absent.json"), &EngineConfig::default());
        assert!(state.dedupe.is_empty());
        assert_eq!(state.prices.total_points(), 0);
    }

    #[test]
    fn corrupt_snapshot_restores_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let state = EngineState::restore(&path, &EngineConfig::default());
        assert!(state.dedupe.is_empty());
    }
}
