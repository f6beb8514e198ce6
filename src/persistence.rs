//! Durable snapshot of [`EngineState`].
//!
//! The snapshot is a single JSON document with two sections: the dedupe keys
//! (oldest first) and one entry per (pool, direction) price history, plus the
//! swap source cursor the state corresponds to. Loading
//! is lenient: unknown fields are ignored and a history whose direction key
//! is missing or unrecognised is skipped, so that series simply starts empty.

use crate::config::EngineConfig;
use crate::dedup::DedupeStore;
use crate::errors::{AppError, Result};
use crate::history::RollingPriceBuffer;
use crate::models::{DedupKey, Direction, PricePoint, SeriesKey};
use crate::state::EngineState;
use crate::utils::write_atomic;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

pub const SNAPSHOT_VERSION: u32 = 1;

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    dedupe: Vec<DedupKey>,
    #[serde(default)]
    histories: Vec<HistoryEntry>,
    #[serde(default)]
    source_cursor: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryEntry {
    pool_id: Address,
    #[serde(default)]
    direction_key: Option<String>,
    #[serde(default)]
    observations: Vec<PricePoint>,
}

impl Snapshot {
    fn capture(state: &EngineState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            dedupe: state.dedupe.keys().copied().collect(),
            histories: state
                .prices
                .iter()
                .map(|(key, window)| HistoryEntry {
                    pool_id: key.pool_id,
                    direction_key: Some(key.direction.as_key().to_string()),
                    observations: window.iter().copied().collect(),
                })
                .collect(),
            source_cursor: state.source_cursor,
        }
    }

    fn into_state(self, cfg: &EngineConfig) -> EngineState {
        let source_cursor = self.source_cursor;
        let dedupe = DedupeStore::from_keys(self.dedupe, cfg.dedup_capacity, cfg.dedup_prune_fraction);

        let series = self.histories.into_iter().filter_map(|entry| {
            let direction = entry.direction_key.as_deref().and_then(Direction::from_key);
            match direction {
                Some(direction) => Some((SeriesKey::new(entry.pool_id, direction), entry.observations)),
                None => {
                    warn!(
                        pool = %entry.pool_id,
                        key = ?entry.direction_key,
                        dropped = entry.observations.len(),
                        "[SNAPSHOT] history without a known direction key skipped"
                    );
                    None
                }
            }
        });
        let prices = RollingPriceBuffer::from_series(series, cfg.buffer_capacity, cfg.ratio_band);

        EngineState {
            dedupe,
            prices,
            source_cursor,
        }
    }
}

/// Atomically write `state` to `path`.
pub fn save_snapshot(path: &Path, state: &EngineState) -> Result<()> {
    let bytes = serde_json::to_vec(&Snapshot::capture(state))?;
    write_atomic(path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "[SNAPSHOT] saved");
    Ok(())
}

/// Read the snapshot at `path`.
///
/// `Ok(None)` means there is no snapshot (cold start). Unreadable or corrupt
/// files are returned as errors; see [`EngineState::restore`] for the lenient
/// entry point.
pub fn load_snapshot(path: &Path, cfg: &EngineConfig) -> Result<Option<EngineState>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
    if snapshot.version > SNAPSHOT_VERSION {
        return Err(AppError::SnapshotVersion(snapshot.version));
    }
    Ok(Some(snapshot.into_state(cfg)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use serde_json::json;

    fn populated_state(cfg: &EngineConfig) -> EngineState {
        let mut state = EngineState::empty(cfg);
        let pool = Address::repeat_byte(0xaa);
        for (i, p) in [3880.0, 3875.0, 3890.0].into_iter().enumerate() {
            state.prices.insert(pool, Direction::ZeroToOne, p, 100 + i as i64).unwrap();
        }
        state.prices.insert(pool, Direction::OneToZero, 0.000258, 105).unwrap();
        for n in 0..5u64 {
            state.dedupe.mark_seen(DedupKey::new(B256::repeat_byte(n as u8), n));
        }
        state.source_cursor = 4_096;
        state
    }

    #[test]
    fn round_trip_preserves_histories_and_dedupe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let cfg = EngineConfig::default();
        let state = populated_state(&cfg);

        save_snapshot(&path, &state).unwrap();
        let restored = load_snapshot(&path, &cfg).unwrap().unwrap();

        let before: Vec<_> = state.prices.iter().map(|(k, w)| (*k, w.clone())).collect();
        let after: Vec<_> = restored.prices.iter().map(|(k, w)| (*k, w.clone())).collect();
        assert_eq!(before, after);
        let keys_before: Vec<_> = state.dedupe.keys().copied().collect();
        let keys_after: Vec<_> = restored.dedupe.keys().copied().collect();
        assert_eq!(keys_before, keys_after);
        assert_eq!(restored.source_cursor, 4_096);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_snapshot(&dir.path().join("none.json"), &EngineConfig::default()).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, b"\x00\x01garbage").unwrap();
        assert!(matches!(
            load_snapshot(&path, &EngineConfig::default()),
            Err(AppError::SerdeJson(_))
        ));
    }

    #[test]
    fn newer_version_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, json!({ "version": 99 }).to_string()).unwrap();
        assert!(matches!(
            load_snapshot(&path, &EngineConfig::default()),
            Err(AppError::SnapshotVersion(99))
        ));
    }

    #[test]
    fn unknown_direction_keys_and_fields_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let pool = Address::repeat_byte(0xaa).to_string();
        let doc = json!({
            "version": 1,
            "written_by": "future release",
            "histories": [
                { "pool_id": pool, "observations": [{ "price": 1.0, "timestamp": 1 }] },
                { "pool_id": pool, "direction_key": "21", "observations": [{ "price": 2.0, "timestamp": 1 }] },
                { "pool_id": pool, "direction_key": "10", "observations": [{ "price": 3.0, "timestamp": 1 }] }
            ]
        });
        fs::write(&path, doc.to_string()).unwrap();

        let state = load_snapshot(&path, &EngineConfig::default()).unwrap().unwrap();
        let addr = Address::repeat_byte(0xaa);
        assert!(state.prices.history(addr, Direction::ZeroToOne).is_none());
        assert_eq!(state.prices.moving_average(addr, Direction::OneToZero), Some(3.0));
        assert!(state.dedupe.is_empty());
        assert_eq!(state.source_cursor, 0);
    }

    #[test]
    fn smaller_capacity_on_load_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let state = populated_state(&EngineConfig::default());
        save_snapshot(&path, &state).unwrap();

        let tight = EngineConfig {
            buffer_capacity: 2,
            dedup_capacity: 2,
            ..EngineConfig::default()
        };
        let restored = load_snapshot(&path, &tight).unwrap().unwrap();
        let prices: Vec<f64> = restored
            .prices
            .history(Address::repeat_byte(0xaa), Direction::ZeroToOne)
            .unwrap()
            .iter()
            .map(|p| p.price)
            .collect();
        assert_eq!(prices, vec![3875.0, 3890.0]);
        assert_eq!(restored.dedupe.len(), 2);
        assert!(restored.dedupe.seen(&DedupKey::new(B256::repeat_byte(4), 4)));
    }
}
