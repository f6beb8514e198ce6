//! Configuration loader and application settings.

use crate::errors::{AppError, Result};
use crate::history::RatioBand;
use crate::models::PriceConvention;
use crate::signal::{PoolPair, SignalConfig};
use alloy_primitives::Address;
use std::path::PathBuf;
use std::str::FromStr;

/// Tunables of the price history and signal engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Observations kept per (pool, direction).
    pub buffer_capacity: usize,
    /// Event keys remembered by the dedupe store.
    pub dedup_capacity: usize,
    /// Share of `dedup_capacity` evicted at once when the store overflows.
    pub dedup_prune_fraction: f64,
    pub ratio_band: RatioBand,
    pub price_convention: PriceConvention,
    pub signal: SignalConfig,
    /// Pools compared for cross-pool spreads, if both are configured.
    pub pool_pair: Option<PoolPair>,
    /// Observations older than this (relative to the newest ingested
    /// timestamp) are retired after each batch. `None` keeps them until
    /// capacity eviction.
    pub history_max_age_secs: Option<i64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 20,
            dedup_capacity: 10_000,
            dedup_prune_fraction: 0.2,
            ratio_band: RatioBand::default(),
            price_convention: PriceConvention::OutPerIn,
            signal: SignalConfig::default(),
            pool_pair: None,
            history_max_age_secs: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(AppError::Config("BUFFER_CAPACITY must be at least 1".into()));
        }
        if self.dedup_capacity == 0 {
            return Err(AppError::Config("DEDUP_CAPACITY must be at least 1".into()));
        }
        if !(self.dedup_prune_fraction > 0.0 && self.dedup_prune_fraction <= 1.0) {
            return Err(AppError::Config(
                "DEDUP_PRUNE_FRACTION must be in (0, 1]".into(),
            ));
        }
        let band = self.ratio_band;
        if !(band.low > 0.0 && band.low < band.high && band.high.is_finite()) {
            return Err(AppError::Config(format!(
                "outlier ratio band must satisfy 0 < low < high, got ({}, {})",
                band.low, band.high
            )));
        }
        if self.history_max_age_secs.is_some_and(|age| age <= 0) {
            return Err(AppError::Config("HISTORY_MAX_AGE_SECS must be positive".into()));
        }
        let signal = &self.signal;
        for (key, pct) in [
            ("ANOMALY_THRESHOLD_PCT", signal.anomaly_threshold_pct),
            ("SPREAD_ALERT_PCT", signal.spread_alert_pct),
        ] {
            if !(pct.is_finite() && pct >= 0.0) {
                return Err(AppError::Config(format!(
                    "{key} must be a finite non-negative percentage, got {pct}"
                )));
            }
        }
        for (key, secs) in [
            ("LATEST_PRICE_MAX_AGE_SECS", signal.latest_max_age_secs),
            ("CROSS_POOL_MATCH_SECS", signal.match_window_secs),
        ] {
            if secs < 0 {
                return Err(AppError::Config(format!("{key} must be non-negative, got {secs}")));
            }
        }
        Ok(())
    }
}

/// Consolidated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Newline-delimited JSON file the decoder writes swap records to.
    pub inbox_path: PathBuf,
    /// Engine snapshot location.
    pub state_path: PathBuf,
    /// Directory for enriched records and the summary view.
    pub output_dir: PathBuf,
    pub poll_interval_secs: u64,
    pub heartbeat_secs: u64,
    /// Row limit of the enriched records file; `None` lets it grow.
    pub max_rows: Option<usize>,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup; unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = EngineConfig::default();
        let signal_defaults = SignalConfig::default();

        let pool_a = parse_opt::<Address, _>(&lookup, "DEX_POOL_A")?;
        let pool_b = parse_opt::<Address, _>(&lookup, "DEX_POOL_B")?;
        let pool_pair = match (pool_a, pool_b) {
            (Some(pool_a), Some(pool_b)) => Some(PoolPair { pool_a, pool_b }),
            (None, None) => None,
            _ => {
                return Err(AppError::Config(
                    "DEX_POOL_A and DEX_POOL_B must be set together".into(),
                ));
            }
        };

        let engine = EngineConfig {
            buffer_capacity: parse_or(&lookup, "BUFFER_CAPACITY", defaults.buffer_capacity)?,
            dedup_capacity: parse_or(&lookup, "DEDUP_CAPACITY", defaults.dedup_capacity)?,
            dedup_prune_fraction: parse_or(
                &lookup,
                "DEDUP_PRUNE_FRACTION",
                defaults.dedup_prune_fraction,
            )?,
            ratio_band: RatioBand::new(
                parse_or(&lookup, "OUTLIER_RATIO_MIN", defaults.ratio_band.low)?,
                parse_or(&lookup, "OUTLIER_RATIO_MAX", defaults.ratio_band.high)?,
            ),
            price_convention: parse_or(&lookup, "PRICE_CONVENTION", defaults.price_convention)?,
            signal: SignalConfig {
                anomaly_threshold_pct: parse_or(
                    &lookup,
                    "ANOMALY_THRESHOLD_PCT",
                    signal_defaults.anomaly_threshold_pct,
                )?,
                spread_alert_pct: parse_or(
                    &lookup,
                    "SPREAD_ALERT_PCT",
                    signal_defaults.spread_alert_pct,
                )?,
                latest_max_age_secs: parse_or(
                    &lookup,
                    "LATEST_PRICE_MAX_AGE_SECS",
                    signal_defaults.latest_max_age_secs,
                )?,
                match_window_secs: parse_or(
                    &lookup,
                    "CROSS_POOL_MATCH_SECS",
                    signal_defaults.match_window_secs,
                )?,
            },
            pool_pair,
            history_max_age_secs: parse_opt(&lookup, "HISTORY_MAX_AGE_SECS")?,
        };
        engine.validate()?;

        let poll_interval_secs = parse_or(&lookup, "WORKER_POLL_SECONDS", 300u64)?;
        if poll_interval_secs == 0 {
            return Err(AppError::Config("WORKER_POLL_SECONDS must be positive".into()));
        }

        Ok(Self {
            inbox_path: parse_or(&lookup, "INBOX_PATH", PathBuf::from("state/inbox.jsonl"))?,
            state_path: parse_or(
                &lookup,
                "STATE_PATH",
                PathBuf::from("state/engine_snapshot.json"),
            )?,
            output_dir: parse_or(&lookup, "DATA_OUT_DIR", PathBuf::from("out"))?,
            poll_interval_secs,
            heartbeat_secs: parse_or(&lookup, "HEARTBEAT_SECONDS", 60u64)?.max(1),
            // 0 disables the rolling window
            max_rows: Some(parse_or(&lookup, "MAX_ROWS", 10_000usize)?).filter(|&n| n > 0),
            engine,
        })
    }

    /// Log the effective configuration; pool addresses are shortened.
    pub fn log_redacted(&self) {
        let pools = self
            .engine
            .pool_pair
            .map(|p| format!("{} / {}", redact_address(&p.pool_a), redact_address(&p.pool_b)))
            .unwrap_or_else(|| "[NOT SET]".into());
        tracing::info!(
            inbox = %self.inbox_path.display(),
            state = %self.state_path.display(),
            output = %self.output_dir.display(),
            poll_secs = self.poll_interval_secs,
            max_rows = ?self.max_rows,
            buffer_capacity = self.engine.buffer_capacity,
            dedup_capacity = self.engine.dedup_capacity,
            dedup_prune_fraction = self.engine.dedup_prune_fraction,
            ratio_low = self.engine.ratio_band.low,
            ratio_high = self.engine.ratio_band.high,
            anomaly_pct = self.engine.signal.anomaly_threshold_pct,
            spread_alert_pct = self.engine.signal.spread_alert_pct,
            %pools,
            "[INIT] configuration"
        );
    }
}

fn redact_address(addr: &Address) -> String {
    let s = addr.to_string();
    format!("{}...{}", &s[..6], &s[s.len() - 4..])
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}

fn parse_opt<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| AppError::Config(format!("{key}={raw}: {e}"))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.engine.buffer_capacity, 20);
        assert_eq!(cfg.engine.dedup_capacity, 10_000);
        assert_eq!(cfg.engine.ratio_band, RatioBand::new(0.1, 10.0));
        assert_eq!(cfg.engine.signal.anomaly_threshold_pct, 50.0);
        assert_eq!(cfg.poll_interval_secs, 300);
        assert_eq!(cfg.max_rows, Some(10_000));
        assert!(cfg.engine.pool_pair.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let pool_a = Address::repeat_byte(0xaa).to_string();
        let pool_b = Address::repeat_byte(0xbb).to_string();
        let cfg = config_from(&[
            ("BUFFER_CAPACITY", "50"),
            ("OUTLIER_RATIO_MIN", "0.5"),
            ("OUTLIER_RATIO_MAX", "2"),
            ("PRICE_CONVENTION", "in_per_out"),
            ("DEX_POOL_A", pool_a.as_str()),
            ("DEX_POOL_B", pool_b.as_str()),
        ])
        .unwrap();
        assert_eq!(cfg.engine.buffer_capacity, 50);
        assert_eq!(cfg.engine.ratio_band, RatioBand::new(0.5, 2.0));
        assert_eq!(cfg.engine.price_convention, PriceConvention::InPerOut);
        assert_eq!(
            cfg.engine.pool_pair.map(|p| p.pool_b),
            Some(Address::repeat_byte(0xbb))
        );
    }

    #[test]
    fn malformed_values_are_config_errors() {
        assert!(matches!(
            config_from(&[("DEDUP_CAPACITY", "lots")]),
            Err(AppError::Config(_))
        ));
        assert!(config_from(&[("DEX_POOL_A", "0x1234")]).is_err());
    }

    #[test]
    fn inverted_band_is_rejected() {
        let err = config_from(&[("OUTLIER_RATIO_MIN", "10"), ("OUTLIER_RATIO_MAX", "0.1")]);
        assert!(matches!(err, Err(AppError::Config(_))));
    }

    #[test]
    fn lone_pool_is_rejected() {
        let pool_a = Address::repeat_byte(0xaa).to_string();
        assert!(config_from(&[("DEX_POOL_A", pool_a.as_str())]).is_err());
    }

    #[test]
    fn prune_fraction_must_be_a_share() {
        assert!(config_from(&[("DEDUP_PRUNE_FRACTION", "0")]).is_err());
        assert!(config_from(&[("DEDUP_PRUNE_FRACTION", "1.5")]).is_err());
        assert!(config_from(&[("DEDUP_PRUNE_FRACTION", "0.5")]).is_ok());
    }

    #[test]
    fn zero_max_rows_disables_the_window() {
        assert_eq!(config_from(&[("MAX_ROWS", "0")]).unwrap().max_rows, None);
        assert_eq!(config_from(&[("MAX_ROWS", "250")]).unwrap().max_rows, Some(250));
    }

    #[test]
    fn thresholds_must_be_finite_and_non_negative() {
        assert!(config_from(&[("ANOMALY_THRESHOLD_PCT", "NaN")]).is_err());
        assert!(config_from(&[("SPREAD_ALERT_PCT", "inf")]).is_err());
        assert!(config_from(&[("ANOMALY_THRESHOLD_PCT", "-1")]).is_err());
        assert!(config_from(&[("LATEST_PRICE_MAX_AGE_SECS", "-1")]).is_err());
        assert!(config_from(&[("CROSS_POOL_MATCH_SECS", "-60")]).is_err());
        assert!(config_from(&[("CROSS_POOL_MATCH_SECS", "0")]).is_ok());
    }
}
