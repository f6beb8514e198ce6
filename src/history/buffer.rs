use super::stats::{RatioBand, WindowStats};
use crate::errors::{AppError, Result};
use crate::models::{Direction, PriceObservation, PricePoint, SeriesKey};
use alloy_primitives::Address;
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Bounded per-(pool, direction) price histories.
///
/// Each series is a FIFO window of at most `capacity` points. Late arrivals
/// are appended as they come; the window is a recency approximation, not a
/// time index, so it is never re-sorted.
#[derive(Debug, Clone)]
pub struct RollingPriceBuffer {
    series: BTreeMap<SeriesKey, VecDeque<PricePoint>>,
    capacity: usize,
    band: RatioBand,
}

impl RollingPriceBuffer {
    pub fn new(capacity: usize, band: RatioBand) -> Self {
        Self {
            series: BTreeMap::new(),
            capacity: capacity.max(1),
            band,
        }
    }

    /// Rebuild from restored series. Invalid points are dropped and each
    /// series keeps only its newest `capacity` points.
    pub fn from_series<I>(series: I, capacity: usize, band: RatioBand) -> Self
    where
        I: IntoIterator<Item = (SeriesKey, Vec<PricePoint>)>,
    {
        let mut buffer = Self::new(capacity, band);
        for (key, points) in series {
            for point in points {
                if let Err(e) = buffer.insert(key.pool_id, key.direction, point.price, point.timestamp) {
                    debug!(error = %e, "[HISTORY] dropped restored point");
                }
            }
        }
        buffer
    }

    /// Append a price, evicting the oldest point when the window is full.
    /// Returns the evicted point, if any.
    pub fn insert(
        &mut self,
        pool_id: Address,
        direction: Direction,
        price: f64,
        timestamp: i64,
    ) -> Result<Option<PricePoint>> {
        if !price.is_finite() || price <= 0.0 {
            return Err(AppError::InvalidPrice {
                pool: pool_id.to_string(),
                price,
            });
        }
        let window = self
            .series
            .entry(SeriesKey::new(pool_id, direction))
            .or_default();
        if let Some(last) = window.back() {
            if timestamp < last.timestamp {
                debug!(
                    pool = %pool_id,
                    %direction,
                    timestamp,
                    last = last.timestamp,
                    "[HISTORY] late observation appended out of order"
                );
            }
        }
        window.push_back(PricePoint { price, timestamp });
        let evicted = if window.len() > self.capacity {
            window.pop_front()
        } else {
            None
        };
        Ok(evicted)
    }

    pub fn insert_observation(&mut self, obs: &PriceObservation) -> Result<Option<PricePoint>> {
        self.insert(obs.pool_id, obs.direction, obs.price, obs.timestamp)
    }

    pub fn history(&self, pool_id: Address, direction: Direction) -> Option<&VecDeque<PricePoint>> {
        self.series.get(&SeriesKey::new(pool_id, direction))
    }

    pub fn window_stats(&self, pool_id: Address, direction: Direction) -> Option<WindowStats> {
        let window = self.history(pool_id, direction)?;
        let prices: Vec<f64> = window.iter().map(|p| p.price).collect();
        WindowStats::compute(&prices, self.band)
    }

    /// Outlier-filtered mean of the current window.
    pub fn moving_average(&self, pool_id: Address, direction: Direction) -> Option<f64> {
        self.window_stats(pool_id, direction).map(|s| s.mean)
    }

    /// Newest price, provided it sits on the same scale as the filtered median.
    pub fn latest_price(&self, pool_id: Address, direction: Direction) -> Option<f64> {
        self.latest_point(pool_id, direction).map(|p| p.price)
    }

    /// Like [`latest_price`](Self::latest_price) but also requires the point
    /// to be no older than `max_age_secs` relative to `now`.
    pub fn latest_price_within(
        &self,
        pool_id: Address,
        direction: Direction,
        now: i64,
        max_age_secs: i64,
    ) -> Option<f64> {
        let point = self.latest_point(pool_id, direction)?;
        if now.saturating_sub(point.timestamp) > max_age_secs {
            return None;
        }
        Some(point.price)
    }

    fn latest_point(&self, pool_id: Address, direction: Direction) -> Option<PricePoint> {
        let last = *self.history(pool_id, direction)?.back()?;
        let stats = self.window_stats(pool_id, direction)?;
        self.band
            .admits(last.price, stats.filtered_median)
            .then_some(last)
    }

    /// Drop points older than `cutoff` everywhere; empty series are removed.
    pub fn prune_older_than(&mut self, cutoff: i64) -> usize {
        let mut dropped = 0;
        for window in self.series.values_mut() {
            let before = window.len();
            window.retain(|p| p.timestamp >= cutoff);
            dropped += before - window.len();
        }
        self.series.retain(|_, window| !window.is_empty());
        dropped
    }

    pub fn series_keys(&self) -> impl Iterator<Item = &SeriesKey> {
        self.series.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SeriesKey, &VecDeque<PricePoint>)> {
        self.series.iter()
    }

    pub fn total_points(&self) -> usize {
        self.series.values().map(VecDeque::len).sum()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn band(&self) -> RatioBand {
        self.band
    }
}
