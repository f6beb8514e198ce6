use serde::Serialize;

/// Open interval of admissible `price / median` ratios.
///
/// Prices from the two trade directions of a pool are reciprocals and can be
/// several orders of magnitude apart; anything outside the band is treated as
/// belonging to another scale and left out of the statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioBand {
    pub low: f64,
    pub high: f64,
}

impl Default for RatioBand {
    fn default() -> Self {
        Self {
            low: 0.1,
            high: 10.0,
        }
    }
}

impl RatioBand {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Strict containment of `value / reference`.
    pub fn admits(&self, value: f64, reference: f64) -> bool {
        if reference <= 0.0 || !reference.is_finite() {
            return false;
        }
        let ratio = value / reference;
        ratio > self.low && ratio < self.high
    }
}

/// Outlier-filtered statistics over one price window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowStats {
    /// Median of every stored price.
    pub median: f64,
    /// Median of the prices admitted by the band.
    pub filtered_median: f64,
    /// Arithmetic mean of the admitted prices.
    pub mean: f64,
    pub retained: usize,
    pub rejected: usize,
}

impl WindowStats {
    /// `None` if the window is empty or nothing survives the band.
    pub fn compute(prices: &[f64], band: RatioBand) -> Option<Self> {
        let median = median(prices)?;
        let retained: Vec<f64> = prices
            .iter()
            .copied()
            .filter(|p| band.admits(*p, median))
            .collect();
        if retained.is_empty() {
            return None;
        }
        let mean = retained.iter().sum::<f64>() / retained.len() as f64;
        let filtered_median = median_of(retained.clone())?;
        Some(Self {
            median,
            filtered_median,
            mean,
            retained: retained.len(),
            rejected: prices.len() - retained.len(),
        })
    }
}

pub fn median(values: &[f64]) -> Option<f64> {
    median_of(values.to_vec())
}

fn median_of(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
