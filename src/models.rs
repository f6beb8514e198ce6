//! Shared data structures used throughout the engine.

use crate::errors::{AppError, Result};
use alloy_primitives::{Address, B256};
use bigdecimal::BigDecimal;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Trade direction of a swap relative to the pool's sorted token pair.
///
/// token0 is the numerically lower address, as AMM pair factories sort them.
/// Serialized as the two-character role key `"01"` / `"10"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "01")]
    ZeroToOne,
    #[serde(rename = "10")]
    OneToZero,
}

impl Direction {
    /// Classify a swap by its token roles. `None` when both sides are the same token.
    pub fn from_tokens(token_in: Address, token_out: Address) -> Option<Self> {
        match token_in.cmp(&token_out) {
            std::cmp::Ordering::Less => Some(Direction::ZeroToOne),
            std::cmp::Ordering::Greater => Some(Direction::OneToZero),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn as_key(&self) -> &'static str {
        match self {
            Direction::ZeroToOne => "01",
            Direction::OneToZero => "10",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "01" => Some(Direction::ZeroToOne),
            "10" => Some(Direction::OneToZero),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

/// Identifies one independent price series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub pool_id: Address,
    pub direction: Direction,
}

impl SeriesKey {
    pub fn new(pool_id: Address, direction: Direction) -> Self {
        Self { pool_id, direction }
    }
}

/// A single stored price sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub timestamp: i64,
}

/// A price sample tagged with the series it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceObservation {
    pub pool_id: Address,
    pub direction: Direction,
    pub price: f64,
    pub timestamp: i64,
}

/// Globally unique identity of an on-chain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub tx_hash: B256,
    pub log_index: u64,
}

impl DedupKey {
    pub fn new(tx_hash: B256, log_index: u64) -> Self {
        Self { tx_hash, log_index }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.log_index)
    }
}

/// How a swap's amounts turn into a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceConvention {
    /// amount_out / amount_in
    #[default]
    OutPerIn,
    /// amount_in / amount_out
    InPerOut,
}

impl FromStr for PriceConvention {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "out_per_in" => Ok(PriceConvention::OutPerIn),
            "in_per_out" => Ok(PriceConvention::InPerOut),
            other => Err(AppError::Config(format!(
                "unknown price convention '{other}' (expected out_per_in or in_per_out)"
            ))),
        }
    }
}

/// Amounts arrive either as decimal strings or as bare JSON numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum AmountRepr {
    Text(String),
    Number(serde_json::Number),
}

fn deserialize_amount<'de, D>(deserializer: D) -> std::result::Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    let text = match AmountRepr::deserialize(deserializer)? {
        AmountRepr::Text(s) => s,
        AmountRepr::Number(n) => n.to_string(),
    };
    BigDecimal::from_str(text.trim()).map_err(serde::de::Error::custom)
}

fn serialize_amount<S>(amount: &BigDecimal, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(amount)
}

/// Normalized swap record handed over by the event decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub pool_id: Address,
    pub token_in: Address,
    pub token_out: Address,
    #[serde(
        deserialize_with = "deserialize_amount",
        serialize_with = "serialize_amount"
    )]
    pub amount_in: BigDecimal,
    #[serde(
        deserialize_with = "deserialize_amount",
        serialize_with = "serialize_amount"
    )]
    pub amount_out: BigDecimal,
    pub tx_hash: B256,
    pub log_index: u64,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

impl SwapRecord {
    /// Validate a loosely-typed decoder output against the fixed record schema.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let record: SwapRecord = serde_json::from_value(value)
            .map_err(|e| AppError::InvalidRecord(e.to_string()))?;
        if record.direction().is_none() {
            return Err(AppError::InvalidRecord(format!(
                "token_in equals token_out ({}) in {}",
                record.token_in,
                record.dedup_key()
            )));
        }
        Ok(record)
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(self.tx_hash, self.log_index)
    }

    pub fn direction(&self) -> Option<Direction> {
        Direction::from_tokens(self.token_in, self.token_out)
    }

    /// Execution price of the swap under the given convention.
    pub fn price(&self, convention: PriceConvention) -> Result<f64> {
        let zero = BigDecimal::zero();
        if self.amount_in <= zero || self.amount_out <= zero {
            return Err(AppError::InvalidRecord(format!(
                "non-positive amounts in {} (in={}, out={})",
                self.dedup_key(),
                self.amount_in,
                self.amount_out
            )));
        }
        let ratio = match convention {
            PriceConvention::OutPerIn => &self.amount_out / &self.amount_in,
            PriceConvention::InPerOut => &self.amount_in / &self.amount_out,
        };
        match ratio.to_f64() {
            Some(price) if price.is_finite() && price > 0.0 => Ok(price),
            _ => Err(AppError::InvalidRecord(format!(
                "price {} of {} does not fit a positive f64",
                ratio,
                self.dedup_key()
            ))),
        }
    }
}

/// A retained record with its derived signal fields, as handed to reporting.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub swap: SwapRecord,
    pub direction: Direction,
    pub price: f64,
    pub delta_vs_ma: Option<f64>,
    pub delta_vs_prev: Option<f64>,
    pub delta_vs_other_pool: Option<f64>,
    pub anomaly: bool,
}
