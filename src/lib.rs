//! Core library for the dex-price-signals engine.
//!
//! Swap records flow through the dedupe store into per-pool, per-direction
//! rolling price windows; signals are derived from the outlier-filtered
//! windows and the whole state is snapshotted after every batch.

pub mod config;
pub mod dedup;
pub mod errors;
pub mod history;
pub mod ingest;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod report;
pub mod signal;
pub mod state;
pub mod utils;
pub mod worker;
