//! Rolling per-pool price history with outlier-filtered statistics.

pub mod buffer;
pub mod stats;

pub use buffer::RollingPriceBuffer;
pub use stats::{RatioBand, WindowStats};
