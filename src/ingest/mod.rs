//! Swap record sources.
//!
//! Responsibilities:
//! • Hand the pipeline one batch of decoder output per poll.
//! • Keep records loosely typed; schema validation happens per record in the
//!   pipeline so one bad record never sinks a batch.
//! • Expose a read cursor so a restarted worker resumes where the last
//!   snapshot left off.

use crate::errors::Result;

pub mod jsonl;

pub use jsonl::JsonlInbox;

/// Upstream fetcher + decoder boundary.
///
/// Batches may overlap with earlier ones; the dedupe store absorbs repeats.
pub trait SwapSource {
    fn fetch_batch(&mut self) -> Result<Vec<serde_json::Value>>;

    /// Position after the last record handed out. Sources without a
    /// resumable position report 0.
    fn cursor(&self) -> u64 {
        0
    }

    /// Continue from a cursor previously returned by [`cursor`](Self::cursor).
    fn resume_from(&mut self, _cursor: u64) {}
}
