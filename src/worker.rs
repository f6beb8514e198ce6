//! Polling-cycle driver and heartbeat.

use crate::config::EngineConfig;
use crate::errors::Result;
use crate::ingest::SwapSource;
use crate::models::EnrichedRecord;
use crate::persistence::save_snapshot;
use crate::pipeline::process_batch;
use crate::report::JsonlReport;
use crate::state::{EngineState, EngineView};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// What happened in one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub received: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub anomalies: usize,
    pub persisted: bool,
    /// Enriched records handed to reporting this cycle, including held ones.
    pub reported: usize,
}

/// Owns the engine state and runs fetch → dedupe → insert → signal → persist → report.
///
/// Enriched records only reach the report once the snapshot covering them is
/// saved. When the save fails they are held and go out after the next
/// successful one, so a restart never re-reports rows the durable dedupe set
/// already knows about.
pub struct Worker<S: SwapSource> {
    state: EngineState,
    cfg: EngineConfig,
    source: S,
    report: JsonlReport,
    state_path: PathBuf,
    view_tx: watch::Sender<Arc<EngineView>>,
    cycle: u64,
    held: Vec<EnrichedRecord>,
}

impl<S: SwapSource> Worker<S> {
    pub fn new(
        state: EngineState,
        cfg: EngineConfig,
        mut source: S,
        report: JsonlReport,
        state_path: PathBuf,
    ) -> Self {
        source.resume_from(state.source_cursor);
        let (view_tx, _) = watch::channel(Arc::new(EngineView::default()));
        Self {
            state,
            cfg,
            source,
            report,
            state_path,
            view_tx,
            cycle: 0,
            held: Vec::new(),
        }
    }

    /// Read-only views published after every cycle.
    pub fn subscribe(&self) -> watch::Receiver<Arc<EngineView>> {
        self.view_tx.subscribe()
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Records waiting for a successful snapshot before being reported.
    pub fn held_records(&self) -> usize {
        self.held.len()
    }

    pub fn run_cycle(&mut self, now: i64) -> CycleReport {
        self.cycle += 1;
        let cycle = self.cycle;

        let batch = match self.source.fetch_batch() {
            Ok(batch) => batch,
            Err(e) => {
                warn!(cycle, error = %e, "[CYCLE] fetch failed, retrying next poll");
                Vec::new()
            }
        };
        self.state.source_cursor = self.source.cursor();

        let outcome = process_batch(&mut self.state, &self.cfg, batch);

        for rec in outcome.records.iter().filter(|r| r.anomaly) {
            info!(
                pool = %rec.swap.pool_id,
                direction = %rec.direction,
                tx = %rec.swap.tx_hash,
                price = rec.price,
                delta_vs_ma = ?rec.delta_vs_ma,
                "[SIGNAL] price deviates from moving average"
            );
        }

        let mut report = CycleReport {
            cycle,
            received: outcome.received,
            accepted: outcome.records.len(),
            duplicates: outcome.duplicates,
            skipped: outcome.malformed + outcome.unpriced,
            anomalies: outcome.anomalies(),
            ..CycleReport::default()
        };
        self.held.extend(outcome.records);

        report.persisted = match self.persist() {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    cycle,
                    path = %self.state_path.display(),
                    error = %e,
                    held = self.held.len(),
                    "[SNAPSHOT] save failed, holding enriched records"
                );
                false
            }
        };
        if report.persisted {
            report.reported = self.flush_held(cycle);
        }

        let view = self.state.view(&self.cfg, now, cycle);
        for spread in view.spreads.iter().filter(|s| s.alert.is_some()) {
            info!(
                direction = %spread.direction,
                price_a = spread.price_a,
                price_b = spread.price_b,
                spread_pct = spread.spread_pct,
                leg = ?spread.alert,
                "[ARB] cross-pool spread above threshold"
            );
        }
        if let Err(e) = self.report.write_summary(&view) {
            warn!(cycle, error = %e, "[CYCLE] failed to write summary");
        }
        self.view_tx.send_replace(Arc::new(view));

        info!(
            cycle,
            received = report.received,
            accepted = report.accepted,
            duplicates = report.duplicates,
            skipped = report.skipped,
            anomalies = report.anomalies,
            reported = report.reported,
            dedupe_keys = self.state.dedupe.len(),
            "[CYCLE] batch processed"
        );
        report
    }

    /// Write the current state to the snapshot file.
    pub fn persist(&self) -> Result<()> {
        save_snapshot(&self.state_path, &self.state)
    }

    /// Final save; held records are reported only if it succeeds.
    pub fn shutdown(&mut self) -> Result<()> {
        self.persist()?;
        self.flush_held(self.cycle);
        Ok(())
    }

    fn flush_held(&mut self, cycle: u64) -> usize {
        if self.held.is_empty() {
            return 0;
        }
        match self.report.append(&self.held) {
            Ok(()) => {
                let n = self.held.len();
                self.held.clear();
                if let Err(e) = self.report.prune_to_max_rows() {
                    warn!(cycle, error = %e, "[REPORT] rolling window prune failed");
                }
                n
            }
            Err(e) => {
                warn!(cycle, held = self.held.len(), error = %e, "[REPORT] append failed, retrying next cycle");
                0
            }
        }
    }
}

/// Spawn a task that periodically logs the latest published view.
pub fn spawn_heartbeat(
    mut view_rx: watch::Receiver<Arc<EngineView>>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let view = view_rx.borrow_and_update().clone();
            if view.cycle == 0 {
                info!("[HEARTBEAT] waiting for first cycle");
                continue;
            }
            let tracked: Vec<String> = view
                .series
                .iter()
                .map(|s| match s.moving_average {
                    Some(ma) => format!("{}/{} ma={:.6} n={}", s.pool_id, s.direction, ma, s.observations),
                    None => format!("{}/{} ma=- n={}", s.pool_id, s.direction, s.observations),
                })
                .collect();
            info!(
                cycle = view.cycle,
                dedupe_keys = view.dedupe_keys,
                spreads = view.spreads.len(),
                series = ?tracked,
                "[HEARTBEAT] engine state"
            );
        }
    })
}
