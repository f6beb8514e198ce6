use anyhow::Result;
use dex_price_signals::{
    config::AppConfig,
    ingest::JsonlInbox,
    report::JsonlReport,
    state::EngineState,
    utils,
    worker::{Worker, spawn_heartbeat},
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();

    let config = AppConfig::load()?;
    config.log_redacted();

    // Restore or cold start; never fatal
    let state = EngineState::restore(&config.state_path, &config.engine);

    let report = JsonlReport::new(&config.output_dir).with_max_rows(config.max_rows);
    tracing::info!(output = %report.dir().display(), "[INIT] reporting enabled");

    let mut worker = Worker::new(
        state,
        config.engine.clone(),
        JsonlInbox::new(&config.inbox_path),
        report,
        config.state_path.clone(),
    );

    let _heartbeat = spawn_heartbeat(worker.subscribe(), config.heartbeat_secs);
    tracing::info!(
        poll_secs = config.poll_interval_secs,
        "[INIT] price signal engine started"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                worker.run_cycle(utils::unix_now());
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("[SHUTDOWN] interrupt received");
                break;
            }
        }
    }

    // Final save; the last cycle already saved unless that write failed
    if let Err(e) = worker.shutdown() {
        tracing::warn!(error = %e, "[SHUTDOWN] final snapshot failed");
    }
    tracing::info!("[SHUTDOWN] worker stopped");
    Ok(())
}
