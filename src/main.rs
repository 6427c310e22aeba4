use anyhow::Result;
use fetch_probe::{config, profiler, telemetry, Harness, ProbeError};
use config::Config;
use profiler::PprofSampler;
use std::process::ExitCode;
use std::sync::Arc;
use telemetry::init_tracing;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let phase = e.downcast_ref::<ProbeError>().map_or("unknown", ProbeError::phase);
            error!(phase, error = %format!("{e:#}"), "probe run failed");
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cfg = Config::load().map_err(ProbeError::Config)?;

    #[cfg(feature = "mongo")]
    let connector = fetch_probe::store::MongoConnector::new(&cfg.database);
    #[cfg(not(feature = "mongo"))]
    let connector = {
        tracing::warn!("built without the `mongo` feature, probing the in-memory store");
        fetch_probe::store::MemoryConnector::new(Arc::new(fetch_probe::store::MemoryStore::new()))
    };

    let sampler = Arc::new(PprofSampler::new(cfg.profile.format));
    let mut stdout = std::io::stdout();

    let report = Harness::new(cfg)
        .run(&connector, sampler, &mut stdout, telemetry::shutdown_signal())
        .await?;

    info!(
        started_at = %report.started_at,
        elapsed_ms = report.elapsed.as_millis() as u64,
        profile = ?report.profile,
        "probe finished"
    );
    Ok(())
}
