//! CPU profiling: a [`CpuSampler`] seam backed by `pprof`, and a
//! [`ProfileSession`] that stops and exports on a timer, independently of
//! whatever the run is doing meanwhile.

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use pprof::protos::Message;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ProfileConfig;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProfileFormat {
    /// Protobuf profile, readable by `go tool pprof`.
    Pprof,
    Flamegraph,
}

impl ProfileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ProfileFormat::Pprof => "pb",
            ProfileFormat::Flamegraph => "svg",
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait CpuSampler: Send + Sync {
    fn start_sampling(&self, label: &str, interval: Duration) -> Result<()>;
    /// Stops sampling and serializes everything captured since the start.
    fn stop_and_export(&self, label: &str) -> Result<Vec<u8>>;
}

/// Sampling frequency in Hz for a sampling interval.
pub fn frequency_for(interval: Duration) -> i32 {
    let micros = interval.as_micros().max(1);
    (1_000_000 / micros).clamp(1, i32::MAX as u128) as i32
}

pub struct PprofSampler {
    format: ProfileFormat,
    active: Mutex<Option<(String, pprof::ProfilerGuard<'static>)>>,
}

impl PprofSampler {
    pub fn new(format: ProfileFormat) -> Self {
        Self {
            format,
            active: Mutex::new(None),
        }
    }
}

impl CpuSampler for PprofSampler {
    fn start_sampling(&self, label: &str, interval: Duration) -> Result<()> {
        let mut active = self.active.lock();
        if let Some((running, _)) = active.as_ref() {
            bail!("profile '{running}' is already running");
        }
        let guard = pprof::ProfilerGuardBuilder::default()
            .frequency(frequency_for(interval))
            .blocklist(&["libc", "libgcc", "pthread", "vdso"])
            .build()
            .context("failed to start pprof sampler")?;
        *active = Some((label.to_string(), guard));
        Ok(())
    }

    fn stop_and_export(&self, label: &str) -> Result<Vec<u8>> {
        let guard = {
            let mut active = self.active.lock();
            match active.take() {
                Some((running, guard)) if running == label => guard,
                Some((running, guard)) => {
                    let msg = format!("profile '{label}' is not running ('{running}' is)");
                    *active = Some((running, guard));
                    bail!(msg);
                }
                None => bail!("profile '{label}' is not running"),
            }
        };

        let report = guard
            .report()
            .build()
            .context("failed to build profile report")?;
        drop(guard);

        let mut buf = Vec::new();
        match self.format {
            ProfileFormat::Pprof => {
                let profile = report.pprof().context("failed to build pprof output")?;
                profile
                    .encode(&mut buf)
                    .context("failed to encode pprof")?;
            }
            ProfileFormat::Flamegraph => report
                .flamegraph(&mut buf)
                .context("failed to render flamegraph")?,
        }
        Ok(buf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProfileOutcome {
    Written(PathBuf),
    Failed(String),
    Abandoned,
}

/// A running CPU profile with a scheduled stop.
pub struct ProfileSession {
    label: String,
    cancel: CancellationToken,
    handle: JoinHandle<ProfileOutcome>,
}

impl ProfileSession {
    /// Start sampling now and export to `cfg.output_path()` once `cfg.duration()` has elapsed.
    pub fn start(sampler: Arc<dyn CpuSampler>, cfg: &ProfileConfig) -> Result<Self> {
        sampler.start_sampling(&cfg.label, cfg.sample_interval())?;
        info!(
            label = %cfg.label,
            interval_us = cfg.sample_interval_us,
            duration_ms = cfg.duration_ms,
            "CPU sampling started"
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scheduled_stop(
            sampler,
            cfg.label.clone(),
            cfg.duration(),
            cfg.output_path(),
            cancel.clone(),
        ));
        Ok(Self {
            label: cfg.label.clone(),
            cancel,
            handle,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Wait for the scheduled export. If `shutdown` resolves first the
    /// timer is cancelled and the samples are discarded.
    pub async fn finish<F>(self, shutdown: F) -> ProfileOutcome
    where
        F: Future<Output = ()>,
    {
        let ProfileSession {
            label,
            cancel,
            mut handle,
        } = self;

        tokio::select! {
            joined = &mut handle => settle(joined),
            _ = shutdown => {
                warn!(label = %label, "shutdown requested, abandoning pending CPU profile");
                cancel.cancel();
                settle(handle.await)
            }
        }
    }
}

fn settle(joined: std::result::Result<ProfileOutcome, tokio::task::JoinError>) -> ProfileOutcome {
    joined.unwrap_or_else(|e| {
        error!(error = %e, "profile task panicked");
        ProfileOutcome::Failed(format!("profile task panicked: {e}"))
    })
}

async fn scheduled_stop(
    sampler: Arc<dyn CpuSampler>,
    label: String,
    after: Duration,
    path: PathBuf,
    cancel: CancellationToken,
) -> ProfileOutcome {
    tokio::select! {
        _ = tokio::time::sleep(after) => {}
        _ = cancel.cancelled() => {
            let discard = tokio::task::spawn_blocking(move || sampler.stop_and_export(&label)).await;
            if !matches!(discard, Ok(Ok(_))) {
                warn!("stopping abandoned profile failed");
            }
            return ProfileOutcome::Abandoned;
        }
    }

    match export(sampler, label.clone(), &path).await {
        Ok(bytes) => {
            info!(label = %label, path = %path.display(), bytes, "CPU profile written");
            ProfileOutcome::Written(path)
        }
        Err(e) => {
            error!(label = %label, error = %format!("{e:#}"), "CPU profile export failed");
            ProfileOutcome::Failed(format!("{e:#}"))
        }
    }
}

async fn export(sampler: Arc<dyn CpuSampler>, label: String, path: &Path) -> Result<usize> {
    let bytes = tokio::task::spawn_blocking(move || sampler.stop_and_export(&label))
        .await
        .context("profile export task panicked")??;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, &bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(bytes.len())
}
