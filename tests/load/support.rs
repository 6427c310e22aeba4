use anyhow::{bail, Result};
use fetch_probe::config::Config;
use fetch_probe::profiler::CpuSampler;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Sampler double that records calls and returns fixed bytes.
#[derive(Debug, Default)]
pub struct RecordingSampler {
    starts: AtomicUsize,
    exports: AtomicUsize,
    fail_export: bool,
}

impl RecordingSampler {
    pub fn failing_export() -> Self {
        Self {
            fail_export: true,
            ..Self::default()
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn exports(&self) -> usize {
        self.exports.load(Ordering::SeqCst)
    }
}

impl CpuSampler for RecordingSampler {
    fn start_sampling(&self, _label: &str, _interval: Duration) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_and_export(&self, label: &str) -> Result<Vec<u8>> {
        self.exports.fetch_add(1, Ordering::SeqCst);
        if self.fail_export {
            bail!("export of '{label}' failed (simulated)");
        }
        Ok(format!("profile:{label}").into_bytes())
    }
}

/// Small, fast configuration writing profiles into a fresh temp dir.
pub fn small_config(documents: u64, requests: usize) -> Config {
    let mut cfg = Config::default();
    cfg.fixture.document_count = documents;
    cfg.load.request_count = requests;
    cfg.profile.duration_ms = 0;
    cfg.profile.sample_interval_us = 0;
    cfg.profile.output_dir = scratch_dir();
    cfg
}

pub fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("fetch-probe-{}", uuid::Uuid::new_v4()))
}
