use std::io::{self, Write};
use std::time::{Duration, Instant};
use tracing::info;

/// Wall-clock stopwatch for the measured span.
#[derive(Debug)]
pub struct Stopwatch {
    label: String,
    started: Instant,
}

impl Stopwatch {
    pub fn mark(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started: Instant::now(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Writes `<label>: <elapsed>` as a single line and returns the elapsed time.
    pub fn report<W: Write>(&self, out: &mut W) -> io::Result<Duration> {
        let elapsed = self.elapsed();
        writeln!(out, "{}: {:.3?}", self.label, elapsed)?;
        out.flush()?;
        info!(
            label = %self.label,
            elapsed_ms = elapsed.as_millis() as u64,
            "timed span finished"
        );
        Ok(elapsed)
    }
}
