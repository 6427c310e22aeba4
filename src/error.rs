use thiserror::Error;

/// Failures that abort a probe run, tagged with the phase that produced them.
///
/// Profile export failures surface as
/// [`crate::profiler::ProfileOutcome::Failed`] instead and never fail the run.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("configuration error: {0}")]
    Config(#[source] anyhow::Error),

    #[error("failed to connect to database")]
    Connect(#[source] anyhow::Error),

    #[error("fixture setup failed on collection '{collection}'")]
    Fixture {
        collection: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("CPU profiler could not start")]
    Profiler(#[source] anyhow::Error),

    #[error("load phase failed")]
    Load(#[source] anyhow::Error),

    #[error("could not write timing report")]
    Report(#[source] std::io::Error),
}

impl ProbeError {
    /// Short phase name used in log fields.
    pub fn phase(&self) -> &'static str {
        match self {
            ProbeError::Config(_) => "config",
            ProbeError::Connect(_) => "connect",
            ProbeError::Fixture { .. } => "fixture",
            ProbeError::Profiler(_) => "profiler",
            ProbeError::Load(_) => "load",
            ProbeError::Report(_) => "report",
        }
    }
}
