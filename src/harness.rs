use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ProbeError;
use crate::fixture;
use crate::load::{self, LoadSummary};
use crate::profiler::{CpuSampler, ProfileOutcome, ProfileSession};
use crate::report::Stopwatch;
use crate::store::{Connector, RunContext};

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub label: String,
    pub fixture_documents: u64,
    pub load: LoadSummary,
    /// The measured span: profiler start through load completion.
    pub elapsed: Duration,
    pub profile: ProfileOutcome,
}

struct Measured {
    label: String,
    fixture_documents: u64,
    load: LoadSummary,
    elapsed: Duration,
}

pub struct Harness {
    cfg: Config,
}

impl Harness {
    pub fn new(cfg: Config) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// One probe run: connect, reset and seed the fixture, then time a burst
    /// of concurrent reads while the CPU profile runs.
    ///
    /// The connection is closed on every path, including a failed connect.
    /// A started profile is then awaited; `shutdown` abandons it instead.
    pub async fn run<W, F>(
        &self,
        connector: &dyn Connector,
        sampler: Arc<dyn CpuSampler>,
        out: &mut W,
        shutdown: F,
    ) -> Result<RunReport, ProbeError>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        let started_at = Utc::now();
        let mut session = None;

        let measured = self
            .run_phases(connector, sampler, out, &mut session)
            .await;

        if let Err(e) = connector.close().await {
            warn!(error = %format!("{e:#}"), "closing connection failed");
        }

        let profile = match session {
            Some(session) => session.finish(shutdown).await,
            None => ProfileOutcome::Abandoned,
        };

        let measured = measured?;
        Ok(RunReport {
            started_at,
            label: measured.label,
            fixture_documents: measured.fixture_documents,
            load: measured.load,
            elapsed: measured.elapsed,
            profile,
        })
    }

    async fn run_phases<W: Write>(
        &self,
        connector: &dyn Connector,
        sampler: Arc<dyn CpuSampler>,
        out: &mut W,
        session: &mut Option<ProfileSession>,
    ) -> Result<Measured, ProbeError> {
        let store = connector.connect().await.map_err(ProbeError::Connect)?;
        let ctx = RunContext::new(store, self.cfg.database.collection.clone());
        let fixture_error = |source| ProbeError::Fixture {
            collection: self.cfg.database.collection.clone(),
            source,
        };

        fixture::reset(&ctx).await.map_err(fixture_error)?;
        let fixture_documents = fixture::populate(
            &ctx,
            self.cfg.fixture.document_count,
            &self.cfg.fixture.template,
        )
        .await
        .map_err(fixture_error)?;

        let stopwatch = Stopwatch::mark(self.cfg.timer_label());
        *session = Some(
            ProfileSession::start(sampler, &self.cfg.profile).map_err(ProbeError::Profiler)?,
        );
        let load = load::run_load(&ctx, self.cfg.load.request_count)
            .await
            .map_err(ProbeError::Load)?;
        let elapsed = stopwatch.report(out).map_err(ProbeError::Report)?;

        info!(
            requests = load.requests,
            documents = load.total_documents(),
            elapsed_ms = elapsed.as_millis() as u64,
            "probe run measured"
        );
        Ok(Measured {
            label: stopwatch.label().to_string(),
            fixture_documents,
            load,
            elapsed,
        })
    }
}
