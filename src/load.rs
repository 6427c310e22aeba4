use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::store::RunContext;

#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub requests: usize,
    /// Documents returned per request, in completion order.
    pub documents_per_request: Vec<usize>,
    /// Longest single request, measured inside its task.
    pub slowest: Duration,
}

impl LoadSummary {
    pub fn total_documents(&self) -> usize {
        self.documents_per_request.iter().sum()
    }
}

/// Dispatch `concurrency` full-collection reads at once and wait for all of them.
///
/// Every task is joined even after a failure; the first error observed is
/// returned and no partial summary is produced.
pub async fn run_load(ctx: &RunContext, concurrency: usize) -> Result<LoadSummary> {
    let mut tasks = JoinSet::new();
    for request in 0..concurrency {
        let store = Arc::clone(&ctx.store);
        let collection = ctx.collection.clone();
        tasks.spawn(async move {
            let started = Instant::now();
            let docs = store
                .find_all(&collection)
                .await
                .with_context(|| format!("read #{request} of '{collection}' failed"))?;
            Ok::<_, anyhow::Error>((docs.len(), started.elapsed()))
        });
    }

    let mut documents_per_request = Vec::with_capacity(concurrency);
    let mut slowest = Duration::ZERO;
    let mut first_error: Option<anyhow::Error> = None;
    let mut failures = 0usize;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok((count, took))) => {
                documents_per_request.push(count);
                slowest = slowest.max(took);
            }
            Ok(Err(e)) => {
                failures += 1;
                first_error.get_or_insert(e);
            }
            Err(e) => {
                failures += 1;
                first_error.get_or_insert(anyhow::Error::new(e).context("load task panicked"));
            }
        }
    }

    if let Some(e) = first_error {
        warn!(requests = concurrency, failures, "load phase failed");
        return Err(e);
    }

    let summary = LoadSummary {
        requests: concurrency,
        documents_per_request,
        slowest,
    };
    info!(
        requests = summary.requests,
        documents = summary.total_documents(),
        slowest_ms = summary.slowest.as_millis() as u64,
        "load phase complete"
    );
    Ok(summary)
}
