use anyhow::{bail, Result};
use std::time::Instant;
use tracing::info;

use crate::store::{Document, RunContext};

/// Empty the target collection. Safe to call when it does not exist.
pub async fn reset(ctx: &RunContext) -> Result<()> {
    ctx.store.drop_collection(&ctx.collection).await?;
    info!(collection = %ctx.collection, "collection reset");
    Ok(())
}

/// Insert `count` copies of `template` in one batched write.
pub async fn populate(ctx: &RunContext, count: u64, template: &Document) -> Result<u64> {
    let started = Instant::now();
    let docs: Vec<Document> = (0..count).map(|_| template.clone()).collect();
    let inserted = ctx.store.insert_batch(&ctx.collection, docs).await?;
    if inserted != count {
        bail!(
            "bulk insert into '{}' wrote {inserted} of {count} documents",
            ctx.collection
        );
    }
    info!(
        collection = %ctx.collection,
        documents = inserted,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "fixture populated"
    );
    Ok(inserted)
}
