//! Database seam: one [`Connector`] per run hands out a shared
//! [`DocumentStore`] handle used by every phase.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub mod memory;
#[cfg(feature = "mongo")]
pub mod mongo;

pub use memory::{CallSnapshot, MemoryConnector, MemoryStore};
#[cfg(feature = "mongo")]
pub use mongo::{MongoConnector, MongoStore};

/// A schemaless record. The store assigns `_id` on insert.
pub type Document = Map<String, Value>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Drop-if-exists; dropping a missing collection succeeds.
    async fn drop_collection(&self, collection: &str) -> Result<()>;
    /// Insert all documents as a single batched write.
    async fn insert_batch(&self, collection: &str, docs: Vec<Document>) -> Result<u64>;
    async fn find_all(&self, collection: &str) -> Result<Vec<Document>>;
    async fn count(&self, collection: &str) -> Result<u64>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>>;
    /// Release the handle. Must succeed when `connect` never did.
    async fn close(&self) -> Result<()>;
}

/// Everything a phase needs; owned by the run and passed by reference.
#[derive(Clone)]
pub struct RunContext {
    pub store: Arc<dyn DocumentStore>,
    pub collection: String,
}

impl RunContext {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }
}
