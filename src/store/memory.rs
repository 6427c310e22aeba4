use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{Connector, Document, DocumentStore};

/// In-process store used when no database backend is compiled in, and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    next_id: AtomicU64,
    /// Simulated round trip applied to every `find_all`.
    pub find_latency: Duration,
    /// 1-based index of the `find_all` call that fails.
    fail_find_at: Option<usize>,
    drops: AtomicUsize,
    inserts: AtomicUsize,
    finds: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallSnapshot {
    pub drops: usize,
    pub inserts: usize,
    pub finds: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_find_latency(mut self, latency: Duration) -> Self {
        self.find_latency = latency;
        self
    }

    /// Make the `nth` read (1-based) fail.
    pub fn failing_find(mut self, nth: usize) -> Self {
        self.fail_find_at = Some(nth);
        self
    }

    pub fn calls(&self) -> CallSnapshot {
        CallSnapshot {
            drops: self.drops.load(Ordering::SeqCst),
            inserts: self.inserts.load(Ordering::SeqCst),
            finds: self.finds.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.drops.fetch_add(1, Ordering::SeqCst);
        if self.collections.write().remove(collection).is_none() {
            debug!(collection, "drop of missing collection ignored");
        }
        Ok(())
    }

    async fn insert_batch(&self, collection: &str, docs: Vec<Document>) -> Result<u64> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let inserted = docs.len() as u64;
        let mut collections = self.collections.write();
        let target = collections.entry(collection.to_string()).or_default();
        target.reserve(docs.len());
        for mut doc in docs {
            if !doc.contains_key("_id") {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                doc.insert("_id".into(), Value::from(id));
            }
            target.push(doc);
        }
        Ok(inserted)
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        let call = self.finds.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.find_latency.is_zero() {
            tokio::time::sleep(self.find_latency).await;
        }
        if self.fail_find_at == Some(call) {
            bail!("simulated failure on read #{call} of '{collection}'");
        }
        Ok(self
            .collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map_or(0, |docs| docs.len() as u64))
    }
}

/// Hands out a shared [`MemoryStore`] and counts lifecycle calls.
#[derive(Debug)]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    refuse: bool,
    open: AtomicBool,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            refuse: false,
            open: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    /// A connector whose `connect` always fails.
    pub fn refusing(store: Arc<MemoryStore>) -> Self {
        Self {
            refuse: true,
            ..Self::new(store)
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            bail!("connection refused (simulated)");
        }
        self.open.store(true, Ordering::SeqCst);
        let store: Arc<dyn DocumentStore> = self.store.clone();
        Ok(store)
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if !self.open.swap(false, Ordering::SeqCst) {
            debug!("close called without an open connection");
        }
        Ok(())
    }
}
