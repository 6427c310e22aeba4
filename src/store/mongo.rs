#![cfg(feature = "mongo")]

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::doc,
    error::{Error as MongoError, ErrorKind},
    Client, Collection, Database,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use super::{Connector, Document, DocumentStore};
use crate::config::DatabaseConfig;

/// Server error code for "ns not found".
const NAMESPACE_NOT_FOUND: i32 = 26;

pub struct MongoConnector {
    uri: String,
    database: String,
    client: Mutex<Option<Client>>,
}

impl MongoConnector {
    pub fn new(cfg: &DatabaseConfig) -> Self {
        Self {
            uri: cfg.uri.clone(),
            database: cfg.name.clone(),
            client: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>> {
        let client = Client::with_uri_str(&self.uri)
            .await
            .with_context(|| format!("invalid MongoDB uri {}", self.uri))?;
        let db = client.database(&self.database);

        // The driver connects lazily; force a round trip so failures land here.
        db.run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        info!(uri = %self.uri, database = %self.database, "connected to MongoDB");

        *self.client.lock() = Some(client);
        let store: Arc<dyn DocumentStore> = Arc::new(MongoStore { db });
        Ok(store)
    }

    async fn close(&self) -> Result<()> {
        let client = self.client.lock().take();
        match client {
            Some(client) => {
                client.shutdown().await;
                info!("MongoDB client closed");
            }
            None => debug!("no MongoDB client to close"),
        }
        Ok(())
    }
}

pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

fn is_namespace_not_found(err: &MongoError) -> bool {
    matches!(*err.kind, ErrorKind::Command(ref cmd) if cmd.code == NAMESPACE_NOT_FOUND)
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn drop_collection(&self, collection: &str) -> Result<()> {
        match self.collection(collection).drop().await {
            Ok(()) => Ok(()),
            Err(e) if is_namespace_not_found(&e) => {
                debug!(collection, "collection did not exist");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("drop of '{collection}' failed")),
        }
    }

    async fn insert_batch(&self, collection: &str, docs: Vec<Document>) -> Result<u64> {
        let result = self
            .collection(collection)
            .insert_many(docs)
            .await
            .with_context(|| format!("bulk insert into '{collection}' failed"))?;
        Ok(result.inserted_ids.len() as u64)
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        let cursor = self
            .collection(collection)
            .find(doc! {})
            .await
            .with_context(|| format!("find on '{collection}' failed"))?;
        let docs = cursor
            .try_collect::<Vec<_>>()
            .await
            .with_context(|| format!("reading cursor of '{collection}' failed"))?;
        Ok(docs)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        Ok(self
            .collection(collection)
            .count_documents(doc! {})
            .await?)
    }
}
