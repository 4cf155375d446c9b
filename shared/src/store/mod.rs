//! Document store abstraction.
//!
//! The domain services speak this trait only; the production adapter is
//! [`dynamo::DynamoStore`] and tests run against [`memory::MemoryStore`].
//! Documents are JSON objects keyed by a string `id` within a named
//! collection.

pub mod dynamo;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::Result;

pub use dynamo::DynamoStore;
pub use memory::MemoryStore;

/// Collection names for the three domain-owned document sets.
#[derive(Debug, Clone)]
pub struct Collections {
    pub programs: String,
    pub appointments: String,
    pub notifications: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            programs: "programs".to_string(),
            appointments: "appointments".to_string(),
            notifications: "notifications".to_string(),
        }
    }
}

/// One write inside an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Full document write (create or replace)
    Set {
        collection: String,
        id: String,
        doc: Value,
    },
    /// Field-level merge into an existing document
    Update {
        collection: String,
        id: String,
        fields: Value,
    },
    /// Remove a document
    Delete { collection: String, id: String },
}

/// Contract the domain logic requires of the hosting document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// All documents where `field == value`.
    async fn query_eq(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Value>>;

    /// Every document in the collection.
    async fn list(&self, collection: &str) -> Result<Vec<Value>>;

    /// Full document write (create or replace).
    async fn set(&self, collection: &str, id: &str, doc: Value) -> Result<()>;

    /// Merge `fields` into an existing document. Fails with `NotFound`
    /// when the document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Value) -> Result<()>;

    /// Remove a document.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Apply every operation or none of them.
    async fn commit(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// Generate a fresh document id.
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Insert a document under a generated id, writing the id into the
    /// document body the way the rest of the platform expects it.
    async fn insert(&self, collection: &str, mut doc: Value) -> Result<String> {
        let id = self.new_id();
        if let Some(obj) = doc.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id.clone()));
        }
        self.set(collection, &id, doc).await?;
        Ok(id)
    }
}
