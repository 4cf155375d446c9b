//! In-memory document store used by tests.
//!
//! Mirrors the semantics the domain logic relies on: field-merge updates
//! fail on missing documents, and `commit` validates the whole batch
//! before applying anything, so a failed batch leaves no partial state.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::{Error, Result};

use super::{DocumentStore, WriteOp};

#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a dependency error. Lets
    /// tests exercise the degraded paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(Error::Dependency("simulated store failure".to_string()))
        } else {
            Ok(())
        }
    }

    fn merge(doc: &mut Value, fields: &Value) {
        if let (Some(target), Some(source)) = (doc.as_object_mut(), fields.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn query_eq(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Value>> {
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| doc.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>> {
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn set(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        self.check_writable()?;
        let mut collections = self.collections.lock().unwrap();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Value) -> Result<()> {
        self.check_writable()?;
        let mut collections = self.collections.lock().unwrap();
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| Error::NotFound(format!("{}/{}", collection, id)))?;
        Self::merge(doc, &fields);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.check_writable()?;
        let mut collections = self.collections.lock().unwrap();
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn commit(&self, ops: Vec<WriteOp>) -> Result<()> {
        self.check_writable()?;
        let mut collections = self.collections.lock().unwrap();

        // Validate first so a failing batch applies nothing.
        for op in &ops {
            match op {
                WriteOp::Update { collection, id, .. } | WriteOp::Delete { collection, id } => {
                    let exists = collections
                        .get(collection)
                        .map(|docs| docs.contains_key(id))
                        .unwrap_or(false);
                    if !exists {
                        return Err(Error::NotFound(format!("{}/{}", collection, id)));
                    }
                }
                WriteOp::Set { .. } => {}
            }
        }

        for op in ops {
            match op {
                WriteOp::Set {
                    collection,
                    id,
                    doc,
                } => {
                    collections.entry(collection).or_default().insert(id, doc);
                }
                WriteOp::Update {
                    collection,
                    id,
                    fields,
                } => {
                    if let Some(doc) = collections
                        .get_mut(&collection)
                        .and_then(|docs| docs.get_mut(&id))
                    {
                        Self::merge(doc, &fields);
                    }
                }
                WriteOp::Delete { collection, id } => {
                    if let Some(docs) = collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_assigns_id_into_document() {
        let store = MemoryStore::new();
        let id = store
            .insert("programs", json!({ "title": "Tennis" }))
            .await
            .unwrap();

        let doc = store.get("programs", &id).await.unwrap().unwrap();
        assert_eq!(doc["id"], json!(id));
        assert_eq!(doc["title"], json!("Tennis"));
    }

    #[tokio::test]
    async fn update_missing_document_fails() {
        let store = MemoryStore::new();
        let err = store
            .update("programs", "ghost", json!({ "title": "x" }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_commit_applies_nothing() {
        let store = MemoryStore::new();
        store
            .set("appointments", "a1", json!({ "id": "a1", "status": "confirmed" }))
            .await
            .unwrap();

        // Second op targets a missing document, so the first must not land.
        let err = store
            .commit(vec![
                WriteOp::Update {
                    collection: "appointments".to_string(),
                    id: "a1".to_string(),
                    fields: json!({ "status": "cancelled" }),
                },
                WriteOp::Update {
                    collection: "appointments".to_string(),
                    id: "missing".to_string(),
                    fields: json!({ "status": "cancelled" }),
                },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let doc = store.get("appointments", "a1").await.unwrap().unwrap();
        assert_eq!(doc["status"], json!("confirmed"));
    }

    #[tokio::test]
    async fn query_eq_matches_exact_values() {
        let store = MemoryStore::new();
        store
            .set("appointments", "a1", json!({ "program_id": "p1" }))
            .await
            .unwrap();
        store
            .set("appointments", "a2", json!({ "program_id": "p2" }))
            .await
            .unwrap();

        let hits = store
            .query_eq("appointments", "program_id", &json!("p1"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
