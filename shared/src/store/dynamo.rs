//! DynamoDB-backed document store.
//!
//! Collections map one-to-one onto tables keyed by a string `id`
//! attribute. Equality queries scan with a filter expression; at the
//! collection sizes this platform serves that is the whole table read the
//! original backend performed anyway. Atomic batches use
//! `TransactWriteItems`.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, Delete, Put, TransactWriteItem, Update};
use aws_sdk_dynamodb::Client;
use serde_json::{Number, Value};

use crate::{Error, Result};

use super::{DocumentStore, WriteOp};

/// DynamoDB holds at most this many operations in one transaction.
const MAX_TRANSACT_ITEMS: usize = 100;

pub struct DynamoStore {
    client: Client,
}

impl DynamoStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a store from the ambient AWS environment.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }

    fn key(id: &str) -> HashMap<String, AttributeValue> {
        HashMap::from([("id".to_string(), AttributeValue::S(id.to_string()))])
    }
}

/// JSON value -> DynamoDB attribute.
fn json_to_attr(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(json_to_attr).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_attr(v)))
                .collect(),
        ),
    }
}

/// DynamoDB attribute -> JSON value. Set types never occur in documents we
/// write, so they fold into plain nulls rather than guessing a shape.
fn attr_to_json(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => parse_number(n),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::L(items) => Value::Array(items.iter().map(attr_to_json).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), attr_to_json(v)))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn parse_number(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::Number(Number::from(i));
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn doc_to_item(doc: &Value) -> Result<HashMap<String, AttributeValue>> {
    let obj = doc
        .as_object()
        .ok_or_else(|| Error::Validation("Document must be a JSON object".to_string()))?;
    Ok(obj
        .iter()
        .map(|(k, v)| (k.clone(), json_to_attr(v)))
        .collect())
}

fn item_to_doc(item: &HashMap<String, AttributeValue>) -> Value {
    Value::Object(
        item.iter()
            .map(|(k, v)| (k.clone(), attr_to_json(v)))
            .collect(),
    )
}

/// SET expression over every field in `fields`, with collision-free
/// placeholder names.
struct UpdateExpression {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

fn build_update_expression(fields: &Value) -> Result<UpdateExpression> {
    let obj = fields
        .as_object()
        .ok_or_else(|| Error::Validation("Update fields must be a JSON object".to_string()))?;
    if obj.is_empty() {
        return Err(Error::Validation("No fields to update".to_string()));
    }

    let mut clauses = Vec::with_capacity(obj.len());
    let mut names = HashMap::new();
    let mut values = HashMap::new();

    for (i, (field, value)) in obj.iter().enumerate() {
        let name = format!("#f{}", i);
        let placeholder = format!(":v{}", i);
        clauses.push(format!("{} = {}", name, placeholder));
        names.insert(name, field.clone());
        values.insert(placeholder, json_to_attr(value));
    }

    Ok(UpdateExpression {
        expression: format!("SET {}", clauses.join(", ")),
        names,
        values,
    })
}

#[async_trait]
impl DocumentStore for DynamoStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let resp = self
            .client
            .get_item()
            .table_name(collection)
            .set_key(Some(Self::key(id)))
            .send()
            .await
            .map_err(|e| Error::Dependency(format!("DynamoDB get failed: {}", e)))?;

        Ok(resp.item().map(item_to_doc))
    }

    async fn query_eq(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Value>> {
        let mut docs = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let resp = self
                .client
                .scan()
                .table_name(collection)
                .filter_expression("#f = :v")
                .expression_attribute_names("#f", field)
                .expression_attribute_values(":v", json_to_attr(value))
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(|e| Error::Dependency(format!("DynamoDB query failed: {}", e)))?;

            docs.extend(resp.items().iter().map(item_to_doc));

            start_key = resp.last_evaluated_key().cloned();
            if start_key.is_none() {
                break;
            }
        }

        Ok(docs)
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>> {
        let mut docs = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let resp = self
                .client
                .scan()
                .table_name(collection)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(|e| Error::Dependency(format!("DynamoDB scan failed: {}", e)))?;

            docs.extend(resp.items().iter().map(item_to_doc));

            start_key = resp.last_evaluated_key().cloned();
            if start_key.is_none() {
                break;
            }
        }

        Ok(docs)
    }

    async fn set(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        let mut item = doc_to_item(&doc)?;
        item.insert("id".to_string(), AttributeValue::S(id.to_string()));

        self.client
            .put_item()
            .table_name(collection)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| Error::Dependency(format!("DynamoDB put failed: {}", e)))?;

        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Value) -> Result<()> {
        let expr = build_update_expression(&fields)?;

        self.client
            .update_item()
            .table_name(collection)
            .set_key(Some(Self::key(id)))
            .update_expression(expr.expression)
            .set_expression_attribute_names(Some(expr.names))
            .set_expression_attribute_values(Some(expr.values))
            .condition_expression("attribute_exists(id)")
            .send()
            .await
            .map_err(|e| {
                let service_err = e.into_service_error();
                if service_err.is_conditional_check_failed_exception() {
                    Error::NotFound(format!("{}/{}", collection, id))
                } else {
                    Error::Dependency(format!("DynamoDB update failed: {}", service_err))
                }
            })?;

        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(collection)
            .set_key(Some(Self::key(id)))
            .send()
            .await
            .map_err(|e| Error::Dependency(format!("DynamoDB delete failed: {}", e)))?;

        Ok(())
    }

    async fn commit(&self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        if ops.len() > MAX_TRANSACT_ITEMS {
            return Err(Error::Validation(format!(
                "Batch of {} write operations exceeds the transaction limit of {}; \
                 split the change into smaller operations",
                ops.len(),
                MAX_TRANSACT_ITEMS
            )));
        }

        let mut items = Vec::with_capacity(ops.len());
        for op in &ops {
            let item = match op {
                WriteOp::Set {
                    collection,
                    id,
                    doc,
                } => {
                    let mut attrs = doc_to_item(doc)?;
                    attrs.insert("id".to_string(), AttributeValue::S(id.clone()));
                    let put = Put::builder()
                        .table_name(collection)
                        .set_item(Some(attrs))
                        .build()
                        .map_err(|e| Error::Dependency(format!("Invalid put op: {}", e)))?;
                    TransactWriteItem::builder().put(put).build()
                }
                WriteOp::Update {
                    collection,
                    id,
                    fields,
                } => {
                    let expr = build_update_expression(fields)?;
                    let update = Update::builder()
                        .table_name(collection)
                        .set_key(Some(Self::key(id)))
                        .update_expression(expr.expression)
                        .set_expression_attribute_names(Some(expr.names))
                        .set_expression_attribute_values(Some(expr.values))
                        .condition_expression("attribute_exists(id)")
                        .build()
                        .map_err(|e| Error::Dependency(format!("Invalid update op: {}", e)))?;
                    TransactWriteItem::builder().update(update).build()
                }
                WriteOp::Delete { collection, id } => {
                    let delete = Delete::builder()
                        .table_name(collection)
                        .set_key(Some(Self::key(id)))
                        .build()
                        .map_err(|e| Error::Dependency(format!("Invalid delete op: {}", e)))?;
                    TransactWriteItem::builder().delete(delete).build()
                }
            };
            items.push(item);
        }

        self.client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(|e| Error::Dependency(format!("DynamoDB transaction failed: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trips_through_attributes() {
        let doc = json!({
            "id": "p1",
            "cost": 12.5,
            "maxParticipants": 20,
            "free": false,
            "ageGroups": ["kids", "teens"],
            "venue": { "name": "Rec Centre", "suburb": "Clayton" },
        });
        let item = doc_to_item(&doc).unwrap();
        assert_eq!(item_to_doc(&item), doc);
    }

    #[test]
    fn update_expression_covers_every_field() {
        let expr = build_update_expression(&json!({
            "status": "cancelled",
            "cancelledAt": "2026-08-25T00:00:00Z",
        }))
        .unwrap();

        assert!(expr.expression.starts_with("SET "));
        assert_eq!(expr.names.len(), 2);
        assert_eq!(expr.values.len(), 2);
        assert!(expr.names.values().any(|v| v == "status"));
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(build_update_expression(&json!({})).is_err());
        assert!(build_update_expression(&json!("nope")).is_err());
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_before_any_request() {
        let config = aws_sdk_dynamodb::config::Config::builder()
            .behavior_version(aws_sdk_dynamodb::config::BehaviorVersion::latest())
            .region(aws_sdk_dynamodb::config::Region::new("ap-southeast-2"))
            .build();
        let store = DynamoStore::new(Client::from_conf(config));

        let ops: Vec<WriteOp> = (0..=MAX_TRANSACT_ITEMS)
            .map(|i| WriteOp::Delete {
                collection: "appointments".to_string(),
                id: format!("a{}", i),
            })
            .collect();

        let err = store.commit(ops).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
