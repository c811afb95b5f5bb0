//! In-memory document gateway
//!
//! Reference implementation of the gateway contract: atomic batches,
//! broadcast-backed document subscriptions, and atomic increments. Used as
//! the test double throughout the crate and usable by embedders for local
//! runs. Fault injection (unavailability, per-collection permission denial)
//! exists so callers can exercise their failure paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::trace;

use crate::error::GatewayError;
use crate::gateway::{
    DocumentChange, DocumentGateway, OrderBy, Predicate, Subscription, WriteBatch, WriteOp,
};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// In-memory implementation of [`DocumentGateway`].
pub struct MemoryGateway {
    collections: RwLock<HashMap<String, HashMap<String, Value>>>,
    changes: broadcast::Sender<DocumentChange>,
    unavailable: AtomicBool,
    denied: std::sync::RwLock<HashSet<String>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            collections: RwLock::new(HashMap::new()),
            changes,
            unavailable: AtomicBool::new(false),
            denied: std::sync::RwLock::new(HashSet::new()),
        }
    }

    /// Simulate backend unavailability for every subsequent operation.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Deny reads on a collection, as restrictive access rules would.
    pub fn deny_collection(&self, collection: &str) {
        self.denied.write().unwrap().insert(collection.to_string());
    }

    pub fn allow_collection(&self, collection: &str) {
        self.denied.write().unwrap().remove(collection);
    }

    /// Number of documents currently stored in a collection.
    pub async fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), GatewayError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("simulated outage".into()));
        }
        Ok(())
    }

    fn check_readable(&self, collection: &str) -> Result<(), GatewayError> {
        if self.denied.read().unwrap().contains(collection) {
            return Err(GatewayError::PermissionDenied(format!(
                "read denied on collection '{}'",
                collection
            )));
        }
        Ok(())
    }

    fn emit(&self, collection: &str, id: &str, fields: Value) {
        // Ignore send errors: no subscribers is a normal state
        let _ = self.changes.send(DocumentChange {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_fields(doc: &mut Value, fields: &Value) {
    if let (Value::Object(target), Value::Object(incoming)) = (doc, fields) {
        for (key, value) in incoming {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn compare_by_field(a: &Value, b: &Value, field: &str) -> std::cmp::Ordering {
    let av = a.get(field).unwrap_or(&Value::Null);
    let bv = b.get(field).unwrap_or(&Value::Null);
    if let (Some(x), Some(y)) = (av.as_f64(), bv.as_f64()) {
        return x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal);
    }
    av.as_str()
        .unwrap_or_default()
        .cmp(bv.as_str().unwrap_or_default())
}

#[async_trait]
impl DocumentGateway for MemoryGateway {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, GatewayError> {
        self.check_available()?;
        self.check_readable(collection)?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    async fn query(
        &self,
        collection: &str,
        predicates: &[Predicate],
        order_by: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, GatewayError> {
        self.check_available()?;
        self.check_readable(collection)?;
        let collections = self.collections.read().await;
        let mut results: Vec<Value> = collections
            .get(collection)
            .map(|c| {
                c.values()
                    .filter(|doc| predicates.iter().all(|p| p.matches(doc)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = order_by {
            results.sort_by(|a, b| {
                let ord = compare_by_field(a, b, &order.field);
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        if let Some(limit) = limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), GatewayError> {
        self.check_available()?;
        let mut collections = self.collections.write().await;

        // Validate every op before applying any; a failed commit leaves
        // prior state untouched.
        for op in batch.ops() {
            match op {
                WriteOp::Create { collection, id, .. } => {
                    if collections
                        .get(collection)
                        .is_some_and(|c| c.contains_key(id))
                    {
                        return Err(GatewayError::AlreadyExists {
                            collection: collection.clone(),
                            id: id.clone(),
                        });
                    }
                }
                WriteOp::Update {
                    collection,
                    id,
                    precondition,
                    ..
                } => {
                    let Some(doc) = collections.get(collection).and_then(|c| c.get(id)) else {
                        return Err(GatewayError::NotFound {
                            collection: collection.clone(),
                            id: id.clone(),
                        });
                    };
                    if let Some(guard) = precondition {
                        let actual = doc.get(&guard.field).unwrap_or(&Value::Null);
                        if actual != &guard.expected {
                            return Err(GatewayError::PreconditionFailed {
                                collection: collection.clone(),
                                id: id.clone(),
                                field: guard.field.clone(),
                            });
                        }
                    }
                }
                WriteOp::Increment { collection, id, .. } => {
                    if !collections
                        .get(collection)
                        .is_some_and(|c| c.contains_key(id))
                    {
                        return Err(GatewayError::NotFound {
                            collection: collection.clone(),
                            id: id.clone(),
                        });
                    }
                }
            }
        }

        // Apply and collect post-write snapshots for change fan-out
        let mut touched: Vec<(String, String)> = Vec::new();
        for op in batch.ops() {
            match op {
                WriteOp::Create {
                    collection,
                    id,
                    fields,
                } => {
                    collections
                        .entry(collection.clone())
                        .or_default()
                        .insert(id.clone(), fields.clone());
                    touched.push((collection.clone(), id.clone()));
                }
                WriteOp::Update {
                    collection,
                    id,
                    fields,
                    ..
                } => {
                    if let Some(doc) = collections
                        .get_mut(collection)
                        .and_then(|c| c.get_mut(id))
                    {
                        merge_fields(doc, fields);
                    }
                    touched.push((collection.clone(), id.clone()));
                }
                WriteOp::Increment {
                    collection,
                    id,
                    field,
                    delta,
                } => {
                    if let Some(Value::Object(doc)) = collections
                        .get_mut(collection)
                        .and_then(|c| c.get_mut(id))
                    {
                        let current = doc.get(field).and_then(|v| v.as_i64()).unwrap_or(0);
                        doc.insert(field.clone(), Value::from(current + delta));
                    }
                    touched.push((collection.clone(), id.clone()));
                }
            }
        }

        touched.dedup();
        for (collection, id) in touched {
            let snapshot = collections
                .get(&collection)
                .and_then(|c| c.get(&id))
                .cloned()
                .unwrap_or(Value::Null);
            trace!(collection = %collection, id = %id, "Committed document change");
            self.emit(&collection, &id, snapshot);
        }

        Ok(())
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), GatewayError> {
        self.commit(WriteBatch::new().increment(collection, id, field, delta))
            .await
    }

    async fn subscribe_doc(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Subscription, GatewayError> {
        self.check_available()?;
        Ok(Subscription::new(
            self.changes.subscribe(),
            collection.to_string(),
            id.to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::gateway::Precondition;

    #[tokio::test]
    async fn test_create_and_get() {
        let gateway = MemoryGateway::new();
        gateway
            .commit(WriteBatch::new().create("challenges", "ch-1", json!({ "status": "pending" })))
            .await
            .unwrap();

        let doc = gateway.get("challenges", "ch-1").await.unwrap().unwrap();
        assert_eq!(doc["status"], json!("pending"));
    }

    #[tokio::test]
    async fn test_update_merges_top_level_fields() {
        let gateway = MemoryGateway::new();
        gateway
            .commit(WriteBatch::new().create(
                "challenges",
                "ch-1",
                json!({ "status": "pending", "wagerAmount": 10.0 }),
            ))
            .await
            .unwrap();
        gateway
            .commit(WriteBatch::new().update("challenges", "ch-1", json!({ "status": "accepted" })))
            .await
            .unwrap();

        let doc = gateway.get("challenges", "ch-1").await.unwrap().unwrap();
        assert_eq!(doc["status"], json!("accepted"));
        assert_eq!(doc["wagerAmount"], json!(10.0));
    }

    #[tokio::test]
    async fn test_failed_batch_applies_nothing() {
        let gateway = MemoryGateway::new();
        gateway
            .commit(WriteBatch::new().create("challenges", "ch-1", json!({ "status": "pending" })))
            .await
            .unwrap();

        // Second op targets a missing document, so the first must not apply
        let result = gateway
            .commit(
                WriteBatch::new()
                    .update("challenges", "ch-1", json!({ "status": "accepted" }))
                    .update("challenges", "missing", json!({ "status": "accepted" })),
            )
            .await;
        assert!(matches!(result, Err(GatewayError::NotFound { .. })));

        let doc = gateway.get("challenges", "ch-1").await.unwrap().unwrap();
        assert_eq!(doc["status"], json!("pending"));
    }

    #[tokio::test]
    async fn test_precondition_rejects_stale_write() {
        let gateway = MemoryGateway::new();
        gateway
            .commit(WriteBatch::new().create("challenges", "ch-1", json!({ "status": "pending" })))
            .await
            .unwrap();

        let result = gateway
            .commit(WriteBatch::new().update_guarded(
                "challenges",
                "ch-1",
                json!({ "status": "accepted" }),
                Precondition {
                    field: "status".into(),
                    expected: json!("negotiating"),
                },
            ))
            .await;
        assert!(matches!(result, Err(GatewayError::PreconditionFailed { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_increments_lose_nothing() {
        let gateway = std::sync::Arc::new(MemoryGateway::new());
        gateway
            .commit(WriteBatch::new().create(
                "challengeResponses",
                "resp-1",
                json!({ "fireCount": 0 }),
            ))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let g = std::sync::Arc::clone(&gateway);
            handles.push(tokio::spawn(async move {
                g.increment("challengeResponses", "resp-1", "fireCount", 1)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let doc = gateway
            .get("challengeResponses", "resp-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["fireCount"], json!(20));
    }

    #[tokio::test]
    async fn test_query_order_and_limit() {
        let gateway = MemoryGateway::new();
        for (id, created) in [("a", "2024-01-01T00:00:00Z"), ("b", "2024-03-01T00:00:00Z"), ("c", "2024-02-01T00:00:00Z")] {
            gateway
                .commit(WriteBatch::new().create(
                    "responseComments",
                    id,
                    json!({ "responseId": "resp-1", "createdAt": created }),
                ))
                .await
                .unwrap();
        }

        let results = gateway
            .query(
                "responseComments",
                &[Predicate::eq("responseId", "resp-1")],
                Some(&OrderBy::desc("createdAt")),
                Some(2),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["createdAt"], json!("2024-03-01T00:00:00Z"));
        assert_eq!(results[1]["createdAt"], json!("2024-02-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_permission_denied_surfaces_as_error() {
        let gateway = MemoryGateway::new();
        gateway.deny_collection("challengeResponses");
        let result = gateway.query("challengeResponses", &[], None, None).await;
        assert!(matches!(result, Err(GatewayError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_subscription_delivers_snapshot_and_cancels() {
        let gateway = MemoryGateway::new();
        gateway
            .commit(WriteBatch::new().create("challenges", "ch-1", json!({ "status": "pending" })))
            .await
            .unwrap();

        let mut sub = gateway.subscribe_doc("challenges", "ch-1").await.unwrap();
        let handle = sub.cancel_handle();

        gateway
            .commit(WriteBatch::new().update("challenges", "ch-1", json!({ "status": "accepted" })))
            .await
            .unwrap();

        let change = sub.next().await.unwrap();
        assert_eq!(change.fields["status"], json!("accepted"));

        handle.cancel();
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_subscription_ignores_other_documents() {
        let gateway = MemoryGateway::new();
        for id in ["ch-1", "ch-2"] {
            gateway
                .commit(WriteBatch::new().create("challenges", id, json!({ "status": "pending" })))
                .await
                .unwrap();
        }

        let mut sub = gateway.subscribe_doc("challenges", "ch-2").await.unwrap();
        gateway
            .commit(WriteBatch::new().update("challenges", "ch-1", json!({ "status": "declined" })))
            .await
            .unwrap();
        gateway
            .commit(WriteBatch::new().update("challenges", "ch-2", json!({ "status": "accepted" })))
            .await
            .unwrap();

        let change = sub.next().await.unwrap();
        assert_eq!(change.id, "ch-2");
        assert_eq!(change.fields["status"], json!("accepted"));
    }
}
