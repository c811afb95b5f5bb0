//! Persistence gateway - the document store contract consumed by the engine
//!
//! The engine never talks to a concrete database; it issues reads, filtered
//! queries, atomic multi-document batches, atomic increments, and change
//! subscriptions through this trait. Partial application of a batch is never
//! acceptable: a failed commit leaves every document untouched.
//!
//! ## Subscriptions
//!
//! `subscribe_doc` returns a [`Subscription`] delivering full document
//! snapshots (replace, not merge). Consumers obtain a [`CancelHandle`] and
//! must cancel it exactly once when they lose interest; `cancel` consumes
//! the handle so a double-cancel cannot compile.

pub mod memory;

pub use memory::MemoryGateway;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::error::GatewayError;

/// Collection names used by the engine.
pub mod collections {
    pub const CHALLENGES: &str = "challenges";
    pub const RESPONSES: &str = "challengeResponses";
    pub const COMMENTS: &str = "responseComments";
    pub const BUDDY_REQUESTS: &str = "buddyRequests";
}

//=============================================================================
// QUERIES
//=============================================================================

/// Comparison operator for query predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A single field predicate applied server-side by the gateway.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub field: String,
    pub op: FieldOp,
    pub value: Value,
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FieldOp::Eq,
            value: value.into(),
        }
    }

    /// Evaluate this predicate against a document.
    pub fn matches(&self, doc: &Value) -> bool {
        let actual = doc.get(&self.field).unwrap_or(&Value::Null);
        match self.op {
            FieldOp::Eq => actual == &self.value,
            FieldOp::Ne => actual != &self.value,
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                let (Some(a), Some(b)) = (actual.as_f64(), self.value.as_f64()) else {
                    return false;
                };
                match self.op {
                    FieldOp::Gt => a > b,
                    FieldOp::Gte => a >= b,
                    FieldOp::Lt => a < b,
                    FieldOp::Lte => a <= b,
                    _ => unreachable!(),
                }
            }
        }
    }
}

/// Result ordering for queries.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }
}

//=============================================================================
// WRITES
//=============================================================================

/// Guard checked atomically with the batch: the named field must still hold
/// the expected value or the whole batch fails.
#[derive(Debug, Clone)]
pub struct Precondition {
    pub field: String,
    pub expected: Value,
}

/// A single write inside an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Create a new document; fails if the id already exists
    Create {
        collection: String,
        id: String,
        fields: Value,
    },
    /// Merge top-level fields into an existing document
    Update {
        collection: String,
        id: String,
        fields: Value,
        precondition: Option<Precondition>,
    },
    /// Atomic numeric increment
    Increment {
        collection: String,
        id: String,
        field: String,
        delta: i64,
    },
}

/// An all-or-nothing multi-document commit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        fields: Value,
    ) -> Self {
        self.ops.push(WriteOp::Create {
            collection: collection.into(),
            id: id.into(),
            fields,
        });
        self
    }

    pub fn update(
        mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        fields: Value,
    ) -> Self {
        self.ops.push(WriteOp::Update {
            collection: collection.into(),
            id: id.into(),
            fields,
            precondition: None,
        });
        self
    }

    /// Update guarded by a field-equality precondition.
    pub fn update_guarded(
        mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        fields: Value,
        precondition: Precondition,
    ) -> Self {
        self.ops.push(WriteOp::Update {
            collection: collection.into(),
            id: id.into(),
            fields,
            precondition: Some(precondition),
        });
        self
    }

    pub fn increment(
        mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        field: impl Into<String>,
        delta: i64,
    ) -> Self {
        self.ops.push(WriteOp::Increment {
            collection: collection.into(),
            id: id.into(),
            field: field.into(),
            delta,
        });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

//=============================================================================
// SUBSCRIPTIONS
//=============================================================================

/// A change notification carrying the full post-write document snapshot.
#[derive(Debug, Clone)]
pub struct DocumentChange {
    pub collection: String,
    pub id: String,
    pub fields: Value,
}

/// One-shot cancellation handle for a subscription.
///
/// `cancel` consumes the handle; dropping it without cancelling leaves the
/// subscription live (the subscription itself keeps the channel alive).
#[derive(Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(self) {
        let _ = self.tx.send(true);
    }
}

/// A live change subscription for a single document.
pub struct Subscription {
    changes: broadcast::Receiver<DocumentChange>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    collection: String,
    id: String,
}

impl Subscription {
    pub(crate) fn new(
        changes: broadcast::Receiver<DocumentChange>,
        collection: String,
        id: String,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            changes,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            collection,
            id,
        }
    }

    /// Obtain a cancellation handle for this subscription.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Receive the next change for the watched document.
    ///
    /// Returns `None` once the subscription is cancelled or the gateway
    /// shuts down. Lagged receivers skip missed events and keep going;
    /// each delivered snapshot is complete, so skipping intermediate
    /// states cannot corrupt the consumer.
    pub async fn next(&mut self) -> Option<DocumentChange> {
        loop {
            tokio::select! {
                changed = self.cancel_rx.changed() => {
                    match changed {
                        Ok(()) if *self.cancel_rx.borrow() => return None,
                        Ok(()) => continue,
                        Err(_) => return None,
                    }
                }
                msg = self.changes.recv() => {
                    match msg {
                        Ok(change)
                            if change.collection == self.collection
                                && change.id == self.id =>
                        {
                            return Some(change);
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, collection = %self.collection, "Subscription lagged, skipped changes");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        }
    }
}

//=============================================================================
// GATEWAY CONTRACT
//=============================================================================

/// The document store contract consumed by the engine.
#[async_trait]
pub trait DocumentGateway: Send + Sync {
    /// Fetch a document by id; `Ok(None)` when absent.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, GatewayError>;

    /// Query documents matching all predicates.
    async fn query(
        &self,
        collection: &str,
        predicates: &[Predicate],
        order_by: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, GatewayError>;

    /// Apply an atomic multi-document batch; all-or-nothing.
    async fn commit(&self, batch: WriteBatch) -> Result<(), GatewayError>;

    /// Atomic numeric increment on a single field.
    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), GatewayError>;

    /// Subscribe to changes of a single document.
    ///
    /// Deliberately narrower than a predicate-based subscription: the engine
    /// only ever watches individual challenges, so the contract stays at the
    /// by-id form. A query-shaped variant can be added when a consumer needs
    /// one.
    async fn subscribe_doc(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Subscription, GatewayError>;
}

/// Query treating `PermissionDenied` as an empty result set.
///
/// Restrictive access rules legitimately deny some queries; per the error
/// policy that outcome is "no results", not a user-facing failure.
pub async fn query_or_empty(
    gateway: &dyn DocumentGateway,
    collection: &str,
    predicates: &[Predicate],
    order_by: Option<&OrderBy>,
    limit: Option<usize>,
) -> Result<Vec<Value>, GatewayError> {
    match gateway.query(collection, predicates, order_by, limit).await {
        Ok(results) => Ok(results),
        Err(GatewayError::PermissionDenied(reason)) => {
            debug!(collection = %collection, reason = %reason, "Query denied, returning empty results");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}
