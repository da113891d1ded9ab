//! Remote document store contract and an in-memory implementation.
//!
//! The catalog lives in a schemaless remote store. This module captures the
//! small slice of its API the cache layer depends on: point reads, ordered
//! collection scans, batched id lookups (capped at
//! [`MAX_IDS_PER_QUERY`] ids per call), writes, and per-document change
//! listeners.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use vitrine_core::constants::MAX_IDS_PER_QUERY;
use vitrine_core::{Document, Fields, StoreError, VitrineResult};

/// Callback invoked with the new state of a watched document (`None` once
/// the document is deleted).
///
/// Listeners may be invoked from any thread and must not assume affinity
/// with the thread that registered them.
pub type DocumentListener = Arc<dyn Fn(Option<Document>) + Send + Sync>;

/// Handle for an active listener registration.
///
/// Dropping the handle (or calling [`unsubscribe`](Self::unsubscribe))
/// removes the listener.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Remote document store used as the catalog's source of truth.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point lookup by document id.
    async fn get_document(&self, collection: &str, id: &str) -> VitrineResult<Option<Document>>;

    /// Scan a collection, optionally ordered ascending by a field.
    ///
    /// When ordering, documents lacking the field are excluded.
    async fn query_collection(
        &self,
        collection: &str,
        order_by: Option<&str>,
    ) -> VitrineResult<Vec<Document>>;

    /// Fetch documents whose `id` field (or document id, if the field is
    /// absent) is in `ids`. At most [`MAX_IDS_PER_QUERY`] ids per call.
    async fn query_by_ids(&self, collection: &str, ids: &[String]) -> VitrineResult<Vec<Document>>;

    /// Create or overwrite a document.
    async fn set_document(&self, collection: &str, id: &str, fields: Fields) -> VitrineResult<()>;

    /// Delete a document. Deleting a missing document is not an error.
    async fn delete_document(&self, collection: &str, id: &str) -> VitrineResult<()>;

    /// Register a listener for changes to one document.
    ///
    /// Delivery is at-least-once while the subscription is alive, with no
    /// ordering or deduplication guarantee across rapid changes.
    fn subscribe(
        &self,
        collection: &str,
        id: &str,
        listener: DocumentListener,
    ) -> VitrineResult<Subscription>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

type DocKey = (String, String);

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    entries: HashMap<DocKey, Vec<(u64, DocumentListener)>>,
}

/// In-memory document store for tests and local development.
///
/// Behaves like the remote store for the operations above, including the
/// batched-query cap and change notifications. Listeners run synchronously
/// on the writing thread, after the write is visible.
///
/// Connectivity can be simulated with [`set_offline`](Self::set_offline) and
/// [`fail_collection`](Self::fail_collection); every read is counted per
/// collection so callers can assert on network traffic.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Fields>>>,
    listeners: Arc<Mutex<ListenerRegistry>>,
    offline: AtomicBool,
    failing: RwLock<HashSet<String>>,
    reads: Mutex<HashMap<String, u64>>,
    total_reads: AtomicU64,
}

impl InMemoryDocumentStore {
    /// An empty, online store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) connectivity to the remote store.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// True while connectivity loss is simulated.
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Make every operation on one collection fail as unavailable.
    pub fn fail_collection(&self, collection: &str) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection.to_string());
    }

    /// Undo [`fail_collection`](Self::fail_collection).
    pub fn restore_collection(&self, collection: &str) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(collection);
    }

    /// Number of reads issued against a collection.
    pub fn reads_of(&self, collection: &str) -> u64 {
        self.reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .copied()
            .unwrap_or(0)
    }

    /// Number of reads issued against all collections.
    pub fn total_reads(&self) -> u64 {
        self.total_reads.load(Ordering::SeqCst)
    }

    /// Write a document synchronously and notify listeners.
    ///
    /// This bypasses connectivity simulation; it stands in for writes made by
    /// other clients (such as the admin tooling).
    pub fn put(&self, collection: &str, id: &str, fields: Fields) {
        {
            let mut collections = self
                .collections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), fields.clone());
        }
        self.notify(collection, id, Some(Document::new(id, fields)));
    }

    /// Write a document from a JSON object literal.
    pub fn put_json(&self, collection: &str, id: &str, value: Value) {
        let doc = Document::from_json(id, value);
        self.put(collection, id, doc.fields);
    }

    /// Remove a document synchronously and notify listeners.
    pub fn remove(&self, collection: &str, id: &str) {
        let existed = {
            let mut collections = self
                .collections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            collections
                .get_mut(collection)
                .map(|docs| docs.remove(id).is_some())
                .unwrap_or(false)
        };
        if existed {
            self.notify(collection, id, None);
        }
    }

    /// Number of documents in a collection, without counting as a read.
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Number of live listeners on one document.
    pub fn listener_count(&self, collection: &str, id: &str) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(&(collection.to_string(), id.to_string()))
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn check_available(&self, collection: &str) -> VitrineResult<()> {
        if self.is_offline() {
            return Err(StoreError::Unavailable {
                reason: "remote store is unreachable".to_string(),
            }
            .into());
        }
        let failing = self.failing.read().unwrap_or_else(PoisonError::into_inner);
        if failing.contains(collection) {
            return Err(StoreError::Unavailable {
                reason: format!("collection {collection} is unavailable"),
            }
            .into());
        }
        Ok(())
    }

    fn record_read(&self, collection: &str) {
        self.total_reads.fetch_add(1, Ordering::SeqCst);
        *self
            .reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collection.to_string())
            .or_default() += 1;
    }

    fn snapshot_of(&self, collection: &str) -> Vec<Document> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn notify(&self, collection: &str, id: &str, doc: Option<Document>) {
        // Clone the listeners out so callbacks run without the registry lock;
        // a callback is free to subscribe or unsubscribe.
        let listeners: Vec<DocumentListener> = {
            let registry = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            registry
                .entries
                .get(&(collection.to_string(), id.to_string()))
                .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default()
        };
        for listener in listeners {
            listener(doc.clone());
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> CmpOrdering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        // Mixed types: numbers sort before strings, everything else after.
        (Value::Number(_), _) => CmpOrdering::Less,
        (_, Value::Number(_)) => CmpOrdering::Greater,
        (Value::String(_), _) => CmpOrdering::Less,
        (_, Value::String(_)) => CmpOrdering::Greater,
        _ => CmpOrdering::Equal,
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_document(&self, collection: &str, id: &str) -> VitrineResult<Option<Document>> {
        self.check_available(collection)?;
        self.record_read(collection);
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn query_collection(
        &self,
        collection: &str,
        order_by: Option<&str>,
    ) -> VitrineResult<Vec<Document>> {
        self.check_available(collection)?;
        self.record_read(collection);
        let docs = self.snapshot_of(collection);

        let Some(field) = order_by else {
            return Ok(docs);
        };

        let mut ordered: Vec<Document> = docs
            .into_iter()
            .filter(|doc| doc.get(field).is_some_and(|v| !v.is_null()))
            .collect();
        // Stable sort keeps document-id order among equal keys.
        ordered.sort_by(|a, b| match (a.get(field), b.get(field)) {
            (Some(x), Some(y)) => compare_values(x, y),
            _ => CmpOrdering::Equal,
        });
        Ok(ordered)
    }

    async fn query_by_ids(&self, collection: &str, ids: &[String]) -> VitrineResult<Vec<Document>> {
        if ids.len() > MAX_IDS_PER_QUERY {
            return Err(StoreError::BatchTooLarge {
                limit: MAX_IDS_PER_QUERY,
                got: ids.len(),
            }
            .into());
        }
        self.check_available(collection)?;
        self.record_read(collection);

        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        Ok(self
            .snapshot_of(collection)
            .into_iter()
            .filter(|doc| {
                let key = doc.get_str("id").unwrap_or(doc.id.as_str());
                wanted.contains(key)
            })
            .collect())
    }

    async fn set_document(&self, collection: &str, id: &str, fields: Fields) -> VitrineResult<()> {
        self.check_available(collection)?;
        self.put(collection, id, fields);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> VitrineResult<()> {
        self.check_available(collection)?;
        self.remove(collection, id);
        Ok(())
    }

    fn subscribe(
        &self,
        collection: &str,
        id: &str,
        listener: DocumentListener,
    ) -> VitrineResult<Subscription> {
        let key: DocKey = (collection.to_string(), id.to_string());
        let listener_id = {
            let mut registry = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            registry.next_id += 1;
            let listener_id = registry.next_id;
            registry
                .entries
                .entry(key.clone())
                .or_default()
                .push((listener_id, listener));
            listener_id
        };

        let registry = Arc::downgrade(&self.listeners);
        Ok(Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(entries) = registry.entries.get_mut(&key) {
                    entries.retain(|(existing, _)| *existing != listener_id);
                    if entries.is_empty() {
                        registry.entries.remove(&key);
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use vitrine_core::VitrineError;

    fn seeded() -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::new();
        store.put_json("categories", "rings", json!({ "name": "Rings", "order": 2 }));
        store.put_json("categories", "chains", json!({ "name": "Chains", "order": 1 }));
        store.put_json("categories", "drafts", json!({ "name": "Drafts" }));
        store
    }

    #[tokio::test]
    async fn test_order_by_excludes_documents_without_field() {
        let store = seeded();
        let docs = store
            .query_collection("categories", Some("order"))
            .await
            .unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["chains", "rings"]);

        let all = store.query_collection("categories", None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_query_by_ids_enforces_cap() {
        let store = InMemoryDocumentStore::new();
        let ids: Vec<String> = (0..11).map(|i| format!("p{i}")).collect();
        let err = store.query_by_ids("products", &ids).await.unwrap_err();
        assert_eq!(
            err,
            VitrineError::Store(StoreError::BatchTooLarge { limit: 10, got: 11 })
        );
    }

    #[tokio::test]
    async fn test_query_by_ids_matches_id_field() {
        let store = InMemoryDocumentStore::new();
        store.put_json("products", "doc-a", json!({ "id": "p1", "name": "A" }));
        store.put_json("products", "p2", json!({ "name": "B" }));
        store.put_json("products", "p3", json!({ "name": "C" }));

        let docs = store
            .query_by_ids("products", &["p1".to_string(), "p2".to_string()])
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn test_offline_and_failing_collections() {
        let store = seeded();
        store.set_offline(true);
        let err = store.get_document("categories", "rings").await.unwrap_err();
        assert!(err.is_transient());

        store.set_offline(false);
        store.fail_collection("categories");
        assert!(store.query_collection("categories", None).await.is_err());

        store.restore_collection("categories");
        assert!(store.query_collection("categories", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_reads_are_counted() {
        let store = seeded();
        store.get_document("categories", "rings").await.unwrap();
        store.query_collection("categories", None).await.unwrap();
        store.get_document("metadata", "cache_control").await.unwrap();

        assert_eq!(store.reads_of("categories"), 2);
        assert_eq!(store.reads_of("metadata"), 1);
        assert_eq!(store.total_reads(), 3);
    }

    #[test]
    fn test_listener_notified_until_unsubscribed() {
        let store = InMemoryDocumentStore::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let subscription = store
            .subscribe(
                "metadata",
                "cache_control",
                Arc::new(move |doc| {
                    if doc.is_some() {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            )
            .unwrap();
        assert_eq!(store.listener_count("metadata", "cache_control"), 1);

        store.put_json("metadata", "cache_control", json!({ "version": "1" }));
        store.put_json("metadata", "other", json!({ "version": "9" }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        subscription.unsubscribe();
        assert_eq!(store.listener_count("metadata", "cache_control"), 0);

        store.put_json("metadata", "cache_control", json!({ "version": "2" }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let store = InMemoryDocumentStore::new();
        {
            let _subscription = store
                .subscribe("metadata", "cache_control", Arc::new(|_| {}))
                .unwrap();
            assert_eq!(store.listener_count("metadata", "cache_control"), 1);
        }
        assert_eq!(store.listener_count("metadata", "cache_control"), 0);
    }
}
