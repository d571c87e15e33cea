//! In-process [`DocumentStore`] backed by a `tokio` read-write lock.
//!
//! Records are iterated in insertion order. `iterate` takes a snapshot, so a listing running
//! concurrently with writes never observes a half-applied change.
use super::{Document, DocumentStore, DocumentStream, ID_FIELD, ObjectId, StoreError};
use futures_util::StreamExt;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::trace;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Records>,
}

#[derive(Debug, Default)]
struct Records {
    next_seq: u64,
    by_seq: BTreeMap<u64, Document>,
    seq_by_id: HashMap<ObjectId, u64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_seq.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn with_id(mut document: Document, id: &ObjectId) -> Document {
    document.insert(ID_FIELD.to_string(), serde_json::Value::String(id.to_string()));
    document
}

#[tonic::async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert(&self, document: Document) -> Result<ObjectId, StoreError> {
        let id = ObjectId::new();
        let mut records = self.inner.write().await;

        let seq = records.next_seq;
        records.next_seq += 1;
        records.by_seq.insert(seq, with_id(document, &id));
        records.seq_by_id.insert(id, seq);

        trace!(%id, "record inserted");
        Ok(id)
    }

    async fn find_one(&self, id: &ObjectId) -> Result<Option<Document>, StoreError> {
        let records = self.inner.read().await;
        let document = records
            .seq_by_id
            .get(id)
            .and_then(|seq| records.by_seq.get(seq))
            .cloned();
        Ok(document)
    }

    async fn replace(&self, id: &ObjectId, document: Document) -> Result<bool, StoreError> {
        let mut records = self.inner.write().await;
        let Some(seq) = records.seq_by_id.get(id).copied() else {
            return Ok(false);
        };
        records.by_seq.insert(seq, with_id(document, id));
        Ok(true)
    }

    async fn delete(&self, id: &ObjectId) -> Result<u64, StoreError> {
        let mut records = self.inner.write().await;
        let removed = records
            .seq_by_id
            .remove(id)
            .and_then(|seq| records.by_seq.remove(&seq));
        Ok(u64::from(removed.is_some()))
    }

    async fn iterate(&self) -> Result<DocumentStream, StoreError> {
        let snapshot: Vec<Document> = self.inner.read().await.by_seq.values().cloned().collect();
        Ok(futures_util::stream::iter(snapshot.into_iter().map(Ok)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_id_field() {
        let store = InMemoryStore::new();
        let id = store.insert(doc(json!({ "title": "a" }))).await.unwrap();

        let found = store.find_one(&id).await.unwrap().unwrap();
        assert_eq!(found[ID_FIELD], json!(id.to_string()));
        assert_eq!(found["title"], json!("a"));
    }

    #[tokio::test]
    async fn test_replace_and_delete_absent_record() {
        let store = InMemoryStore::new();
        let absent = ObjectId::new();

        assert!(!store.replace(&absent, Document::new()).await.unwrap());
        assert_eq!(store.delete(&absent).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replace_keeps_identifier() {
        let store = InMemoryStore::new();
        let id = store.insert(doc(json!({ "title": "a" }))).await.unwrap();

        let replaced = store
            .replace(&id, doc(json!({ "_id": "forged", "title": "b" })))
            .await
            .unwrap();
        assert!(replaced);

        let found = store.find_one(&id).await.unwrap().unwrap();
        assert_eq!(found[ID_FIELD], json!(id.to_string()));
        assert_eq!(found["title"], json!("b"));
    }

    #[tokio::test]
    async fn test_iterate_in_insertion_order() {
        let store = InMemoryStore::new();
        for title in ["first", "second", "third"] {
            store.insert(doc(json!({ "title": title }))).await.unwrap();
        }
        let id = store.insert(doc(json!({ "title": "gone" }))).await.unwrap();
        assert_eq!(store.delete(&id).await.unwrap(), 1);

        let titles: Vec<_> = store
            .iterate()
            .await
            .unwrap()
            .map(|doc| doc.unwrap()["title"].clone())
            .collect()
            .await;

        assert_eq!(titles, vec![json!("first"), json!("second"), json!("third")]);
        assert_eq!(store.len().await, 3);
    }
}
