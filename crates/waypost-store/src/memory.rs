//! In-process backend. Used by tests and by servers started with
//! `DATABASE_PATH=:memory:`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{stage_writes, DocKey, Document, Fields, Staged, Write};
use crate::error::Result;
use crate::feed::{Change, ChangeFeed};
use crate::query::Query;
use crate::store::{DocumentStore, TxFn};

#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<DocKey, Fields>>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply(docs: &mut HashMap<DocKey, Fields>, staged: Vec<Staged>) -> Vec<Change> {
    let changes: Vec<Change> = staged.iter().filter_map(Change::from_staged).collect();
    for s in staged {
        match s.after {
            Some(data) => {
                docs.insert(s.key, data);
            }
            None => {
                docs.remove(&s.key);
            }
        }
    }
    changes
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, key: &DocKey) -> Result<Option<Document>> {
        let docs = self.docs.read().await;
        Ok(docs.get(key).map(|data| Document {
            key: key.clone(),
            data: data.clone(),
        }))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let docs = self.docs.read().await;
        let mut out: Vec<Document> = docs
            .iter()
            .filter(|(key, _)| key.collection == query.collection)
            .map(|(key, data)| Document {
                key: key.clone(),
                data: data.clone(),
            })
            .filter(|doc| query.matches(doc))
            .collect();
        query.sort_and_limit(&mut out);
        Ok(out)
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<Vec<Change>> {
        let changes = {
            let mut docs = self.docs.write().await;
            let staged = stage_writes(|key| Ok(docs.get(key).cloned()), writes)?;
            apply(&mut docs, staged)
        };
        self.feed.publish(&changes);
        Ok(changes)
    }

    async fn transaction(&self, reads: Vec<DocKey>, body: TxFn) -> Result<Vec<Change>> {
        let changes = {
            let mut docs = self.docs.write().await;
            let snapshot: Vec<Option<Document>> = reads
                .into_iter()
                .map(|key| {
                    docs.get(&key).map(|data| Document {
                        key: key.clone(),
                        data: data.clone(),
                    })
                })
                .collect();
            let writes = body(&snapshot)?;
            let staged = stage_writes(|key| Ok(docs.get(key).cloned()), writes)?;
            apply(&mut docs, staged)
        };
        self.feed.publish(&changes);
        Ok(changes)
    }

    fn changes(&self) -> &ChangeFeed {
        &self.feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FieldOp;
    use crate::error::StoreError;
    use crate::feed::ChangeKind;
    use crate::query::Direction;
    use serde_json::json;

    fn body(v: serde_json::Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemoryStore::new();
        let key = DocKey::new("users", "alice");

        store.set(&key, body(json!({ "name": "Alice" }))).await.unwrap();
        let doc = store.get(&key).await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "Alice");

        assert!(store.delete(&key).await.unwrap());
        assert!(!store.delete(&key).await.unwrap());
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_requires_existing_document() {
        let store = MemoryStore::new();
        let key = DocKey::new("friends", "alice");
        let err = store
            .update(&key, vec![FieldOp::union("friends", "bob")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        store
            .upsert(&key, vec![FieldOp::union("friends", "bob")])
            .await
            .unwrap();
        let doc = store.get(&key).await.unwrap().unwrap();
        assert_eq!(doc.data["friends"], json!(["bob"]));
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        for (id, receiver, ts) in [("n1", "bob", 1), ("n2", "bob", 3), ("n3", "eve", 2), ("n4", "bob", 2)] {
            store
                .set(
                    &DocKey::new("notifications", id),
                    body(json!({ "receiverId": receiver, "timestamp": ts })),
                )
                .await
                .unwrap();
        }

        let q = Query::collection("notifications")
            .where_eq("receiverId", "bob")
            .order_by("timestamp", Direction::Descending)
            .limit(2);
        let ids: Vec<_> = store
            .query(&q)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.key.id)
            .collect();
        assert_eq!(ids, vec!["n2", "n4"]);
    }

    #[tokio::test]
    async fn aborted_transaction_writes_nothing() {
        let store = MemoryStore::new();
        let a = DocKey::new("friends", "a");
        store.set(&a, body(json!({ "friends": ["b"] }))).await.unwrap();

        let err = store
            .transaction(
                vec![a.clone(), DocKey::new("friends", "b")],
                Box::new(|docs: &[Option<Document>]| {
                    if docs.iter().any(|d| d.is_none()) {
                        return Err(StoreError::Aborted("missing friend list".into()));
                    }
                    Ok(vec![])
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Aborted(_)));

        let doc = store.get(&a).await.unwrap().unwrap();
        assert_eq!(doc.data["friends"], json!(["b"]));
    }

    #[tokio::test]
    async fn transaction_commits_all_writes() {
        let store = MemoryStore::new();
        let a = DocKey::new("friends", "a");
        let b = DocKey::new("friends", "b");
        store.set(&a, body(json!({ "friends": ["b"] }))).await.unwrap();
        store.set(&b, body(json!({ "friends": ["a"] }))).await.unwrap();

        let (ka, kb) = (a.clone(), b.clone());
        let changes = store
            .transaction(
                vec![a.clone(), b.clone()],
                Box::new(move |_: &[Option<Document>]| {
                    Ok(vec![
                        Write::Update(ka, vec![FieldOp::remove("friends", "b")]),
                        Write::Update(kb, vec![FieldOp::remove("friends", "a")]),
                    ])
                }),
            )
            .await
            .unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(store.get(&a).await.unwrap().unwrap().data["friends"], json!([]));
        assert_eq!(store.get(&b).await.unwrap().unwrap().data["friends"], json!([]));
    }

    #[tokio::test]
    async fn live_query_sees_subsequent_writes() {
        let store = MemoryStore::new();
        let key = DocKey::new("notifications", "n1");
        store
            .set(&key, body(json!({ "receiverId": "bob", "isRead": false })))
            .await
            .unwrap();

        let (snapshot, mut sub) = store
            .subscribe_query(Query::collection("notifications").where_eq("receiverId", "bob"))
            .await
            .unwrap();
        assert_eq!(snapshot.len(), 1);

        store
            .update(&key, vec![FieldOp::set("isRead", true)])
            .await
            .unwrap();
        let change = sub.next().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Modified);

        store
            .set(
                &DocKey::new("notifications", "n2"),
                body(json!({ "receiverId": "bob" })),
            )
            .await
            .unwrap();
        let change = sub.next().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Added);
        assert_eq!(change.key.id, "n2");
    }
}
