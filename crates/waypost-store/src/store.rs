use async_trait::async_trait;

use crate::document::{DocKey, Document, FieldOp, Fields, Write};
use crate::error::Result;
use crate::feed::{Change, ChangeFeed, Subscription};
use crate::query::Query;

/// Transaction body: receives the documents read (in request order, `None`
/// for absent ones) and returns the writes to commit. Returning an error
/// aborts the transaction with nothing written.
pub type TxFn = Box<dyn FnOnce(&[Option<Document>]) -> Result<Vec<Write>> + Send>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &DocKey) -> Result<Option<Document>>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Apply `writes` atomically and return the changes they produced.
    async fn commit(&self, writes: Vec<Write>) -> Result<Vec<Change>>;

    /// Read `reads`, run `body` on them and commit its writes, all under one
    /// lock so no other write interleaves.
    async fn transaction(&self, reads: Vec<DocKey>, body: TxFn) -> Result<Vec<Change>>;

    fn changes(&self) -> &ChangeFeed;

    async fn set(&self, key: &DocKey, data: Fields) -> Result<()> {
        self.commit(vec![Write::Set(key.clone(), data)]).await?;
        Ok(())
    }

    async fn update(&self, key: &DocKey, ops: Vec<FieldOp>) -> Result<()> {
        self.commit(vec![Write::Update(key.clone(), ops)]).await?;
        Ok(())
    }

    async fn upsert(&self, key: &DocKey, ops: Vec<FieldOp>) -> Result<()> {
        self.commit(vec![Write::Upsert(key.clone(), ops)]).await?;
        Ok(())
    }

    /// Returns whether a document was removed.
    async fn delete(&self, key: &DocKey) -> Result<bool> {
        let changes = self.commit(vec![Write::Delete(key.clone())]).await?;
        Ok(!changes.is_empty())
    }

    async fn subscribe_document(&self, key: &DocKey) -> Result<(Option<Document>, Subscription)> {
        // Subscribe before reading so nothing committed in between is missed.
        let mut sub = self.changes().subscribe_document(key.clone());
        let snapshot = self.get(key).await?;
        sub.seed(snapshot.iter());
        Ok((snapshot, sub))
    }

    async fn subscribe_query(&self, query: Query) -> Result<(Vec<Document>, Subscription)> {
        let mut sub = self.changes().subscribe_query(query.clone());
        let snapshot = self.query(&query).await?;
        sub.seed(snapshot.iter());
        Ok((snapshot, sub))
    }
}
