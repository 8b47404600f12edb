//! Change feed and live subscriptions.
//!
//! Every committed write is published once on a [`ChangeFeed`]. A
//! [`Subscription`] filters the feed down to one document or one query and
//! reports changes relative to that target: a document that starts matching
//! a query arrives as `Added`, one that stops matching as `Removed`.
//!
//! Dropping a `Subscription` cancels it.

use std::collections::HashSet;

use tokio::sync::broadcast;

use crate::document::{DocKey, Document, Staged};
use crate::query::Query;

const FEED_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub kind: ChangeKind,
    pub key: DocKey,
    /// Contents after the change; `None` once removed.
    pub document: Option<Document>,
}

impl Change {
    /// Translate a staged write into the change it produced, if any.
    pub fn from_staged(staged: &Staged) -> Option<Self> {
        let kind = match (&staged.before, &staged.after) {
            (None, None) => return None,
            (None, Some(_)) => ChangeKind::Added,
            (Some(before), Some(after)) if before == after => return None,
            (Some(_), Some(_)) => ChangeKind::Modified,
            (Some(_), None) => ChangeKind::Removed,
        };
        Some(Self {
            kind,
            key: staged.key.clone(),
            document: staged.after.clone().map(|data| Document {
                key: staged.key.clone(),
                data,
            }),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Change>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, changes: &[Change]) {
        for change in changes {
            // No receivers is fine.
            let _ = self.tx.send(change.clone());
        }
    }

    pub fn subscribe_document(&self, key: DocKey) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            target: Target::Document(key),
            members: HashSet::new(),
        }
    }

    /// The returned subscription must be seeded with the snapshot taken after
    /// subscribing, so later changes are classified against it.
    pub fn subscribe_query(&self, query: Query) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            target: Target::Query(query),
            members: HashSet::new(),
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
enum Target {
    Document(DocKey),
    Query(Query),
}

#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Change>,
    target: Target,
    members: HashSet<String>,
}

impl Subscription {
    /// Record the ids in the snapshot handed to the subscriber.
    pub(crate) fn seed<'a>(&mut self, docs: impl IntoIterator<Item = &'a Document>) {
        self.members.extend(docs.into_iter().map(|d| d.key.id.clone()));
    }

    /// Wait for the next change relevant to this subscription. Returns
    /// `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Change> {
        loop {
            let change = match self.rx.recv().await {
                Ok(change) => change,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscription lagged behind change feed");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            };

            if let Some(change) = self.classify(change) {
                return Some(change);
            }
        }
    }

    fn classify(&mut self, change: Change) -> Option<Change> {
        match &self.target {
            Target::Document(key) => (change.key == *key).then_some(change),
            Target::Query(query) => {
                if change.key.collection != query.collection {
                    return None;
                }
                let was = self.members.contains(&change.key.id);
                let now = change.document.as_ref().is_some_and(|d| query.matches(d));
                let kind = match (was, now) {
                    (false, false) => return None,
                    (false, true) => {
                        self.members.insert(change.key.id.clone());
                        ChangeKind::Added
                    }
                    (true, true) => ChangeKind::Modified,
                    (true, false) => {
                        self.members.remove(&change.key.id);
                        ChangeKind::Removed
                    }
                };
                Some(Change { kind, ..change })
            }
        }
    }
}
