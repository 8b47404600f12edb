//! The single block predicate every listing surface filters through.
//!
//! A viewer never sees content authored by someone they blocked, nor by
//! someone who blocked them. Both directions are read from the viewer's own
//! [`BlockRecord`], which the block transaction keeps in step with the other
//! side.

use std::collections::BTreeSet;

use waypost_shared::constants::BLOCKS;
use waypost_shared::{BlockRecord, FriendRequest, Notification, User, UserId};
use waypost_store::{DocKey, DocumentStore};

use crate::error::{Result, SocialError};

/// Anything with an author whose visibility depends on blocks.
pub trait Authored {
    fn author_id(&self) -> &UserId;
}

impl Authored for Notification {
    fn author_id(&self) -> &UserId {
        &self.sender_id
    }
}

impl Authored for FriendRequest {
    fn author_id(&self) -> &UserId {
        &self.sender_id
    }
}

impl Authored for User {
    fn author_id(&self) -> &UserId {
        &self.uid
    }
}

/// Read a user's block record; a user who never blocked anyone has none.
pub async fn load_block_record(store: &dyn DocumentStore, uid: &UserId) -> Result<BlockRecord> {
    let doc = store
        .get(&DocKey::new(BLOCKS, uid))
        .await
        .map_err(SocialError::read)?;
    match doc {
        Some(doc) => doc.decode().map_err(SocialError::read),
        None => Ok(BlockRecord::default()),
    }
}

/// `viewer`'s block view, loaded once and applied to any number of items.
#[derive(Debug, Clone)]
pub struct VisibilityFilter {
    viewer: UserId,
    hidden: BTreeSet<UserId>,
}

impl VisibilityFilter {
    pub fn from_record(viewer: UserId, record: &BlockRecord) -> Self {
        let hidden = record
            .blocked_user_ids
            .union(&record.blocked_by_ids)
            .cloned()
            .collect();
        Self { viewer, hidden }
    }

    pub async fn load(store: &dyn DocumentStore, viewer: &UserId) -> Result<Self> {
        let record = load_block_record(store, viewer).await?;
        Ok(Self::from_record(viewer.clone(), &record))
    }

    pub fn viewer(&self) -> &UserId {
        &self.viewer
    }

    pub fn is_blocked(&self, author: &UserId) -> bool {
        self.hidden.contains(author)
    }

    pub fn retain<T: Authored>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .filter(|item| !self.is_blocked(item.author_id()))
            .collect()
    }
}

/// `true` when either side has blocked the other.
pub async fn is_blocked(
    store: &dyn DocumentStore,
    viewer: &UserId,
    author: &UserId,
) -> Result<bool> {
    Ok(VisibilityFilter::load(store, viewer).await?.is_blocked(author))
}
