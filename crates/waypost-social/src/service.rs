use std::sync::Arc;

use waypost_shared::UserId;
use waypost_store::{BlobStore, DocumentStore};

use crate::content::ContentNotifier;
use crate::feed::NotificationFeed;
use crate::notifications::NotificationFanout;
use crate::profiles::ProfileService;
use crate::relationships::RelationshipStore;

/// All social services over one document store.
#[derive(Clone)]
pub struct Social {
    store: Arc<dyn DocumentStore>,
    pub profiles: ProfileService,
    pub relationships: RelationshipStore,
    pub notifications: NotificationFanout,
    pub content: ContentNotifier,
}

impl Social {
    pub fn new(store: Arc<dyn DocumentStore>, blobs: Option<BlobStore>, page_size: usize) -> Self {
        let notifications = NotificationFanout::new(store.clone(), page_size);
        Self {
            profiles: ProfileService::new(store.clone(), blobs),
            relationships: RelationshipStore::new(store.clone(), notifications.clone()),
            content: ContentNotifier::new(store.clone(), notifications.clone()),
            notifications,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// A fresh observable feed for `receiver`.
    pub fn feed(&self, receiver: UserId) -> NotificationFeed {
        NotificationFeed::new(self.store.clone(), self.notifications.clone(), receiver)
    }
}
