//! Observable notification feed for one receiver.
//!
//! The feed owns a [`watch`] channel holding the latest [`Partitioned`]
//! view. Renderers hold a receiver and redraw on change. A live feed keeps
//! the view current from the store's change feed until its [`LiveFeed`]
//! guard is dropped.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use waypost_shared::{Notification, NotificationId, UserId};
use waypost_store::DocumentStore;

use crate::error::Result;
use crate::notifications::{partition, NotificationFanout, Partitioned};
use crate::visibility::VisibilityFilter;

#[derive(Clone)]
pub struct NotificationFeed {
    receiver: UserId,
    store: Arc<dyn DocumentStore>,
    fanout: NotificationFanout,
    state: Arc<watch::Sender<Partitioned>>,
}

impl NotificationFeed {
    pub fn new(store: Arc<dyn DocumentStore>, fanout: NotificationFanout, receiver: UserId) -> Self {
        let (state, _) = watch::channel(Partitioned::default());
        Self {
            receiver,
            store,
            fanout,
            state: Arc::new(state),
        }
    }

    pub fn receiver(&self) -> &UserId {
        &self.receiver
    }

    pub fn watch(&self) -> watch::Receiver<Partitioned> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Partitioned {
        self.state.borrow().clone()
    }

    /// Drop notifications from blocked senders, split and publish.
    async fn publish(&self, list: Vec<Notification>) -> Result<()> {
        let filter = VisibilityFilter::load(self.store.as_ref(), &self.receiver).await?;
        let view = partition(filter.retain(list));
        debug!(
            user = %self.receiver,
            unread = view.unread.len(),
            read = view.read.len(),
            "Notification feed updated"
        );
        self.state.send_replace(view);
        Ok(())
    }

    /// Reload the first page from the store.
    pub async fn refresh(&self) -> Result<()> {
        let list = self.fanout.list_for_user(&self.receiver).await?;
        self.publish(list).await
    }

    /// Mark every unread notification currently shown as read, then reload.
    /// The reload happens even when some update failed, so the published
    /// view matches the store.
    pub async fn mark_all_read(&self) -> Result<usize> {
        let ids: Vec<NotificationId> = self.state.borrow().unread.iter().map(|n| n.id).collect();
        let marked = self.fanout.mark_read(&ids).await;
        let refreshed = self.refresh().await;
        let marked = marked?;
        refreshed?;
        Ok(marked)
    }

    /// Load the feed and keep it current until the guard is dropped.
    pub async fn live(&self) -> Result<LiveFeed> {
        let (initial, mut sub) = self.fanout.subscribe(&self.receiver).await?;
        self.publish(initial).await?;

        let feed = self.clone();
        let task = tokio::spawn(async move {
            while let Some(change) = sub.next().await {
                debug!(user = %feed.receiver, key = %change.key, kind = ?change.kind, "Feed change");
                if let Err(e) = feed.refresh().await {
                    warn!(user = %feed.receiver, error = %e, "Failed to refresh notification feed");
                }
            }
            debug!(user = %feed.receiver, "Change feed closed");
        });

        Ok(LiveFeed { task })
    }
}

/// Keeps a live feed subscribed. Dropping it cancels the subscription.
#[derive(Debug)]
pub struct LiveFeed {
    task: JoinHandle<()>,
}

impl LiveFeed {
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}
