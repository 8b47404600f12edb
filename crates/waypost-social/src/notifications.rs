//! Notification fan-out.
//!
//! One record per event, written to the receiver's feed by the sender-side
//! action. Records are only mutated in place when the event they describe
//! changes state (an accepted friend request), or when the receiver reads
//! them.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info};
use waypost_shared::constants::NOTIFICATIONS;
use waypost_shared::{
    Notification, NotificationId, NotificationType, PostId, RequestStatus, UserId,
};
use waypost_store::{
    encode, Direction, DocKey, Document, DocumentStore, FieldOp, Query, StoreError,
    Subscription,
};

use crate::error::{Result, SocialError};

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: NotificationType,
    pub sender: UserId,
    pub receiver: UserId,
    pub message: String,
    pub status: Option<RequestStatus>,
    pub post_id: Option<PostId>,
}

/// A receiver's notifications split by read state, each newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partitioned {
    pub unread: Vec<Notification>,
    pub read: Vec<Notification>,
}

impl Partitioned {
    pub fn has_unread(&self) -> bool {
        !self.unread.is_empty()
    }
}

/// Split into unread and read. Each side is re-sorted newest first so the
/// result does not depend on the order the store returned.
pub fn partition(list: Vec<Notification>) -> Partitioned {
    let (mut unread, mut read): (Vec<_>, Vec<_>) = list.into_iter().partition(|n| !n.is_read);
    unread.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    read.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Partitioned { unread, read }
}

fn notification_key(id: &NotificationId) -> DocKey {
    DocKey::new(NOTIFICATIONS, id)
}

fn decode_all(docs: Vec<Document>) -> Result<Vec<Notification>> {
    docs.iter()
        .map(|d| d.decode().map_err(SocialError::read))
        .collect()
}

#[derive(Clone)]
pub struct NotificationFanout {
    store: Arc<dyn DocumentStore>,
    page_size: usize,
}

impl NotificationFanout {
    pub fn new(store: Arc<dyn DocumentStore>, page_size: usize) -> Self {
        Self { store, page_size }
    }

    fn receiver_query(&self, receiver: &UserId) -> Query {
        Query::collection(NOTIFICATIONS)
            .where_eq("receiverId", receiver.as_str())
            .order_by("timestamp", Direction::Descending)
            .limit(self.page_size)
    }

    /// Append a new notification. Never merges with existing records.
    pub async fn emit(&self, new: NewNotification) -> Result<Notification> {
        let notification = Notification {
            id: NotificationId::new(),
            receiver_id: new.receiver,
            sender_id: new.sender,
            kind: new.kind,
            message: new.message,
            status: new.status,
            is_read: false,
            timestamp: Utc::now(),
            post_id: new.post_id,
        };

        let data = encode(&notification).map_err(SocialError::write)?;
        self.store
            .set(&notification_key(&notification.id), data)
            .await
            .map_err(SocialError::write)?;

        debug!(
            id = %notification.id,
            kind = notification.kind.as_str(),
            sender = %notification.sender_id,
            receiver = %notification.receiver_id,
            "Notification emitted"
        );
        Ok(notification)
    }

    /// Newest first, capped at the configured page size.
    pub async fn list_for_user(&self, receiver: &UserId) -> Result<Vec<Notification>> {
        let docs = self
            .store
            .query(&self.receiver_query(receiver))
            .await
            .map_err(SocialError::read)?;
        decode_all(docs)
    }

    pub async fn partitioned(&self, receiver: &UserId) -> Result<Partitioned> {
        Ok(partition(self.list_for_user(receiver).await?))
    }

    pub async fn has_unread(&self, receiver: &UserId) -> Result<bool> {
        let unread = self
            .store
            .query(
                &Query::collection(NOTIFICATIONS)
                    .where_eq("receiverId", receiver.as_str())
                    .where_eq("isRead", false)
                    .limit(1),
            )
            .await
            .map_err(SocialError::read)?;
        Ok(!unread.is_empty())
    }

    /// Flip `isRead` on each id with one update per document. Every update
    /// runs, concurrently. Ids whose notification no longer exists are
    /// skipped. Returns how many were marked, or the first failure once all
    /// updates have finished.
    pub async fn mark_read(&self, ids: &[NotificationId]) -> Result<usize> {
        let updates = ids.iter().map(|id| async move {
            match self
                .store
                .update(&notification_key(id), vec![FieldOp::set("isRead", true)])
                .await
            {
                Ok(()) => Ok(true),
                Err(StoreError::NotFound(_)) => {
                    debug!(id = %id, "Notification gone before it was marked read");
                    Ok(false)
                }
                Err(e) => Err(SocialError::write(e)),
            }
        });

        let mut marked = 0;
        let mut first_error = None;
        for result in join_all(updates).await {
            match result {
                Ok(true) => marked += 1,
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(marked),
        }
    }

    /// Mark every unread notification of `receiver` as read, including ones
    /// beyond the page size.
    pub async fn mark_all_read(&self, receiver: &UserId) -> Result<usize> {
        let docs = self
            .store
            .query(
                &Query::collection(NOTIFICATIONS)
                    .where_eq("receiverId", receiver.as_str())
                    .where_eq("isRead", false),
            )
            .await
            .map_err(SocialError::read)?;
        let ids: Vec<NotificationId> = decode_all(docs)?.into_iter().map(|n| n.id).collect();

        let marked = self.mark_read(&ids).await?;
        if marked > 0 {
            info!(user = %receiver, count = marked, "Notifications marked read");
        }
        Ok(marked)
    }

    /// The `friendRequest` notifications `sender` sent to `receiver`.
    pub async fn request_notifications(
        &self,
        sender: &UserId,
        receiver: &UserId,
    ) -> Result<Vec<Notification>> {
        let docs = self
            .store
            .query(
                &Query::collection(NOTIFICATIONS)
                    .where_eq("receiverId", receiver.as_str())
                    .where_eq("senderId", sender.as_str())
                    .where_eq("type", NotificationType::FriendRequest.as_str()),
            )
            .await
            .map_err(SocialError::read)?;
        decode_all(docs)
    }

    /// Rewrite the text and status of an existing notification in place.
    pub async fn rewrite(
        &self,
        id: &NotificationId,
        message: &str,
        status: Option<RequestStatus>,
    ) -> Result<()> {
        let mut ops = vec![FieldOp::set("message", message)];
        match status {
            Some(status) => ops.push(FieldOp::set("status", status.as_str())),
            None => ops.push(FieldOp::Delete("status".into())),
        }
        self.store
            .update(&notification_key(id), ops)
            .await
            .map_err(SocialError::write)
    }

    pub async fn delete(&self, id: &NotificationId) -> Result<bool> {
        self.store
            .delete(&notification_key(id))
            .await
            .map_err(SocialError::write)
    }

    /// Live view of `receiver`'s feed: current page plus a subscription to
    /// every later change.
    pub async fn subscribe(&self, receiver: &UserId) -> Result<(Vec<Notification>, Subscription)> {
        let (docs, sub) = self
            .store
            .subscribe_query(self.receiver_query(receiver))
            .await
            .map_err(SocialError::read)?;
        Ok((decode_all(docs)?, sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use waypost_store::MemoryStore;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn fanout(page_size: usize) -> NotificationFanout {
        NotificationFanout::new(Arc::new(MemoryStore::new()), page_size)
    }

    fn like(sender: &str, receiver: &str) -> NewNotification {
        NewNotification {
            kind: NotificationType::Like,
            sender: uid(sender),
            receiver: uid(receiver),
            message: format!("{sender} liked your post."),
            status: None,
            post_id: Some(PostId("p1".into())),
        }
    }

    fn at(id: u128, minutes: i64, is_read: bool) -> Notification {
        Notification {
            id: NotificationId(uuid_from(id)),
            receiver_id: uid("bob"),
            sender_id: uid("alice"),
            kind: NotificationType::Like,
            message: String::new(),
            status: None,
            is_read,
            timestamp: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap()
                + Duration::minutes(minutes),
            post_id: None,
        }
    }

    fn uuid_from(n: u128) -> uuid::Uuid {
        uuid::Uuid::from_u128(n)
    }

    #[tokio::test]
    async fn emit_then_list_for_receiver_only() {
        let fanout = fanout(50);
        fanout.emit(like("alice", "bob")).await.unwrap();
        fanout.emit(like("carol", "bob")).await.unwrap();
        fanout.emit(like("bob", "alice")).await.unwrap();

        let list = fanout.list_for_user(&uid("bob")).await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|n| n.receiver_id == uid("bob") && !n.is_read));
        assert!(list[0].timestamp >= list[1].timestamp);
    }

    #[tokio::test]
    async fn list_is_capped_by_page_size() {
        let fanout = fanout(2);
        for _ in 0..3 {
            fanout.emit(like("alice", "bob")).await.unwrap();
        }
        assert_eq!(fanout.list_for_user(&uid("bob")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn mark_all_read_clears_every_unread() {
        let fanout = fanout(2);
        for _ in 0..3 {
            fanout.emit(like("alice", "bob")).await.unwrap();
        }
        fanout.emit(like("bob", "alice")).await.unwrap();
        assert!(fanout.has_unread(&uid("bob")).await.unwrap());

        assert_eq!(fanout.mark_all_read(&uid("bob")).await.unwrap(), 3);
        assert!(!fanout.has_unread(&uid("bob")).await.unwrap());
        assert!(fanout
            .list_for_user(&uid("bob"))
            .await
            .unwrap()
            .iter()
            .all(|n| n.is_read));
        // Other receivers untouched.
        assert!(fanout.has_unread(&uid("alice")).await.unwrap());
    }

    #[tokio::test]
    async fn mark_read_skips_deleted_notifications() {
        let fanout = fanout(10);
        let kept = fanout.emit(like("alice", "bob")).await.unwrap();
        let gone = fanout.emit(like("carol", "bob")).await.unwrap();
        assert!(fanout.delete(&gone.id).await.unwrap());

        let marked = fanout
            .mark_read(&[gone.id, kept.id, NotificationId::new()])
            .await
            .unwrap();
        assert_eq!(marked, 1);
        assert!(!fanout.has_unread(&uid("bob")).await.unwrap());
    }

    #[tokio::test]
    async fn rewrite_changes_message_in_place() {
        let fanout = fanout(10);
        let n = fanout.emit(like("alice", "bob")).await.unwrap();
        fanout
            .rewrite(&n.id, "changed", Some(RequestStatus::Accepted))
            .await
            .unwrap();

        let list = fanout.list_for_user(&uid("bob")).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, n.id);
        assert_eq!(list[0].message, "changed");
        assert_eq!(list[0].status, Some(RequestStatus::Accepted));
    }

    #[test]
    fn partition_sorts_each_side_newest_first() {
        let parts = partition(vec![
            at(1, 0, false),
            at(2, 5, true),
            at(3, 10, false),
            at(4, 1, true),
        ]);
        let unread: Vec<_> = parts.unread.iter().map(|n| n.id.0.as_u128()).collect();
        let read: Vec<_> = parts.read.iter().map(|n| n.id.0.as_u128()).collect();
        assert_eq!(unread, vec![3, 1]);
        assert_eq!(read, vec![2, 4]);
        assert!(parts.has_unread());
        assert!(!partition(vec![at(5, 0, true)]).has_unread());
    }
}
