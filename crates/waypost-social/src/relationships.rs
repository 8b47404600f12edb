//! Friend lists, block lists and friend requests.
//!
//! Invariants kept here:
//! - friendship is symmetric: both friend lists change in the same commit;
//! - `B ∈ blockedUserIds(A)` iff `A ∈ blockedByIds(B)`: both block records
//!   change in the same transaction;
//! - blocked users are never friends: blocking drops the friendship in that
//!   same transaction, and requests cannot be sent or accepted across a block.
//!
//! A friend request moves `pending → accepted` or is deleted. There is no
//! declined state; deleting is how a receiver turns a request down.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use waypost_shared::constants::{
    friend_request_message, now_friends_message, request_accepted_message, BLOCKS, FRIENDS,
    FRIEND_REQUESTS, NOTIFICATIONS,
};
use waypost_shared::{
    BlockRecord, FriendList, FriendRequest, FriendRequestId, NotificationType, RequestStatus,
    UserId,
};
use waypost_store::{
    encode, Direction, DocKey, Document, DocumentStore, FieldOp, Query, StoreError, Write,
};

use crate::error::{Result, SocialError};
use crate::notifications::{NewNotification, NotificationFanout};
use crate::profiles::display_name;
use crate::visibility::{load_block_record, VisibilityFilter};

fn friends_key(uid: &UserId) -> DocKey {
    DocKey::new(FRIENDS, uid)
}

fn blocks_key(uid: &UserId) -> DocKey {
    DocKey::new(BLOCKS, uid)
}

fn request_key(id: &FriendRequestId) -> DocKey {
    DocKey::new(FRIEND_REQUESTS, id)
}

/// Decode a friend list read inside a transaction. A missing document or a
/// body without a `friends` array aborts.
fn friend_list_in_tx(doc: Option<&Document>, owner: &UserId) -> waypost_store::Result<FriendList> {
    let doc = doc.ok_or_else(|| StoreError::Aborted(format!("friend list of {owner} is missing")))?;
    doc.decode()
        .map_err(|_| StoreError::Aborted(format!("friend list of {owner} is malformed")))
}

/// Drop `other` from `owner`'s friend list as part of a block. A list whose
/// `friends` field is not an array is left alone so the block still goes
/// through.
fn unfriend_on_block(doc: Option<&Document>, owner: &UserId, other: &UserId) -> Option<Write> {
    let doc = doc?;
    match doc.data.get("friends") {
        Some(friends) if friends.is_array() => Some(Write::Update(
            friends_key(owner),
            vec![FieldOp::remove("friends", other.as_str())],
        )),
        _ => {
            warn!(user = %owner, "Friend list is malformed, skipping unfriend on block");
            None
        }
    }
}

#[derive(Clone)]
pub struct RelationshipStore {
    store: Arc<dyn DocumentStore>,
    notifications: NotificationFanout,
}

impl RelationshipStore {
    pub fn new(store: Arc<dyn DocumentStore>, notifications: NotificationFanout) -> Self {
        Self {
            store,
            notifications,
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// A user with no friend list document has no friends.
    pub async fn friends(&self, uid: &UserId) -> Result<BTreeSet<UserId>> {
        let doc = self
            .store
            .get(&friends_key(uid))
            .await
            .map_err(SocialError::read)?;
        match doc {
            Some(doc) => Ok(doc.decode::<FriendList>().map_err(SocialError::read)?.friends),
            None => Ok(BTreeSet::new()),
        }
    }

    pub async fn are_friends(&self, a: &UserId, b: &UserId) -> Result<bool> {
        Ok(self.friends(a).await?.contains(b))
    }

    pub async fn block_record(&self, uid: &UserId) -> Result<BlockRecord> {
        load_block_record(self.store.as_ref(), uid).await
    }

    pub async fn visibility(&self, viewer: &UserId) -> Result<VisibilityFilter> {
        VisibilityFilter::load(self.store.as_ref(), viewer).await
    }

    /// Whether `viewer` must not see content by `author`.
    pub async fn is_blocked(&self, viewer: &UserId, author: &UserId) -> Result<bool> {
        Ok(self.visibility(viewer).await?.is_blocked(author))
    }

    pub async fn get_friend_request(&self, id: &FriendRequestId) -> Result<Option<FriendRequest>> {
        let doc = self
            .store
            .get(&request_key(id))
            .await
            .map_err(SocialError::read)?;
        doc.map(|d| d.decode().map_err(SocialError::read)).transpose()
    }

    /// Pending requests addressed to `uid`, newest first.
    pub async fn incoming_requests(&self, uid: &UserId) -> Result<Vec<FriendRequest>> {
        let docs = self
            .store
            .query(
                &Query::collection(FRIEND_REQUESTS)
                    .where_eq("receiverId", uid.as_str())
                    .where_eq("status", RequestStatus::Pending.as_str())
                    .order_by("timestamp", Direction::Descending),
            )
            .await
            .map_err(SocialError::read)?;
        docs.iter()
            .map(|d| d.decode().map_err(SocialError::read))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Friend requests
    // -----------------------------------------------------------------------

    /// Record a pending request and notify the receiver. Sending again to
    /// the same receiver overwrites the earlier request.
    pub async fn send_friend_request(
        &self,
        sender: &UserId,
        receiver: &UserId,
    ) -> Result<FriendRequest> {
        if sender == receiver {
            return Err(SocialError::SelfRelation);
        }
        if self.is_blocked(sender, receiver).await? {
            return Err(SocialError::AlreadyBlocked(receiver.clone()));
        }
        if self.are_friends(sender, receiver).await? {
            return Err(SocialError::AlreadyFriends(receiver.clone()));
        }

        let request = FriendRequest {
            id: FriendRequestId::new(sender, receiver),
            sender_id: sender.clone(),
            receiver_id: receiver.clone(),
            status: RequestStatus::Pending,
            timestamp: Utc::now(),
        };
        let data = encode(&request).map_err(SocialError::write)?;
        self.store
            .set(&request_key(&request.id), data)
            .await
            .map_err(SocialError::write)?;

        let sender_name = display_name(self.store.as_ref(), sender).await?;
        self.notifications
            .emit(NewNotification {
                kind: NotificationType::FriendRequest,
                sender: sender.clone(),
                receiver: receiver.clone(),
                message: friend_request_message(&sender_name),
                status: Some(RequestStatus::Pending),
                post_id: None,
            })
            .await?;

        info!(sender = %sender, receiver = %receiver, "Friend request sent");
        Ok(request)
    }

    /// Accept a pending request: mark it accepted, add each user to the
    /// other's friend list, rewrite the receiver's request notification and
    /// notify the sender. Accepting an already accepted request changes
    /// nothing.
    pub async fn accept_friend_request(
        &self,
        request_id: &FriendRequestId,
        receiver: &UserId,
        sender: &UserId,
    ) -> Result<FriendRequest> {
        if request_id.sender() != sender || request_id.receiver() != receiver {
            return Err(SocialError::InvalidInput(format!(
                "request {request_id} is not from {sender} to {receiver}"
            )));
        }

        let mut request = self
            .get_friend_request(request_id)
            .await?
            .ok_or_else(|| SocialError::RequestNotFound(request_id.clone()))?;

        if request.status == RequestStatus::Accepted {
            debug!(request = %request_id, "Friend request already accepted");
            return Ok(request);
        }
        if self.is_blocked(receiver, sender).await? {
            return Err(SocialError::AlreadyBlocked(sender.clone()));
        }

        self.store
            .commit(vec![
                Write::Update(
                    request_key(request_id),
                    vec![FieldOp::set("status", RequestStatus::Accepted.as_str())],
                ),
                Write::Upsert(
                    friends_key(receiver),
                    vec![FieldOp::union("friends", sender.as_str())],
                ),
                Write::Upsert(
                    friends_key(sender),
                    vec![FieldOp::union("friends", receiver.as_str())],
                ),
            ])
            .await
            .map_err(SocialError::write)?;
        request.status = RequestStatus::Accepted;

        let sender_name = display_name(self.store.as_ref(), sender).await?;
        let receiver_name = display_name(self.store.as_ref(), receiver).await?;

        for original in self.notifications.request_notifications(sender, receiver).await? {
            self.notifications
                .rewrite(
                    &original.id,
                    &now_friends_message(&sender_name),
                    Some(RequestStatus::Accepted),
                )
                .await?;
        }

        self.notifications
            .emit(NewNotification {
                kind: NotificationType::RequestAccepted,
                sender: receiver.clone(),
                receiver: sender.clone(),
                message: request_accepted_message(&receiver_name),
                status: Some(RequestStatus::Accepted),
                post_id: None,
            })
            .await?;

        info!(sender = %sender, receiver = %receiver, "Friend request accepted");
        Ok(request)
    }

    /// Remove a request and the notification it produced. Friend lists are
    /// not touched. Returns whether the request existed.
    pub async fn delete_friend_request(&self, request_id: &FriendRequestId) -> Result<bool> {
        let related = self
            .notifications
            .request_notifications(request_id.sender(), request_id.receiver())
            .await?;

        let mut writes = vec![Write::Delete(request_key(request_id))];
        writes.extend(
            related
                .iter()
                .map(|n| Write::Delete(DocKey::new(NOTIFICATIONS, n.id))),
        );

        let changes = self.store.commit(writes).await.map_err(SocialError::write)?;
        let existed = changes.iter().any(|c| c.key.collection == FRIEND_REQUESTS);

        info!(
            request = %request_id,
            existed,
            notifications = related.len(),
            "Friend request deleted"
        );
        Ok(existed)
    }

    // -----------------------------------------------------------------------
    // Friendship and blocks
    // -----------------------------------------------------------------------

    /// Drop the friendship on both sides in one transaction. Aborts without
    /// writing if either friend list is missing or malformed.
    pub async fn remove_friend(&self, a: &UserId, b: &UserId) -> Result<()> {
        if a == b {
            return Err(SocialError::SelfRelation);
        }
        let (ua, ub) = (a.clone(), b.clone());

        self.store
            .transaction(
                vec![friends_key(a), friends_key(b)],
                Box::new(move |docs: &[Option<Document>]| {
                    friend_list_in_tx(docs[0].as_ref(), &ua)?;
                    friend_list_in_tx(docs[1].as_ref(), &ub)?;
                    Ok(vec![
                        Write::Update(friends_key(&ua), vec![FieldOp::remove("friends", ub.as_str())]),
                        Write::Update(friends_key(&ub), vec![FieldOp::remove("friends", ua.as_str())]),
                    ])
                }),
            )
            .await
            .map_err(SocialError::write)?;

        info!(user = %a, friend = %b, "Friend removed");
        Ok(())
    }

    /// Block `target` for `current`. Both block records and, if they were
    /// friends, both friend lists change in one transaction.
    pub async fn block_user(&self, current: &UserId, target: &UserId) -> Result<()> {
        if current == target {
            return Err(SocialError::SelfRelation);
        }
        let (me, them) = (current.clone(), target.clone());

        self.store
            .transaction(
                vec![friends_key(current), friends_key(target)],
                Box::new(move |docs: &[Option<Document>]| {
                    let mut writes = vec![
                        Write::Upsert(
                            blocks_key(&me),
                            vec![FieldOp::union("blockedUserIds", them.as_str())],
                        ),
                        Write::Upsert(
                            blocks_key(&them),
                            vec![FieldOp::union("blockedByIds", me.as_str())],
                        ),
                    ];
                    for (doc, owner, other) in [(&docs[0], &me, &them), (&docs[1], &them, &me)] {
                        if let Some(write) = unfriend_on_block(doc.as_ref(), owner, other) {
                            writes.push(write);
                        }
                    }
                    Ok(writes)
                }),
            )
            .await
            .map_err(SocialError::write)?;

        info!(user = %current, blocked = %target, "User blocked");
        Ok(())
    }

    /// Inverse of [`Self::block_user`]. Does not restore a friendship.
    pub async fn unblock_user(&self, current: &UserId, target: &UserId) -> Result<()> {
        if current == target {
            return Err(SocialError::SelfRelation);
        }

        self.store
            .commit(vec![
                Write::Upsert(
                    blocks_key(current),
                    vec![FieldOp::remove("blockedUserIds", target.as_str())],
                ),
                Write::Upsert(
                    blocks_key(target),
                    vec![FieldOp::remove("blockedByIds", current.as_str())],
                ),
            ])
            .await
            .map_err(SocialError::write)?;

        info!(user = %current, unblocked = %target, "User unblocked");
        Ok(())
    }
}
