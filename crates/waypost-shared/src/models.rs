//! Domain records persisted as documents in the backing store.
//!
//! Field names follow the stored document layout (camelCase, with the
//! historical `post_id` exception) so records written by older clients
//! still deserialize.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FriendRequestId, NotificationId, PostId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user profile, created at signup. `uid` never changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: UserId,
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Friend list
// ---------------------------------------------------------------------------

/// Per-user friend set. Must stay symmetric across users.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendList {
    pub friends: BTreeSet<UserId>,
}

// ---------------------------------------------------------------------------
// Block record
// ---------------------------------------------------------------------------

/// `B ∈ blocked_user_ids(A)` implies `A ∈ blocked_by_ids(B)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    #[serde(default)]
    pub blocked_user_ids: BTreeSet<UserId>,
    #[serde(default)]
    pub blocked_by_ids: BTreeSet<UserId>,
}

// ---------------------------------------------------------------------------
// Friend request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: FriendRequestId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub status: RequestStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NotificationType {
    #[serde(rename = "friendRequest")]
    FriendRequest,
    #[serde(rename = "requestAccepted")]
    RequestAccepted,
    Like,
    Comment,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FriendRequest => "friendRequest",
            Self::RequestAccepted => "requestAccepted",
            Self::Like => "Like",
            Self::Comment => "Comment",
        }
    }
}

/// One record per event; never aggregated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub receiver_id: UserId,
    pub sender_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RequestStatus>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "post_id", default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<PostId>,
}
