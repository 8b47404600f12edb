use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::REQUEST_ID_SEPARATOR;
use crate::error::IdError;

// User identity = opaque uid issued by the auth provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap a uid.
    ///
    /// The request separator and `/` are rejected so a uid can always be
    /// recovered from a composite friend request key.
    pub fn new(raw: impl Into<String>) -> Result<Self, IdError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(IdError::Empty);
        }
        if let Some(c) = raw
            .chars()
            .find(|c| *c == REQUEST_ID_SEPARATOR || *c == '/')
        {
            return Err(IdError::ReservedChar(c));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::str::FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PostId(pub String);

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Composite `senderId_receiverId` key. One outstanding request per ordered
/// pair: sending again overwrites the same record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct FriendRequestId {
    sender: UserId,
    receiver: UserId,
}

impl FriendRequestId {
    pub fn new(sender: &UserId, receiver: &UserId) -> Self {
        Self {
            sender: sender.clone(),
            receiver: receiver.clone(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, IdError> {
        let (sender, receiver) = s
            .split_once(REQUEST_ID_SEPARATOR)
            .ok_or_else(|| IdError::MalformedRequestId(s.to_string()))?;
        let sender =
            UserId::new(sender).map_err(|_| IdError::MalformedRequestId(s.to_string()))?;
        let receiver =
            UserId::new(receiver).map_err(|_| IdError::MalformedRequestId(s.to_string()))?;
        Ok(Self { sender, receiver })
    }

    pub fn sender(&self) -> &UserId {
        &self.sender
    }

    pub fn receiver(&self) -> &UserId {
        &self.receiver
    }
}

impl std::fmt::Display for FriendRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.sender, REQUEST_ID_SEPARATOR, self.receiver)
    }
}

impl TryFrom<String> for FriendRequestId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FriendRequestId> for String {
    fn from(id: FriendRequestId) -> Self {
        id.to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NotificationId(pub Uuid);

impl NotificationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
