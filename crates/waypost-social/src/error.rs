use thiserror::Error;
use waypost_shared::{FriendRequestId, IdError, UserId};
use waypost_store::StoreError;

/// Errors returned by relationship, notification and profile operations.
///
/// Store failures are split by direction so callers can tell a failed fetch
/// from a failed mutation; nothing here is retried automatically.
#[derive(Error, Debug)]
pub enum SocialError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("A block exists between the current user and {0}")]
    AlreadyBlocked(UserId),

    #[error("Already friends with {0}")]
    AlreadyFriends(UserId),

    #[error("Cannot target yourself")]
    SelfRelation,

    #[error("Friend request not found: {0}")]
    RequestNotFound(FriendRequestId),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("User already exists: {0}")]
    UserExists(UserId),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid id: {0}")]
    InvalidId(#[from] IdError),

    #[error("Remote read failed: {0}")]
    RemoteReadFailed(#[source] StoreError),

    #[error("Remote write failed: {0}")]
    RemoteWriteFailed(#[source] StoreError),

    /// The transaction body rejected what it read; nothing was written.
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),
}

impl SocialError {
    pub(crate) fn read(e: StoreError) -> Self {
        Self::RemoteReadFailed(e)
    }

    pub(crate) fn write(e: StoreError) -> Self {
        match e {
            StoreError::Aborted(reason) => Self::TransactionAborted(reason),
            StoreError::EmptyBlob | StoreError::BlobTooLarge { .. } => {
                Self::InvalidInput(e.to_string())
            }
            other => Self::RemoteWriteFailed(other),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SocialError>;
