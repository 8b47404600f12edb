/// Application name
pub const APP_NAME: &str = "Waypost";

/// Collection holding one `User` profile per uid.
pub const USERS: &str = "users";

/// Collection holding one `FriendList` per uid.
pub const FRIENDS: &str = "friends";

/// Collection holding one `BlockRecord` per uid.
pub const BLOCKS: &str = "blocks";

/// Collection of `FriendRequest` records keyed by `senderId_receiverId`.
pub const FRIEND_REQUESTS: &str = "friend_requests";

/// Collection of `Notification` records keyed by notification id.
pub const NOTIFICATIONS: &str = "notifications";

/// Separator between sender and receiver in a friend request key.
pub const REQUEST_ID_SEPARATOR: char = '_';

/// Maximum profile image size in bytes (10 MiB)
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// Default number of notifications returned for one receiver
pub const DEFAULT_NOTIFICATION_PAGE_SIZE: usize = 100;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

pub fn friend_request_message(sender_name: &str) -> String {
    format!("{sender_name} sent you a friend request.")
}

pub fn now_friends_message(other_name: &str) -> String {
    format!("You and {other_name} are now friends.")
}

pub fn request_accepted_message(accepter_name: &str) -> String {
    format!("{accepter_name} accepted your friend request.")
}

pub fn like_message(sender_name: &str) -> String {
    format!("{sender_name} liked your post.")
}

pub fn comment_message(sender_name: &str, text: &str) -> String {
    format!("{sender_name} commented: {text}")
}
