//! Waypost social graph.
//!
//! Friend requests, friend lists, blocks and the notification feed, built on
//! a [`waypost_store::DocumentStore`]. Every multi-document change commits
//! atomically, so friend lists stay symmetric and block records stay
//! mirrored between users.

pub mod content;
pub mod error;
pub mod feed;
pub mod notifications;
pub mod profiles;
pub mod relationships;
pub mod service;
pub mod visibility;

pub use content::ContentNotifier;
pub use error::{Result, SocialError};
pub use feed::{LiveFeed, NotificationFeed};
pub use notifications::{partition, NewNotification, NotificationFanout, Partitioned};
pub use profiles::{ProfileService, ProfileUpdate};
pub use relationships::RelationshipStore;
pub use service::Social;
pub use visibility::{is_blocked, Authored, VisibilityFilter};
