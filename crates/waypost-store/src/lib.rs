//! # waypost-store
//!
//! The document store the social layer runs against.
//!
//! Records are schemaless JSON objects addressed by collection and id. The
//! [`DocumentStore`] trait covers get/set/update/delete with set-style field
//! mutations, filtered and ordered queries, live subscriptions and
//! all-or-nothing multi-document transactions. Two backends implement it:
//! [`MemoryStore`] for tests and ephemeral instances, and [`SqliteStore`]
//! for a persistent local database. [`BlobStore`] holds uploaded images.

pub mod blobs;
pub mod database;
pub mod document;
pub mod feed;
pub mod memory;
pub mod migrations;
pub mod query;
pub mod store;

mod error;

pub use blobs::{BlobRef, BlobStore};
pub use database::{default_path, SqliteStore};
pub use document::{encode, DocKey, Document, FieldOp, Fields, Write};
pub use error::{Result, StoreError};
pub use feed::{Change, ChangeFeed, ChangeKind, Subscription};
pub use memory::MemoryStore;
pub use query::{Direction, Query};
pub use store::{DocumentStore, TxFn};
