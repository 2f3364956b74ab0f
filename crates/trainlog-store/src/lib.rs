//! trainlog-store - Offline-first local data store for Trainlog
//!
//! Every read and write goes to an embedded SQLite database first, so the
//! app stays fully usable without connectivity. Local mutations leave a
//! durable entry in a sync queue; background handlers drain the queue when
//! the network allows and reconcile outcomes onto the local rows, resolving
//! conflicts with strict server authority.

pub mod db;
pub mod entities;
pub mod error;
pub mod queue;
pub mod record;
pub mod store;
pub mod sync;

pub use db::Database;
pub use error::{Error, Result};
pub use record::{LocalRecord, RecordId, RecordQuery, ServerRecord, SyncStats, SyncStatus};
pub use store::{EntityStore, OfflineEntity};
