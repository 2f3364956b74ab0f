//! Generic offline entity service
//!
//! One [`EntityStore`] per domain entity. Concrete entities only supply
//! table DDL, typed payloads and merge/update logic through the
//! [`OfflineEntity`] trait; the create/read/update/delete machinery, the
//! per-service operation queue and the sync-status bookkeeping live here.

mod entity;
mod op_queue;
mod service;

pub use entity::{record_table_ddl, OfflineEntity, QueuePayload};
pub use service::EntityStore;
