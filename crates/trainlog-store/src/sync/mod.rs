//! Sync handlers and the remote API boundary
//!
//! Handlers translate queued mutations into remote calls, record the outcome
//! on the local row, and resolve conflicts with strict server authority.

mod connectivity;
mod handler;
mod http;
mod remote;

pub use connectivity::{AlwaysOnline, Connectivity};
pub use handler::{SyncHandler, SyncOutcome};
pub use http::HttpRemote;
pub use remote::{DeleteKey, EntityRemote, RemoteError};
