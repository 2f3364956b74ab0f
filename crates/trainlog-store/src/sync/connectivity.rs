//! Network-availability boundary

/// Synchronous network probe, consulted before opportunistic background
/// syncing. Its absence or failure must never block local reads or writes.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Probe that always reports connectivity; the default for environments
/// without a platform detector, and for tests
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}
