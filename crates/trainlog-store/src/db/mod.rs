//! Database layer: connection lifecycle and schema migrations

mod connection;
mod migrations;
pub(crate) mod row;

pub use connection::Database;
pub use migrations::SCHEMA_VERSION;
