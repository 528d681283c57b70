//! Warehouse connectivity: connection traits, the retrying session wrapper,
//! statement generation, and the in-memory test double.

mod client;
pub mod memory;
mod retry;
#[cfg(feature = "snowflake")]
pub mod snowflake;
pub mod sql;

pub use client::*;

/// Where the target writes and who gets read access afterwards.
#[derive(Debug, Clone)]
pub struct WarehouseLocation {
    /// Database the schema namespace lives in.
    pub database: String,
    /// Schema namespace all stream tables are created under.
    pub schema: String,
    /// Role granted usage and select after structural changes.
    pub role: String,
}
