//! In-memory buffering between message ingestion and warehouse loads.

mod checkpoints;
mod expiry;
mod records;

pub use checkpoints::*;
pub use expiry::*;
pub use records::*;
