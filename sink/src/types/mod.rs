//! Core data types exchanged between the pipeline, buffers, and the loader.

mod message;
mod record;
mod table;

pub use message::*;
pub use record::*;
pub use table::*;
