//! Pure conversions between Singer payloads and relational shapes.
//!
//! Nothing in this module touches the warehouse; these are the flattening and
//! inference routines the pipeline composes with its buffering and loading
//! machinery.

mod flatten;
mod infer;

pub use flatten::*;
pub use infer::*;
