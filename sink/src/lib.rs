//! Core of the Snowflake Singer target.
//!
//! The [`pipeline`] module consumes protocol messages and drives the rest:
//! [`conversions`] turn declared schemas and nested records into relational
//! shapes, [`buffer`] holds records and checkpoints between flushes,
//! [`schema`] reconciles table definitions against the live warehouse, and
//! [`loader`] moves batches in through the [`warehouse`] session layer.

pub mod buffer;
pub mod conversions;
pub mod error;
pub mod loader;
mod macros;
pub mod pipeline;
pub mod schema;
pub mod types;
pub mod validation;
pub mod warehouse;
