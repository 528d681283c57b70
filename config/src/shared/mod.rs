mod base;
mod batch;
mod connection;
mod target;

pub use base::*;
pub use batch::*;
pub use connection::*;
pub use target::*;
