//! Core types for glimpse.

pub mod context;
pub mod message;
pub mod stream;
pub mod usage;

pub use context::*;
pub use message::*;
pub use stream::*;
pub use usage::*;
