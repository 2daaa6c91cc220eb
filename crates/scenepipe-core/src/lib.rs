//! scenepipe Core Library
//!
//! This crate provides the error type, transform math and axis conventions
//! shared by the format, export and pipeline crates.

pub mod error;
pub mod logging;
pub mod types;

pub use error::{Error, Result, ResultExt};
pub use types::*;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::types::*;
}
