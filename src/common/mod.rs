//! Common types shared across the leafmint backend.

pub mod error;

pub use error::{LeafmintError, Result};
