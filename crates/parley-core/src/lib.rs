//! Shared data model, configuration, and error types for Parley.

pub mod config;
pub mod error;
pub mod types;

pub use config::ParleyConfig;
pub use error::{ParleyError, Result};
pub use types::*;
