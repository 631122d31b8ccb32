//! Shared types for Gatehouse

pub mod error;

pub use error::{FieldErrors, GatehouseError, Result};
