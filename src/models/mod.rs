//! Data models for the session layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{ConnectionDescriptor, DbType, PersistenceUnit, TransactionState, mask_url};
pub use query::{QueryParam, QueryRows, normalize_params};
