//! Session layer.
//!
//! This module provides:
//! - The backend seam (`Connector`, `SessionFactory`, `SessionContext`)
//! - sqlx-backed factories and per-session transactions
//! - The shared factory cache and the connection registry
//! - Lazily established sessions and explicit units of work
//! - Per-engine dialect handlers
//! - Database dispatch macros and type mappings

#[macro_use]
pub mod macros;
pub mod cache;
pub mod dialect;
pub mod factory;
pub mod params;
pub mod pool;
pub mod registry;
pub mod session;
pub mod transaction;
pub mod types;
pub mod work;

pub use cache::SessionFactoryCache;
pub use dialect::{DialectHandler, handler_for};
pub use factory::{Connector, FactoryCacheKey, FactorySpec, SessionContext, SessionFactory};
pub use pool::{DbPool, SqlxConnector, SqlxFactory};
pub use registry::ConnectionRegistry;
pub use session::Session;
pub use transaction::{DbTransaction, SqlxContext};
pub use work::WorkScope;
