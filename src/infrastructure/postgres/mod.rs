//! PostgreSQL persistence module.

pub mod pool;

pub use pool::{PostgresPool, PostgresPoolError};
