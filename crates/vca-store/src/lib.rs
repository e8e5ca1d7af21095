//! Component A: a typed persistent store over a single-file relational
//! database (SS4.1). Owns the connection pool, the schema, and every
//! transaction boundary; `vca-persistence` is the only crate that
//! should write through it.

mod error;
mod pool;
mod schema;
mod store;

pub use error::{StoreError, StoreResult};
pub use pool::{ConnectionPool, PoolConfig};
pub use rusqlite::types::Value as SqlValue;
pub use rusqlite::{Row, Transaction};
pub use schema::CURRENT_SCHEMA_VERSION;
pub use store::{now_millis, Savepoint, Store, StoreTransaction};
