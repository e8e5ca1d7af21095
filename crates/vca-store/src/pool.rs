//! A bounded connection pool over blocking `rusqlite::Connection`
//! handles, checked out from within `tokio::task::spawn_blocking`.
//!
//! Sized pool (typically 5) of pre-configured handles, each with
//! foreign keys on, WAL journaling, and a bounded prepared-statement
//! cache. Overflow beyond the configured size opens a transient
//! connection that is closed on return rather than pooled, rather than
//! blocking forever under a burst.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::error::{StoreError, StoreResult};

/// How many connections beyond `pool_size` may be opened transiently
/// before `checkout` starts waiting instead.
const OVERFLOW_ALLOWANCE: usize = 3;

/// `Connection::open(":memory:")` gives every call its own private
/// database - fine for a pool of one, but a pool of N would silently
/// scatter schema and rows across N unrelated databases. Each pool
/// that asks for `:memory:` instead gets a uniquely-named shared-cache
/// URI, so every connection *in that pool* (including overflow ones)
/// opens the same in-process database while remaining isolated from
/// every other `Store::open(":memory:")` in the same test binary.
static MEMORY_POOL_SEQ: AtomicU64 = AtomicU64::new(0);

fn shared_memory_uri() -> String {
    let id = MEMORY_POOL_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("file:vca_mem_pool_{id}?mode=memory&cache=shared")
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub database_path: String,
    pub pool_size: usize,
    pub checkout_timeout: Duration,
    pub busy_timeout: Duration,
    pub cache_size_kb: i64,
    pub statement_cache_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            database_path: "vca.sqlite3".to_string(),
            pool_size: 5,
            checkout_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            cache_size_kb: 64 * 1024,
            statement_cache_capacity: 50,
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_path: std::env::var("VCA_DATABASE_PATH").unwrap_or(defaults.database_path),
            pool_size: std::env::var("VCA_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.pool_size),
            checkout_timeout: Duration::from_secs(
                std::env::var("VCA_POOL_CHECKOUT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.checkout_timeout.as_secs()),
            ),
            busy_timeout: defaults.busy_timeout,
            cache_size_kb: defaults.cache_size_kb,
            statement_cache_capacity: std::env::var("VCA_STATEMENT_CACHE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.statement_cache_capacity),
        }
    }
}

struct Shared {
    idle: Mutex<VecDeque<Connection>>,
    cond: Condvar,
    outstanding: Mutex<usize>,
}

pub struct ConnectionPool {
    shared: Shared,
    config: PoolConfig,
    /// The path actually passed to `Connection::open` for every
    /// connection in this pool - equal to `config.database_path`
    /// unless that path is `:memory:`, in which case it is this pool's
    /// own shared-cache URI (see `shared_memory_uri`).
    connect_path: String,
}

pub struct PooledConnection<'p> {
    conn: Option<Connection>,
    pool: &'p ConnectionPool,
    overflow: bool,
}

impl<'p> PooledConnection<'p> {
    pub fn conn(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken")
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken")
    }
}

impl<'p> Drop for PooledConnection<'p> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else { return };
        if self.overflow {
            let mut outstanding = self.pool.shared.outstanding.lock().unwrap();
            *outstanding = outstanding.saturating_sub(1);
            drop(conn);
        } else {
            let mut idle = self.pool.shared.idle.lock().unwrap();
            idle.push_back(conn);
            drop(idle);
            self.pool.shared.cond.notify_one();
        }
    }
}

impl ConnectionPool {
    pub fn open(config: PoolConfig) -> StoreResult<Self> {
        let connect_path = if config.database_path == ":memory:" {
            shared_memory_uri()
        } else {
            config.database_path.clone()
        };

        let mut idle = VecDeque::with_capacity(config.pool_size);
        for _ in 0..config.pool_size {
            idle.push_back(Self::open_connection(&config, &connect_path)?);
        }
        Ok(Self {
            shared: Shared {
                idle: Mutex::new(idle),
                cond: Condvar::new(),
                outstanding: Mutex::new(0),
            },
            config,
            connect_path,
        })
    }

    fn open_connection(config: &PoolConfig, connect_path: &str) -> StoreResult<Connection> {
        let conn = Connection::open(connect_path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "cache_size", -config.cache_size_kb)?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.busy_timeout(config.busy_timeout)?;
        conn.set_prepared_statement_cache_capacity(config.statement_cache_capacity);
        Ok(conn)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Borrow a connection, blocking the calling (blocking-pool) thread
    /// until one is available or `checkout_timeout` elapses.
    pub fn checkout(&self) -> StoreResult<PooledConnection<'_>> {
        let deadline = Instant::now() + self.config.checkout_timeout;
        let mut idle = self.shared.idle.lock().unwrap();
        loop {
            if let Some(conn) = idle.pop_front() {
                return Ok(PooledConnection {
                    conn: Some(conn),
                    pool: self,
                    overflow: false,
                });
            }

            {
                let mut outstanding = self.shared.outstanding.lock().unwrap();
                if *outstanding < OVERFLOW_ALLOWANCE {
                    *outstanding += 1;
                    drop(outstanding);
                    let conn = Self::open_connection(&self.config, &self.connect_path)?;
                    return Ok(PooledConnection {
                        conn: Some(conn),
                        pool: self,
                        overflow: true,
                    });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StoreError::pool_timeout());
            }
            let (guard, result) = self
                .shared
                .cond
                .wait_timeout(idle, deadline - now)
                .unwrap();
            idle = guard;
            if result.timed_out() && idle.is_empty() {
                return Err(StoreError::pool_timeout());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PoolConfig {
        PoolConfig {
            database_path: ":memory:".to_string(),
            pool_size: 2,
            checkout_timeout: Duration::from_millis(200),
            busy_timeout: Duration::from_millis(200),
            cache_size_kb: 2048,
            statement_cache_capacity: 8,
        }
    }

    #[test]
    fn checkout_and_return_recycles_connections() {
        let pool = ConnectionPool::open(test_config()).unwrap();
        {
            let conn = pool.checkout().unwrap();
            assert!(conn.conn().is_autocommit());
        }
        let idle_len = pool.shared.idle.lock().unwrap().len();
        assert_eq!(idle_len, 2);
    }

    #[test]
    fn overflow_connections_are_not_pooled_on_return() {
        let pool = ConnectionPool::open(test_config()).unwrap();
        let _a = pool.checkout().unwrap();
        let _b = pool.checkout().unwrap();
        let overflow = pool.checkout().unwrap();
        drop(overflow);
        let outstanding = *pool.shared.outstanding.lock().unwrap();
        assert_eq!(outstanding, 0);
    }

    /// Every connection in a `:memory:` pool - including an overflow
    /// one - must see the same database, or a write through one
    /// checkout would be invisible to a read through another.
    #[test]
    fn memory_pool_connections_share_one_database() {
        let pool = ConnectionPool::open(test_config()).unwrap();
        {
            let conn = pool.checkout().unwrap();
            conn.conn().execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)").unwrap();
            conn.conn().execute("INSERT INTO t (id) VALUES (1)", []).unwrap();
        }
        {
            // Different pooled connection (the other base handle).
            let conn = pool.checkout().unwrap();
            let count: i64 = conn.conn().query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0)).unwrap();
            assert_eq!(count, 1);
        }
        // Force an overflow connection too.
        let _a = pool.checkout().unwrap();
        let _b = pool.checkout().unwrap();
        let overflow = pool.checkout().unwrap();
        let count: i64 = overflow.conn().query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn two_memory_pools_do_not_share_state() {
        let pool_a = ConnectionPool::open(test_config()).unwrap();
        let pool_b = ConnectionPool::open(test_config()).unwrap();
        {
            let conn = pool_a.checkout().unwrap();
            conn.conn().execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)").unwrap();
        }
        let conn = pool_b.checkout().unwrap();
        let err = conn.conn().query_row("SELECT COUNT(*) FROM t", [], |row| row.get::<_, i64>(0));
        assert!(err.is_err());
    }
}
