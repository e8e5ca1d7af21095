//! Component A: the typed persistent store (SS4.1).
//!
//! `Store` is the only thing in the workspace that opens a SQL
//! connection. Every other crate reaches the database through the
//! methods here so that the pool, the prepared-statement cache, and the
//! transaction/savepoint discipline stay in one place.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params_from_iter, Connection, Transaction as SqlTransaction};
use rusqlite::types::Value as SqlValue;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::pool::{ConnectionPool, PoolConfig};
use crate::schema;

/// FIFO-evicted cache of prepared-statement SQL text, bounded by
/// `statement_cache_capacity`. `rusqlite::Connection` already caches
/// prepared statements internally; this tracks the *set* of SQL we have
/// asked it to prepare so the bound is explicit and observable (SS4.1).
struct StatementCache {
    capacity: usize,
    order: VecDeque<u64>,
}

impl StatementCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Record that `sql` was prepared; evict the oldest entry if the
    /// bound is exceeded. Returns true if this was a new entry.
    fn touch(&mut self, sql_hash: u64) -> bool {
        if self.order.contains(&sql_hash) {
            return false;
        }
        if self.order.len() >= self.capacity {
            self.order.pop_front();
        }
        self.order.push_back(sql_hash);
        true
    }
}

fn hash_sql(sql: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    sql.hash(&mut hasher);
    hasher.finish()
}

/// The persistent store: a connection pool plus the explicit
/// statement-cache bound layered on top of it.
pub struct Store {
    pool: ConnectionPool,
    statements: Mutex<StatementCache>,
}

impl Store {
    /// Open (or create) the database file and run schema
    /// initialization. Fails with `StoreError::SchemaMismatch` if an
    /// existing file reports a newer schema version than this build
    /// understands.
    pub fn open(config: PoolConfig) -> StoreResult<Self> {
        let statement_capacity = config.statement_cache_capacity;
        let pool = ConnectionPool::open(config)?;
        let store = Self {
            pool,
            statements: Mutex::new(StatementCache::new(statement_capacity)),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Idempotently creates tables, indexes, and the migration ledger.
    /// Foreign-key enforcement is verified after running.
    pub fn initialize_schema(&self) -> StoreResult<()> {
        let conn = self.pool.checkout()?;
        schema::initialize(conn.conn())?;
        self.assert_foreign_keys_enabled(conn.conn())?;

        let on_disk: i64 = conn.conn().query_row(
            "SELECT MAX(version) FROM schema_version",
            [],
            |row| row.get(0),
        )?;
        if on_disk > schema::CURRENT_SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                on_disk,
                expected: schema::CURRENT_SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    fn assert_foreign_keys_enabled(&self, conn: &Connection) -> StoreResult<()> {
        let enabled: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if enabled != 1 {
            return Err(StoreError::IntegrityFailure(
                "foreign_keys pragma is not enabled on this connection".to_string(),
            ));
        }
        Ok(())
    }

    fn note_statement(&self, sql: &str) {
        let mut cache = self.statements.lock().unwrap();
        cache.touch(hash_sql(sql));
    }

    /// Run a SELECT and collect every row via `row_fn`.
    pub fn execute_query<T, F>(&self, sql: &str, params: &[SqlValue], row_fn: F) -> StoreResult<Vec<T>>
    where
        F: Fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        self.note_statement(sql);
        let conn = self.pool.checkout()?;
        let mut stmt = conn.conn().prepare_cached(sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), row_fn)?
            .collect::<Result<Vec<T>, _>>()?;
        Ok(rows)
    }

    /// Run an INSERT/UPDATE/DELETE, returning the affected row count.
    pub fn execute_update(&self, sql: &str, params: &[SqlValue]) -> StoreResult<usize> {
        self.note_statement(sql);
        let conn = self.pool.checkout()?;
        let affected = conn
            .conn()
            .prepare_cached(sql)?
            .execute(params_from_iter(params.iter()))?;
        Ok(affected)
    }

    /// Run the same statement against each row of `params_list`, split
    /// into chunks of `batch_size`, inside one transaction per chunk.
    /// Returns the total affected row count across all chunks.
    pub fn execute_batch(
        &self,
        sql: &str,
        params_list: &[Vec<SqlValue>],
        batch_size: usize,
    ) -> StoreResult<usize> {
        if params_list.is_empty() {
            return Ok(0);
        }
        self.note_statement(sql);
        let batch_size = batch_size.max(1);
        let mut conn = self.pool.checkout()?;
        let mut total = 0usize;

        for chunk in params_list.chunks(batch_size) {
            let tx = conn.conn_mut().transaction()?;
            {
                let mut stmt = tx.prepare_cached(sql)?;
                for params in chunk {
                    total += stmt.execute(params_from_iter(params.iter()))?;
                }
            }
            tx.commit()?;
        }
        Ok(total)
    }

    /// Open a transaction handle supporting nested savepoints. The
    /// closure receives a `StoreTransaction`; its return value decides
    /// commit (`Ok`) vs. rollback (`Err`).
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut StoreTransaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self.pool.checkout()?;
        let sql_tx = conn
            .conn_mut()
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let mut tx = StoreTransaction {
            inner: sql_tx,
            savepoint_seq: 0,
        };
        match f(&mut tx) {
            Ok(value) => {
                tx.inner.commit()?;
                Ok(value)
            }
            Err(e) => {
                // `tx.inner` drops here, which rolls back automatically;
                // the explicit rollback call keeps the intent legible.
                let _ = tx.inner.rollback();
                Err(e)
            }
        }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

/// A handle into one open transaction, supporting nested savepoints.
pub struct StoreTransaction<'conn> {
    inner: SqlTransaction<'conn>,
    savepoint_seq: u64,
}

pub struct Savepoint(String);

impl<'conn> StoreTransaction<'conn> {
    pub fn connection(&self) -> &Connection {
        &self.inner
    }

    pub fn execute(&self, sql: &str, params: &[SqlValue]) -> StoreResult<usize> {
        Ok(self
            .inner
            .prepare_cached(sql)?
            .execute(params_from_iter(params.iter()))?)
    }

    pub fn query<T, F>(&self, sql: &str, params: &[SqlValue], row_fn: F) -> StoreResult<Vec<T>>
    where
        F: Fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.inner.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), row_fn)?
            .collect::<Result<Vec<T>, _>>()?;
        Ok(rows)
    }

    pub fn savepoint(&mut self) -> StoreResult<Savepoint> {
        self.savepoint_seq += 1;
        let name = format!("sp_{}", self.savepoint_seq);
        self.inner.execute_batch(&format!("SAVEPOINT {name}"))?;
        debug!(savepoint = %name, "savepoint taken");
        Ok(Savepoint(name))
    }

    pub fn rollback_to(&self, sp: &Savepoint) -> StoreResult<()> {
        self.inner
            .execute_batch(&format!("ROLLBACK TO SAVEPOINT {}", sp.0))?;
        warn!(savepoint = %sp.0, "rolled back to savepoint");
        Ok(())
    }

    pub fn release(&self, sp: Savepoint) -> StoreResult<()> {
        self.inner.execute_batch(&format!("RELEASE SAVEPOINT {}", sp.0))?;
        Ok(())
    }
}

/// Milliseconds since the epoch, used for generated timestamps that need
/// to sort (e.g. ring-buffer eviction); the store otherwise stores
/// `DateTime<Utc>` as RFC3339 text via the model crate.
pub fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> Store {
        Store::open(PoolConfig {
            database_path: ":memory:".to_string(),
            pool_size: 2,
            ..PoolConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn initialize_schema_is_idempotent_through_store() {
        let store = test_store();
        store.initialize_schema().unwrap();
    }

    #[test]
    fn execute_update_and_query_round_trip() {
        let store = test_store();
        store
            .execute_update(
                "INSERT INTO videos (video_id, filename, file_path, duration, upload_timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
                &[
                    SqlValue::Text("v1".into()),
                    SqlValue::Text("a.mp4".into()),
                    SqlValue::Text("/tmp/a.mp4".into()),
                    SqlValue::Real(12.0),
                    SqlValue::Text("2024-01-01T00:00:00Z".into()),
                ],
            )
            .unwrap();

        let rows: Vec<String> = store
            .execute_query(
                "SELECT filename FROM videos WHERE video_id = ?1",
                &[SqlValue::Text("v1".into())],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(rows, vec!["a.mp4".to_string()]);
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let store = test_store();
        let result: StoreResult<()> = store.transaction(|tx| {
            tx.execute(
                "INSERT INTO videos (video_id, filename, file_path, duration, upload_timestamp) VALUES ('v2','a','b',1.0,'2024-01-01T00:00:00Z')",
                &[],
            )?;
            Err(StoreError::internal("forced rollback"))
        });
        assert!(result.is_err());

        let count: i64 = store
            .execute_query("SELECT COUNT(*) FROM videos WHERE video_id = 'v2'", &[], |row| row.get(0))
            .unwrap()[0];
        assert_eq!(count, 0);
    }

    #[test]
    fn savepoint_rollback_keeps_earlier_writes_in_the_transaction() {
        let store = test_store();
        store
            .transaction(|tx| {
                tx.execute(
                    "INSERT INTO videos (video_id, filename, file_path, duration, upload_timestamp) VALUES ('v3','a','b',1.0,'2024-01-01T00:00:00Z')",
                    &[],
                )?;
                let sp = tx.savepoint()?;
                tx.execute(
                    "INSERT INTO videos (video_id, filename, file_path, duration, upload_timestamp) VALUES ('v4','a','b',1.0,'2024-01-01T00:00:00Z')",
                    &[],
                )?;
                tx.rollback_to(&sp)?;
                tx.release(sp)?;
                Ok(())
            })
            .unwrap();

        let v3: i64 = store
            .execute_query("SELECT COUNT(*) FROM videos WHERE video_id = 'v3'", &[], |row| row.get(0))
            .unwrap()[0];
        let v4: i64 = store
            .execute_query("SELECT COUNT(*) FROM videos WHERE video_id = 'v4'", &[], |row| row.get(0))
            .unwrap()[0];
        assert_eq!(v3, 1);
        assert_eq!(v4, 0);
    }

    #[test]
    fn execute_batch_splits_into_chunks_and_commits_each() {
        let store = test_store();
        let params: Vec<Vec<SqlValue>> = (0..5)
            .map(|i| {
                vec![
                    SqlValue::Text(format!("v{i}")),
                    SqlValue::Text("a".into()),
                    SqlValue::Text("b".into()),
                    SqlValue::Real(1.0),
                    SqlValue::Text("2024-01-01T00:00:00Z".into()),
                ]
            })
            .collect();

        let affected = store
            .execute_batch(
                "INSERT INTO videos (video_id, filename, file_path, duration, upload_timestamp) VALUES (?1,?2,?3,?4,?5)",
                &params,
                2,
            )
            .unwrap();
        assert_eq!(affected, 5);
    }
}
