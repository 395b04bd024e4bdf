//! Key-value table accessor.
//!
//! Reads and writes rows of the `key_value` table created by the embedded
//! migrations. `SQLite` has no `SELECT ... FOR UPDATE`, so a locking read
//! first touches the row with a no-op `UPDATE`: that takes the database
//! write lock, which is then held until the enclosing transaction ends.

use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{AppError, KeyValue, Result};

use super::database::Database;

/// Querier over a key-value table.
pub trait KeyValueQ: Sized {
    /// Creates a new, independently scoped querier over the same database.
    ///
    /// # Errors
    /// Returns error if a new connection cannot be opened.
    fn new_scope(&self) -> Result<Self>;

    /// Reads the row for `key`; `None` if it does not exist.
    ///
    /// # Errors
    /// Returns [`AppError::Query`] on any database failure other than "no rows".
    fn get(&self, key: &str) -> Result<Option<KeyValue>>;

    /// Reads the row for `key` and locks it for reading and updating
    /// until the end of the current transaction.
    ///
    /// # Errors
    /// Returns [`AppError::LockOutsideTransaction`] when no transaction is open,
    /// [`AppError::Query`] on database failure.
    fn locking_get(&self, key: &str) -> Result<Option<KeyValue>>;

    /// Updates the value if the key exists, inserts it otherwise.
    ///
    /// # Errors
    /// Returns [`AppError::Query`] on database failure.
    fn upsert(&self, kv: &KeyValue) -> Result<()>;

    /// Runs `f` inside a single transaction, committing if it returns `Ok`
    /// and rolling back otherwise. Joins the current transaction if one is
    /// already open.
    ///
    /// # Errors
    /// Returns the error of `f`, or [`AppError::Transaction`] if the
    /// transaction cannot be started or committed.
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>;

    /// Like [`KeyValueQ::get`], but panics on error.
    ///
    /// # Panics
    /// Panics if the underlying read fails.
    fn must_get(&self, key: &str) -> Option<KeyValue> {
        match self.get(key) {
            Ok(value) => value,
            Err(err) => panic!("failed to get value by key {key:?}: {err}"),
        }
    }

    /// Like [`KeyValueQ::locking_get`], but panics on error.
    ///
    /// # Panics
    /// Panics if the underlying locking read fails.
    fn must_locking_get(&self, key: &str) -> Option<KeyValue> {
        match self.locking_get(key) {
            Ok(value) => value,
            Err(err) => panic!("failed to locking get value by key {key:?}: {err}"),
        }
    }
}

/// `SQLite` implementation of [`KeyValueQ`] bound to one connection.
///
/// Not `Sync`: concurrent workers each take their own scope.
pub struct SqliteKeyValueQ {
    db: Database,
    conn: Connection,
}

impl SqliteKeyValueQ {
    /// Wraps an open connection to `db`.
    #[must_use]
    pub const fn new(db: Database, conn: Connection) -> Self {
        Self { db, conn }
    }

    fn select(&self, key: &str, for_update: bool) -> Result<Option<KeyValue>> {
        let operation = if for_update { "locking get" } else { "get" };

        if for_update {
            if self.conn.is_autocommit() {
                return Err(AppError::LockOutsideTransaction {
                    key: key.to_string(),
                });
            }

            self.conn
                .execute(
                    "UPDATE key_value SET value = value WHERE key = ?1",
                    [key],
                )
                .map_err(AppError::query(operation, key))?;
        }

        self.conn
            .query_row(
                "SELECT key, value FROM key_value WHERE key = ?1",
                [key],
                |row| {
                    Ok(KeyValue {
                        key: row.get(0)?,
                        value: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(AppError::query(operation, key))
    }
}

impl KeyValueQ for SqliteKeyValueQ {
    fn new_scope(&self) -> Result<Self> {
        self.db.key_value_q()
    }

    fn get(&self, key: &str) -> Result<Option<KeyValue>> {
        self.select(key, false)
    }

    fn locking_get(&self, key: &str) -> Result<Option<KeyValue>> {
        self.select(key, true)
    }

    fn upsert(&self, kv: &KeyValue) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO key_value (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![&kv.key, &kv.value],
            )
            .map_err(AppError::query("upsert", kv.key.as_str()))?;

        tracing::trace!(key = %kv.key, value = %kv.value, "Upserted key value");

        Ok(())
    }

    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        if !self.conn.is_autocommit() {
            return f(self);
        }

        let guard = TransactionGuard::begin(&self.conn)?;
        let value = f(self)?;
        guard.commit()?;

        Ok(value)
    }
}

/// Rolls the transaction back on drop unless it was committed.
struct TransactionGuard<'a> {
    conn: &'a Connection,
    committed: bool,
}

impl<'a> TransactionGuard<'a> {
    /// Begin an IMMEDIATE transaction, taking the write lock up front.
    fn begin(conn: &'a Connection) -> Result<Self> {
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(AppError::transaction("begin"))?;

        Ok(Self {
            conn,
            committed: false,
        })
    }

    fn commit(mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(AppError::transaction("commit"))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        // SQLite may already have rolled back on its own (e.g. after SQLITE_FULL)
        if !self.committed && !self.conn.is_autocommit() {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!("Failed to roll back transaction: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DatabaseConfig;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TempDir, Database, SqliteKeyValueQ) {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("kv.db"));
        db.migrator().migrate_up().unwrap();
        let q = db.key_value_q().unwrap();
        (dir, db, q)
    }

    fn row_count(q: &SqliteKeyValueQ) -> i64 {
        q.conn
            .query_row("SELECT COUNT(*) FROM key_value", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_get_missing_key_is_none() {
        let (_dir, _db, q) = setup();
        assert_eq!(q.get("missing").unwrap(), None);
    }

    #[test]
    fn test_upsert_inserts_then_overwrites() {
        let (_dir, _db, q) = setup();

        q.upsert(&KeyValue::new("cursor", "1")).unwrap();
        assert_eq!(q.get("cursor").unwrap(), Some(KeyValue::new("cursor", "1")));

        q.upsert(&KeyValue::new("cursor", "2")).unwrap();
        assert_eq!(q.get("cursor").unwrap(), Some(KeyValue::new("cursor", "2")));
        assert_eq!(row_count(&q), 1);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let (_dir, _db, q) = setup();

        let kv = KeyValue::new("k", "v");
        q.upsert(&kv).unwrap();
        q.upsert(&kv).unwrap();

        assert_eq!(row_count(&q), 1);
        assert_eq!(q.get("k").unwrap(), Some(kv));
    }

    #[test]
    fn test_locking_get_requires_transaction() {
        let (_dir, _db, q) = setup();

        let err = q.locking_get("k").unwrap_err();
        assert!(matches!(err, AppError::LockOutsideTransaction { ref key } if key == "k"));
    }

    #[test]
    fn test_locking_get_inside_transaction() {
        let (_dir, _db, q) = setup();
        q.upsert(&KeyValue::new("k", "7")).unwrap();

        let found = q.transaction(|q| q.locking_get("k")).unwrap();
        assert_eq!(found, Some(KeyValue::new("k", "7")));

        let missing = q.transaction(|q| q.locking_get("nope")).unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_locking_get_blocks_other_writers_until_commit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.db");
        let impatient = DatabaseConfig {
            busy_timeout_ms: 50,
            ..DatabaseConfig::default()
        };
        let db = Database::with_config(&path, &impatient);
        db.migrator().migrate_up().unwrap();

        let holder = db.key_value_q().unwrap();
        let other = holder.new_scope().unwrap();
        holder.upsert(&KeyValue::new("k", "0")).unwrap();

        holder
            .transaction(|q| {
                q.locking_get("k")?;

                let err = other.upsert(&KeyValue::new("k", "9")).unwrap_err();
                assert!(matches!(err, AppError::Query { operation: "upsert", .. }));

                // Plain reads are not blocked in WAL mode
                assert_eq!(other.get("k").unwrap(), Some(KeyValue::new("k", "0")));

                q.upsert(&KeyValue::new("k", "1"))
            })
            .unwrap();

        other.upsert(&KeyValue::new("k", "9")).unwrap();
        assert_eq!(holder.get("k").unwrap(), Some(KeyValue::new("k", "9")));
    }

    #[test]
    fn test_busy_begin_is_transaction_error() {
        let dir = tempdir().unwrap();
        let impatient = DatabaseConfig {
            busy_timeout_ms: 50,
            ..DatabaseConfig::default()
        };
        let db = Database::with_config(dir.path().join("kv.db"), &impatient);
        db.migrator().migrate_up().unwrap();

        let holder = db.key_value_q().unwrap();
        let other = holder.new_scope().unwrap();

        holder
            .transaction(|_| {
                let err = other.transaction(|_| Ok(())).unwrap_err();
                assert!(matches!(err, AppError::Transaction { operation: "begin", .. }));
                Ok(())
            })
            .unwrap();

        assert!(other.conn.is_autocommit());
        other.transaction(|_| Ok(())).unwrap();
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let (_dir, _db, q) = setup();

        let result: Result<()> = q.transaction(|q| {
            q.upsert(&KeyValue::new("k", "1"))?;
            Err(AppError::InvalidData {
                message: "abort".into(),
            })
        });

        assert!(result.is_err());
        assert_eq!(q.get("k").unwrap(), None);
        assert!(q.conn.is_autocommit());
    }

    #[test]
    fn test_nested_transaction_joins_outer() {
        let (_dir, _db, q) = setup();

        q.transaction(|outer| {
            outer.transaction(|inner| inner.upsert(&KeyValue::new("k", "1")))?;
            assert!(!outer.conn.is_autocommit());
            Ok(())
        })
        .unwrap();

        assert_eq!(q.get("k").unwrap(), Some(KeyValue::new("k", "1")));
    }

    #[test]
    fn test_null_value_is_query_error() {
        let (_dir, _db, q) = setup();
        q.conn
            .execute("INSERT INTO key_value (key, value) VALUES ('k', NULL)", [])
            .unwrap();

        let err = q.get("k").unwrap_err();
        assert!(matches!(err, AppError::Query { operation: "get", ref key, .. } if key == "k"));
    }

    #[test]
    fn test_must_get_returns_value() {
        let (_dir, _db, q) = setup();
        q.upsert(&KeyValue::new("k", "v")).unwrap();

        assert_eq!(q.must_get("k"), Some(KeyValue::new("k", "v")));
        assert_eq!(q.must_get("missing"), None);
    }

    #[test]
    #[should_panic(expected = "failed to get value by key")]
    fn test_must_get_panics_without_table() {
        let dir = tempdir().unwrap();
        let q = Database::new(dir.path().join("kv.db")).key_value_q().unwrap();

        q.must_get("k");
    }

    #[test]
    #[should_panic(expected = "failed to locking get value by key")]
    fn test_must_locking_get_panics_outside_transaction() {
        let (_dir, _db, q) = setup();

        q.must_locking_get("k");
    }

    #[test]
    fn test_new_scope_sees_committed_rows() {
        let (_dir, _db, q) = setup();
        q.upsert(&KeyValue::new("k", "v")).unwrap();

        let scoped = q.new_scope().unwrap();
        assert_eq!(scoped.get("k").unwrap(), Some(KeyValue::new("k", "v")));
        assert_eq!(scoped.db.path(), q.db.path());
    }
}
