//! Connection - engine handle, statement cache and connection-wide tracers
//!
//! A connection may be shared between threads (`&Connection` is `Send` when
//! the engine is), but only one call at a time may be inside the engine.
//! Entering is non-blocking: a second caller gets
//! [`StmtError::ConcurrentUse`] instead of waiting.

use crate::cache::{CacheStats, StatementCache};
use crate::config::ConnectionConfig;
use crate::cursor::Cursor;
use crate::engine::{Engine, SqliteEngine};
use crate::exec::{ExecTracer, RowTracer};
use crate::types::Bindings;
use crate::{Result, StmtError};
use parking_lot::{Mutex, MutexGuard, RwLock};
use rusqlite::InterruptHandle;
use std::path::Path;
use tracing::{debug, info, warn};

/// What the in-use marker guards.
pub(crate) struct ConnectionCore<E: Engine> {
    pub(crate) engine: E,
    pub(crate) cache: StatementCache<E::Statement>,
}

pub struct Connection<E: Engine> {
    core: Mutex<ConnectionCore<E>>,
    config: ConnectionConfig,
    exec_tracer: RwLock<Option<ExecTracer>>,
    row_tracer: RwLock<Option<RowTracer>>,
}

pub type SqliteConnection = Connection<SqliteEngine>;

impl<E: Engine> Connection<E> {
    /// Wrap an already opened engine.
    pub fn new(engine: E, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let cache = StatementCache::new(config.cache.capacity, config.cache.max_sql_len);
        debug!(
            "[Connection] statement cache: {} slots, max {} bytes",
            config.cache.capacity, config.cache.max_sql_len
        );
        Ok(Self {
            core: Mutex::new(ConnectionCore { engine, cache }),
            config,
            exec_tracer: RwLock::new(None),
            row_tracer: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Take the in-use marker, failing if someone else holds it.
    pub(crate) fn enter(&self) -> Result<MutexGuard<'_, ConnectionCore<E>>> {
        self.core.try_lock().ok_or(StmtError::ConcurrentUse)
    }

    /// Take the in-use marker, waiting for it. Teardown only.
    pub(crate) fn enter_blocking(&self) -> MutexGuard<'_, ConnectionCore<E>> {
        self.core.lock()
    }

    /// Whether a call is currently inside the engine.
    pub fn is_in_use(&self) -> bool {
        self.core.is_locked()
    }

    pub fn cursor(&self) -> Cursor<'_, E> {
        Cursor::new(self)
    }

    /// Execute `sql` on a fresh cursor. The cursor is positioned on the
    /// first row, if any.
    pub fn execute<B: Into<Bindings>>(&self, sql: &str, bindings: B) -> Result<Cursor<'_, E>> {
        let mut cursor = self.cursor();
        cursor.execute(sql, bindings)?;
        Ok(cursor)
    }

    /// Execute `sql` once per binding set on a fresh cursor.
    pub fn execute_many<'c, I, B>(&'c self, sql: &str, batch: I) -> Result<Cursor<'c, E>>
    where
        I: IntoIterator<Item = B>,
        I::IntoIter: 'c,
        B: Into<Bindings> + 'c,
    {
        let mut cursor = self.cursor();
        cursor.execute_many(sql, batch)?;
        Ok(cursor)
    }

    /// Tracer used by cursors that have none of their own.
    pub fn set_exec_tracer(&self, tracer: Option<ExecTracer>) {
        *self.exec_tracer.write() = tracer;
    }

    pub fn exec_tracer(&self) -> Option<ExecTracer> {
        self.exec_tracer.read().clone()
    }

    /// Row tracer used by cursors that have none of their own.
    pub fn set_row_tracer(&self, tracer: Option<RowTracer>) {
        *self.row_tracer.write() = tracer;
    }

    pub fn row_tracer(&self) -> Option<RowTracer> {
        self.row_tracer.read().clone()
    }

    pub fn cache_stats(&self) -> Result<CacheStats> {
        Ok(self.enter()?.cache.stats())
    }

    /// Finalize every idle cached statement.
    pub fn clear_cache(&self) -> Result<()> {
        let mut core = self.enter()?;
        let ConnectionCore { engine, cache } = &mut *core;
        cache.clear(engine)
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut E) -> R) -> Result<R> {
        let mut core = self.enter()?;
        Ok(f(&mut core.engine))
    }

    /// Finalize cached statements and close. Cursors borrow the connection,
    /// so none can be alive here.
    pub fn close(mut self) -> Result<()> {
        let core = self.core.get_mut();
        let result = core.cache.clear(&mut core.engine);
        info!("[Connection] closed");
        result
    }
}

impl<E: Engine> Drop for Connection<E> {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        if let Err(e) = core.cache.clear(&mut core.engine) {
            warn!("[Connection] finalize on drop failed: {}", e);
        }
    }
}

impl Connection<SqliteEngine> {
    /// Open (or create) a database file with the default configuration.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, ConnectionConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        info!("[Connection] opening {} ({})", path.as_ref().display(), config.open_mode.description());
        let engine = SqliteEngine::open(path, &config)?;
        Self::new(engine, config)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_config(ConnectionConfig::default())
    }

    pub fn open_in_memory_with_config(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let engine = SqliteEngine::open_in_memory(&config)?;
        Self::new(engine, config)
    }

    pub fn last_insert_rowid(&self) -> Result<i64> {
        self.with_engine(|engine| engine.last_insert_rowid())
    }

    /// Rows changed by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> Result<u64> {
        self.with_engine(|engine| engine.changes())
    }

    /// Handle for interrupting a long-running statement from another thread.
    pub fn interrupt_handle(&self) -> Result<InterruptHandle> {
        self.with_engine(|engine| engine.interrupt_handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockEngine;
    use crate::exec::{exec_tracer, ExecState};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    fn mock() -> Connection<MockEngine> {
        Connection::new(MockEngine::new(), ConnectionConfig::default()).unwrap()
    }

    #[test]
    fn test_concurrent_use_is_rejected() {
        let conn = mock();
        {
            let _guard = conn.enter().unwrap();
            assert!(conn.is_in_use());
            assert!(matches!(conn.execute("ROWS 1", ()), Err(StmtError::ConcurrentUse)));
            assert!(matches!(conn.cache_stats(), Err(StmtError::ConcurrentUse)));
        }
        assert!(!conn.is_in_use());
        assert_eq!(conn.execute("ROWS 1", ()).unwrap().fetch_all().unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_use_across_threads() {
        let conn = mock();
        let held = Barrier::new(2);
        let checked = Barrier::new(2);

        std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = conn.enter().unwrap();
                held.wait();
                checked.wait();
            });
            held.wait();
            let result = conn.execute("ROWS 1", ());
            assert!(matches!(result, Err(StmtError::ConcurrentUse)));
            checked.wait();
        });

        assert!(conn.execute("ROWS 1", ()).is_ok());
    }

    #[test]
    fn test_connection_tracer_is_fallback() {
        let conn = mock();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        conn.set_exec_tracer(Some(exec_tracer(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        })));

        conn.execute("A; B", ()).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        // A cursor tracer replaces the connection's.
        let mut cursor = conn.cursor();
        cursor.set_exec_tracer(Some(exec_tracer(|_| true)));
        cursor.execute("A", ()).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        conn.set_exec_tracer(None);
        conn.execute("A", ()).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropping_cursor_mid_rows_returns_statement() {
        let conn = mock();
        let cursor = conn.execute("ROWS 5", ()).unwrap();
        assert_eq!(cursor.state(), ExecState::Row);
        assert_eq!(conn.cache_stats().unwrap().in_use, 1);
        drop(cursor);

        let stats = conn.cache_stats().unwrap();
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.size, 1);

        // The reused statement starts from the first row again.
        let rows = conn.execute("ROWS 5", ()).unwrap().fetch_all().unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(conn.cache_stats().unwrap().hits, 1);
    }

    #[test]
    fn test_clear_cache_and_close() {
        let conn = mock();
        conn.execute("A; B; C", ()).unwrap();
        assert_eq!(conn.cache_stats().unwrap().size, 3);
        conn.clear_cache().unwrap();
        assert_eq!(conn.cache_stats().unwrap().size, 0);
        assert_eq!(conn.with_engine(|e| e.live).unwrap(), 0);

        conn.execute("A", ()).unwrap();
        conn.close().unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ConnectionConfig::default();
        config.cache.max_sql_len = 0;
        assert!(matches!(
            Connection::new(MockEngine::new(), config),
            Err(StmtError::Config(_))
        ));
    }

    #[test]
    fn test_sqlite_helpers() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t(x); INSERT INTO t VALUES (1), (2)", ())
            .unwrap();
        assert_eq!(conn.changes().unwrap(), 2);
        assert_eq!(conn.last_insert_rowid().unwrap(), 2);
        let _handle = conn.interrupt_handle().unwrap();
    }

    #[test]
    fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let conn = SqliteConnection::open(&path).unwrap();
            conn.execute("CREATE TABLE t(x); INSERT INTO t VALUES ('kept')", ())
                .unwrap();
        }

        let conn = SqliteConnection::open_with_config(&path, ConnectionConfig::read_only()).unwrap();
        let rows = conn.execute("SELECT x FROM t", ()).unwrap().fetch_all().unwrap();
        assert_eq!(rows, vec![vec![crate::types::Value::Text("kept".into())]]);
        assert!(conn.execute("INSERT INTO t VALUES ('nope')", ()).is_err());
    }
}
