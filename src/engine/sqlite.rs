//! SQLite engine adapter
//!
//! Drives the SQLite C API directly (through `rusqlite::ffi`, bundled SQLite)
//! because the statement-at-a-time protocol needs the prepare tail, raw
//! parameter metadata and manual finalize, none of which the safe rusqlite
//! statement type hands out. The connection itself is opened and closed through
//! `rusqlite::Connection`.

use super::{Engine, Prepared, Step};
use crate::config::ConnectionConfig;
use crate::types::Value;
use crate::{Result, StmtError};
use rusqlite::{ffi, InterruptHandle, OpenFlags};
use std::ffi::{c_char, c_int, c_void, CStr};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::time::Duration;
use tracing::warn;

/// A compiled SQLite statement (`sqlite3_stmt*`).
#[derive(Debug)]
pub struct SqliteStatement {
    raw: NonNull<ffi::sqlite3_stmt>,
}

// SAFETY: the bundled SQLite is built thread-safe; a statement is only touched
// by the engine that prepared it, and that engine is behind its connection's
// in-use lock, so no two threads ever use the handle at once.
unsafe impl Send for SqliteStatement {}

impl SqliteStatement {
    fn as_ptr(&self) -> *mut ffi::sqlite3_stmt {
        self.raw.as_ptr()
    }
}

/// Engine adapter over one SQLite database connection.
pub struct SqliteEngine {
    conn: rusqlite::Connection,
}

impl SqliteEngine {
    pub fn open<P: AsRef<Path>>(path: P, config: &ConnectionConfig) -> Result<Self> {
        let conn = rusqlite::Connection::open_with_flags(path, Self::open_flags(config))?;
        Self::configure(conn, config)
    }

    pub fn open_in_memory(config: &ConnectionConfig) -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory_with_flags(Self::open_flags(config))?;
        Self::configure(conn, config)
    }

    fn open_flags(config: &ConnectionConfig) -> OpenFlags {
        if config.open_mode.is_read_only() {
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::default()
        }
    }

    fn configure(conn: rusqlite::Connection, config: &ConnectionConfig) -> Result<Self> {
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        Ok(Self { conn })
    }

    fn db(&self) -> *mut ffi::sqlite3 {
        // SAFETY: the handle stays valid for as long as `self.conn` lives.
        unsafe { self.conn.handle() }
    }

    /// The connection's most recent error message.
    fn message(&self, code: c_int) -> String {
        // SAFETY: errmsg returns a NUL-terminated string owned by SQLite,
        // valid until the next call on this connection; we copy it right away.
        unsafe {
            let msg = ffi::sqlite3_errmsg(self.db());
            if msg.is_null() {
                format!("SQLite error {}", code)
            } else {
                CStr::from_ptr(msg).to_string_lossy().into_owned()
            }
        }
    }

    fn error(&self, code: c_int) -> StmtError {
        StmtError::Engine {
            code,
            message: self.message(code),
        }
    }

    fn check(&self, code: c_int) -> Result<()> {
        if code == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(self.error(code))
        }
    }

    /// Rowid of the most recent successful INSERT on this connection.
    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Rows modified by the most recently completed INSERT/UPDATE/DELETE.
    pub fn changes(&self) -> u64 {
        // SAFETY: valid database handle.
        let changes = unsafe { ffi::sqlite3_changes(self.db()) };
        changes.max(0) as u64
    }

    /// Handle that can interrupt a running step from another thread. The
    /// interrupted step fails with an ordinary engine error.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.conn.get_interrupt_handle()
    }
}

impl Drop for SqliteEngine {
    fn drop(&mut self) {
        // rusqlite refuses to close a database with live statements, so sweep
        // up anything that escaped finalize before the connection goes. Every
        // statement on this handle comes from `Engine::prepare`: nothing may
        // prepare through `self.conn` (its statement cache included), or this
        // sweep would finalize statements rusqlite still owns.
        let db = self.db();
        let mut leaked = 0usize;
        // SAFETY: next_stmt walks the statements owned by this database; each
        // one is finalized exactly once and never used again.
        unsafe {
            loop {
                let stmt = ffi::sqlite3_next_stmt(db, ptr::null_mut());
                if stmt.is_null() {
                    break;
                }
                ffi::sqlite3_finalize(stmt);
                leaked += 1;
            }
        }
        if leaked > 0 {
            warn!("[SqliteEngine] finalized {} leaked statement(s) on close", leaked);
        }
    }
}

fn to_c_int(n: usize, what: &str) -> Result<c_int> {
    c_int::try_from(n).map_err(|_| StmtError::Engine {
        code: ffi::SQLITE_TOOBIG,
        message: format!("{} too large ({})", what, n),
    })
}

impl Engine for SqliteEngine {
    type Statement = SqliteStatement;

    fn prepare(&mut self, sql: &str) -> Result<Prepared<SqliteStatement>> {
        if sql.is_empty() {
            return Ok(Prepared {
                statement: None,
                consumed: 0,
            });
        }
        let len = to_c_int(sql.len(), "SQL text")?;
        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();
        // SAFETY: `sql` is valid for `len` bytes; SQLite does not need a NUL
        // terminator when the length is given and never reads past it.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(self.db(), sql.as_ptr().cast::<c_char>(), len, &mut raw, &mut tail)
        };
        if rc != ffi::SQLITE_OK {
            return Err(self.error(rc));
        }
        let consumed = if tail.is_null() {
            sql.len()
        } else {
            // SAFETY: tail points into (or one past the end of) `sql`.
            let offset = unsafe { tail.offset_from(sql.as_ptr().cast::<c_char>()) };
            (offset.max(0) as usize).min(sql.len())
        };
        Ok(Prepared {
            statement: NonNull::new(raw).map(|raw| SqliteStatement { raw }),
            consumed,
        })
    }

    fn step(&mut self, stmt: &mut SqliteStatement) -> Step {
        // SAFETY: live statement owned by the caller.
        let rc = unsafe { ffi::sqlite3_step(stmt.as_ptr()) };
        match rc & 0xff {
            ffi::SQLITE_ROW => Step::Row,
            ffi::SQLITE_DONE => Step::Done,
            ffi::SQLITE_BUSY => Step::Busy {
                code: rc,
                message: self.message(rc),
            },
            ffi::SQLITE_SCHEMA => Step::SchemaChanged,
            _ => Step::Error {
                code: rc,
                message: self.message(rc),
            },
        }
    }

    fn reset(&mut self, stmt: &mut SqliteStatement) -> Result<()> {
        // SAFETY: live statement owned by the caller.
        let rc = unsafe { ffi::sqlite3_reset(stmt.as_ptr()) };
        self.check(rc)
    }

    fn clear_bindings(&mut self, stmt: &mut SqliteStatement) -> Result<()> {
        // SAFETY: live statement owned by the caller.
        let rc = unsafe { ffi::sqlite3_clear_bindings(stmt.as_ptr()) };
        self.check(rc)
    }

    fn finalize(&mut self, stmt: SqliteStatement) -> Result<()> {
        // SAFETY: the statement is consumed here and its pointer never used again.
        let rc = unsafe { ffi::sqlite3_finalize(stmt.as_ptr()) };
        self.check(rc)
    }

    fn bind_parameter_count(&self, stmt: &SqliteStatement) -> usize {
        // SAFETY: live statement.
        let count = unsafe { ffi::sqlite3_bind_parameter_count(stmt.as_ptr()) };
        count.max(0) as usize
    }

    fn bind_parameter_name(&self, stmt: &SqliteStatement, index: usize) -> Option<String> {
        let index = c_int::try_from(index).ok()?;
        // SAFETY: live statement; the name is owned by the statement and copied.
        unsafe {
            let name = ffi::sqlite3_bind_parameter_name(stmt.as_ptr(), index);
            if name.is_null() {
                None
            } else {
                Some(CStr::from_ptr(name).to_string_lossy().into_owned())
            }
        }
    }

    fn bind_value(&mut self, stmt: &mut SqliteStatement, index: usize, value: &Value) -> Result<()> {
        let raw = stmt.as_ptr();
        let index = to_c_int(index, "parameter index")?;
        // SAFETY: live statement; text and blob contents are copied by SQLite
        // (SQLITE_TRANSIENT) before the call returns.
        let rc = unsafe {
            match value {
                Value::Null => ffi::sqlite3_bind_null(raw, index),
                Value::Integer(i) => ffi::sqlite3_bind_int64(raw, index, *i),
                Value::Float(f) => ffi::sqlite3_bind_double(raw, index, *f),
                Value::Text(s) => ffi::sqlite3_bind_text(
                    raw,
                    index,
                    s.as_ptr().cast::<c_char>(),
                    to_c_int(s.len(), "text binding")?,
                    ffi::SQLITE_TRANSIENT(),
                ),
                Value::Blob(b) if b.is_empty() => ffi::sqlite3_bind_zeroblob(raw, index, 0),
                Value::Blob(b) => ffi::sqlite3_bind_blob(
                    raw,
                    index,
                    b.as_ptr().cast::<c_void>(),
                    to_c_int(b.len(), "blob binding")?,
                    ffi::SQLITE_TRANSIENT(),
                ),
                Value::ZeroBlob(n) => {
                    ffi::sqlite3_bind_zeroblob(raw, index, to_c_int(*n, "zeroblob binding")?)
                }
            }
        };
        self.check(rc)
    }

    fn column_count(&self, stmt: &SqliteStatement) -> usize {
        // SAFETY: live statement.
        let count = unsafe { ffi::sqlite3_column_count(stmt.as_ptr()) };
        count.max(0) as usize
    }

    fn column_name(&self, stmt: &SqliteStatement, index: usize) -> Option<String> {
        let index = c_int::try_from(index).ok()?;
        // SAFETY: live statement; the name is copied before any further call.
        unsafe {
            let name = ffi::sqlite3_column_name(stmt.as_ptr(), index);
            if name.is_null() {
                None
            } else {
                Some(CStr::from_ptr(name).to_string_lossy().into_owned())
            }
        }
    }

    fn column_value(&self, stmt: &SqliteStatement, index: usize) -> Value {
        let raw = stmt.as_ptr();
        let Ok(index) = c_int::try_from(index) else {
            return Value::Null;
        };
        // SAFETY: the statement is positioned on a row; text/blob pointers are
        // read before `column_bytes` and copied immediately.
        unsafe {
            match ffi::sqlite3_column_type(raw, index) {
                ffi::SQLITE_INTEGER => Value::Integer(ffi::sqlite3_column_int64(raw, index)),
                ffi::SQLITE_FLOAT => Value::Float(ffi::sqlite3_column_double(raw, index)),
                ffi::SQLITE_TEXT => {
                    let text = ffi::sqlite3_column_text(raw, index);
                    let len = ffi::sqlite3_column_bytes(raw, index).max(0) as usize;
                    if text.is_null() || len == 0 {
                        Value::Text(String::new())
                    } else {
                        let bytes = std::slice::from_raw_parts(text, len);
                        Value::Text(String::from_utf8_lossy(bytes).into_owned())
                    }
                }
                ffi::SQLITE_BLOB => {
                    let blob = ffi::sqlite3_column_blob(raw, index);
                    let len = ffi::sqlite3_column_bytes(raw, index).max(0) as usize;
                    if blob.is_null() || len == 0 {
                        Value::Blob(Vec::new())
                    } else {
                        Value::Blob(std::slice::from_raw_parts(blob.cast::<u8>(), len).to_vec())
                    }
                }
                _ => Value::Null,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SqliteEngine {
        SqliteEngine::open_in_memory(&ConnectionConfig::default()).unwrap()
    }

    #[test]
    fn test_prepare_reports_consumed_length() {
        let mut engine = engine();
        let sql = "SELECT 1; SELECT 2";
        let prepared = engine.prepare(sql).unwrap();
        assert_eq!(&sql[..prepared.consumed], "SELECT 1;");
        engine.finalize(prepared.statement.unwrap()).unwrap();
    }

    #[test]
    fn test_prepare_whitespace_only() {
        let mut engine = engine();
        let prepared = engine.prepare("  -- nothing here\n").unwrap();
        assert!(prepared.statement.is_none());
        assert!(engine.prepare("").unwrap().statement.is_none());
    }

    #[test]
    fn test_prepare_error() {
        let mut engine = engine();
        let err = engine.prepare("SELEC 1").unwrap_err();
        assert!(matches!(err, StmtError::Engine { code, .. } if code & 0xff == ffi::SQLITE_ERROR));
    }

    #[test]
    fn test_bind_step_and_read() {
        let mut engine = engine();
        let mut stmt = engine
            .prepare("SELECT :a, ?2, length(?3)")
            .unwrap()
            .statement
            .unwrap();
        assert_eq!(engine.bind_parameter_count(&stmt), 3);
        assert_eq!(engine.bind_parameter_name(&stmt, 1).as_deref(), Some(":a"));
        assert_eq!(engine.bind_parameter_name(&stmt, 2).as_deref(), Some("?2"));

        engine.bind_value(&mut stmt, 1, &Value::Text("hi".to_string())).unwrap();
        engine.bind_value(&mut stmt, 2, &Value::Blob(vec![1, 2, 3])).unwrap();
        engine.bind_value(&mut stmt, 3, &Value::ZeroBlob(16)).unwrap();

        assert_eq!(engine.step(&mut stmt), Step::Row);
        assert_eq!(engine.column_count(&stmt), 3);
        assert_eq!(engine.column_value(&stmt, 0), Value::Text("hi".to_string()));
        assert_eq!(engine.column_value(&stmt, 1), Value::Blob(vec![1, 2, 3]));
        assert_eq!(engine.column_value(&stmt, 2), Value::Integer(16));
        assert_eq!(engine.step(&mut stmt), Step::Done);

        engine.reset(&mut stmt).unwrap();
        engine.clear_bindings(&mut stmt).unwrap();
        assert_eq!(engine.step(&mut stmt), Step::Row);
        assert_eq!(engine.column_value(&stmt, 0), Value::Null);
        engine.finalize(stmt).unwrap();
    }

    #[test]
    fn test_step_error_carries_message() {
        let mut engine = engine();
        let mut create = engine.prepare("CREATE TABLE t(x UNIQUE)").unwrap().statement.unwrap();
        assert_eq!(engine.step(&mut create), Step::Done);
        engine.finalize(create).unwrap();

        let mut insert = engine.prepare("INSERT INTO t VALUES (1)").unwrap().statement.unwrap();
        assert_eq!(engine.step(&mut insert), Step::Done);
        assert_eq!(engine.changes(), 1);
        engine.reset(&mut insert).unwrap();
        match engine.step(&mut insert) {
            Step::Error { code, message } => {
                assert_eq!(code & 0xff, ffi::SQLITE_CONSTRAINT);
                assert!(message.contains("UNIQUE"));
            }
            other => panic!("unexpected {:?}", other),
        }
        // the statement still has to be finalized; the error is reported again
        let _ = engine.finalize(insert);
    }

    #[test]
    fn test_drop_finalizes_leaked_statements() {
        let mut engine = engine();
        let stmt = engine.prepare("SELECT 1").unwrap().statement.unwrap();
        std::mem::forget(stmt);
        drop(engine);
    }
}
