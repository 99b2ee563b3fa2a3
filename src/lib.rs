//! stmtcache - statement cache and execution layer for embedded SQL engines
//!
//! 在 "prepare / step / finalize" 引擎之上提供语句缓存与多语句执行
//!
//! ## 核心特性
//! - 按剩余 SQL 文本缓存已编译语句，LRU 淘汰
//! - 多语句文本逐条执行，位置参数跨语句消费
//! - executemany：同一文本按多组参数重复执行
//! - exec / row tracer 钩子
//! - 并发调用检测（非阻塞，返回 ConcurrentUse）
//!
//! ## 架构
//! - 引擎层: `Engine` trait + SQLite 适配器 (rusqlite::ffi)
//! - 缓存层: 固定槽位 + LRU stamp + checked_out 标记
//! - 执行层: Begin / Row / Done 状态机
//! - 接口层: `Connection` + `Cursor`
//!
//! ```no_run
//! use stmtcache::{SqliteConnection, Value};
//!
//! # fn main() -> stmtcache::Result<()> {
//! let conn = SqliteConnection::open_in_memory()?;
//! conn.execute("CREATE TABLE t(x)", ())?;
//! conn.execute_many("INSERT INTO t VALUES (?)", vec![[1], [2], [3]])?;
//!
//! for row in conn.execute("SELECT x FROM t WHERE x > ?", [1])? {
//!     let row = row?;
//!     assert!(matches!(row[0], Value::Integer(_)));
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod types;
pub mod engine;
pub mod cache;
pub mod exec;

mod connection;
mod cursor;
mod error;

pub use cache::{CacheStats, StatementCache};
pub use config::{ConnectionConfig, OpenMode, StatementCacheConfig};
pub use connection::{Connection, SqliteConnection};
pub use cursor::Cursor;
pub use engine::{Engine, SqliteEngine};
pub use error::{Result, StmtError};
pub use exec::{exec_tracer, row_tracer, ExecState, ExecTrace, ExecTracer, RowAction, RowTracer};
pub use types::{Bindings, BoundParams, NamedBindings, Row, Value};
