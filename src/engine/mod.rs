//! Engine adapter
//!
//! The SQL engine is an opaque collaborator that only understands
//! "prepare one statement, step it, finalize it". Everything above this
//! module (cache, execution, cursors) talks to it through [`Engine`].

pub mod sqlite;

#[cfg(test)]
pub(crate) mod mock;

pub use sqlite::{SqliteEngine, SqliteStatement};

use crate::types::Value;
use crate::Result;

/// Result of compiling the first statement of a SQL text.
#[derive(Debug)]
pub struct Prepared<S> {
    /// `None` when the text held nothing executable (whitespace, comments).
    pub statement: Option<S>,
    /// Byte length of the compiled statement text, measured from the start
    /// of the text passed to [`Engine::prepare`].
    pub consumed: usize,
}

/// Outcome of one [`Engine::step`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A result row is available for reading.
    Row,
    /// The statement ran to completion.
    Done,
    /// A conflicting lock was held past the busy timeout.
    Busy { code: i32, message: String },
    /// The schema changed underneath the compiled statement.
    SchemaChanged,
    Error { code: i32, message: String },
}

/// One connection to a SQL engine.
///
/// Statement handles are owned values: whoever holds a `Statement` is its only
/// user, and it must eventually be given back to [`Engine::finalize`] on the
/// same engine that prepared it. Parameter and column indexes follow the
/// engine's convention: parameters are 1-based, columns 0-based.
pub trait Engine: Send {
    type Statement: Send;

    fn prepare(&mut self, sql: &str) -> Result<Prepared<Self::Statement>>;

    fn step(&mut self, stmt: &mut Self::Statement) -> Step;

    /// Rewind the statement so it can be stepped again.
    fn reset(&mut self, stmt: &mut Self::Statement) -> Result<()>;

    /// Set every parameter back to NULL.
    fn clear_bindings(&mut self, stmt: &mut Self::Statement) -> Result<()>;

    fn finalize(&mut self, stmt: Self::Statement) -> Result<()>;

    fn bind_parameter_count(&self, stmt: &Self::Statement) -> usize;

    /// Name of a parameter including its prefix marker, `None` for anonymous `?`.
    fn bind_parameter_name(&self, stmt: &Self::Statement, index: usize) -> Option<String>;

    fn bind_value(&mut self, stmt: &mut Self::Statement, index: usize, value: &Value) -> Result<()>;

    fn column_count(&self, stmt: &Self::Statement) -> usize;

    fn column_name(&self, stmt: &Self::Statement, index: usize) -> Option<String>;

    fn column_value(&self, stmt: &Self::Statement, index: usize) -> Value;
}
