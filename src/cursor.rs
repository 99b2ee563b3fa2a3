//! Cursor - runs SQL on a connection and yields result rows
//!
//! A cursor owns at most one execution at a time. Starting a new one closes
//! the previous execution first and fails with `IncompleteExecution` if it
//! still had statements left; use [`Cursor::close`] with `force` to discard
//! them instead.

use crate::connection::Connection;
use crate::engine::Engine;
use crate::exec::{BindingSource, ExecState, ExecTracer, Execution, RowTracer};
use crate::types::{Bindings, Row};
use crate::Result;

/// Dropping a cursor releases its statement like a forced close, so it may
/// wait for an engine call in progress on another thread.
pub struct Cursor<'c, E: Engine> {
    conn: &'c Connection<E>,
    execution: Option<Execution<'c, E>>,
    exec_tracer: Option<ExecTracer>,
    row_tracer: Option<RowTracer>,
    can_cache: bool,
}

impl<'c, E: Engine> Cursor<'c, E> {
    pub(crate) fn new(conn: &'c Connection<E>) -> Self {
        Self {
            conn,
            execution: None,
            exec_tracer: None,
            row_tracer: None,
            can_cache: true,
        }
    }

    pub fn connection(&self) -> &'c Connection<E> {
        self.conn
    }

    /// Run `sql` (one or more `;`-separated statements) with one binding set.
    ///
    /// Statements without result rows run to completion here; the cursor
    /// stops on the first row of the first statement that produces one.
    pub fn execute<B: Into<Bindings>>(&mut self, sql: &str, bindings: B) -> Result<&mut Self> {
        self.reset(false)?;
        self.run(sql, BindingSource::Single(bindings.into()))
    }

    /// Run `sql` once for every binding set in `batch`.
    ///
    /// Sets are pulled lazily as the previous pass over the text finishes.
    /// An empty batch runs nothing.
    pub fn execute_many<I, B>(&mut self, sql: &str, batch: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = B>,
        I::IntoIter: 'c,
        B: Into<Bindings> + 'c,
    {
        self.reset(false)?;
        let batch: Box<dyn Iterator<Item = Bindings> + 'c> = Box::new(batch.into_iter().map(Into::into));
        self.run(sql, BindingSource::Batch(batch))
    }

    fn run(&mut self, sql: &str, source: BindingSource<'c>) -> Result<&mut Self> {
        let mut execution = Execution::new(self.conn, sql, source, self.can_cache);
        execution.set_exec_tracer(self.exec_tracer.clone());
        execution.set_row_tracer(self.row_tracer.clone());
        self.execution.insert(execution).step()?;
        Ok(self)
    }

    fn reset(&mut self, force: bool) -> Result<()> {
        match self.execution.take() {
            Some(mut execution) => execution.close(force),
            None => Ok(()),
        }
    }

    /// Next result row, or `None` once every statement has run.
    ///
    /// Statements after the current one only run when a call needs their
    /// rows; an error from them comes back on that later call.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        match self.execution.as_mut() {
            Some(execution) => execution.next_row(),
            None => Ok(None),
        }
    }

    pub fn fetch_one(&mut self) -> Result<Option<Row>> {
        self.next_row()
    }

    pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Column names of the statement the cursor is positioned on.
    pub fn columns(&self) -> Result<Vec<String>> {
        match self.execution.as_ref() {
            Some(execution) => execution.columns(),
            None => Ok(Vec::new()),
        }
    }

    pub fn state(&self) -> ExecState {
        self.execution.as_ref().map_or(ExecState::Done, Execution::state)
    }

    pub fn is_done(&self) -> bool {
        self.state() == ExecState::Done
    }

    /// Text not yet run by the current execution.
    pub fn remaining_sql(&self) -> &str {
        self.execution.as_ref().map_or("", Execution::remaining_sql)
    }

    /// Discard the current execution.
    ///
    /// Without `force`, leftover statements or batch items are reported as
    /// `IncompleteExecution`; the execution is torn down either way. A forced
    /// close waits for the connection, so it may block behind an engine call
    /// running on another thread.
    pub fn close(&mut self, force: bool) -> Result<()> {
        self.reset(force)
    }

    /// Per-cursor exec tracer; `None` falls back to the connection's.
    /// Applies to the current execution as well.
    pub fn set_exec_tracer(&mut self, tracer: Option<ExecTracer>) {
        if let Some(execution) = self.execution.as_mut() {
            execution.set_exec_tracer(tracer.clone());
        }
        self.exec_tracer = tracer;
    }

    pub fn exec_tracer(&self) -> Option<&ExecTracer> {
        self.exec_tracer.as_ref()
    }

    /// Per-cursor row tracer; `None` falls back to the connection's.
    pub fn set_row_tracer(&mut self, tracer: Option<RowTracer>) {
        if let Some(execution) = self.execution.as_mut() {
            execution.set_row_tracer(tracer.clone());
        }
        self.row_tracer = tracer;
    }

    pub fn row_tracer(&self) -> Option<&RowTracer> {
        self.row_tracer.as_ref()
    }

    /// Whether later executions may keep their statements in the cache.
    pub fn set_statement_caching(&mut self, enabled: bool) {
        self.can_cache = enabled;
    }
}

impl<E: Engine> Iterator for Cursor<'_, E> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}
