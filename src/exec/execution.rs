//! Execution state machine
//!
//! One `Execution` walks a SQL text statement by statement: check a
//! statement out of the connection's cache, bind it, trace it, step it, and
//! hand it back once it is done before moving on to the next statement. With
//! a batch source the whole text is replayed once per binding set.
//!
//! The connection is entered (its in-use marker taken) only around engine
//! and cache calls. Tracers run with the marker released.

use super::binding::{bind_parameters, ensure_all_consumed};
use super::trace::{ExecTrace, ExecTracer, RowAction, RowTracer};
use super::ExecState;
use crate::cache::CachedStatement;
use crate::connection::{Connection, ConnectionCore};
use crate::engine::{Engine, Step};
use crate::types::{BoundParams, Bindings, Row};
use crate::{Result, StmtError};
use std::iter::Peekable;
use tracing::{debug, trace};

pub(crate) type BatchIter<'c> = Box<dyn Iterator<Item = Bindings> + 'c>;

/// Where an execution gets its binding sets from.
pub(crate) enum BindingSource<'c> {
    /// `execute`: one set for the whole text.
    Single(Bindings),
    /// `executemany`: the text runs once per set.
    Batch(BatchIter<'c>),
}

pub(crate) struct Execution<'c, E: Engine> {
    conn: &'c Connection<E>,
    sql: String,
    /// Start of the first statement not yet checked out.
    next_offset: usize,
    statement: Option<CachedStatement<E::Statement>>,
    state: ExecState,
    /// The current row went out to the caller; the next read steps past it.
    row_taken: bool,
    bindings: Bindings,
    /// Positional values consumed so far by earlier statements.
    bindings_offset: usize,
    batch: Option<Peekable<BatchIter<'c>>>,
    exec_tracer: Option<ExecTracer>,
    row_tracer: Option<RowTracer>,
    can_cache: bool,
}

impl<'c, E: Engine> Execution<'c, E> {
    /// Set up an execution without touching the engine; the first
    /// [`step`](Self::step) prepares the first statement.
    ///
    /// An empty batch leaves the execution `Done` straight away.
    pub(crate) fn new(conn: &'c Connection<E>, sql: &str, source: BindingSource<'c>, can_cache: bool) -> Self {
        let (bindings, batch, state) = match source {
            BindingSource::Single(bindings) => (bindings, None, ExecState::Begin),
            BindingSource::Batch(iter) => {
                let mut iter = iter.peekable();
                match iter.next() {
                    Some(first) => (first, Some(iter), ExecState::Begin),
                    None => (Bindings::none(), None, ExecState::Done),
                }
            }
        };

        Self {
            conn,
            sql: sql.to_string(),
            next_offset: 0,
            statement: None,
            state,
            row_taken: false,
            bindings,
            bindings_offset: 0,
            batch,
            exec_tracer: None,
            row_tracer: None,
            can_cache,
        }
    }

    pub(crate) fn set_exec_tracer(&mut self, tracer: Option<ExecTracer>) {
        self.exec_tracer = tracer;
    }

    pub(crate) fn set_row_tracer(&mut self, tracer: Option<RowTracer>) {
        self.row_tracer = tracer;
    }

    pub(crate) fn state(&self) -> ExecState {
        self.state
    }

    /// Text not yet checked out.
    pub(crate) fn remaining_sql(&self) -> &str {
        &self.sql[self.next_offset.min(self.sql.len())..]
    }

    /// Advance until a row is available or everything has run.
    ///
    /// Any error terminates the execution: the current statement goes back
    /// to the cache (or is finalized) and the state becomes `Done`.
    pub(crate) fn step(&mut self) -> Result<()> {
        if self.state == ExecState::Done {
            return Ok(());
        }
        let result = self.step_inner();
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn step_inner(&mut self) -> Result<()> {
        let conn = self.conn;
        loop {
            let Some(statement) = self.statement.as_mut() else {
                if !self.prepare_next()? {
                    self.state = ExecState::Done;
                    return Ok(());
                }
                continue;
            };

            let mut core = conn.enter()?;
            let ConnectionCore { engine, cache } = &mut *core;
            match engine.step(statement.stmt_mut()) {
                Step::Row => {
                    self.state = ExecState::Row;
                    return Ok(());
                }
                Step::Done => {
                    if let Some(finished) = self.statement.take() {
                        cache.checkin(engine, finished)?;
                    }
                }
                Step::Busy { code, message } => return Err(StmtError::Busy { code, message }),
                Step::SchemaChanged => {
                    if let Some(stale) = self.statement.take() {
                        if let Err(e) = cache.evict(engine, stale) {
                            debug!("[Execution] finalize of stale statement failed: {}", e);
                        }
                    }
                    return Err(StmtError::SchemaChanged);
                }
                Step::Error { code, message } => return Err(StmtError::Engine { code, message }),
            }
        }
    }

    /// Check out, bind and trace the next statement. Returns `false` once
    /// the text (and every batch item) has been used up.
    fn prepare_next(&mut self) -> Result<bool> {
        let conn = self.conn;
        loop {
            if self.next_offset >= self.sql.len() {
                ensure_all_consumed(&self.bindings, self.bindings_offset)?;
                match self.batch.as_mut().and_then(Iterator::next) {
                    Some(bindings) => {
                        self.bindings = bindings;
                        self.bindings_offset = 0;
                        self.next_offset = 0;
                        if self.sql.is_empty() {
                            continue;
                        }
                    }
                    None => {
                        self.batch = None;
                        return Ok(false);
                    }
                }
            }

            let start = self.next_offset;
            let bound_from = self.bindings_offset;
            let sql_len;
            {
                let mut core = conn.enter()?;
                let ConnectionCore { engine, cache } = &mut *core;
                let checkout = cache.checkout(engine, &self.sql, start, self.can_cache)?;
                sql_len = checkout.sql_len;
                self.next_offset = match checkout.consumed {
                    0 => self.sql.len(),
                    n => start + n,
                };

                // Whitespace or comments only: nothing to run.
                let Some(mut statement) = checkout.statement else {
                    continue;
                };

                let last = self.next_offset >= self.sql.len();
                if let Err(e) = bind_parameters(
                    engine,
                    statement.stmt_mut(),
                    &self.bindings,
                    &mut self.bindings_offset,
                    last,
                ) {
                    if let Err(release) = cache.checkin(engine, statement) {
                        debug!("[Execution] release after binding error failed: {}", release);
                    }
                    return Err(e);
                }
                self.statement = Some(statement);
            }

            self.state = ExecState::Begin;
            self.trace_exec(start, sql_len, bound_from)?;
            return Ok(true);
        }
    }

    fn trace_exec(&self, start: usize, sql_len: usize, bound_from: usize) -> Result<()> {
        let Some(tracer) = self.exec_tracer.clone().or_else(|| self.conn.exec_tracer()) else {
            return Ok(());
        };

        let bindings = match &self.bindings {
            Bindings::Positional(values) => BoundParams::Positional(&values[bound_from..self.bindings_offset]),
            Bindings::Named(map) => BoundParams::Named(map),
        };
        let sql = self.sql[start..start + sql_len].trim();
        trace!("[Execution] exec tracer on {:?}", sql);

        if tracer(&ExecTrace { sql, bindings }) {
            Ok(())
        } else {
            Err(StmtError::TracerAbort)
        }
    }

    /// Values of the current row. Empty unless the state is `Row`.
    pub(crate) fn read_row(&self) -> Result<Row> {
        let Some(statement) = self.statement.as_ref().filter(|_| self.state == ExecState::Row) else {
            return Ok(Row::new());
        };
        let core = self.conn.enter()?;
        let count = core.engine.column_count(statement.stmt());
        Ok((0..count)
            .map(|i| core.engine.column_value(statement.stmt(), i))
            .collect())
    }

    /// Column names of the current statement.
    pub(crate) fn columns(&self) -> Result<Vec<String>> {
        let Some(statement) = self.statement.as_ref() else {
            return Ok(Vec::new());
        };
        let core = self.conn.enter()?;
        let count = core.engine.column_count(statement.stmt());
        Ok((0..count)
            .map(|i| core.engine.column_name(statement.stmt(), i).unwrap_or_default())
            .collect())
    }

    /// Next row for the caller, after the row tracer has had its say.
    ///
    /// A row handed out stays current until the following call, which is
    /// what steps past it. Later statements therefore only run once the
    /// caller asks for more, and their errors never cost an earlier row.
    pub(crate) fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            if self.row_taken {
                self.row_taken = false;
                self.step()?;
            }
            if self.state != ExecState::Row {
                return Ok(None);
            }
            let row = match self.read_row() {
                Ok(row) => row,
                Err(e) => {
                    self.abort();
                    return Err(e);
                }
            };
            self.row_taken = true;

            let Some(tracer) = self.row_tracer.clone().or_else(|| self.conn.row_tracer()) else {
                return Ok(Some(row));
            };
            match tracer(row) {
                Ok(RowAction::Emit(row)) => return Ok(Some(row)),
                Ok(RowAction::Skip) => continue,
                Err(e) => {
                    self.abort();
                    return Err(StmtError::RowTracer(e));
                }
            }
        }
    }

    /// Whether unexecuted statements or batch items remain.
    fn is_incomplete(&mut self) -> bool {
        self.state != ExecState::Done
            && (self.next_offset < self.sql.len()
                || self.batch.as_mut().is_some_and(|b| b.peek().is_some()))
    }

    /// Tear the execution down. Unless `force` is set, leftover statements
    /// are reported as `IncompleteExecution`; the teardown happens either
    /// way, and a forced close never fails.
    pub(crate) fn close(&mut self, force: bool) -> Result<()> {
        let incomplete = self.is_incomplete();
        let released = self.release(force);
        if force {
            if let Err(e) = released {
                debug!("[Execution] forced close ignored: {}", e);
            }
            return Ok(());
        }
        if incomplete {
            return Err(StmtError::IncompleteExecution);
        }
        released
    }

    /// Abort after an error; the original error is what the caller sees.
    fn abort(&mut self) {
        if let Err(e) = self.release(false) {
            debug!("[Execution] release during abort deferred: {}", e);
        }
    }

    /// Mark the execution done and hand the current statement back.
    ///
    /// Without `force` the connection is only entered if it is free; on
    /// `ConcurrentUse` the statement is kept and released on drop. A forced
    /// release waits for the lock, so it may block behind an engine call
    /// running on another thread.
    fn release(&mut self, force: bool) -> Result<()> {
        self.state = ExecState::Done;
        self.row_taken = false;
        self.batch = None;
        let Some(statement) = self.statement.take() else {
            return Ok(());
        };

        let conn = self.conn;
        let mut core = if force {
            conn.enter_blocking()
        } else {
            match conn.enter() {
                Ok(core) => core,
                Err(e) => {
                    self.statement = Some(statement);
                    return Err(e);
                }
            }
        };
        let ConnectionCore { engine, cache } = &mut *core;
        cache.checkin(engine, statement)
    }
}

impl<E: Engine> Drop for Execution<'_, E> {
    fn drop(&mut self) {
        if self.statement.is_some() {
            if let Err(e) = self.release(true) {
                debug!("[Execution] release on drop failed: {}", e);
            }
        }
    }
}
