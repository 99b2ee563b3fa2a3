//! Exec and row tracers
//!
//! An exec tracer sees every statement right before its first step and can
//! veto it. A row tracer sees every row before the caller does and can
//! replace it, skip it, or fail the execution.

use crate::types::{BoundParams, Row};
use std::sync::Arc;

/// What an exec tracer is shown.
#[derive(Debug, Clone, Copy)]
pub struct ExecTrace<'a> {
    /// Text of the statement about to run.
    pub sql: &'a str,
    /// Values just bound to it.
    pub bindings: BoundParams<'a>,
}

/// Returned by a row tracer.
#[derive(Debug, Clone, PartialEq)]
pub enum RowAction {
    /// Hand this row (possibly rewritten) to the caller.
    Emit(Row),
    /// Drop the row and fetch the next one.
    Skip,
}

/// Returning `false` aborts the execution with `StmtError::TracerAbort`.
pub type ExecTracer = Arc<dyn Fn(&ExecTrace<'_>) -> bool + Send + Sync>;

/// An error aborts the execution with `StmtError::RowTracer`.
pub type RowTracer = Arc<dyn Fn(Row) -> anyhow::Result<RowAction> + Send + Sync>;

pub fn exec_tracer<F>(f: F) -> ExecTracer
where
    F: Fn(&ExecTrace<'_>) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn row_tracer<F>(f: F) -> RowTracer
where
    F: Fn(Row) -> anyhow::Result<RowAction> + Send + Sync + 'static,
{
    Arc::new(f)
}
