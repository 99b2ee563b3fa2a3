//! Execution of (multi-statement) SQL text
//!
//! - binding: applies a binding set to one statement
//! - execution: the per-execution state machine
//! - trace: exec/row tracer hooks

mod binding;
mod execution;
pub mod trace;

pub(crate) use execution::{BindingSource, Execution};
pub use trace::{exec_tracer, row_tracer, ExecTrace, ExecTracer, RowAction, RowTracer};

/// State of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    /// Statement bound, not stepped yet
    Begin,
    /// Positioned on a result row; stays here until the next read steps on
    Row,
    /// Finished or aborted; terminal
    Done,
}
