//! Parameter binding for one statement

use crate::engine::Engine;
use crate::types::Bindings;
use crate::{Result, StmtError};

/// Strip the engine's prefix marker (`:name`, `@name`, `$name`, `?NNN`).
fn strip_marker(name: &str) -> &str {
    name.strip_prefix(|c: char| matches!(c, ':' | '@' | '$' | '?'))
        .unwrap_or(name)
}

/// Bind `bindings` to every parameter the statement declares.
///
/// Positional values are taken from `offset` onwards and `offset` advances by
/// the statement's parameter count. While more statements follow, at least
/// that many values must remain; the last statement must use up the
/// remainder exactly. Named bindings are looked up by parameter name; a name
/// missing from the mapping is left unbound (NULL).
pub(crate) fn bind_parameters<E: Engine>(
    engine: &mut E,
    stmt: &mut E::Statement,
    bindings: &Bindings,
    offset: &mut usize,
    last_statement: bool,
) -> Result<()> {
    let count = engine.bind_parameter_count(stmt);

    match bindings {
        Bindings::Named(map) => {
            for index in 1..=count {
                let name = engine
                    .bind_parameter_name(stmt, index)
                    .ok_or(StmtError::UnnamedBinding { index })?;
                if let Some(value) = map.get(strip_marker(&name)) {
                    engine.bind_value(stmt, index, value)?;
                }
            }
        }
        Bindings::Positional(values) => {
            let supplied = values.len().saturating_sub(*offset);
            if supplied < count || (last_statement && supplied != count) {
                return Err(StmtError::BindingCountMismatch {
                    expected: count,
                    supplied,
                });
            }
            for (i, value) in values[*offset..*offset + count].iter().enumerate() {
                engine.bind_value(stmt, i + 1, value)?;
            }
            *offset += count;
        }
    }
    Ok(())
}

/// Once the text has run out, every positional value must have been used.
///
/// Catches surplus values that the last statement's own check misses, e.g.
/// when only a comment follows it.
pub(crate) fn ensure_all_consumed(bindings: &Bindings, offset: usize) -> Result<()> {
    match bindings {
        Bindings::Positional(values) if offset != values.len() => Err(StmtError::BindingCountMismatch {
            expected: offset,
            supplied: values.len(),
        }),
        _ => Ok(()),
    }
}
