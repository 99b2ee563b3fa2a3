//! Scripted engine for unit tests
//!
//! Statements are separated by `;`. The first word decides the behaviour:
//! - `ROWS n`   n rows, one column holding the 1-based row number
//! - `ECHO ...` one row holding the bound parameter values
//! - `BUSY`, `SCHEMA`, `FAIL` step outcomes
//! - `BADSQL`   prepare fails
//! - anything else completes without rows
//!
//! `?` declares an anonymous parameter, `:name` a named one.

use super::{Engine, Prepared, Step};
use crate::types::Value;
use crate::{Result, StmtError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Rows(usize),
    Echo,
    Busy,
    Schema,
    Fail,
    Plain,
}

#[derive(Debug)]
pub(crate) struct MockStatement {
    pub(crate) id: u64,
    pub(crate) sql: String,
    kind: Kind,
    params: Vec<Option<String>>,
    pub(crate) bound: Vec<Value>,
    emitted: usize,
}

#[derive(Debug, Default)]
pub(crate) struct MockEngine {
    next_id: u64,
    pub(crate) prepares: usize,
    pub(crate) steps: usize,
    pub(crate) resets: usize,
    pub(crate) finalized: usize,
    pub(crate) live: usize,
    pub(crate) fail_reset: bool,
    pub(crate) fail_finalize: bool,
}

impl MockEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

fn parse_params(text: &str) -> Vec<Option<String>> {
    let mut params = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '?' => params.push(None),
            ':' => {
                let mut end = i + 1;
                while let Some(&(j, n)) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        end = j + n.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                params.push(Some(text[i..end].to_string()));
            }
            _ => {}
        }
    }
    params
}

impl Engine for MockEngine {
    type Statement = MockStatement;

    fn prepare(&mut self, sql: &str) -> Result<Prepared<MockStatement>> {
        let start = sql.len() - sql.trim_start().len();
        if start == sql.len() {
            return Ok(Prepared {
                statement: None,
                consumed: sql.len(),
            });
        }
        let end = sql[start..].find(';').map_or(sql.len(), |i| start + i + 1);
        let text = sql[start..end].trim_end_matches(';').trim();
        let mut words = text.split_whitespace();
        let kind = match words.next().unwrap_or("") {
            "BADSQL" => {
                return Err(StmtError::Engine {
                    code: 1,
                    message: format!("near \"{}\": syntax error", text),
                })
            }
            "ROWS" => Kind::Rows(words.next().and_then(|n| n.parse().ok()).unwrap_or(0)),
            "ECHO" => Kind::Echo,
            "BUSY" => Kind::Busy,
            "SCHEMA" => Kind::Schema,
            "FAIL" => Kind::Fail,
            _ => Kind::Plain,
        };
        let params = parse_params(text);

        self.prepares += 1;
        self.live += 1;
        self.next_id += 1;
        Ok(Prepared {
            statement: Some(MockStatement {
                id: self.next_id,
                sql: text.to_string(),
                kind,
                bound: vec![Value::Null; params.len()],
                params,
                emitted: 0,
            }),
            consumed: end,
        })
    }

    fn step(&mut self, stmt: &mut MockStatement) -> Step {
        self.steps += 1;
        match stmt.kind {
            Kind::Rows(n) if stmt.emitted < n => {
                stmt.emitted += 1;
                Step::Row
            }
            Kind::Echo if stmt.emitted == 0 => {
                stmt.emitted = 1;
                Step::Row
            }
            Kind::Busy => Step::Busy {
                code: 5,
                message: "database is locked".to_string(),
            },
            Kind::Schema => Step::SchemaChanged,
            Kind::Fail => Step::Error {
                code: 1,
                message: "scripted failure".to_string(),
            },
            _ => Step::Done,
        }
    }

    fn reset(&mut self, stmt: &mut MockStatement) -> Result<()> {
        self.resets += 1;
        stmt.emitted = 0;
        if self.fail_reset {
            return Err(StmtError::Engine {
                code: 1,
                message: "reset failed".to_string(),
            });
        }
        Ok(())
    }

    fn clear_bindings(&mut self, stmt: &mut MockStatement) -> Result<()> {
        stmt.bound.iter_mut().for_each(|v| *v = Value::Null);
        Ok(())
    }

    fn finalize(&mut self, _stmt: MockStatement) -> Result<()> {
        self.finalized += 1;
        self.live -= 1;
        if self.fail_finalize {
            return Err(StmtError::Engine {
                code: 1,
                message: "finalize failed".to_string(),
            });
        }
        Ok(())
    }

    fn bind_parameter_count(&self, stmt: &MockStatement) -> usize {
        stmt.params.len()
    }

    fn bind_parameter_name(&self, stmt: &MockStatement, index: usize) -> Option<String> {
        stmt.params.get(index - 1).cloned().flatten()
    }

    fn bind_value(&mut self, stmt: &mut MockStatement, index: usize, value: &Value) -> Result<()> {
        let slot = stmt.bound.get_mut(index - 1).ok_or_else(|| StmtError::Engine {
            code: 25,
            message: "column index out of range".to_string(),
        })?;
        *slot = value.clone();
        Ok(())
    }

    fn column_count(&self, stmt: &MockStatement) -> usize {
        match stmt.kind {
            Kind::Rows(_) => 1,
            Kind::Echo => stmt.params.len(),
            _ => 0,
        }
    }

    fn column_name(&self, stmt: &MockStatement, index: usize) -> Option<String> {
        match stmt.kind {
            Kind::Rows(_) if index == 0 => Some("n".to_string()),
            Kind::Echo if index < stmt.params.len() => Some(format!("p{}", index + 1)),
            _ => None,
        }
    }

    fn column_value(&self, stmt: &MockStatement, index: usize) -> Value {
        match stmt.kind {
            Kind::Rows(_) => Value::Integer(stmt.emitted as i64),
            Kind::Echo => stmt.bound.get(index).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}
