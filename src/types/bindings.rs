//! Parameter bindings supplied for one execution
//!
//! A binding set is either an ordered sequence (consumed left to right across
//! the statements of a multi-statement text) or a name -> value mapping
//! (looked up afresh by every statement).

use super::Value;
use crate::{Result, StmtError};
use ahash::AHashMap;

/// Named bindings, keyed without the engine's prefix marker (`:`, `@`, `$`).
pub type NamedBindings = AHashMap<String, Value>;

#[derive(Debug, Clone)]
pub enum Bindings {
    Positional(Vec<Value>),
    Named(NamedBindings),
}

impl Default for Bindings {
    fn default() -> Self {
        Bindings::Positional(Vec::new())
    }
}

impl Bindings {
    /// No bindings at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Bindings::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Bindings::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build bindings from JSON: an array is positional, an object is named,
    /// `null` means no bindings.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        use serde_json::Value as Json;

        match json {
            Json::Null => Ok(Bindings::none()),
            Json::Array(items) => Ok(Bindings::Positional(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<Vec<_>>>()?,
            )),
            Json::Object(map) => Ok(Bindings::Named(
                map.into_iter()
                    .map(|(k, v)| Ok((k, Value::try_from(v)?)))
                    .collect::<Result<NamedBindings>>()?,
            )),
            other => Err(StmtError::BindingType(format!(
                "bindings must be an array or an object, got {}",
                other
            ))),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_json(serde_json::from_str(json)?)
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Bindings::Named(_))
    }

    /// Number of supplied values.
    pub fn len(&self) -> usize {
        match self {
            Bindings::Positional(values) => values.len(),
            Bindings::Named(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<()> for Bindings {
    fn from(_: ()) -> Self {
        Bindings::none()
    }
}

impl From<Vec<Value>> for Bindings {
    fn from(values: Vec<Value>) -> Self {
        Bindings::Positional(values)
    }
}

impl<V: Into<Value>, const N: usize> From<[V; N]> for Bindings {
    fn from(values: [V; N]) -> Self {
        Bindings::positional(values)
    }
}

impl From<NamedBindings> for Bindings {
    fn from(map: NamedBindings) -> Self {
        Bindings::Named(map)
    }
}

/// The values applied to one statement, as shown to an exec tracer.
#[derive(Debug, Clone, Copy)]
pub enum BoundParams<'a> {
    /// The slice of a positional sequence consumed by this statement.
    Positional(&'a [Value]),
    /// The whole mapping the statement looked its names up in.
    Named(&'a NamedBindings),
}

impl<'a> BoundParams<'a> {
    pub fn len(&self) -> usize {
        match self {
            BoundParams::Positional(values) => values.len(),
            BoundParams::Named(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
