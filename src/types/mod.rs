//! Value domain exchanged with the engine

mod bindings;

pub use bindings::{BoundParams, Bindings, NamedBindings};

use crate::{Result, StmtError};
use serde::{Deserialize, Serialize};

/// A single SQL value, as bound to a parameter or read from a result column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    /// Null value
    Null,

    /// 64-bit signed integer
    Integer(i64),

    /// IEEE double
    Float(f64),

    /// UTF-8 text
    Text(String),

    /// Binary blob
    Blob(Vec<u8>),

    /// Placeholder reserving N zero bytes (for later incremental blob I/O).
    /// Only meaningful as a binding; the engine never returns it.
    ZeroBlob(usize),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::ZeroBlob(_) => "zeroblob",
        }
    }
}

/// A materialized result row
pub type Row = Vec<Value>;

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl TryFrom<u64> for Value {
    type Error = StmtError;

    fn try_from(v: u64) -> Result<Self> {
        i64::try_from(v)
            .map(Value::Integer)
            .map_err(|_| StmtError::BindingType(format!("{} does not fit in a 64-bit signed integer", v)))
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = StmtError;

    fn try_from(v: serde_json::Value) -> Result<Self> {
        use serde_json::Value as Json;

        match v {
            Json::Null => Ok(Value::Null),
            Json::Bool(b) => Ok(Value::from(b)),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Integer(i))
                } else if n.is_u64() {
                    Err(StmtError::BindingType(format!("{} does not fit in a 64-bit signed integer", n)))
                } else {
                    n.as_f64()
                        .map(Value::Float)
                        .ok_or_else(|| StmtError::BindingType(format!("unrepresentable number {}", n)))
                }
            }
            Json::String(s) => Ok(Value::Text(s)),
            Json::Array(_) => Err(StmtError::BindingType("array".to_string())),
            Json::Object(_) => Err(StmtError::BindingType("object".to_string())),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        use serde_json::Value as Json;

        match v {
            Value::Null => Json::Null,
            Value::Integer(i) => Json::from(*i),
            // NaN and infinities have no JSON form
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::Text(s) => Json::String(s.clone()),
            Value::Blob(b) => Json::Array(b.iter().map(|byte| Json::from(*byte)).collect()),
            Value::ZeroBlob(n) => Json::Array(vec![Json::from(0u8); *n]),
        }
    }
}

/// Materialize a row as a JSON array.
pub fn row_to_json(row: &[Value]) -> serde_json::Value {
    serde_json::Value::Array(row.iter().map(serde_json::Value::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_host_conversions() {
        assert_eq!(Value::from(7i32), Value::Integer(7));
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from("x"), Value::Text("x".to_string()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(&b"ab"[..]), Value::Blob(vec![b'a', b'b']));
    }

    #[test]
    fn test_unsigned_overflow_is_type_error() {
        assert_eq!(Value::try_from(5u64).unwrap(), Value::Integer(5));
        assert!(matches!(Value::try_from(u64::MAX), Err(StmtError::BindingType(_))));
    }

    #[test]
    fn test_json_values() {
        assert_eq!(Value::try_from(json!(1.5)).unwrap(), Value::Float(1.5));
        assert_eq!(Value::try_from(json!("hi")).unwrap(), Value::Text("hi".to_string()));
        assert_eq!(Value::try_from(json!(null)).unwrap(), Value::Null);
        assert!(matches!(Value::try_from(json!([1, 2])), Err(StmtError::BindingType(_))));
        assert!(matches!(Value::try_from(json!({"a": 1})), Err(StmtError::BindingType(_))));
        assert!(matches!(Value::try_from(json!(u64::MAX)), Err(StmtError::BindingType(_))));
    }

    #[test]
    fn test_row_to_json() {
        let row = vec![
            Value::Integer(1),
            Value::Float(f64::NAN),
            Value::Blob(vec![1, 2]),
            Value::Text("a".to_string()),
        ];
        assert_eq!(row_to_json(&row), json!([1, null, [1, 2], "a"]));
    }
}
