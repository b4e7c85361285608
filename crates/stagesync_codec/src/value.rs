//! Dynamic cell value type.

use crate::error::{CodecError, CodecResult};
use ciborium::value::{Integer, Value as Cbor};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// CBOR tag for binary UUIDs (RFC 9562 registration).
const UUID_TAG: u64 = 37;

/// A single column value inside a change-set row.
///
/// Floats are intentionally absent: numeric columns travel as integers
/// (timestamps as Unix milliseconds) so that rows compare exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null / absent value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer; also used for identifiers.
    Integer(i64),
    /// Globally unique identifier.
    Guid(Uuid),
    /// Text string (UTF-8).
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value, accepting integer 0/1 as well.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(0) => Some(false),
            Value::Integer(1) => Some(true),
            _ => None,
        }
    }

    /// Returns the integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as an object identifier.
    ///
    /// Identifiers are positive; `0` and `Null` both mean "no reference".
    pub fn as_id(&self) -> Option<i64> {
        match self {
            Value::Integer(i) if *i > 0 => Some(*i),
            _ => None,
        }
    }

    /// Returns the text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the byte string value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the GUID value. Text columns holding a GUID are parsed.
    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            Value::Guid(g) => Some(*g),
            Value::Text(s) => Uuid::parse_str(s).ok(),
            _ => None,
        }
    }

    /// Converts this value into its CBOR representation.
    pub fn to_cbor(&self) -> Cbor {
        match self {
            Value::Null => Cbor::Null,
            Value::Bool(b) => Cbor::Bool(*b),
            Value::Integer(i) => Cbor::Integer(Integer::from(*i)),
            Value::Guid(g) => Cbor::Tag(UUID_TAG, Box::new(Cbor::Bytes(g.as_bytes().to_vec()))),
            Value::Text(s) => Cbor::Text(s.clone()),
            Value::Bytes(b) => Cbor::Bytes(b.clone()),
        }
    }

    /// Builds a value from its CBOR representation.
    ///
    /// # Errors
    ///
    /// Returns an error for floats, nested containers, unknown tags or
    /// integers outside the `i64` range.
    pub fn from_cbor(cbor: &Cbor) -> CodecResult<Self> {
        match cbor {
            Cbor::Null => Ok(Value::Null),
            Cbor::Bool(b) => Ok(Value::Bool(*b)),
            Cbor::Integer(i) => i64::try_from(*i)
                .map(Value::Integer)
                .map_err(|_| CodecError::decoding_failed("integer out of range")),
            Cbor::Text(s) => Ok(Value::Text(s.clone())),
            Cbor::Bytes(b) => Ok(Value::Bytes(b.clone())),
            Cbor::Tag(UUID_TAG, inner) => {
                let bytes = inner
                    .as_bytes()
                    .ok_or_else(|| CodecError::invalid_structure("uuid tag must wrap bytes"))?;
                Uuid::from_slice(bytes)
                    .map(Value::Guid)
                    .map_err(|_| CodecError::invalid_structure("uuid must be 16 bytes"))
            }
            Cbor::Tag(tag, _) => Err(CodecError::unsupported_type(format!("tag {tag}"))),
            Cbor::Float(_) => Err(CodecError::unsupported_type("float")),
            Cbor::Array(_) => Err(CodecError::unsupported_type("array")),
            Cbor::Map(_) => Err(CodecError::unsupported_type("map")),
            _ => Err(CodecError::unsupported_type("unknown")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Guid(g) => write!(f, "{g}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
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

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Guid(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_semantics() {
        assert_eq!(Value::Integer(7).as_id(), Some(7));
        assert_eq!(Value::Integer(0).as_id(), None);
        assert_eq!(Value::Null.as_id(), None);
        assert_eq!(Value::Text("7".into()).as_id(), None);
    }

    #[test]
    fn guid_from_text() {
        let g = Uuid::new_v4();
        assert_eq!(Value::Text(g.to_string()).as_guid(), Some(g));
        assert_eq!(Value::Guid(g).as_guid(), Some(g));
        assert_eq!(Value::Text("not-a-guid".into()).as_guid(), None);
    }

    #[test]
    fn guid_survives_cbor() {
        let g = Uuid::new_v4();
        let cbor = Value::Guid(g).to_cbor();
        assert_eq!(Value::from_cbor(&cbor).unwrap(), Value::Guid(g));
    }

    #[test]
    fn floats_rejected() {
        let err = Value::from_cbor(&Cbor::Float(1.5)).unwrap_err();
        assert_eq!(err, CodecError::unsupported_type("float"));
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }
}
