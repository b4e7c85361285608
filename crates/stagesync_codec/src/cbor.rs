//! Thin helpers over `ciborium` for document-shaped CBOR.

use crate::error::{CodecError, CodecResult};
use ciborium::value::{Integer, Value as Cbor};

/// Serializes a CBOR value to bytes.
pub(crate) fn encode(value: &Cbor) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(out)
}

/// Parses bytes into a CBOR value.
pub(crate) fn decode(bytes: &[u8]) -> CodecResult<Cbor> {
    if bytes.is_empty() {
        return Err(CodecError::decoding_failed("empty input"));
    }
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

/// Builds a text-keyed map.
pub(crate) fn map(pairs: Vec<(&str, Cbor)>) -> Cbor {
    Cbor::Map(
        pairs
            .into_iter()
            .map(|(k, v)| (Cbor::Text(k.to_string()), v))
            .collect(),
    )
}

pub(crate) fn integer(value: i64) -> Cbor {
    Cbor::Integer(Integer::from(value))
}

/// Reads a map, naming `what` in the error.
pub(crate) fn as_map<'a>(value: &'a Cbor, what: &str) -> CodecResult<&'a Vec<(Cbor, Cbor)>> {
    value
        .as_map()
        .ok_or_else(|| CodecError::invalid_structure(format!("expected map for {what}")))
}

/// Reads an array, naming `what` in the error.
pub(crate) fn as_array<'a>(value: &'a Cbor, what: &str) -> CodecResult<&'a Vec<Cbor>> {
    value
        .as_array()
        .ok_or_else(|| CodecError::invalid_structure(format!("expected array for {what}")))
}

/// Looks up a text key in a map.
pub(crate) fn field<'a>(map: &'a [(Cbor, Cbor)], name: &str) -> Option<&'a Cbor> {
    map.iter()
        .find(|(k, _)| k.as_text() == Some(name))
        .map(|(_, v)| v)
}

/// Looks up a required text field.
pub(crate) fn required_text(map: &[(Cbor, Cbor)], name: &str) -> CodecResult<String> {
    field(map, name)
        .and_then(Cbor::as_text)
        .map(str::to_string)
        .ok_or_else(|| CodecError::invalid_structure(format!("missing {name}")))
}

/// Looks up an optional integer field; `Null` reads as absent.
pub(crate) fn optional_integer(map: &[(Cbor, Cbor)], name: &str) -> CodecResult<Option<i64>> {
    match field(map, name) {
        None | Some(Cbor::Null) => Ok(None),
        Some(Cbor::Integer(i)) => i64::try_from(*i)
            .map(Some)
            .map_err(|_| CodecError::decoding_failed(format!("{name} out of range"))),
        Some(_) => Err(CodecError::invalid_structure(format!(
            "{name} must be an integer"
        ))),
    }
}

/// Looks up an optional text field; `Null` reads as absent.
pub(crate) fn optional_text(map: &[(Cbor, Cbor)], name: &str) -> Option<String> {
    field(map, name).and_then(Cbor::as_text).map(str::to_string)
}
