//! Payload converter: the boundary between opaque wire payloads and the
//! values workflow code actually sees.
//!
//! Three encodings are known. `binary/null` carries no data and decodes to
//! [`PayloadValue::Null`]; `binary/plain` carries raw bytes; `json/plain`
//! carries UTF-8 JSON. Payloads are never mutated downstream of the
//! converter.

use crate::protocol::{Payload, Payloads};
use serde_json::Value;
use std::collections::BTreeMap;

pub const ENCODING_KEY: &str = "encoding";
pub const ENCODING_NULL: &str = "binary/null";
pub const ENCODING_RAW: &str = "binary/plain";
pub const ENCODING_JSON: &str = "json/plain";

/// A decoded payload as handed to (and returned from) workflow code.
///
/// `Null` is the "no explicit value" form: a workflow that completes without
/// a meaningful result returns it, and the converter renders it as the single
/// `binary/null` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    Null,
    Json(Value),
    Raw(Vec<u8>),
}

impl PayloadValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PayloadValue::Null)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            PayloadValue::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            PayloadValue::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }
}

fn with_encoding(encoding: &str, data: Option<Vec<u8>>) -> Payload {
    let mut metadata = BTreeMap::new();
    metadata.insert(ENCODING_KEY.to_string(), encoding.as_bytes().to_vec());
    Payload { metadata, data }
}

/// Encode a value for the wire.
pub fn to_payload(value: &PayloadValue) -> Payload {
    match value {
        PayloadValue::Null => with_encoding(ENCODING_NULL, None),
        PayloadValue::Raw(bytes) => with_encoding(ENCODING_RAW, Some(bytes.clone())),
        // Value maps always have string keys, so serialization cannot fail.
        PayloadValue::Json(value) => with_encoding(
            ENCODING_JSON,
            Some(serde_json::to_vec(value).unwrap_or_default()),
        ),
    }
}

/// Decode a wire payload. Unknown or missing encodings are rejected.
pub fn from_payload(payload: &Payload) -> Result<PayloadValue, String> {
    let encoding = payload
        .metadata
        .get(ENCODING_KEY)
        .ok_or_else(|| "payload has no encoding metadata".to_string())?;
    let encoding =
        std::str::from_utf8(encoding).map_err(|e| format!("encoding is not UTF-8: {e}"))?;

    match encoding {
        ENCODING_NULL => Ok(PayloadValue::Null),
        ENCODING_RAW => Ok(PayloadValue::Raw(
            payload.data.clone().unwrap_or_default(),
        )),
        ENCODING_JSON => {
            let data = payload
                .data
                .as_deref()
                .ok_or_else(|| "json/plain payload has no data".to_string())?;
            let value: Value =
                serde_json::from_slice(data).map_err(|e| format!("invalid JSON body: {e}"))?;
            Ok(PayloadValue::Json(value))
        }
        other => Err(format!("unknown payload encoding '{other}'")),
    }
}

/// Decode a whole argument list. Absent `Payloads` means no arguments.
pub fn from_payloads(payloads: Option<&Payloads>) -> Result<Vec<PayloadValue>, String> {
    payloads
        .map(|p| p.payloads.iter().map(from_payload).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}
