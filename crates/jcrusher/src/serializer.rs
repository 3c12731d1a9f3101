use bytes::{BufMut, BytesMut};
use serde_json::Value;

use crate::error::TransformError;

/// Turns an accepted value into its output bytes.
///
/// The whole document is written in one call; there is no incremental
/// serialization.
pub trait Serializer<V> {
    fn serialize(&self, value: &V, out: &mut BytesMut) -> Result<(), TransformError>;
}

/// Compact JSON: no insignificant whitespace, object keys in document order.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactJson;

impl Serializer<Value> for CompactJson {
    fn serialize(&self, value: &Value, out: &mut BytesMut) -> Result<(), TransformError> {
        serde_json::to_writer(out.writer(), value).map_err(|err| TransformError::Serialize {
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crush(input: &str) -> String {
        let value: Value = serde_json::from_str(input).unwrap();
        let mut out = BytesMut::new();
        CompactJson.serialize(&value, &mut out).unwrap();
        String::from_utf8(out.to_vec()).unwrap()
    }

    #[test]
    fn strips_whitespace_and_keeps_key_order() {
        assert_eq!(
            crush("{\n  \"z\": [ 1, 2 ],\n  \"a\": { \"k\" : \"v w\" }\n}"),
            r#"{"z":[1,2],"a":{"k":"v w"}}"#
        );
    }

    #[test]
    fn scalars_round_out_unchanged() {
        assert_eq!(crush(" true "), "true");
        assert_eq!(crush("\"tab\\there\""), "\"tab\\there\"");
        assert_eq!(crush("-1.5"), "-1.5");
    }
}
