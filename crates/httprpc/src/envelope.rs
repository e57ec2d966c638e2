//! Wire envelopes and their JSON codec.
//!
//! A call travels as a call envelope, the answer as a result envelope:
//!
//! ```text
//! { "method": string, "data": <any>, "signature": base64 string } (call)
//! { "status": integer, "data": <any> | "error": string }          (result)
//! ```
//!
//! `data` stays an untyped JSON value here. Only the client and the handler
//! know its schema, so a broken top-level envelope can be rejected without
//! knowing anything about payload types.

use crate::config::ProtocolConfig;
use crate::{Result, RpcError};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Envelope status. Doubles as the HTTP status code of the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(pub u16);

impl Status {
    pub const OK: Status = Status(ProtocolConfig::STATUS_OK);
    pub const ERROR: Status = Status(ProtocolConfig::STATUS_ERROR);

    pub fn is_ok(self) -> bool {
        self == Status::OK
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named-method call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub method: String,
    #[serde(default)]
    pub data: Value,
    /// Opaque, never validated here. Standard base64 on the wire.
    #[serde(
        default,
        with = "signature_base64",
        skip_serializing_if = "Option::is_none"
    )]
    pub signature: Option<Vec<u8>>,
}

mod signature_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(signature: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match signature {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}

impl CallEnvelope {
    pub fn new(method: impl Into<String>, data: Value) -> Self {
        Self {
            method: method.into(),
            data,
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = Some(signature);
        self
    }
}

/// The answer to a call. Exactly one of `data`/`error` is set, chosen by
/// `status`; the constructors and `decode_result` both enforce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    status: Status,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// `"data": null` is a real OK payload, not an absent field.
fn present_value<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl ResultEnvelope {
    pub(crate) fn ok(data: Value) -> Self {
        Self {
            status: Status::OK,
            data: Some(data),
            error: None,
        }
    }

    pub(crate) fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::ERROR,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Unwrap into the payload, or a `Remote` error carrying the server's
    /// message untouched.
    pub fn into_result(self) -> Result<Value> {
        if self.status.is_ok() {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(RpcError::Remote {
                status: self.status,
                message: self.error.unwrap_or_default(),
            })
        }
    }

    fn validate(mut self) -> Result<Self> {
        if self.status.is_ok() {
            if self.error.is_some() {
                return Err(RpcError::malformed("OK result must not carry an error"));
            }
            self.data.get_or_insert(Value::Null);
        } else {
            if self.error.is_none() {
                return Err(RpcError::malformed(format!(
                    "status {} result is missing its error message",
                    self.status
                )));
            }
            // Some servers send `"data": null` next to the error.
            if self.data.take().is_some_and(|data| !data.is_null()) {
                return Err(RpcError::malformed(format!(
                    "status {} result must not carry data",
                    self.status
                )));
            }
        }
        Ok(self)
    }
}

/// Serialize `value` into the `data` of a call envelope for `method`.
pub fn encode_call<T: Serialize + ?Sized>(method: &str, value: &T) -> Result<Vec<u8>> {
    encode_call_signed(method, value, None)
}

/// Like [`encode_call`], attaching an opaque signature.
pub fn encode_call_signed<T: Serialize + ?Sized>(
    method: &str,
    value: &T,
    signature: Option<Vec<u8>>,
) -> Result<Vec<u8>> {
    if method.is_empty() {
        return Err(RpcError::configuration("method must not be empty"));
    }
    let envelope = CallEnvelope {
        method: method.to_string(),
        data: serde_json::to_value(value)?,
        signature,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

pub fn decode_call(bytes: &[u8]) -> Result<CallEnvelope> {
    let envelope: CallEnvelope =
        serde_json::from_slice(bytes).map_err(|e| RpcError::malformed(e.to_string()))?;
    if envelope.method.is_empty() {
        return Err(RpcError::malformed("method must not be empty"));
    }
    Ok(envelope)
}

pub fn encode_result(envelope: &ResultEnvelope) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(envelope)?)
}

pub fn decode_result(bytes: &[u8]) -> Result<ResultEnvelope> {
    let envelope: ResultEnvelope =
        serde_json::from_slice(bytes).map_err(|e| RpcError::malformed(e.to_string()))?;
    envelope.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_envelope_roundtrip() {
        let bytes = encode_call("echo", &json!({"x": 1})).unwrap();
        let call = decode_call(&bytes).unwrap();

        assert_eq!(call.method, "echo");
        assert_eq!(call.data, json!({"x": 1}));
        assert_eq!(call.signature, None);
    }

    #[test]
    fn test_signature_is_carried_and_omitted_when_absent() {
        let bytes = encode_call_signed("echo", &1, Some(vec![1, 2, 3])).unwrap();
        assert_eq!(decode_call(&bytes).unwrap().signature, Some(vec![1, 2, 3]));

        let unsigned = String::from_utf8(encode_call("echo", &1).unwrap()).unwrap();
        assert!(!unsigned.contains("signature"));

        let explicit_null = decode_call(br#"{"method": "echo", "signature": null}"#).unwrap();
        assert_eq!(explicit_null.signature, None);
    }

    #[test]
    fn test_signature_is_standard_base64_on_the_wire() {
        let call = decode_call(br#"{"method": "echo", "data": 1, "signature": "AQID"}"#).unwrap();
        assert_eq!(call.signature, Some(vec![1, 2, 3]));

        let bytes = encode_call_signed("echo", &1, call.signature).unwrap();
        let wire: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(wire["signature"], "AQID");

        // Standard alphabet, padded.
        let bytes = encode_call_signed("echo", &1, Some(vec![0xfb, 0xff])).unwrap();
        let wire: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(wire["signature"], "+/8=");
    }

    #[test]
    fn test_encode_call_empty_method_is_configuration() {
        let err = encode_call("", &1).unwrap_err();
        assert!(matches!(err, RpcError::Configuration { .. }));
    }

    #[test]
    fn test_decode_call_missing_method_is_malformed() {
        let err = decode_call(br#"{"data": {"x": 1}}"#).unwrap_err();
        assert!(matches!(err, RpcError::MalformedEnvelope { .. }));
        assert!(err.to_string().contains("method"));
    }

    #[test]
    fn test_decode_call_rejects_bad_shapes() {
        for input in [
            &b"not json"[..],
            br#"[1, 2]"#,
            br#"{"method": 7}"#,
            br#"{"method": ""}"#,
            br#"{"method": "echo", "signature": "not base64!"}"#,
            br#"{"method": "echo", "signature": [1, 2, 3]}"#,
        ] {
            let err = decode_call(input).unwrap_err();
            assert!(
                matches!(err, RpcError::MalformedEnvelope { .. }),
                "expected malformed for {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_decode_call_missing_data_is_null() {
        let call = decode_call(br#"{"method": "ping"}"#).unwrap();
        assert_eq!(call.data, Value::Null);
    }

    #[test]
    fn test_encode_call_rejects_unrepresentable_value() {
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], "non-string key");
        let err = encode_call("echo", &map).unwrap_err();
        assert!(matches!(err, RpcError::Serialization { .. }));
    }

    #[test]
    fn test_ok_result_roundtrip_keeps_null_payload() {
        let envelope = ResultEnvelope::ok(Value::Null);
        let decoded = decode_result(&encode_result(&envelope).unwrap()).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_result_never_carries_both_fields() {
        let ok: Value = serde_json::from_slice(
            &encode_result(&ResultEnvelope::ok(json!({"x": 1}))).unwrap(),
        )
        .unwrap();
        assert_eq!(ok, json!({"status": 200, "data": {"x": 1}}));

        let err: Value =
            serde_json::from_slice(&encode_result(&ResultEnvelope::error("bad")).unwrap())
                .unwrap();
        assert_eq!(err, json!({"status": 500, "error": "bad"}));
    }

    #[test]
    fn test_decode_result_rejects_inconsistent_envelopes() {
        for input in [
            &br#"{"status": 200, "data": 1, "error": "both"}"#[..],
            br#"{"status": 500}"#,
            br#"{"status": 500, "data": 1, "error": "x"}"#,
            br#"{"data": 1}"#,
            b"<html>502</html>",
        ] {
            let err = decode_result(input).unwrap_err();
            assert!(matches!(err, RpcError::MalformedEnvelope { .. }));
        }
    }

    #[test]
    fn test_ok_without_data_decodes_as_null() {
        let envelope = decode_result(br#"{"status": 200}"#).unwrap();
        assert_eq!(envelope.data(), Some(&Value::Null));
    }

    #[test]
    fn test_error_result_into_remote() {
        let envelope = decode_result(br#"{"status": 500, "error": "bad input"}"#).unwrap();
        match envelope.into_result().unwrap_err() {
            RpcError::Remote { status, message } => {
                assert_eq!(status, Status::ERROR);
                assert_eq!(message, "bad input");
            }
            other => panic!("Expected Remote, got: {:?}", other),
        }
    }

    #[test]
    fn test_error_result_with_null_data_is_accepted() {
        let envelope =
            decode_result(br#"{"status": 500, "data": null, "error": "bad input"}"#).unwrap();
        assert_eq!(envelope.data(), None);
        assert_eq!(envelope.error_message(), Some("bad input"));
        assert_eq!(envelope.into_result().unwrap_err().to_string(), "bad input");
    }

    #[test]
    fn test_unrecognized_status_is_open() {
        let envelope = decode_result(br#"{"status": 429, "error": "slow down"}"#).unwrap();
        assert_eq!(envelope.status(), Status(429));
        assert!(!envelope.status().is_ok());
    }
}
