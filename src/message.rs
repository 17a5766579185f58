//! Message documents exchanged with the voice service.
//!
//! Directives are kept as opaque JSON documents; the accessors here are a
//! convenience for callers and are never required by the protocol engine.

use crate::error::{AvsError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// A server-issued instruction, delivered as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Directive(Value);

impl Directive {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn namespace(&self) -> Option<&str> {
        self.header_field("namespace")
    }

    pub fn name(&self) -> Option<&str> {
        self.header_field("name")
    }

    pub fn message_id(&self) -> Option<&str> {
        self.header_field("messageId")
    }

    pub fn dialog_request_id(&self) -> Option<&str> {
        self.header_field("dialogRequestId")
    }

    pub fn payload(&self) -> Option<&Value> {
        self.0.get("payload")
    }

    /// Decode the directive into a caller-defined type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.0.clone())?)
    }

    fn header_field(&self, field: &str) -> Option<&str> {
        self.0.get("header")?.get(field)?.as_str()
    }
}

impl From<Value> for Directive {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    directive: Option<Directive>,
}

/// Decode a `{"directive": ...}` part body.
pub fn decode_envelope(data: &[u8]) -> Result<Directive> {
    let envelope: Envelope = serde_json::from_slice(data)?;
    envelope.directive.ok_or_else(|| {
        AvsError::Protocol(format!(
            "missing directive {}",
            String::from_utf8_lossy(data)
        ))
    })
}

/// Structured error returned by the service on non-success statuses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header: Option<Value>,
    #[serde(default)]
    payload: ExceptionPayload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ExceptionPayload {
    #[serde(default)]
    code: String,
    #[serde(default, alias = "description")]
    message: String,
}

impl Exception {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            header: None,
            payload: ExceptionPayload {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn code(&self) -> &str {
        &self.payload.code
    }

    pub fn message(&self) -> &str {
        &self.payload.message
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.payload.code, self.payload.message)
    }
}

impl std::error::Error for Exception {}

/// Metadata document for an event request.
///
/// Serializes to the standard `{"context": [...], "event": {"header": ..., "payload": ...}}`
/// shape with a fresh message id.
#[derive(Debug, Clone)]
pub struct Event {
    namespace: String,
    name: String,
    message_id: String,
    dialog_request_id: Option<String>,
    payload: Value,
    context: Vec<Value>,
}

impl Event {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            message_id: uuid::Uuid::new_v4().to_string(),
            dialog_request_id: None,
            payload: Value::Object(Default::default()),
            context: Vec::new(),
        }
    }

    pub fn with_dialog_request_id(mut self, id: impl Into<String>) -> Self {
        self.dialog_request_id = Some(id.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_context(mut self, state: Value) -> Self {
        self.context.push(state);
        self
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Header<'a> {
            namespace: &'a str,
            name: &'a str,
            message_id: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            dialog_request_id: Option<&'a str>,
        }

        #[derive(Serialize)]
        struct Body<'a> {
            header: Header<'a>,
            payload: &'a Value,
        }

        #[derive(Serialize)]
        struct Document<'a> {
            context: &'a [Value],
            event: Body<'a>,
        }

        Document {
            context: &self.context,
            event: Body {
                header: Header {
                    namespace: &self.namespace,
                    name: &self.name,
                    message_id: &self.message_id,
                    dialog_request_id: self.dialog_request_id.as_deref(),
                },
                payload: &self.payload,
            },
        }
        .serialize(serializer)
    }
}
