//! Wire shapes for sandbox <-> host messages
//!
//! Both directions use positional JSON arrays. Outbound calls are
//! `[module, op, args]` or `[module, op, args, token]` when a reply is
//! expected. Inbound messages carry a discriminator as their first element:
//! `["start"]`, `["return", token, args]` or `["callback", token, args]`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::error::StageError;

/// Opaque identifier naming one host-owned object (element, sound, figure).
///
/// Minted sandbox-side, unique for the process lifetime, never reused after
/// the owning proxy is destroyed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteHandle(String);

impl RemoteHandle {
    pub(crate) fn mint(prefix: &str, n: u64) -> Self {
        Self(format!("{prefix}{n}"))
    }

    /// Handle of the host's root element, owned by the host itself.
    pub fn root() -> Self {
        Self("root".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier correlating an outbound call with its eventual inbound
/// reply or event. Maps 1:1 to a registered callback while registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackToken(String);

impl CallbackToken {
    pub(crate) fn mint(n: u64) -> Self {
        Self(format!("cb{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One sandbox-to-host call.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCall {
    pub module: String,
    pub op: String,
    pub args: Vec<Value>,
    /// Present when the caller expects a reply or repeatable event.
    pub token: Option<CallbackToken>,
}

impl OutboundCall {
    pub fn new(module: &str, op: &str, args: Vec<Value>) -> Self {
        Self {
            module: module.to_string(),
            op: op.to_string(),
            args,
            token: None,
        }
    }

    pub fn with_token(mut self, token: CallbackToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Render the positional array representation.
    pub fn to_value(&self) -> Value {
        match &self.token {
            Some(token) => json!([self.module, self.op, self.args, token.as_str()]),
            None => json!([self.module, self.op, self.args]),
        }
    }

    /// Parse the positional array representation.
    pub fn from_value(value: &Value) -> Result<Self, StageError> {
        let items = value
            .as_array()
            .ok_or_else(|| StageError::MalformedMessage("outbound call is not an array".into()))?;
        let module = items
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| StageError::MalformedMessage("missing module name".into()))?;
        let op = items
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| StageError::MalformedMessage("missing operation name".into()))?;
        let args = items
            .get(2)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let token = match items.get(3) {
            Some(Value::String(token)) => Some(CallbackToken(token.clone())),
            Some(other) => {
                return Err(StageError::MalformedMessage(format!(
                    "callback token is not a string: {other}"
                )))
            }
            None => None,
        };
        Ok(Self {
            module: module.to_string(),
            op: op.to_string(),
            args,
            token,
        })
    }
}

impl Serialize for OutboundCall {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OutboundCall {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

/// One host-to-sandbox message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Readiness signal; the sandbox acknowledges with `Basic.started`.
    Start,
    /// One-shot reply; the token is unregistered after invocation.
    Return {
        token: CallbackToken,
        args: Vec<Value>,
    },
    /// Repeatable event; the token stays registered.
    Callback {
        token: CallbackToken,
        args: Vec<Value>,
    },
}

impl InboundMessage {
    /// Render the positional array representation.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Start => json!(["start"]),
            Self::Return { token, args } => json!(["return", token.as_str(), args]),
            Self::Callback { token, args } => json!(["callback", token.as_str(), args]),
        }
    }

    /// Parse the positional array representation.
    pub fn from_value(value: &Value) -> Result<Self, StageError> {
        let items = value
            .as_array()
            .ok_or_else(|| StageError::MalformedMessage("inbound message is not an array".into()))?;
        let kind = items
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| StageError::MalformedMessage("missing discriminator".into()))?;
        match kind {
            "start" => Ok(Self::Start),
            "return" | "callback" => {
                let token = items
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| StageError::MalformedMessage("missing callback token".into()))?;
                let args = items
                    .get(2)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let token = CallbackToken(token.to_string());
                if kind == "return" {
                    Ok(Self::Return { token, args })
                } else {
                    Ok(Self::Callback { token, args })
                }
            }
            other => Err(StageError::MalformedMessage(format!(
                "unknown discriminator {other:?}"
            ))),
        }
    }
}

impl Serialize for InboundMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InboundMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_without_token_is_a_three_element_array() {
        let call = OutboundCall::new("Element", "applyStyle", vec![json!("sel0"), json!("left")]);
        assert_eq!(
            call.to_value(),
            json!(["Element", "applyStyle", ["sel0", "left"]])
        );
    }

    #[test]
    fn outbound_with_token_carries_it_as_fourth_element() {
        let call = OutboundCall::new("Window", "getSize", vec![])
            .with_token(CallbackToken::mint(3));
        assert_eq!(call.to_value(), json!(["Window", "getSize", [], "cb3"]));
    }

    #[test]
    fn outbound_round_trips_through_json() {
        let call = OutboundCall::new("Media", "create", vec![json!("media1"), json!("cat.jpg")])
            .with_token(CallbackToken::mint(0));
        let text = serde_json::to_string(&call).unwrap();
        let parsed: OutboundCall = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, call);
    }

    #[test]
    fn inbound_shapes_parse() {
        assert_eq!(
            InboundMessage::from_value(&json!(["start"])).unwrap(),
            InboundMessage::Start
        );
        assert_eq!(
            InboundMessage::from_value(&json!(["return", "cb1", [42]])).unwrap(),
            InboundMessage::Return {
                token: CallbackToken("cb1".into()),
                args: vec![json!(42)],
            }
        );
        assert_eq!(
            InboundMessage::from_value(&json!(["callback", "cb2", []])).unwrap(),
            InboundMessage::Callback {
                token: CallbackToken("cb2".into()),
                args: vec![],
            }
        );
    }

    #[test]
    fn inbound_rejects_unknown_discriminator() {
        let err = InboundMessage::from_value(&json!(["shutdown"])).unwrap_err();
        assert!(matches!(err, StageError::MalformedMessage(_)));
    }
}
