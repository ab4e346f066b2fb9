//! Wire protocol frames (JSON text over the managed transport)
//!
//! Outbound frames carry an `action` discriminator, inbound frames a `type`
//! discriminator. Entity payload shapes are heterogeneous and left as raw
//! JSON here; `normalize` maps them onto canonical structs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FeedError;

/// Client-to-server frames
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundFrame {
    Subscribe {
        topics: Vec<String>,
    },
    Unsubscribe {
        topics: Vec<String>,
    },
    Request {
        #[serde(rename = "type")]
        request_type: String,
        request_id: String,
        params: Value,
    },
    Ping,
}

impl OutboundFrame {
    /// Serialize to the JSON text the transport sends
    pub fn to_text(&self) -> String {
        // serializing a tagged enum of plain fields cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One decoded server-to-client frame
///
/// Everything past the `type` discriminator stays as raw JSON so dispatch
/// can shape-check per message type.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub frame_type: String,

    #[serde(flatten)]
    pub body: serde_json::Map<String, Value>,
}

impl InboundFrame {
    /// Parse a raw text frame; fails on invalid JSON or a missing `type`
    pub fn parse(text: &str) -> Result<Self, FeedError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode a frame embedded in a `batch` message
    pub fn from_value(value: Value) -> Result<Self, FeedError> {
        Ok(serde_json::from_value(value)?)
    }

    /// The `data` payload, if present and non-null
    pub fn data(&self) -> Option<&Value> {
        self.body.get("data").filter(|v| !v.is_null())
    }

    /// The correlation id on `response`/`error` frames
    pub fn request_id(&self) -> Option<&str> {
        self.body.get("request_id").and_then(Value::as_str)
    }

    /// The server-supplied message on `error` frames
    pub fn error_message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }

    /// Topic list on `subscribed`/`unsubscribed` acks
    pub fn topics(&self) -> Vec<String> {
        self.body
            .get("topics")
            .and_then(Value::as_array)
            .map(|ts| {
                ts.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sub-messages of a `batch` frame
    pub fn messages(&self) -> Option<&Vec<Value>> {
        self.body.get("messages").and_then(Value::as_array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_subscribe_shape() {
        let frame = OutboundFrame::Subscribe {
            topics: vec!["aircraft".to_string(), "safety".to_string()],
        };
        let v: Value = serde_json::from_str(&frame.to_text()).unwrap();
        assert_eq!(v["action"], "subscribe");
        assert_eq!(v["topics"], json!(["aircraft", "safety"]));
    }

    #[test]
    fn test_outbound_request_shape() {
        let frame = OutboundFrame::Request {
            request_type: "aircraft:track".to_string(),
            request_id: "req_1_123".to_string(),
            params: json!({"hex": "A1B2C3"}),
        };
        let v: Value = serde_json::from_str(&frame.to_text()).unwrap();
        assert_eq!(v["action"], "request");
        assert_eq!(v["type"], "aircraft:track");
        assert_eq!(v["request_id"], "req_1_123");
        assert_eq!(v["params"]["hex"], "A1B2C3");
    }

    #[test]
    fn test_outbound_ping_shape() {
        assert_eq!(OutboundFrame::Ping.to_text(), r#"{"action":"ping"}"#);
    }

    #[test]
    fn test_inbound_parse_and_accessors() {
        let frame = InboundFrame::parse(
            r#"{"type":"response","request_id":"req_2_456","data":{"ok":true}}"#,
        )
        .unwrap();
        assert_eq!(frame.frame_type, "response");
        assert_eq!(frame.request_id(), Some("req_2_456"));
        assert_eq!(frame.data().unwrap()["ok"], true);
    }

    #[test]
    fn test_inbound_rejects_missing_type() {
        assert!(InboundFrame::parse(r#"{"data":{}}"#).is_err());
        assert!(InboundFrame::parse("not json").is_err());
    }

    #[test]
    fn test_inbound_topics() {
        let frame =
            InboundFrame::parse(r#"{"type":"subscribed","topics":["aircraft","safety"]}"#).unwrap();
        assert_eq!(frame.topics(), vec!["aircraft", "safety"]);
    }
}
