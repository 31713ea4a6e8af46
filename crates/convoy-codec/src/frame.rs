use convoy_core::EntityKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;

/// `message` field of a frame.
///
/// Outbound and inbound verbs share one enum; direction is a property of the
/// verb rather than a separate type so a single decoder covers both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    // client -> server
    Read,
    Create,
    Delete,
    Update,
    Subscribe,
    Unsubscribe,
    RouteSubscribe,
    RouteUnsubscribe,
    Authenticate,
    // server -> client
    Model,
    Created,
    Updated,
    Deleted,
    Subscribed,
    Unsubscribed,
    RouteSubscribed,
    RouteUnsubscribed,
    Routed,
    Error,
    ConnectionId,
    Authenticated,
}

impl Verb {
    /// Verbs the client sends.
    pub fn is_outbound(self) -> bool {
        matches!(
            self,
            Verb::Read
                | Verb::Create
                | Verb::Delete
                | Verb::Update
                | Verb::Subscribe
                | Verb::Unsubscribe
                | Verb::RouteSubscribe
                | Verb::RouteUnsubscribe
                | Verb::Authenticate
        )
    }

    /// Verbs that address an entity and therefore need a `model`.
    pub fn requires_model(self) -> bool {
        !matches!(
            self,
            Verb::Authenticate | Verb::ConnectionId | Verb::Authenticated
        )
    }

    /// Inbound verbs whose `value` carries entity attributes.
    pub fn carries_model_state(self) -> bool {
        matches!(self, Verb::Model | Verb::Created | Verb::Updated)
    }
}

/// One JSON frame on the dispatch connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub message: Verb,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<EntityKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

impl Frame {
    pub fn new(message: Verb) -> Self {
        Self {
            message,
            model: None,
            id: None,
            cluster_id: None,
            value: Value::Null,
        }
    }

    pub fn with_model(mut self, model: EntityKind) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = Some(cluster_id.into());
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    /// String attribute `key` of an object payload.
    pub fn value_str(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }

    /// Validates field consistency before the frame is put on the wire.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.message.requires_model() && self.model.is_none() {
            return Err(CodecError::InvalidFrame("entity verb requires model"));
        }
        if !self.value.is_null() && !self.value.is_object() && self.message != Verb::Error {
            return Err(CodecError::InvalidFrame("value must be an object"));
        }
        Ok(())
    }
}

/// Encodes a frame as JSON text after validation.
pub fn encode_frame_json(frame: &Frame) -> Result<String, CodecError> {
    frame.validate()?;
    Ok(serde_json::to_string(frame)?)
}

/// Decodes one JSON frame.
///
/// Schema validation is left to the receiver: a frame without `model` still
/// decodes so it can be counted before being dropped.
pub fn decode_frame_json(text: &str) -> Result<Frame, CodecError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use convoy_core::EntityKind;
    use serde_json::json;

    use super::{decode_frame_json, encode_frame_json, Frame, Verb};

    #[test]
    fn encode_omits_absent_fields() {
        let frame = Frame::new(Verb::Read)
            .with_model(EntityKind::Cluster)
            .with_id("/root");
        let text = encode_frame_json(&frame).expect("frame should encode");
        assert_eq!(text, r#"{"message":"Read","model":"Cluster","id":"/root"}"#);
    }

    #[test]
    fn cluster_id_uses_camel_case_on_the_wire() {
        let frame = Frame::new(Verb::Update)
            .with_model(EntityKind::Transport)
            .with_cluster_id("/root")
            .with_id("7")
            .with_value(json!({"online": true}));
        let value: serde_json::Value =
            serde_json::from_str(&encode_frame_json(&frame).expect("encode")).expect("json");
        assert_eq!(value["clusterId"], "/root");
        assert_eq!(value["value"]["online"], true);
    }

    #[test]
    fn entity_verbs_require_model() {
        let err = encode_frame_json(&Frame::new(Verb::Subscribe)).expect_err("missing model");
        assert!(err.to_string().contains("requires model"));

        let auth = Frame::new(Verb::Authenticate).with_value(json!({"email": "a@b.c"}));
        assert!(encode_frame_json(&auth).is_ok());
    }

    #[test]
    fn decode_accepts_missing_model_but_rejects_unknown_kind() {
        let frame = decode_frame_json(r#"{"message":"Updated","id":"/root"}"#)
            .expect("missing model still decodes");
        assert_eq!(frame.model, None);
        assert_eq!(frame.message, Verb::Updated);

        assert!(decode_frame_json(r#"{"message":"Updated","model":"Vehicle"}"#).is_err());
        assert!(decode_frame_json(r#"{"message":"Teleported","model":"Cluster"}"#).is_err());
        assert!(decode_frame_json(r#"{"model":"Cluster"}"#).is_err());
    }

    #[test]
    fn verb_direction_tables() {
        assert!(Verb::Authenticate.is_outbound());
        assert!(!Verb::Authenticated.is_outbound());
        assert!(Verb::Updated.carries_model_state());
        assert!(!Verb::Deleted.carries_model_state());
        assert!(!Verb::ConnectionId.requires_model());
    }
}
