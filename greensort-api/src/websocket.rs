// WebSocket protocol for realtime detection

use greensort_core::{
    BinCategory, BoundingBox, Detection, EnginePhase, Guidance, StableEvent, WasteClass,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Client -> server messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "frame")]
    Frame {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame_id: Option<u64>,
        /// Base64 image or data URL
        #[serde(alias = "frame", alias = "data", alias = "img")]
        image: String,
    },
    /// Restart the session's engine from idle
    #[serde(rename = "reset")]
    Reset,
    #[serde(rename = "ping")]
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

impl ClientMessage {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Interpret an inbound text message
    ///
    /// Anything that is not a typed message is treated as a frame payload,
    /// which covers bare base64, data URLs and untyped `{"frame": ...}` objects.
    pub fn parse(text: &str) -> Self {
        match Self::from_json(text) {
            Ok(msg) => msg,
            Err(_) => ClientMessage::Frame {
                frame_id: None,
                image: text.to_string(),
            },
        }
    }

    pub fn frame(frame_id: u64, image: impl Into<String>) -> Self {
        ClientMessage::Frame {
            frame_id: Some(frame_id),
            image: image.into(),
        }
    }
}

/// Server -> client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Sent once when the connection is accepted
    #[serde(rename = "session")]
    Session { session_id: String },
    #[serde(rename = "result")]
    Result(ResultPayload),
    #[serde(rename = "error")]
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame_id: Option<u64>,
    },
    #[serde(rename = "pong")]
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

impl ServerMessage {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
            frame_id: None,
        }
    }

    pub fn frame_error(
        code: impl Into<String>,
        message: impl Into<String>,
        frame_id: Option<u64>,
    ) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
            frame_id,
        }
    }
}

/// Per-frame result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub success: bool,
    pub frame_id: u64,
    /// Raw boxes, descending confidence
    pub detections: Vec<DetectionPayload>,
    /// A class is held (stable or inside its grace band)
    pub stable: bool,
    pub phase: EnginePhase,
    pub event: StableEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<BestPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugPayload>,
    pub metadata: MetadataPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionPayload {
    pub class: WasteClass,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub bin: BinCategory,
}

impl From<&Detection> for DetectionPayload {
    fn from(d: &Detection) -> Self {
        Self {
            class: d.class,
            confidence: d.confidence,
            bbox: d.bbox,
            bin: d.bin_category(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPayload {
    pub class: WasteClass,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    pub bin: BinCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<Guidance>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugPayload {
    pub all_predictions: BTreeMap<WasteClass, f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataPayload {
    pub processing_ms: f32,
    pub avg_ms: f32,
    pub fps: f32,
    pub low_light: bool,
    pub raw_count: usize,
    pub dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use greensort_core::Locale;

    #[test]
    fn test_parse_typed_frame() {
        let msg = ClientMessage::parse(r#"{"type":"frame","frame_id":7,"image":"abc"}"#);
        assert_eq!(msg, ClientMessage::frame(7, "abc"));

        let msg = ClientMessage::parse(r#"{"type":"frame","frame":"abc"}"#);
        assert_eq!(
            msg,
            ClientMessage::Frame { frame_id: None, image: "abc".to_string() }
        );
    }

    #[test]
    fn test_parse_untyped_falls_back_to_frame() {
        let raw = r#"{"image":"abc"}"#;
        assert_eq!(
            ClientMessage::parse(raw),
            ClientMessage::Frame { frame_id: None, image: raw.to_string() }
        );
        assert_eq!(
            ClientMessage::parse("data:image/jpeg;base64,AAAA"),
            ClientMessage::Frame {
                frame_id: None,
                image: "data:image/jpeg;base64,AAAA".to_string()
            }
        );
    }

    #[test]
    fn test_parse_control_messages() {
        assert_eq!(ClientMessage::parse(r#"{"type":"reset"}"#), ClientMessage::Reset);
        assert_eq!(
            ClientMessage::parse(r#"{"type":"ping","id":"1"}"#),
            ClientMessage::Ping { id: Some("1".to_string()) }
        );
    }

    #[test]
    fn test_result_wire_shape() {
        let detection = Detection::new(
            WasteClass::Battery,
            0.9,
            BoundingBox::new(1.0, 2.0, 3.0, 4.0),
        );
        let payload = ResultPayload {
            success: true,
            frame_id: 3,
            detections: vec![DetectionPayload::from(&detection)],
            stable: true,
            phase: EnginePhase::Stable,
            event: StableEvent::Confirmed { class: WasteClass::Battery, confidence: 0.9 },
            best: Some(BestPayload {
                class: WasteClass::Battery,
                confidence: 0.9,
                bbox: Some(detection.bbox),
                bin: BinCategory::Hazardous,
                guidance: Some(Guidance::for_class(WasteClass::Battery, Locale::Vi)),
            }),
            debug: Some(DebugPayload {
                all_predictions: BTreeMap::from([(WasteClass::Battery, 0.9)]),
            }),
            metadata: MetadataPayload::default(),
        };

        let json: serde_json::Value =
            serde_json::to_value(ServerMessage::Result(payload.clone())).unwrap();
        assert_eq!(json["type"], "result");
        assert_eq!(json["stable"], true);
        assert_eq!(json["phase"], "stable");
        assert_eq!(json["event"]["kind"], "confirmed");
        assert_eq!(json["detections"][0]["bin"], "hazardous");
        assert_eq!(json["detections"][0]["bbox"][2], 3.0);
        assert!(json["debug"]["all_predictions"]["battery"].is_number());
        assert_eq!(json["best"]["guidance"]["hazard_warning"], true);

        let back = ServerMessage::from_json(&json.to_string()).unwrap();
        assert_eq!(back, ServerMessage::Result(payload));
    }

    #[test]
    fn test_error_message() {
        let json = ServerMessage::frame_error("malformed_frame", "bad", Some(4))
            .to_json()
            .unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("\"frame_id\":4"));
        assert!(!ServerMessage::error("x", "y").to_json().unwrap().contains("frame_id"));
    }
}
