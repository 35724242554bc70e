//! Wire messages for the recognition service.
//!
//! Outbound control frames are single-field JSON text messages. Inbound
//! frames are classified permissively: anything that is not explicitly
//! metadata is forwarded as results, so schema drift on the service side
//! never silently drops payloads.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

// ============================================================================
// Outbound control messages
// ============================================================================

/// Control frames a client may send mid-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Flush buffered audio and force a final result.
    Finalize,
    /// Announce the end of audio; the service finishes and closes.
    CloseStream,
    /// Heartbeat that keeps an idle connection open.
    KeepAlive,
}

impl ControlMessage {
    /// Wire name of this control kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Finalize => "Finalize",
            ControlMessage::CloseStream => "CloseStream",
            ControlMessage::KeepAlive => "KeepAlive",
        }
    }

    /// Serialize as the service's `{"type": "..."}` text frame.
    pub fn to_json(&self) -> String {
        json!({ "type": self.kind() }).to_string()
    }
}

// ============================================================================
// Inbound classification
// ============================================================================

/// An inbound text frame after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Transcription results, including anything unclassifiable.
    Results(Value),
    /// Connection and session metadata.
    Metadata(Value),
}

/// Classify one inbound text frame.
///
/// `type` of `Results` or `Metadata` maps directly. A payload without a
/// `type` that still carries `is_final` or `channel` counts as results.
/// Unknown types and non-JSON text are forwarded as results rather than
/// dropped.
pub fn classify(text: &str) -> InboundMessage {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            debug!("non-JSON service message, forwarding as results");
            return InboundMessage::Results(Value::String(text.to_string()));
        }
    };
    let message_type = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string);
    match message_type.as_deref() {
        Some("Results") => InboundMessage::Results(value),
        Some("Metadata") => InboundMessage::Metadata(value),
        Some(other) => {
            debug!("unrecognized message type {:?}, forwarding as results", other);
            InboundMessage::Results(value)
        }
        None if value.get("is_final").is_some() || value.get("channel").is_some() => {
            InboundMessage::Results(value)
        }
        None => {
            debug!("untyped service message, forwarding as results");
            InboundMessage::Results(value)
        }
    }
}

/// True when a results payload acknowledges a [`ControlMessage::Finalize`].
pub fn is_finalize_ack(value: &Value) -> bool {
    value
        .get("from_finalize")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

// ============================================================================
// Typed result payloads
// ============================================================================

/// A recognized word with timing and optional speaker label.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecognizedWord {
    #[serde(default)]
    pub word: String,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub speaker: Option<u32>,
    #[serde(default)]
    pub punctuated_word: Option<String>,
}

/// One transcription hypothesis.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptAlternative {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub words: Vec<RecognizedWord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptChannel {
    #[serde(default)]
    pub alternatives: Vec<TranscriptAlternative>,
}

/// Typed view of a results payload. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecognitionResults {
    #[serde(default)]
    pub channel: TranscriptChannel,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub speech_final: bool,
    #[serde(default)]
    pub from_finalize: bool,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
}

impl RecognitionResults {
    /// Parse a raw results payload. `None` when the value is not an object
    /// shaped like results at all (for example forwarded non-JSON text).
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// The leading transcript, if the payload carries a non-empty one.
    pub fn transcript(&self) -> Option<&str> {
        self.channel
            .alternatives
            .first()
            .map(|alt| alt.transcript.as_str())
            .filter(|transcript| !transcript.is_empty())
    }
}
