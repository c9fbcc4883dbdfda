//! Typed events carried by a debate's server-sent event feed.

use serde::Deserialize;
use tracing::debug;

/// A named SSE frame before its payload is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub name: String,
    pub data: String,
}

impl RawEvent {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TurnStarted {
    #[serde(default, rename = "seq_index", alias = "sequence_index")]
    pub sequence_index: Option<u64>,
    #[serde(default)]
    pub speaker_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TurnDelta {
    #[serde(default, rename = "seq_index", alias = "sequence_index")]
    pub sequence_index: Option<u64>,
    #[serde(default)]
    pub speaker_name: Option<String>,
    pub delta: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TurnCompleted {
    #[serde(rename = "seq_index", alias = "sequence_index")]
    pub sequence_index: u64,
    pub speaker_name: String,
    pub text: String,
}

/// Events the session engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The service started generating the debate.
    DebateStarted,
    /// A speaker is about to produce a turn.
    TurnStarted(TurnStarted),
    /// Append-only fragment of the turn in progress.
    TurnDelta(TurnDelta),
    /// Authoritative final text of a turn.
    TurnCompleted(TurnCompleted),
    /// No further events follow.
    DebateCompleted,
}

impl StreamEvent {
    /// Decode a raw frame. Unknown event names and malformed payloads yield
    /// `None`; a bad frame never ends the stream.
    pub fn decode(raw: &RawEvent) -> Option<Self> {
        let decoded = match raw.name.as_str() {
            "turn_delta" => serde_json::from_str(&raw.data).map(StreamEvent::TurnDelta),
            "turn_completed" => serde_json::from_str(&raw.data).map(StreamEvent::TurnCompleted),
            "turn_started" => serde_json::from_str(&raw.data).map(StreamEvent::TurnStarted),
            "debate_started" => Ok(StreamEvent::DebateStarted),
            "debate_completed" => Ok(StreamEvent::DebateCompleted),
            other => {
                debug!(event = other, "ignoring unhandled stream event");
                return None;
            }
        };

        match decoded {
            Ok(event) => Some(event),
            Err(e) => {
                debug!(event = %raw.name, error = %e, data = %raw.data, "dropping malformed stream event");
                None
            }
        }
    }
}
