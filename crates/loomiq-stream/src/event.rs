//! Wire-level task progress events.
//!
//! The backend emits a closed set of named SSE events per task. Tags outside
//! that set decode to [`EventKind::Unknown`] so newer servers never stall an
//! older client.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone as _, Utc};

use crate::errors::DecodeError;
use crate::status::StatusEffect;

/// Classified event tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `connected`: stream handshake acknowledged.
    Connected,
    /// `task:assigned`: backend picked an executor.
    TaskAssigned,
    /// `collaboration:started`: multi-executor mode engaged.
    CollaborationStarted,
    /// `step:started`
    StepStarted,
    /// `step:completed`, may carry a duration.
    StepCompleted,
    /// `step:failed`
    StepFailed,
    /// `task:completed`: terminal success.
    TaskCompleted,
    /// `task:failed`: terminal failure.
    TaskFailed,
    /// `task:error`: terminal error reported by the backend.
    TaskError,
    /// Any other tag, kept verbatim.
    Unknown(String),
}

impl EventKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "connected" => Self::Connected,
            "task:assigned" => Self::TaskAssigned,
            "collaboration:started" => Self::CollaborationStarted,
            "step:started" => Self::StepStarted,
            "step:completed" => Self::StepCompleted,
            "step:failed" => Self::StepFailed,
            "task:completed" => Self::TaskCompleted,
            "task:failed" => Self::TaskFailed,
            "task:error" => Self::TaskError,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            Self::Connected => "connected",
            Self::TaskAssigned => "task:assigned",
            Self::CollaborationStarted => "collaboration:started",
            Self::StepStarted => "step:started",
            Self::StepCompleted => "step:completed",
            Self::StepFailed => "step:failed",
            Self::TaskCompleted => "task:completed",
            Self::TaskFailed => "task:failed",
            Self::TaskError => "task:error",
            Self::Unknown(tag) => tag,
        }
    }

    /// Status change requested by this kind of event.
    pub fn effect(&self) -> StatusEffect {
        match self {
            Self::TaskAssigned | Self::CollaborationStarted => StatusEffect::Running,
            Self::TaskCompleted => StatusEffect::Done,
            Self::TaskFailed | Self::TaskError => StatusEffect::Failed,
            Self::Connected
            | Self::StepStarted
            | Self::StepCompleted
            | Self::StepFailed
            | Self::Unknown(_) => StatusEffect::None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.effect(), StatusEffect::Done | StatusEffect::Failed)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// JSON body carried in the `data:` field of every event.
#[derive(Clone, Debug, Default, serde::Deserialize)]
struct WirePayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
    #[serde(default)]
    duration: Option<serde_json::Value>,
}

/// One decoded progress event.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamEvent {
    pub kind: EventKind,
    /// Message as sent by the backend (glyph prefix not yet stripped).
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Elapsed milliseconds, only meaningful for step completions.
    pub duration: Option<u64>,
}

impl StreamEvent {
    /// Decodes one SSE event. `received_at` stands in for a missing or
    /// unreadable timestamp.
    pub fn decode(tag: &str, data: &str, received_at: DateTime<Utc>) -> Result<Self, DecodeError> {
        let payload: WirePayload = if data.trim().is_empty() {
            WirePayload::default()
        } else {
            serde_json::from_str(data).map_err(|e| DecodeError::new(tag, e.to_string()))?
        };
        Ok(Self {
            kind: EventKind::from_tag(tag),
            message: payload.message.unwrap_or_default(),
            timestamp: payload
                .timestamp
                .as_ref()
                .and_then(parse_timestamp)
                .unwrap_or(received_at),
            duration: payload.duration.as_ref().and_then(parse_duration),
        })
    }

    /// Builds a client-side event that never crossed the wire.
    pub fn synthetic(kind: EventKind, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: at,
            duration: None,
        }
    }
}

fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(raw) => {
            let raw = raw.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
                return Some(ts.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        // epoch milliseconds
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn parse_duration(value: &serde_json::Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .map(|ms| ms.round() as u64)
    })
}
