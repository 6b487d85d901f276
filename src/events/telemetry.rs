//! Typed decoding of event-channel payloads.
//!
//! Two event kinds carry telemetry: `suspicion` with
//! `{"suspicion_score": <number 0-100>}` and `recording` with
//! `{"recording": <bool>}`. Anything else the server sends (its `hello`
//! greeting, `info`, `warning`, ...) is not telemetry and is ignored.

use serde_json::Value;

use super::sse::SseEvent;

/// Event kind carrying the anomaly score.
pub const SUSPICION_EVENT: &str = "suspicion";
/// Event kind carrying the recorder state.
pub const RECORDING_EVENT: &str = "recording";

/// Highest valid anomaly score.
pub const MAX_SCORE: f64 = 100.0;

/// A validated telemetry update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryEvent {
    /// New anomaly score, already rounded to two decimal places.
    Suspicion(f64),
    /// New recorder state.
    Recording(bool),
}

/// Outcome of decoding one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A well-formed telemetry update.
    Telemetry(TelemetryEvent),
    /// A telemetry kind whose payload failed validation.
    Malformed {
        /// Event kind.
        kind: String,
        /// Why the payload was rejected.
        reason: String,
    },
    /// Not a telemetry kind.
    Ignored,
}

/// Round to two decimal places, half away from zero.
pub fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

/// Decode and validate one SSE event.
pub fn decode_event(event: &SseEvent) -> Decoded {
    let kind = event.kind();
    if kind != SUSPICION_EVENT && kind != RECORDING_EVENT {
        return Decoded::Ignored;
    }
    let payload = match serde_json::from_str::<Value>(&event.data) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => return malformed(kind, format!("expected JSON object, got {other}")),
        Err(e) => return malformed(kind, e.to_string()),
    };

    if kind == SUSPICION_EVENT {
        let Some(score) = payload.get("suspicion_score").and_then(Value::as_f64) else {
            return malformed(kind, "missing numeric suspicion_score".into());
        };
        if !score.is_finite() || !(0.0..=MAX_SCORE).contains(&score) {
            return malformed(kind, format!("score {score} outside [0, {MAX_SCORE}]"));
        }
        Decoded::Telemetry(TelemetryEvent::Suspicion(round_score(score)))
    } else {
        let Some(recording) = payload.get("recording").and_then(Value::as_bool) else {
            return malformed(kind, "missing boolean recording".into());
        };
        Decoded::Telemetry(TelemetryEvent::Recording(recording))
    }
}

fn malformed(kind: &str, reason: String) -> Decoded {
    Decoded::Malformed {
        kind: kind.to_owned(),
        reason,
    }
}
