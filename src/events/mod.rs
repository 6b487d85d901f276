//! Telemetry event channel: SSE transport, parsing and typed decoding.

pub mod channel;
pub mod sse;
pub mod telemetry;

pub use channel::{EventChannel, EventOutcome, TelemetryStats};
pub use sse::{SseEvent, SseLineParser};
pub use telemetry::{Decoded, TelemetryEvent, decode_event};
