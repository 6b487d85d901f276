//! Incremental Server-Sent Events parser.
//!
//! Turns the raw byte chunks of a `text/event-stream` response into
//! [`SseEvent`]s. Chunk boundaries may fall anywhere, including inside a line
//! or between `\r` and `\n`.
//!
//! ```text
//! event: suspicion
//! data: {"suspicion_score": 42.5}
//! id: 17
//!
//! event: recording
//! data: {"recording": true}
//!
//! ```

/// Event type assumed when a block carries no `event:` field.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// One dispatched Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if present.
    pub event_type: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// Value of the `id:` field, if present.
    pub id: Option<String>,
}

impl SseEvent {
    /// Build an event with a type and data and no id.
    pub fn new(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            data: data.into(),
            id: None,
        }
    }

    /// Attach an event id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The event type, falling back to [`DEFAULT_EVENT_TYPE`].
    pub fn kind(&self) -> &str {
        self.event_type.as_deref().unwrap_or(DEFAULT_EVENT_TYPE)
    }
}

/// Fields accumulated for the event currently being read.
#[derive(Debug, Default)]
struct PendingEvent {
    event_type: Option<String>,
    data_lines: Vec<String>,
    id: Option<String>,
}

impl PendingEvent {
    fn has_data(&self) -> bool {
        !self.data_lines.is_empty()
    }

    fn take(&mut self) -> SseEvent {
        SseEvent {
            event_type: self.event_type.take(),
            data: std::mem::take(&mut self.data_lines).join("\n"),
            id: self.id.take(),
        }
    }

    /// Feed one line (without terminator). A blank line ends the event.
    fn feed(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.has_data() {
                return Some(self.take());
            }
            // A block without data is discarded entirely.
            self.event_type = None;
            self.id = None;
            return None;
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = split_field(line);
        match field {
            "data" => self.data_lines.push(value.to_owned()),
            "event" => self.event_type = Some(value.to_owned()),
            "id" => self.id = Some(value.to_owned()),
            _ => {}
        }
        None
    }
}

/// Split `field:value`, dropping one leading space from the value. A line
/// without a colon is a field name with an empty value.
fn split_field(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
        None => (line, ""),
    }
}

/// Streaming SSE parser. Feed chunks with [`push`](Self::push).
#[derive(Debug, Default)]
pub struct SseLineParser {
    line: Vec<u8>,
    pending: PendingEvent,
}

impl SseLineParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return the events it completed.
    ///
    /// Bytes are buffered until a full line is available, so multi-byte
    /// UTF-8 sequences split across chunks decode correctly.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        for &byte in chunk {
            if byte != b'\n' {
                self.line.push(byte);
                continue;
            }
            let raw = std::mem::take(&mut self.line);
            let text = String::from_utf8_lossy(&raw);
            let line = text.strip_suffix('\r').unwrap_or(&text);
            if let Some(event) = self.pending.feed(line) {
                events.push(event);
            }
        }
        events
    }

    /// Reset at end of stream.
    ///
    /// An event not closed by a blank line is incomplete and is discarded,
    /// never dispatched. Returns `true` if such a partial event was dropped.
    pub fn finish(&mut self) -> bool {
        let partial_line = !std::mem::take(&mut self.line).is_empty();
        let pending = std::mem::take(&mut self.pending);
        partial_line || pending.has_data() || pending.event_type.is_some() || pending.id.is_some()
    }
}
