//! Event channel manager: Server-Sent Events client for telemetry.
//!
//! [`EventChannel`] holds one streaming `GET` against the event endpoint,
//! parses the `text/event-stream` body incrementally and applies `suspicion`
//! and `recording` events to the [`ViewStore`] in arrival order.
//!
//! Malformed payloads are dropped per event and never change the connection
//! state. As with the frame channel, `open` starts a generation, `close`
//! retires it, and events are applied under the channel lock only while
//! their generation is current.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sse::{SseEvent, SseLineParser};
use super::telemetry::{Decoded, TelemetryEvent, decode_event};
use crate::config::EventConfig;
use crate::connection::ConnectionState;
use crate::store::ViewStore;
use crate::sync::lock;

/// Outcome of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The store accepted a changed value.
    Applied,
    /// Valid, but equal to the current value or a repeated event id.
    Duplicate,
    /// A telemetry kind with an invalid payload.
    Malformed,
    /// Not a telemetry kind.
    Ignored,
    /// Arrived for a retired connection.
    Stale,
}

/// Telemetry counters.
#[derive(Debug, Default)]
struct TelemetryCounters {
    accepted: AtomicU64,
    duplicates: AtomicU64,
    malformed: AtomicU64,
    ignored: AtomicU64,
}

/// Copy of the event channel counters at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    /// Events that changed the store.
    pub accepted: u64,
    /// Valid events that changed nothing.
    pub duplicates: u64,
    /// Events dropped for invalid payloads.
    pub malformed: u64,
    /// Events of kinds the client does not consume.
    pub ignored: u64,
}

/// Manager for the telemetry event channel.
pub struct EventChannel {
    inner: Arc<EventInner>,
}

struct EventInner {
    config: EventConfig,
    store: ViewStore,
    client: reqwest::Client,
    counters: TelemetryCounters,
    shared: Mutex<EventShared>,
    state_tx: watch::Sender<ConnectionState>,
}

struct EventShared {
    generation: u64,
    state: ConnectionState,
    cancel: Option<CancellationToken>,
    last_event_id: Option<String>,
}

impl EventChannel {
    /// Create a closed event channel publishing into `store`.
    pub fn new(config: EventConfig, store: ViewStore) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Closed);
        Self {
            inner: Arc::new(EventInner {
                config,
                store,
                client: reqwest::Client::new(),
                counters: TelemetryCounters::default(),
                shared: Mutex::new(EventShared {
                    generation: 0,
                    state: ConnectionState::Closed,
                    cancel: None,
                    last_event_id: None,
                }),
                state_tx,
            }),
        }
    }

    /// Start streaming. No-op while already connecting or open.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(&self) {
        let mut shared = lock(&self.inner.shared);
        if shared.state.is_active() {
            debug!(state = %shared.state, "event channel already active, ignoring open");
            return;
        }
        if let Some(cancel) = shared.cancel.take() {
            cancel.cancel();
        }
        shared.generation += 1;
        let generation = shared.generation;
        let cancel = CancellationToken::new();
        shared.cancel = Some(cancel.clone());
        self.inner
            .set_state_locked(&mut shared, ConnectionState::Connecting);
        drop(shared);

        info!(url = %self.inner.config.url, generation, "opening event channel");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            run_stream(inner, generation, cancel).await;
        });
    }

    /// Apply one parsed event against the current connection.
    pub fn on_event(&self, event: &SseEvent) -> EventOutcome {
        let generation = lock(&self.inner.shared).generation;
        self.inner.dispatch(generation, event)
    }

    /// Stop streaming. Idempotent; events arriving afterwards are dropped.
    pub fn close(&self) {
        let mut shared = lock(&self.inner.shared);
        shared.generation += 1;
        let had_connection = shared.cancel.is_some();
        if let Some(cancel) = shared.cancel.take() {
            cancel.cancel();
        }
        self.inner.set_state_locked(&mut shared, ConnectionState::Closed);
        drop(shared);
        if had_connection {
            info!("event channel closed");
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.shared).state.clone()
    }

    /// Subscribe to connection state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Id of the last event that carried one.
    pub fn last_event_id(&self) -> Option<String> {
        lock(&self.inner.shared).last_event_id.clone()
    }

    /// Telemetry counters.
    pub fn stats(&self) -> TelemetryStats {
        let c = &self.inner.counters;
        TelemetryStats {
            accepted: c.accepted.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
            ignored: c.ignored.load(Ordering::Relaxed),
        }
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl EventInner {
    fn set_state_locked(&self, shared: &mut EventShared, state: ConnectionState) {
        if shared.state == state {
            return;
        }
        shared.state = state.clone();
        self.state_tx.send_replace(state);
    }

    fn finish(&self, generation: u64, state: ConnectionState) {
        let mut shared = lock(&self.shared);
        if shared.generation != generation {
            return;
        }
        if let ConnectionState::Errored(ref reason) = state {
            warn!(%reason, "event channel failed");
        } else {
            info!("event channel closed by server");
        }
        shared.cancel = None;
        self.set_state_locked(&mut shared, state);
    }

    fn mark_open(&self, generation: u64) -> bool {
        let mut shared = lock(&self.shared);
        if shared.generation != generation {
            return false;
        }
        self.set_state_locked(&mut shared, ConnectionState::Open);
        true
    }

    /// Decode `event` and apply it to the store if `generation` is current.
    ///
    /// The channel lock is held across the store write so `close` cannot
    /// interleave with an event being applied.
    fn dispatch(&self, generation: u64, event: &SseEvent) -> EventOutcome {
        let mut shared = lock(&self.shared);
        if shared.generation != generation {
            return EventOutcome::Stale;
        }

        if let Some(id) = event.id.as_deref() {
            if shared.last_event_id.as_deref() == Some(id) {
                self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                debug!(id, "skipping redelivered event");
                return EventOutcome::Duplicate;
            }
            shared.last_event_id = Some(id.to_owned());
        }

        let changed = match decode_event(event) {
            Decoded::Telemetry(TelemetryEvent::Suspicion(score)) => self.store.set_score(score),
            Decoded::Telemetry(TelemetryEvent::Recording(recording)) => {
                self.store.set_recording(recording)
            }
            Decoded::Malformed { kind, reason } => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                debug!(%kind, %reason, "dropping malformed event");
                return EventOutcome::Malformed;
            }
            Decoded::Ignored => {
                self.counters.ignored.fetch_add(1, Ordering::Relaxed);
                debug!(kind = event.kind(), "ignoring non-telemetry event");
                return EventOutcome::Ignored;
            }
        };

        if changed {
            self.counters.accepted.fetch_add(1, Ordering::Relaxed);
            EventOutcome::Applied
        } else {
            self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            EventOutcome::Duplicate
        }
    }
}

// ---------------------------------------------------------------------------
// Background stream task
// ---------------------------------------------------------------------------

async fn run_stream(inner: Arc<EventInner>, generation: u64, cancel: CancellationToken) {
    let request = inner
        .client
        .get(&inner.config.url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send();
    let response = tokio::select! {
        _ = cancel.cancelled() => return,
        result = tokio::time::timeout(inner.config.connect_timeout(), request) => match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                inner.finish(generation, ConnectionState::Errored(format!("connect: {e}")));
                return;
            }
            Err(_) => {
                inner.finish(generation, ConnectionState::Errored("connect: timed out".into()));
                return;
            }
        },
    };

    let status = response.status();
    if !status.is_success() {
        inner.finish(generation, ConnectionState::Errored(format!("HTTP {status}")));
        return;
    }
    if !inner.mark_open(generation) {
        return;
    }
    info!("event channel open");

    let mut body = response.bytes_stream();
    let mut parser = SseLineParser::new();
    let outcome = loop {
        tokio::select! {
            _ = cancel.cancelled() => break None,
            chunk = body.next() => match chunk {
                Some(Ok(bytes)) => {
                    let stale = parser
                        .push(&bytes)
                        .iter()
                        .any(|event| inner.dispatch(generation, event) == EventOutcome::Stale);
                    if stale {
                        break None;
                    }
                }
                Some(Err(e)) => break Some(ConnectionState::Errored(format!("read error: {e}"))),
                None => {
                    if parser.finish() {
                        debug!("discarding unterminated event at end of stream");
                    }
                    break Some(ConnectionState::Closed);
                }
            },
        }
    };

    if let Some(state) = outcome {
        inner.finish(generation, state);
    }
}
