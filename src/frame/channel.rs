//! Frame channel manager: WebSocket client for the live camera feed.
//!
//! [`FrameChannel`] keeps one WebSocket connection to the frame source.
//! Inbound binary messages are complete encoded images; they pass through a
//! single-slot mailbox (latest-frame-wins) to a decode worker, and decoded
//! frames are installed in the [`ViewStore`]. Outbound, the channel sends
//! `{"camera": <index>}` selection commands.
//!
//! # Generations
//!
//! Every `open` starts a new generation and every `close` retires the current
//! one. Decoded frames are installed under the channel lock only if their
//! generation is still current, and `close` takes the same lock, so once
//! `close` returns no frame from the closed connection can reach the store.
//!
//! The manager never reconnects by itself. Callers observe
//! [`FrameChannel::state`] (or [`FrameChannel::watch_state`]) and reopen.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use image::RgbaImage;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::display::{DisplayFrame, FrameDecoder, FrameStats, FrameStatsSnapshot, ImageFrameDecoder};
use super::slot::LatestSlot;
use crate::camera::{CameraCommand, CameraMode};
use crate::config::FrameConfig;
use crate::connection::ConnectionState;
use crate::store::ViewStore;
use crate::sync::lock;

/// Manager for the binary frame channel.
pub struct FrameChannel {
    inner: Arc<FrameInner>,
}

struct FrameInner {
    config: FrameConfig,
    store: ViewStore,
    decoder: Arc<dyn FrameDecoder>,
    stats: Arc<FrameStats>,
    shared: Mutex<FrameShared>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Outcome of [`FrameChannel::select_mode`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct ModeSelection {
    /// The store did not already hold the mode.
    pub changed: bool,
    /// The command reached the connection task.
    pub sent: bool,
}

/// Mutable connection record, guarded by `FrameInner::shared`.
struct FrameShared {
    generation: u64,
    state: ConnectionState,
    /// Mirror of the store's mode, used to tag outbound requests.
    mode: CameraMode,
    outbound: Option<mpsc::UnboundedSender<String>>,
    cancel: Option<CancellationToken>,
    last_frame_at: Option<DateTime<Utc>>,
    sequence: u64,
}

impl FrameChannel {
    /// Create a closed frame channel publishing into `store`.
    pub fn new(config: FrameConfig, store: ViewStore) -> Self {
        Self::with_decoder(config, store, Arc::new(ImageFrameDecoder))
    }

    /// Create a closed frame channel with a custom decoder.
    pub fn with_decoder(
        config: FrameConfig,
        store: ViewStore,
        decoder: Arc<dyn FrameDecoder>,
    ) -> Self {
        let mode = store.mode();
        let (state_tx, _) = watch::channel(ConnectionState::Closed);
        Self {
            inner: Arc::new(FrameInner {
                config,
                store,
                decoder,
                stats: Arc::new(FrameStats::default()),
                shared: Mutex::new(FrameShared {
                    generation: 0,
                    state: ConnectionState::Closed,
                    mode,
                    outbound: None,
                    cancel: None,
                    last_frame_at: None,
                    sequence: 0,
                }),
                state_tx,
            }),
        }
    }

    /// Start connecting. No-op while already connecting or open.
    ///
    /// Any leftovers from a previous connection are retired first. Once the
    /// handshake succeeds the channel sends a selection command for the
    /// store's current mode. Must be called inside a tokio runtime.
    pub fn open(&self) {
        let mut shared = lock(&self.inner.shared);
        if shared.state.is_active() {
            debug!(state = %shared.state, "frame channel already active, ignoring open");
            return;
        }
        retire(&mut shared);
        shared.generation += 1;
        shared.mode = self.inner.store.mode();

        let generation = shared.generation;
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        shared.outbound = Some(tx);
        shared.cancel = Some(cancel.clone());
        self.inner
            .set_state_locked(&mut shared, ConnectionState::Connecting);
        drop(shared);

        info!(url = %self.inner.config.url, generation, "opening frame channel");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            run_connection(inner, generation, rx, cancel).await;
        });
    }

    /// Handle one inbound binary payload on the calling thread.
    ///
    /// Decodes `payload` and installs it in the store if this channel's
    /// generation did not change meanwhile. Returns `true` if the frame was
    /// installed. A payload that fails to decode leaves the current frame in
    /// place.
    pub fn on_frame(&self, payload: &[u8]) -> bool {
        let generation = self.inner.note_received();
        match self.inner.decoder.decode(payload) {
            Ok(pixels) => self.inner.install(generation, pixels),
            Err(e) => {
                self.inner.note_decode_failure(&e.to_string());
                false
            }
        }
    }

    /// Select `mode` on the frame source.
    ///
    /// Applies `mode` to the store and the mirrored mode together. The
    /// command is sent only when the connection is open; otherwise it is
    /// dropped and the next `open` re-asserts the mirrored mode. Returns
    /// `true` if the command was handed to the transport.
    pub fn set_mode(&self, mode: CameraMode) -> bool {
        self.select_mode(mode).sent
    }

    /// Apply `mode` to the store, the mirror and the transport under one lock.
    ///
    /// Concurrent callers are serialized here, so the last selection to take
    /// the lock wins in the store, in the mirror and upstream alike.
    pub(crate) fn select_mode(&self, mode: CameraMode) -> ModeSelection {
        let mut shared = lock(&self.inner.shared);
        let changed = self.inner.store.set_mode(mode);
        shared.mode = mode;
        if !shared.state.is_open() {
            debug!(%mode, state = %shared.state, "frame channel not open, dropping mode command");
            return ModeSelection { changed, sent: false };
        }
        let Some(tx) = shared.outbound.as_ref() else {
            return ModeSelection { changed, sent: false };
        };
        let sent = tx.send(CameraCommand::select(mode).to_json()).is_ok();
        if !sent {
            debug!(%mode, "frame connection task gone, dropping mode command");
        }
        ModeSelection { changed, sent }
    }

    /// Tear down the connection and release the current frame.
    ///
    /// Idempotent. When this returns, frames still being decoded for the
    /// closed connection are discarded instead of installed.
    pub fn close(&self) {
        let mut shared = lock(&self.inner.shared);
        shared.generation += 1;
        let had_connection = shared.cancel.is_some();
        retire(&mut shared);
        self.inner.set_state_locked(&mut shared, ConnectionState::Closed);
        self.inner.store.clear_frame();
        drop(shared);
        if had_connection {
            info!("frame channel closed");
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

    /// Mode that tags outbound requests.
    pub fn mirrored_mode(&self) -> CameraMode {
        lock(&self.inner.shared).mode
    }

    /// Receipt time of the latest inbound payload.
    pub fn last_frame_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.inner.shared).last_frame_at
    }

    /// Frame pipeline counters.
    pub fn stats(&self) -> FrameStatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl Drop for FrameChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Cancel the running task and drop its outbound sender.
fn retire(shared: &mut FrameShared) {
    if let Some(cancel) = shared.cancel.take() {
        cancel.cancel();
    }
    shared.outbound = None;
}

impl FrameInner {
    fn set_state_locked(&self, shared: &mut FrameShared, state: ConnectionState) {
        if shared.state == state {
            return;
        }
        shared.state = state.clone();
        self.state_tx.send_replace(state);
    }

    /// Apply a state reported by the connection task, if it is still current.
    fn finish(&self, generation: u64, state: ConnectionState) {
        let mut shared = lock(&self.shared);
        if shared.generation != generation {
            return;
        }
        if let ConnectionState::Errored(ref reason) = state {
            warn!(%reason, "frame channel failed");
        } else {
            info!("frame channel closed by server");
        }
        retire(&mut shared);
        self.set_state_locked(&mut shared, state);
    }

    /// Mark the connection open and return the mode to assert, unless the
    /// generation has been retired.
    fn mark_open(&self, generation: u64) -> Option<CameraMode> {
        let mut shared = lock(&self.shared);
        if shared.generation != generation {
            return None;
        }
        self.set_state_locked(&mut shared, ConnectionState::Open);
        Some(shared.mode)
    }

    /// Record a received payload; returns the generation it belongs to.
    fn note_received(&self) -> u64 {
        self.stats.received.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut shared = lock(&self.shared);
        shared.last_frame_at = Some(Utc::now());
        shared.generation
    }

    fn note_decode_failure(&self, reason: &str) {
        self.stats
            .decode_failures
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        debug!(%reason, "dropping undecodable frame");
    }

    /// Install decoded pixels if `generation` is still current.
    fn install(&self, generation: u64, pixels: RgbaImage) -> bool {
        let mut shared = lock(&self.shared);
        if shared.generation != generation {
            self.stats.late.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            debug!(generation, "discarding frame decoded after teardown");
            return false;
        }
        shared.sequence += 1;
        let received_at = shared.last_frame_at.unwrap_or_else(Utc::now);
        let frame = DisplayFrame::new(
            shared.sequence,
            pixels,
            received_at,
            Arc::clone(&self.stats),
        );
        self.store.replace_frame(frame);
        true
    }
}

// ---------------------------------------------------------------------------
// Background connection task
// ---------------------------------------------------------------------------

/// Run one WebSocket connection until it fails, the server closes it, or the
/// generation is cancelled.
async fn run_connection(
    inner: Arc<FrameInner>,
    generation: u64,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    let connect = tokio::time::timeout(
        inner.config.connect_timeout(),
        connect_async(inner.config.url.as_str()),
    );
    let ws_stream = tokio::select! {
        _ = cancel.cancelled() => return,
        result = connect => match result {
            Ok(Ok((ws_stream, _))) => ws_stream,
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

    let (mut write, mut read) = ws_stream.split();

    let Some(mode) = inner.mark_open(generation) else {
        return;
    };
    info!(%mode, "frame channel open");
    if let Err(e) = write
        .send(Message::Text(CameraCommand::select(mode).to_json()))
        .await
    {
        inner.finish(generation, ConnectionState::Errored(format!("send initial mode: {e}")));
        return;
    }

    let slot = Arc::new(LatestSlot::new());
    let worker = tokio::spawn(decode_worker(
        Arc::clone(&inner),
        generation,
        Arc::clone(&slot),
        cancel.clone(),
    ));

    let outcome = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break None;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        inner.note_received();
                        if slot.put(Bytes::from(data)) {
                            inner
                                .stats
                                .superseded
                                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break Some(ConnectionState::Closed);
                    }
                    Some(Err(e)) => {
                        break Some(ConnectionState::Errored(format!("read error: {e}")));
                    }
                    _ => {} // Text is not part of the inbound protocol; ping/pong handled by tungstenite.
                }
            }
            Some(json) = outbound_rx.recv() => {
                if let Err(e) = write.send(Message::Text(json)).await {
                    break Some(ConnectionState::Errored(format!("send error: {e}")));
                }
            }
        }
    };

    worker.abort();
    if let Some(state) = outcome {
        inner.finish(generation, state);
    }
}

/// Decode the newest pending payload, one at a time, off the runtime threads.
async fn decode_worker(
    inner: Arc<FrameInner>,
    generation: u64,
    slot: Arc<LatestSlot<Bytes>>,
    cancel: CancellationToken,
) {
    loop {
        let payload = tokio::select! {
            _ = cancel.cancelled() => break,
            payload = slot.take() => payload,
        };
        let decoder = Arc::clone(&inner.decoder);
        match tokio::task::spawn_blocking(move || decoder.decode(&payload)).await {
            Ok(Ok(pixels)) => {
                inner.install(generation, pixels);
            }
            Ok(Err(e)) => inner.note_decode_failure(&e.to_string()),
            Err(e) => inner.note_decode_failure(&format!("decode task failed: {e}")),
        }
    }
}
