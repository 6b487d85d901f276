//! View state store: the merged snapshot the presentation layer reads.
//!
//! The frame channel owns the `frame` field, the event channel owns the
//! telemetry fields, and the mode controller owns `mode`. Each setter is one
//! locked assignment followed by one notification, and no setter touches a
//! field owned by another source. Readers therefore never see a half-applied
//! update, and a failing channel cannot disturb the other channel's fields.
//!
//! Setters that would not change the stored value are not accepted updates:
//! they return `false` and emit nothing.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::camera::CameraMode;
use crate::frame::DisplayFrame;
use crate::sync::lock;

/// Capacity of the update broadcast. Subscribers that fall further behind
/// receive `RecvError::Lagged` and should re-read [`ViewStore::snapshot`].
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Latest telemetry values from the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetrySnapshot {
    /// Anomaly score in `[0, 100]`, rounded to two decimal places.
    pub anomaly_score: f64,
    /// Whether the upstream recorder is running.
    pub recording: bool,
}

/// Immutable merged view of frame, mode and telemetry.
#[derive(Debug, Clone, Default)]
pub struct ViewSnapshot {
    /// Most recently decoded frame, if any.
    pub frame: Option<Arc<DisplayFrame>>,
    /// Selected camera mode.
    pub mode: CameraMode,
    /// Latest telemetry.
    pub telemetry: TelemetrySnapshot,
    /// Number of accepted updates so far.
    pub version: u64,
}

/// One accepted update, broadcast to subscribers in application order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewUpdate {
    /// A new frame replaced the previous one.
    Frame {
        /// Sequence number of the installed frame.
        sequence: u64,
    },
    /// The installed frame was released on teardown.
    FrameCleared,
    /// The camera mode changed.
    Mode(CameraMode),
    /// The anomaly score changed.
    Score(f64),
    /// The recording flag changed.
    Recording(bool),
}

#[derive(Default)]
struct StoreInner {
    frame: Option<Arc<DisplayFrame>>,
    mode: CameraMode,
    telemetry: TelemetrySnapshot,
    version: u64,
}

impl StoreInner {
    fn accept(&mut self, update: ViewUpdate, tx: &broadcast::Sender<ViewUpdate>) {
        self.version += 1;
        // No subscribers is not an error.
        let _ = tx.send(update);
    }
}

/// Single source of truth for the live view. Cheap to clone.
#[derive(Clone)]
pub struct ViewStore {
    inner: Arc<Mutex<StoreInner>>,
    updates: broadcast::Sender<ViewUpdate>,
}

impl ViewStore {
    /// Create an empty store: no frame, `Primary` mode, zero telemetry.
    pub fn new() -> Self {
        Self::with_mode(CameraMode::default())
    }

    /// Create an empty store starting in `mode`.
    pub fn with_mode(mode: CameraMode) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                mode,
                ..StoreInner::default()
            })),
            updates,
        }
    }

    /// Current merged snapshot.
    pub fn snapshot(&self) -> ViewSnapshot {
        let inner = lock(&self.inner);
        ViewSnapshot {
            frame: inner.frame.clone(),
            mode: inner.mode,
            telemetry: inner.telemetry,
            version: inner.version,
        }
    }

    /// Receive one [`ViewUpdate`] per accepted update from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewUpdate> {
        self.updates.subscribe()
    }

    /// Current camera mode.
    pub fn mode(&self) -> CameraMode {
        lock(&self.inner).mode
    }

    /// Current telemetry.
    pub fn telemetry(&self) -> TelemetrySnapshot {
        lock(&self.inner).telemetry
    }

    /// Install `frame`, dropping the store's reference to the previous one.
    pub fn replace_frame(&self, frame: DisplayFrame) {
        let sequence = frame.sequence();
        let mut inner = lock(&self.inner);
        let previous = inner.frame.replace(Arc::new(frame));
        inner.accept(ViewUpdate::Frame { sequence }, &self.updates);
        drop(inner);
        drop(previous);
    }

    /// Release the installed frame. Returns `false` if none was installed.
    pub fn clear_frame(&self) -> bool {
        let mut inner = lock(&self.inner);
        let Some(previous) = inner.frame.take() else {
            return false;
        };
        inner.accept(ViewUpdate::FrameCleared, &self.updates);
        drop(inner);
        drop(previous);
        true
    }

    /// Set the camera mode. Returns `false` if it was already `mode`.
    pub fn set_mode(&self, mode: CameraMode) -> bool {
        let mut inner = lock(&self.inner);
        if inner.mode == mode {
            return false;
        }
        inner.mode = mode;
        inner.accept(ViewUpdate::Mode(mode), &self.updates);
        true
    }

    /// Set the anomaly score. Returns `false` if it equals the current score.
    ///
    /// Callers pass an already rounded score.
    pub fn set_score(&self, score: f64) -> bool {
        let mut inner = lock(&self.inner);
        if inner.telemetry.anomaly_score == score {
            return false;
        }
        inner.telemetry.anomaly_score = score;
        inner.accept(ViewUpdate::Score(score), &self.updates);
        true
    }

    /// Set the recording flag. Returns `false` if unchanged.
    pub fn set_recording(&self, recording: bool) -> bool {
        let mut inner = lock(&self.inner);
        if inner.telemetry.recording == recording {
            return false;
        }
        inner.telemetry.recording = recording;
        inner.accept(ViewUpdate::Recording(recording), &self.updates);
        true
    }
}

impl Default for ViewStore {
    fn default() -> Self {
        Self::new()
    }
}
