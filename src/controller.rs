//! Camera mode controller.
//!
//! Mode changes are optimistic: the store takes the new mode immediately and
//! the frame channel is asked to forward it. There is no acknowledgment from
//! the frame source, so while the frame channel is not open the store can
//! disagree with the upstream camera until the next `open` re-asserts it.

use std::sync::Arc;

use tracing::{debug, info};

use crate::camera::{CameraMode, IntoCameraMode};
use crate::error::Result;
use crate::frame::FrameChannel;
use crate::store::ViewStore;

/// Result of a successful [`CameraModeController::request_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChange {
    /// Mode now held by the store.
    pub mode: CameraMode,
    /// Whether the store held a different mode before this request.
    pub changed: bool,
    /// Whether the selection command reached the frame transport.
    pub command_sent: bool,
}

/// Validates operator mode requests and applies them.
#[derive(Clone)]
pub struct CameraModeController {
    store: ViewStore,
    frames: Arc<FrameChannel>,
}

impl CameraModeController {
    /// Controller applying requests to `store` and forwarding them on `frames`.
    pub fn new(store: ViewStore, frames: Arc<FrameChannel>) -> Self {
        Self { store, frames }
    }

    /// Switch to `mode`.
    ///
    /// Accepts a [`CameraMode`], a wire index or a mode name. The store and
    /// the frame channel's mirror are updated together under the frame
    /// channel lock, whatever state that channel is in, and the command is
    /// forwarded while the channel is open.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::InvalidMode`](crate::LiveError::InvalidMode) for
    /// values outside the three modes. Nothing is changed or sent in that case.
    pub fn request_mode(&self, mode: impl IntoCameraMode) -> Result<ModeChange> {
        let mode = mode.into_camera_mode().inspect_err(|e| {
            debug!(error = %e, "rejecting mode request");
        })?;
        let selection = self.frames.select_mode(mode);
        if selection.changed {
            info!(%mode, "camera mode changed");
        }
        Ok(ModeChange {
            mode,
            changed: selection.changed,
            command_sent: selection.sent,
        })
    }

    /// Mode currently held by the store.
    pub fn current(&self) -> CameraMode {
        self.store.mode()
    }
}
