//! Live view: one mount's worth of channels, store and controller.
//!
//! `mount` opens one frame connection and one event connection, both feeding
//! the same [`ViewStore`]. `unmount` tears both down synchronously and
//! releases the displayed frame; dropping the view unmounts it.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::camera::IntoCameraMode;
use crate::config::LiveConfig;
use crate::connection::ConnectionState;
use crate::controller::{CameraModeController, ModeChange};
use crate::error::{LiveError, Result};
use crate::events::EventChannel;
use crate::frame::{FrameChannel, FrameDecoder, ImageFrameDecoder};
use crate::media::RecentMedia;
use crate::store::{ViewSnapshot, ViewStore, ViewUpdate};
use crate::supervisor::{ReconnectPolicy, ReconnectSupervisor};

/// Frame channel, event channel, store and mode controller for one live view.
pub struct LiveView {
    config: LiveConfig,
    store: ViewStore,
    frames: Arc<FrameChannel>,
    events: Arc<EventChannel>,
    controller: CameraModeController,
    media: Option<RecentMedia>,
    supervisor: Option<ReconnectSupervisor>,
    mounted: bool,
}

impl LiveView {
    /// Build an unmounted view from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::Config`] for invalid endpoints, or
    /// [`LiveError::Media`] if the configured media source cannot be built.
    pub fn new(config: LiveConfig) -> Result<Self> {
        Self::with_decoder(config, Arc::new(ImageFrameDecoder))
    }

    /// Build an unmounted view with a custom frame decoder.
    ///
    /// # Errors
    ///
    /// Same as [`LiveView::new`].
    pub fn with_decoder(config: LiveConfig, decoder: Arc<dyn FrameDecoder>) -> Result<Self> {
        config.validate()?;
        let store = ViewStore::new();
        let frames = Arc::new(FrameChannel::with_decoder(
            config.frame.clone(),
            store.clone(),
            decoder,
        ));
        let events = Arc::new(EventChannel::new(config.events.clone(), store.clone()));
        let controller = CameraModeController::new(store.clone(), Arc::clone(&frames));
        let media = if config.media.url.is_some() || config.media.directory.is_some() {
            Some(RecentMedia::from_config(&config.media)?)
        } else {
            None
        };

        Ok(Self {
            config,
            store,
            frames,
            events,
            controller,
            media,
            supervisor: None,
            mounted: false,
        })
    }

    /// Open both channels, closing any previous connections first.
    ///
    /// Starts the reconnect supervisor when `[reconnect] enabled` is set.
    /// Must be called inside a tokio runtime.
    pub fn mount(&mut self) {
        if self.mounted {
            self.unmount();
        }
        info!(
            frame_url = %self.config.frame.url,
            event_url = %self.config.events.url,
            "mounting live view"
        );
        self.frames.open();
        self.events.open();
        if self.config.reconnect.enabled {
            self.supervisor = Some(ReconnectSupervisor::start(
                ReconnectPolicy::from_config(&self.config.reconnect),
                Arc::clone(&self.frames),
                Arc::clone(&self.events),
            ));
        }
        self.mounted = true;
    }

    /// Close both channels and release the displayed frame. Idempotent.
    pub fn unmount(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.stop();
        }
        self.frames.close();
        self.events.close();
        if self.mounted {
            info!("live view unmounted");
        }
        self.mounted = false;
    }

    /// Whether `mount` has been called since the last `unmount`.
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// The shared view store.
    pub fn store(&self) -> &ViewStore {
        &self.store
    }

    /// Current merged snapshot.
    pub fn snapshot(&self) -> ViewSnapshot {
        self.store.snapshot()
    }

    /// Subscribe to accepted store updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewUpdate> {
        self.store.subscribe()
    }

    /// The camera mode controller.
    pub fn controller(&self) -> &CameraModeController {
        &self.controller
    }

    /// Shorthand for [`CameraModeController::request_mode`].
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::InvalidMode`] for values outside the three modes.
    pub fn request_mode(&self, mode: impl IntoCameraMode) -> Result<ModeChange> {
        self.controller.request_mode(mode)
    }

    /// The frame channel manager.
    pub fn frames(&self) -> &Arc<FrameChannel> {
        &self.frames
    }

    /// The event channel manager.
    pub fn events(&self) -> &Arc<EventChannel> {
        &self.events
    }

    /// Connection state of the frame channel.
    pub fn frame_state(&self) -> ConnectionState {
        self.frames.state()
    }

    /// Connection state of the event channel.
    pub fn event_state(&self) -> ConnectionState {
        self.events.state()
    }

    /// Most recent clips from the media collaborator, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::Media`] when no source is configured or the
    /// collaborator fails. The live channels are unaffected either way.
    pub async fn recent_media(&self, limit: usize) -> Result<Vec<String>> {
        match &self.media {
            Some(media) => media.list_recent(limit).await,
            None => Err(LiveError::Media("no media source configured".into())),
        }
    }

    /// Most recent clips, up to the configured limit.
    ///
    /// # Errors
    ///
    /// Same as [`LiveView::recent_media`].
    pub async fn recent_media_default(&self) -> Result<Vec<String>> {
        self.recent_media(self.config.media.limit).await
    }
}

impl Drop for LiveView {
    fn drop(&mut self) {
        self.unmount();
    }
}
