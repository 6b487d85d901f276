//! GuardCar live: client for the live camera and telemetry view.
//!
//! Two independent streaming connections feed one view:
//! Frame source (WebSocket) → decode → store.frame
//! Event source (Server-Sent Events) → validate → store.{score, recording}
//!
//! # Architecture
//!
//! - **Frame channel**: binary frames, latest-frame-wins decoding, camera
//!   selection commands
//! - **Event channel**: `suspicion` and `recording` telemetry events
//! - **View store**: merged snapshot plus a change broadcast
//! - **Mode controller**: optimistic camera mode changes
//! - **Recent media**: bounded list of recorded clips
//! - **Live view**: mount/unmount facade tying the above together, with an
//!   optional reconnect supervisor

pub mod camera;
pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod events;
pub mod frame;
pub mod media;
pub mod store;
pub mod supervisor;
mod sync;
pub mod view;

pub use camera::{CameraCommand, CameraMode, IntoCameraMode};
pub use config::LiveConfig;
pub use connection::ConnectionState;
pub use controller::{CameraModeController, ModeChange};
pub use error::{LiveError, Result};
pub use events::{EventChannel, EventOutcome, SseEvent, TelemetryStats};
pub use frame::{DisplayFrame, FrameChannel, FrameDecoder, FrameStatsSnapshot, ImageFrameDecoder};
pub use media::{DirectoryMediaSource, HttpMediaSource, MediaSource, RecentMedia};
pub use store::{TelemetrySnapshot, ViewSnapshot, ViewStore, ViewUpdate};
pub use supervisor::{ReconnectPolicy, ReconnectSupervisor};
pub use view::LiveView;
