//! Live frame channel: WebSocket transport, latest-frame-wins decoding and
//! frame handles.

pub mod channel;
pub mod display;
mod slot;

pub use channel::FrameChannel;
pub use display::{DisplayFrame, FrameDecoder, FrameStats, FrameStatsSnapshot, ImageFrameDecoder};
