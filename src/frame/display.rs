//! Decoded frame handles and the decoder seam.
//!
//! A [`DisplayFrame`] owns the RGBA pixels of one decoded camera image. The
//! store keeps exactly one installed handle; when a handle is finally dropped
//! it records its own release in the shared [`FrameStats`], which is how the
//! "released exactly once" accounting is observed.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use image::RgbaImage;

use crate::error::{LiveError, Result};

/// Renderable handle to one decoded camera image.
pub struct DisplayFrame {
    sequence: u64,
    pixels: RgbaImage,
    received_at: DateTime<Utc>,
    stats: Arc<FrameStats>,
}

impl DisplayFrame {
    pub(crate) fn new(
        sequence: u64,
        pixels: RgbaImage,
        received_at: DateTime<Utc>,
        stats: Arc<FrameStats>,
    ) -> Self {
        stats.decoded.fetch_add(1, Ordering::Relaxed);
        Self {
            sequence,
            pixels,
            received_at,
            stats,
        }
    }

    /// Monotonic per-channel sequence number (1 for the first installed frame).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// RGBA8 pixel buffer, row-major.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Wall-clock time the encoded payload arrived.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

impl Drop for DisplayFrame {
    fn drop(&mut self) {
        self.stats.released.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for DisplayFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayFrame")
            .field("sequence", &self.sequence)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("received_at", &self.received_at)
            .finish()
    }
}

/// Frame pipeline counters, shared between a channel and its frames.
#[derive(Debug, Default)]
pub struct FrameStats {
    pub(crate) received: AtomicU64,
    pub(crate) decoded: AtomicU64,
    pub(crate) superseded: AtomicU64,
    pub(crate) decode_failures: AtomicU64,
    pub(crate) released: AtomicU64,
    pub(crate) late: AtomicU64,
}

impl FrameStats {
    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> FrameStatsSnapshot {
        FrameStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            late: self.late.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`FrameStats`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStatsSnapshot {
    /// Binary payloads received from the transport.
    pub received: u64,
    /// Payloads decoded into a [`DisplayFrame`].
    pub decoded: u64,
    /// Payloads overwritten in the pending slot before they were decoded.
    pub superseded: u64,
    /// Payloads that failed to decode.
    pub decode_failures: u64,
    /// [`DisplayFrame`] handles dropped.
    pub released: u64,
    /// Decoded frames discarded because teardown had already begun.
    pub late: u64,
}

impl FrameStatsSnapshot {
    /// Handles decoded but not yet released.
    pub fn live_handles(&self) -> u64 {
        self.decoded.saturating_sub(self.released)
    }
}

/// Turns an encoded still image into RGBA pixels.
///
/// The frame channel calls this off the async runtime, so implementations
/// may block.
pub trait FrameDecoder: Send + Sync + 'static {
    /// Decode one complete, self-contained image payload.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::Decode`] when the payload is not a supported image.
    fn decode(&self, payload: &[u8]) -> Result<RgbaImage>;
}

/// Decoder backed by the `image` crate (JPEG and PNG).
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFrameDecoder;

impl FrameDecoder for ImageFrameDecoder {
    fn decode(&self, payload: &[u8]) -> Result<RgbaImage> {
        if payload.is_empty() {
            return Err(LiveError::Decode("empty payload".into()));
        }
        let image = image::load_from_memory(payload)
            .map_err(|e| LiveError::Decode(format!("{e} ({} bytes)", payload.len())))?;
        Ok(image.to_rgba8())
    }
}
