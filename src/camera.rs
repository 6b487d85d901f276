//! Camera selection values and the outbound selection command.
//!
//! The frame source streams one of three feeds. The selection travels over
//! the frame channel as `{"camera": <index>}` where the index is the
//! [`CameraMode::wire_index`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{LiveError, Result};

/// Which camera feed(s) the frame channel should stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraMode {
    /// First camera only (wire index 0).
    #[default]
    Primary,
    /// Second camera only (wire index 1).
    Secondary,
    /// Both cameras side by side (wire index 2).
    Combined,
}

impl CameraMode {
    /// All modes in wire-index order.
    pub const ALL: [CameraMode; 3] = [Self::Primary, Self::Secondary, Self::Combined];

    /// Index sent in the `camera` field of the selection command.
    pub fn wire_index(self) -> u8 {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
            Self::Combined => 2,
        }
    }

    /// Map a wire index back to a mode.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::InvalidMode`] for anything other than 0, 1 or 2.
    pub fn from_wire(index: i64) -> Result<Self> {
        match index {
            0 => Ok(Self::Primary),
            1 => Ok(Self::Secondary),
            2 => Ok(Self::Combined),
            other => Err(LiveError::InvalidMode(other.to_string())),
        }
    }

    /// Lowercase name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Combined => "combined",
        }
    }
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraMode {
    type Err = LiveError;

    /// Accepts a mode name (case-insensitive) or a wire index.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(index) = trimmed.parse::<i64>() {
            return Self::from_wire(index);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "secondary" => Ok(Self::Secondary),
            "combined" => Ok(Self::Combined),
            _ => Err(LiveError::InvalidMode(trimmed.to_owned())),
        }
    }
}

/// Anything an operator can hand to the mode controller.
///
/// Typed modes always convert; raw wire values and names are validated.
pub trait IntoCameraMode {
    /// Validate and convert into a [`CameraMode`].
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::InvalidMode`] when the value is not one of the
    /// three enumerated modes.
    fn into_camera_mode(self) -> Result<CameraMode>;
}

impl IntoCameraMode for CameraMode {
    fn into_camera_mode(self) -> Result<CameraMode> {
        Ok(self)
    }
}

impl IntoCameraMode for i64 {
    fn into_camera_mode(self) -> Result<CameraMode> {
        CameraMode::from_wire(self)
    }
}

impl IntoCameraMode for u8 {
    fn into_camera_mode(self) -> Result<CameraMode> {
        CameraMode::from_wire(i64::from(self))
    }
}

impl IntoCameraMode for &str {
    fn into_camera_mode(self) -> Result<CameraMode> {
        self.parse()
    }
}

/// Outbound camera selection message: `{"camera": <index>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraCommand {
    /// Wire index of the requested mode.
    pub camera: u8,
}

impl CameraCommand {
    /// Build the command selecting `mode`.
    pub fn select(mode: CameraMode) -> Self {
        Self {
            camera: mode.wire_index(),
        }
    }

    /// Serialize to the JSON text sent over the frame channel.
    pub fn to_json(self) -> String {
        // A struct with a single integer field cannot fail to serialize.
        serde_json::to_string(&self).unwrap_or_else(|_| format!("{{\"camera\":{}}}", self.camera))
    }
}
