//! Connection state shared by the frame and event channel managers.

use std::fmt;

/// Lifecycle of one channel connection.
///
/// Transport failures are reported here rather than returned as errors; the
/// caller decides whether to reopen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Connection is being established.
    Connecting,
    /// Connected and delivering messages.
    Open,
    /// Not connected: never opened, closed locally, or closed by the server.
    #[default]
    Closed,
    /// The transport failed to connect or dropped.
    Errored(String),
}

impl ConnectionState {
    /// Whether the manager is connecting or connected.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    /// Whether the connection is usable for outbound messages.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
            Self::Errored(msg) => write!(f, "Errored: {msg}"),
        }
    }
}
