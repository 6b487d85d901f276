//! Optional reconnection supervisor.
//!
//! The channel managers never reconnect by themselves. When enabled, the
//! supervisor watches each manager's connection state and reopens a channel
//! that went `Closed` or `Errored`, after a jittered exponential backoff.
//! A channel that reaches `Open` resets its attempt counter; one that fails
//! `max_attempts` times in a row is left down.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReconnectConfig;
use crate::connection::ConnectionState;
use crate::events::EventChannel;
use crate::frame::FrameChannel;
use crate::sync::lock;

/// A channel the supervisor can observe and reopen.
pub trait Reconnectable: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;
    /// Start connecting if not already active.
    fn reopen(&self);
    /// Subscribe to connection state transitions.
    fn watch(&self) -> watch::Receiver<ConnectionState>;
}

impl Reconnectable for FrameChannel {
    fn name(&self) -> &'static str {
        "frame"
    }

    fn reopen(&self) {
        self.open();
    }

    fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.watch_state()
    }
}

impl Reconnectable for EventChannel {
    fn name(&self) -> &'static str {
        "events"
    }

    fn reopen(&self) {
        self.open();
    }

    fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.watch_state()
    }
}

/// Backoff schedule derived from [`ReconnectConfig`].
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter: f64,
    max_attempts: u32,
}

impl ReconnectPolicy {
    /// Policy from config; jitter is clamped to `[0, 1]` and the max delay
    /// is never below the base delay.
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms.max(config.base_delay_ms),
            jitter: if config.jitter.is_finite() {
                config.jitter.clamp(0.0, 1.0)
            } else {
                0.0
            },
            max_attempts: config.max_attempts,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    ///
    /// `min(base * 2^attempt, max)`, scaled by a random factor in
    /// `[1 - jitter, 1 + jitter]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.min(32));
        let delay = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms) as f64;

        let spread = (rand::random::<f64>() * 2.0 - 1.0) * self.jitter;
        let total_ms = (delay * (1.0 + spread)).max(0.0);
        Duration::from_millis(total_ms as u64)
    }

    /// Consecutive failed reopens before a channel is left down.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Background reconnection for one frame channel and one event channel.
pub struct ReconnectSupervisor {
    cancel: CancellationToken,
    /// Held while reopening; `stop` takes it so no reopen can follow it.
    gate: Arc<Mutex<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ReconnectSupervisor {
    /// Start supervising both channels. Must be called inside a tokio runtime.
    pub fn start(
        policy: ReconnectPolicy,
        frames: Arc<FrameChannel>,
        events: Arc<EventChannel>,
    ) -> Self {
        let channels: [Arc<dyn Reconnectable>; 2] = [frames, events];
        Self::supervise(policy, channels)
    }

    /// Start supervising an arbitrary set of channels.
    pub fn supervise(
        policy: ReconnectPolicy,
        channels: impl IntoIterator<Item = Arc<dyn Reconnectable>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let gate = Arc::new(Mutex::new(false));
        let tasks = channels
            .into_iter()
            .map(|channel| {
                tokio::spawn(watch_channel(
                    channel,
                    policy.clone(),
                    Arc::clone(&gate),
                    cancel.clone(),
                ))
            })
            .collect();
        info!(max_attempts = policy.max_attempts, "reconnect supervisor started");
        Self {
            cancel,
            gate,
            tasks,
        }
    }

    /// Stop supervising. Once this returns no further reopen happens.
    pub fn stop(&self) {
        let mut stopped = lock(&self.gate);
        if *stopped {
            return;
        }
        *stopped = true;
        self.cancel.cancel();
        for task in &self.tasks {
            task.abort();
        }
        debug!("reconnect supervisor stopped");
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        *lock(&self.gate)
    }
}

impl Drop for ReconnectSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn watch_channel(
    channel: Arc<dyn Reconnectable>,
    policy: ReconnectPolicy,
    gate: Arc<Mutex<bool>>,
    cancel: CancellationToken,
) {
    let name = channel.name();
    let mut state_rx = channel.watch();
    let mut attempt: u32 = 0;

    loop {
        let state = state_rx.borrow_and_update().clone();
        match state {
            ConnectionState::Open => attempt = 0,
            ConnectionState::Connecting => {}
            ConnectionState::Closed | ConnectionState::Errored(_) => {
                if attempt >= policy.max_attempts {
                    warn!(channel = name, attempts = attempt, "giving up on reconnecting");
                    return;
                }
                let delay = policy.delay_for(attempt);
                attempt += 1;
                debug!(
                    channel = name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %state,
                    "scheduling reconnect"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }

                {
                    let stopped = lock(&gate);
                    if *stopped {
                        return;
                    }
                    info!(channel = name, attempt, "reconnecting");
                    channel.reopen();
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}
