//! Single-slot mailbox implementing latest-frame-wins.
//!
//! The reader side of the frame channel `put`s every payload; the decode
//! worker `take`s whatever is newest. A payload that was never taken is
//! overwritten, so a slow consumer never accumulates a backlog.

use std::sync::Mutex;

use tokio::sync::Notify;

use crate::sync::lock;

pub(crate) struct LatestSlot<T> {
    value: Mutex<Option<T>>,
    notify: Notify,
}

impl<T> LatestSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Store `value`, returning `true` if an untaken value was overwritten.
    pub(crate) fn put(&self, value: T) -> bool {
        let superseded = lock(&self.value).replace(value).is_some();
        self.notify.notify_one();
        superseded
    }

    /// Wait for and remove the newest value.
    pub(crate) async fn take(&self) -> T {
        loop {
            if let Some(value) = lock(&self.value).take() {
                return value;
            }
            // notify_one stores a permit when nobody is waiting, so a put
            // between the check above and this await is not lost.
            self.notify.notified().await;
        }
    }
}
