//! Periodic registration announcements.

use std::time::Duration;

use futures::future::AbortHandle;

use crate::runtime;

/// A fixed-interval task, cancelled when dropped.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    handle: AbortHandle,
}

impl Heartbeat {
    /// Call `beat` every `interval`, starting one interval from now.
    ///
    /// The task ends on its own once `beat` returns `false`.
    pub fn start<F>(interval: Duration, mut beat: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let handle = runtime::spawn_abortable(async move {
            loop {
                runtime::sleep(interval).await;
                if !beat() {
                    break;
                }
            }
        });
        Heartbeat { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}
