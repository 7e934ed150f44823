// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot connection-attempt countdown.
//!
//! Each arm spawns a short-lived thread that blocks on a stop channel with a
//! timeout. Dropping the sender (on `stop()` or re-arm) disconnects the
//! channel and the thread exits without firing.
//!
//! The thread is never joined: `stop()` runs under the connection machine
//! lock, and a countdown that is already firing needs that same lock to
//! deliver its expiry. Late firings are discarded by the attempt tag.

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct ConnectionTimer {
    stop_tx: Mutex<Option<Sender<()>>>,
}

impl ConnectionTimer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arm the countdown. Any countdown already running is cancelled.
    ///
    /// Returns false, with nothing armed, when the thread cannot be spawned.
    pub(crate) fn start<F>(&self, timeout: Duration, on_expiry: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let spawned = std::thread::Builder::new()
            .name("pvlink-timer".into())
            .spawn(move || match stop_rx.recv_timeout(timeout) {
                Err(RecvTimeoutError::Timeout) => on_expiry(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            });

        match spawned {
            Ok(_) => {
                // Replacing the sender cancels the previous countdown.
                *self.stop_tx.lock() = Some(stop_tx);
                true
            }
            Err(e) => {
                log::error!("[timer] failed to spawn countdown thread: {}", e);
                self.stop_tx.lock().take();
                false
            }
        }
    }

    /// Cancel the countdown. Safe to call when nothing is armed.
    pub(crate) fn stop(&self) {
        self.stop_tx.lock().take();
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.stop_tx.lock().is_some()
    }
}
