// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel notifications.
//!
//! Every observable change of a channel is a [`ChannelEvent`]. Events reach
//! consumers in two ways:
//!
//! - **Listeners**: objects implementing [`ChannelListener`], called on the
//!   thread that produced the event (consumer thread or transport callback
//!   thread).
//! - **Queues**: [`Channel::events`](crate::Channel::events) hands out a
//!   bounded crossbeam receiver fed by an internal listener.
//!
//! # Usage
//!
//! ```ignore
//! use pvlink::{ChannelListener, ValueUpdate};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ChannelListener for Printer {
//!     fn on_value(&self, channel: &str, update: &ValueUpdate) {
//!         println!("{} = {}", channel, update.value);
//!     }
//! }
//!
//! channel.add_listener(Arc::new(Printer));
//! ```
//!
//! # Thread Safety
//!
//! Listeners are invoked with no channel lock held, so they may call back
//! into the channel. They must be `Send + Sync` and should not block.

use crate::error::Error;
use crate::machine::ConnectionState;
use crate::value::{ChannelInfo, ValueUpdate};
use crossbeam::channel::{Sender, TrySendError};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Observable change on one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Connection confirmed; carries the metadata reported by the transport.
    Connected(ChannelInfo),
    /// Connection lost or torn down.
    Disconnected,
    /// The transport gave up on the channel.
    ConnectFailed,
    /// First value arrived on a new subscription.
    Subscribed,
    /// Value from a subscription or a completed read.
    Value(ValueUpdate),
    /// A write was acknowledged by the server.
    WriteComplete,
    /// Asynchronous failure (expiry or remote error).
    Failure(Error),
}

impl ChannelEvent {
    /// Connection state implied by this event, if any.
    pub fn connection_state(&self) -> Option<ConnectionState> {
        match self {
            ChannelEvent::Connected(_) => Some(ConnectionState::Connected),
            ChannelEvent::Disconnected => Some(ConnectionState::Disconnected),
            ChannelEvent::ConnectFailed => Some(ConnectionState::ConnectFail),
            _ => None,
        }
    }
}

/// Callback interface for channel events.
///
/// All methods have no-op defaults. Override [`on_event`](Self::on_event) to
/// see every event unsplit.
pub trait ChannelListener: Send + Sync {
    fn on_connection_state_changed(&self, channel: &str, state: ConnectionState) {
        let _ = (channel, state);
    }

    fn on_subscribed(&self, channel: &str) {
        let _ = channel;
    }

    fn on_value(&self, channel: &str, update: &ValueUpdate) {
        let _ = (channel, update);
    }

    fn on_write_complete(&self, channel: &str) {
        let _ = channel;
    }

    fn on_failure(&self, channel: &str, error: &Error) {
        let _ = (channel, error);
    }

    /// Dispatch one event to the specific callbacks above.
    fn on_event(&self, channel: &str, event: &ChannelEvent) {
        if let Some(state) = event.connection_state() {
            self.on_connection_state_changed(channel, state);
        }
        match event {
            ChannelEvent::Subscribed => self.on_subscribed(channel),
            ChannelEvent::Value(update) => self.on_value(channel, update),
            ChannelEvent::WriteComplete => self.on_write_complete(channel),
            ChannelEvent::Failure(error) => self.on_failure(channel, error),
            _ => {}
        }
    }
}

/// Closure-based listener for value updates.
pub struct ValueListener<F: Fn(&ValueUpdate) + Send + Sync> {
    callback: F,
}

impl<F: Fn(&ValueUpdate) + Send + Sync> ValueListener<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F: Fn(&ValueUpdate) + Send + Sync> ChannelListener for ValueListener<F> {
    fn on_value(&self, _channel: &str, update: &ValueUpdate) {
        (self.callback)(update);
    }
}

/// Closure-based listener for connection state changes.
pub struct ConnectionListener<F: Fn(ConnectionState) + Send + Sync> {
    callback: F,
}

impl<F: Fn(ConnectionState) + Send + Sync> ConnectionListener<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F: Fn(ConnectionState) + Send + Sync> ChannelListener for ConnectionListener<F> {
    fn on_connection_state_changed(&self, _channel: &str, state: ConnectionState) {
        (self.callback)(state);
    }
}

/// Feeds a bounded queue. Events are dropped (with one warning per overflow
/// episode) while the queue is full.
pub(crate) struct QueueListener {
    tx: Sender<ChannelEvent>,
    overflowing: AtomicBool,
}

impl QueueListener {
    pub(crate) fn new(tx: Sender<ChannelEvent>) -> Self {
        Self {
            tx,
            overflowing: AtomicBool::new(false),
        }
    }
}

impl ChannelListener for QueueListener {
    fn on_event(&self, channel: &str, event: &ChannelEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => self.overflowing.store(false, Ordering::Relaxed),
            Err(TrySendError::Full(_)) => {
                if !self.overflowing.swap(true, Ordering::Relaxed) {
                    log::warn!("[listener] event queue full for {}, dropping events", channel);
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Listener registry of one channel.
#[derive(Default)]
pub(crate) struct Listeners {
    entries: RwLock<Vec<Arc<dyn ChannelListener>>>,
}

impl Listeners {
    pub(crate) fn add(&self, listener: Arc<dyn ChannelListener>) {
        self.entries.write().push(listener);
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn ChannelListener>> {
        self.entries.read().clone()
    }

    /// Deliver `event` to every listener registered so far. The registry
    /// lock is released before any listener runs.
    pub(crate) fn emit(&self, channel: &str, event: &ChannelEvent) {
        for listener in self.snapshot() {
            listener.on_event(channel, event);
        }
    }
}
