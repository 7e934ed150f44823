// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Consumer-facing channel handle.
//!
//! Every `request_*` call returns as soon as the machine has decided what to
//! do. Outcomes that depend on the server (connection, first value, read and
//! write completion, expiry) arrive later as [`ChannelEvent`]s.
//!
//! # Example
//!
//! ```ignore
//! let channel = context.open("TANK:LEVEL")?;
//! let events = channel.events();
//!
//! channel.request_connect()?;
//! channel.request_subscribe()?;   // deferred until connected
//!
//! for event in events.iter() {
//!     if let ChannelEvent::Value(update) = event {
//!         println!("level = {}", update.value);
//!     }
//! }
//! ```
//!
//! Dropping the channel releases its transport channel and subscription.

use crate::config::ChannelConfig;
use crate::context::Context;
use crate::coordinator::ChannelCore;
use crate::error::{Error, Result};
use crate::listener::{
    ChannelEvent, ChannelListener, ConnectionListener, QueueListener, ValueListener,
};
use crate::machine::{
    ConnectionState, MachineSnapshot, ReadState, SubscriptionState, WriteState,
};
use crate::value::{ChannelInfo, DataType, Value, ValueUpdate};
use crossbeam::channel::{self, Receiver};
use std::sync::Arc;

/// State of all four machines of a channel, for diagnostics.
///
/// Each machine is sampled under its own lock; the four samples are not
/// taken atomically with respect to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub connection: MachineSnapshot<ConnectionState>,
    pub subscription: MachineSnapshot<SubscriptionState>,
    pub read: MachineSnapshot<ReadState>,
    pub write: MachineSnapshot<WriteState>,
}

impl ChannelSnapshot {
    /// Every machine's flags are mutually consistent.
    pub fn is_consistent(&self) -> bool {
        self.connection.flags.is_consistent()
            && self.subscription.flags.is_consistent()
            && self.read.flags.is_consistent()
            && self.write.flags.is_consistent()
    }
}

/// A named binding to one remote process variable.
pub struct Channel {
    core: Arc<ChannelCore>,
    context: Context,
}

impl Channel {
    pub(crate) fn new(core: Arc<ChannelCore>, context: Context) -> Self {
        Self { core, context }
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn config(&self) -> &ChannelConfig {
        self.core.config()
    }

    /// Ask for a connection. Repeated requests while one is pending or
    /// established are no-ops.
    pub fn request_connect(&self) -> Result<()> {
        self.core.request_connect()
    }

    /// Tear the connection down, or cancel a pending attempt. The
    /// subscription intent survives and is honoured on the next connect.
    pub fn request_disconnect(&self) -> Result<()> {
        self.core.request_disconnect()
    }

    /// Record the intent to receive value updates. Submitted immediately when
    /// connected, otherwise as soon as the connection comes up.
    pub fn request_subscribe(&self) -> Result<()> {
        self.core.request_subscribe()
    }

    pub fn request_unsubscribe(&self) -> Result<()> {
        self.core.request_unsubscribe()
    }

    /// One-shot read. Rejected when not connected or while a read is in
    /// flight; the result arrives as [`ChannelEvent::Value`].
    pub fn request_read(&self) -> Result<()> {
        self.core.request_read()
    }

    /// One-shot write. Rejected when not connected or while a write is in
    /// flight; refused while the server's data type is still unknown.
    pub fn request_write(&self, value: Value) -> Result<()> {
        self.core.request_write(value)
    }

    /// Call `callback` for every value (subscription updates and reads).
    pub fn on_value<F>(&self, callback: F)
    where
        F: Fn(&ValueUpdate) + Send + Sync + 'static,
    {
        self.core.add_listener(Arc::new(ValueListener::new(callback)));
    }

    /// Call `callback` for every confirmed connection state change.
    pub fn on_connection_state_changed<F>(&self, callback: F)
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.core
            .add_listener(Arc::new(ConnectionListener::new(callback)));
    }

    pub fn add_listener(&self, listener: Arc<dyn ChannelListener>) {
        self.core.add_listener(listener);
    }

    /// Bounded queue of every event from now on. Events are dropped while
    /// the queue is full.
    pub fn events(&self) -> Receiver<ChannelEvent> {
        let (tx, rx) = channel::bounded(self.core.config().event_queue_depth);
        self.core.add_listener(Arc::new(QueueListener::new(tx)));
        rx
    }

    /// Rebind to another process variable.
    ///
    /// The old transport channel is released before the new one is created.
    /// The listeners (including `events()` queues) and the connect and
    /// subscribe intents carry over. An invalid name is refused before
    /// anything is released.
    pub fn rename(&mut self, name: &str) -> Result<()> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidName(name.to_string()));
        }

        let config = self.core.config().clone();
        let auto_connect = config.auto_connect;
        let wants_connection =
            self.core.connection.requested_state() == ConnectionState::Connected;
        let wants_subscription =
            self.core.subscription.requested_state() == SubscriptionState::Subscribed;

        log::debug!("[channel] renaming {} -> {}", self.name(), trimmed);
        // The old core keeps its context lease until replaced, so the client
        // context stays up across the swap.
        self.core.close();
        let renamed = self
            .context
            .open_with_listeners(trimmed, config, self.core.listeners())?;
        drop(std::mem::replace(self, renamed));

        if wants_subscription {
            self.request_subscribe()?;
        }
        if wants_connection && !auto_connect {
            self.request_connect()?;
        }
        Ok(())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.core.connection.current_state()
    }

    pub fn subscription_state(&self) -> SubscriptionState {
        self.core.subscription.current_state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Metadata from the most recent connection.
    pub fn info(&self) -> ChannelInfo {
        self.core.info()
    }

    pub fn data_type(&self) -> DataType {
        self.core.info().data_type
    }

    /// State labels of an enumerated channel, empty until connected or for
    /// any other field type.
    pub fn enumerations(&self) -> Vec<String> {
        self.core.info().enum_strings
    }

    /// Most recent value from a subscription or read.
    pub fn last_value(&self) -> Option<ValueUpdate> {
        self.core.last_value()
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            connection: self.core.connection.snapshot(),
            subscription: self.core.subscription.snapshot(),
            read: self.core.read.snapshot(),
            write: self.core.write.snapshot(),
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name())
            .field("connection", &self.connection_state())
            .field("subscription", &self.subscription_state())
            .finish()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.core.close();
        log::debug!("[channel] closed {}", self.core.name());
    }
}
