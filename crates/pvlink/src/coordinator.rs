// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel core: the only component that talks to the transport.
//!
//! [`ChannelCore`] owns the four machines of one channel and implements
//! [`ChannelCoordinator`] for them. Transport callbacks capture a `Weak`
//! reference to the core plus a tag (connection attempt, read or write
//! operation number, or subscription generation) and are turned into
//! `Confirm` transitions. Attempt and operation tags are checked by the
//! machine under its own lock.
//!
//! # Lock order
//!
//! ```text
//! subscription / read / write  ->  connection  ->  link
//! ```
//!
//! The link lock guards the transport handles and is always innermost. The
//! metadata cache is only ever held on its own. Listeners run with no lock
//! held.

use crate::config::ChannelConfig;
use crate::context::ContextLease;
use crate::error::{Error, Result};
use crate::listener::{ChannelEvent, ChannelListener, Listeners};
use crate::machine::{
    ChannelCoordinator, ConnectionState, ConnectionStateMachine, ReadState, ReadStateMachine,
    Step, SubscriptionState, SubscriptionStateMachine, Transition, WriteState,
    WriteStateMachine,
};
use crate::timer::ConnectionTimer;
use crate::transport::{
    ChannelHandle, ConnectionCallback, ConnectionEvent, ReadCallback, SubscriptionId, Transport,
    TransportError, ValueCallback, WriteCallback,
};
use crate::value::{ChannelInfo, Value, ValueUpdate};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};

/// Transport handles of one channel.
#[derive(Debug, Default)]
struct Link {
    handle: Option<ChannelHandle>,
    subscription: Option<SubscriptionId>,
    /// Bumped whenever the subscription is replaced or dropped.
    sub_generation: u64,
}

#[derive(Debug, Default)]
struct Cache {
    info: ChannelInfo,
    last_value: Option<ValueUpdate>,
}

fn submission(e: TransportError) -> Error {
    Error::SubmissionFailure(e.to_string())
}

pub(crate) struct ChannelCore {
    me: Weak<ChannelCore>,
    name: String,
    config: ChannelConfig,
    transport: Arc<dyn Transport>,
    pub(crate) connection: ConnectionStateMachine,
    pub(crate) subscription: SubscriptionStateMachine,
    pub(crate) read: ReadStateMachine,
    pub(crate) write: WriteStateMachine,
    link: Mutex<Link>,
    timer: ConnectionTimer,
    cache: RwLock<Cache>,
    listeners: Listeners,
    // Keeps the client context up while any callback can still reach us.
    _lease: ContextLease,
}

impl ChannelCore {
    pub(crate) fn new(
        name: String,
        config: ChannelConfig,
        transport: Arc<dyn Transport>,
        lease: ContextLease,
        listeners: Vec<Arc<dyn ChannelListener>>,
    ) -> Arc<Self> {
        let registry = Listeners::default();
        for listener in listeners {
            registry.add(listener);
        }
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            name,
            config,
            transport,
            connection: ConnectionStateMachine::new(),
            subscription: SubscriptionStateMachine::new(),
            read: ReadStateMachine::new(),
            write: WriteStateMachine::new(),
            link: Mutex::new(Link::default()),
            timer: ConnectionTimer::new(),
            cache: RwLock::new(Cache::default()),
            listeners: registry,
            _lease: lease,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub(crate) fn info(&self) -> ChannelInfo {
        self.cache.read().info.clone()
    }

    pub(crate) fn last_value(&self) -> Option<ValueUpdate> {
        self.cache.read().last_value.clone()
    }

    pub(crate) fn add_listener(&self, listener: Arc<dyn ChannelListener>) {
        self.listeners.add(listener);
    }

    pub(crate) fn listeners(&self) -> Vec<Arc<dyn ChannelListener>> {
        self.listeners.snapshot()
    }

    fn emit(&self, event: ChannelEvent) {
        self.listeners.emit(&self.name, &event);
    }

    // ------------------------------------------------------------------
    // Consumer requests
    // ------------------------------------------------------------------

    pub(crate) fn request_connect(&self) -> Result<()> {
        self.connection
            .process(self, Transition::Request(ConnectionState::Connected))?;
        Ok(())
    }

    pub(crate) fn request_disconnect(&self) -> Result<()> {
        let step = self
            .connection
            .process(self, Transition::Request(ConnectionState::Disconnected))?;
        match step {
            Step::Moved(ConnectionState::Disconnected) => {
                self.abandon_dependents("disconnected");
                self.emit(ChannelEvent::Disconnected);
            }
            Step::Abandoned => {
                log::debug!("[coordinator] {} pending connection cancelled", self.name);
                self.abandon_dependents("connection cancelled");
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn request_subscribe(&self) -> Result<()> {
        self.subscription
            .process(self, Transition::Request(SubscriptionState::Subscribed))?;
        Ok(())
    }

    pub(crate) fn request_unsubscribe(&self) -> Result<()> {
        self.subscription
            .process(self, Transition::Request(SubscriptionState::Unsubscribed))?;
        Ok(())
    }

    pub(crate) fn request_read(&self) -> Result<()> {
        self.read
            .process(self, Transition::Request(ReadState::Reading))?;
        Ok(())
    }

    pub(crate) fn request_write(&self, value: Value) -> Result<()> {
        self.write.request_write(self, value)?;
        Ok(())
    }

    /// Release every transport resource. Idempotent.
    pub(crate) fn close(&self) {
        if let Err(e) = self.request_unsubscribe() {
            log::debug!("[coordinator] {} unsubscribe on close: {}", self.name, e);
        }
        if let Err(e) = self
            .connection
            .process(self, Transition::Request(ConnectionState::Disconnected))
        {
            log::debug!("[coordinator] {} disconnect on close: {}", self.name, e);
        }
        self.timer.stop();
        self.delete_channel();
    }

    // ------------------------------------------------------------------
    // Transport callbacks
    // ------------------------------------------------------------------

    fn on_connection_event(&self, attempt: u64, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Up(info) => {
                if self.connection.attempt() != attempt {
                    log::trace!("[coordinator] {} stale up for attempt {}", self.name, attempt);
                    return;
                }
                self.cache.write().info = info.clone();
                let step = self.settle(
                    "connection up",
                    self.connection
                        .confirm(self, ConnectionState::Connected, attempt),
                );
                if step == Step::Moved(ConnectionState::Connected) {
                    log::info!("[coordinator] {} connected ({:?})", self.name, info.data_type);
                    self.emit(ChannelEvent::Connected(info));
                    self.resume_dependents();
                }
            }
            ConnectionEvent::Down => {
                let step = self.settle(
                    "connection down",
                    self.connection
                        .confirm(self, ConnectionState::Disconnected, attempt),
                );
                if step == Step::Moved(ConnectionState::Disconnected) {
                    log::info!("[coordinator] {} link lost, waiting for reconnect", self.name);
                    self.abandon_dependents("link lost");
                    self.emit(ChannelEvent::Disconnected);
                }
            }
            ConnectionEvent::Failed(reason) => {
                let step = self.settle(
                    "connection failure",
                    self.connection
                        .confirm(self, ConnectionState::ConnectFail, attempt),
                );
                if step == Step::Moved(ConnectionState::ConnectFail) {
                    log::warn!("[coordinator] {} connection failed: {}", self.name, reason);
                    self.abandon_dependents("connection failed");
                    self.emit(ChannelEvent::ConnectFailed);
                    self.emit(ChannelEvent::Failure(Error::RemoteFailure(reason)));
                }
            }
        }
    }

    fn on_connection_expired(&self, attempt: u64) {
        let step = self.settle(
            "connection expiry",
            self.connection
                .confirm(self, ConnectionState::ConnectionExpired, attempt),
        );
        if step == Step::Abandoned {
            log::warn!(
                "[coordinator] {} connection attempt {} expired after {} ms",
                self.name,
                attempt,
                self.config.connection_timeout_ms
            );
            self.emit(ChannelEvent::Failure(Error::ConnectionExpired));
        }
    }

    fn on_value(&self, generation: u64, result: std::result::Result<ValueUpdate, TransportError>) {
        if self.link.lock().sub_generation != generation {
            log::trace!("[coordinator] {} dropping value for old subscription", self.name);
            return;
        }
        match result {
            Ok(update) => {
                let step = self.settle(
                    "subscription value",
                    self.subscription
                        .process(self, Transition::Confirm(SubscriptionState::SubscribedRead)),
                );
                match step {
                    Step::Moved(SubscriptionState::Subscribed) => {
                        self.cache.write().last_value = Some(update.clone());
                        self.emit(ChannelEvent::Subscribed);
                        self.emit(ChannelEvent::Value(update));
                    }
                    Step::Pulse => {
                        self.cache.write().last_value = Some(update.clone());
                        self.emit(ChannelEvent::Value(update));
                    }
                    _ => {}
                }
            }
            Err(e) => {
                let step = self.settle(
                    "subscription failure",
                    self.subscription
                        .process(self, Transition::Confirm(SubscriptionState::SubscribeFail)),
                );
                if step == Step::Failed {
                    log::warn!("[coordinator] {} subscription failed: {}", self.name, e);
                    self.emit(ChannelEvent::Failure(Error::RemoteFailure(format!(
                        "subscription failed: {}",
                        e
                    ))));
                }
            }
        }
    }

    fn on_read_result(&self, op: u64, result: std::result::Result<ValueUpdate, TransportError>) {
        match result {
            Ok(update) => {
                let step = self.settle(
                    "read completion",
                    self.read.confirm(self, ReadState::ReadIdle, op),
                );
                if step == Step::Moved(ReadState::ReadIdle) {
                    self.cache.write().last_value = Some(update.clone());
                    self.emit(ChannelEvent::Value(update));
                }
            }
            Err(e) => {
                let step = self.settle(
                    "read failure",
                    self.read.confirm(self, ReadState::ReadingFail, op),
                );
                if step == Step::Failed {
                    self.emit(ChannelEvent::Failure(Error::RemoteFailure(format!(
                        "read failed: {}",
                        e
                    ))));
                }
            }
        }
    }

    fn on_write_result(&self, op: u64, result: std::result::Result<(), TransportError>) {
        match result {
            Ok(()) => {
                let step = self.settle(
                    "write completion",
                    self.write.confirm(self, WriteState::WriteIdle, op),
                );
                if step == Step::Moved(WriteState::WriteIdle) {
                    self.emit(ChannelEvent::WriteComplete);
                }
            }
            Err(e) => {
                let step = self.settle(
                    "write failure",
                    self.write.confirm(self, WriteState::WritingFail, op),
                );
                if step == Step::Failed {
                    self.emit(ChannelEvent::Failure(Error::RemoteFailure(format!(
                        "write failed: {}",
                        e
                    ))));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Cross-machine reactions
    // ------------------------------------------------------------------

    /// Connection came up: re-evaluate the standing subscribe intent.
    fn resume_dependents(&self) {
        if let Err(e) = self.subscription.process(self, Transition::Resume) {
            log::warn!("[coordinator] {} re-subscribe failed: {}", self.name, e);
            self.emit(ChannelEvent::Failure(e));
        }
    }

    /// Connection went away: drop the subscription (keeping the intent) and
    /// fail any read or write still in flight. Their completions, if they
    /// ever arrive, carry an operation number the machines no longer accept.
    fn abandon_dependents(&self, reason: &str) {
        self.settle(
            "subscription teardown",
            self.subscription
                .process(self, Transition::Confirm(SubscriptionState::Unsubscribed)),
        );

        let read = self.settle(
            "read abort",
            self.read.process(self, Transition::Confirm(ReadState::ReadingFail)),
        );
        if read == Step::Failed {
            self.emit(ChannelEvent::Failure(Error::RemoteFailure(format!(
                "read aborted: {}",
                reason
            ))));
        }
        let write = self.settle(
            "write abort",
            self.write.process(self, Transition::Confirm(WriteState::WritingFail)),
        );
        if write == Step::Failed {
            self.emit(ChannelEvent::Failure(Error::RemoteFailure(format!(
                "write aborted: {}",
                reason
            ))));
        }
    }

    /// Confirmations never submit anything, so an error here is a bug in the
    /// transition table rather than a transport failure.
    fn settle<S>(&self, what: &str, result: Result<Step<S>>) -> Step<S> {
        result.unwrap_or_else(|e| {
            log::error!("[coordinator] {} {}: {}", self.name, what, e);
            Step::Idle
        })
    }
}

impl ChannelCoordinator for ChannelCore {
    fn is_connected(&self) -> bool {
        self.connection.current_state() == ConnectionState::Connected
    }

    fn create_channel(&self, attempt: u64) -> Result<()> {
        let me = self.me.clone();
        let on_connection: ConnectionCallback = Box::new(move |event| {
            if let Some(core) = me.upgrade() {
                core.on_connection_event(attempt, event);
            }
        });

        let mut link = self.link.lock();
        if let Some(stale) = link.handle.take() {
            if let Some(sub) = link.subscription.take() {
                self.transport.cancel_subscription(stale, sub);
            }
            self.transport.delete_channel(stale);
        }
        let handle = self
            .transport
            .create_channel(&self.name, on_connection)
            .map_err(submission)?;
        link.handle = Some(handle);
        log::debug!(
            "[coordinator] {} channel created (handle {}, attempt {})",
            self.name,
            handle.raw(),
            attempt
        );
        Ok(())
    }

    fn delete_channel(&self) {
        let mut link = self.link.lock();
        if let Some(handle) = link.handle.take() {
            if let Some(sub) = link.subscription.take() {
                self.transport.cancel_subscription(handle, sub);
                link.sub_generation += 1;
            }
            self.transport.delete_channel(handle);
            log::debug!("[coordinator] {} channel deleted (handle {})", self.name, handle.raw());
        }
    }

    fn start_connection_timer(&self, attempt: u64) -> bool {
        let me = self.me.clone();
        self.timer.start(self.config.connection_timeout(), move || {
            if let Some(core) = me.upgrade() {
                core.on_connection_expired(attempt);
            }
        })
    }

    fn stop_connection_timer(&self) {
        self.timer.stop();
    }

    fn create_subscription(&self) -> Result<()> {
        let mut link = self.link.lock();
        let handle = link
            .handle
            .ok_or_else(|| Error::SubmissionFailure("no channel handle".into()))?;
        if let Some(old) = link.subscription.take() {
            self.transport.cancel_subscription(handle, old);
        }
        link.sub_generation += 1;
        let generation = link.sub_generation;

        let me = self.me.clone();
        let on_value: ValueCallback = Box::new(move |result| {
            if let Some(core) = me.upgrade() {
                core.on_value(generation, result);
            }
        });
        let id = self
            .transport
            .create_subscription(handle, on_value)
            .map_err(submission)?;
        link.subscription = Some(id);
        log::debug!("[coordinator] {} subscription submitted", self.name);
        Ok(())
    }

    fn drop_subscription(&self) {
        let mut link = self.link.lock();
        if let Some(sub) = link.subscription.take() {
            if let Some(handle) = link.handle {
                self.transport.cancel_subscription(handle, sub);
            }
        }
        link.sub_generation += 1;
    }

    fn read(&self, op: u64) -> Result<()> {
        let link = self.link.lock();
        let handle = link
            .handle
            .ok_or_else(|| Error::SubmissionFailure("no channel handle".into()))?;

        let me = self.me.clone();
        let on_result: ReadCallback = Box::new(move |result| {
            if let Some(core) = me.upgrade() {
                core.on_read_result(op, result);
            }
        });
        self.transport.read(handle, on_result).map_err(submission)
    }

    fn write(&self, value: &Value, op: u64) -> Result<()> {
        let data_type = self.cache.read().info.data_type;
        if !data_type.is_known() {
            return Err(Error::SubmissionFailure(
                "data type unknown, no metadata from server yet".into(),
            ));
        }

        let link = self.link.lock();
        let handle = link
            .handle
            .ok_or_else(|| Error::SubmissionFailure("no channel handle".into()))?;

        let me = self.me.clone();
        let on_result: WriteCallback = Box::new(move |result| {
            if let Some(core) = me.upgrade() {
                core.on_write_result(op, result);
            }
        });
        self.transport
            .write(handle, value.clone(), on_result)
            .map_err(submission)
    }
}
