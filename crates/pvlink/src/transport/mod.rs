// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport binding capability.
//!
//! A transport is the native client library that actually talks to the
//! process-variable servers. Every operation is a non-blocking submission:
//! it returns as soon as the request is accepted (or refused), and the
//! outcome arrives later through the supplied callback on a thread owned by
//! the transport.
//!
//! # Contract
//!
//! - Completion callbacks are invoked exactly once per accepted `read`/`write`.
//! - Connection and value callbacks may fire any number of times until the
//!   channel or subscription is deleted.
//! - Callbacks must never be invoked inline from the submitting call.
//! - `delete_channel` and `cancel_subscription` must tolerate handles that are
//!   already gone.
//!
//! # Implementations
//!
//! - [`sim::SimTransport`] - in-process records with a delivery thread
//!   (feature `sim`)

#[cfg(feature = "sim")]
pub mod sim;

use crate::value::{ChannelInfo, Value, ValueUpdate};

/// Opaque transport channel handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(u64);

impl ChannelHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Opaque subscription handle, scoped to its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Connection notification for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Channel reachable; carries fresh metadata.
    Up(ChannelInfo),
    /// Link lost. The transport keeps searching on the same handle.
    Down,
    /// The transport gave up on the channel.
    Failed(String),
}

/// Failure reported by the transport, synchronously or through a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransportError {}

pub type ExceptionCallback = Box<dyn Fn(TransportError) + Send + Sync>;
pub type ConnectionCallback = Box<dyn Fn(ConnectionEvent) + Send + Sync>;
pub type ValueCallback = Box<dyn Fn(Result<ValueUpdate, TransportError>) + Send + Sync>;
pub type ReadCallback = Box<dyn FnOnce(Result<ValueUpdate, TransportError>) + Send>;
pub type WriteCallback = Box<dyn FnOnce(Result<(), TransportError>) + Send>;

/// Non-blocking client library primitives.
pub trait Transport: Send + Sync {
    /// Bring up the process-wide client context.
    fn init_context(&self, on_exception: ExceptionCallback) -> Result<(), TransportError>;

    /// Release the process-wide client context.
    fn shutdown_context(&self);

    fn create_channel(
        &self,
        name: &str,
        on_connection: ConnectionCallback,
    ) -> Result<ChannelHandle, TransportError>;

    fn delete_channel(&self, handle: ChannelHandle);

    fn create_subscription(
        &self,
        handle: ChannelHandle,
        on_value: ValueCallback,
    ) -> Result<SubscriptionId, TransportError>;

    fn cancel_subscription(&self, handle: ChannelHandle, id: SubscriptionId);

    fn read(&self, handle: ChannelHandle, on_result: ReadCallback) -> Result<(), TransportError>;

    fn write(
        &self,
        handle: ChannelHandle,
        value: Value,
        on_result: WriteCallback,
    ) -> Result<(), TransportError>;
}
