// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # pvlink - live process-variable channels
//!
//! Connection, subscription, read and write coordination for named remote
//! process variables served through a non-blocking client library with
//! asynchronous callbacks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pvlink::transport::sim::SimTransport;
//! use pvlink::{ChannelEvent, Context, Value};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sim = Arc::new(SimTransport::new()?);
//!     sim.add_record("TANK:LEVEL", Value::Double(3.2));
//!
//!     let context = Context::new(sim);
//!     let channel = context.open("TANK:LEVEL")?;
//!     let events = channel.events();
//!
//!     channel.request_connect()?;
//!     channel.request_subscribe()?;
//!
//!     while let Ok(event) = events.recv() {
//!         if let ChannelEvent::Value(update) = event {
//!             println!("{} = {}", channel.name(), update.value);
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |  Channel            request_* / events() / listeners / snapshot()   |
//! +---------------------------------------------------------------------+
//! |  ChannelCore        coordinator: handles, timer, callback routing   |
//! +---------------------------------------------------------------------+
//! |  Machines           connection | subscription | read | write        |
//! +---------------------------------------------------------------------+
//! |  Transport          native client library (SimTransport in-process) |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Context`] | Owns the transport's client context, factory for channels |
//! | [`Channel`] | One named binding; request operations, read state |
//! | [`ChannelEvent`] | Everything a channel reports asynchronously |
//! | [`ChannelConfig`] | Connection timeout, auto-connect, event queue depth |
//! | [`Transport`] | Capability implemented by client library bindings |

/// Consumer-facing channel handle.
pub mod channel;
/// Channel configuration (programmatic and TOML).
pub mod config;
/// Client context registry.
pub mod context;
mod coordinator;
/// Error taxonomy.
pub mod error;
/// Event listeners and queues.
pub mod listener;
/// The four per-channel state machines.
pub mod machine;
mod timer;
/// Client library binding capability.
pub mod transport;
/// Values, metadata and alarm state.
pub mod value;

pub use channel::{Channel, ChannelSnapshot};
pub use config::{ChannelConfig, ConfigError};
pub use context::Context;
pub use error::{Error, Rejection, Result};
pub use listener::{ChannelEvent, ChannelListener, ConnectionListener, ValueListener};
pub use machine::{
    ConnectionState, Flags, MachineSnapshot, ReadState, Step, SubscriptionState, Transition,
    WriteState,
};
pub use transport::{ChannelHandle, ConnectionEvent, SubscriptionId, Transport, TransportError};
pub use value::{AlarmSeverity, ChannelInfo, DataType, Value, ValueUpdate};
