// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel state machines.
//!
//! A channel owns four sibling machines: connection, subscription, read and
//! write. Each one is driven exclusively through its `process()` entry point,
//! which takes the machine's own lock for the whole transition decision.
//!
//! # Two call sites, one alphabet
//!
//! ```text
//! consumer thread                       transport callback thread
//!   request_connect()                     channel up
//!        |                                     |
//!        v                                     v
//!   process(Request(Connected))          process(Confirm(Connected))
//!        \                                     /
//!         +---------> transition table <------+
//!                          |
//!                          v
//!                 &dyn ChannelCoordinator
//!          (create/delete channel, subscribe, read, write)
//! ```
//!
//! The machines never touch the transport. They receive the coordinator by
//! reference on every call, so tests drive them with a recording fake.
//!
//! # Lock order
//!
//! Subscription, read and write may query the connection machine (through
//! [`ChannelCoordinator::is_connected`]) while holding their own lock. The
//! connection machine never takes a sibling lock.

mod connection;
mod read;
mod subscription;
mod write;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{ConnectionState, ConnectionStateMachine};
pub use read::{ReadState, ReadStateMachine};
pub use subscription::{SubscriptionState, SubscriptionStateMachine};
pub use write::{WriteState, WriteStateMachine};

use crate::error::Result;
use crate::value::Value;

/// Input accepted by a machine's `process()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    /// Consumer intent. Recorded as the machine's requested state.
    Request(S),
    /// Transport observation, delivered from a callback thread.
    Confirm(S),
    /// Re-evaluate the standing consumer intent without changing it.
    Resume,
}

/// What a single `process()` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<S> {
    /// Nothing to do in the current state; the input was recorded or ignored.
    Idle,
    /// A transport action was submitted and awaits confirmation.
    Submitted,
    /// The confirmed state changed.
    Moved(S),
    /// A value arrived on an established subscription.
    Pulse,
    /// The outstanding operation failed; the machine collapsed to idle.
    Failed,
    /// A half-open action was torn down without ever being confirmed.
    Abandoned,
}

/// Progress flags shared by all four machines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    /// Submitted, not yet confirmed.
    pub pending: bool,
    /// Confirmed established (read/write: request in flight).
    pub active: bool,
    /// The pending action timed out.
    pub expired: bool,
}

impl Flags {
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    /// `active` and `expired` each exclude `pending`, and never coexist.
    pub fn is_consistent(&self) -> bool {
        !(self.active && self.pending)
            && !(self.expired && self.pending)
            && !(self.active && self.expired)
    }
}

/// Point-in-time copy of one machine, taken under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineSnapshot<S> {
    pub current: S,
    pub requested: S,
    pub flags: Flags,
}

/// Actions the machines delegate to the owner of the transport.
///
/// Submissions must return without waiting for completion; completions come
/// back later as [`Transition::Confirm`] inputs. Implementations must not call
/// back into any machine from inside these methods.
pub trait ChannelCoordinator: Send + Sync {
    /// Confirmed state of the sibling connection machine.
    fn is_connected(&self) -> bool;

    /// Submit channel creation. `attempt` tags every callback of this attempt.
    fn create_channel(&self, attempt: u64) -> Result<()>;

    /// Tear down the transport channel. Must be idempotent.
    fn delete_channel(&self);

    /// Arm the expiry countdown for `attempt`. Returns false when no
    /// countdown could be started.
    fn start_connection_timer(&self, attempt: u64) -> bool;

    fn stop_connection_timer(&self);

    fn create_subscription(&self) -> Result<()>;

    /// Discard the subscription handle. Must be idempotent.
    fn drop_subscription(&self);

    /// Submit read number `op`; its completion must carry the same number.
    fn read(&self, op: u64) -> Result<()>;

    fn write(&self, value: &Value, op: u64) -> Result<()>;
}
