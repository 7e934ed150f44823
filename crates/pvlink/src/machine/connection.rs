// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection lifecycle and connection-attempt expiry.
//!
//! ```text
//!                 Request(Connected)            Confirm(Connected)
//!  Disconnected ---------------------> pending ---------------------> Connected
//!       ^                                 |                               |
//!       |   Confirm(ConnectionExpired)    |                               |
//!       +---------------------------------+                               |
//!       |              Request(Disconnected)                              |
//!       +-----------------------------------------------------------------+
//!
//!  Confirm(ConnectFail) from pending or Connected -> ConnectFail (retry with Request(Connected))
//! ```
//!
//! Every submission bumps the attempt counter. The coordinator tags the
//! channel callbacks and the connection timer with it, and [`confirm`] drops
//! any input whose tag is not the current attempt.
//!
//! [`confirm`]: ConnectionStateMachine::confirm

use super::{ChannelCoordinator, Flags, MachineSnapshot, Step, Transition};
use crate::error::{Error, Result};
use parking_lot::Mutex;

/// Connection states. `ConnectionExpired` is an input, never a resting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// Transport reported failure; left only by a fresh connect request.
    ConnectFail,
    ConnectionExpired,
}

#[derive(Debug)]
struct Inner {
    current: ConnectionState,
    requested: ConnectionState,
    flags: Flags,
    attempt: u64,
    timer_armed: bool,
}

impl Inner {
    fn disarm_timer(&mut self, coord: &dyn ChannelCoordinator) {
        if self.timer_armed {
            self.timer_armed = false;
            coord.stop_connection_timer();
        }
    }

    fn apply(
        &mut self,
        coord: &dyn ChannelCoordinator,
        input: Transition<ConnectionState>,
    ) -> Result<Step<ConnectionState>> {
        use ConnectionState::*;
        use Transition::{Confirm, Request, Resume};

        let input = match input {
            Resume => Request(self.requested),
            other => other,
        };

        match (self.current, input) {
            (Disconnected | ConnectFail, Request(Connected)) => {
                if self.flags.active || self.flags.pending {
                    return Ok(Step::Idle);
                }
                let attempt = self.attempt + 1;
                coord.create_channel(attempt)?;
                // Consumed even on failure below, so callbacks of the
                // discarded channel stay stale.
                self.attempt = attempt;
                if !coord.start_connection_timer(attempt) {
                    // An attempt without a countdown could stay pending forever.
                    coord.delete_channel();
                    return Err(Error::SubmissionFailure("connection timer unavailable".into()));
                }
                self.timer_armed = true;
                self.current = Disconnected;
                self.flags.pending = true;
                Ok(Step::Submitted)
            }

            (Disconnected, Confirm(Connected)) => {
                if !self.flags.pending {
                    return Ok(Step::Idle);
                }
                self.flags.active = true;
                self.flags.pending = false;
                self.flags.expired = false;
                self.disarm_timer(coord);
                self.current = Connected;
                Ok(Step::Moved(Connected))
            }

            (Disconnected, Confirm(ConnectionExpired)) => {
                self.flags.expired = self.flags.pending && self.timer_armed;
                if !(self.flags.pending && self.flags.expired) {
                    return Ok(Step::Idle);
                }
                self.flags.pending = false;
                self.flags.expired = false;
                self.disarm_timer(coord);
                coord.delete_channel();
                Ok(Step::Abandoned)
            }

            // Consumer gave up on an attempt that never came up.
            (Disconnected, Request(Disconnected)) => {
                if !self.flags.pending {
                    return Ok(Step::Idle);
                }
                self.flags.clear();
                self.disarm_timer(coord);
                coord.delete_channel();
                Ok(Step::Abandoned)
            }

            (Connected, Request(Disconnected)) => {
                if !self.flags.active {
                    return Ok(Step::Idle);
                }
                self.flags.clear();
                coord.delete_channel();
                self.current = Disconnected;
                Ok(Step::Moved(Disconnected))
            }

            // Link lost. The transport keeps the handle and reconnects on its
            // own, so wait for its Confirm(Connected) without a timer.
            (Connected, Confirm(Disconnected)) => {
                if !self.flags.active {
                    return Ok(Step::Idle);
                }
                self.flags.active = false;
                self.flags.pending = true;
                self.current = Disconnected;
                Ok(Step::Moved(Disconnected))
            }

            (Disconnected | Connected, Confirm(ConnectFail)) => {
                if !(self.flags.pending || self.flags.active) {
                    return Ok(Step::Idle);
                }
                self.flags.clear();
                self.disarm_timer(coord);
                coord.delete_channel();
                self.current = ConnectFail;
                Ok(Step::Moved(ConnectFail))
            }

            (ConnectFail, Request(Disconnected)) => {
                self.current = Disconnected;
                Ok(Step::Moved(Disconnected))
            }

            _ => Ok(Step::Idle),
        }
    }
}

/// Governs channel-level up/down lifecycle.
#[derive(Debug)]
pub struct ConnectionStateMachine {
    inner: Mutex<Inner>,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: ConnectionState::Disconnected,
                requested: ConnectionState::Disconnected,
                flags: Flags::default(),
                attempt: 0,
                timer_armed: false,
            }),
        }
    }

    /// Run one transition under the machine lock.
    ///
    /// Untagged confirmations apply to whatever attempt is current; transport
    /// callbacks should go through [`confirm`](Self::confirm) instead.
    pub fn process(
        &self,
        coord: &dyn ChannelCoordinator,
        input: Transition<ConnectionState>,
    ) -> Result<Step<ConnectionState>> {
        let mut inner = self.inner.lock();
        let previous = inner.requested;
        if let Transition::Request(state) = input {
            inner.requested = state;
        }
        let from = inner.current;
        let step = match inner.apply(coord, input) {
            Ok(step) => step,
            Err(e) => {
                inner.requested = previous;
                return Err(e);
            }
        };
        if let Step::Moved(to) = step {
            log::debug!("[connection] {:?} -> {:?}", from, to);
        }
        Ok(step)
    }

    /// Confirmation tagged with the attempt that produced it. Inputs from an
    /// earlier attempt are ignored.
    pub fn confirm(
        &self,
        coord: &dyn ChannelCoordinator,
        state: ConnectionState,
        attempt: u64,
    ) -> Result<Step<ConnectionState>> {
        let mut inner = self.inner.lock();
        if inner.attempt != attempt {
            log::trace!(
                "[connection] stale {:?} for attempt {} (current {})",
                state,
                attempt,
                inner.attempt
            );
            return Ok(Step::Idle);
        }
        let from = inner.current;
        let step = inner.apply(coord, Transition::Confirm(state))?;
        if let Step::Moved(to) = step {
            log::debug!("[connection] {:?} -> {:?} (attempt {})", from, to, attempt);
        }
        Ok(step)
    }

    pub fn current_state(&self) -> ConnectionState {
        self.inner.lock().current
    }

    pub fn requested_state(&self) -> ConnectionState {
        self.inner.lock().requested
    }

    /// Number of connection attempts submitted so far.
    pub fn attempt(&self) -> u64 {
        self.inner.lock().attempt
    }

    pub fn snapshot(&self) -> MachineSnapshot<ConnectionState> {
        let inner = self.inner.lock();
        MachineSnapshot {
            current: inner.current,
            requested: inner.requested,
            flags: inner.flags,
        }
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
