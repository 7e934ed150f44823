// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot reads. At most one read is in flight per channel; a second
//! request is rejected, never queued.
//!
//! Every submission gets a fresh operation number. Completions come back
//! through [`ReadStateMachine::confirm`] carrying it, so a completion for a
//! read that was already aborted can never finish a later one.

use super::{ChannelCoordinator, Flags, MachineSnapshot, Step, Transition};
use crate::error::{Error, Rejection, Result};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadState {
    ReadIdle,
    Reading,
    /// Collapses to `ReadIdle`.
    ReadingFail,
}

#[derive(Debug)]
struct Inner {
    current: ReadState,
    requested: ReadState,
    flags: Flags,
    op: u64,
}

impl Inner {
    fn apply(
        &mut self,
        coord: &dyn ChannelCoordinator,
        input: Transition<ReadState>,
    ) -> Result<Step<ReadState>> {
        use ReadState::*;
        use Transition::{Confirm, Request};

        match (self.current, input) {
            (ReadIdle, Request(Reading)) => {
                if !coord.is_connected() {
                    return Err(Error::RequestRejected(Rejection::NotConnected));
                }
                if self.flags.active {
                    return Err(Error::RequestRejected(Rejection::InFlight));
                }
                // Consumed even when the submission fails.
                self.op += 1;
                coord.read(self.op)?;
                self.flags.active = true;
                self.current = Reading;
                Ok(Step::Submitted)
            }
            (Reading, Request(Reading)) => Err(Error::RequestRejected(Rejection::InFlight)),
            (Reading, Confirm(ReadIdle)) => {
                self.flags.active = false;
                self.current = ReadIdle;
                Ok(Step::Moved(ReadIdle))
            }
            (Reading, Confirm(ReadingFail)) => {
                self.flags.active = false;
                self.current = ReadIdle;
                Ok(Step::Failed)
            }
            _ => Ok(Step::Idle),
        }
    }
}

/// Governs single-shot reads of one channel.
#[derive(Debug)]
pub struct ReadStateMachine {
    inner: Mutex<Inner>,
}

impl ReadStateMachine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: ReadState::ReadIdle,
                requested: ReadState::ReadIdle,
                flags: Flags::default(),
                op: 0,
            }),
        }
    }

    pub fn process(
        &self,
        coord: &dyn ChannelCoordinator,
        input: Transition<ReadState>,
    ) -> Result<Step<ReadState>> {
        let mut inner = self.inner.lock();
        let previous = inner.requested;
        if let Transition::Request(state) = input {
            inner.requested = state;
        }
        let result = inner.apply(coord, input);
        if result.is_err() {
            // Refused requests leave no trace.
            inner.requested = previous;
        }
        result
    }

    /// Completion of read number `op`. Anything but the read in flight is
    /// ignored.
    pub fn confirm(
        &self,
        coord: &dyn ChannelCoordinator,
        state: ReadState,
        op: u64,
    ) -> Result<Step<ReadState>> {
        let mut inner = self.inner.lock();
        if inner.op != op {
            log::trace!("[read] stale completion {} (current {})", op, inner.op);
            return Ok(Step::Idle);
        }
        inner.apply(coord, Transition::Confirm(state))
    }

    pub fn current_state(&self) -> ReadState {
        self.inner.lock().current
    }

    pub fn snapshot(&self) -> MachineSnapshot<ReadState> {
        let inner = self.inner.lock();
        MachineSnapshot {
            current: inner.current,
            requested: inner.requested,
            flags: inner.flags,
        }
    }
}

impl Default for ReadStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
