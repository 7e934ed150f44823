// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot writes.
//!
//! Same shape as reads, except the request carries the outbound value. A
//! write that fails to submit is reported to the caller and dropped; it is
//! never retried without the consumer asking again. Completions are tagged
//! with the write's operation number, as for reads.

use super::{ChannelCoordinator, Flags, MachineSnapshot, Step, Transition};
use crate::error::{Error, Rejection, Result};
use crate::value::Value;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteState {
    WriteIdle,
    Writing,
    /// Collapses to `WriteIdle`.
    WritingFail,
}

#[derive(Debug)]
struct Inner {
    current: WriteState,
    requested: WriteState,
    flags: Flags,
    /// Value staged by `request_write`, consumed by the submission.
    outbound: Option<Value>,
    op: u64,
}

impl Inner {
    fn apply(
        &mut self,
        coord: &dyn ChannelCoordinator,
        input: Transition<WriteState>,
    ) -> Result<Step<WriteState>> {
        use Transition::{Confirm, Request};
        use WriteState::*;

        match (self.current, input) {
            (WriteIdle, Request(Writing)) => {
                let Some(value) = self.outbound.take() else {
                    return Ok(Step::Idle);
                };
                if !coord.is_connected() {
                    return Err(Error::RequestRejected(Rejection::NotConnected));
                }
                if self.flags.active {
                    return Err(Error::RequestRejected(Rejection::InFlight));
                }
                self.op += 1;
                coord.write(&value, self.op)?;
                self.flags.active = true;
                self.current = Writing;
                Ok(Step::Submitted)
            }
            (Writing, Request(Writing)) => Err(Error::RequestRejected(Rejection::InFlight)),
            (Writing, Confirm(WriteIdle)) => {
                self.flags.active = false;
                self.current = WriteIdle;
                Ok(Step::Moved(WriteIdle))
            }
            (Writing, Confirm(WritingFail)) => {
                self.flags.active = false;
                self.current = WriteIdle;
                Ok(Step::Failed)
            }
            _ => Ok(Step::Idle),
        }
    }
}

/// Governs single-shot writes of one channel.
#[derive(Debug)]
pub struct WriteStateMachine {
    inner: Mutex<Inner>,
}

impl WriteStateMachine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: WriteState::WriteIdle,
                requested: WriteState::WriteIdle,
                flags: Flags::default(),
                outbound: None,
                op: 0,
            }),
        }
    }

    /// Stage `value` and run `Request(Writing)` under one lock acquisition.
    pub fn request_write(
        &self,
        coord: &dyn ChannelCoordinator,
        value: Value,
    ) -> Result<Step<WriteState>> {
        let mut inner = self.inner.lock();
        let previous = inner.requested;
        inner.requested = WriteState::Writing;
        inner.outbound = Some(value);
        let result = inner.apply(coord, Transition::Request(WriteState::Writing));
        inner.outbound = None;
        if result.is_err() {
            inner.requested = previous;
        }
        result
    }

    /// Confirmations from the transport. A bare `Request(Writing)` without a
    /// staged value does nothing; use [`request_write`](Self::request_write).
    pub fn process(
        &self,
        coord: &dyn ChannelCoordinator,
        input: Transition<WriteState>,
    ) -> Result<Step<WriteState>> {
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

    /// Completion of write number `op`. Anything but the write in flight
    /// is ignored.
    pub fn confirm(
        &self,
        coord: &dyn ChannelCoordinator,
        state: WriteState,
        op: u64,
    ) -> Result<Step<WriteState>> {
        let mut inner = self.inner.lock();
        if inner.op != op {
            log::trace!("[write] stale completion {} (current {})", op, inner.op);
            return Ok(Step::Idle);
        }
        inner.apply(coord, Transition::Confirm(state))
    }

    pub fn current_state(&self) -> WriteState {
        self.inner.lock().current
    }

    pub fn snapshot(&self) -> MachineSnapshot<WriteState> {
        let inner = self.inner.lock();
        MachineSnapshot {
            current: inner.current,
            requested: inner.requested,
            flags: inner.flags,
        }
    }
}

impl Default for WriteStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
