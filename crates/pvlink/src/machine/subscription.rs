// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Value-stream subscription lifecycle, gated by the connection.
//!
//! The requested state is the consumer's standing intent. Callback inputs
//! never overwrite it, so a subscription torn down by connection loss is
//! re-established by [`Transition::Resume`] once the connection is back.

use super::{ChannelCoordinator, Flags, MachineSnapshot, Step, Transition};
use crate::error::Result;
use parking_lot::Mutex;

/// Subscription states. `SubscribedRead` and `SubscribeFail` are transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribed,
    /// Value pulse on an established subscription; collapses to `Subscribed`.
    SubscribedRead,
    /// Collapses to `Unsubscribed`, leaving the intent in place for retry.
    SubscribeFail,
}

#[derive(Debug)]
struct Inner {
    current: SubscriptionState,
    requested: SubscriptionState,
    flags: Flags,
}

impl Inner {
    fn apply(
        &mut self,
        coord: &dyn ChannelCoordinator,
        input: Transition<SubscriptionState>,
    ) -> Result<Step<SubscriptionState>> {
        use SubscriptionState::*;
        use Transition::{Confirm, Request, Resume};

        match (self.current, input) {
            (Unsubscribed, Request(Subscribed) | Resume) => {
                if self.requested != Subscribed || self.flags.pending || self.flags.active {
                    return Ok(Step::Idle);
                }
                if !coord.is_connected() {
                    // Deferred until the connection comes up.
                    return Ok(Step::Idle);
                }
                coord.create_subscription()?;
                self.flags.pending = true;
                Ok(Step::Submitted)
            }

            // First value establishes the subscription.
            (Unsubscribed, Confirm(Subscribed | SubscribedRead)) => {
                if !self.flags.pending {
                    return Ok(Step::Idle);
                }
                self.flags.pending = false;
                self.flags.expired = false;
                self.flags.active = true;
                self.current = Subscribed;
                Ok(Step::Moved(Subscribed))
            }

            (Subscribed, Confirm(SubscribedRead)) => {
                // SubscribedRead collapses straight back; nothing to tear down.
                Ok(Step::Pulse)
            }

            (_, Request(Unsubscribed) | Confirm(Unsubscribed)) => {
                if self.flags.pending || self.flags.active {
                    coord.drop_subscription();
                }
                self.flags.clear();
                if self.current == Unsubscribed {
                    return Ok(Step::Idle);
                }
                self.current = Unsubscribed;
                Ok(Step::Moved(Unsubscribed))
            }

            (_, Confirm(SubscribeFail)) => {
                if !(self.flags.pending || self.flags.active) {
                    return Ok(Step::Idle);
                }
                coord.drop_subscription();
                self.flags.clear();
                self.current = Unsubscribed;
                Ok(Step::Failed)
            }

            _ => Ok(Step::Idle),
        }
    }
}

/// Governs the subscription of one channel.
#[derive(Debug)]
pub struct SubscriptionStateMachine {
    inner: Mutex<Inner>,
}

impl SubscriptionStateMachine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: SubscriptionState::Unsubscribed,
                requested: SubscriptionState::Unsubscribed,
                flags: Flags::default(),
            }),
        }
    }

    pub fn process(
        &self,
        coord: &dyn ChannelCoordinator,
        input: Transition<SubscriptionState>,
    ) -> Result<Step<SubscriptionState>> {
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
        match step {
            Step::Moved(to) => log::debug!("[subscription] {:?} -> {:?}", from, to),
            Step::Failed => log::debug!("[subscription] failed, back to Unsubscribed"),
            _ => {}
        }
        Ok(step)
    }

    pub fn current_state(&self) -> SubscriptionState {
        self.inner.lock().current
    }

    /// The consumer's standing subscribe intent.
    pub fn requested_state(&self) -> SubscriptionState {
        self.inner.lock().requested
    }

    pub fn snapshot(&self) -> MachineSnapshot<SubscriptionState> {
        let inner = self.inner.lock();
        MachineSnapshot {
            current: inner.current,
            requested: inner.requested,
            flags: inner.flags,
        }
    }
}

impl Default for SubscriptionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
