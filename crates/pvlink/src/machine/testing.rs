// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Recording coordinator for machine unit tests.

use super::ChannelCoordinator;
use crate::error::{Error, Result};
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    CreateChannel(u64),
    DeleteChannel,
    StartTimer(u64),
    StopTimer,
    CreateSubscription,
    DropSubscription,
    Read,
    Write(Value),
}

#[derive(Default)]
pub(crate) struct FakeCoordinator {
    pub connected: AtomicBool,
    pub refuse: AtomicBool,
    pub no_timer: AtomicBool,
    calls: Mutex<Vec<Call>>,
}

impl FakeCoordinator {
    pub fn connected() -> Self {
        let fake = Self::default();
        fake.connected.store(true, Ordering::SeqCst);
        fake
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make every subsequent submission fail synchronously.
    pub fn refuse_submissions(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make every subsequent timer arm fail.
    pub fn refuse_timers(&self, refuse: bool) {
        self.no_timer.store(refuse, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == wanted).count()
    }

    pub fn count_creates(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::CreateChannel(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn submit(&self, call: Call) -> Result<()> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::SubmissionFailure(format!("{:?} refused", call)));
        }
        self.record(call);
        Ok(())
    }
}

impl ChannelCoordinator for FakeCoordinator {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn create_channel(&self, attempt: u64) -> Result<()> {
        self.submit(Call::CreateChannel(attempt))
    }

    fn delete_channel(&self) {
        self.record(Call::DeleteChannel);
    }

    fn start_connection_timer(&self, attempt: u64) -> bool {
        if self.no_timer.load(Ordering::SeqCst) {
            return false;
        }
        self.record(Call::StartTimer(attempt));
        true
    }

    fn stop_connection_timer(&self) {
        self.record(Call::StopTimer);
    }

    fn create_subscription(&self) -> Result<()> {
        self.submit(Call::CreateSubscription)
    }

    fn drop_subscription(&self) {
        self.record(Call::DropSubscription);
    }

    fn read(&self, _op: u64) -> Result<()> {
        self.submit(Call::Read)
    }

    fn write(&self, value: &Value, _op: u64) -> Result<()> {
        self.submit(Call::Write(value.clone()))
    }
}
