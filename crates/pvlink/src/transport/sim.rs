// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process simulated transport.
//!
//! Holds a table of named records and delivers every callback from a single
//! dedicated thread (`pvlink-sim`), the way a native client library calls
//! back from its own threads. Records can be taken offline, failed, or
//! updated to drive channels through their whole lifecycle.
//!
//! # Example
//!
//! ```rust
//! use pvlink::transport::sim::SimTransport;
//! use pvlink::{Context, Value};
//! use std::sync::Arc;
//!
//! let sim = Arc::new(SimTransport::new()?);
//! sim.add_record("BEAM:CURRENT", Value::Double(201.5));
//!
//! let context = Context::new(sim.clone());
//! let channel = context.open("BEAM:CURRENT")?;
//! channel.request_connect()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Delivery can be paused to hold completions in flight, and flushed to
//! wait until everything queued so far has been delivered.

use super::{
    ChannelHandle, ConnectionCallback, ConnectionEvent, ExceptionCallback, ReadCallback,
    SubscriptionId, Transport, TransportError, ValueCallback, WriteCallback,
};
use crate::value::{ChannelInfo, Value, ValueUpdate};
use crossbeam::channel::{self, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce() + Send>;

enum Command {
    Run(Job),
    Pause,
    Resume,
    Flush(Sender<()>),
    Shutdown,
}

#[derive(Debug, Clone)]
struct SimRecord {
    update: ValueUpdate,
    online: bool,
    states: Vec<String>,
}

impl SimRecord {
    fn new(update: ValueUpdate) -> Self {
        Self {
            update,
            online: false,
            states: Vec::new(),
        }
    }

    fn info(&self) -> ChannelInfo {
        let info = ChannelInfo {
            data_type: self.update.value.data_type(),
            element_count: self.update.value.element_count(),
            host: Some("sim".to_string()),
            enum_strings: Vec::new(),
        };
        match self.update.value {
            Value::Enum(_) => info.with_enum_strings(self.states.iter().cloned()),
            _ => info,
        }
    }
}

struct SimChannel {
    name: String,
    on_connection: Arc<ConnectionCallback>,
    subscriptions: Vec<(SubscriptionId, Arc<ValueCallback>)>,
}

#[derive(Default)]
struct SimCounters {
    channels_created: AtomicUsize,
    subscriptions_created: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
    context_inits: AtomicUsize,
}

/// Simulated process-variable server and client library.
pub struct SimTransport {
    records: DashMap<String, SimRecord>,
    channels: DashMap<ChannelHandle, SimChannel>,
    next_id: AtomicU64,
    refuse_channels: AtomicBool,
    context_active: AtomicBool,
    on_exception: Mutex<Option<Arc<ExceptionCallback>>>,
    counters: SimCounters,
    commands: Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SimTransport {
    /// Start the delivery thread.
    pub fn new() -> std::io::Result<Self> {
        let (commands, rx) = channel::unbounded();
        let worker = thread::Builder::new()
            .name("pvlink-sim".to_string())
            .spawn(move || run_delivery(rx))?;

        Ok(Self {
            records: DashMap::new(),
            channels: DashMap::new(),
            next_id: AtomicU64::new(1),
            refuse_channels: AtomicBool::new(false),
            context_active: AtomicBool::new(false),
            on_exception: Mutex::new(None),
            counters: SimCounters::default(),
            commands,
            worker: Mutex::new(Some(worker)),
        })
    }

    // ------------------------------------------------------------------
    // Record control
    // ------------------------------------------------------------------

    /// Create (or replace) an online record.
    pub fn add_record(&self, name: &str, value: Value) {
        self.records
            .insert(name.to_string(), SimRecord::new(ValueUpdate::new(value)));
        self.set_online(name, true);
    }

    /// Create (or replace) an online enumerated record with state labels.
    pub fn add_enum_record(&self, name: &str, index: u16, states: &[&str]) {
        let mut record = SimRecord::new(ValueUpdate::new(Value::Enum(index)));
        record.states = states.iter().map(|s| s.to_string()).collect();
        self.records.insert(name.to_string(), record);
        self.set_online(name, true);
    }

    /// Publish a new value to every subscriber of `name`.
    pub fn set_value(&self, name: &str, value: Value) {
        let update = match self.records.get(name) {
            Some(record) => ValueUpdate {
                value,
                timestamp: Some(std::time::SystemTime::now()),
                ..record.update.clone()
            },
            None => ValueUpdate::new(value),
        };
        self.set_update(name, update);
    }

    /// Publish a full update (alarm, units, precision) to every subscriber.
    pub fn set_update(&self, name: &str, update: ValueUpdate) {
        let online = {
            let mut record = self
                .records
                .entry(name.to_string())
                .or_insert_with(|| SimRecord::new(update.clone()));
            record.update = update.clone();
            record.online
        };
        if online {
            self.publish(name, Ok(update));
        }
    }

    /// Bring a record's server up or down. Connected channels see `Down`,
    /// searching channels see `Up` with fresh metadata.
    pub fn set_online(&self, name: &str, online: bool) {
        let info = {
            let Some(mut record) = self.records.get_mut(name) else {
                return;
            };
            if record.online == online {
                return;
            }
            record.online = online;
            record.info()
        };
        let event = if online {
            ConnectionEvent::Up(info)
        } else {
            ConnectionEvent::Down
        };
        for callback in self.connection_callbacks(name) {
            let event = event.clone();
            self.submit(Box::new(move || callback(event)));
        }
    }

    /// Report a terminal failure to every channel bound to `name`.
    pub fn fail_channel(&self, name: &str, reason: &str) {
        for callback in self.connection_callbacks(name) {
            let reason = reason.to_string();
            self.submit(Box::new(move || callback(ConnectionEvent::Failed(reason))));
        }
    }

    /// Deliver an error to every subscription on `name`.
    pub fn fail_subscriptions(&self, name: &str, reason: &str) {
        self.publish(name, Err(TransportError::new(reason)));
    }

    /// Refuse `create_channel` submissions synchronously.
    pub fn refuse_channels(&self, refuse: bool) {
        self.refuse_channels.store(refuse, Ordering::SeqCst);
    }

    /// Raise an asynchronous exception through the context callback.
    pub fn raise_exception(&self, message: &str) {
        let callback = self.on_exception.lock().clone();
        if let Some(callback) = callback {
            let error = TransportError::new(message);
            self.submit(Box::new(move || callback(error)));
        }
    }

    pub fn value_of(&self, name: &str) -> Option<Value> {
        self.records.get(name).map(|r| r.update.value.clone())
    }

    // ------------------------------------------------------------------
    // Delivery control
    // ------------------------------------------------------------------

    /// Hold every callback queued from now on until [`resume`](Self::resume).
    pub fn pause(&self) {
        let _ = self.commands.send(Command::Pause);
    }

    pub fn resume(&self) {
        let _ = self.commands.send(Command::Resume);
    }

    /// Wait until everything queued before this call has been delivered
    /// (held callbacks excepted). Returns false on timeout.
    pub fn flush(&self) -> bool {
        let (tx, rx) = channel::bounded(1);
        if self.commands.send(Command::Flush(tx)).is_err() {
            return false;
        }
        rx.recv_timeout(FLUSH_TIMEOUT).is_ok()
    }

    // ------------------------------------------------------------------
    // Counters
    // ------------------------------------------------------------------

    pub fn channels_created(&self) -> usize {
        self.counters.channels_created.load(Ordering::SeqCst)
    }

    /// Channels created and not yet deleted.
    pub fn live_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn subscriptions_created(&self) -> usize {
        self.counters.subscriptions_created.load(Ordering::SeqCst)
    }

    /// Subscriptions currently registered across all channels.
    pub fn live_subscriptions(&self) -> usize {
        self.channels.iter().map(|c| c.subscriptions.len()).sum()
    }

    pub fn reads_issued(&self) -> usize {
        self.counters.reads.load(Ordering::SeqCst)
    }

    pub fn writes_issued(&self) -> usize {
        self.counters.writes.load(Ordering::SeqCst)
    }

    pub fn context_active(&self) -> bool {
        self.context_active.load(Ordering::SeqCst)
    }

    /// Number of times the context was brought up.
    pub fn context_inits(&self) -> usize {
        self.counters.context_inits.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn submit(&self, job: Job) {
        if self.commands.send(Command::Run(job)).is_err() {
            log::debug!("[sim] delivery thread gone, dropping callback");
        }
    }

    fn connection_callbacks(&self, name: &str) -> Vec<Arc<ConnectionCallback>> {
        self.channels
            .iter()
            .filter(|c| c.name == name)
            .map(|c| Arc::clone(&c.on_connection))
            .collect()
    }

    fn publish(&self, name: &str, update: Result<ValueUpdate, TransportError>) {
        let callbacks: Vec<Arc<ValueCallback>> = self
            .channels
            .iter()
            .filter(|c| c.name == name)
            .flat_map(|c| {
                c.subscriptions
                    .iter()
                    .map(|(_, cb)| Arc::clone(cb))
                    .collect::<Vec<_>>()
            })
            .collect();
        if callbacks.is_empty() {
            return;
        }
        self.submit(Box::new(move || {
            for callback in callbacks {
                callback(update.clone());
            }
        }));
    }

    fn channel_name(&self, handle: ChannelHandle) -> Result<String, TransportError> {
        self.channels
            .get(&handle)
            .map(|c| c.name.clone())
            .ok_or_else(|| TransportError::new(format!("unknown channel handle {}", handle.raw())))
    }

    fn online_record(&self, name: &str) -> Option<SimRecord> {
        self.records
            .get(name)
            .filter(|r| r.online)
            .map(|r| r.value().clone())
    }
}

impl Transport for SimTransport {
    fn init_context(&self, on_exception: ExceptionCallback) -> Result<(), TransportError> {
        *self.on_exception.lock() = Some(Arc::new(on_exception));
        if !self.context_active.swap(true, Ordering::SeqCst) {
            self.counters.context_inits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn shutdown_context(&self) {
        self.context_active.store(false, Ordering::SeqCst);
        *self.on_exception.lock() = None;
    }

    fn create_channel(
        &self,
        name: &str,
        on_connection: ConnectionCallback,
    ) -> Result<ChannelHandle, TransportError> {
        if !self.context_active() {
            return Err(TransportError::new("client context not initialised"));
        }
        if self.refuse_channels.load(Ordering::SeqCst) {
            return Err(TransportError::new("channel creation refused"));
        }

        let handle = ChannelHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let on_connection = Arc::new(on_connection);
        self.channels.insert(
            handle,
            SimChannel {
                name: name.to_string(),
                on_connection: Arc::clone(&on_connection),
                subscriptions: Vec::new(),
            },
        );
        self.counters.channels_created.fetch_add(1, Ordering::SeqCst);

        if let Some(record) = self.online_record(name) {
            let info = record.info();
            self.submit(Box::new(move || on_connection(ConnectionEvent::Up(info))));
        }
        Ok(handle)
    }

    fn delete_channel(&self, handle: ChannelHandle) {
        self.channels.remove(&handle);
    }

    fn create_subscription(
        &self,
        handle: ChannelHandle,
        on_value: ValueCallback,
    ) -> Result<SubscriptionId, TransportError> {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let on_value = Arc::new(on_value);
        let name = {
            let mut channel = self.channels.get_mut(&handle).ok_or_else(|| {
                TransportError::new(format!("unknown channel handle {}", handle.raw()))
            })?;
            channel.subscriptions.push((id, Arc::clone(&on_value)));
            channel.name.clone()
        };
        self.counters
            .subscriptions_created
            .fetch_add(1, Ordering::SeqCst);

        if let Some(record) = self.online_record(&name) {
            let update = record.update;
            self.submit(Box::new(move || on_value(Ok(update))));
        }
        Ok(id)
    }

    fn cancel_subscription(&self, handle: ChannelHandle, id: SubscriptionId) {
        if let Some(mut channel) = self.channels.get_mut(&handle) {
            channel.subscriptions.retain(|(sub, _)| *sub != id);
        }
    }

    fn read(&self, handle: ChannelHandle, on_result: ReadCallback) -> Result<(), TransportError> {
        let name = self.channel_name(handle)?;
        self.counters.reads.fetch_add(1, Ordering::SeqCst);

        let result = self
            .online_record(&name)
            .map(|r| r.update)
            .ok_or_else(|| TransportError::new(format!("{} disconnected", name)));
        self.submit(Box::new(move || on_result(result)));
        Ok(())
    }

    fn write(
        &self,
        handle: ChannelHandle,
        value: Value,
        on_result: WriteCallback,
    ) -> Result<(), TransportError> {
        let name = self.channel_name(handle)?;
        self.counters.writes.fetch_add(1, Ordering::SeqCst);

        if self.online_record(&name).is_none() {
            let error = TransportError::new(format!("{} disconnected", name));
            self.submit(Box::new(move || on_result(Err(error))));
            return Ok(());
        }
        self.submit(Box::new(move || on_result(Ok(()))));
        // Monitors see the written value after the write completion.
        self.set_value(&name, value);
        Ok(())
    }
}

impl Drop for SimTransport {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.lock().take() {
            // The last reference can be released by a callback running on
            // the delivery thread itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

fn run_delivery(rx: Receiver<Command>) {
    let mut paused = false;
    let mut held: VecDeque<Job> = VecDeque::new();

    while let Ok(command) = rx.recv() {
        match command {
            Command::Run(job) => {
                if paused {
                    held.push_back(job);
                } else {
                    job();
                }
            }
            Command::Pause => paused = true,
            Command::Resume => {
                paused = false;
                while let Some(job) = held.pop_front() {
                    job();
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
            Command::Shutdown => break,
        }
    }
}
