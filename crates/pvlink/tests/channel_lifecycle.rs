// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end channel lifecycle against the simulated transport.

use pvlink::transport::sim::SimTransport;
use pvlink::transport::{
    ChannelHandle, ConnectionCallback, ExceptionCallback, ReadCallback, SubscriptionId,
    ValueCallback, WriteCallback,
};
use crossbeam::channel::TryRecvError;
use pvlink::{
    Channel, ChannelConfig, ChannelEvent, ChannelInfo, ConnectionEvent, ConnectionState,
    Context, Error, ReadState, Rejection, SubscriptionState, Transport, TransportError, Value,
    ValueUpdate,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn sim_with(records: &[(&str, Value)]) -> Arc<SimTransport> {
    let sim = Arc::new(SimTransport::new().expect("spawn sim delivery thread"));
    for (name, value) in records {
        sim.add_record(name, value.clone());
    }
    sim
}

/// Let callbacks (and the callbacks they trigger) drain.
fn quiesce(sim: &SimTransport) {
    assert!(sim.flush());
    assert!(sim.flush());
}

fn label(event: &ChannelEvent) -> &'static str {
    match event {
        ChannelEvent::Connected(_) => "connected",
        ChannelEvent::Disconnected => "disconnected",
        ChannelEvent::ConnectFailed => "connect-failed",
        ChannelEvent::Subscribed => "subscribed",
        ChannelEvent::Value(_) => "value",
        ChannelEvent::WriteComplete => "write-complete",
        ChannelEvent::Failure(_) => "failure",
    }
}

fn labels(rx: &crossbeam::channel::Receiver<ChannelEvent>) -> Vec<&'static str> {
    rx.try_iter().map(|e| label(&e)).collect()
}

fn wait_for<F>(rx: &crossbeam::channel::Receiver<ChannelEvent>, mut pred: F) -> ChannelEvent
where
    F: FnMut(&ChannelEvent) -> bool,
{
    loop {
        let event = rx.recv_timeout(WAIT).expect("expected event did not arrive");
        if pred(&event) {
            return event;
        }
    }
}

fn connected(sim: &SimTransport, channel: &Channel) {
    channel.request_connect().unwrap();
    quiesce(sim);
    assert_eq!(channel.connection_state(), ConnectionState::Connected);
}

#[test]
fn test_full_lifecycle_event_sequence() {
    let sim = sim_with(&[("TANK:LEVEL", Value::Double(3.2))]);
    let context = Context::new(sim.clone());
    let channel = context.open("TANK:LEVEL").unwrap();
    let events = channel.events();

    channel.request_connect().unwrap();
    quiesce(&sim);
    channel.request_subscribe().unwrap();
    quiesce(&sim);
    channel.request_disconnect().unwrap();
    channel.request_connect().unwrap();
    quiesce(&sim);

    assert_eq!(
        labels(&events),
        vec![
            "connected",
            "subscribed",
            "value",
            "disconnected",
            "connected",
            "subscribed",
            "value"
        ]
    );
    assert_eq!(channel.subscription_state(), SubscriptionState::Subscribed);
    assert_eq!(sim.channels_created(), 2);
    assert_eq!(sim.live_channels(), 1);
    assert_eq!(sim.live_subscriptions(), 1);
}

#[test]
fn test_repeated_connect_creates_one_channel() {
    let sim = sim_with(&[("A", Value::Long(1))]);
    let context = Context::new(sim.clone());
    let channel = context.open("A").unwrap();

    channel.request_connect().unwrap();
    channel.request_connect().unwrap();
    channel.request_connect().unwrap();
    quiesce(&sim);
    channel.request_connect().unwrap();

    assert_eq!(sim.channels_created(), 1);
    assert!(channel.is_connected());
    assert_eq!(channel.data_type(), pvlink::DataType::Long);
}

#[test]
fn test_subscribe_before_connect_is_deferred() {
    let sim = sim_with(&[("A", Value::Double(0.5))]);
    let context = Context::new(sim.clone());
    let channel = context.open("A").unwrap();

    channel.request_subscribe().unwrap();
    assert_eq!(sim.subscriptions_created(), 0);

    connected(&sim, &channel);

    assert_eq!(sim.subscriptions_created(), 1);
    assert_eq!(channel.subscription_state(), SubscriptionState::Subscribed);
    assert_eq!(channel.last_value().unwrap().value, Value::Double(0.5));
}

#[test]
fn test_connection_expires_once_then_retries() {
    let sim = sim_with(&[]);
    let config = ChannelConfig::default().with_connection_timeout(Duration::from_millis(50));
    let context = Context::with_config(sim.clone(), config).unwrap();
    let channel = context.open("GHOST").unwrap();
    let events = channel.events();

    channel.request_connect().unwrap();
    let event = wait_for(&events, |e| matches!(e, ChannelEvent::Failure(_)));
    assert_eq!(event, ChannelEvent::Failure(Error::ConnectionExpired));

    assert_eq!(sim.live_channels(), 0);
    let snap = channel.snapshot();
    assert_eq!(snap.connection.current, ConnectionState::Disconnected);
    assert_eq!(snap.connection.flags, pvlink::Flags::default());

    std::thread::sleep(Duration::from_millis(150));
    assert!(labels(&events).is_empty());

    sim.add_record("GHOST", Value::Long(9));
    connected(&sim, &channel);
    assert_eq!(sim.channels_created(), 2);

    std::thread::sleep(Duration::from_millis(150));
    assert!(channel.is_connected());
    assert_eq!(labels(&events), vec!["connected"]);
}

#[test]
fn test_cancel_pending_connect() {
    let sim = sim_with(&[]);
    let config = ChannelConfig::default().with_connection_timeout(Duration::from_millis(50));
    let context = Context::with_config(sim.clone(), config).unwrap();
    let channel = context.open("GHOST").unwrap();
    let events = channel.events();

    channel.request_connect().unwrap();
    assert_eq!(sim.live_channels(), 1);
    channel.request_disconnect().unwrap();
    assert_eq!(sim.live_channels(), 0);

    std::thread::sleep(Duration::from_millis(150));
    assert!(labels(&events).is_empty());
    assert_eq!(channel.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn test_write_rejected_while_pending() {
    let sim = sim_with(&[]);
    let context = Context::new(sim.clone());
    let channel = context.open("GHOST").unwrap();

    channel.request_connect().unwrap();
    let result = channel.request_write(Value::Double(1.0));

    assert_eq!(result, Err(Error::RequestRejected(Rejection::NotConnected)));
    assert_eq!(sim.writes_issued(), 0);
}

#[test]
fn test_read_rejected_while_in_flight() {
    let sim = sim_with(&[("A", Value::Long(5))]);
    let context = Context::new(sim.clone());
    let channel = context.open("A").unwrap();
    let events = channel.events();
    connected(&sim, &channel);
    let _ = labels(&events);

    sim.pause();
    channel.request_read().unwrap();
    assert_eq!(
        channel.request_read(),
        Err(Error::RequestRejected(Rejection::InFlight))
    );
    sim.resume();
    quiesce(&sim);

    assert_eq!(sim.reads_issued(), 1);
    assert_eq!(labels(&events), vec!["value"]);
    channel.request_read().unwrap();
    assert_eq!(sim.reads_issued(), 2);
}

#[test]
fn test_write_completes_and_updates_monitor() {
    let sim = sim_with(&[("SETPOINT", Value::Double(0.0))]);
    let context = Context::new(sim.clone());
    let channel = context.open("SETPOINT").unwrap();
    let events = channel.events();
    channel.request_subscribe().unwrap();
    connected(&sim, &channel);
    let _ = labels(&events);

    channel.request_write(Value::Double(7.5)).unwrap();
    quiesce(&sim);

    assert_eq!(labels(&events), vec!["write-complete", "value"]);
    assert_eq!(channel.last_value().unwrap().value, Value::Double(7.5));
    assert_eq!(sim.value_of("SETPOINT"), Some(Value::Double(7.5)));
}

#[test]
fn test_link_loss_resubscribes_on_same_handle() {
    let sim = sim_with(&[("A", Value::Long(1))]);
    let context = Context::new(sim.clone());
    let channel = context.open("A").unwrap();
    let events = channel.events();
    channel.request_subscribe().unwrap();
    connected(&sim, &channel);

    sim.set_online("A", false);
    quiesce(&sim);
    assert_eq!(channel.connection_state(), ConnectionState::Disconnected);
    assert_eq!(channel.subscription_state(), SubscriptionState::Unsubscribed);
    assert_eq!(sim.live_subscriptions(), 0);

    sim.set_online("A", true);
    quiesce(&sim);

    assert_eq!(
        labels(&events),
        vec![
            "connected",
            "subscribed",
            "value",
            "disconnected",
            "connected",
            "subscribed",
            "value"
        ]
    );
    assert_eq!(sim.channels_created(), 1);
    assert_eq!(sim.subscriptions_created(), 2);
}

#[test]
fn test_no_resubscribe_without_intent() {
    let sim = sim_with(&[("A", Value::Long(1))]);
    let context = Context::new(sim.clone());
    let channel = context.open("A").unwrap();
    channel.request_subscribe().unwrap();
    connected(&sim, &channel);
    channel.request_unsubscribe().unwrap();

    sim.set_online("A", false);
    quiesce(&sim);
    sim.set_online("A", true);
    quiesce(&sim);

    assert!(channel.is_connected());
    assert_eq!(channel.subscription_state(), SubscriptionState::Unsubscribed);
    assert_eq!(sim.subscriptions_created(), 1);
}

#[test]
fn test_connect_failure_then_fresh_request() {
    let sim = sim_with(&[]);
    let context = Context::new(sim.clone());
    let channel = context.open("GHOST").unwrap();
    let events = channel.events();

    channel.request_connect().unwrap();
    sim.fail_channel("GHOST", "no route to server");
    quiesce(&sim);

    let seen: Vec<ChannelEvent> = events.try_iter().collect();
    assert_eq!(seen[0], ChannelEvent::ConnectFailed);
    assert!(matches!(&seen[1], ChannelEvent::Failure(Error::RemoteFailure(m)) if m.contains("no route")));
    assert_eq!(channel.connection_state(), ConnectionState::ConnectFail);
    assert_eq!(sim.live_channels(), 0);

    sim.add_record("GHOST", Value::Long(0));
    connected(&sim, &channel);
    assert_eq!(sim.channels_created(), 2);
}

#[test]
fn test_disconnect_aborts_in_flight_read() {
    let sim = sim_with(&[("A", Value::Long(1))]);
    let context = Context::new(sim.clone());
    let channel = context.open("A").unwrap();
    let events = channel.events();
    connected(&sim, &channel);
    let _ = labels(&events);

    sim.pause();
    channel.request_read().unwrap();
    channel.request_disconnect().unwrap();
    sim.resume();
    quiesce(&sim);

    let seen: Vec<ChannelEvent> = events.try_iter().collect();
    assert_eq!(seen.len(), 2);
    assert!(matches!(&seen[0], ChannelEvent::Failure(Error::RemoteFailure(m)) if m.starts_with("read aborted")));
    assert_eq!(seen[1], ChannelEvent::Disconnected);
    assert!(!channel.snapshot().read.flags.active);
}

#[test]
fn test_aborted_read_completion_does_not_finish_next_read() {
    let sim = sim_with(&[("A", Value::Long(1))]);
    let transport = Arc::new(HeldReads::new(sim.clone()));
    let context = Context::new(transport.clone());
    let channel = context.open("A").unwrap();
    let events = channel.events();
    connected(&sim, &channel);
    let _ = labels(&events);

    // First read is still outstanding when the link drops and comes back.
    channel.request_read().unwrap();
    sim.set_online("A", false);
    quiesce(&sim);
    sim.set_online("A", true);
    quiesce(&sim);
    assert!(channel.is_connected());
    assert_eq!(labels(&events), vec!["failure", "disconnected", "connected"]);

    channel.request_read().unwrap();
    let mut held = transport.take();
    assert_eq!(held.len(), 2);
    let current = held.pop().unwrap();
    let aborted = held.pop().unwrap();

    aborted(Ok(ValueUpdate::new(Value::Long(99))));
    assert_eq!(channel.snapshot().read.current, ReadState::Reading);
    assert!(labels(&events).is_empty());

    current(Ok(ValueUpdate::new(Value::Long(2))));
    assert_eq!(channel.snapshot().read.current, ReadState::ReadIdle);
    match events.try_recv().unwrap() {
        ChannelEvent::Value(update) => assert_eq!(update.value, Value::Long(2)),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_subscription_failure_keeps_intent() {
    let sim = sim_with(&[("A", Value::Long(1))]);
    let context = Context::new(sim.clone());
    let channel = context.open("A").unwrap();
    let events = channel.events();
    channel.request_subscribe().unwrap();
    connected(&sim, &channel);
    let _ = labels(&events);

    sim.fail_subscriptions("A", "type mismatch");
    quiesce(&sim);

    assert_eq!(labels(&events), vec!["failure"]);
    let snap = channel.snapshot();
    assert_eq!(snap.subscription.current, SubscriptionState::Unsubscribed);
    assert_eq!(snap.subscription.requested, SubscriptionState::Subscribed);

    channel.request_subscribe().unwrap();
    quiesce(&sim);
    assert_eq!(sim.subscriptions_created(), 2);
    assert_eq!(channel.subscription_state(), SubscriptionState::Subscribed);
}

#[test]
fn test_rename_keeps_listeners_and_intents() {
    let sim = sim_with(&[("A", Value::Long(1)), ("B", Value::Text("open".into()))]);
    let context = Context::new(sim.clone());
    let mut channel = context.open("A").unwrap();
    let events = channel.events();
    channel.request_subscribe().unwrap();
    connected(&sim, &channel);
    let _ = labels(&events);

    channel.rename("B").unwrap();
    quiesce(&sim);

    assert_eq!(channel.name(), "B");
    assert_eq!(labels(&events), vec!["connected", "subscribed", "value"]);
    assert_eq!(channel.last_value().unwrap().value, Value::Text("open".into()));
    assert_eq!(sim.live_channels(), 1);
    assert_eq!(context.live_channels(), 1);
}

#[test]
fn test_rename_to_blank_keeps_binding() {
    let sim = sim_with(&[("A", Value::Long(1))]);
    let context = Context::new(sim.clone());
    let mut channel = context.open("A").unwrap();
    let events = channel.events();
    channel.request_subscribe().unwrap();
    connected(&sim, &channel);
    let _ = labels(&events);

    assert!(matches!(channel.rename("  "), Err(Error::InvalidName(_))));

    assert_eq!(channel.name(), "A");
    assert!(channel.is_connected());
    assert_eq!(channel.subscription_state(), SubscriptionState::Subscribed);
    sim.set_value("A", Value::Long(2));
    quiesce(&sim);
    assert_eq!(labels(&events), vec!["value"]);
    assert_eq!(sim.live_channels(), 1);
}

#[test]
fn test_context_init_and_shutdown_follow_channels() {
    let sim = sim_with(&[("A", Value::Long(1))]);
    let context = Context::new(sim.clone());
    assert!(!sim.context_active());

    let first = context.open("A").unwrap();
    let second = context.open("A").unwrap();
    assert!(sim.context_active());
    assert_eq!(context.live_channels(), 2);

    drop(first);
    assert!(sim.context_active());
    drop(second);
    assert!(!sim.context_active());
    assert_eq!(sim.context_inits(), 1);

    let third = context.open("A").unwrap();
    assert_eq!(sim.context_inits(), 2);
    drop(third);
}

#[test]
fn test_drop_releases_transport_resources() {
    let sim = sim_with(&[("A", Value::Long(1))]);
    let context = Context::new(sim.clone());
    let channel = context.open("A").unwrap();
    channel.request_subscribe().unwrap();
    connected(&sim, &channel);
    assert_eq!(sim.live_subscriptions(), 1);

    drop(channel);
    quiesce(&sim);

    assert_eq!(sim.live_channels(), 0);
    assert_eq!(sim.live_subscriptions(), 0);
    assert_eq!(context.live_channels(), 0);
}

#[test]
fn test_late_callbacks_after_drop_are_ignored() {
    let sim = sim_with(&[("A", Value::Long(1))]);
    let context = Context::new(sim.clone());
    let channel = context.open("A").unwrap();
    let events = channel.events();
    connected(&sim, &channel);
    let _ = labels(&events);

    sim.pause();
    channel.request_subscribe().unwrap();
    channel.request_read().unwrap();
    channel.request_write(Value::Long(2)).unwrap();
    sim.set_online("A", false);
    drop(channel);

    assert_eq!(context.live_channels(), 0);
    assert!(!sim.context_active());

    sim.resume();
    quiesce(&sim);

    assert_eq!(events.try_recv(), Err(TryRecvError::Disconnected));
    assert_eq!(sim.live_channels(), 0);
    assert_eq!(sim.live_subscriptions(), 0);
}

#[test]
fn test_programmatic_config_is_validated() {
    let sim = sim_with(&[("A", Value::Long(1))]);
    let zero_depth = ChannelConfig::default().with_event_queue_depth(0);
    let zero_timeout = ChannelConfig::default().with_connection_timeout(Duration::ZERO);

    assert!(matches!(
        Context::with_config(sim.clone(), zero_depth.clone()),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        Context::with_config(sim.clone(), zero_timeout.clone()),
        Err(Error::InvalidConfig(_))
    ));

    let context = Context::new(sim.clone());
    assert!(matches!(
        context.open_with_config("A", zero_depth),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        context.open_with_config("A", zero_timeout),
        Err(Error::InvalidConfig(_))
    ));
    assert_eq!(context.live_channels(), 0);
    assert!(!sim.context_active());
}

#[test]
fn test_enumeration_labels_cached_on_connect() {
    let sim = sim_with(&[("A", Value::Long(1))]);
    sim.add_enum_record("VALVE", 1, &["CLOSED", "OPEN"]);
    let context = Context::new(sim.clone());

    let valve = context.open("VALVE").unwrap();
    assert!(valve.enumerations().is_empty());
    connected(&sim, &valve);
    assert_eq!(valve.enumerations(), vec!["CLOSED", "OPEN"]);

    valve.request_read().unwrap();
    quiesce(&sim);
    let update = valve.last_value().unwrap();
    assert_eq!(valve.info().enum_label(&update.value), Some("OPEN"));

    let plain = context.open("A").unwrap();
    connected(&sim, &plain);
    assert!(plain.enumerations().is_empty());
}

#[test]
fn test_invalid_name_rejected() {
    let sim = sim_with(&[]);
    let context = Context::new(sim.clone());

    assert!(matches!(context.open("   "), Err(Error::InvalidName(_))));
    assert!(!sim.context_active());
}

#[test]
fn test_auto_connect() {
    let sim = sim_with(&[("A", Value::Long(1))]);
    let config = ChannelConfig::default().with_auto_connect(true);
    let context = Context::with_config(sim.clone(), config).unwrap();

    let channel = context.open("A").unwrap();
    quiesce(&sim);

    assert!(channel.is_connected());
}

#[test]
fn test_closure_callbacks() {
    let sim = sim_with(&[("A", Value::Double(2.0))]);
    let context = Context::new(sim.clone());
    let channel = context.open("A").unwrap();

    let states = Arc::new(Mutex::new(Vec::new()));
    let values = Arc::new(Mutex::new(Vec::new()));
    let state_sink = Arc::clone(&states);
    let value_sink = Arc::clone(&values);
    channel.on_connection_state_changed(move |s| state_sink.lock().unwrap().push(s));
    channel.on_value(move |u| value_sink.lock().unwrap().push(u.value.clone()));

    channel.request_subscribe().unwrap();
    connected(&sim, &channel);
    sim.set_value("A", Value::Double(3.0));
    quiesce(&sim);
    channel.request_disconnect().unwrap();

    assert_eq!(
        *states.lock().unwrap(),
        vec![ConnectionState::Connected, ConnectionState::Disconnected]
    );
    assert_eq!(
        *values.lock().unwrap(),
        vec![Value::Double(2.0), Value::Double(3.0)]
    );
}

#[test]
fn test_exception_does_not_disturb_channels() {
    let sim = sim_with(&[("A", Value::Long(1))]);
    let context = Context::new(sim.clone());
    let channel = context.open("A").unwrap();
    connected(&sim, &channel);

    sim.raise_exception("virtual circuit disconnect");
    quiesce(&sim);

    assert!(channel.is_connected());
}

/// Transport whose connection events carry no metadata.
struct NoMetadata(Arc<SimTransport>);

impl Transport for NoMetadata {
    fn init_context(&self, on_exception: ExceptionCallback) -> Result<(), TransportError> {
        self.0.init_context(on_exception)
    }

    fn shutdown_context(&self) {
        self.0.shutdown_context();
    }

    fn create_channel(
        &self,
        name: &str,
        on_connection: ConnectionCallback,
    ) -> Result<ChannelHandle, TransportError> {
        self.0.create_channel(
            name,
            Box::new(move |event| {
                on_connection(match event {
                    ConnectionEvent::Up(_) => ConnectionEvent::Up(ChannelInfo::default()),
                    other => other,
                })
            }),
        )
    }

    fn delete_channel(&self, handle: ChannelHandle) {
        self.0.delete_channel(handle);
    }

    fn create_subscription(
        &self,
        handle: ChannelHandle,
        on_value: ValueCallback,
    ) -> Result<SubscriptionId, TransportError> {
        self.0.create_subscription(handle, on_value)
    }

    fn cancel_subscription(&self, handle: ChannelHandle, id: SubscriptionId) {
        self.0.cancel_subscription(handle, id);
    }

    fn read(&self, handle: ChannelHandle, on_result: ReadCallback) -> Result<(), TransportError> {
        self.0.read(handle, on_result)
    }

    fn write(
        &self,
        handle: ChannelHandle,
        value: Value,
        on_result: WriteCallback,
    ) -> Result<(), TransportError> {
        self.0.write(handle, value, on_result)
    }
}

#[test]
fn test_write_refused_while_data_type_unknown() {
    let sim = sim_with(&[("A", Value::Long(1))]);
    let context = Context::new(Arc::new(NoMetadata(sim.clone())));
    let channel = context.open("A").unwrap();
    connected(&sim, &channel);

    let result = channel.request_write(Value::Long(2));

    assert!(matches!(result, Err(Error::SubmissionFailure(_))));
    assert_eq!(sim.writes_issued(), 0);
    assert!(!channel.snapshot().write.flags.active);
    // Reads do not depend on metadata.
    channel.request_read().unwrap();
}

/// Transport that holds every read completion for the test to release.
struct HeldReads {
    sim: Arc<SimTransport>,
    held: Mutex<Vec<ReadCallback>>,
}

impl HeldReads {
    fn new(sim: Arc<SimTransport>) -> Self {
        Self {
            sim,
            held: Mutex::new(Vec::new()),
        }
    }

    fn take(&self) -> Vec<ReadCallback> {
        std::mem::take(&mut *self.held.lock().unwrap())
    }
}

impl Transport for HeldReads {
    fn init_context(&self, on_exception: ExceptionCallback) -> Result<(), TransportError> {
        self.sim.init_context(on_exception)
    }

    fn shutdown_context(&self) {
        self.sim.shutdown_context();
    }

    fn create_channel(
        &self,
        name: &str,
        on_connection: ConnectionCallback,
    ) -> Result<ChannelHandle, TransportError> {
        self.sim.create_channel(name, on_connection)
    }

    fn delete_channel(&self, handle: ChannelHandle) {
        self.sim.delete_channel(handle);
    }

    fn create_subscription(
        &self,
        handle: ChannelHandle,
        on_value: ValueCallback,
    ) -> Result<SubscriptionId, TransportError> {
        self.sim.create_subscription(handle, on_value)
    }

    fn cancel_subscription(&self, handle: ChannelHandle, id: SubscriptionId) {
        self.sim.cancel_subscription(handle, id);
    }

    fn read(&self, _handle: ChannelHandle, on_result: ReadCallback) -> Result<(), TransportError> {
        self.held.lock().unwrap().push(on_result);
        Ok(())
    }

    fn write(
        &self,
        handle: ChannelHandle,
        value: Value,
        on_result: WriteCallback,
    ) -> Result<(), TransportError> {
        self.sim.write(handle, value, on_result)
    }
}
