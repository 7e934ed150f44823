// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! pvlink-probe - exercise one channel against simulated records
//!
//! # Usage
//!
//! ```bash
//! # Connect, subscribe and watch five updates
//! pvlink-probe TANK:LEVEL --subscribe --updates 5
//!
//! # Seed records, read once and write a setpoint
//! pvlink-probe SETPOINT --record SETPOINT=1.5 --read --write 4.25
//!
//! # Watch a connection attempt expire
//! pvlink-probe GHOST --offline --duration-ms 5000
//!
//! # Using a configuration file
//! pvlink-probe TANK:LEVEL --config channel.toml
//! ```

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use pvlink::transport::sim::SimTransport;
use pvlink::{Channel, ChannelConfig, ChannelEvent, Context, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Drive a pvlink channel and print everything it reports
#[derive(Parser, Debug)]
#[command(name = "pvlink-probe")]
#[command(about = "Drive a pvlink channel against simulated records")]
#[command(version)]
struct Args {
    /// Channel name
    channel: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed a simulated record (format: NAME=VALUE, can repeat)
    #[arg(short, long, value_parser = parse_record)]
    record: Vec<(String, Value)>,

    /// Leave the channel's record offline so the connection attempt expires
    #[arg(long)]
    offline: bool,

    /// Subscribe to value updates
    #[arg(short, long)]
    subscribe: bool,

    /// Issue one read once connected
    #[arg(long)]
    read: bool,

    /// Write this value once connected
    #[arg(short, long)]
    write: Option<String>,

    /// Number of simulated value updates to publish
    #[arg(short, long, default_value = "0")]
    updates: u32,

    /// How long to watch events (milliseconds)
    #[arg(short, long, default_value = "2000")]
    duration_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "channel.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn parse_record(s: &str) -> Result<(String, Value), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty record name in {:?}", s));
    }
    let value = value.trim().parse::<Value>().map_err(|e| e.to_string())?;
    Ok((name.to_string(), value))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    run(&args)
}

fn cmd_gen_config(output: PathBuf) -> anyhow::Result<()> {
    let example = ChannelConfig::default();
    let content = toml::to_string_pretty(&example).context("serializing example config")?;
    std::fs::write(&output, content)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("Wrote example configuration to {}", output.display());
    Ok(())
}

fn cmd_validate(config: PathBuf) -> anyhow::Result<()> {
    let parsed = ChannelConfig::from_file(&config)
        .with_context(|| format!("loading {}", config.display()))?;
    println!("Configuration is valid:");
    println!("  connection_timeout_ms = {}", parsed.connection_timeout_ms);
    println!("  auto_connect          = {}", parsed.auto_connect);
    println!("  event_queue_depth     = {}", parsed.event_queue_depth);
    Ok(())
}

fn run(args: &Args) -> anyhow::Result<()> {
    let Some(name) = args.channel.as_deref() else {
        bail!("missing channel name (see --help)");
    };

    let config = match args.config {
        Some(ref path) => ChannelConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ChannelConfig::default(),
    };

    let sim = Arc::new(SimTransport::new().context("starting simulated transport")?);
    for (record, value) in &args.record {
        sim.add_record(record, value.clone());
    }
    let seeded = args.record.iter().any(|(record, _)| record == name);
    if !args.offline && !seeded {
        sim.add_record(name, Value::Double(0.0));
    }

    let write_value = match args.write {
        Some(ref raw) => Some(raw.parse::<Value>()?),
        None => None,
    };

    let context = Context::with_config(sim.clone(), config.clone())?;
    let channel = context.open(name)?;
    let events = channel.events();

    println!("pvlink-probe v{}", env!("CARGO_PKG_VERSION"));
    println!("Channel: {}", name);
    println!(
        "Timeout: {} ms, auto-connect: {}",
        config.connection_timeout_ms, config.auto_connect
    );
    println!();

    if args.subscribe {
        channel.request_subscribe()?;
    }
    channel.request_connect()?;

    let publisher = (args.updates > 0).then(|| {
        let sim = Arc::clone(&sim);
        let record = name.to_string();
        let updates = args.updates;
        thread::spawn(move || {
            for i in 1..=updates {
                thread::sleep(Duration::from_millis(100));
                sim.set_value(&record, Value::Double(f64::from(i)));
            }
        })
    });

    let deadline = Instant::now() + Duration::from_millis(args.duration_ms);
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        let Ok(event) = events.recv_timeout(remaining) else {
            break;
        };
        print_event(&channel, &event);
        if let ChannelEvent::Connected(_) = event {
            on_connected(&channel, args.read, write_value.as_ref());
        }
    }

    if let Some(handle) = publisher {
        let _ = handle.join();
    }

    let snapshot = channel.snapshot();
    println!();
    println!("Final state:");
    println!(
        "  connection   {:?} (requested {:?})",
        snapshot.connection.current, snapshot.connection.requested
    );
    println!(
        "  subscription {:?} (requested {:?})",
        snapshot.subscription.current, snapshot.subscription.requested
    );
    println!("  read         {:?}", snapshot.read.current);
    println!("  write        {:?}", snapshot.write.current);
    if let Some(update) = channel.last_value() {
        println!("  last value   {}", update.value);
    }
    Ok(())
}

fn on_connected(channel: &Channel, read: bool, write: Option<&Value>) {
    if read {
        if let Err(e) = channel.request_read() {
            tracing::warn!("read request refused: {}", e);
        }
    }
    if let Some(value) = write {
        if let Err(e) = channel.request_write(value.clone()) {
            tracing::warn!("write request refused: {}", e);
        }
    }
}

fn print_event(channel: &Channel, event: &ChannelEvent) {
    match event {
        ChannelEvent::Connected(info) => println!(
            "[{}] connected: {:?} x{} on {}",
            channel.name(),
            info.data_type,
            info.element_count,
            info.host.as_deref().unwrap_or("?")
        ),
        ChannelEvent::Disconnected => println!("[{}] disconnected", channel.name()),
        ChannelEvent::ConnectFailed => println!("[{}] connection failed", channel.name()),
        ChannelEvent::Subscribed => println!("[{}] subscribed", channel.name()),
        ChannelEvent::Value(update) => {
            let units = update.units.as_deref().unwrap_or("");
            let shown = channel
                .info()
                .enum_label(&update.value)
                .map_or_else(|| update.value.to_string(), str::to_string);
            if update.is_alarmed() {
                println!(
                    "[{}] value: {} {} ({:?})",
                    channel.name(),
                    shown,
                    units,
                    update.severity
                );
            } else {
                println!("[{}] value: {} {}", channel.name(), shown, units);
            }
        }
        ChannelEvent::WriteComplete => println!("[{}] write complete", channel.name()),
        ChannelEvent::Failure(e) => println!("[{}] failure: {}", channel.name(), e),
    }
}
