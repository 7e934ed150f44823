// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client context registry.
//!
//! A [`Context`] wraps one transport and counts the channels using it. The
//! transport's process-wide client context is brought up when the first
//! channel is opened and shut down when the last channel (and every callback
//! that still references it) is gone.

use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::coordinator::ChannelCore;
use crate::error::{Error, Result};
use crate::listener::ChannelListener;
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::Arc;

struct ContextInner {
    transport: Arc<dyn Transport>,
    config: ChannelConfig,
    users: Mutex<usize>,
}

/// Factory for channels sharing one transport.
///
/// Cheap to clone; clones share the same user count.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::build(transport, ChannelConfig::default())
    }

    /// Context whose channels default to `config`. The configuration goes
    /// through the same checks as one loaded from a file.
    pub fn with_config(transport: Arc<dyn Transport>, config: ChannelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(transport, config))
    }

    fn build(transport: Arc<dyn Transport>, config: ChannelConfig) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                transport,
                config,
                users: Mutex::new(0),
            }),
        }
    }

    /// Open a channel with the context's default configuration.
    pub fn open(&self, name: &str) -> Result<Channel> {
        self.open_with_config(name, self.inner.config.clone())
    }

    /// Open a channel. With `auto_connect` set, the connection is requested
    /// before this returns.
    pub fn open_with_config(&self, name: &str, config: ChannelConfig) -> Result<Channel> {
        config.validate()?;
        self.open_with_listeners(name, config, Vec::new())
    }

    pub(crate) fn open_with_listeners(
        &self,
        name: &str,
        config: ChannelConfig,
        listeners: Vec<Arc<dyn ChannelListener>>,
    ) -> Result<Channel> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidName(name.to_string()));
        }

        let lease = self.acquire()?;
        let auto_connect = config.auto_connect;
        let core = ChannelCore::new(
            name.to_string(),
            config,
            Arc::clone(&self.inner.transport),
            lease,
            listeners,
        );
        let channel = Channel::new(core, self.clone());
        log::debug!("[context] opened {}", name);

        if auto_connect {
            channel.request_connect()?;
        }
        Ok(channel)
    }

    /// Channels (and in-flight callbacks) currently holding the context.
    pub fn live_channels(&self) -> usize {
        *self.inner.users.lock()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    fn acquire(&self) -> Result<ContextLease> {
        let mut users = self.inner.users.lock();
        if *users == 0 {
            self.inner
                .transport
                .init_context(Box::new(|e| {
                    log::error!("[context] transport exception: {}", e);
                }))
                .map_err(|e| Error::SubmissionFailure(format!("client context: {}", e)))?;
            log::debug!("[context] client context initialised");
        }
        *users += 1;
        Ok(ContextLease {
            inner: Arc::clone(&self.inner),
        })
    }
}

/// One channel's claim on the client context.
pub(crate) struct ContextLease {
    inner: Arc<ContextInner>,
}

impl Drop for ContextLease {
    fn drop(&mut self) {
        let mut users = self.inner.users.lock();
        *users = users.saturating_sub(1);
        if *users == 0 {
            self.inner.transport.shutdown_context();
            log::debug!("[context] client context shut down");
        }
    }
}
