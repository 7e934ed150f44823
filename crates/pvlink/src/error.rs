// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel error taxonomy.
//!
//! Two propagation paths exist:
//!
//! - **Synchronous**: [`Error::SubmissionFailure`], [`Error::RequestRejected`],
//!   [`Error::InvalidName`] and [`Error::InvalidConfig`] are returned from the
//!   call that triggered them. The state machine that produced them is left
//!   unchanged.
//! - **Asynchronous**: [`Error::ConnectionExpired`] and [`Error::RemoteFailure`]
//!   are delivered as [`ChannelEvent::Failure`](crate::ChannelEvent::Failure)
//!   through the same listeners that carry values and state changes.
//!
//! No error is fatal. A channel that saw any of them accepts a fresh request.

/// Why a request was refused by the current machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The connection machine has not confirmed `Connected`.
    NotConnected,
    /// An operation of the same kind is already outstanding.
    InFlight,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NotConnected => write!(f, "channel not connected"),
            Rejection::InFlight => write!(f, "request already in flight"),
        }
    }
}

/// Errors returned by channel operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The coordinator refused to submit the transport action.
    SubmissionFailure(String),
    /// A pending connection attempt timed out before confirmation.
    ConnectionExpired,
    /// The request is not allowed in the current state.
    RequestRejected(Rejection),
    /// The transport accepted the operation, then reported failure.
    RemoteFailure(String),
    /// Channel names must be non-empty.
    InvalidName(String),
    /// A programmatic configuration failed validation.
    InvalidConfig(String),
}

impl Error {
    /// True when the error was delivered through the notification path.
    pub fn is_async(&self) -> bool {
        matches!(self, Error::ConnectionExpired | Error::RemoteFailure(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::SubmissionFailure(msg) => write!(f, "Submission failed: {}", msg),
            Error::ConnectionExpired => write!(f, "Connection attempt expired"),
            Error::RequestRejected(why) => write!(f, "Request rejected: {}", why),
            Error::RemoteFailure(msg) => write!(f, "Remote failure: {}", msg),
            Error::InvalidName(name) => write!(f, "Invalid channel name: {:?}", name),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<crate::config::ConfigError> for Error {
    fn from(e: crate::config::ConfigError) -> Self {
        match e {
            crate::config::ConfigError::Invalid(msg) => Error::InvalidConfig(msg),
            other => Error::InvalidConfig(other.to_string()),
        }
    }
}

/// Convenient alias for channel results.
pub type Result<T> = core::result::Result<T, Error>;
