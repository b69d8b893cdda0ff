//! AMQP 0-9-1 Error Handling
//!
//! This module provides comprehensive error handling for the client. It
//! defines one error type covering transport failures, protocol violations,
//! handshake mismatches, and resource exhaustion, plus convenient
//! constructors for creating specific error instances.
//!
//! # Overview
//!
//! Every error surfaces through the connection's event queue. The
//! reconnection supervisor inspects [`AmqpError::is_permanent`] to decide
//! between retrying with backoff and terminating: authentication, protocol
//! version, and URI errors never resolve on their own and are not retried.
//!
//! # Examples
//!
//! ```rust
//! use warren_amqp::error::AmqpError;
//!
//! let err = AmqpError::frame("frame end marker missing");
//! assert!(!err.is_permanent());
//!
//! let err = AmqpError::BadServerVersion { major: 1, minor: 0 };
//! assert!(err.is_permanent());
//! ```

use thiserror::Error;

/// Client error type.
#[derive(Error, Debug)]
pub enum AmqpError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The inbound heartbeat grace period elapsed with no traffic.
    #[error("Heartbeat timeout: no inbound traffic for {grace_secs}s")]
    HeartbeatTimeout { grace_secs: u32 },

    #[error("Frame error: {0}")]
    Frame(String),

    /// The method registry has no entry for this id pair.
    #[error("Unknown method: class {class_id}, method {method_id}")]
    UnknownMethod { class_id: u16, method_id: u16 },

    #[error("Bad server version: {major}.{minor}, expected 0.9")]
    BadServerVersion { major: u8, minor: u8 },

    /// Synthesized when the transport ends before the handshake completed;
    /// AMQP gives no explicit signal for rejected credentials.
    #[error("Authentication failure: connection closed before ready")]
    AuthenticationFailure,

    /// The server sent Connection.Close.
    #[error("Server closed connection: {code} {message}")]
    ServerClose { code: u16, message: String },

    #[error("No channels available: channel-max exhausted")]
    NoChannelsAvailable,

    /// A channel-0 method arrived in a state that cannot accept it.
    #[error("Uncaught method: {0}")]
    UncaughtMethod(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

/// Result type for client operations.
pub type AmqpResult<T> = Result<T, AmqpError>;

impl AmqpError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        AmqpError::Transport(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        AmqpError::Timeout(msg.into())
    }

    /// Create a frame error
    pub fn frame(msg: impl Into<String>) -> Self {
        AmqpError::Frame(msg.into())
    }

    /// Create an invalid URI error
    pub fn invalid_uri(msg: impl Into<String>) -> Self {
        AmqpError::InvalidUri(msg.into())
    }

    /// Create an uncaught method error
    pub fn uncaught_method(msg: impl Into<String>) -> Self {
        AmqpError::UncaughtMethod(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        AmqpError::InvalidState(msg.into())
    }

    /// Create a not implemented error
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        AmqpError::NotImplemented(msg.into())
    }

    /// Whether retrying the connection could ever succeed.
    ///
    /// Permanent errors bypass the reconnection supervisor and terminate the
    /// connection immediately.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AmqpError::AuthenticationFailure
                | AmqpError::BadServerVersion { .. }
                | AmqpError::InvalidUri(_)
        )
    }

    /// Short machine-readable code for logging.
    pub fn error_code(&self) -> &str {
        match self {
            AmqpError::Transport(_) => "transport-error",
            AmqpError::Timeout(_) => "timeout-error",
            AmqpError::HeartbeatTimeout { .. } => "heartbeat-timeout",
            AmqpError::Frame(_) => "frame-error",
            AmqpError::UnknownMethod { .. } => "unknown-method",
            AmqpError::BadServerVersion { .. } => "bad-server-version",
            AmqpError::AuthenticationFailure => "authentication-failure",
            AmqpError::ServerClose { .. } => "server-close",
            AmqpError::NoChannelsAvailable => "no-channels-available",
            AmqpError::UncaughtMethod(_) => "uncaught-method",
            AmqpError::InvalidUri(_) => "invalid-uri",
            AmqpError::Io(_) => "io-error",
            AmqpError::Serialization(_) => "serialization-error",
            AmqpError::InvalidState(_) => "invalid-state-error",
            AmqpError::NotImplemented(_) => "not-implemented-error",
        }
    }
}
