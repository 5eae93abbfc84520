//! Broker client abstraction.
//!
//! The broker protocol itself is a black box: the bridge only needs
//! connect/subscribe/publish primitives plus a listener callback, the
//! same surface a STOMP client exposes. Real deployments wrap an actual
//! client behind [`BrokerClient`]; [`InMemoryBroker`] stands in for one
//! in tests and single-process runs.

mod in_memory;

pub use in_memory::{InMemoryBroker, PublishedFrame};

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// One raw message as delivered by the broker.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl Frame {
    pub fn new(headers: HashMap<String, String>, body: impl Into<String>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    /// The `destination` routing header, if present.
    pub fn destination(&self) -> Option<&str> {
        self.headers.get("destination").map(String::as_str)
    }

    /// The optional `update_type` header.
    pub fn update_type(&self) -> Option<&str> {
        self.headers.get("update_type").map(String::as_str)
    }
}

/// Login credentials for the broker handshake.
///
/// Endpoint selection (host, port) belongs to the concrete client's
/// constructor; only the handshake credentials cross this trait.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub login: String,
    pub passcode: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, passcode: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            passcode: passcode.into(),
        }
    }
}

/// Callbacks invoked by the broker client on its own I/O thread.
///
/// That thread is owned and scheduled by the client, not by the bridge,
/// so implementations must return quickly: anything that blocks here
/// blocks the client's I/O.
pub trait FrameHandler: Send + Sync {
    fn on_message(&self, frame: Frame);
    fn on_error(&self, frame: Frame);
}

/// Error type for broker operations.
#[derive(Debug)]
pub enum BrokerError {
    /// The handshake with the broker failed.
    ConnectionFailed(String),
    /// An operation was attempted before a successful connect.
    NotConnected,
    /// The broker rejected a subscription.
    SubscribeFailed(String),
    /// The broker rejected or failed a publish.
    PublishFailed(String),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::ConnectionFailed(msg) => write!(f, "connection failed: {}", msg),
            BrokerError::NotConnected => write!(f, "not connected to the broker"),
            BrokerError::SubscribeFailed(msg) => write!(f, "subscribe failed: {}", msg),
            BrokerError::PublishFailed(msg) => write!(f, "publish failed: {}", msg),
        }
    }
}

impl Error for BrokerError {}

/// Minimal client surface the bridge needs from a broker.
pub trait BrokerClient: Send + Sync {
    /// Perform the broker handshake.
    fn connect(&mut self, credentials: &Credentials) -> Result<(), BrokerError>;

    /// Subscribe to a destination; received frames flow to the installed
    /// listener.
    fn subscribe(&mut self, destination: &str) -> Result<(), BrokerError>;

    /// Publish a message, optionally requesting durable delivery.
    fn publish(
        &self,
        destination: &str,
        headers: &HashMap<String, String>,
        body: &str,
        durable: bool,
    ) -> Result<(), BrokerError>;

    /// Install the listener invoked on the client's I/O thread.
    fn set_listener(&mut self, listener: Arc<dyn FrameHandler>);
}
