//! This module contains the [TransportInterface] trait and the [Endpoint] address type.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::core::callback::SharedTransportCallback;
use crate::error::Result;

/// The address of a process hosting ring nodes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint(String);

impl Endpoint {
    /// Create an endpoint from any address string.
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// The address as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Endpoint {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Frames put on the wire between endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransportMessage {
    /// Fire-and-forget delivery.
    Oneway(Bytes),
    /// Delivery expecting a reply frame.
    Request(Bytes),
    /// Reply to a [TransportMessage::Request].
    Reply(Bytes),
    /// The remote callback failed with the given reason.
    Failure(String),
}

/// Each transport implementation should implement this trait.
/// A transport is bound to exactly one local [Endpoint].
#[async_trait]
pub trait TransportInterface: Send + Sync {
    /// The local endpoint of this transport.
    fn endpoint(&self) -> &Endpoint;

    /// Bind the callback that receives inbound bytes for this endpoint.
    fn bind(&self, callback: SharedTransportCallback) -> Result<()>;

    /// Release the endpoint. Inbound traffic is dropped afterwards.
    fn unbind(&self);

    /// Deliver bytes without waiting for a reply.
    /// Success only means the bytes left this endpoint.
    async fn send(&self, to: &Endpoint, data: Bytes) -> Result<()>;

    /// Deliver bytes and wait for the reply, bounded by `timeout`.
    async fn request(&self, to: &Endpoint, data: Bytes, timeout: Duration) -> Result<Bytes>;
}
