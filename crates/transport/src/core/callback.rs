//! This module contains the [TransportCallback] trait.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::core::transport::Endpoint;

/// The error type a callback may return; it is reported back to a requester as text.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// The [TransportInterface](crate::core::transport::TransportInterface) will accept shared [TransportCallback] trait object.
pub type SharedTransportCallback = Arc<dyn TransportCallback>;

/// Any object that implements this trait can be bound to an endpoint.
#[async_trait]
pub trait TransportCallback: Send + Sync {
    /// This method is invoked when bytes arrive from `from`.
    /// A returned `Some` answers a request; it is ignored for one-way deliveries.
    async fn on_message(&self, from: &Endpoint, msg: &Bytes)
        -> Result<Option<Bytes>, CallbackError>;
}
