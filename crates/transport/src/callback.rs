//! This module contains the [InnerTransportCallback] struct.

use std::sync::Weak;

use bytes::Bytes;

use crate::core::callback::SharedTransportCallback;
use crate::core::callback::TransportCallback;
use crate::core::transport::Endpoint;
use crate::core::transport::TransportMessage;
use crate::error::Error;
use crate::error::Result;

/// [InnerTransportCallback] wraps the user callback of an endpoint and translates wire frames.
/// It keeps only a weak reference, so the owner of the callback controls its lifetime.
pub struct InnerTransportCallback {
    /// The endpoint to which the current callback is bound.
    pub endpoint: Endpoint,
    callback: Weak<dyn TransportCallback>,
}

impl InnerTransportCallback {
    /// Create a new [InnerTransportCallback].
    pub fn new(endpoint: &Endpoint, callback: &SharedTransportCallback) -> Self {
        Self {
            endpoint: endpoint.clone(),
            callback: std::sync::Arc::downgrade(callback),
        }
    }

    /// Whether the user callback is still alive.
    pub fn is_alive(&self) -> bool {
        self.callback.strong_count() > 0
    }

    /// This method is invoked on a frame arrival. Returns the encoded reply frame for requests.
    pub async fn on_frame(&self, from: &Endpoint, frame: &Bytes) -> Option<Bytes> {
        let Some(callback) = self.callback.upgrade() else {
            tracing::debug!("Endpoint {} released, frame from {} dropped", self.endpoint, from);
            return None;
        };

        match bincode::deserialize(frame) {
            Ok(TransportMessage::Oneway(data)) => {
                if let Err(e) = callback.on_message(from, &data).await {
                    tracing::error!("Callback on_message failed: {e:?}");
                }
                None
            }
            Ok(TransportMessage::Request(data)) => {
                let reply = match callback.on_message(from, &data).await {
                    Ok(Some(r)) => TransportMessage::Reply(r),
                    Ok(None) => TransportMessage::Failure("no reply produced".to_string()),
                    Err(e) => TransportMessage::Failure(e.to_string()),
                };
                match encode_frame(&reply) {
                    Ok(f) => Some(f),
                    Err(e) => {
                        tracing::error!("Encode reply frame failed: {e:?}");
                        None
                    }
                }
            }
            Ok(m) => {
                tracing::warn!("Unexpected frame at {}: {:?}", self.endpoint, m);
                None
            }
            Err(e) => {
                tracing::error!("Deserialize TransportMessage failed: {e:?}");
                None
            }
        }
    }
}

/// Encode a frame for the wire.
pub fn encode_frame(msg: &TransportMessage) -> Result<Bytes> {
    Ok(bincode::serialize(msg).map(Bytes::from)?)
}

/// Decode a reply frame into the reply bytes.
pub fn decode_reply(to: &Endpoint, frame: &Bytes) -> Result<Bytes> {
    match bincode::deserialize(frame)? {
        TransportMessage::Reply(data) => Ok(data),
        TransportMessage::Failure(reason) => Err(Error::RemoteHandler(reason)),
        _ => Err(Error::EmptyReply(to.to_string())),
    }
}
