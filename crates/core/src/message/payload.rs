#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use suzaku_transport::Endpoint;
use suzaku_transport::TransportInterface;

use super::Message;
use crate::error::Error;
use crate::error::Result;
use crate::ring::Link;

/// `MessagePayload` is used to transmit a [Message] between ring nodes.
/// Several nodes may share one endpoint, so both ends are full [Link]s.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MessagePayload {
    /// The sending node.
    pub from: Link,
    /// The addressed node.
    pub to: Link,
    /// Payload data
    pub message: Message,
}

impl MessagePayload {
    /// Create new `MessagePayload`.
    pub fn new(from: Link, to: Link, message: Message) -> Self {
        Self { from, to, message }
    }

    /// A payload answering `self`, sent back from the addressed node.
    pub fn reply(&self, message: Message) -> Self {
        Self::new(self.to.clone(), self.from.clone(), message)
    }

    /// Deserializes a `MessagePayload` instance from the given binary data.
    pub fn from_bincode(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(Error::BincodeDeserialize)
    }

    /// Serializes the `MessagePayload` instance into binary data.
    pub fn to_bincode(&self) -> Result<Bytes> {
        bincode::serialize(self)
            .map(Bytes::from)
            .map_err(Error::BincodeSerialize)
    }
}

/// Trait of PayloadSender
#[async_trait]
pub trait PayloadSender: Send + Sync {
    /// The local endpoint payloads leave from.
    fn endpoint(&self) -> &Endpoint;

    /// Send a payload to `payload.to` without waiting for a reply.
    async fn do_send_payload(&self, payload: MessagePayload) -> Result<()>;

    /// Send a payload to `payload.to` and wait for the reply payload.
    async fn do_request_payload(
        &self,
        payload: MessagePayload,
        timeout: Duration,
    ) -> Result<MessagePayload>;

    /// Send a one-way message from `from` to `to`.
    async fn send_message(&self, from: &Link, to: &Link, msg: Message) -> Result<()> {
        self.do_send_payload(MessagePayload::new(from.clone(), to.clone(), msg))
            .await
    }

    /// Send a request from `from` to `to`. A [Message::Failure] reply becomes [Error::RemoteFailure].
    async fn request(
        &self,
        from: &Link,
        to: &Link,
        msg: Message,
        timeout: Duration,
    ) -> Result<Message> {
        let reply = self
            .do_request_payload(MessagePayload::new(from.clone(), to.clone(), msg), timeout)
            .await?;
        match reply.message {
            Message::Failure(f) => Err(Error::RemoteFailure(f.reason)),
            m => Ok(m),
        }
    }
}

/// [PayloadSender] over a bound transport.
#[derive(Clone)]
pub struct Courier {
    transport: Arc<dyn TransportInterface>,
}

impl Courier {
    /// Wrap a transport.
    pub fn new(transport: Arc<dyn TransportInterface>) -> Self {
        Self { transport }
    }

    /// The wrapped transport.
    pub fn transport(&self) -> &Arc<dyn TransportInterface> {
        &self.transport
    }
}

#[async_trait]
impl PayloadSender for Courier {
    fn endpoint(&self) -> &Endpoint {
        self.transport.endpoint()
    }

    async fn do_send_payload(&self, payload: MessagePayload) -> Result<()> {
        tracing::trace!(
            "send {} -> {}: {:?}",
            payload.from,
            payload.to,
            payload.message
        );
        let data = payload.to_bincode()?;
        self.transport.send(&payload.to.endpoint, data).await?;
        Ok(())
    }

    async fn do_request_payload(
        &self,
        payload: MessagePayload,
        timeout: Duration,
    ) -> Result<MessagePayload> {
        tracing::trace!(
            "request {} -> {}: {:?}",
            payload.from,
            payload.to,
            payload.message
        );
        let data = payload.to_bincode()?;
        let reply = self
            .transport
            .request(&payload.to.endpoint, data, timeout)
            .await?;
        MessagePayload::from_bincode(&reply)
    }
}

#[cfg(test)]
mod tests {
    use suzaku_transport::connections::DummyNetwork;
    use suzaku_transport::core::callback::CallbackError;
    use suzaku_transport::TransportCallback;

    use super::*;
    use crate::message::GetStat;
    use crate::ring::RingKey;
    use crate::ring::UniqueId;

    struct Refuser;

    #[async_trait]
    impl TransportCallback for Refuser {
        async fn on_message(
            &self,
            _from: &Endpoint,
            msg: &Bytes,
        ) -> std::result::Result<Option<Bytes>, CallbackError> {
            let payload = MessagePayload::from_bincode(msg)?;
            let reply = payload.reply(Message::failure(format!("no node {}", payload.to.key)));
            Ok(Some(reply.to_bincode()?))
        }
    }

    fn link(ep: &str, v: i64) -> Link {
        Link::new(Endpoint::new(ep), RingKey::with_uid(v, UniqueId::new(1)))
    }

    #[tokio::test]
    async fn test_failure_reply_becomes_error() {
        let network = DummyNetwork::new();
        let remote = Arc::new(network.transport("b"));
        let callback: Arc<dyn TransportCallback> = Arc::new(Refuser);
        remote.bind(callback.clone()).unwrap();

        let courier = Courier::new(Arc::new(network.transport("a")));
        let res = courier
            .request(
                &link("a", 1),
                &link("b", 2),
                Message::GetStat(GetStat { req_no: 1 }),
                Duration::from_secs(1),
            )
            .await;

        match res {
            Err(Error::RemoteFailure(reason)) => assert!(reason.starts_with("no node 2")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reply_swaps_ends() {
        let payload = MessagePayload::new(
            link("a", 1),
            link("b", 2),
            Message::GetStat(GetStat { req_no: 3 }),
        );
        let reply = payload.reply(Message::failure("x"));
        assert_eq!(reply.from, payload.to);
        assert_eq!(reply.to, payload.from);
    }
}
