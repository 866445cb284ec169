use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::DashSet;
use rand::distributions::Distribution;

use crate::callback::decode_reply;
use crate::callback::encode_frame;
use crate::callback::InnerTransportCallback;
use crate::core::callback::SharedTransportCallback;
use crate::core::transport::Endpoint;
use crate::core::transport::TransportInterface;
use crate::core::transport::TransportMessage;
use crate::error::Error;
use crate::error::Result;

/// An in-process network connecting [DummyTransport]s.
/// Each test or simulation creates its own network, so registries never leak between runs.
pub struct DummyNetwork {
    callbacks: DashMap<Endpoint, Arc<InnerTransportCallback>>,
    killed: DashSet<Endpoint>,
    /// Min and max delay in ms on one-way delivery.
    delay: Option<(u64, u64)>,
}

/// [DummyTransport] binds one endpoint to a [DummyNetwork].
pub struct DummyTransport {
    endpoint: Endpoint,
    network: Arc<DummyNetwork>,
}

impl DummyNetwork {
    /// A network delivering without delay.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            callbacks: DashMap::new(),
            killed: DashSet::new(),
            delay: None,
        })
    }

    /// A network delaying every one-way delivery by a random time in `[min_ms, max_ms)`.
    pub fn with_delay(min_ms: u64, max_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            callbacks: DashMap::new(),
            killed: DashSet::new(),
            delay: (max_ms > min_ms).then_some((min_ms, max_ms)),
        })
    }

    /// Create the transport of `endpoint`. It receives nothing until bound.
    pub fn transport(self: &Arc<Self>, endpoint: impl Into<Endpoint>) -> DummyTransport {
        DummyTransport {
            endpoint: endpoint.into(),
            network: self.clone(),
        }
    }

    /// Crash-stop `endpoint`: traffic to and from it is dropped, requests to it time out.
    pub fn kill(&self, endpoint: &Endpoint) {
        tracing::info!("Dummy network kills {}", endpoint);
        self.killed.insert(endpoint.clone());
    }

    /// Undo [DummyNetwork::kill].
    pub fn revive(&self, endpoint: &Endpoint) {
        self.killed.remove(endpoint);
    }

    /// Whether `endpoint` has not been killed.
    pub fn is_alive(&self, endpoint: &Endpoint) -> bool {
        !self.killed.contains(endpoint)
    }

    /// Endpoints currently bound to a live callback.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.callbacks
            .iter()
            .filter(|e| e.value().is_alive())
            .map(|e| e.key().clone())
            .collect()
    }

    fn callback(&self, endpoint: &Endpoint) -> Result<Arc<InnerTransportCallback>> {
        self.callbacks
            .get(endpoint)
            .map(|cb| cb.value().clone())
            .ok_or_else(|| Error::EndpointNotFound(endpoint.to_string()))
    }

    fn random_delay(&self) -> Option<Duration> {
        self.delay
            .map(|(low, high)| Duration::from_millis(random(low, high)))
    }
}

#[async_trait]
impl TransportInterface for DummyTransport {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn bind(&self, callback: SharedTransportCallback) -> Result<()> {
        if let Some(existed) = self.network.callbacks.get(&self.endpoint) {
            if existed.is_alive() {
                return Err(Error::EndpointAlreadyBound(self.endpoint.to_string()));
            }
        }
        self.network.callbacks.insert(
            self.endpoint.clone(),
            Arc::new(InnerTransportCallback::new(&self.endpoint, &callback)),
        );
        Ok(())
    }

    fn unbind(&self) {
        self.network.callbacks.remove(&self.endpoint);
    }

    async fn send(&self, to: &Endpoint, data: Bytes) -> Result<()> {
        if !self.network.is_alive(&self.endpoint) || !self.network.is_alive(to) {
            tracing::trace!("Dummy network drops {} -> {}", self.endpoint, to);
            return Ok(());
        }
        let callback = self.network.callback(to)?;
        let frame = encode_frame(&TransportMessage::Oneway(data))?;
        let delay = self.network.random_delay();
        let network = self.network.clone();
        let from = self.endpoint.clone();
        let to = to.clone();

        tokio::spawn(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            if !network.is_alive(&to) {
                return;
            }
            callback.on_frame(&from, &frame).await;
        });
        Ok(())
    }

    async fn request(&self, to: &Endpoint, data: Bytes, timeout: Duration) -> Result<Bytes> {
        if !self.network.is_alive(&self.endpoint) || !self.network.is_alive(to) {
            tokio::time::sleep(timeout).await;
            return Err(Error::RequestTimeout(to.to_string()));
        }
        let callback = self.network.callback(to)?;
        let frame = encode_frame(&TransportMessage::Request(data))?;
        let delay = self.network.random_delay();

        let exchange = async {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            callback.on_frame(&self.endpoint, &frame).await
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Some(reply)) => decode_reply(to, &reply),
            Ok(None) => Err(Error::EmptyReply(to.to_string())),
            Err(_) => Err(Error::RequestTimeout(to.to_string())),
        }
    }
}

fn random(low: u64, high: u64) -> u64 {
    let range = rand::distributions::Uniform::new(low, high);
    let mut rng = rand::thread_rng();
    range.sample(&mut rng)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::core::callback::CallbackError;
    use crate::core::callback::TransportCallback;

    struct Echo {
        received: AtomicUsize,
    }

    #[async_trait]
    impl TransportCallback for Echo {
        async fn on_message(
            &self,
            _from: &Endpoint,
            msg: &Bytes,
        ) -> std::result::Result<Option<Bytes>, CallbackError> {
            self.received.fetch_add(1, Ordering::SeqCst);
            if msg.as_ref() == b"boom" {
                return Err("boom requested".into());
            }
            Ok(Some(msg.clone()))
        }
    }

    fn echo() -> Arc<Echo> {
        Arc::new(Echo {
            received: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_request_reply() -> Result<()> {
        let network = DummyNetwork::new();
        let a = network.transport("a");
        let b = network.transport("b");
        let cb = echo();
        b.bind(cb.clone())?;

        let reply = a
            .request(b.endpoint(), Bytes::from_static(b"ping"), Duration::from_secs(1))
            .await?;
        assert_eq!(reply.as_ref(), b"ping");
        assert_eq!(cb.received.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_oneway_delivery() -> Result<()> {
        let network = DummyNetwork::with_delay(1, 10);
        let a = network.transport("a");
        let b = network.transport("b");
        let cb = echo();
        b.bind(cb.clone())?;

        for _ in 0..5 {
            a.send(b.endpoint(), Bytes::from_static(b"hello")).await?;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cb.received.load(Ordering::SeqCst), 5);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_killed_endpoint_times_out() -> Result<()> {
        let network = DummyNetwork::new();
        let a = network.transport("a");
        let b = network.transport("b");
        let cb = echo();
        b.bind(cb.clone())?;
        network.kill(b.endpoint());

        let result = a
            .request(b.endpoint(), Bytes::from_static(b"ping"), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(Error::RequestTimeout(_))));

        a.send(b.endpoint(), Bytes::from_static(b"lost")).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cb.received.load(Ordering::SeqCst), 0);

        network.revive(b.endpoint());
        a.request(b.endpoint(), Bytes::from_static(b"ping"), Duration::from_secs(1))
            .await?;
        assert_eq!(cb.received.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_endpoint_and_remote_failure() -> Result<()> {
        let network = DummyNetwork::new();
        let a = network.transport("a");
        let b = network.transport("b");
        let cb = echo();
        b.bind(cb.clone())?;

        let missing = a
            .request(&Endpoint::from("nowhere"), Bytes::new(), Duration::from_secs(1))
            .await;
        assert!(matches!(missing, Err(Error::EndpointNotFound(_))));

        let failed = a
            .request(b.endpoint(), Bytes::from_static(b"boom"), Duration::from_secs(1))
            .await;
        assert!(matches!(failed, Err(Error::RemoteHandler(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_bind_twice_and_release() -> Result<()> {
        let network = DummyNetwork::new();
        let b = network.transport("b");
        let cb = echo();
        b.bind(cb.clone())?;
        assert!(matches!(
            b.bind(echo()),
            Err(Error::EndpointAlreadyBound(_))
        ));

        drop(cb);
        assert!(network.endpoints().is_empty());
        b.bind(echo())?;
        Ok(())
    }
}
