#![warn(missing_docs)]
//! Hosting ring nodes on one endpoint.
//!
//! A [NodeManager] binds itself as the callback of a transport, decodes every inbound
//! [MessagePayload] and hands it to the [MessageHandler] of the addressed node.
//! Heartbeats (`GetStatMulti`) are answered by the manager for all of its nodes at once.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use suzaku_transport::core::callback::CallbackError;
use suzaku_transport::Endpoint;
use suzaku_transport::SharedScheduler;
use suzaku_transport::SharedTransportCallback;
use suzaku_transport::TransportCallback;
use suzaku_transport::TransportInterface;

use crate::config::NodeConfig;
use crate::error::Error;
use crate::error::Result;
use crate::message::Courier;
use crate::message::GetStatMulti;
use crate::message::Message;
use crate::message::MessageHandler;
use crate::message::MessagePayload;
use crate::message::PayloadSender;
use crate::message::SetStatMulti;
use crate::monitor::NodeMonitor;
use crate::node::RingNode;
use crate::ring::Link;
use crate::ring::RingKey;

/// Ring nodes sharing one endpoint.
pub struct NodeManager {
    transport: Arc<dyn TransportInterface>,
    sender: Arc<dyn PayloadSender>,
    scheduler: SharedScheduler,
    config: NodeConfig,
    monitor: Arc<NodeMonitor>,
    nodes: DashMap<RingKey, Arc<RingNode>>,
}

impl NodeManager {
    /// Create a manager and bind it to `transport`. The transport keeps only a weak
    /// reference; dropping the manager releases the endpoint.
    pub fn new(
        transport: Arc<dyn TransportInterface>,
        scheduler: SharedScheduler,
        config: NodeConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let sender: Arc<dyn PayloadSender> = Arc::new(Courier::new(transport.clone()));
        let monitor = NodeMonitor::new(
            sender.clone(),
            scheduler.clone(),
            config.ddll.ping_period(),
        );
        let manager = Arc::new(Self {
            transport,
            sender,
            scheduler,
            config,
            monitor,
            nodes: DashMap::new(),
        });
        let callback: SharedTransportCallback = manager.clone();
        manager.transport.bind(callback)?;
        Ok(manager)
    }

    /// The endpoint of this manager.
    pub fn endpoint(&self) -> &Endpoint {
        self.transport.endpoint()
    }

    /// The shared settings of hosted nodes.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The failure detector shared by hosted nodes.
    pub fn monitor(&self) -> &Arc<NodeMonitor> {
        &self.monitor
    }

    /// Create a node for `key` in mode `Out`.
    pub fn create_node(&self, key: RingKey) -> Result<Arc<RingNode>> {
        if self.nodes.contains_key(&key) {
            return Err(Error::KeyAlreadyExists(key));
        }
        let me = Link::new(self.endpoint().clone(), key.clone());
        let node = RingNode::new(
            me,
            self.sender.clone(),
            self.scheduler.clone(),
            self.config.clone(),
            self.monitor.clone(),
        );
        self.nodes.insert(key, node.clone());
        Ok(node)
    }

    /// The node hosting `key`.
    pub fn node(&self, key: &RingKey) -> Option<Arc<RingNode>> {
        self.nodes.get(key).map(|n| n.value().clone())
    }

    /// Every hosted node.
    pub fn nodes(&self) -> Vec<Arc<RingNode>> {
        self.nodes.iter().map(|n| n.value().clone()).collect()
    }

    /// Stop hosting `key`; its timers are cancelled.
    pub fn remove_node(&self, key: &RingKey) -> Result<Arc<RingNode>> {
        let (_, node) = self
            .nodes
            .remove(key)
            .ok_or_else(|| Error::NoSuchKey(key.clone()))?;
        node.shutdown()?;
        Ok(node)
    }

    /// Cancel every timer and release the endpoint.
    pub fn shutdown(&self) {
        for node in self.nodes() {
            if let Err(e) = node.shutdown() {
                tracing::error!("Shutdown of {} failed: {e:?}", node.me());
            }
        }
        self.monitor.shutdown();
        self.transport.unbind();
    }

    fn stat_multi(&self, req: &GetStatMulti) -> SetStatMulti {
        let stats = req
            .keys
            .iter()
            .map(|k| self.node(k).and_then(|n| n.ddll().stat().ok()))
            .map(|s| s.filter(|s| s.mode.is_linked()))
            .collect();
        SetStatMulti { stats }
    }

    /// Handle one inbound payload; returns the reply message, if any.
    pub async fn dispatch(&self, payload: &MessagePayload) -> Option<Message> {
        if let Message::GetStatMulti(req) = &payload.message {
            return Some(Message::SetStatMulti(self.stat_multi(req)));
        }
        let Some(node) = self.node(&payload.to.key) else {
            tracing::debug!("{} has no node {}", self.endpoint(), payload.to.key);
            return Some(Message::failure(format!(
                "no node {} at {}",
                payload.to.key,
                self.endpoint()
            )));
        };
        match MessageHandler::new(node).handle_payload(payload).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("{} failed to handle {:?}: {e:?}", payload.to, payload.message);
                Some(Message::failure(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl TransportCallback for NodeManager {
    async fn on_message(
        &self,
        _from: &Endpoint,
        msg: &Bytes,
    ) -> std::result::Result<Option<Bytes>, CallbackError> {
        let payload = MessagePayload::from_bincode(msg)?;
        match self.dispatch(&payload).await {
            Some(reply) => Ok(Some(payload.reply(reply).to_bincode()?)),
            None => Ok(None),
        }
    }
}
