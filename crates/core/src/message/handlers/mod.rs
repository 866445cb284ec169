#![warn(missing_docs)]
//! This module implemented message handler of ring nodes.

use std::sync::Arc;

use async_trait::async_trait;

use super::MessagePayload;
use crate::error::Result;
use crate::message::types::Message;
use crate::node::RingNode;

/// Handlers of DDLL ring messages
pub mod ddll;
/// Handlers of finger-table and lookup messages
pub mod suzaku;

/// MessageHandler dispatches inbound messages to one ring node.
#[derive(Clone)]
pub struct MessageHandler {
    node: Arc<RingNode>,
}

/// Generic trait for handle message ,inspired by Actor-Model.
/// A returned message answers a request; one-way deliveries drop it.
#[async_trait]
pub trait HandleMsg<T> {
    /// Message handler.
    async fn handle(&self, ctx: &MessagePayload, msg: &T) -> Result<Option<Message>>;
}

impl MessageHandler {
    /// Create a new MessageHandler instance.
    pub fn new(node: Arc<RingNode>) -> Self {
        Self { node }
    }

    /// The node messages are dispatched to.
    pub fn node(&self) -> &Arc<RingNode> {
        &self.node
    }

    /// Dispatch `payload` to the handler of its message type.
    pub async fn handle_payload(&self, payload: &MessagePayload) -> Result<Option<Message>> {
        tracing::trace!(
            "{} handles {:?} from {}",
            payload.to,
            payload.message,
            payload.from
        );
        match &payload.message {
            Message::SetR(msg) => self.handle(payload, msg).await,
            Message::SetRAck(msg) => self.handle(payload, msg).await,
            Message::SetRNak(msg) => self.handle(payload, msg).await,
            Message::SetL(msg) => self.handle(payload, msg).await,
            Message::UnrefL(msg) => self.handle(payload, msg).await,
            Message::PropagateNeighbors(msg) => self.handle(payload, msg).await,
            Message::GetStat(msg) => self.handle(payload, msg).await,
            Message::FindNearest(msg) => self.handle(payload, msg).await,
            Message::GetFTAllRequest(msg) => self.handle(payload, msg).await,
            Message::GetEntRequest(msg) => self.handle(payload, msg).await,
            Message::FTEntUpdateEvent(msg) => self.handle(payload, msg).await,
            Message::FTEntRemoveEvent(msg) => self.handle(payload, msg).await,
            Message::AddReversePointerEvent(msg) => self.handle(payload, msg).await,
            Message::RemoveReversePointerEvent(msg) => self.handle(payload, msg).await,
            Message::LookupRequest(msg) => self.handle(payload, msg).await,
            Message::LookupDone(msg) => self.handle(payload, msg).await,
            m => {
                tracing::warn!("{} drops unexpected message {:?}", payload.to, m);
                Ok(None)
            }
        }
    }
}
