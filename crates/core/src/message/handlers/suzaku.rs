use async_trait::async_trait;

use crate::ddll::DdllAction;
use crate::error::Result;
use crate::message::types::AddReversePointerEvent;
use crate::message::types::FTEntRemoveEvent;
use crate::message::types::FTEntUpdateEvent;
use crate::message::types::GetEntRequest;
use crate::message::types::GetFTAllRequest;
use crate::message::types::LookupAck;
use crate::message::types::LookupDone;
use crate::message::types::LookupRequest;
use crate::message::types::Message;
use crate::message::types::RemoveReversePointerEvent;
use crate::message::HandleMsg;
use crate::message::MessageHandler;
use crate::message::MessagePayload;
use crate::message::PayloadSender;

#[async_trait]
impl HandleMsg<GetFTAllRequest> for MessageHandler {
    async fn handle(&self, _ctx: &MessagePayload, _msg: &GetFTAllRequest) -> Result<Option<Message>> {
        let reply = self.node().suzaku().on_get_ft_all()?;
        Ok(Some(Message::GetFTAllReply(reply)))
    }
}

#[async_trait]
impl HandleMsg<GetEntRequest> for MessageHandler {
    async fn handle(&self, ctx: &MessagePayload, msg: &GetEntRequest) -> Result<Option<Message>> {
        if !self.node().ddll().mode()?.is_member() {
            return Ok(Some(Message::failure("not in the ring")));
        }
        let reply = self.node().suzaku().on_get_ent(&ctx.from, msg).await?;
        Ok(Some(Message::GetEntReply(reply)))
    }
}

#[async_trait]
impl HandleMsg<FTEntUpdateEvent> for MessageHandler {
    async fn handle(&self, _ctx: &MessagePayload, msg: &FTEntUpdateEvent) -> Result<Option<Message>> {
        self.node().suzaku().on_ft_ent_update(msg)?;
        Ok(None)
    }
}

#[async_trait]
impl HandleMsg<FTEntRemoveEvent> for MessageHandler {
    async fn handle(&self, _ctx: &MessagePayload, msg: &FTEntRemoveEvent) -> Result<Option<Message>> {
        self.node().suzaku().on_ft_ent_remove(msg).await?;
        if self.node().ddll().left()?.as_ref() == Some(&msg.removed) {
            self.node().execute(DdllAction::Fix).await?;
        }
        Ok(None)
    }
}

#[async_trait]
impl HandleMsg<AddReversePointerEvent> for MessageHandler {
    async fn handle(
        &self,
        ctx: &MessagePayload,
        _msg: &AddReversePointerEvent,
    ) -> Result<Option<Message>> {
        self.node().suzaku().on_add_reverse_pointer(&ctx.from)?;
        Ok(None)
    }
}

#[async_trait]
impl HandleMsg<RemoveReversePointerEvent> for MessageHandler {
    async fn handle(
        &self,
        ctx: &MessagePayload,
        _msg: &RemoveReversePointerEvent,
    ) -> Result<Option<Message>> {
        self.node().suzaku().on_remove_reverse_pointer(&ctx.from)?;
        Ok(None)
    }
}

#[async_trait]
impl HandleMsg<LookupRequest> for MessageHandler {
    async fn handle(&self, ctx: &MessagePayload, msg: &LookupRequest) -> Result<Option<Message>> {
        let node = self.node().clone();
        if !node.ddll().mode()?.is_member() {
            return Ok(Some(Message::failure("not in the ring")));
        }
        if msg.fill {
            let entry = node.suzaku().fill_entry()?;
            let ev = Message::FTEntUpdateEvent(FTEntUpdateEvent { entry });
            if let Err(e) = node.sender().send_message(node.me(), &ctx.from, ev).await {
                tracing::debug!("Fill reply to {} failed: {e:?}", ctx.from);
            }
        }

        let req = msg.clone();
        tokio::spawn(async move {
            if let Err(e) = node.route(req).await {
                tracing::warn!("{} failed to route lookup: {e:?}", node.me());
            }
        });
        Ok(Some(Message::LookupAck(LookupAck {})))
    }
}

#[async_trait]
impl HandleMsg<LookupDone> for MessageHandler {
    async fn handle(&self, _ctx: &MessagePayload, msg: &LookupDone) -> Result<Option<Message>> {
        self.node().on_lookup_done(msg);
        Ok(None)
    }
}
