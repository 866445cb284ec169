use async_trait::async_trait;

use crate::error::Result;
use crate::message::types::FindNearest;
use crate::message::types::GetStat;
use crate::message::types::Message;
use crate::message::types::PropagateNeighbors;
use crate::message::types::SetL;
use crate::message::types::SetR;
use crate::message::types::SetRAck;
use crate::message::types::SetRNak;
use crate::message::types::UnrefL;
use crate::message::HandleMsg;
use crate::message::MessageHandler;
use crate::message::MessagePayload;

#[async_trait]
impl HandleMsg<SetR> for MessageHandler {
    async fn handle(&self, ctx: &MessagePayload, msg: &SetR) -> Result<Option<Message>> {
        let act = self.node().ddll().on_set_r(&ctx.from, msg)?;
        self.node().execute(act).await?;
        Ok(None)
    }
}

#[async_trait]
impl HandleMsg<SetRAck> for MessageHandler {
    async fn handle(&self, _ctx: &MessagePayload, msg: &SetRAck) -> Result<Option<Message>> {
        let act = self.node().ddll().on_set_r_ack(msg)?;
        self.node().execute(act).await?;
        Ok(None)
    }
}

#[async_trait]
impl HandleMsg<SetRNak> for MessageHandler {
    async fn handle(&self, _ctx: &MessagePayload, msg: &SetRNak) -> Result<Option<Message>> {
        let act = self.node().ddll().on_set_r_nak(msg)?;
        self.node().execute(act).await?;
        Ok(None)
    }
}

#[async_trait]
impl HandleMsg<SetL> for MessageHandler {
    async fn handle(&self, _ctx: &MessagePayload, msg: &SetL) -> Result<Option<Message>> {
        let act = self.node().ddll().on_set_l(msg)?;
        self.node().execute(act).await?;
        Ok(None)
    }
}

#[async_trait]
impl HandleMsg<UnrefL> for MessageHandler {
    async fn handle(&self, _ctx: &MessagePayload, msg: &UnrefL) -> Result<Option<Message>> {
        let act = self.node().ddll().on_unref_l(msg)?;
        self.node().execute(act).await?;
        Ok(None)
    }
}

#[async_trait]
impl HandleMsg<PropagateNeighbors> for MessageHandler {
    async fn handle(
        &self,
        ctx: &MessagePayload,
        msg: &PropagateNeighbors,
    ) -> Result<Option<Message>> {
        let act = self.node().ddll().on_propagate_neighbors(&ctx.from, msg)?;
        self.node().execute(act).await?;
        Ok(None)
    }
}

#[async_trait]
impl HandleMsg<GetStat> for MessageHandler {
    async fn handle(&self, _ctx: &MessagePayload, _msg: &GetStat) -> Result<Option<Message>> {
        Ok(Some(Message::Stat(self.node().ddll().stat()?)))
    }
}

#[async_trait]
impl HandleMsg<FindNearest> for MessageHandler {
    async fn handle(&self, ctx: &MessagePayload, msg: &FindNearest) -> Result<Option<Message>> {
        tracing::trace!(
            "{} FindNearest #{} for {} from {}",
            ctx.to,
            msg.req_no,
            msg.search_key,
            ctx.from
        );
        Ok(Some(self.node().on_find_nearest(msg)?))
    }
}
