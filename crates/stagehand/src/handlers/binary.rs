//! Stage binary publish, fetch, and wait.

use bytes::Bytes;
use stagehand_protocol::{Ack, AckHandle, BinaryKey, StageId};
use stagehand_stage::StageError;
use stagehand_store::CharacterStore;

use crate::{ServerContext, StageSession, StagehandError};

pub(super) async fn set<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &StageSession,
    stage_id: StageId,
    key: BinaryKey,
    data: Bytes,
) {
    match ctx.registry().find(&stage_id).await {
        Some(stage) => stage.set_binary(key, data).await,
        None => {
            tracing::warn!(char_id = %session.char_id(), %stage_id, %key, "binary for missing stage dropped");
        }
    }
}

/// Answers with the published binary. A key nobody published yet gets an
/// empty buffer, which the client treats as "nothing configured".
pub(super) async fn get<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &StageSession,
    ack: AckHandle,
    stage_id: StageId,
    key: BinaryKey,
) -> Result<(), StagehandError> {
    let Some(stage) = ctx.registry().find(&stage_id).await else {
        tracing::warn!(char_id = %session.char_id(), %stage_id, "get binary for missing stage");
        return session.reply(Ack::simple_fail(ack)).await;
    };
    let data = match stage.get_binary(key).await {
        Ok(data) => data,
        Err(err) => {
            tracing::warn!(char_id = %session.char_id(), %err, "sending blank stage binary");
            Bytes::new()
        }
    };
    session.reply(Ack::buffer_success(ack, data)).await
}

/// Blocks this connection's request loop until the binary is published.
///
/// A disconnect cancels the wait; nothing is sent in that case.
pub(super) async fn wait<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &StageSession,
    ack: AckHandle,
    stage_id: StageId,
    key: BinaryKey,
) -> Result<(), StagehandError> {
    let Some(stage) = ctx.registry().find(&stage_id).await else {
        tracing::warn!(char_id = %session.char_id(), %stage_id, "wait binary for missing stage");
        return session.reply(Ack::simple_fail(ack)).await;
    };
    match stage.wait_binary(key, session.handle().cancel_token()).await {
        Ok(data) => session.reply(Ack::buffer_success(ack, data)).await,
        Err(StageError::Cancelled) => {
            tracing::debug!(char_id = %session.char_id(), %stage_id, %key, "binary wait cancelled");
            Ok(())
        }
        Err(err) => {
            tracing::warn!(char_id = %session.char_id(), %err, "binary wait failed");
            session.reply(Ack::simple_fail(ack)).await
        }
    }
}
