//! Object requests. All of them act on the session's current stage.

use bytes::Bytes;
use stagehand_protocol::{
    Ack, AckHandle, DeleteObject, DuplicateObject, ObjectId, Position, PositionObject,
};

use crate::{StageSession, StagehandError};

/// Creates an object owned by the caller. The reply carries the new
/// object's identifier; everyone else in the stage is told to spawn it.
pub(super) async fn create(
    session: &StageSession,
    ack: AckHandle,
    position: Position,
) -> Result<(), StagehandError> {
    let char_id = session.char_id();
    let Some(stage) = session.current() else {
        tracing::warn!(%char_id, "create object outside any stage");
        return session.reply(Ack::simple_fail(ack)).await;
    };

    let object = match stage.create_object(char_id, position).await {
        Ok(object) => object,
        Err(err) => {
            tracing::warn!(%char_id, %err, "create object refused");
            return session.reply(Ack::simple_fail(ack)).await;
        }
    };
    tracing::debug!(%char_id, stage_id = %stage.id(), object_id = %object.id, "object created");

    let id_bytes = Bytes::copy_from_slice(&object.id.0.to_be_bytes());
    session.reply(Ack::buffer_success(ack, id_bytes)).await?;

    let spawn = DuplicateObject {
        object_id: object.id,
        position: object.position,
        owner: object.owner,
    };
    stage.broadcast(&spawn, Some(char_id)).await;
    Ok(())
}

pub(super) async fn position(session: &StageSession, object_id: ObjectId, position: Position) {
    let Some(stage) = session.current() else {
        return;
    };
    match stage.position_object(object_id, position).await {
        Ok(()) => {
            stage
                .broadcast(&PositionObject { object_id, position }, Some(session.char_id()))
                .await;
        }
        Err(err) => tracing::debug!(char_id = %session.char_id(), %err, "position object ignored"),
    }
}

pub(super) async fn delete(session: &StageSession, object_id: ObjectId) {
    let Some(stage) = session.current() else {
        return;
    };
    match stage.delete_object(object_id).await {
        Ok(_) => {
            stage
                .broadcast(&DeleteObject { object_id }, Some(session.char_id()))
                .await;
        }
        Err(err) => tracing::debug!(char_id = %session.char_id(), %err, "delete object ignored"),
    }
}
