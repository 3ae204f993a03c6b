//! Request handlers.
//!
//! [`dispatch`] routes one decoded request to its handler. Handlers answer
//! expected failures (missing stage, full stage, wrong password, store
//! errors) in-band with a failure or internal-error acknowledgment and
//! return `Ok`. An `Err` from `dispatch` means the connection can't go on:
//! its outbound queue is closed or the peer broke the protocol.

mod binary;
mod house;
mod object;
mod stage;
mod user;

use stagehand_protocol::{ProtocolError, Request};
use stagehand_store::CharacterStore;

use crate::{ServerContext, StageSession, StagehandError};

/// Handles one request on behalf of `session`.
///
/// Requests from one connection are handled one at a time, in order; a
/// `WaitStageBinary` holds up the requests behind it until it is answered
/// or the connection goes away.
pub async fn dispatch<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &mut StageSession,
    request: Request,
) -> Result<(), StagehandError> {
    tracing::trace!(char_id = %session.char_id(), ?request, "dispatch");
    match request {
        Request::Login { .. } => Err(ProtocolError::InvalidMessage(
            "login on an established session".into(),
        )
        .into()),

        Request::CreateStage { ack, stage_id, capacity } => {
            stage::create(ctx, session, ack, stage_id, capacity).await
        }
        Request::EnterStage { ack, stage_id } => session.enter(ctx, ack, stage_id).await,
        Request::MoveStage { ack, stage_id } => session.move_to(ctx, ack, stage_id).await,
        Request::BackStage { ack } => session.back(ctx, ack).await,
        Request::LeaveStage => {
            tracing::debug!(char_id = %session.char_id(), "leave stage ignored");
            Ok(())
        }
        Request::LockStage { ack } => stage::lock(session, ack).await,
        Request::UnlockStage => {
            session.unlock(ctx).await;
            Ok(())
        }
        Request::ReserveStage { ack, stage_id, ready } => {
            session.reserve(ctx, ack, stage_id, ready).await
        }
        Request::UnreserveStage => {
            session.unreserve(ctx).await;
            Ok(())
        }
        Request::SetStagePass { password } => {
            session.set_stage_pass(password).await;
            Ok(())
        }
        Request::EnumerateStage { ack, prefix } => {
            stage::enumerate(ctx, session, ack, &prefix).await
        }

        Request::SetStageBinary { stage_id, key, data } => {
            binary::set(ctx, session, stage_id, key, data).await;
            Ok(())
        }
        Request::GetStageBinary { ack, stage_id, key } => {
            binary::get(ctx, session, ack, stage_id, key).await
        }
        Request::WaitStageBinary { ack, stage_id, key } => {
            binary::wait(ctx, session, ack, stage_id, key).await
        }

        Request::CreateObject { ack, position } => object::create(session, ack, position).await,
        Request::PositionObject { object_id, position } => {
            object::position(session, object_id, position).await;
            Ok(())
        }
        Request::DeleteObject { object_id } => {
            object::delete(session, object_id).await;
            Ok(())
        }

        Request::SetUserBinary { kind, data } => {
            user::set(ctx, session, kind, data).await;
            Ok(())
        }
        Request::GetUserBinary { ack, char_id, kind } => {
            user::get(ctx, session, ack, char_id, kind).await
        }

        Request::LoadHouse { ack, char_id } => house::load_house(ctx, session, ack, char_id).await,
        Request::UpdateInterior { ack, data } => {
            house::update_interior(ctx, session, ack, data).await
        }
        Request::GetMyhouseInfo { ack } => house::get_myhouse_info(ctx, session, ack).await,
        Request::UpdateMyhouseInfo { ack, data } => {
            house::update_myhouse_info(ctx, session, ack, data).await
        }
        Request::LoadDecoMyset { ack } => house::load_deco_myset(ctx, session, ack).await,
        Request::SaveDecoMyset { ack, data } => {
            house::save_deco_myset(ctx, session, ack, data).await
        }
        Request::EnumerateHouse { ack } => house::enumerate_house(ctx, session, ack).await,
        Request::EnumerateTitle { ack } => house::enumerate_title(ctx, session, ack).await,

        Request::AddAchievement { achievement_id, unk1, unk2 } => {
            tracing::info!(
                char_id = %session.char_id(),
                achievement_id,
                unk1,
                unk2,
                "achievement earned"
            );
            Ok(())
        }
    }
}
