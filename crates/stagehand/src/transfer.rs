//! The per-connection stage state machine.
//!
//! A connection is either unattached or inside exactly one stage, and may
//! additionally hold a reservation in one stage (usually a quest it is
//! about to start). [`StageSession`] owns those references and performs
//! every transition:
//!
//! ```text
//! Unattached ──enter/move──▶ InStage(a) ──enter/move/back──▶ InStage(b)
//!                                 │
//!                              depart
//!                                 ▼
//!                             Unattached
//! ```
//!
//! A transfer always runs in this order: leave the current stage, join
//! the target, send `CleanupObject`, introduce peers (hub entry only),
//! acknowledge, replay live objects. The client relies on the cleanup
//! arriving before the acknowledgment and the replay after it.

use std::sync::Arc;

use stagehand_protocol::{
    Ack, AckHandle, Batch, CharId, CleanupObject, DeleteUser, DuplicateObject, InsertUser,
    NotifyUserBinary, StageDestruct, StageId,
};
use stagehand_session::{FIRST_USER_BINARY, LAST_USER_BINARY, MoveStack, SessionHandle, broadcast};
use stagehand_stage::{Reservation, Stage};
use stagehand_store::CharacterStore;

use crate::{ServerContext, StagehandError};

/// Stage-related state of one logged-in connection.
#[derive(Debug)]
pub struct StageSession {
    handle: Arc<SessionHandle>,
    current: Option<Arc<Stage>>,
    reservation: Option<Arc<Stage>>,
    /// Stage holding this character's reservation slot. Outlives
    /// `reservation`, which entering a stage forgets while the slot stays.
    slot: Option<Arc<Stage>>,
    staged_password: Option<String>,
    move_stack: MoveStack,
}

impl StageSession {
    /// Creates an unattached session.
    pub fn new(handle: Arc<SessionHandle>) -> Self {
        Self {
            handle,
            current: None,
            reservation: None,
            slot: None,
            staged_password: None,
            move_stack: MoveStack::new(),
        }
    }

    pub fn handle(&self) -> &Arc<SessionHandle> {
        &self.handle
    }

    pub fn char_id(&self) -> CharId {
        self.handle.char_id()
    }

    /// The stage this session is inside, if any.
    pub fn current(&self) -> Option<&Arc<Stage>> {
        self.current.as_ref()
    }

    /// Identifier of the current stage, if any.
    pub fn current_id(&self) -> Option<&StageId> {
        self.current.as_ref().map(|stage| stage.id())
    }

    /// The stage this session holds a reservation in, if any.
    pub fn reservation(&self) -> Option<&Arc<Stage>> {
        self.reservation.as_ref()
    }

    pub fn move_stack(&self) -> &MoveStack {
        &self.move_stack
    }

    /// Queues an acknowledgment for this session's own request.
    pub async fn reply(&self, ack: Ack) -> Result<(), StagehandError> {
        self.handle.send_packet(&ack).await?;
        Ok(())
    }

    // -- Navigation -------------------------------------------------------

    /// Enters `target`, remembering the current stage for `back`.
    ///
    /// Entering the hub also sends the mover an introduction of every
    /// other character whose user binaries are complete. Those characters
    /// are *not* told about the mover here; they learn of it when its
    /// binaries complete.
    pub async fn enter<S: CharacterStore>(
        &mut self,
        ctx: &ServerContext<S>,
        ack: AckHandle,
        target: StageId,
    ) -> Result<(), StagehandError> {
        self.push_current();
        self.reservation = None;
        let introduce = ctx.registry().config().is_hub(&target);
        self.transfer(ctx, ack, target, introduce).await
    }

    /// Moves to `target`, remembering the current stage for `back`.
    ///
    /// Unlike `enter`, the held reservation is kept, so a host that moved
    /// into its reserved quest can still unlock it.
    pub async fn move_to<S: CharacterStore>(
        &mut self,
        ctx: &ServerContext<S>,
        ack: AckHandle,
        target: StageId,
    ) -> Result<(), StagehandError> {
        self.push_current();
        self.transfer(ctx, ack, target, false).await
    }

    /// Returns to the stage before the last enter or move.
    ///
    /// An empty history is answered with a failure acknowledgment and
    /// leaves the session where it is.
    pub async fn back<S: CharacterStore>(
        &mut self,
        ctx: &ServerContext<S>,
        ack: AckHandle,
    ) -> Result<(), StagehandError> {
        let target = match self.move_stack.pop() {
            Ok(target) => target,
            Err(err) => {
                tracing::debug!(char_id = %self.char_id(), %err, "back stage refused");
                return self.reply(Ack::simple_fail(ack)).await;
            }
        };
        self.transfer(ctx, ack, target, false).await
    }

    fn push_current(&mut self) {
        if let Some(current) = &self.current {
            self.move_stack.push(current.id().clone());
        }
    }

    async fn transfer<S: CharacterStore>(
        &mut self,
        ctx: &ServerContext<S>,
        ack: AckHandle,
        target: StageId,
        introduce: bool,
    ) -> Result<(), StagehandError> {
        let char_id = self.char_id();

        // Re-entering the current stage keeps the membership (and the
        // objects) instead of leaving first.
        if let Some(previous) = self.current.take() {
            if previous.id() != &target {
                previous.leave(char_id, ctx.registry()).await;
            }
        }

        let stage = ctx
            .registry()
            .join_or_create(&target, Arc::clone(&self.handle))
            .await;
        self.current = Some(Arc::clone(&stage));
        tracing::debug!(%char_id, stage_id = %target, "stage transfer");

        self.handle.send_packet(&CleanupObject).await?;
        if introduce {
            self.introduce_peers(ctx).await?;
        }
        self.reply(Ack::simple_success(ack)).await?;
        self.replay_objects(&stage).await
    }

    async fn introduce_peers<S: CharacterStore>(
        &self,
        ctx: &ServerContext<S>,
    ) -> Result<(), StagehandError> {
        let peers = ctx.directory().ready_peers(self.char_id()).await;
        let client = self.handle.context();

        let mut batch = Batch::new();
        for peer in &peers {
            let char_id = peer.char_id();
            batch.push(&InsertUser { char_id }, client);
            for kind in FIRST_USER_BINARY..=LAST_USER_BINARY {
                batch.push(&NotifyUserBinary { char_id, kind }, client);
            }
        }
        if let Some(frame) = batch.finish() {
            self.handle.send(frame).await?;
        }
        Ok(())
    }

    async fn replay_objects(&self, stage: &Stage) -> Result<(), StagehandError> {
        let client = self.handle.context();
        let mut batch = Batch::new();
        for object in stage.objects().await {
            let packet = DuplicateObject {
                object_id: object.id,
                position: object.position,
                owner: object.owner,
            };
            batch.push(&packet, client);
        }
        if let Some(frame) = batch.finish() {
            self.handle.send(frame).await?;
        }
        Ok(())
    }

    // -- Reservations -----------------------------------------------------

    /// Reserves a slot in `stage_id` (or updates the ready flag of the slot
    /// already held there) using the staged password.
    pub async fn reserve<S: CharacterStore>(
        &mut self,
        ctx: &ServerContext<S>,
        ack: AckHandle,
        stage_id: StageId,
        ready: u8,
    ) -> Result<(), StagehandError> {
        let char_id = self.char_id();
        let stage = match ctx.registry().get(&stage_id).await {
            Ok(stage) => stage,
            Err(err) => {
                tracing::warn!(%char_id, %err, "reserve failed");
                return self.reply(Ack::simple_fail(ack)).await;
            }
        };

        match stage
            .reserve(char_id, self.staged_password.as_deref(), ready)
            .await
        {
            Ok(Reservation::Created) => {
                tracing::debug!(%char_id, %stage_id, "reservation created");
                self.hold(ctx, stage).await;
                self.reply(Ack::simple_success(ack)).await
            }
            Ok(Reservation::Updated { ready }) => {
                tracing::debug!(%char_id, %stage_id, ready, "reservation updated");
                self.hold(ctx, stage).await;
                self.reply(Ack::simple_success(ack)).await
            }
            Err(err) => {
                tracing::debug!(%char_id, %err, "reserve refused");
                self.reply(Ack::simple_fail(ack)).await
            }
        }
    }

    /// Records `stage` as the held reservation, releasing a slot held in
    /// any other stage.
    async fn hold<S: CharacterStore>(&mut self, ctx: &ServerContext<S>, stage: Arc<Stage>) {
        self.reservation = Some(Arc::clone(&stage));
        if let Some(previous) = self.slot.replace(Arc::clone(&stage)) {
            if !Arc::ptr_eq(&previous, &stage) {
                self.release(ctx, &previous).await;
            }
        }
    }

    /// Gives up the held reservation, if any.
    pub async fn unreserve<S: CharacterStore>(&mut self, ctx: &ServerContext<S>) {
        if let Some(stage) = self.reservation.take() {
            self.forget_slot(&stage);
            self.release(ctx, &stage).await;
        }
    }

    fn forget_slot(&mut self, stage: &Arc<Stage>) {
        if self.slot.as_ref().is_some_and(|slot| Arc::ptr_eq(slot, stage)) {
            self.slot = None;
        }
    }

    async fn release<S: CharacterStore>(&self, ctx: &ServerContext<S>, stage: &Stage) {
        if stage.unreserve(self.char_id()).await {
            tracing::debug!(char_id = %self.char_id(), stage_id = %stage.id(), "reservation released");
            ctx.registry().remove_if_vacant(stage.id()).await;
        }
    }

    /// Sets the password of the reserved stage if this session holds a
    /// reservation there; otherwise stages it for the next `reserve`.
    pub async fn set_stage_pass(&mut self, password: String) {
        match &self.reservation {
            Some(stage) => {
                if let Err(err) = stage.set_password(self.char_id(), &password).await {
                    tracing::debug!(char_id = %self.char_id(), %err, "stage password unchanged");
                }
            }
            None => self.staged_password = (!password.is_empty()).then_some(password),
        }
    }

    /// Tears down the reserved stage: everyone holding a slot there who
    /// has not joined yet is told it is gone, then it is removed from the
    /// registry whoever is inside.
    pub async fn unlock<S: CharacterStore>(&mut self, ctx: &ServerContext<S>) {
        let Some(stage) = self.reservation.take() else {
            tracing::debug!(char_id = %self.char_id(), "unlock without a reservation");
            return;
        };
        self.forget_slot(&stage);

        let mut recipients = Vec::new();
        for char_id in stage.reserved_chars().await {
            if stage.is_member(char_id).await {
                continue;
            }
            if let Some(session) = ctx.directory().find(char_id).await {
                recipients.push(session);
            }
        }
        let notified = broadcast::fan_out(&recipients, &StageDestruct, None);
        ctx.registry().remove(stage.id()).await;
        tracing::info!(char_id = %self.char_id(), stage_id = %stage.id(), notified, "stage unlocked");
    }

    // -- Departure --------------------------------------------------------

    /// Cleans up after a disconnect.
    ///
    /// Cancels any wait the session is blocked in, leaves the current
    /// stage, releases the held reservation, and removes the character from
    /// the directory and the user binary table. Characters that had been
    /// announced are withdrawn from everyone's roster.
    pub async fn depart<S: CharacterStore>(&mut self, ctx: &ServerContext<S>) {
        let char_id = self.char_id();
        self.handle.disconnect();

        if let Some(stage) = self.current.take() {
            stage.leave(char_id, ctx.registry()).await;
        }
        self.unreserve(ctx).await;
        if let Some(stage) = self.slot.take() {
            self.release(ctx, &stage).await;
        }

        if ctx
            .directory()
            .unregister(char_id, self.handle.id())
            .await
            .is_some()
        {
            if self.handle.is_binaries_done() {
                ctx.directory().broadcast(&DeleteUser { char_id }, Some(char_id)).await;
            }
            ctx.user_binaries().remove_character(char_id).await;
        }
        tracing::info!(%char_id, session_id = %self.handle.id(), "session departed");
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use stagehand_protocol::{ClientContext, Opcode, Position};
    use stagehand_session::{SessionConfig, SessionId};
    use stagehand_store::InMemoryStore;
    use tokio::sync::mpsc;

    use super::*;
    use crate::ServerConfig;

    const A: &str = "sl1Ns100p0a0u0";
    const B: &str = "sl1Ns101p0a0u0";
    const C: &str = "sl1Ns102p0a0u0";
    const HUB: &str = "sl1Ns200p0a0u0";
    const QUEST: &str = "sl1Qs001p0a0u0";

    fn context() -> ServerContext<InMemoryStore> {
        ServerContext::new(ServerConfig::default(), InMemoryStore::new())
    }

    async fn connect(
        ctx: &ServerContext<InMemoryStore>,
        id: u32,
    ) -> (StageSession, mpsc::Receiver<Bytes>) {
        let (handle, rx) = SessionHandle::channel(
            SessionId(u64::from(id)),
            CharId(id),
            ClientContext::default(),
            &SessionConfig::default(),
        );
        ctx.directory().register(Arc::clone(&handle)).await.unwrap();
        (StageSession::new(handle), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Bytes>) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn opcode(frame: &Bytes) -> u16 {
        u16::from_be_bytes([frame[0], frame[1]])
    }

    /// Status byte of an acknowledgment frame.
    fn ack_status(frame: &Bytes) -> u8 {
        assert_eq!(opcode(frame), Opcode::Ack.value());
        frame[7]
    }

    #[tokio::test]
    async fn test_enter_sends_cleanup_before_ack() {
        let ctx = context();
        let (mut me, mut rx) = connect(&ctx, 1).await;

        me.enter(&ctx, AckHandle(1), StageId::new(A)).await.unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        assert_eq!(opcode(&frames[0]), Opcode::CleanupObject.value());
        assert_eq!(ack_status(&frames[1]), 0);
        assert_eq!(me.current_id(), Some(&StageId::new(A)));
        assert!(me.move_stack().is_empty(), "nothing to push from unattached");
    }

    #[tokio::test]
    async fn test_back_after_two_moves_third_back_fails() {
        let ctx = context();
        let (mut me, mut rx) = connect(&ctx, 1).await;
        me.enter(&ctx, AckHandle(1), StageId::new(A)).await.unwrap();
        me.move_to(&ctx, AckHandle(2), StageId::new(B)).await.unwrap();
        me.move_to(&ctx, AckHandle(3), StageId::new(C)).await.unwrap();
        drain(&mut rx);

        me.back(&ctx, AckHandle(4)).await.unwrap();
        assert_eq!(me.current_id(), Some(&StageId::new(B)));

        me.back(&ctx, AckHandle(5)).await.unwrap();
        assert_eq!(me.current_id(), Some(&StageId::new(A)));
        drain(&mut rx);

        me.back(&ctx, AckHandle(6)).await.unwrap();
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(ack_status(&frames[0]), 1);
        assert_eq!(me.current_id(), Some(&StageId::new(A)));
    }

    #[tokio::test]
    async fn test_transfer_moves_membership() {
        let ctx = context();
        let (mut me, _rx) = connect(&ctx, 1).await;
        me.enter(&ctx, AckHandle(1), StageId::new(A)).await.unwrap();
        me.move_to(&ctx, AckHandle(2), StageId::new(B)).await.unwrap();

        let a = ctx.registry().get(&StageId::new(A)).await.unwrap();
        let b = ctx.registry().get(&StageId::new(B)).await.unwrap();
        assert!(!a.is_member(CharId(1)).await);
        assert!(b.is_member(CharId(1)).await);
    }

    #[tokio::test]
    async fn test_enter_same_stage_keeps_objects() {
        let ctx = context();
        let (mut me, _rx) = connect(&ctx, 1).await;
        me.enter(&ctx, AckHandle(1), StageId::new(QUEST)).await.unwrap();
        let stage = Arc::clone(me.current().unwrap());
        stage.create_object(CharId(1), Position::default()).await.unwrap();

        me.enter(&ctx, AckHandle(2), StageId::new(QUEST)).await.unwrap();

        assert!(Arc::ptr_eq(me.current().unwrap(), &stage));
        assert_eq!(stage.objects().await.len(), 1);
    }

    #[tokio::test]
    async fn test_enter_hub_introduces_ready_peers_only_to_mover() {
        let ctx = context();
        let (ready, mut ready_rx) = connect(&ctx, 2).await;
        let (_pending, _pending_rx) = connect(&ctx, 3).await;
        ready.handle().mark_binaries_done();
        let (mut me, mut rx) = connect(&ctx, 1).await;

        me.enter(&ctx, AckHandle(1), StageId::new(HUB)).await.unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 3);
        assert_eq!(opcode(&frames[0]), Opcode::CleanupObject.value());
        let intro = &frames[1];
        assert_eq!(opcode(intro), Opcode::InsertUser.value());
        assert_eq!(&intro[2..6], &2u32.to_be_bytes());
        // InsertUser + three NotifyUserBinary + End.
        assert_eq!(intro.len(), 6 + 3 * 7 + 2);
        assert_eq!(&intro[intro.len() - 2..], &[0x00, 0x10]);
        assert_eq!(ack_status(&frames[2]), 0);

        assert!(ready_rx.try_recv().is_err(), "peers are not told about the mover");
    }

    #[tokio::test]
    async fn test_move_to_hub_skips_introduction() {
        let ctx = context();
        let (ready, _ready_rx) = connect(&ctx, 2).await;
        ready.handle().mark_binaries_done();
        let (mut me, mut rx) = connect(&ctx, 1).await;

        me.move_to(&ctx, AckHandle(1), StageId::new(HUB)).await.unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        assert_eq!(opcode(&frames[0]), Opcode::CleanupObject.value());
    }

    #[tokio::test]
    async fn test_enter_replays_live_objects_after_ack() {
        let ctx = context();
        let (mut owner, _owner_rx) = connect(&ctx, 2).await;
        owner.enter(&ctx, AckHandle(1), StageId::new(A)).await.unwrap();
        let stage = Arc::clone(owner.current().unwrap());
        let object = stage
            .create_object(CharId(2), Position::new(1.0, 2.0, 3.0))
            .await
            .unwrap();
        let (mut me, mut rx) = connect(&ctx, 1).await;

        me.enter(&ctx, AckHandle(2), StageId::new(A)).await.unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 3);
        assert_eq!(ack_status(&frames[1]), 0);
        let replay = &frames[2];
        assert_eq!(opcode(replay), Opcode::DuplicateObject.value());
        assert_eq!(&replay[2..6], &object.id.0.to_be_bytes());
        assert_eq!(&replay[replay.len() - 2..], &[0x00, 0x10]);
    }

    #[tokio::test]
    async fn test_move_out_of_quest_removes_empty_quest() {
        let ctx = context();
        let (mut me, _rx) = connect(&ctx, 1).await;
        me.enter(&ctx, AckHandle(1), StageId::new(QUEST)).await.unwrap();

        me.move_to(&ctx, AckHandle(2), StageId::new(HUB)).await.unwrap();

        assert!(ctx.registry().find(&StageId::new(QUEST)).await.is_none());
        assert!(ctx.registry().find(&StageId::new(HUB)).await.is_some());
    }

    #[tokio::test]
    async fn test_reserve_missing_stage_fails() {
        let ctx = context();
        let (mut me, mut rx) = connect(&ctx, 1).await;

        me.reserve(&ctx, AckHandle(1), StageId::new(QUEST), 0).await.unwrap();

        assert_eq!(ack_status(&drain(&mut rx)[0]), 1);
        assert!(me.reservation().is_none());
    }

    #[tokio::test]
    async fn test_reserve_uses_staged_password() {
        let ctx = context();
        let quest = StageId::new(QUEST);
        ctx.registry().create(&quest, 4).await.unwrap();
        let (mut host, mut host_rx) = connect(&ctx, 1).await;
        host.reserve(&ctx, AckHandle(1), quest.clone(), 0).await.unwrap();
        host.set_stage_pass("secret".into()).await;
        assert_eq!(ack_status(&drain(&mut host_rx)[0]), 0);

        let (mut guest, mut guest_rx) = connect(&ctx, 2).await;
        guest.set_stage_pass("guess".into()).await;
        guest.reserve(&ctx, AckHandle(2), quest.clone(), 0).await.unwrap();
        assert_eq!(ack_status(&drain(&mut guest_rx)[0]), 1);
        assert!(guest.reservation().is_none());

        guest.set_stage_pass("secret".into()).await;
        guest.reserve(&ctx, AckHandle(3), quest.clone(), 0).await.unwrap();
        assert_eq!(ack_status(&drain(&mut guest_rx)[0]), 0);

        let stage = ctx.registry().get(&quest).await.unwrap();
        assert_eq!(stage.reserved_chars().await.len(), 2);
    }

    #[tokio::test]
    async fn test_reserve_elsewhere_releases_previous_slot() {
        let ctx = context();
        let first = StageId::new("sl1Qs001p0a0u0");
        let second = StageId::new("sl1Qs002p0a0u0");
        ctx.registry().create(&first, 4).await.unwrap();
        ctx.registry().create(&second, 4).await.unwrap();
        let (mut me, _rx) = connect(&ctx, 1).await;

        me.reserve(&ctx, AckHandle(1), first.clone(), 0).await.unwrap();
        me.reserve(&ctx, AckHandle(2), second.clone(), 0).await.unwrap();

        assert!(ctx.registry().find(&first).await.is_none(), "vacated quest is collected");
        assert_eq!(me.reservation().unwrap().id(), &second);
    }

    #[tokio::test]
    async fn test_unreserve_collects_vacant_stage() {
        let ctx = context();
        let quest = StageId::new(QUEST);
        ctx.registry().create(&quest, 4).await.unwrap();
        let (mut me, _rx) = connect(&ctx, 1).await;
        me.reserve(&ctx, AckHandle(1), quest.clone(), 0).await.unwrap();

        me.unreserve(&ctx).await;

        assert!(me.reservation().is_none());
        assert!(ctx.registry().find(&quest).await.is_none());
    }

    #[tokio::test]
    async fn test_unlock_notifies_pending_reservations_and_removes_stage() {
        let ctx = context();
        let quest = StageId::new(QUEST);
        ctx.registry().create(&quest, 4).await.unwrap();
        let (mut host, _host_rx) = connect(&ctx, 1).await;
        let (mut guest, mut guest_rx) = connect(&ctx, 2).await;
        let (mut joined, mut joined_rx) = connect(&ctx, 3).await;
        host.reserve(&ctx, AckHandle(1), quest.clone(), 0).await.unwrap();
        guest.reserve(&ctx, AckHandle(2), quest.clone(), 0).await.unwrap();
        joined.reserve(&ctx, AckHandle(3), quest.clone(), 0).await.unwrap();
        joined.move_to(&ctx, AckHandle(4), quest.clone()).await.unwrap();
        drain(&mut guest_rx);
        drain(&mut joined_rx);

        host.unlock(&ctx).await;

        let frames = drain(&mut guest_rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(opcode(&frames[0]), Opcode::StageDestruct.value());
        assert!(drain(&mut joined_rx).is_empty(), "members are not told");
        assert!(ctx.registry().find(&quest).await.is_none());
        assert!(host.reservation().is_none());
    }

    #[tokio::test]
    async fn test_unlock_without_reservation_is_noop() {
        let ctx = context();
        let (mut me, _rx) = connect(&ctx, 1).await;
        me.enter(&ctx, AckHandle(1), StageId::new(HUB)).await.unwrap();

        me.unlock(&ctx).await;

        assert_eq!(ctx.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_depart_after_enter_elsewhere_releases_slot() {
        let ctx = context();
        let quest = StageId::new(QUEST);
        ctx.registry().create(&quest, 4).await.unwrap();
        let (mut me, _rx) = connect(&ctx, 1).await;
        me.reserve(&ctx, AckHandle(1), quest.clone(), 0).await.unwrap();
        me.enter(&ctx, AckHandle(2), StageId::new(A)).await.unwrap();
        assert!(me.reservation().is_none(), "enter forgets the reservation");

        me.depart(&ctx).await;

        assert!(ctx.registry().find(&quest).await.is_none());
        assert!(ctx.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_depart_after_move_elsewhere_releases_slot() {
        let ctx = context();
        let quest = StageId::new(QUEST);
        ctx.registry().create(&quest, 4).await.unwrap();
        let (mut me, _rx) = connect(&ctx, 1).await;
        me.reserve(&ctx, AckHandle(1), quest.clone(), 0).await.unwrap();
        me.move_to(&ctx, AckHandle(2), StageId::new(A)).await.unwrap();

        me.depart(&ctx).await;

        assert!(ctx.registry().find(&quest).await.is_none());
    }

    #[tokio::test]
    async fn test_reserve_again_after_enter_restores_reservation() {
        let ctx = context();
        let quest = StageId::new(QUEST);
        ctx.registry().create(&quest, 4).await.unwrap();
        let (mut me, mut rx) = connect(&ctx, 1).await;
        me.reserve(&ctx, AckHandle(1), quest.clone(), 0).await.unwrap();
        me.enter(&ctx, AckHandle(2), StageId::new(A)).await.unwrap();
        drain(&mut rx);

        me.reserve(&ctx, AckHandle(3), quest.clone(), 0x01).await.unwrap();

        assert_eq!(ack_status(&drain(&mut rx)[0]), 0);
        assert_eq!(me.reservation().unwrap().id(), &quest);
        me.unreserve(&ctx).await;
        assert!(ctx.registry().find(&quest).await.is_none());
    }

    #[tokio::test]
    async fn test_unlock_after_move_into_reserved_stage_notifies_guest() {
        let ctx = context();
        let quest = StageId::new(QUEST);
        ctx.registry().create(&quest, 4).await.unwrap();
        let (mut host, _host_rx) = connect(&ctx, 1).await;
        let (mut guest, mut guest_rx) = connect(&ctx, 2).await;
        host.reserve(&ctx, AckHandle(1), quest.clone(), 0).await.unwrap();
        guest.reserve(&ctx, AckHandle(2), quest.clone(), 0).await.unwrap();
        host.move_to(&ctx, AckHandle(3), quest.clone()).await.unwrap();
        assert!(host.reservation().is_some(), "move keeps the reservation");
        drain(&mut guest_rx);

        host.unlock(&ctx).await;

        let frames = drain(&mut guest_rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(opcode(&frames[0]), Opcode::StageDestruct.value());
        assert!(ctx.registry().find(&quest).await.is_none());
    }

    #[tokio::test]
    async fn test_depart_releases_everything() {
        let ctx = context();
        let reserved = StageId::new("sl1Qs009p0a0u0");
        ctx.registry().create(&reserved, 4).await.unwrap();
        let (mut me, _rx) = connect(&ctx, 1).await;
        me.enter(&ctx, AckHandle(1), StageId::new(QUEST)).await.unwrap();
        me.reserve(&ctx, AckHandle(2), reserved.clone(), 0).await.unwrap();
        let token = me.handle().cancel_token().clone();

        me.depart(&ctx).await;

        assert!(token.is_cancelled());
        assert!(me.current().is_none());
        assert!(ctx.registry().is_empty().await);
        assert!(ctx.directory().is_empty().await);
    }

    #[tokio::test]
    async fn test_depart_withdraws_announced_character() {
        let ctx = context();
        let (peer, mut peer_rx) = connect(&ctx, 2).await;
        let (mut me, _rx) = connect(&ctx, 1).await;
        me.handle().mark_binaries_done();
        ctx.user_binaries()
            .set(CharId(1), 1, Bytes::from_static(b"name"))
            .await
            .unwrap();

        me.depart(&ctx).await;

        let frame = peer_rx.try_recv().expect("peer should be told");
        assert_eq!(&frame[..], &[0x00, 0x41, 0, 0, 0, 1]);
        assert!(ctx.user_binaries().get(CharId(1), 1).await.is_none());
        drop(peer);
    }
}
