//! A stage: one shared room or instance.
//!
//! All mutable state sits behind a single `RwLock`, which totally orders
//! every mutation of the stage. No method holds that lock across an
//! `.await` other than the lock acquisition itself; in particular
//! [`Stage::wait_binary`] sleeps with the lock released.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use stagehand_protocol::{BinaryKey, CharId, DeleteObject, ObjectId, Packet, Position, StageId};
use stagehand_session::{SessionHandle, broadcast};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::allocator::ObjectIdAllocator;
use crate::blob::{self, BlobStore};
use crate::{StageError, StageRegistry};

/// Ready code that marks a reservation as not ready.
pub const RESERVE_NOT_READY: u8 = 0x01;
/// Ready code that marks a reservation as ready.
pub const RESERVE_READY: u8 = 0x11;

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// A live object inside a stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageObject {
    pub id: ObjectId,
    pub owner: CharId,
    pub position: Position,
}

/// Point-in-time summary of a stage, as shown by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInfo {
    pub id: StageId,
    pub reservations: usize,
    pub members: usize,
    pub capacity: u16,
    pub has_password: bool,
}

/// What a successful `reserve` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// A new slot was taken, not ready.
    Created,
    /// The caller already held a slot; its ready flag is now this value.
    Updated { ready: bool },
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct StageState {
    capacity: u16,
    password: Option<String>,
    closed: bool,
    members: HashMap<CharId, Arc<SessionHandle>>,
    reservations: HashMap<CharId, bool>,
    objects: BTreeMap<ObjectId, StageObject>,
    allocator: ObjectIdAllocator,
    blobs: BlobStore,
}

impl StageState {
    fn is_vacant(&self) -> bool {
        self.members.is_empty() && self.reservations.is_empty()
    }
}

/// One stage and all of its shared state.
#[derive(Debug)]
pub struct Stage {
    id: StageId,
    created_at: Instant,
    poll_interval: Duration,
    state: RwLock<StageState>,
}

impl Stage {
    /// Creates an empty, open stage.
    pub fn new(id: StageId, capacity: u16, poll_interval: Duration) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            poll_interval,
            state: RwLock::new(StageState {
                capacity,
                password: None,
                closed: false,
                members: HashMap::new(),
                reservations: HashMap::new(),
                objects: BTreeMap::new(),
                allocator: ObjectIdAllocator::new(),
                blobs: BlobStore::new(),
            }),
        }
    }

    /// Returns the stage identifier.
    pub fn id(&self) -> &StageId {
        &self.id
    }

    /// Time since the stage was created.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    // -- Membership -------------------------------------------------------

    /// Adds `session` to the member set. Joining twice is a no-op.
    ///
    /// Returns `true` if the session was not already a member.
    ///
    /// # Errors
    /// [`StageError::Closed`] if the stage has been removed from its
    /// registry; the caller should look the identifier up again.
    pub async fn join(&self, session: Arc<SessionHandle>) -> Result<bool, StageError> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(StageError::Closed(self.id.clone()));
        }
        let char_id = session.char_id();
        let added = state.members.insert(char_id, session).is_none();
        if added {
            tracing::info!(stage_id = %self.id, %char_id, "joined stage");
        }
        Ok(added)
    }

    /// Removes `char_id` from the member set and the reservations, deletes
    /// every object it owns, and tells the remaining members which objects
    /// went away. Afterwards the registry drops any ephemeral stage left
    /// vacant.
    ///
    /// Leaving a stage one is not part of does nothing. Returns `true` if
    /// anything changed.
    pub async fn leave(&self, char_id: CharId, registry: &StageRegistry) -> bool {
        let changed = {
            let mut state = self.state.write().await;
            let was_member = state.members.remove(&char_id).is_some();
            let was_reserved = state.reservations.remove(&char_id).is_some();

            let owned: Vec<ObjectId> = state
                .objects
                .values()
                .filter(|o| o.owner == char_id)
                .map(|o| o.id)
                .collect();
            for id in &owned {
                state.objects.remove(id);
            }
            let freed = state.allocator.release_owner(char_id);

            if !owned.is_empty() {
                let deletes: Vec<DeleteObject> = owned
                    .iter()
                    .map(|&object_id| DeleteObject { object_id })
                    .collect();
                let packets: Vec<&dyn Packet> = deletes.iter().map(|p| p as &dyn Packet).collect();
                broadcast::fan_out_batch(state.members.values(), &packets, None);
            }

            if was_member {
                tracing::info!(stage_id = %self.id, %char_id, objects = owned.len(), "left stage");
            }
            was_member || was_reserved || freed > 0
        };

        if changed {
            registry.collect_garbage().await;
        }
        changed
    }

    /// Returns `true` if `char_id` is a member.
    pub async fn is_member(&self, char_id: CharId) -> bool {
        self.state.read().await.members.contains_key(&char_id)
    }

    /// Snapshot of the current members.
    pub async fn members(&self) -> Vec<Arc<SessionHandle>> {
        self.state.read().await.members.values().cloned().collect()
    }

    // -- Reservations -----------------------------------------------------

    /// Reserves a slot for `char_id`, or updates its ready flag if it
    /// already holds one.
    ///
    /// For an existing slot `ready_code` is [`RESERVE_NOT_READY`] or
    /// [`RESERVE_READY`]; any other code leaves the flag alone. A new slot
    /// requires a free place and, if the stage has a password, a matching
    /// `password`.
    ///
    /// # Errors
    /// [`StageError::WrongPassword`] or [`StageError::Full`]; neither
    /// changes the reservations.
    pub async fn reserve(
        &self,
        char_id: CharId,
        password: Option<&str>,
        ready_code: u8,
    ) -> Result<Reservation, StageError> {
        let mut state = self.state.write().await;
        let state = &mut *state;

        if let Some(ready) = state.reservations.get_mut(&char_id) {
            match ready_code {
                RESERVE_NOT_READY => *ready = false,
                RESERVE_READY => *ready = true,
                other => tracing::debug!(stage_id = %self.id, code = other, "ignoring ready code"),
            }
            return Ok(Reservation::Updated { ready: *ready });
        }

        if state.reservations.len() >= usize::from(state.capacity) {
            return Err(StageError::Full(self.id.clone()));
        }
        if let Some(expected) = state.password.as_deref() {
            if password != Some(expected) {
                return Err(StageError::WrongPassword(self.id.clone()));
            }
        }

        state.reservations.insert(char_id, false);
        tracing::debug!(stage_id = %self.id, %char_id, "reserved slot");
        Ok(Reservation::Created)
    }

    /// Drops the reservation held by `char_id`, if any. Membership is not
    /// required.
    pub async fn unreserve(&self, char_id: CharId) -> bool {
        self.state.write().await.reservations.remove(&char_id).is_some()
    }

    /// Returns `true` if `char_id` holds a reservation.
    pub async fn is_reserved(&self, char_id: CharId) -> bool {
        self.state.read().await.reservations.contains_key(&char_id)
    }

    /// Ready flag of `char_id`'s reservation.
    pub async fn is_ready(&self, char_id: CharId) -> Option<bool> {
        self.state.read().await.reservations.get(&char_id).copied()
    }

    /// Characters holding a reservation.
    pub async fn reserved_chars(&self) -> Vec<CharId> {
        self.state.read().await.reservations.keys().copied().collect()
    }

    /// Sets the stage password. An empty password clears it.
    ///
    /// # Errors
    /// [`StageError::NotHost`] unless `char_id` holds a reservation.
    pub async fn set_password(&self, char_id: CharId, password: &str) -> Result<(), StageError> {
        let mut state = self.state.write().await;
        if !state.reservations.contains_key(&char_id) {
            return Err(StageError::NotHost(char_id));
        }
        state.password = (!password.is_empty()).then(|| password.to_owned());
        Ok(())
    }

    // -- Binaries ---------------------------------------------------------

    /// Publishes a binary and wakes everyone waiting for it.
    pub async fn set_binary(&self, key: BinaryKey, data: Bytes) {
        tracing::debug!(stage_id = %self.id, %key, len = data.len(), "binary published");
        self.state.write().await.blobs.set(key, data);
    }

    /// Fetches a binary.
    ///
    /// A published value always wins. Otherwise the hunter-count key and
    /// server-generated keys are answered with fixed payloads.
    ///
    /// # Errors
    /// [`StageError::NotFound`] if nothing applies.
    pub async fn get_binary(&self, key: BinaryKey) -> Result<Bytes, StageError> {
        if let Some(data) = self.state.read().await.blobs.get(key) {
            return Ok(data);
        }
        blob::canned_payload(key).ok_or_else(|| StageError::NotFound {
            stage: self.id.clone(),
            key,
        })
    }

    /// Waits until a binary is published under `key` and returns it.
    ///
    /// Returns at once if a value is already there. The wait wakes on
    /// publication and also re-checks every poll interval. The stage lock
    /// is released while waiting.
    ///
    /// # Errors
    /// [`StageError::Cancelled`] once `cancel` fires.
    pub async fn wait_binary(
        &self,
        key: BinaryKey,
        cancel: &CancellationToken,
    ) -> Result<Bytes, StageError> {
        let notify = self.state.write().await.blobs.notifier(key);
        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            // Register interest before checking so a publish between the
            // check and the select still wakes us.
            notified.as_mut().enable();

            if let Some(data) = self.state.read().await.blobs.get(key) {
                return Ok(data);
            }

            tracing::debug!(stage_id = %self.id, %key, "waiting for binary");
            tokio::select! {
                _ = cancel.cancelled() => return Err(StageError::Cancelled),
                _ = &mut notified => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    // -- Objects ----------------------------------------------------------

    /// Claims the next object identifier for `owner` without creating an
    /// object.
    ///
    /// # Errors
    /// [`StageError::AllocatorExhausted`] when all 127 are in use.
    pub async fn allocate_object_id(&self, owner: CharId) -> Result<ObjectId, StageError> {
        self.state
            .write()
            .await
            .allocator
            .allocate(owner)
            .ok_or_else(|| StageError::AllocatorExhausted(self.id.clone()))
    }

    /// Creates an object owned by `owner` at `position`.
    ///
    /// # Errors
    /// [`StageError::AllocatorExhausted`] when all 127 identifiers are in
    /// use.
    pub async fn create_object(
        &self,
        owner: CharId,
        position: Position,
    ) -> Result<StageObject, StageError> {
        let mut state = self.state.write().await;
        let id = state
            .allocator
            .allocate(owner)
            .ok_or_else(|| StageError::AllocatorExhausted(self.id.clone()))?;
        let object = StageObject { id, owner, position };
        state.objects.insert(id, object);
        Ok(object)
    }

    /// Moves an object.
    ///
    /// # Errors
    /// [`StageError::ObjectNotFound`] if no such object lives here.
    pub async fn position_object(&self, id: ObjectId, position: Position) -> Result<(), StageError> {
        let mut state = self.state.write().await;
        let object = state
            .objects
            .get_mut(&id)
            .ok_or(StageError::ObjectNotFound(id))?;
        object.position = position;
        Ok(())
    }

    /// Deletes an object and frees its identifier.
    ///
    /// # Errors
    /// [`StageError::ObjectNotFound`] if no such object lives here.
    pub async fn delete_object(&self, id: ObjectId) -> Result<StageObject, StageError> {
        let mut state = self.state.write().await;
        let object = state
            .objects
            .remove(&id)
            .ok_or(StageError::ObjectNotFound(id))?;
        state.allocator.release(id);
        Ok(object)
    }

    /// Snapshot of the live objects, ordered by identifier.
    pub async fn objects(&self) -> Vec<StageObject> {
        self.state.read().await.objects.values().copied().collect()
    }

    // -- Summary ----------------------------------------------------------

    /// Summary used by enumeration.
    pub async fn info(&self) -> StageInfo {
        let state = self.state.read().await;
        StageInfo {
            id: self.id.clone(),
            reservations: state.reservations.len(),
            members: state.members.len(),
            capacity: state.capacity,
            has_password: state.password.is_some(),
        }
    }

    /// Reservation capacity.
    pub async fn capacity(&self) -> u16 {
        self.state.read().await.capacity
    }

    /// Returns `true` if nobody is inside and nobody holds a reservation.
    pub async fn is_vacant(&self) -> bool {
        self.state.read().await.is_vacant()
    }

    /// Marks the stage closed if it is vacant, without waiting for the
    /// lock. Returns `true` if the stage is now closed.
    ///
    /// Used by the registry while it holds its own lock; a contended stage
    /// is in use and therefore skipped.
    pub(crate) fn try_close_if_vacant(&self) -> bool {
        match self.state.try_write() {
            Ok(mut state) if state.is_vacant() => {
                state.closed = true;
                true
            }
            _ => false,
        }
    }

    /// Marks the stage closed unconditionally.
    pub(crate) async fn close(&self) {
        self.state.write().await.closed = true;
    }

    // -- Broadcast --------------------------------------------------------

    /// Sends `packet` to every member except `exclude`, rendering it once
    /// per recipient. Full queues drop the frame.
    pub async fn broadcast<P>(&self, packet: &P, exclude: Option<CharId>) -> usize
    where
        P: Packet + ?Sized,
    {
        let state = self.state.read().await;
        broadcast::fan_out(state.members.values(), packet, exclude)
    }

    /// Sends `packets` as one terminated batch to every member except
    /// `exclude`. Nothing is sent for an empty slice.
    pub async fn broadcast_batch(&self, packets: &[&dyn Packet], exclude: Option<CharId>) -> usize {
        let state = self.state.read().await;
        broadcast::fan_out_batch(state.members.values(), packets, exclude)
    }
}
