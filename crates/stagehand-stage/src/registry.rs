//! The stage registry: every stage on this server, by identifier.
//!
//! # Locking
//!
//! The registry lock guards the map and nothing else. It is never held
//! across an `.await` other than its own acquisition. The only nesting
//! allowed is registry → stage, and only as a non-blocking `try_write`
//! during garbage collection. Stage code never touches the registry while
//! holding its own lock.

use std::collections::HashMap;
use std::sync::Arc;

use stagehand_protocol::StageId;
use stagehand_session::SessionHandle;
use tokio::sync::RwLock;

use crate::{Stage, StageConfig, StageError, StageInfo};

/// Server-wide directory of stages.
#[derive(Debug)]
pub struct StageRegistry {
    stages: RwLock<HashMap<StageId, Arc<Stage>>>,
    config: StageConfig,
}

impl StageRegistry {
    /// Creates an empty registry.
    pub fn new(config: StageConfig) -> Self {
        Self {
            stages: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// The configuration stages are created with.
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    fn new_stage(&self, id: &StageId, capacity: u16) -> Arc<Stage> {
        tracing::info!(stage_id = %id, capacity, "stage created");
        Arc::new(Stage::new(id.clone(), capacity, self.config.binary_poll_interval))
    }

    /// Creates a stage with an explicit capacity.
    ///
    /// # Errors
    /// [`StageError::AlreadyExists`] if the identifier is taken. Of several
    /// concurrent calls for the same identifier exactly one succeeds.
    pub async fn create(&self, id: &StageId, capacity: u16) -> Result<Arc<Stage>, StageError> {
        let mut stages = self.stages.write().await;
        if stages.contains_key(id) {
            return Err(StageError::AlreadyExists(id.clone()));
        }
        let stage = self.new_stage(id, capacity);
        stages.insert(id.clone(), Arc::clone(&stage));
        Ok(stage)
    }

    /// Returns the stage, creating it with the default capacity if absent.
    pub async fn lookup_or_create(&self, id: &StageId) -> Arc<Stage> {
        if let Some(stage) = self.find(id).await {
            return stage;
        }
        let mut stages = self.stages.write().await;
        let stage = stages
            .entry(id.clone())
            .or_insert_with(|| self.new_stage(id, self.config.default_capacity));
        Arc::clone(stage)
    }

    /// Joins `session` to the stage, creating the stage if needed.
    ///
    /// Retries when the looked-up stage was closed by a concurrent
    /// removal, so the session always lands in the registered stage.
    pub async fn join_or_create(&self, id: &StageId, session: Arc<SessionHandle>) -> Arc<Stage> {
        loop {
            let stage = self.lookup_or_create(id).await;
            match stage.join(Arc::clone(&session)).await {
                Ok(_) => return stage,
                Err(err) => {
                    tracing::debug!(stage_id = %id, %err, "stage closed during join, retrying");
                }
            }
        }
    }

    /// Returns the stage.
    ///
    /// # Errors
    /// [`StageError::StageNotFound`] if it isn't registered.
    pub async fn get(&self, id: &StageId) -> Result<Arc<Stage>, StageError> {
        self.find(id)
            .await
            .ok_or_else(|| StageError::StageNotFound(id.clone()))
    }

    /// Returns the stage if registered.
    pub async fn find(&self, id: &StageId) -> Option<Arc<Stage>> {
        self.stages.read().await.get(id).cloned()
    }

    /// Removes a stage regardless of who is inside.
    ///
    /// The removed stage is closed: sessions already inside can still
    /// leave it, but nobody can join it again.
    pub async fn remove(&self, id: &StageId) -> Option<Arc<Stage>> {
        let removed = self.stages.write().await.remove(id);
        if let Some(stage) = &removed {
            stage.close().await;
            tracing::info!(stage_id = %id, age_secs = stage.age().as_secs(), "stage removed");
        }
        removed
    }

    /// Point-in-time list of stages whose identifier matches `predicate`.
    pub async fn snapshot<F>(&self, predicate: F) -> Vec<Arc<Stage>>
    where
        F: Fn(&StageId) -> bool,
    {
        self.stages
            .read()
            .await
            .iter()
            .filter(|(id, _)| predicate(*id))
            .map(|(_, stage)| Arc::clone(stage))
            .collect()
    }

    /// Summaries of the occupied, enumerable stages.
    pub async fn enumerate(&self) -> Vec<StageInfo> {
        let candidates = self.snapshot(|id| self.config.is_enumerable(id)).await;
        let mut infos = Vec::with_capacity(candidates.len());
        for stage in candidates {
            let info = stage.info().await;
            if info.members > 0 || info.reservations > 0 {
                infos.push(info);
            }
        }
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Removes every ephemeral stage that nobody is inside and nobody has
    /// reserved. Stages whose lock is contended are skipped; they are in
    /// use and will be looked at again on the next departure.
    ///
    /// Returns the identifiers that were removed.
    pub async fn collect_garbage(&self) -> Vec<StageId> {
        let mut stages = self.stages.write().await;
        let doomed: Vec<StageId> = stages
            .iter()
            .filter(|(id, stage)| self.config.is_ephemeral(id) && stage.try_close_if_vacant())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            if let Some(stage) = stages.remove(id) {
                tracing::info!(stage_id = %id, age_secs = stage.age().as_secs(), "empty stage removed");
            }
        }
        doomed
    }

    /// Removes `id` if it is ephemeral and vacant. Same rules as
    /// [`collect_garbage`](Self::collect_garbage) for one stage.
    pub async fn remove_if_vacant(&self, id: &StageId) -> bool {
        if !self.config.is_ephemeral(id) {
            return false;
        }
        let mut stages = self.stages.write().await;
        match stages.get(id) {
            Some(stage) if stage.try_close_if_vacant() => {
                stages.remove(id);
                tracing::info!(stage_id = %id, "empty stage removed");
                true
            }
            _ => false,
        }
    }

    /// Number of registered stages.
    pub async fn len(&self) -> usize {
        self.stages.read().await.len()
    }

    /// Returns `true` if no stage is registered.
    pub async fn is_empty(&self) -> bool {
        self.stages.read().await.is_empty()
    }
}
