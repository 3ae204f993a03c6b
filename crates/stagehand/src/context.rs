//! Shared server state.

use stagehand_session::{SessionDirectory, UserBinaryStore};
use stagehand_stage::StageRegistry;
use stagehand_store::CharacterStore;

use crate::ServerConfig;

/// Everything connection tasks share, passed explicitly to every handler.
///
/// Each member guards itself; there is no lock around the context as a
/// whole. Wrapped in an `Arc` and cloned into each connection task.
#[derive(Debug)]
pub struct ServerContext<S> {
    registry: StageRegistry,
    directory: SessionDirectory,
    user_binaries: UserBinaryStore,
    store: S,
    config: ServerConfig,
}

impl<S: CharacterStore> ServerContext<S> {
    /// Creates empty server state backed by `store`.
    pub fn new(config: ServerConfig, store: S) -> Self {
        Self {
            registry: StageRegistry::new(config.stage.clone()),
            directory: SessionDirectory::new(),
            user_binaries: UserBinaryStore::new(),
            store,
            config,
        }
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    pub fn user_binaries(&self) -> &UserBinaryStore {
        &self.user_binaries
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
