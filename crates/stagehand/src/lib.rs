//! # Stagehand
//!
//! Stage and session coordination server for a game-server emulator.
//!
//! Clients log in over WebSocket and then move between *stages*: shared
//! rooms holding members, reservations, replicated objects, and binary
//! configuration blobs. Stagehand keeps those stages consistent while many
//! connections act on them at once.
//!
//! ## Layers
//!
//! ```text
//! stagehand            ← server, connection handler, request handlers
//!   stagehand-stage    ← Stage, StageRegistry, object IDs, binary blobs
//!   stagehand-session  ← SessionHandle, directory, user binaries, auth
//!   stagehand-store    ← CharacterStore (house, trophies, decorations)
//!   stagehand-protocol ← opcodes, requests, packets, acknowledgments
//!   stagehand-transport← WebSocket connections
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stagehand::prelude::*;
//!
//! # async fn start() -> Result<(), StagehandError> {
//! let server = StagehandServerBuilder::new()
//!     .bind("0.0.0.0:54001")
//!     .build(DevAuthenticator)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod context;
mod error;
mod handler;
mod handlers;
mod server;
mod transfer;

pub use config::ServerConfig;
pub use context::ServerContext;
pub use error::StagehandError;
pub use handlers::dispatch;
pub use server::{StagehandServer, StagehandServerBuilder};
pub use transfer::StageSession;

/// Everything needed to configure and run a server.
pub mod prelude {
    pub use crate::{ServerConfig, ServerContext, StagehandError, StagehandServer, StagehandServerBuilder};
    pub use stagehand_protocol::{CharId, StageId};
    pub use stagehand_session::{Authenticator, DevAuthenticator, SessionConfig, SessionError};
    pub use stagehand_stage::StageConfig;
    pub use stagehand_store::{CharacterField, CharacterStore, InMemoryStore, StoreConfig, StoreError};
}
