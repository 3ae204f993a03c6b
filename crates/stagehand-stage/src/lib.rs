//! Stage management for Stagehand.
//!
//! A stage is a shared room or instance: it has members, reservations,
//! live objects, and published binaries. Stages are looked up by string
//! identifier in a server-wide [`StageRegistry`], which also removes
//! ephemeral stages (quests, personal rooms, guild rooms) once they empty.
//!
//! # Key types
//!
//! - [`StageRegistry`]: create/lookup/remove/snapshot and garbage collection
//! - [`Stage`]: membership, reservations, objects, binaries, broadcast
//! - [`ObjectIdAllocator`]: the per-stage pool of 127 object identifiers
//! - [`BlobStore`]: per-key publish/wait rendezvous
//! - [`StageConfig`]: capacities, poll interval, category codes, hub id

mod allocator;
mod blob;
mod config;
mod error;
mod registry;
mod stage;

pub use allocator::{MAX_SLOT, ObjectIdAllocator};
pub use blob::{BlobStore, HUNTER_COUNT_KEY, SERVER_GENERATED_KIND, canned_payload};
pub use config::{HUB_STAGE_ID, StageConfig};
pub use error::StageError;
pub use registry::StageRegistry;
pub use stage::{RESERVE_NOT_READY, RESERVE_READY, Reservation, Stage, StageInfo, StageObject};
