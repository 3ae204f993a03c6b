//! Session management for Stagehand.
//!
//! This crate holds everything the server knows about a logged-in
//! connection that isn't about a particular stage:
//!
//! 1. **Authentication**: resolving a login token to a character
//!    ([`Authenticator`] trait)
//! 2. **Session handles**: identity, client context, outbound queue, and
//!    disconnect cancellation ([`SessionHandle`])
//! 3. **Directory**: who is logged in, server-wide ([`SessionDirectory`])
//! 4. **Fan-out**: per-recipient rendering with drop-if-full delivery
//!    ([`broadcast`])
//! 5. **Navigation and user binaries**: [`MoveStack`] and
//!    [`UserBinaryStore`]
//!
//! # How it fits in the stack
//!
//! ```text
//! Stage Layer (above)    ← keeps SessionHandles for members, fans out through them
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer (below) ← provides CharId, ClientContext, Packet
//! ```

#![allow(async_fn_in_trait)]

mod auth;
pub mod broadcast;
mod directory;
mod error;
mod navigation;
mod session;
mod user_binary;

pub use auth::{Authenticator, DevAuthenticator};
pub use directory::SessionDirectory;
pub use error::SessionError;
pub use navigation::MoveStack;
pub use session::{SessionConfig, SessionHandle, SessionId};
pub use user_binary::{FIRST_USER_BINARY, LAST_USER_BINARY, UserBinaryStore};
