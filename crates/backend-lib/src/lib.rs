// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core backend-lib functionality for the Parley chat server.

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod presence;
pub mod rooms;
pub mod session;
pub mod storage;
pub mod validation;
pub mod websocket;
pub mod ws_router;

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthRateLimiter, IdentityVerifier, TokenCodec};
use crate::config::Settings;
use crate::directory::Directory;
use crate::rooms::RoomLocks;
use crate::session::SessionRouter;
use crate::storage::Storage;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState<S> {
    /// Settings the server was started with
    pub settings: Arc<Settings>,
    /// Storage backend
    pub storage: S,
    /// Credential checks for handshakes and HTTP requests
    pub verifier: Arc<IdentityVerifier>,
    /// Cached room membership
    pub directory: Directory,
    /// Live connections and their room bindings
    pub sessions: SessionRouter,
    /// Serializes lifecycle operations per room
    pub room_locks: RoomLocks,
    /// Lockout for repeated handshake failures
    pub rate_limiter: Arc<AuthRateLimiter>,
}

impl<S: Storage + Clone> AppState<S> {
    /// Create a new application state
    pub fn new(storage: S, settings: Settings) -> Self {
        let codec = TokenCodec::new(&settings.jwt_secret, settings.token_leeway_secs);
        let verifier = IdentityVerifier::new(codec, settings.realtime_roles.clone());
        let rate_limiter = AuthRateLimiter::new(
            settings.max_failed_handshakes,
            Duration::from_secs(settings.lockout_secs),
        );

        Self {
            settings: Arc::new(settings),
            storage,
            verifier: Arc::new(verifier),
            directory: Directory::new(),
            sessions: SessionRouter::new(),
            room_locks: RoomLocks::default(),
            rate_limiter: Arc::new(rate_limiter),
        }
    }
}
