// ==================
// crates/backend-lib/src/websocket.rs
// ==================
//! WebSocket Handler Module
//!
//! One `WebSocketHandler` lives for each accepted connection. It registers
//! the connection with the session router, runs the initial sync, decodes
//! inbound frames into [`ClientEvent`]s and routes each one to the room
//! lifecycle or broadcast operations.
//!
//! Events of one connection are handled in receipt order. A failing event
//! never closes the connection: the error is logged and turned into a single
//! `errorMessage` for this connection only.

use std::sync::Arc;

use metrics::counter;
use parley_common::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;

use crate::auth::IdentityClaim;
use crate::error::AppError;
use crate::metrics::{EVENT_RECEIVED, EVENT_REJECTED};
use crate::session::ConnectionContext;
use crate::storage::Storage;
use crate::{broadcast, presence, rooms, AppState};

const SYNC_FAILED: &str = "Failed to load chats. Please try again later.";

/// WebSocket handler for processing events of one connection
pub struct WebSocketHandler<S: Storage + Clone + 'static> {
    state: Arc<AppState<S>>,
    ctx: ConnectionContext,
}

impl<S: Storage + Clone + 'static> WebSocketHandler<S> {
    /// Register a verified connection whose outbound events go to `tx`
    pub fn connect(
        state: Arc<AppState<S>>,
        claim: IdentityClaim,
        tx: mpsc::Sender<ServerEvent>,
    ) -> Self {
        let ctx = state.sessions.register(claim, tx);
        tracing::info!(conn = %ctx.id, user = ctx.user_id(), "connection registered");
        Self { state, ctx }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.ctx
    }

    /// Bind the connection to its user's rooms.
    ///
    /// A store failure is reported to the client and the connection stays open.
    pub async fn on_open(&self) {
        if let Err(e) = presence::initial_sync(&self.state, &self.ctx).await {
            tracing::error!(conn = %self.ctx.id, user = self.ctx.user_id(), error = %e, "initial sync failed");
            self.state
                .sessions
                .send_to(self.ctx.id, ServerEvent::ErrorMessage(SYNC_FAILED.to_string()));
        }
    }

    /// Decode and handle one text frame
    pub async fn handle_text(&self, text: &str) {
        counter!(EVENT_RECEIVED).increment(1);

        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                counter!(EVENT_REJECTED).increment(1);
                tracing::warn!(conn = %self.ctx.id, error = %e, "malformed event");
                self.state.sessions.send_to(
                    self.ctx.id,
                    ServerEvent::ErrorMessage(format!("Malformed event: {e}")),
                );
                return;
            },
        };

        let kind = event.kind();
        if let Err(e) = self.dispatch(event).await {
            self.reject(kind, &e);
        }
    }

    /// Route a decoded event to its operation
    pub async fn dispatch(&self, event: ClientEvent) -> Result<(), AppError> {
        let state = self.state.as_ref();
        let ctx = &self.ctx;
        tracing::debug!(conn = %ctx.id, event = event.kind(), room = ?event.room_id(), "dispatching");

        match event {
            ClientEvent::SendMessage { room_id, body } => {
                broadcast::send(state, ctx, &room_id, &body).await?;
            },
            ClientEvent::EditMessage {
                room_id,
                message_id,
                new_body,
            } => {
                broadcast::edit(state, ctx, &room_id, &message_id, &new_body).await?;
            },
            ClientEvent::DeleteMessage {
                room_id,
                message_id,
            } => broadcast::delete(state, ctx, &room_id, &message_id).await?,
            ClientEvent::Typing { room_id } => broadcast::typing_start(state, ctx, &room_id)?,
            ClientEvent::StopTyping { room_id } => broadcast::typing_stop(state, ctx, &room_id)?,
            ClientEvent::StartChat { other_user_id } => {
                rooms::start_chat(state, ctx, &other_user_id).await?;
            },
            ClientEvent::JoinChat { room_id } => {
                state.sessions.join_chat(ctx, &room_id, &state.directory)?;
            },
            ClientEvent::LeaveChat { room_id } => rooms::leave_room(state, ctx, &room_id).await?,
            ClientEvent::DeleteChat { room_id } => rooms::delete_room(state, ctx, &room_id).await?,
        }
        Ok(())
    }

    fn reject(&self, kind: &str, err: &AppError) {
        counter!(EVENT_REJECTED).increment(1);
        if err.is_server_error() {
            tracing::error!(conn = %self.ctx.id, user = self.ctx.user_id(), event = kind, error = ?err, "event failed");
        } else {
            tracing::warn!(conn = %self.ctx.id, user = self.ctx.user_id(), event = kind, error = %err, "event rejected");
        }
        self.state
            .sessions
            .send_to(self.ctx.id, ServerEvent::ErrorMessage(err.client_message()));
    }

    /// Announce the departure and drop the connection
    pub fn close(self) {
        presence::disconnect(&self.state, &self.ctx);
        tracing::info!(conn = %self.ctx.id, user = self.ctx.user_id(), "connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::storage::FlatFileStorage;
    use parley_common::{Role, Room};
    use tempfile::TempDir;

    fn setup() -> (Arc<AppState<FlatFileStorage>>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FlatFileStorage::new(temp_dir.path()).unwrap();
        let settings = Settings {
            jwt_secret: "test-secret".into(),
            ..Settings::default()
        };
        (Arc::new(AppState::new(storage, settings)), temp_dir)
    }

    fn claim(user_id: &str) -> IdentityClaim {
        IdentityClaim {
            user_id: user_id.into(),
            role: Role::User,
            company_id: "c1".into(),
            display_name: user_id.to_uppercase(),
        }
    }

    #[tokio::test]
    async fn test_malformed_frames_keep_connection_usable() {
        let (state, _temp_dir) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        let handler = WebSocketHandler::connect(state.clone(), claim("u1"), tx);

        handler.handle_text("not json").await;
        handler.handle_text(r#"{"event":"shout","data":{}}"#).await;
        for _ in 0..2 {
            match rx.try_recv().unwrap() {
                ServerEvent::ErrorMessage(reason) => assert!(reason.starts_with("Malformed event")),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(state.sessions.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_rejection_goes_to_originator_only() {
        let (state, _temp_dir) = setup();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let sender = WebSocketHandler::connect(state.clone(), claim("u1"), tx1);
        let bystander = WebSocketHandler::connect(state.clone(), claim("u2"), tx2);

        state.directory.refresh(&Room::one_on_one("u1", "u2", "c1"));
        state.sessions.bind(bystander.context().id, "room_u1_u2");

        // member, but never joined
        sender
            .handle_text(r#"{"event":"sendMessage","data":{"roomId":"room_u1_u2","body":"hi"}}"#)
            .await;
        assert!(matches!(rx1.try_recv().unwrap(), ServerEvent::ErrorMessage(_)));
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_announces_departure() {
        let (state, _temp_dir) = setup();
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let leaving = WebSocketHandler::connect(state.clone(), claim("u1"), tx1);
        let staying = WebSocketHandler::connect(state.clone(), claim("u2"), tx2);
        state.sessions.bind(leaving.context().id, "room_u1_u2");
        state.sessions.bind(staying.context().id, "room_u1_u2");

        leaving.close();

        match rx2.try_recv().unwrap() {
            ServerEvent::UserLeft(presence) => {
                assert_eq!(presence.user_id, "u1");
                assert_eq!(presence.username, "U1");
                assert_eq!(presence.room_id, "room_u1_u2");
            },
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(state.sessions.connection_count(), 1);
    }
}
