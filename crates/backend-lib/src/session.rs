// ============================
// crates/backend-lib/src/session.rs
// ============================
//! Connection registry and the connection to room binding table.
//!
//! A connection may be bound to many rooms and a room may have many bound
//! connections. Every room scoped event names its room, and the router only
//! accepts it when the sending connection is bound to that room.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use parley_common::{JoinConfirmation, OnlineUser, RoomId, ServerEvent, UserPresence};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::auth::IdentityClaim;
use crate::directory::Directory;
use crate::error::AppError;
use crate::metrics::EVENT_DROPPED;

pub type ConnectionId = Uuid;

/// What every event handler knows about the connection it runs for
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub id: ConnectionId,
    pub claim: IdentityClaim,
}

impl ConnectionContext {
    pub fn user_id(&self) -> &str {
        &self.claim.user_id
    }

    pub fn presence(&self, room_id: &str) -> UserPresence {
        UserPresence {
            user_id: self.claim.user_id.clone(),
            username: self.claim.display_name.clone(),
            room_id: room_id.to_string(),
        }
    }
}

struct Connection {
    claim: IdentityClaim,
    tx: mpsc::Sender<ServerEvent>,
}

#[derive(Clone, Default)]
pub struct SessionRouter {
    connections: Arc<DashMap<ConnectionId, Connection>>,
    bindings: Arc<DashMap<RoomId, HashSet<ConnectionId>>>,
}

impl SessionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live connection and hand back its context
    pub fn register(&self, claim: IdentityClaim, tx: mpsc::Sender<ServerEvent>) -> ConnectionContext {
        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            Connection {
                claim: claim.clone(),
                tx,
            },
        );
        ConnectionContext { id, claim }
    }

    /// Drop the connection and every binding it holds
    pub fn deregister(&self, conn: ConnectionId) {
        for room_id in self.rooms_of(conn) {
            self.unbind(conn, &room_id);
        }
        self.connections.remove(&conn);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn bind(&self, conn: ConnectionId, room_id: &str) {
        self.bindings
            .entry(room_id.to_string())
            .or_default()
            .insert(conn);
    }

    pub fn unbind(&self, conn: ConnectionId, room_id: &str) {
        if let Some(mut bound) = self.bindings.get_mut(room_id) {
            bound.remove(&conn);
        }
        self.bindings.remove_if(room_id, |_, bound| bound.is_empty());
    }

    /// Unbind every connection of `user_id` from the room
    pub fn unbind_user(&self, user_id: &str, room_id: &str) -> Vec<ConnectionId> {
        let conns = self.connections_for_user(user_id);
        for conn in &conns {
            self.unbind(*conn, room_id);
        }
        conns
    }

    /// Drop all bindings of a room, returning who was bound
    pub fn clear_room(&self, room_id: &str) -> HashSet<ConnectionId> {
        self.bindings
            .remove(room_id)
            .map(|(_, bound)| bound)
            .unwrap_or_default()
    }

    pub fn is_bound(&self, conn: ConnectionId, room_id: &str) -> bool {
        self.bindings
            .get(room_id)
            .is_some_and(|bound| bound.contains(&conn))
    }

    /// Accept a room scoped event only from a connection bound to the room
    pub fn resolve(&self, conn: ConnectionId, room_id: &str) -> Result<(), AppError> {
        if self.is_bound(conn, room_id) {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "Join chat {room_id} before sending events to it"
            )))
        }
    }

    pub fn rooms_of(&self, conn: ConnectionId) -> Vec<RoomId> {
        self.bindings
            .iter()
            .filter(|entry| entry.value().contains(&conn))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn connections_for_user(&self, user_id: &str) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|entry| entry.value().claim.user_id == user_id)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn bound_connections(&self, room_id: &str) -> Vec<ConnectionId> {
        self.bindings
            .get(room_id)
            .map(|bound| bound.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Queue an event for one connection without waiting.
    ///
    /// A full queue drops the event; returns whether it was queued.
    pub fn send_to(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        let Some(connection) = self.connections.get(&conn) else {
            return false;
        };
        match connection.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                counter!(EVENT_DROPPED).increment(1);
                tracing::warn!(%conn, event = event.kind(), "outbound queue full, dropping event");
                false
            },
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn send_to_user(&self, user_id: &str, event: &ServerEvent) -> usize {
        self.connections_for_user(user_id)
            .into_iter()
            .filter(|conn| self.send_to(*conn, event.clone()))
            .count()
    }

    /// Fan an event out to every connection bound to the room
    pub fn broadcast(&self, room_id: &str, event: &ServerEvent, except: Option<ConnectionId>) -> usize {
        self.bound_connections(room_id)
            .into_iter()
            .filter(|conn| Some(*conn) != except)
            .filter(|conn| self.send_to(*conn, event.clone()))
            .count()
    }

    /// One entry per connection bound to the room
    pub fn online_roster(&self, room_id: &str) -> Vec<OnlineUser> {
        self.bound_connections(room_id)
            .into_iter()
            .filter_map(|conn| {
                self.connections.get(&conn).map(|c| OnlineUser {
                    user_id: c.claim.user_id.clone(),
                    username: c.claim.display_name.clone(),
                })
            })
            .collect()
    }

    /// Bind a member's connection to a room it already belongs to
    pub fn join_chat(
        &self,
        ctx: &ConnectionContext,
        room_id: &str,
        directory: &Directory,
    ) -> Result<(), AppError> {
        let entry = directory
            .get(room_id)
            .ok_or_else(|| AppError::RoomNotFound(room_id.to_string()))?;
        if !entry.members.iter().any(|m| m == ctx.user_id()) {
            return Err(AppError::Unauthorized(
                "You are not authorized to join this chat.".into(),
            ));
        }

        self.bind(ctx.id, room_id);
        tracing::debug!(conn = %ctx.id, user = ctx.user_id(), room = room_id, "joined chat");

        self.send_to(
            ctx.id,
            ServerEvent::JoinConfirmation(JoinConfirmation {
                room: room_id.to_string(),
                users: self.online_roster(room_id),
            }),
        );
        self.broadcast(
            room_id,
            &ServerEvent::UserJoined(ctx.presence(room_id)),
            Some(ctx.id),
        );
        Ok(())
    }
}
