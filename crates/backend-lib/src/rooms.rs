// ============================
// crates/backend-lib/src/rooms.rs
// ============================
//! Room lifecycle: start, leave and delete one-on-one chats.
//!
//! Lifecycle operations on one room id run one at a time under that room's
//! lock, so the directory refresh and the broadcast depending on it are never
//! interleaved with another lifecycle change of the same room.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use metrics::counter;
use parley_common::{
    room_id_for, ChatCreated, ChatDeleted, ChatLeft, ChatMessage, Room, RoomId, ServerEvent,
    ANONYMOUS, SYSTEM_DISPLAY_NAME, SYSTEM_USER_ID,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics::{ROOM_CREATED, ROOM_DELETED};
use crate::session::ConnectionContext;
use crate::storage::Storage;
use crate::validation::{is_valid_user_id, validate_room_id, validate_user_id};
use crate::AppState;

/// Per-room async locks for lifecycle operations
#[derive(Clone, Default)]
pub struct RoomLocks {
    locks: Arc<DashMap<RoomId, Arc<Mutex<()>>>>,
}

impl RoomLocks {
    pub async fn lock(&self, room_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(room_id.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Forget the lock of a room nobody is waiting on
    pub fn prune(&self, room_id: &str) {
        self.locks
            .remove_if(room_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub(crate) fn chat_created(room: &Room, other_user_id: &str) -> ServerEvent {
    ServerEvent::ChatCreated(ChatCreated {
        room_id: room.room_id.clone(),
        other_user_id: other_user_id.to_string(),
        users: room.members.clone(),
        creator: room.creator_id.clone(),
    })
}

/// Announce the canonical room state to every live connection of both users
fn announce_room<S>(state: &AppState<S>, room: &Room, requester: &str, counterpart: &str) {
    state
        .sessions
        .send_to_user(requester, &chat_created(room, counterpart));
    state
        .sessions
        .send_to_user(counterpart, &chat_created(room, requester));
}

/// Open the one-on-one chat between the requester and `other_user_id`,
/// creating it on first use.
pub async fn start_chat<S: Storage + Clone>(
    state: &AppState<S>,
    ctx: &ConnectionContext,
    other_user_id: &str,
) -> Result<Room, AppError> {
    let other_user_id = validate_user_id(other_user_id)?;
    if other_user_id == ctx.user_id() {
        return Err(AppError::Validation("Cannot start a chat with yourself.".into()));
    }
    if !is_valid_user_id(ctx.user_id()) {
        return Err(AppError::Validation(format!("Invalid user ID: {}", ctx.user_id())));
    }

    let counterpart = state
        .storage
        .get_user(other_user_id)
        .await?
        .filter(|user| state.settings.counterpart_roles.contains(&user.role))
        .ok_or_else(|| AppError::UserNotFound(other_user_id.to_string()))?;

    let room_id = room_id_for(ctx.user_id(), other_user_id);
    let _guard = state.room_locks.lock(&room_id).await;

    let candidate = Room::one_on_one(ctx.user_id(), other_user_id, &ctx.claim.company_id);
    let (mut room, created) = state.storage.insert_room_if_absent(candidate).await?;

    if !created {
        let foreign = room
            .members
            .iter()
            .any(|member| member != ctx.user_id() && member != other_user_id);
        if foreign || !room.is_one_on_one {
            tracing::warn!(room = %room_id, members = ?room.members, "stored room does not belong to this pair");
            return Err(AppError::Unauthorized(
                "You are not authorized to access this chat".into(),
            ));
        }

        // a pair that left the chat earlier gets its membership back
        for user_id in [ctx.user_id(), other_user_id] {
            if !room.has_member(user_id) {
                room = state
                    .storage
                    .add_room_member(&room_id, user_id)
                    .await?
                    .ok_or_else(|| AppError::RoomNotFound(room_id.clone()))?;
            }
        }
        state.directory.refresh(&room);
        state.sessions.bind(ctx.id, &room_id);
        announce_room(state, &room, ctx.user_id(), other_user_id);
        tracing::info!(room = %room_id, user = ctx.user_id(), "existing chat loaded");
        return Ok(room);
    }

    state.directory.refresh(&room);
    state.sessions.bind(ctx.id, &room_id);
    for conn in state.sessions.connections_for_user(other_user_id) {
        state.sessions.bind(conn, &room_id);
    }
    announce_room(state, &room, ctx.user_id(), other_user_id);
    counter!(ROOM_CREATED).increment(1);
    tracing::info!(room = %room_id, members = ?room.members, "chat created");

    let counterpart_name = if counterpart.display_name.trim().is_empty() {
        ANONYMOUS
    } else {
        counterpart.display_name.as_str()
    };
    let welcome = ChatMessage {
        id: Uuid::new_v4(),
        author_id: SYSTEM_USER_ID.to_string(),
        author_name: SYSTEM_DISPLAY_NAME.to_string(),
        body: format!(
            "Private chat started between {} and {}",
            ctx.claim.display_name, counterpart_name
        ),
        room_id: room_id.clone(),
        company_id: ctx.claim.company_id.clone(),
        created_at: Utc::now(),
        updated_at: None,
    };
    state.storage.insert_message(&welcome).await?;
    state
        .sessions
        .broadcast(&room_id, &ServerEvent::NewMessage(welcome), None);

    Ok(room)
}

/// Load a room and check it belongs to the requester's company
async fn owned_room<S: Storage>(
    storage: &S,
    ctx: &ConnectionContext,
    room_id: &str,
) -> Result<Room, AppError> {
    let room = storage
        .get_room(room_id)
        .await?
        .filter(|room| room.is_one_on_one)
        .ok_or_else(|| AppError::RoomNotFound(room_id.to_string()))?;
    if room.company_id != ctx.claim.company_id {
        return Err(AppError::Unauthorized(
            "You are not authorized to access this chat".into(),
        ));
    }
    Ok(room)
}

/// Remove the requester from a room.
///
/// An emptied room record is deleted; its messages are kept.
pub async fn leave_room<S: Storage + Clone>(
    state: &AppState<S>,
    ctx: &ConnectionContext,
    room_id: &str,
) -> Result<(), AppError> {
    let room_id = validate_room_id(room_id)?;
    let guard = state.room_locks.lock(room_id).await;

    let room = owned_room(&state.storage, ctx, room_id).await?;
    if !room.has_member(ctx.user_id()) {
        return Err(AppError::Unauthorized(
            "You are not a member of this chat".into(),
        ));
    }

    let updated = state
        .storage
        .remove_room_member(room_id, ctx.user_id())
        .await?
        .ok_or_else(|| AppError::RoomNotFound(room_id.to_string()))?;

    if updated.members.is_empty() {
        state.storage.delete_room(room_id).await?;
        state.directory.remove(room_id);
        counter!(ROOM_DELETED).increment(1);
        tracing::info!(room = room_id, "last member left, room removed");
    } else {
        state.directory.refresh(&updated);
    }

    state.sessions.unbind_user(ctx.user_id(), room_id);
    state.sessions.send_to(
        ctx.id,
        ServerEvent::ChatLeft(ChatLeft {
            room_id: room_id.to_string(),
            user_id: ctx.user_id().to_string(),
            message: "Successfully left the chat".to_string(),
        }),
    );
    state
        .sessions
        .broadcast(room_id, &ServerEvent::UserLeftChat(ctx.presence(room_id)), None);

    tracing::info!(room = room_id, user = ctx.user_id(), "user left chat");
    drop(guard);
    if updated.members.is_empty() {
        state.room_locks.prune(room_id);
    }
    Ok(())
}

/// Delete a room and all of its messages
pub async fn delete_room<S: Storage + Clone>(
    state: &AppState<S>,
    ctx: &ConnectionContext,
    room_id: &str,
) -> Result<(), AppError> {
    let room_id = validate_room_id(room_id)?;
    let guard = state.room_locks.lock(room_id).await;

    owned_room(&state.storage, ctx, room_id).await?;

    state.storage.delete_room(room_id).await?;
    let removed = state.storage.delete_room_messages(room_id).await?;
    state.directory.remove(room_id);
    counter!(ROOM_DELETED).increment(1);

    state.sessions.send_to(
        ctx.id,
        ServerEvent::ChatDeleted(ChatDeleted {
            room_id: room_id.to_string(),
            message: "You have successfully deleted the chat".to_string(),
        }),
    );
    let deleted = ServerEvent::ChatDeleted(ChatDeleted {
        room_id: room_id.to_string(),
        message: "The chat has been deleted".to_string(),
    });
    let left = ServerEvent::UserLeftChat(ctx.presence(room_id));
    for conn in state.sessions.clear_room(room_id) {
        if conn != ctx.id {
            state.sessions.send_to(conn, deleted.clone());
            state.sessions.send_to(conn, left.clone());
        }
    }

    tracing::info!(room = room_id, user = ctx.user_id(), messages = removed, "chat deleted");
    drop(guard);
    state.room_locks.prune(room_id);
    Ok(())
}
