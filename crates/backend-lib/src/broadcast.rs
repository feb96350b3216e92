// ============================
// crates/backend-lib/src/broadcast.rs
// ============================
//! Message send, edit, delete and typing notices.
//!
//! Every operation checks directory membership first, then the connection's
//! binding, then its own preconditions. Durable events are persisted before
//! they are broadcast, under the room's lifecycle lock so a concurrent leave
//! or delete cannot slip between the membership check and the write.

use chrono::Utc;
use metrics::counter;
use parley_common::{ChatMessage, MessageDeleted, ServerEvent, UserStoppedTyping};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics::{MESSAGE_DELETED, MESSAGE_EDITED, MESSAGE_SENT};
use crate::session::ConnectionContext;
use crate::storage::Storage;
use crate::validation::{parse_message_id, validate_body, validate_room_id};
use crate::AppState;

/// Directory membership check shared by every room scoped event
fn authorize_member<S>(
    state: &AppState<S>,
    ctx: &ConnectionContext,
    room_id: &str,
    denial: &str,
) -> Result<(), AppError> {
    if state.directory.is_member(room_id, ctx.user_id()) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(denial.to_string()))
    }
}

/// Membership, then binding.
///
/// Non-members are turned away before touching the lock table; members are
/// checked again once the room lock is held.
async fn authorize<'a, S>(
    state: &AppState<S>,
    ctx: &ConnectionContext,
    room_id: &'a str,
    denial: &str,
) -> Result<(&'a str, OwnedMutexGuard<()>), AppError> {
    let room_id = validate_room_id(room_id)?;
    authorize_member(state, ctx, room_id, denial)?;

    let guard = state.room_locks.lock(room_id).await;
    authorize_member(state, ctx, room_id, denial)?;
    state.sessions.resolve(ctx.id, room_id)?;
    Ok((room_id, guard))
}

pub async fn send<S: Storage + Clone>(
    state: &AppState<S>,
    ctx: &ConnectionContext,
    room_id: &str,
    body: &str,
) -> Result<ChatMessage, AppError> {
    let (room_id, _guard) = authorize(
        state,
        ctx,
        room_id,
        "You are not authorized to send messages to this chat.",
    )
    .await?;
    let body = validate_body(body, "Message")?;

    let message = ChatMessage {
        id: Uuid::new_v4(),
        author_id: ctx.claim.user_id.clone(),
        author_name: ctx.claim.display_name.clone(),
        body: body.to_string(),
        room_id: room_id.to_string(),
        company_id: ctx.claim.company_id.clone(),
        created_at: Utc::now(),
        updated_at: None,
    };
    state.storage.insert_message(&message).await?;
    counter!(MESSAGE_SENT).increment(1);
    tracing::debug!(room = room_id, id = %message.id, "message saved");

    state
        .sessions
        .broadcast(room_id, &ServerEvent::NewMessage(message.clone()), None);
    Ok(message)
}

/// Load a message of the room and check the requester wrote it
async fn authored_message<S: Storage>(
    storage: &S,
    ctx: &ConnectionContext,
    room_id: &str,
    message_id: Uuid,
    denial: &str,
) -> Result<ChatMessage, AppError> {
    let message = storage
        .get_message(room_id, message_id)
        .await?
        .ok_or_else(|| AppError::MessageNotFound(message_id.to_string()))?;
    if message.author_id != ctx.claim.user_id {
        return Err(AppError::Unauthorized(denial.to_string()));
    }
    Ok(message)
}

pub async fn edit<S: Storage + Clone>(
    state: &AppState<S>,
    ctx: &ConnectionContext,
    room_id: &str,
    message_id: &str,
    new_body: &str,
) -> Result<ChatMessage, AppError> {
    let (room_id, _guard) = authorize(
        state,
        ctx,
        room_id,
        "You are not authorized to edit messages in this chat.",
    )
    .await?;
    let message_id = parse_message_id(message_id)?;
    let new_body = validate_body(new_body, "New message")?;

    authored_message(
        &state.storage,
        ctx,
        room_id,
        message_id,
        "You are not authorized to edit this message",
    )
    .await?;

    let updated = state
        .storage
        .update_message_body(room_id, message_id, new_body, Utc::now())
        .await?
        .ok_or_else(|| AppError::MessageNotFound(message_id.to_string()))?;
    counter!(MESSAGE_EDITED).increment(1);
    tracing::debug!(room = room_id, id = %message_id, "message updated");

    state
        .sessions
        .broadcast(room_id, &ServerEvent::MessageUpdated(updated.clone()), None);
    Ok(updated)
}

pub async fn delete<S: Storage + Clone>(
    state: &AppState<S>,
    ctx: &ConnectionContext,
    room_id: &str,
    message_id: &str,
) -> Result<(), AppError> {
    let (room_id, _guard) = authorize(
        state,
        ctx,
        room_id,
        "You are not authorized to delete messages in this chat.",
    )
    .await?;
    let message_id = parse_message_id(message_id)?;

    authored_message(
        &state.storage,
        ctx,
        room_id,
        message_id,
        "You are not authorized to delete this message",
    )
    .await?;

    if !state.storage.delete_message(room_id, message_id).await? {
        return Err(AppError::MessageNotFound(message_id.to_string()));
    }
    counter!(MESSAGE_DELETED).increment(1);
    tracing::debug!(room = room_id, id = %message_id, "message deleted");

    state.sessions.broadcast(
        room_id,
        &ServerEvent::MessageDeleted(MessageDeleted { message_id }),
        None,
    );
    Ok(())
}

/// Typing checks share the membership rule but ignore unbound connections
fn typing_target<'a, S>(
    state: &AppState<S>,
    ctx: &ConnectionContext,
    room_id: &'a str,
    denial: &str,
) -> Result<Option<&'a str>, AppError> {
    let room_id = validate_room_id(room_id)?;
    authorize_member(state, ctx, room_id, denial)?;
    Ok(state.sessions.is_bound(ctx.id, room_id).then_some(room_id))
}

pub fn typing_start<S>(
    state: &AppState<S>,
    ctx: &ConnectionContext,
    room_id: &str,
) -> Result<(), AppError> {
    let denial = "You are not authorized to send typing events to this chat.";
    if let Some(room_id) = typing_target(state, ctx, room_id, denial)? {
        state.sessions.broadcast(
            room_id,
            &ServerEvent::UserTyping(ctx.presence(room_id)),
            Some(ctx.id),
        );
    }
    Ok(())
}

pub fn typing_stop<S>(
    state: &AppState<S>,
    ctx: &ConnectionContext,
    room_id: &str,
) -> Result<(), AppError> {
    let denial = "You are not authorized to send stopTyping events to this chat.";
    if let Some(room_id) = typing_target(state, ctx, room_id, denial)? {
        state.sessions.broadcast(
            room_id,
            &ServerEvent::UserStoppedTyping(UserStoppedTyping {
                user_id: ctx.claim.user_id.clone(),
                room_id: room_id.to_string(),
            }),
            Some(ctx.id),
        );
    }
    Ok(())
}
