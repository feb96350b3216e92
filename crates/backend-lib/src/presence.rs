// ============================
// crates/backend-lib/src/presence.rs
// ============================
//! Connection arrival and departure.

use parley_common::ServerEvent;

use crate::error::AppError;
use crate::rooms::chat_created;
use crate::session::ConnectionContext;
use crate::storage::Storage;
use crate::AppState;

/// Bind a fresh connection to every persisted room of its user and announce
/// each one with `chatCreated`.
///
/// Each room is re-read under its lifecycle lock, so a leave or delete that
/// lands during the sync is never undone by a stale directory entry.
/// Returns how many rooms were synced.
pub async fn initial_sync<S: Storage + Clone>(
    state: &AppState<S>,
    ctx: &ConnectionContext,
) -> Result<usize, AppError> {
    let listed = state.storage.rooms_for_user(ctx.user_id()).await?;
    let mut synced = 0;
    for room_id in listed.into_iter().map(|room| room.room_id) {
        let guard = state.room_locks.lock(&room_id).await;
        let current = state
            .storage
            .get_room(&room_id)
            .await?
            .filter(|room| room.is_one_on_one && room.has_member(ctx.user_id()));
        let Some(room) = current else {
            drop(guard);
            state.room_locks.prune(&room_id);
            tracing::debug!(conn = %ctx.id, room = %room_id, "room changed during sync, skipped");
            continue;
        };

        state.directory.refresh(&room);
        state.sessions.bind(ctx.id, &room.room_id);
        let other = room.counterpart_of(ctx.user_id()).unwrap_or_default();
        state.sessions.send_to(ctx.id, chat_created(&room, other));
        synced += 1;
    }
    tracing::debug!(conn = %ctx.id, user = ctx.user_id(), rooms = synced, "initial sync done");
    Ok(synced)
}

/// Tell the rooms a connection was bound to that its user went away, then
/// forget the connection. Persisted membership is untouched.
pub fn disconnect<S>(state: &AppState<S>, ctx: &ConnectionContext) {
    for room_id in state.sessions.rooms_of(ctx.id) {
        state.sessions.broadcast(
            &room_id,
            &ServerEvent::UserLeft(ctx.presence(&room_id)),
            Some(ctx.id),
        );
    }
    state.sessions.deregister(ctx.id);
}
