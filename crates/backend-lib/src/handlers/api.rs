// ============================
// crates/backend-lib/src/handlers/api.rs
// ============================
//! Identity lookup, company roster and room history.
//!
//! These endpoints authenticate with the same credential as the realtime
//! endpoint but skip its role gate.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use parley_common::{ChatMessage, Role};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::storage::Storage;
use crate::validation::validate_room_id;
use crate::AppState;

/// Envelope of the list endpoints
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ApiList<T> {
    pub success: bool,
    pub data: Vec<T>,
}

impl<T> ApiList<T> {
    fn ok(data: Vec<T>) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// The caller as seen by the store
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub user_id: String,
    pub email: Option<String>,
    pub company_id: String,
    pub position: Role,
    pub first_name: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompanyUser {
    pub user_id: String,
    pub first_name: String,
    pub email: Option<String>,
    pub position: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default)]
    pub room_id: String,
}

/// `GET /api/user`
pub async fn current_user<S: Storage + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<CurrentUser>, AppError> {
    let claim = state.verifier.authenticate(&headers)?;
    let user = state
        .storage
        .get_user(&claim.user_id)
        .await?
        .ok_or_else(|| AppError::InvalidCredential("user record not found".into()))?;

    Ok(Json(CurrentUser {
        user_id: claim.user_id,
        email: user.email,
        company_id: claim.company_id,
        position: claim.role,
        first_name: claim.display_name,
    }))
}

/// `GET /api/companyUsers`
pub async fn company_users<S: Storage + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<ApiList<CompanyUser>>, AppError> {
    let claim = state.verifier.authenticate(&headers)?;
    let users = state
        .storage
        .users_by_company(&claim.company_id)
        .await?
        .into_iter()
        .map(|user| CompanyUser {
            user_id: user.user_id,
            first_name: user.display_name,
            email: user.email,
            position: user.role,
        })
        .collect();
    Ok(ApiList::ok(users))
}

/// `GET /api/messages?roomId=...`
pub async fn room_history<S: Storage + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiList<ChatMessage>>, AppError> {
    let claim = state.verifier.authenticate(&headers)?;
    let room_id = validate_room_id(&query.room_id)?;

    let room = state
        .storage
        .get_room(room_id)
        .await?
        .filter(|room| room.is_one_on_one)
        .ok_or_else(|| AppError::RoomNotFound(room_id.to_string()))?;
    if room.company_id != claim.company_id || !room.has_member(&claim.user_id) {
        return Err(AppError::Unauthorized(
            "You are not authorized to access this chat".into(),
        ));
    }

    let messages = state.storage.messages_for_room(room_id).await?;
    tracing::debug!(room = room_id, count = messages.len(), "history served");
    Ok(ApiList::ok(messages))
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}
