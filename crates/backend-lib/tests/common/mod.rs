//! Shared setup for the backend-lib integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backend_lib::{
    auth::{IdentityClaim, TokenClaims},
    config::Settings,
    error::AppError,
    storage::{FlatFileStorage, Storage},
    websocket::WebSocketHandler,
    AppState,
};
use chrono::{DateTime, Utc};
use parley_common::{ChatMessage, ClientEvent, Role, Room, ServerEvent, UserRecord};
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

pub const SECRET: &str = "integration-secret";

pub type TestState = Arc<AppState<FlatFileStorage>>;

fn settings(temp_dir: &TempDir) -> Settings {
    Settings {
        jwt_secret: SECRET.to_string(),
        data_dir: temp_dir.path().to_path_buf(),
        ..Settings::default()
    }
}

/// App state over a fresh store; keep the `TempDir` alive for the test
pub fn setup() -> (TestState, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let storage = FlatFileStorage::new(temp_dir.path()).unwrap();
    let settings = settings(&temp_dir);
    (Arc::new(AppState::new(storage, settings)), temp_dir)
}

/// Flat-file store that stalls chosen operations to widen race windows
#[derive(Clone)]
pub struct SlowStorage {
    inner: FlatFileStorage,
    /// Sleep before answering `rooms_for_user`
    pub listing_delay: Duration,
    /// Sleep after `delete_room_messages` has removed the messages
    pub purge_delay: Duration,
}

#[async_trait]
impl Storage for SlowStorage {
    async fn insert_room_if_absent(&self, room: Room) -> Result<(Room, bool), AppError> {
        self.inner.insert_room_if_absent(room).await
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, AppError> {
        self.inner.get_room(room_id).await
    }

    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<Room>, AppError> {
        let rooms = self.inner.rooms_for_user(user_id).await?;
        tokio::time::sleep(self.listing_delay).await;
        Ok(rooms)
    }

    async fn remove_room_member(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<Room>, AppError> {
        self.inner.remove_room_member(room_id, user_id).await
    }

    async fn add_room_member(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<Room>, AppError> {
        self.inner.add_room_member(room_id, user_id).await
    }

    async fn delete_room(&self, room_id: &str) -> Result<bool, AppError> {
        self.inner.delete_room(room_id).await
    }

    async fn insert_message(&self, message: &ChatMessage) -> Result<(), AppError> {
        self.inner.insert_message(message).await
    }

    async fn get_message(
        &self,
        room_id: &str,
        message_id: Uuid,
    ) -> Result<Option<ChatMessage>, AppError> {
        self.inner.get_message(room_id, message_id).await
    }

    async fn update_message_body(
        &self,
        room_id: &str,
        message_id: Uuid,
        body: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<ChatMessage>, AppError> {
        self.inner
            .update_message_body(room_id, message_id, body, updated_at)
            .await
    }

    async fn delete_message(&self, room_id: &str, message_id: Uuid) -> Result<bool, AppError> {
        self.inner.delete_message(room_id, message_id).await
    }

    async fn delete_room_messages(&self, room_id: &str) -> Result<usize, AppError> {
        let removed = self.inner.delete_room_messages(room_id).await?;
        tokio::time::sleep(self.purge_delay).await;
        Ok(removed)
    }

    async fn messages_for_room(&self, room_id: &str) -> Result<Vec<ChatMessage>, AppError> {
        self.inner.messages_for_room(room_id).await
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, AppError> {
        self.inner.get_user(user_id).await
    }

    async fn put_user(&self, user: &UserRecord) -> Result<(), AppError> {
        self.inner.put_user(user).await
    }

    async fn users_by_company(&self, company_id: &str) -> Result<Vec<UserRecord>, AppError> {
        self.inner.users_by_company(company_id).await
    }
}

pub type SlowState = Arc<AppState<SlowStorage>>;

/// App state whose store stalls listing and purging by the given delays
pub fn setup_slow(listing_delay: Duration, purge_delay: Duration) -> (SlowState, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let storage = SlowStorage {
        inner: FlatFileStorage::new(temp_dir.path()).unwrap(),
        listing_delay,
        purge_delay,
    };
    let settings = settings(&temp_dir);
    (Arc::new(AppState::new(storage, settings)), temp_dir)
}

pub async fn seed_user<S: Storage + Clone>(
    state: &Arc<AppState<S>>,
    user_id: &str,
    role: Role,
    company_id: &str,
) {
    state
        .storage
        .put_user(&UserRecord {
            user_id: user_id.to_string(),
            display_name: user_id.to_uppercase(),
            email: Some(format!("{user_id}@example.com")),
            role,
            company_id: company_id.to_string(),
        })
        .await
        .unwrap();
}

pub fn claim(user_id: &str, company_id: &str) -> IdentityClaim {
    IdentityClaim {
        user_id: user_id.to_string(),
        role: Role::User,
        company_id: company_id.to_string(),
        display_name: user_id.to_uppercase(),
    }
}

pub fn token(state: &TestState, user_id: &str, position: &str, company_id: &str) -> String {
    state
        .verifier
        .codec()
        .sign(&TokenClaims {
            user_id: user_id.to_string(),
            position: position.to_string(),
            company_id: company_id.to_string(),
            first_name: Some(user_id.to_uppercase()),
            exp: Utc::now().timestamp() + 3600,
            iat: Some(Utc::now().timestamp()),
        })
        .unwrap()
}

/// An in-process connection: events go in as JSON frames, come out of `rx`
pub struct TestClient<S: Storage + Clone + 'static = FlatFileStorage> {
    pub handler: WebSocketHandler<S>,
    pub rx: mpsc::Receiver<ServerEvent>,
}

impl<S: Storage + Clone + 'static> TestClient<S> {
    pub async fn connect(state: &Arc<AppState<S>>, user_id: &str, company_id: &str) -> Self {
        Self::connect_as(state, claim(user_id, company_id)).await
    }

    pub async fn connect_as(state: &Arc<AppState<S>>, claim: IdentityClaim) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let handler = WebSocketHandler::connect(state.clone(), claim, tx);
        handler.on_open().await;
        Self { handler, rx }
    }

    pub async fn send(&self, event: ClientEvent) {
        let frame = serde_json::to_string(&event).unwrap();
        self.handler.handle_text(&frame).await;
    }

    /// Everything queued so far
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn errors(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::ErrorMessage(reason) => Some(reason),
                _ => None,
            })
            .collect()
    }
}
