// ============================
// crates/backend-lib/src/storage.rs
// ============================
//! Storage abstraction with flat-file implementation.
//!
//! The store is the authority for rooms, messages and users. Every mutation
//! is a single atomic operation from the point of view of other callers.
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_common::{ChatMessage, Room, UserRecord};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs as tokio_fs, sync::Mutex};
use uuid::Uuid;

use crate::error::AppError;

/// Trait for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist `room` unless a room with the same id exists.
    ///
    /// Returns the stored room and whether this call created it.
    async fn insert_room_if_absent(&self, room: Room) -> Result<(Room, bool), AppError>;

    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, AppError>;

    /// One-on-one rooms listing `user_id` as a member, oldest first
    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<Room>, AppError>;

    /// Atomically drop `user_id` from the room's members.
    ///
    /// Returns the updated room, or `None` if the room does not exist.
    async fn remove_room_member(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<Room>, AppError>;

    /// Atomically put `user_id` back into the room's members, keeping them sorted.
    ///
    /// Returns the updated room, or `None` if the room does not exist.
    async fn add_room_member(&self, room_id: &str, user_id: &str)
        -> Result<Option<Room>, AppError>;

    /// Delete the room record; `false` if it did not exist
    async fn delete_room(&self, room_id: &str) -> Result<bool, AppError>;

    async fn insert_message(&self, message: &ChatMessage) -> Result<(), AppError>;

    async fn get_message(
        &self,
        room_id: &str,
        message_id: Uuid,
    ) -> Result<Option<ChatMessage>, AppError>;

    /// Replace the body and stamp `updated_at`; `None` if no such message
    async fn update_message_body(
        &self,
        room_id: &str,
        message_id: Uuid,
        body: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<ChatMessage>, AppError>;

    async fn delete_message(&self, room_id: &str, message_id: Uuid) -> Result<bool, AppError>;

    /// Remove every message of a room, returning how many were removed
    async fn delete_room_messages(&self, room_id: &str) -> Result<usize, AppError>;

    /// Messages of a room, oldest first
    async fn messages_for_room(&self, room_id: &str) -> Result<Vec<ChatMessage>, AppError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, AppError>;

    async fn put_user(&self, user: &UserRecord) -> Result<(), AppError>;

    async fn users_by_company(&self, company_id: &str) -> Result<Vec<UserRecord>, AppError>;
}

/// Flat-file implementation of the Storage trait.
///
/// Layout under the root:
/// `rooms/<roomId>.json`, `messages/<roomId>.json`, `users/<userId>.json`.
#[derive(Clone)]
pub struct FlatFileStorage {
    root: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Arc<Mutex<()>>,
}

impl FlatFileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("rooms"))?;
        fs::create_dir_all(root.join("messages"))?;
        fs::create_dir_all(root.join("users"))?;
        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn doc_path(&self, collection: &str, id: &str) -> Result<PathBuf, AppError> {
        let safe = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !safe {
            return Err(AppError::InvalidId(format!("unusable document id {id:?}")));
        }
        Ok(self.root.join(collection).join(format!("{id}.json")))
    }

    async fn read_doc<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, AppError> {
        match tokio_fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write via a temp file + rename so readers never see a torn document
    async fn write_doc<T: Serialize + ?Sized>(path: &Path, doc: &T) -> Result<(), AppError> {
        let json = serde_json::to_vec_pretty(doc)?;
        let tmp = path.with_extension("json.tmp");
        tokio_fs::write(&tmp, json).await?;
        tokio_fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn remove_doc(path: &Path) -> Result<bool, AppError> {
        match tokio_fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_collection<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, AppError> {
        let mut docs = Vec::new();
        let mut entries = tokio_fs::read_dir(self.root.join(collection)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(doc) = Self::read_doc(&path).await? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    async fn room_messages(&self, room_id: &str) -> Result<(PathBuf, Vec<ChatMessage>), AppError> {
        let path = self.doc_path("messages", room_id)?;
        let messages = Self::read_doc(&path).await?.unwrap_or_default();
        Ok((path, messages))
    }
}

#[async_trait]
impl Storage for FlatFileStorage {
    async fn insert_room_if_absent(&self, room: Room) -> Result<(Room, bool), AppError> {
        let path = self.doc_path("rooms", &room.room_id)?;
        let _guard = self.write_lock.lock().await;

        if let Some(existing) = Self::read_doc::<Room>(&path).await? {
            return Ok((existing, false));
        }
        Self::write_doc(&path, &room).await?;
        Ok((room, true))
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, AppError> {
        let path = self.doc_path("rooms", room_id)?;
        Self::read_doc(&path).await
    }

    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<Room>, AppError> {
        let mut rooms: Vec<Room> = self
            .read_collection::<Room>("rooms")
            .await?
            .into_iter()
            .filter(|room| room.is_one_on_one && room.has_member(user_id))
            .collect();
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rooms)
    }

    async fn remove_room_member(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<Room>, AppError> {
        let path = self.doc_path("rooms", room_id)?;
        let _guard = self.write_lock.lock().await;

        let Some(mut room) = Self::read_doc::<Room>(&path).await? else {
            return Ok(None);
        };
        room.members.retain(|member| member != user_id);
        Self::write_doc(&path, &room).await?;
        Ok(Some(room))
    }

    async fn add_room_member(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<Room>, AppError> {
        let path = self.doc_path("rooms", room_id)?;
        let _guard = self.write_lock.lock().await;

        let Some(mut room) = Self::read_doc::<Room>(&path).await? else {
            return Ok(None);
        };
        if !room.has_member(user_id) {
            room.members.push(user_id.to_string());
            room.members.sort();
            Self::write_doc(&path, &room).await?;
        }
        Ok(Some(room))
    }

    async fn delete_room(&self, room_id: &str) -> Result<bool, AppError> {
        let path = self.doc_path("rooms", room_id)?;
        let _guard = self.write_lock.lock().await;
        Self::remove_doc(&path).await
    }

    async fn insert_message(&self, message: &ChatMessage) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let (path, mut messages) = self.room_messages(&message.room_id).await?;
        messages.push(message.clone());
        Self::write_doc(&path, &messages).await
    }

    async fn get_message(
        &self,
        room_id: &str,
        message_id: Uuid,
    ) -> Result<Option<ChatMessage>, AppError> {
        let (_, messages) = self.room_messages(room_id).await?;
        Ok(messages.into_iter().find(|m| m.id == message_id))
    }

    async fn update_message_body(
        &self,
        room_id: &str,
        message_id: Uuid,
        body: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<ChatMessage>, AppError> {
        let _guard = self.write_lock.lock().await;
        let (path, mut messages) = self.room_messages(room_id).await?;

        let Some(message) = messages.iter_mut().find(|m| m.id == message_id) else {
            return Ok(None);
        };
        message.body = body.to_string();
        message.updated_at = Some(updated_at);
        let updated = message.clone();

        Self::write_doc(&path, &messages).await?;
        Ok(Some(updated))
    }

    async fn delete_message(&self, room_id: &str, message_id: Uuid) -> Result<bool, AppError> {
        let _guard = self.write_lock.lock().await;
        let (path, mut messages) = self.room_messages(room_id).await?;

        let before = messages.len();
        messages.retain(|m| m.id != message_id);
        if messages.len() == before {
            return Ok(false);
        }
        Self::write_doc(&path, &messages).await?;
        Ok(true)
    }

    async fn delete_room_messages(&self, room_id: &str) -> Result<usize, AppError> {
        let _guard = self.write_lock.lock().await;
        let (path, messages) = self.room_messages(room_id).await?;
        Self::remove_doc(&path).await?;
        Ok(messages.len())
    }

    async fn messages_for_room(&self, room_id: &str) -> Result<Vec<ChatMessage>, AppError> {
        let (_, mut messages) = self.room_messages(room_id).await?;
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, AppError> {
        let path = self.doc_path("users", user_id)?;
        Self::read_doc(&path).await
    }

    async fn put_user(&self, user: &UserRecord) -> Result<(), AppError> {
        let path = self.doc_path("users", &user.user_id)?;
        let _guard = self.write_lock.lock().await;
        Self::write_doc(&path, user).await
    }

    async fn users_by_company(&self, company_id: &str) -> Result<Vec<UserRecord>, AppError> {
        let mut users: Vec<UserRecord> = self
            .read_collection::<UserRecord>("users")
            .await?
            .into_iter()
            .filter(|user| user.company_id == company_id)
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(users)
    }
}
