//! File-backed conversation store.
//!
//! Conversations live in memory in creation order and are flushed to a single
//! `chats.json` document (`{"chats": [...]}`) on every mutation. An empty path
//! keeps the store memory-only.
//!
//! Storage location: `~/.tinyrag/chats.json`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tinyrag_core::error::MemoryError;
use tinyrag_core::message::{Conversation, Role};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Default, Serialize, Deserialize)]
struct ChatFile {
    #[serde(default)]
    chats: Vec<Conversation>,
}

/// Conversation history shared by the HTTP API and the CLI.
pub struct ChatStore {
    path: Option<PathBuf>,
    chats: RwLock<Vec<Conversation>>,
}

impl ChatStore {
    /// Open the store at `path`, loading any persisted conversations.
    ///
    /// A missing file starts empty. An unreadable or corrupt file is logged
    /// and also starts empty; it is overwritten on the next mutation.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Self::ephemeral();
        }
        let chats = load_from_disk(&path);
        debug!(path = %path.display(), count = chats.len(), "Chat store loaded");
        Self {
            path: Some(path),
            chats: RwLock::new(chats),
        }
    }

    /// A store that never touches the filesystem.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            chats: RwLock::new(Vec::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Start a new, empty conversation.
    pub async fn create(&self, persona_id: Option<String>) -> Result<Conversation, MemoryError> {
        let conv = Conversation::new(persona_id.filter(|p| !p.is_empty()));
        let mut chats = self.chats.write().await;
        chats.push(conv.clone());
        self.flush(&chats)?;
        Ok(conv)
    }

    pub async fn get(&self, id: &str) -> Option<Conversation> {
        self.chats.read().await.iter().find(|c| c.id == id).cloned()
    }

    /// All conversations, newest first.
    pub async fn list(&self) -> Vec<Conversation> {
        self.chats.read().await.iter().rev().cloned().collect()
    }

    /// Append a message. Returns `false` if the conversation does not exist.
    pub async fn append(&self, id: &str, role: Role, content: &str) -> Result<bool, MemoryError> {
        let mut chats = self.chats.write().await;
        let Some(conv) = chats.iter_mut().find(|c| c.id == id) else {
            return Ok(false);
        };
        conv.push(role, content);
        self.flush(&chats)?;
        Ok(true)
    }

    /// Pin a persona to a conversation. Returns `false` if it does not exist.
    pub async fn set_persona(&self, id: &str, persona_id: &str) -> Result<bool, MemoryError> {
        let mut chats = self.chats.write().await;
        let Some(conv) = chats.iter_mut().find(|c| c.id == id) else {
            return Ok(false);
        };
        conv.persona_id = Some(persona_id.to_string()).filter(|p| !p.is_empty());
        conv.updated = chrono::Utc::now();
        self.flush(&chats)?;
        Ok(true)
    }

    /// Remove a conversation. Returns `false` if it did not exist.
    pub async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let mut chats = self.chats.write().await;
        let before = chats.len();
        chats.retain(|c| c.id != id);
        if chats.len() == before {
            return Ok(false);
        }
        self.flush(&chats)?;
        Ok(true)
    }

    pub async fn len(&self) -> usize {
        self.chats.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chats.read().await.is_empty()
    }

    fn flush(&self, chats: &[Conversation]) -> Result<(), MemoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let payload = ChatFile { chats: chats.to_vec() };
        tinyrag_config::write_atomic(path, &payload)
            .map_err(|e| MemoryError::Storage(format!("Failed to write chats: {e}")))
    }
}

fn load_from_disk(path: &Path) -> Vec<Conversation> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read chats, starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_str::<ChatFile>(&raw) {
        Ok(file) => file.chats,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not parse chats, starting empty");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_append_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chats.json");

        let store = ChatStore::open(&path);
        let conv = store.create(None).await.unwrap();
        assert!(conv.id.starts_with("chat-"));
        assert!(store.append(&conv.id, Role::User, "What is Mars?").await.unwrap());
        assert!(store.append(&conv.id, Role::Assistant, "A planet.").await.unwrap());

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["chats"][0]["title"], "What is Mars?");

        let reopened = ChatStore::open(&path);
        let loaded = reopened.get(&conv.id).await.unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = ChatStore::ephemeral();
        let first = store.create(None).await.unwrap();
        let second = store.create(Some("persona-default".into())).await.unwrap();

        let listed = store.list().await;
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert_eq!(listed[0].persona_id.as_deref(), Some("persona-default"));
    }

    #[tokio::test]
    async fn unknown_ids_are_reported() {
        let store = ChatStore::ephemeral();
        assert!(!store.append("chat-0", Role::User, "hi").await.unwrap());
        assert!(!store.set_persona("chat-0", "p").await.unwrap());
        assert!(!store.delete("chat-0").await.unwrap());
        assert!(store.get("chat-0").await.is_none());
    }

    #[tokio::test]
    async fn delete_and_persona_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chats.json");
        let store = ChatStore::open(&path);
        let keep = store.create(None).await.unwrap();
        let gone = store.create(None).await.unwrap();

        assert!(store.set_persona(&keep.id, "persona-x").await.unwrap());
        assert!(store.delete(&gone.id).await.unwrap());

        let reopened = ChatStore::open(&path);
        assert_eq!(reopened.len().await, 1);
        assert_eq!(
            reopened.get(&keep.id).await.unwrap().persona_id.as_deref(),
            Some("persona-x")
        );
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chats.json");
        std::fs::write(&path, "not json").unwrap();

        let store = ChatStore::open(&path);
        assert!(store.is_empty().await);
        store.create(None).await.unwrap();
        assert_eq!(ChatStore::open(&path).len().await, 1);
    }

    #[test]
    fn empty_path_is_memory_only() {
        let store = ChatStore::open("");
        assert!(store.path().is_none());
    }
}
