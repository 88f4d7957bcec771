//! Persistent memory store.
//!
//! One JSON document (`memory.json`) holds user preferences, contacts,
//! custom commands and a bounded conversation log:
//! ```json
//! {
//!   "user_preferences": { "voice_id": 1 },
//!   "contacts": { "john": "j@x.com" },
//!   "custom_commands": { "lights on": "scene:lights-on" },
//!   "conversations": [
//!     { "query": "...", "response": "...", "timestamp": "..." }
//!   ]
//! }
//! ```
//! Every mutation persists immediately (write-through) with an atomic
//! temp-file-then-rename. A missing or corrupt file degrades to the empty
//! default structure. An interior mutex serializes the foreground dispatch
//! flow against the reminder-event consumer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Maximum number of conversation entries kept (FIFO eviction).
pub const MAX_CONVERSATIONS: usize = 20;

// ---------------------------------------------------------------------------
// JSON schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryData {
    #[serde(default)]
    pub user_preferences: BTreeMap<String, Value>,
    #[serde(default)]
    pub conversations: Vec<ConversationEntry>,
    /// Contact name (case-folded) -> email address.
    #[serde(default)]
    pub contacts: BTreeMap<String, String>,
    /// Command phrase (case-folded) -> action string.
    #[serde(default)]
    pub custom_commands: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub query: String,
    pub response: String,
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

pub struct MemoryStore {
    path: PathBuf,
    state: Mutex<MemoryData>,
}

impl MemoryStore {
    /// Open the store at `path`, loading existing data. A missing or corrupt
    /// file yields the empty default structure and never an error.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Corrupt memory file {}: {}", path.display(), e);
                MemoryData::default()
            }),
            Err(_) => MemoryData::default(),
        };
        Self {
            path,
            state: Mutex::new(data),
        }
    }

    /// Set a user preference (last-write-wins) and persist.
    pub fn set_preference(&self, key: &str, value: impl Into<Value>) -> anyhow::Result<()> {
        let mut data = self.state.lock().unwrap();
        data.user_preferences.insert(key.to_string(), value.into());
        self.persist(&data)
    }

    /// Get a user preference, or `None` if unset.
    pub fn get_preference(&self, key: &str) -> Option<Value> {
        self.state.lock().unwrap().user_preferences.get(key).cloned()
    }

    /// String view of a preference (non-string values are skipped).
    pub fn get_preference_str(&self, key: &str) -> Option<String> {
        self.get_preference(key)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Add or update a contact. Names are case-folded.
    pub fn add_contact(&self, name: &str, email: &str) -> anyhow::Result<()> {
        let mut data = self.state.lock().unwrap();
        data.contacts
            .insert(name.to_lowercase(), email.to_string());
        self.persist(&data)
    }

    /// Look up a contact's email address, case-insensitively.
    pub fn get_contact(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .contacts
            .get(&name.to_lowercase())
            .cloned()
    }

    /// Register a custom command phrase. Phrases are case-folded.
    pub fn add_custom_command(&self, phrase: &str, action: &str) -> anyhow::Result<()> {
        let mut data = self.state.lock().unwrap();
        data.custom_commands
            .insert(phrase.to_lowercase(), action.to_string());
        self.persist(&data)
    }

    /// Find the custom command matching an utterance: exact phrase key, or
    /// the first stored phrase contained in the utterance. Custom commands
    /// have the highest dispatch priority, so this runs before any built-in
    /// keyword test.
    pub fn find_custom_command(&self, utterance: &str) -> Option<(String, String)> {
        let data = self.state.lock().unwrap();
        let normalized = utterance.to_lowercase();
        if let Some(action) = data.custom_commands.get(&normalized) {
            return Some((normalized, action.clone()));
        }
        data.custom_commands
            .iter()
            .find(|(phrase, _)| normalized.contains(phrase.as_str()))
            .map(|(phrase, action)| (phrase.clone(), action.clone()))
    }

    /// Append a conversation exchange, evicting the oldest entries so the
    /// log never holds more than [`MAX_CONVERSATIONS`].
    pub fn log_conversation(&self, query: &str, response: &str) -> anyhow::Result<()> {
        let mut data = self.state.lock().unwrap();
        data.conversations.push(ConversationEntry {
            query: query.to_string(),
            response: response.to_string(),
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        });
        if data.conversations.len() > MAX_CONVERSATIONS {
            let excess = data.conversations.len() - MAX_CONVERSATIONS;
            data.conversations.drain(..excess);
        }
        self.persist(&data)
    }

    /// The most recent `count` conversation entries, oldest first.
    pub fn recent_conversations(&self, count: usize) -> Vec<ConversationEntry> {
        let data = self.state.lock().unwrap();
        let skip = data.conversations.len().saturating_sub(count);
        data.conversations[skip..].to_vec()
    }

    // -- internal helpers --

    /// Atomic write: temp file in the same directory, then rename. A write
    /// failure is reported but the in-memory mutation stands; the caller
    /// decides whether to retry or carry on unsynced.
    fn persist(&self, data: &MemoryData) -> anyhow::Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let tmp = dir.join(format!(".memory.{}.tmp", std::process::id()));
        let json = serde_json::to_string_pretty(data)?;
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
