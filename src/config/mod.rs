//! Assistant configuration and data directory paths.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

fn default_assistant_name() -> String {
    "Buddy".to_string()
}

fn default_wake_word() -> String {
    "hey buddy".to_string()
}

fn default_listen_timeout_secs() -> u64 {
    5
}

fn default_city() -> String {
    "New York".to_string()
}

fn default_llm_model() -> String {
    "meta-llama/Llama-3.3-70B-Instruct-Turbo-Free".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful, respectful and honest assistant. Always answer as \
     helpfully as possible, while being safe."
        .to_string()
}

/// Top-level assistant_config.json shape.
///
/// Every field has a default so a partial or missing file still yields a
/// usable configuration. API keys can also come from the environment (see
/// [`AssistantConfig::load`]), so the JSON file never has to hold secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub assistant_name: String,
    pub wake_word: String,
    /// Timeout for a normal listen cycle, in seconds.
    pub listen_timeout_secs: u64,
    /// Default city for weather queries without an "in <city>" clause.
    pub default_city: String,
    pub weather_api_key: Option<String>,
    pub news_api_key: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_system_prompt: String,
    /// JSON mail API endpoint; unset means email is unconfigured.
    pub mail_endpoint: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: Option<String>,
    pub music_dir: Option<PathBuf>,
    /// Path to the code editor launched by the "open code" intent.
    pub editor_path: Option<PathBuf>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            wake_word: default_wake_word(),
            listen_timeout_secs: default_listen_timeout_secs(),
            default_city: default_city(),
            weather_api_key: None,
            news_api_key: None,
            llm_api_key: None,
            llm_model: default_llm_model(),
            llm_system_prompt: default_system_prompt(),
            mail_endpoint: None,
            mail_api_key: None,
            mail_from: None,
            music_dir: None,
            editor_path: None,
        }
    }
}

impl AssistantConfig {
    /// Read assistant_config.json from the data directory and apply
    /// environment overrides for secrets.
    pub fn load() -> Self {
        let mut config: AssistantConfig =
            read_json_file(&get_config_path()).unwrap_or_default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WEATHER_API_KEY") {
            self.weather_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("NEWS_API_KEY") {
            self.news_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("TOGETHER_API_KEY") {
            self.llm_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("MAIL_ENDPOINT") {
            self.mail_endpoint = Some(v);
        }
        if let Ok(v) = std::env::var("MAIL_API_KEY") {
            self.mail_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("MAIL_FROM") {
            self.mail_from = Some(v);
        }
        if let Ok(v) = std::env::var("MUSIC_DIR") {
            self.music_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("EDITOR_PATH") {
            self.editor_path = Some(PathBuf::from(v));
        }
    }
}

/// Assistant data directory: `<config base>/buddy/data`.
///
/// The config base comes from the `dirs` crate: `$XDG_CONFIG_HOME` (or
/// `~/.config`) on Linux, `%APPDATA%` on Windows, `~/Library/Application
/// Support` on macOS. A machine with no resolvable home falls back to the
/// working directory.
pub fn get_data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("buddy")
        .join("data")
}

/// Path to assistant_config.json.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("assistant_config.json")
}

/// Path to memory.json (preferences, contacts, custom commands, log).
pub fn get_memory_path() -> PathBuf {
    get_data_dir().join("memory.json")
}

/// Path to reminders.json.
pub fn get_reminders_path() -> PathBuf {
    get_data_dir().join("reminders.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
