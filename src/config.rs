use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use which::which;

use crate::{DeskError, Result};

/// Settings for the hosted generative-AI service.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the REST API
    pub endpoint: String,

    /// Model used for text, translation and media analysis
    pub text_model: String,

    /// Model used for speech synthesis
    pub speech_model: String,

    /// Model used for image generation
    pub image_model: String,

    /// Model used for long-running video generation
    pub video_model: String,

    /// Websocket endpoint of the live audio API
    pub live_endpoint: String,

    /// Model used for live voice sessions
    pub live_model: String,

    /// Name of the environment variable holding the API key
    pub api_key_env: String,

    /// Per-request timeout (in seconds)
    pub timeout_secs: u64,

    /// Delay between polls of a long-running operation (in seconds)
    pub video_poll_secs: u64,

    /// Maximum number of polls before giving up
    pub video_max_polls: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            image_model: "gemini-2.5-flash-image".to_string(),
            video_model: "veo-3.0-generate-preview".to_string(),
            live_endpoint: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
            live_model: "gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 60,
            video_poll_secs: 10,
            video_max_polls: 60,
        }
    }
}

impl GatewayConfig {
    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).map_err(|_| DeskError::ConfigError {
            message: format!("environment variable {} is not set", self.api_key_env),
        })
    }
}

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding the key-value store
    pub data_dir: PathBuf,

    /// Directory for the one-file-per-note mirror
    pub mirror_dir: PathBuf,

    /// Whether to mirror notes as flat files
    pub mirror_notes: bool,

    /// Default directory for exported archives
    pub export_dir: PathBuf,

    /// Command printing the clipboard text on stdout
    pub clipboard_command: Option<String>,

    /// How often to poll the clipboard (in milliseconds)
    pub clipboard_poll_ms: u64,

    /// Whether text already on the clipboard at startup becomes a note
    pub capture_initial_clipboard: bool,

    /// AI service settings
    pub gateway: GatewayConfig,
}

impl Default for Config {
    fn default() -> Self {
        let (data_dir, export_dir) = match ProjectDirs::from("dev", "studydesk", "studydesk") {
            Some(dirs) => (dirs.data_dir().to_path_buf(), dirs.data_dir().join("exports")),
            None => (PathBuf::from(".studydesk"), PathBuf::from(".studydesk/exports")),
        };

        Self {
            mirror_dir: data_dir.join("mirror"),
            data_dir,
            mirror_notes: false,
            export_dir,
            clipboard_command: None,
            clipboard_poll_ms: 1000,
            capture_initial_clipboard: false,
            gateway: GatewayConfig::default(),
        }
    }
}

impl Config {
    /// Default location of the configuration file
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("dev", "studydesk", "studydesk")
            .map(|dirs| dirs.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from(".studydesk/config.json"))
    }

    /// Loads the configuration from `path`, using defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| DeskError::ConfigError {
            message: format!("invalid config file {}: {}", path.display(), e),
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Writes the configuration to `path` as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|_| DeskError::DirectoryError {
                    path: parent.to_path_buf(),
                })?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Moves the key-value store to `dir`. The mirror follows only while it
    /// still sits at its default place next to the store.
    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        if self.mirror_dir == self.data_dir.join("mirror") {
            self.mirror_dir = dir.join("mirror");
        }
        self.data_dir = dir;
        self
    }

    /// Applies a `key=value` override.
    pub fn set(&mut self, assignment: &str) -> Result<()> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| DeskError::ConfigError {
                message: format!("expected key=value, got '{}'", assignment),
            })?;
        let value = value.trim();

        let invalid = |e: &dyn std::fmt::Display| DeskError::ConfigError {
            message: format!("invalid value for {}: {}", key.trim(), e),
        };

        match key.trim() {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "mirror_dir" => self.mirror_dir = PathBuf::from(value),
            "mirror_notes" => self.mirror_notes = value.parse().map_err(|e| invalid(&e))?,
            "export_dir" => self.export_dir = PathBuf::from(value),
            "clipboard_command" => {
                self.clipboard_command = (!value.is_empty()).then(|| value.to_string())
            }
            "clipboard_poll_ms" => {
                self.clipboard_poll_ms = value.parse().map_err(|e| invalid(&e))?
            }
            "capture_initial_clipboard" => {
                self.capture_initial_clipboard = value.parse().map_err(|e| invalid(&e))?
            }
            "gateway.endpoint" => self.gateway.endpoint = value.to_string(),
            "gateway.text_model" => self.gateway.text_model = value.to_string(),
            "gateway.speech_model" => self.gateway.speech_model = value.to_string(),
            "gateway.image_model" => self.gateway.image_model = value.to_string(),
            "gateway.video_model" => self.gateway.video_model = value.to_string(),
            "gateway.live_endpoint" => self.gateway.live_endpoint = value.to_string(),
            "gateway.live_model" => self.gateway.live_model = value.to_string(),
            "gateway.api_key_env" => self.gateway.api_key_env = value.to_string(),
            "gateway.timeout_secs" => {
                self.gateway.timeout_secs = value.parse().map_err(|e| invalid(&e))?
            }
            "gateway.video_poll_secs" => {
                self.gateway.video_poll_secs = value.parse().map_err(|e| invalid(&e))?
            }
            "gateway.video_max_polls" => {
                self.gateway.video_max_polls = value.parse().map_err(|e| invalid(&e))?
            }
            other => {
                return Err(DeskError::ConfigError {
                    message: format!("unknown setting '{}'", other),
                })
            }
        }
        Ok(())
    }

    // Smart fallbacks when no clipboard command is configured
    pub fn get_clipboard_command(&self) -> Option<String> {
        // First try the configured command
        if let Some(command) = &self.clipboard_command {
            return Some(command.clone());
        }

        // Then try environment variable
        if let Ok(command) = std::env::var("STUDYDESK_CLIPBOARD") {
            return Some(command);
        }

        // Fall back to platform defaults
        if cfg!(windows) {
            Some("powershell -NoProfile -Command Get-Clipboard".to_string())
        } else if cfg!(target_os = "macos") {
            Some("pbpaste".to_string())
        } else {
            let candidates = [
                ("wl-paste", "wl-paste --no-newline"),
                ("xclip", "xclip -selection clipboard -o"),
                ("xsel", "xsel --clipboard --output"),
            ];
            for (binary, command) in candidates {
                if which(binary).is_ok() {
                    return Some(command.to_string());
                }
            }
            warn!("No clipboard tool found (tried wl-paste, xclip, xsel)");
            None
        }
    }
}
