use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfError;
use crate::logging::LogSettings;
use crate::sdk::ConnectRequest;
use crate::session::{ConnectionMode, SpatialAudioStyle};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub connection_mode: ConnectionMode,
    #[serde(default)]
    pub spatial_audio_style: SpatialAudioStyle,
    #[serde(default = "default_scale")]
    pub spatial_environment_scale: f32,
    #[serde(default = "default_pose_interval_ms")]
    pub pose_update_interval_ms: u64,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u32,
    #[serde(default)]
    pub auth_endpoint: Option<String>,
    #[serde(default)]
    pub log: LogSettings,
}

fn default_scale() -> f32 {
    1.0
}

fn default_pose_interval_ms() -> u64 {
    30
}

fn default_token_ttl() -> u32 {
    3600
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_name: None,
            connection_mode: ConnectionMode::Active,
            spatial_audio_style: SpatialAudioStyle::Shared,
            spatial_environment_scale: default_scale(),
            pose_update_interval_ms: default_pose_interval_ms(),
            token_ttl_seconds: default_token_ttl(),
            auth_endpoint: None,
            log: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn pose_update_interval(&self) -> Duration {
        Duration::from_millis(self.pose_update_interval_ms.max(1))
    }

    /// A connect request pre-filled with the stored defaults.
    pub fn connect_request(&self, conference_name: &str) -> ConnectRequest {
        let mut request =
            ConnectRequest::new(conference_name, self.display_name.clone().unwrap_or_default());
        request.connection_mode = self.connection_mode;
        request.spatial_audio_style = self.spatial_audio_style;
        request
    }
}

/// JSON-backed settings file under a data directory.
pub struct SettingsStore {
    settings: Mutex<Settings>,
    file_path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: &str) -> Self {
        let file_path = PathBuf::from(data_dir).join("settings.json");
        let settings = Self::load(&file_path);
        Self {
            settings: Mutex::new(settings),
            file_path,
        }
    }

    pub fn get(&self) -> Settings {
        self.settings.lock().unwrap().clone()
    }

    pub fn set_display_name(&self, name: Option<String>) -> Result<(), ConfError> {
        self.settings.lock().unwrap().display_name = name;
        self.save()
    }

    pub fn set_connection_mode(&self, mode: ConnectionMode) -> Result<(), ConfError> {
        self.settings.lock().unwrap().connection_mode = mode;
        self.save()
    }

    pub fn set_spatial_audio_style(&self, style: SpatialAudioStyle) -> Result<(), ConfError> {
        self.settings.lock().unwrap().spatial_audio_style = style;
        self.save()
    }

    pub fn set_spatial_environment_scale(&self, scale: f32) -> Result<(), ConfError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ConfError::InvalidArgument(format!("invalid scale {scale}")));
        }
        self.settings.lock().unwrap().spatial_environment_scale = scale;
        self.save()
    }

    pub fn set_auth_endpoint(&self, endpoint: Option<String>) -> Result<(), ConfError> {
        self.settings.lock().unwrap().auth_endpoint = endpoint;
        self.save()
    }

    pub fn set_log_settings(&self, log: LogSettings) -> Result<(), ConfError> {
        self.settings.lock().unwrap().log = log;
        self.save()
    }

    fn save(&self) -> Result<(), ConfError> {
        let settings = self.settings.lock().unwrap().clone();
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfError::Settings(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&settings)
            .map_err(|e| ConfError::Settings(e.to_string()))?;
        std::fs::write(&self.file_path, json).map_err(|e| ConfError::Settings(e.to_string()))
    }

    fn load(path: &Path) -> Settings {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable settings file {}: {e}", path.display());
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }
}
