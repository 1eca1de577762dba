use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const API_BASE_URL_ENV: &str = "PRESENCE_API_BASE_URL";
pub const DEBUG_ENV: &str = "PRESENCE_DEBUG";
pub const SETTINGS_PATH_ENV: &str = "PRESENCE_SETTINGS";

/// Which camera the headless host opens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CameraSource {
    /// The platform camera at `deviceIndex`. Needs the `native-camera` feature.
    #[default]
    Native,
    /// Moving test pattern, no hardware needed.
    Virtual,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
    pub source: CameraSource,
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            source: CameraSource::Native,
            device_index: 0,
            width: 1280,
            height: 720,
            frame_rate: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingSettings {
    pub interval_ms: u64,
    /// JPEG quality in percent; 85 matches a canvas encode quality of 0.85.
    pub jpeg_quality: u8,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            jpeg_quality: 85,
        }
    }
}

impl SamplingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// How the store treats a detection round that completes after a newer one
/// has already been committed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum OrderingPolicy {
    /// Whichever round resolves last overwrites the batch.
    #[default]
    LastWriterWins,
    /// Rounds older than the last committed one are dropped.
    DropStale,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionSettings {
    pub request_timeout_secs: u64,
    pub ordering: OrderingPolicy,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            ordering: OrderingPolicy::LastWriterWins,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EnrichmentSettings {
    /// Zero disables the name cache.
    pub name_cache_ttl_secs: u64,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_base_url: String,
    pub capture: CaptureSettings,
    pub sampling: SamplingSettings,
    pub detection: DetectionSettings,
    pub enrichment: EnrichmentSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            capture: CaptureSettings::default(),
            sampling: SamplingSettings::default(),
            detection: DetectionSettings::default(),
            enrichment: EnrichmentSettings::default(),
        }
    }
}

impl Settings {
    /// Applies `PRESENCE_API_BASE_URL` on top of the file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(API_BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url;
            }
        }
        self.api_base_url = normalize_base_url(&self.api_base_url);
        self
    }
}

pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring unreadable settings at {}: {err}",
                    path.display()
                );
                Settings::default()
            })
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data.with_env_overrides()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Settings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: Settings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
