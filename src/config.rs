//! Engine configuration
//!
//! [`EngineConfig`] is a plain serde record that can be kept next to a project
//! as JSON. Durations are written in human-readable form (`"100ms"`); a bare
//! number is read as milliseconds.
//!
//! ```rust
//! use assetsync::config::EngineConfig;
//!
//! let config = EngineConfig::new("/project/Data", "/project/Source");
//! assert_eq!(config.media_root(), std::path::PathBuf::from("/project/Source/Media"));
//! assert!(config.validate().is_ok());
//! ```

use crate::collaborators::HiddenPathFilter;
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default interval between two drain cycles
pub const DEFAULT_QUIESCENCE_WINDOW: Duration = Duration::from_millis(100);

/// Default delay before re-importing source files after focus returns
pub const DEFAULT_REIMPORT_GRACE: Duration = Duration::from_millis(50);

/// Default number of propagation steps performed per tick
pub const DEFAULT_PROPAGATION_STEPS_PER_TICK: usize = 16;

/// Name of the media directory inside the source root
pub const MEDIA_DIR_NAME: &str = "Media";

/// Configuration for a sync engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Managed data tree holding the assets
    pub data_root: PathBuf,
    /// Auxiliary source tree holding authoring files
    pub source_root: PathBuf,
    /// Media directory inside the source tree; `source_root/Media` when unset
    pub source_media_root: Option<PathBuf>,
    /// Minimum time between two drain cycles
    #[serde(with = "humantime_duration")]
    pub quiescence_window: Duration,
    /// Delay before handing scheduled files to the reimporter
    #[serde(with = "humantime_duration")]
    pub reimport_grace: Duration,
    /// Glob patterns of paths that are never watched
    pub hidden_patterns: Vec<String>,
    /// Directories holding plugin binaries
    pub plugin_dirs: Vec<PathBuf>,
    /// File name suffixes identifying plugin binaries (case-insensitive)
    pub plugin_suffixes: Vec<String>,
    /// Upper bound of propagation steps per tick
    pub propagation_steps_per_tick: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("Data"),
            source_root: PathBuf::from("Source"),
            source_media_root: None,
            quiescence_window: DEFAULT_QUIESCENCE_WINDOW,
            reimport_grace: DEFAULT_REIMPORT_GRACE,
            hidden_patterns: HiddenPathFilter::DEFAULT_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            plugin_dirs: Vec::new(),
            plugin_suffixes: vec![".core.dll".to_string(), ".editor.dll".to_string()],
            propagation_steps_per_tick: DEFAULT_PROPAGATION_STEPS_PER_TICK,
        }
    }
}

impl EngineConfig {
    /// Configuration for the given roots with default settings
    pub fn new(data_root: impl Into<PathBuf>, source_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            source_root: source_root.into(),
            ..Default::default()
        }
    }

    /// Effective media root
    pub fn media_root(&self) -> PathBuf {
        self.source_media_root
            .clone()
            .unwrap_or_else(|| self.source_root.join(MEDIA_DIR_NAME))
    }

    /// Whether `path` names a plugin binary
    pub fn is_plugin_binary(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let name = name.to_lowercase();
        self.plugin_suffixes
            .iter()
            .any(|suffix| name.ends_with(&suffix.to_lowercase()))
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.data_root.as_os_str().is_empty() {
            return Err(SyncError::InvalidConfiguration("data_root is empty".to_string()));
        }
        if self.source_root.as_os_str().is_empty() {
            return Err(SyncError::InvalidConfiguration("source_root is empty".to_string()));
        }
        if !self.media_root().starts_with(&self.source_root) {
            return Err(SyncError::InvalidConfiguration(format!(
                "media root {:?} is not inside the source root {:?}",
                self.media_root(),
                self.source_root
            )));
        }
        if self.propagation_steps_per_tick == 0 {
            return Err(SyncError::InvalidConfiguration(
                "propagation_steps_per_tick must be at least 1".to_string(),
            ));
        }
        HiddenPathFilter::new(&self.hidden_patterns)?;
        Ok(())
    }

    /// Load a configuration from a JSON file
    ///
    /// Relative roots are resolved against the canonical directory containing
    /// the file, so that they compare equal to the paths the watchers report.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: EngineConfig = serde_json::from_str(&content)?;
        let base = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.canonicalize()?,
            _ => Path::new(".").canonicalize()?,
        };
        config.resolve_against(&base);
        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Write the configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Wrote configuration to {}", path.display());
        Ok(())
    }

    fn resolve_against(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.data_root);
        resolve(&mut self.source_root);
        if let Some(media) = self.source_media_root.as_mut() {
            resolve(media);
        }
        for dir in &mut self.plugin_dirs {
            resolve(dir);
        }
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Millis(u64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Millis(ms) => Ok(Duration::from_millis(ms)),
            Repr::Text(text) => humantime::parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}
