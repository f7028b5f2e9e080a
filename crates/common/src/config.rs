//! Application configuration.
//!
//! Every component receives the values it needs from an [`AppConfig`]
//! passed in by the caller; nothing reads ambient process state after
//! startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use reelcraft_model::{
    AssemblyParams, CaptionPlacement, ConcatMode, FontSpec, MergeStrategy, SubtitleParams,
    TransitionMode, VideoAspect,
};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Composition defaults.
    #[serde(default)]
    pub assembly: AssemblyDefaults,

    /// Caption defaults.
    #[serde(default)]
    pub subtitle: SubtitleDefaults,

    /// Narration and music defaults.
    #[serde(default)]
    pub audio: AudioDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default composition parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyDefaults {
    pub aspect: VideoAspect,
    pub concat_mode: ConcatMode,
    pub transition_mode: TransitionMode,

    /// Longest sub-clip cut from one source (seconds).
    pub max_clip_secs: f64,

    /// Duration given to still images (seconds).
    pub image_clip_secs: f64,

    /// Minimum accepted source width and height.
    pub min_source_px: u32,

    pub merge_strategy: MergeStrategy,

    /// Encoder threads.
    pub threads: u32,

    /// Output frame rate.
    pub fps: u32,

    /// Fixed RNG seed for reproducible orderings and transitions.
    pub seed: Option<u64>,
}

/// Default caption styling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleDefaults {
    pub enabled: bool,

    /// Font file used for measuring and drawing captions.
    pub font_path: PathBuf,

    pub font_size: u32,
    pub fore_color: String,
    pub stroke_color: String,
    pub stroke_width: u32,
    pub background_color: Option<String>,
    pub placement: CaptionPlacement,
}

/// Default audio levels and music location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioDefaults {
    /// Narration gain.
    pub voice_volume: f64,

    /// Background music gain.
    pub bgm_volume: f64,

    /// Directory searched for `*.mp3` when random music is requested.
    pub bgm_dir: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reelcraft=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            assembly: AssemblyDefaults::default(),
            subtitle: SubtitleDefaults::default(),
            audio: AudioDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for AssemblyDefaults {
    fn default() -> Self {
        Self {
            aspect: VideoAspect::Portrait,
            concat_mode: ConcatMode::Random,
            transition_mode: TransitionMode::None,
            max_clip_secs: 5.0,
            image_clip_secs: 4.0,
            min_source_px: 480,
            merge_strategy: MergeStrategy::default(),
            threads: 2,
            fps: 30,
            seed: None,
        }
    }
}

impl Default for SubtitleDefaults {
    fn default() -> Self {
        Self {
            enabled: true,
            font_path: data_dir().join("fonts").join("STHeitiMedium.ttc"),
            font_size: 60,
            fore_color: "#FFFFFF".to_string(),
            stroke_color: "#000000".to_string(),
            stroke_width: 1,
            background_color: None,
            placement: CaptionPlacement::Bottom,
        }
    }
}

impl Default for AudioDefaults {
    fn default() -> Self {
        Self {
            voice_volume: 1.0,
            bgm_volume: 0.2,
            bgm_dir: Some(data_dir().join("songs")),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from `path`, falling back to defaults when it is absent
    /// or unreadable.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Composition parameters for one job, seeded from these defaults.
    pub fn job_params(&self) -> AssemblyParams {
        let a = &self.assembly;
        let subtitles = self.subtitle.enabled.then(|| SubtitleParams {
            font: self.subtitle.font_spec(),
            placement: self.subtitle.placement,
        });
        AssemblyParams {
            aspect: a.aspect,
            concat_mode: a.concat_mode,
            transition_mode: a.transition_mode,
            max_clip_secs: a.max_clip_secs,
            image_clip_secs: a.image_clip_secs,
            min_source_px: a.min_source_px,
            merge_strategy: a.merge_strategy,
            threads: a.threads.max(1),
            fps: a.fps.max(1),
            subtitles,
        }
    }
}

impl SubtitleDefaults {
    pub fn font_spec(&self) -> FontSpec {
        FontSpec {
            path: self.font_path.clone(),
            size: self.font_size,
            fore_color: self.fore_color.clone(),
            stroke_color: self.stroke_color.clone(),
            stroke_width: self.stroke_width,
            background_color: self.background_color.clone(),
        }
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("reelcraft").join("config.json")
}

/// Default data directory (fonts, songs).
fn data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("reelcraft")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_constants() {
        let config = AppConfig::default();
        assert_eq!(config.assembly.max_clip_secs, 5.0);
        assert_eq!(config.assembly.min_source_px, 480);
        assert_eq!(config.assembly.fps, 30);
        assert_eq!(
            config.assembly.merge_strategy,
            MergeStrategy::DiskBatched { batch_size: 2 }
        );
        assert_eq!(config.subtitle.font_size, 60);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"assembly":{"threads":8,"concat_mode":"sequential"}}"#).unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.assembly.threads, 8);
        assert_eq!(config.assembly.concat_mode, ConcatMode::Sequential);
        assert_eq!(config.assembly.max_clip_secs, 5.0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.assembly.threads, 2);
    }

    #[test]
    fn test_job_params_respects_subtitle_toggle() {
        let mut config = AppConfig::default();
        assert!(config.job_params().subtitles.is_some());
        config.subtitle.enabled = false;
        config.assembly.threads = 0;
        let params = config.job_params();
        assert!(params.subtitles.is_none());
        assert_eq!(params.threads, 1);
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.assembly.seed = Some(7);
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.assembly.seed, Some(7));
    }
}
