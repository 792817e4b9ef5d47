//! Settings file model and loader.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound of `grouping.separation_hours` (ten years).
pub const MAX_SEPARATION_HOURS: f64 = 87_600.0;
/// Upper bound of `localize.tolerance_seconds` (one week).
pub const MAX_TOLERANCE_SECONDS: i64 = 604_800;
/// Upper bound of the magnitude of `localize.time_offset_seconds` (one year).
pub const MAX_TIME_OFFSET_SECONDS: i64 = 31_536_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Rename,
    Convert,
    Group,
    Rate,
    Aggregate,
    Localize,
}

impl StageKind {
    pub const ALL: [StageKind; 6] = [
        StageKind::Rename,
        StageKind::Convert,
        StageKind::Group,
        StageKind::Rate,
        StageKind::Aggregate,
        StageKind::Localize,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Rename => "rename",
            StageKind::Convert => "convert",
            StageKind::Group => "group",
            StageKind::Rate => "rate",
            StageKind::Aggregate => "aggregate",
            StageKind::Localize => "localize",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDirs {
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelocationMode {
    #[default]
    Move,
    Copy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub recursive: bool,
    pub relocation: RelocationMode,
    /// Drop the source sub-path and put everything directly under the destination.
    pub flatten: bool,
    pub remove_empty_dirs: bool,
    /// Append the stage name to the Contributor list of every transitioned file.
    pub stamp_history: bool,
    /// Only paths relative to the source root matching this are processed.
    pub path_filter: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            recursive: true,
            relocation: RelocationMode::Move,
            flatten: false,
            remove_empty_dirs: true,
            stamp_history: false,
            path_filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingSettings {
    pub separation_hours: f64,
    pub description_tag: bool,
}

impl Default for GroupingSettings {
    fn default() -> Self {
        Self {
            separation_hours: 4.0,
            description_tag: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingSettings {
    /// Extension (e.g. `.ORF`) whose rating wins when siblings disagree.
    pub overruling_extension: Option<String>,
    /// Fixed rating applied to every video.
    pub video_rating: Option<i64>,
    /// Rating applied to everything, skipping inspection.
    pub enforced_rating: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertSettings {
    pub raw_converter: Option<PathBuf>,
    /// Arguments for the raw converter; `{input}` and `{output}` are substituted.
    pub raw_converter_args: Vec<String>,
    pub raw_target_extension: String,
    pub video_transcoder: PathBuf,
    pub video_codec: String,
    pub video_quality: u8,
    pub workers: Option<usize>,
}

impl Default for ConvertSettings {
    fn default() -> Self {
        Self {
            raw_converter: None,
            raw_converter_args: vec!["{input}".to_string(), "{output}".to_string()],
            raw_target_extension: ".jpg".to_string(),
            video_transcoder: PathBuf::from("ffmpeg"),
            video_codec: "libx265".to_string(),
            video_quality: 28,
            workers: None,
        }
    }
}

impl ConvertSettings {
    pub fn require_raw_converter(&self) -> Result<&Path, ConfigError> {
        self.raw_converter
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequired("convert.raw_converter".to_string()))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizeSettings {
    pub tracks: Vec<PathBuf>,
    pub time_offset_seconds: i64,
    pub tolerance_seconds: i64,
    /// Zone of naive camera timestamps, e.g. `+02:00`. System zone when unset.
    pub camera_utc_offset: Option<String>,
    pub transition_without_fix: bool,
}

impl Default for LocalizeSettings {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            time_offset_seconds: 0,
            tolerance_seconds: 300,
            camera_utc_offset: None,
            transition_without_fix: false,
        }
    }
}

impl LocalizeSettings {
    pub fn camera_offset(&self) -> Result<Option<FixedOffset>, ConfigError> {
        match &self.camera_utc_offset {
            None => Ok(None),
            Some(s) => parse_utc_offset(s)
                .map(Some)
                .ok_or_else(|| ConfigError::invalid("localize.camera_utc_offset", format!("'{}' is not +HH:MM", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    pub exiftool: PathBuf,
    pub overwrite_original: bool,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            exiftool: PathBuf::from("exiftool"),
            overwrite_original: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub stages: BTreeMap<StageKind, StageDirs>,
    pub engine: EngineSettings,
    pub grouping: GroupingSettings,
    pub rating: RatingSettings,
    pub convert: ConvertSettings,
    pub localize: LocalizeSettings,
    pub metadata: MetadataSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    Yaml,
    Json,
}

impl SettingsFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(SettingsFormat::Yaml),
            Some("json") => Ok(SettingsFormat::Json),
            Some(other) => Err(ConfigError::UnsupportedFormat(other.to_string())),
            None => Err(ConfigError::UnsupportedFormat(String::new())),
        }
    }
}

impl Settings {
    /// Load, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let format = SettingsFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        tracing::debug!("loading settings from {}", path.display());

        let mut settings = Self::parse(&content, format)?;
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn parse(content: &str, format: SettingsFormat) -> Result<Self, ConfigError> {
        Ok(match format {
            SettingsFormat::Yaml => serde_yaml::from_str(content)?,
            SettingsFormat::Json => serde_json::from_str(content)?,
        })
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("MEDIASTAGE_EXIFTOOL") {
            self.metadata.exiftool = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("MEDIASTAGE_RAW_CONVERTER") {
            self.convert.raw_converter = Some(PathBuf::from(value));
        }
        if let Ok(value) = std::env::var("MEDIASTAGE_WORKERS") {
            let workers = value
                .parse()
                .map_err(|_| ConfigError::invalid("MEDIASTAGE_WORKERS", format!("'{}' is not a count", value)))?;
            self.convert.workers = Some(workers);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let hours = self.grouping.separation_hours;
        if !(hours > 0.0 && hours <= MAX_SEPARATION_HOURS) {
            return Err(ConfigError::invalid(
                "grouping.separation_hours",
                format!("must be in (0, {}]", MAX_SEPARATION_HOURS),
            ));
        }
        for (field, rating) in [
            ("rating.video_rating", self.rating.video_rating),
            ("rating.enforced_rating", self.rating.enforced_rating),
        ] {
            if let Some(r) = rating {
                if !(1..=5).contains(&r) {
                    return Err(ConfigError::invalid(field, format!("{} is outside 1-5", r)));
                }
            }
        }
        if let Some(ext) = &self.rating.overruling_extension {
            if !ext.starts_with('.') || ext.len() < 2 {
                return Err(ConfigError::invalid(
                    "rating.overruling_extension",
                    format!("'{}' must look like .ORF", ext),
                ));
            }
        }
        if let Some(filter) = &self.engine.path_filter {
            Regex::new(filter).map_err(|e| ConfigError::invalid("engine.path_filter", e.to_string()))?;
        }
        if self.convert.workers == Some(0) {
            return Err(ConfigError::invalid("convert.workers", "must be at least 1"));
        }
        if !self.convert.raw_target_extension.starts_with('.') {
            return Err(ConfigError::invalid("convert.raw_target_extension", "must start with '.'"));
        }
        if !(0..=MAX_TOLERANCE_SECONDS).contains(&self.localize.tolerance_seconds) {
            return Err(ConfigError::invalid(
                "localize.tolerance_seconds",
                format!("must be in [0, {}]", MAX_TOLERANCE_SECONDS),
            ));
        }
        if self.localize.time_offset_seconds.abs() > MAX_TIME_OFFSET_SECONDS {
            return Err(ConfigError::invalid(
                "localize.time_offset_seconds",
                format!("must be within +/-{}", MAX_TIME_OFFSET_SECONDS),
            ));
        }
        self.localize.camera_offset()?;
        for (kind, dirs) in &self.stages {
            if dirs.source.as_os_str().is_empty() || dirs.destination.as_os_str().is_empty() {
                return Err(ConfigError::invalid(
                    format!("stages.{}", kind),
                    "source and destination must be set",
                ));
            }
        }
        Ok(())
    }

    pub fn stage(&self, kind: StageKind) -> Result<&StageDirs, ConfigError> {
        self.stages
            .get(&kind)
            .ok_or_else(|| ConfigError::MissingRequired(format!("stages.{}", kind)))
    }
}

/// Parse `+HH:MM`, `-HHMM` or `Z`.
pub fn parse_utc_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
