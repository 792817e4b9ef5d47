//! Tag vocabulary and the port to the external metadata tool.
//!
//! The rest of the crate only sees canonical [`Tag`]s and [`TagValue`]s.
//! Translation to the tool's own tag names, including the unsigned
//! GPS altitude plus reference flag, lives in [`codec`].

pub mod codec;
pub mod exiftool;
pub mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::MetadataError;

pub use exiftool::ExifTool;
pub use memory::MemoryMetadata;

/// Extension of the tag-only companion file.
pub const SIDECAR_EXTENSION: &str = ".xmp";

/// Date tag text layout used by the metadata tool.
pub const TAG_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tag {
    Date,
    Source,
    Description,
    Rating,
    Subject,
    HierarchicalSubject,
    Label,
    /// Stage history, one entry per transition.
    Contributor,
    GpsLatitude,
    GpsLongitude,
    /// Signed metres; negative is below sea level.
    GpsElevation,
}

impl Tag {
    pub const ALL: [Tag; 11] = [
        Tag::Date,
        Tag::Source,
        Tag::Description,
        Tag::Rating,
        Tag::Subject,
        Tag::HierarchicalSubject,
        Tag::Label,
        Tag::Contributor,
        Tag::GpsLatitude,
        Tag::GpsLongitude,
        Tag::GpsElevation,
    ];

    /// Lowercase name used in reasons and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Tag::Date => "date",
            Tag::Source => "source",
            Tag::Description => "description",
            Tag::Rating => "rating",
            Tag::Subject => "subject",
            Tag::HierarchicalSubject => "hierarchical subject",
            Tag::Label => "label",
            Tag::Contributor => "contributor",
            Tag::GpsLatitude => "GPS latitude",
            Tag::GpsLongitude => "GPS longitude",
            Tag::GpsElevation => "GPS elevation",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            Tag::Subject | Tag::HierarchicalSubject | Tag::Contributor
        )
    }

    pub fn is_decimal(&self) -> bool {
        matches!(self, Tag::GpsLatitude | Tag::GpsLongitude | Tag::GpsElevation)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Integer(i64),
    Decimal(f64),
    Text(String),
    List(Vec<String>),
}

impl TagValue {
    pub fn text(s: impl Into<String>) -> Self {
        TagValue::Text(s.into())
    }

    pub fn date(dt: NaiveDateTime) -> Self {
        TagValue::Text(dt.format(TAG_DATE_FORMAT).to_string())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            TagValue::Integer(i) => Some(*i),
            TagValue::Decimal(d) if d.fract() == 0.0 => Some(*d as i64),
            TagValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            TagValue::Integer(i) => Some(*i as f64),
            TagValue::Decimal(d) => Some(*d),
            TagValue::Text(s) => s.trim().parse().ok(),
            TagValue::List(_) => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            TagValue::Text(s) => {
                // Drop sub-seconds and zone suffixes the tool may append.
                let head = s.get(..19).unwrap_or(s);
                NaiveDateTime::parse_from_str(head, TAG_DATE_FORMAT).ok()
            }
            _ => None,
        }
    }

    /// The date with its zone suffix (`+02:00`, `-0500`, `Z`), if one is present.
    pub fn as_zoned_datetime(&self) -> Option<DateTime<FixedOffset>> {
        let TagValue::Text(s) = self else {
            return None;
        };
        let naive = self.as_datetime()?;
        let tail = s.get(19..)?.trim_start_matches(|c: char| c == '.' || c.is_ascii_digit());
        if tail.trim().is_empty() {
            return None;
        }
        let zone = crate::config::parse_utc_offset(tail)?;
        zone.from_local_datetime(&naive).single()
    }

    pub fn as_list(&self) -> Vec<String> {
        match self {
            TagValue::List(items) => items.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Integer(i) => write!(f, "{}", i),
            TagValue::Decimal(d) => write!(f, "{}", d),
            TagValue::Text(s) => f.write_str(s),
            TagValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

pub type TagMap = BTreeMap<Tag, TagValue>;

/// Read and write access to embedded media metadata.
pub trait MetadataPort: Send + Sync {
    /// Read `tags` from each file separately, one map per input file.
    fn read_each(&self, files: &[PathBuf], tags: &[Tag]) -> Result<Vec<TagMap>, MetadataError>;

    fn write(&self, file: &Path, tags: &TagMap, overwrite_original: bool) -> Result<(), MetadataError>;

    /// Read `tags` across `files`; the first file carrying a tag wins.
    fn read(&self, files: &[PathBuf], tags: &[Tag]) -> Result<TagMap, MetadataError> {
        let mut merged = TagMap::new();
        for map in self.read_each(files, tags)? {
            for (tag, value) in map {
                merged.entry(tag).or_insert(value);
            }
        }
        Ok(merged)
    }
}
