use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};

use super::{codec, MetadataPort, Tag, TagMap};
use crate::error::MetadataError;

/// In-process [`MetadataPort`] keeping records in the external tool's shape.
///
/// Values pass through the same codec as [`ExifTool`](super::ExifTool), so
/// anything written here reads back the way the real tool would report it.
#[derive(Debug, Default)]
pub struct MemoryMetadata {
    records: Mutex<HashMap<PathBuf, Map<String, Value>>>,
}

impl MemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw external record stored for `file`.
    pub fn record(&self, file: &Path) -> Option<Map<String, Value>> {
        self.lock().get(file).cloned()
    }

    /// Forget everything stored for `file`.
    pub fn clear(&self, file: &Path) {
        self.lock().remove(file);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Map<String, Value>>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MetadataPort for MemoryMetadata {
    fn read_each(&self, files: &[PathBuf], tags: &[Tag]) -> Result<Vec<TagMap>, MetadataError> {
        let records = self.lock();
        Ok(files
            .iter()
            .map(|f| {
                records
                    .get(f)
                    .map(|r| codec::decode(r, tags))
                    .unwrap_or_default()
            })
            .collect())
    }

    fn write(&self, file: &Path, tags: &TagMap, _overwrite_original: bool) -> Result<(), MetadataError> {
        let encoded = codec::encode(tags)?;
        let mut records = self.lock();
        let record = records.entry(file.to_path_buf()).or_default();
        for (tag, value) in encoded {
            record.insert(tag.key.to_string(), value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TagValue;

    #[test]
    fn elevation_sign_survives_round_trip() {
        let port = MemoryMetadata::new();
        let file = PathBuf::from("/m/track.jpg");
        port.write(&file, &TagMap::from([(Tag::GpsElevation, TagValue::Decimal(-12.5))]), true)
            .unwrap();

        let raw = port.record(&file).unwrap();
        assert_eq!(raw.get("GPSAltitude"), Some(&Value::from(12.5)));
        assert_eq!(raw.get("GPSAltitudeRef"), Some(&Value::from(1)));

        let back = port.read(&[file], &[Tag::GpsElevation]).unwrap();
        assert_eq!(back.get(&Tag::GpsElevation), Some(&TagValue::Decimal(-12.5)));
    }

    #[test]
    fn unknown_file_reads_empty() {
        let port = MemoryMetadata::new();
        let maps = port.read_each(&[PathBuf::from("nope.jpg")], &Tag::ALL).unwrap();
        assert_eq!(maps, vec![TagMap::new()]);
    }

    #[test]
    fn invalid_write_leaves_record_untouched() {
        let port = MemoryMetadata::new();
        let file = PathBuf::from("/m/a.jpg");
        assert!(port
            .write(&file, &TagMap::from([(Tag::Rating, TagValue::Integer(9))]), true)
            .is_err());
        assert!(port.record(&file).is_none());
        port.clear(&file);
    }
}
