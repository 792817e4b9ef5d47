pub mod exif;
pub mod guess;

use chrono::{DateTime, FixedOffset, NaiveDateTime};

use crate::media::MediaFile;
use crate::metadata::{MetadataPort, Tag};

/// Layout of the timestamp prefix carried by renamed files and group folders.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d@%H%M%S";

/// Length of a formatted [`TIMESTAMP_FORMAT`] value.
pub const TIMESTAMP_LEN: usize = 17;

/// Result of date extraction: date + accuracy (0 = best)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateResult {
    pub date: NaiveDateTime,
    pub accuracy: u8,
}

pub fn format_timestamp(dt: &NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse exactly `YYYY-MM-DD@HHMMSS`.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let bytes = s.as_bytes();
    if bytes.len() != TIMESTAMP_LEN {
        return None;
    }
    let shape_ok = bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        10 => *b == b'@',
        _ => b.is_ascii_digit(),
    });
    if !shape_ok {
        return None;
    }
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

/// Timestamp carried by the first 17 characters of a file or folder name.
pub fn timestamp_prefix(name: &str) -> Option<NaiveDateTime> {
    name.get(..TIMESTAMP_LEN).and_then(parse_timestamp)
}

/// Capture time of a media file, trying sources in order of trust:
/// name prefix, metadata Date tag, embedded EXIF, then filename heuristics.
pub fn capture_time(file: &MediaFile, port: &dyn MetadataPort, read_exif: bool) -> Option<DateResult> {
    let stem = file.stem();

    if let Some(date) = timestamp_prefix(&stem) {
        return Some(DateResult { date, accuracy: 0 });
    }

    match port.read(&file.paths(), &[Tag::Date]) {
        Ok(tags) => {
            if let Some(date) = tags.get(&Tag::Date).and_then(|v| v.as_datetime()) {
                return Some(DateResult { date, accuracy: 1 });
            }
        }
        Err(e) => tracing::debug!("date tag unreadable for {}: {}", file, e),
    }

    if read_exif {
        if let Some(date) = file.primary_path().and_then(|p| exif::exif_date(&p)) {
            return Some(DateResult { date, accuracy: 2 });
        }
    }

    guess::guess_date_from_filename(&stem).map(|date| DateResult { date, accuracy: 3 })
}

/// Capture time from the Date tag, only when the tag records its zone.
pub fn zoned_capture_time(file: &MediaFile, port: &dyn MetadataPort) -> Option<DateTime<FixedOffset>> {
    match port.read(&file.paths(), &[Tag::Date]) {
        Ok(tags) => tags.get(&Tag::Date).and_then(|v| v.as_zoned_datetime()),
        Err(e) => {
            tracing::debug!("date tag unreadable for {}: {}", file, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MemoryMetadata, TagMap, TagValue};
    use std::path::PathBuf;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn strict_timestamp_shape() {
        assert_eq!(parse_timestamp("2022-12-12@121212"), Some(dt("2022-12-12 12:12:12")));
        assert!(parse_timestamp("2022-12-12_121212").is_none());
        assert!(parse_timestamp("2022-1-12@1212123").is_none());
        assert!(parse_timestamp("2022-13-12@121212").is_none());
        assert!(parse_timestamp("2022-12-12@121212_x").is_none());
        assert_eq!(format_timestamp(&dt("2021-01-02 03:04:05")), "2021-01-02@030405");
    }

    #[test]
    fn prefix_beats_metadata() {
        let port = MemoryMetadata::new();
        let file = MediaFile::from_siblings(
            PathBuf::from("/x/2022-12-12@121212_test"),
            &[".jpg".to_string()],
        );
        port.write(
            &file.path_for(".jpg"),
            &TagMap::from([(Tag::Date, TagValue::date(dt("2000-01-01 00:00:00")))]),
            true,
        )
        .unwrap();
        let r = capture_time(&file, &port, false).unwrap();
        assert_eq!(r.date, dt("2022-12-12 12:12:12"));
        assert_eq!(r.accuracy, 0);
    }

    #[test]
    fn metadata_then_filename_guess() {
        let port = MemoryMetadata::new();
        let file = MediaFile::from_siblings(PathBuf::from("/x/IMG_20190509_154733"), &[".mp4".to_string()]);
        let guessed = capture_time(&file, &port, false).unwrap();
        assert_eq!(guessed.accuracy, 3);
        assert_eq!(guessed.date, dt("2019-05-09 15:47:33"));

        port.write(
            &file.path_for(".mp4"),
            &TagMap::from([(Tag::Date, TagValue::date(dt("2019-05-09 10:00:00")))]),
            true,
        )
        .unwrap();
        let tagged = capture_time(&file, &port, false).unwrap();
        assert_eq!(tagged.accuracy, 1);
        assert_eq!(tagged.date, dt("2019-05-09 10:00:00"));
    }
}
