use chrono::{NaiveDate, NaiveDateTime};
use exif::{In, Reader, Tag};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Read the capture time embedded in an image or TIFF-based raw file.
/// EXIF datetimes carry no zone; they are camera local time.
pub fn exif_date(path: &Path) -> Option<NaiveDateTime> {
    let file = File::open(path).ok()?;
    let exif = Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .map_err(|e| tracing::trace!("no EXIF in {}: {}", path.display(), e))
        .ok()?;

    [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime]
        .into_iter()
        .filter_map(|tag| exif.get_field(tag, In::PRIMARY))
        .find_map(|field| parse_exif_datetime(&field.display_value().to_string()))
}

fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let cleaned: String = s
        .chars()
        .map(|c| if matches!(c, '-' | '/' | '\\' | '.') { ':' } else { c })
        .collect();

    NaiveDateTime::parse_from_str(&cleaned, "%Y:%m:%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(cleaned.split(' ').next()?, "%Y:%m:%d")
                .ok()?
                .and_hms_opt(0, 0, 0)
        })
}
