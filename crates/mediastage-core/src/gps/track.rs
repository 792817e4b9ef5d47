//! Track file readers: GPX `<trkpt>` elements and JSON location history.

use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use super::TrackPoint;
use crate::error::TrackError;

static TRKPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<trkpt\b([^>]*?)(?:/>|>(.*?)</trkpt>)").unwrap());
static LAT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\blat\s*=\s*["']([^"']+)["']"#).unwrap());
static LON_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\blon\s*=\s*["']([^"']+)["']"#).unwrap());
static ELE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<ele>\s*([^<\s]+)\s*</ele>").unwrap());
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<time>\s*([^<\s]+)\s*</time>").unwrap());

/// Load every point of a `.gpx` or `.json` track.
pub fn load_track(path: &Path) -> Result<Vec<TrackPoint>, TrackError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if ext != "gpx" && ext != "json" {
        return Err(TrackError::UnsupportedFormat(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| TrackError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let points = if ext == "gpx" {
        parse_gpx(&content)
    } else {
        parse_location_history(&content).map_err(|reason| TrackError::Malformed {
            path: path.to_path_buf(),
            reason,
        })?
    };
    tracing::debug!("{} track points in {}", points.len(), path.display());
    Ok(points)
}

fn capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Points without a time or position are dropped.
pub fn parse_gpx(content: &str) -> Vec<TrackPoint> {
    TRKPT_RE
        .captures_iter(content)
        .filter_map(|c| {
            let attrs = c.get(1)?.as_str();
            let body = c.get(2).map_or("", |m| m.as_str());
            let latitude = capture(&LAT_RE, attrs)?.parse().ok()?;
            let longitude = capture(&LON_RE, attrs)?.parse().ok()?;
            let time = DateTime::parse_from_rfc3339(capture(&TIME_RE, body)?)
                .ok()?
                .with_timezone(&Utc);
            let elevation = capture(&ELE_RE, body).and_then(|e| e.parse().ok());
            Some(TrackPoint {
                time,
                latitude,
                longitude,
                elevation,
            })
        })
        .collect()
}

fn history_time(entry: &Value) -> Option<DateTime<Utc>> {
    if let Some(ts) = entry.get("timestamp").and_then(Value::as_str) {
        return DateTime::parse_from_rfc3339(ts).ok().map(|t| t.with_timezone(&Utc));
    }
    // older exports: epoch milliseconds as a string
    let ms = entry.get("timestampMs")?;
    let ms = ms.as_str().and_then(|s| s.parse().ok()).or_else(|| ms.as_i64())?;
    DateTime::from_timestamp_millis(ms)
}

/// Location history export: `{"locations": [{"latitudeE7", "longitudeE7", ...}]}`.
pub fn parse_location_history(content: &str) -> Result<Vec<TrackPoint>, String> {
    let data: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let locations = data
        .get("locations")
        .and_then(Value::as_array)
        .ok_or_else(|| "no \"locations\" array".to_string())?;

    Ok(locations
        .iter()
        .filter_map(|entry| {
            let latitude = entry.get("latitudeE7")?.as_i64()? as f64 / 1e7;
            let longitude = entry.get("longitudeE7")?.as_i64()? as f64 / 1e7;
            let elevation = entry.get("altitude").and_then(Value::as_f64);
            Some(TrackPoint {
                time: history_time(entry)?,
                latitude,
                longitude,
                elevation,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const GPX: &str = r#"<?xml version="1.0"?>
<gpx version="1.1"><trk><trkseg>
  <trkpt lat="48.1" lon="11.5"><ele>520.5</ele><time>2023-06-01T10:00:00Z</time></trkpt>
  <trkpt lon='11.6' lat='48.2'>
    <time>2023-06-01T12:00:00+02:00</time>
  </trkpt>
  <trkpt lat="1" lon="2"/>
</trkseg></trk></gpx>"#;

    #[test]
    fn gpx_points() {
        let points = parse_gpx(GPX);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].latitude, 48.1);
        assert_eq!(points[0].elevation, Some(520.5));
        assert_eq!(points[1].longitude, 11.6);
        assert_eq!(points[1].elevation, None);
        assert_eq!(points[1].time.to_rfc3339(), "2023-06-01T10:00:00+00:00");
    }

    #[test]
    fn location_history_points() {
        let json = r#"{"locations": [
            {"latitudeE7": 481000000, "longitudeE7": 115000000, "altitude": 500, "timestamp": "2023-06-01T10:00:00.000Z"},
            {"latitudeE7": 482000000, "longitudeE7": 116000000, "timestampMs": "1685613600000"},
            {"longitudeE7": 1}
        ]}"#;
        let points = parse_location_history(json).unwrap();
        assert_eq!(points.len(), 2);
        assert!((points[0].latitude - 48.1).abs() < 1e-9);
        assert_eq!(points[0].elevation, Some(500.0));
        assert_eq!(points[1].time.timestamp(), 1_685_613_600);
        assert!(parse_location_history("{}").is_err());
    }

    #[test]
    fn format_by_extension() {
        let dir = tempdir().unwrap();
        let gpx = dir.path().join("walk.GPX");
        fs::write(&gpx, GPX).unwrap();
        assert_eq!(load_track(&gpx).unwrap().len(), 2);
        assert!(matches!(
            load_track(&dir.path().join("walk.kml")),
            Err(TrackError::UnsupportedFormat(_))
        ));
    }
}
