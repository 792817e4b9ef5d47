//! Position fixes for capture times from recorded tracks.

pub mod track;

use std::path::PathBuf;

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

use crate::error::TrackError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackPoint {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
}

impl From<&TrackPoint> for GpsFix {
    fn from(p: &TrackPoint) -> Self {
        Self {
            latitude: p.latitude,
            longitude: p.longitude,
            elevation: p.elevation,
        }
    }
}

/// Capture time as read from a file: camera clocks usually carry no zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTime {
    Naive(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

fn lerp(a: f64, b: f64, ratio: f64) -> f64 {
    a + (b - a) * ratio
}

/// Time-sorted track points from any number of track files.
#[derive(Debug, Clone, Default)]
pub struct GpsInterpolator {
    points: Vec<TrackPoint>,
    camera_zone: Option<FixedOffset>,
}

impl GpsInterpolator {
    /// Sorts by time; of several points with the same time the first is kept.
    pub fn new(mut points: Vec<TrackPoint>) -> Self {
        points.sort_by_key(|p| p.time);
        points.dedup_by_key(|p| p.time);
        Self {
            points,
            camera_zone: None,
        }
    }

    pub fn from_files(paths: &[PathBuf]) -> Result<Self, TrackError> {
        let mut points = Vec::new();
        for path in paths {
            points.extend(track::load_track(path)?);
        }
        Ok(Self::new(points))
    }

    /// Zone of naive capture times. The system zone is used when unset.
    pub fn with_camera_zone(mut self, zone: Option<FixedOffset>) -> Self {
        self.camera_zone = zone;
        self
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    /// `capture + offset` in UTC. A naive time that does not exist in the
    /// camera zone (DST gap) has no UTC equivalent.
    pub fn normalize(&self, capture: CaptureTime, offset: Duration) -> Option<DateTime<Utc>> {
        let utc = match capture {
            CaptureTime::Zoned(t) => t.with_timezone(&Utc),
            CaptureTime::Naive(t) => match self.camera_zone {
                Some(zone) => zone.from_local_datetime(&t).single()?.with_timezone(&Utc),
                None => Local.from_local_datetime(&t).earliest()?.with_timezone(&Utc),
            },
        };
        Some(utc + offset)
    }

    /// Position at `capture + offset`, interpolated between the nearest points
    /// on either side within `tolerance`.
    pub fn fix_for(&self, capture: CaptureTime, offset: Duration, tolerance: Duration) -> Option<GpsFix> {
        let t = self.normalize(capture, offset)?;
        let fix = self.fix_at(t, tolerance);
        if fix.is_none() {
            tracing::debug!("no track point within {}s of {}", tolerance.num_seconds(), t);
        }
        fix
    }

    /// A point recorded exactly at `t` is returned as is, before any bracketing.
    pub fn fix_at(&self, t: DateTime<Utc>, tolerance: Duration) -> Option<GpsFix> {
        let first_not_before = self.points.partition_point(|p| p.time < t);
        if let Some(exact) = self.points.get(first_not_before).filter(|p| p.time == t) {
            return Some(exact.into());
        }

        let before = first_not_before
            .checked_sub(1)
            .map(|i| &self.points[i])
            .filter(|p| p.time >= t - tolerance);
        let first_after = self.points.partition_point(|p| p.time <= t);
        let after = self.points.get(first_after).filter(|p| p.time <= t + tolerance);

        match (before, after) {
            (Some(b), Some(a)) if a.time == b.time => Some(b.into()),
            (Some(b), Some(a)) => {
                let span = (a.time - b.time).num_milliseconds() as f64;
                let ratio = (t - b.time).num_milliseconds() as f64 / span;
                let elevation = match (b.elevation, a.elevation) {
                    (Some(eb), Some(ea)) => Some(lerp(eb, ea, ratio)),
                    (eb, ea) => eb.or(ea),
                };
                Some(GpsFix {
                    latitude: lerp(b.latitude, a.latitude, ratio),
                    longitude: lerp(b.longitude, a.longitude, ratio),
                    elevation,
                })
            }
            (Some(only), None) | (None, Some(only)) => Some(only.into()),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn point(s: &str, lat: f64, lon: f64, ele: f64) -> TrackPoint {
        TrackPoint {
            time: at(s),
            latitude: lat,
            longitude: lon,
            elevation: Some(ele),
        }
    }

    fn track() -> GpsInterpolator {
        GpsInterpolator::new(vec![
            point("2023-06-01T10:00:30Z", 12.0, 22.0, 7.0),
            point("2023-06-01T09:59:30Z", 10.0, 20.0, 5.0),
        ])
        .with_camera_zone(FixedOffset::east_opt(0))
    }

    #[test]
    fn interpolates_midpoint() {
        let fix = track()
            .fix_at(at("2023-06-01T10:00:00Z"), Duration::seconds(60))
            .unwrap();
        assert_eq!(fix.latitude, 11.0);
        assert_eq!(fix.longitude, 21.0);
        assert_eq!(fix.elevation, Some(6.0));
    }

    #[test]
    fn one_sided_and_missing() {
        let t = track();
        let fix = t.fix_at(at("2023-06-01T10:01:00Z"), Duration::seconds(60)).unwrap();
        assert_eq!(fix.latitude, 12.0);
        assert!(t.fix_at(at("2023-06-01T10:05:00Z"), Duration::seconds(60)).is_none());
        assert!(GpsInterpolator::default()
            .fix_at(at("2023-06-01T10:00:00Z"), Duration::seconds(60))
            .is_none());
    }

    #[test]
    fn exact_point_is_returned() {
        let fix = track()
            .fix_at(at("2023-06-01T09:59:30Z"), Duration::zero())
            .unwrap();
        assert_eq!(fix.latitude, 10.0);
    }

    #[test]
    fn naive_times_use_camera_zone_and_offset() {
        let t = GpsInterpolator::new(vec![point("2023-06-01T10:00:00Z", 1.0, 2.0, 3.0)])
            .with_camera_zone(FixedOffset::east_opt(2 * 3600));
        let naive = NaiveDateTime::parse_from_str("2023-06-01 12:00:10", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(
            t.normalize(CaptureTime::Naive(naive), Duration::seconds(-10)),
            Some(at("2023-06-01T10:00:00Z"))
        );
        let fix = t
            .fix_for(CaptureTime::Naive(naive), Duration::seconds(-10), Duration::zero())
            .unwrap();
        assert_eq!(fix.elevation, Some(3.0));

        let zoned = DateTime::parse_from_rfc3339("2023-06-01T10:00:00Z").unwrap();
        assert!(t.fix_for(CaptureTime::Zoned(zoned), Duration::zero(), Duration::zero()).is_some());
    }
}
