//! Mapping between canonical tags and the metadata tool's tag names.

use serde_json::{Map, Number, Value};

use super::{Tag, TagMap, TagValue};
use crate::error::MetadataError;

/// One tag as the tool knows it: the qualified name used for writing
/// and the bare key it reports in JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalTag {
    pub write_name: &'static str,
    pub key: &'static str,
}

const fn ext(write_name: &'static str, key: &'static str) -> ExternalTag {
    ExternalTag { write_name, key }
}

const TABLE: &[(Tag, ExternalTag)] = &[
    (Tag::Date, ext("DateTimeOriginal", "DateTimeOriginal")),
    (Tag::Source, ext("XMP-dc:Source", "Source")),
    (Tag::Description, ext("XMP-dc:Description", "Description")),
    (Tag::Rating, ext("XMP-xmp:Rating", "Rating")),
    (Tag::Subject, ext("XMP-dc:Subject", "Subject")),
    (Tag::HierarchicalSubject, ext("XMP-lr:HierarchicalSubject", "HierarchicalSubject")),
    (Tag::Label, ext("XMP-xmp:Label", "Label")),
    (Tag::Contributor, ext("XMP-dc:Contributor", "Contributor")),
    (Tag::GpsLatitude, ext("XMP-exif:GPSLatitude", "GPSLatitude")),
    (Tag::GpsLongitude, ext("XMP-exif:GPSLongitude", "GPSLongitude")),
    (Tag::GpsElevation, ext("XMP-exif:GPSAltitude", "GPSAltitude")),
];

const ALTITUDE_REF: ExternalTag = ext("XMP-exif:GPSAltitudeRef", "GPSAltitudeRef");

const ABOVE_SEA_LEVEL: i64 = 0;
const BELOW_SEA_LEVEL: i64 = 1;

pub fn external(tag: Tag) -> ExternalTag {
    TABLE
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, e)| *e)
        .unwrap_or(ext("", ""))
}

/// Every external tag that has to be requested to decode `tags`.
pub fn request(tags: &[Tag]) -> Vec<ExternalTag> {
    let mut out = Vec::with_capacity(tags.len() + 1);
    for tag in tags {
        out.push(external(*tag));
        if *tag == Tag::GpsElevation {
            out.push(ALTITUDE_REF);
        }
    }
    out
}

/// Translate canonical tags into (external tag, value) assignments.
pub fn encode(tags: &TagMap) -> Result<Vec<(ExternalTag, Value)>, MetadataError> {
    let mut out = Vec::with_capacity(tags.len() + 1);
    for (tag, value) in tags {
        match tag {
            Tag::GpsElevation => {
                let (altitude, reference) = split_elevation(decimal(*tag, value)?);
                out.push((external(*tag), number(*tag, altitude)?));
                out.push((ALTITUDE_REF, Value::from(reference)));
            }
            Tag::Rating => {
                let rating = value
                    .as_integer()
                    .filter(|r| (1..=5).contains(r))
                    .ok_or_else(|| invalid(*tag, format!("{} is not a rating 1-5", value)))?;
                out.push((external(*tag), Value::from(rating)));
            }
            t if t.is_decimal() => out.push((external(*tag), number(*tag, decimal(*tag, value)?)?)),
            t if t.is_list() => out.push((
                external(*tag),
                Value::Array(value.as_list().into_iter().map(Value::String).collect()),
            )),
            _ => out.push((external(*tag), Value::String(value.to_string()))),
        }
    }
    Ok(out)
}

/// Decode the requested canonical tags out of one JSON record from the tool.
pub fn decode(record: &Map<String, Value>, tags: &[Tag]) -> TagMap {
    let mut out = TagMap::new();
    for tag in tags {
        let Some(raw) = record.get(external(*tag).key) else {
            continue;
        };
        let decoded = match tag {
            Tag::GpsElevation => as_f64(raw).map(|altitude| {
                let below = record.get(ALTITUDE_REF.key).map_or(false, is_below_sea_level);
                TagValue::Decimal(join_elevation(altitude, below))
            }),
            Tag::Rating => as_f64(raw)
                .filter(|r| r.fract() == 0.0 && (1.0..=5.0).contains(r))
                .map(|r| TagValue::Integer(r as i64)),
            t if t.is_decimal() => as_f64(raw).map(TagValue::Decimal),
            t if t.is_list() => match raw {
                Value::Array(items) => Some(TagValue::List(items.iter().map(scalar_text).collect())),
                Value::Null => None,
                other => Some(TagValue::List(vec![scalar_text(other)])),
            },
            _ => match raw {
                Value::Null => None,
                Value::String(s) if s.is_empty() => None,
                other => Some(TagValue::Text(scalar_text(other))),
            },
        };
        match decoded {
            Some(value) => {
                out.insert(*tag, value);
            }
            None => tracing::debug!("dropping unusable {} value {}", tag, raw),
        }
    }
    out
}

/// Signed elevation -> (absolute altitude, reference flag).
pub fn split_elevation(elevation: f64) -> (f64, i64) {
    if elevation < 0.0 {
        (elevation.abs(), BELOW_SEA_LEVEL)
    } else {
        (elevation, ABOVE_SEA_LEVEL)
    }
}

pub fn join_elevation(altitude: f64, below_sea_level: bool) -> f64 {
    if below_sea_level {
        -altitude.abs()
    } else {
        altitude
    }
}

fn is_below_sea_level(reference: &Value) -> bool {
    match reference {
        Value::Number(n) => n.as_i64() == Some(BELOW_SEA_LEVEL),
        Value::String(s) => s.trim() == "1" || s.to_lowercase().starts_with("below"),
        _ => false,
    }
}

fn decimal(tag: Tag, value: &TagValue) -> Result<f64, MetadataError> {
    value
        .as_decimal()
        .ok_or_else(|| invalid(tag, format!("{} is not a number", value)))
}

fn number(tag: Tag, value: f64) -> Result<Value, MetadataError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| invalid(tag, format!("{} is not finite", value)))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn invalid(tag: Tag, reason: String) -> MetadataError {
    MetadataError::InvalidValue {
        tag: tag.label().to_string(),
        reason,
    }
}
