//! Rating consensus across the physical files of one media item.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::RatingSettings;
use crate::engine::{StageContext, TaskEvaluator};
use crate::error::StageResult;
use crate::media::{MediaFile, MediaKind, VIDEO};
use crate::metadata::{MetadataPort, Tag, TagValue};
use crate::task::TransitionTask;

/// Value of one tag as found in one physical file.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub file: String,
    pub value: Option<TagValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Consensus {
    /// No file carries the tag.
    Absent,
    /// Exactly one distinct value.
    Agreed(TagValue),
    /// Files disagree; every file carrying a value is listed.
    Conflict(Vec<(String, TagValue)>),
}

/// Render conflicting values as `{a.jpg: 2, a.ORF: 5}`.
pub struct ConflictList<'a>(pub &'a [(String, TagValue)]);

impl fmt::Display for ConflictList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (file, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", file, value)?;
        }
        f.write_str("}")
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a TagValue>) -> Vec<&'a TagValue> {
    let mut out: Vec<&TagValue> = Vec::new();
    for v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

fn has_extension(file: &str, extension: &str) -> bool {
    file.to_lowercase().ends_with(&extension.to_lowercase())
}

/// Reduce per-file readings of one tag to a single value.
///
/// With disagreeing files, the files ending in `overruling` decide if they
/// agree among themselves.
pub fn resolve_tag_consensus(readings: &[Reading], overruling: Option<&str>) -> Consensus {
    let present = || readings.iter().filter_map(|r| r.value.as_ref());
    let values = distinct(present());
    match values.len() {
        0 => return Consensus::Absent,
        1 => return Consensus::Agreed(values[0].clone()),
        _ => {}
    }

    if let Some(ext) = overruling {
        let ruling = distinct(
            readings
                .iter()
                .filter(|r| has_extension(&r.file, ext))
                .filter_map(|r| r.value.as_ref()),
        );
        if let [single] = ruling.as_slice() {
            return Consensus::Agreed((*single).clone());
        }
    }

    Consensus::Conflict(
        readings
            .iter()
            .filter_map(|r| r.value.clone().map(|v| (r.file.clone(), v)))
            .collect(),
    )
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read `tag` from each of `paths` separately.
pub fn read_readings(port: &dyn MetadataPort, paths: &[PathBuf], tag: Tag) -> StageResult<Vec<Reading>> {
    let maps = port.read_each(paths, &[tag])?;
    Ok(paths
        .iter()
        .zip(maps)
        .map(|(path, mut map)| Reading {
            file: file_name(path),
            value: map.remove(&tag),
        })
        .collect())
}

/// Decide the rating of each media item and normalize it across its files.
pub struct RatingEvaluator {
    settings: RatingSettings,
}

impl RatingEvaluator {
    pub fn new(settings: RatingSettings) -> Self {
        Self { settings }
    }

    fn fixed_rating(&self, file: &MediaFile) -> Option<i64> {
        if let Some(rating) = self.settings.enforced_rating {
            return Some(rating);
        }
        let is_video = file.kind().map_or(false, |k| k.name() == VIDEO.name());
        self.settings.video_rating.filter(|_| is_video)
    }
}

impl TaskEvaluator for RatingEvaluator {
    fn name(&self) -> &str {
        "rate"
    }

    fn classify(&mut self, index: usize, file: &MediaFile, ctx: &StageContext<'_>) -> StageResult<TransitionTask> {
        if let Some(rating) = self.fixed_rating(file) {
            return Ok(TransitionTask::proceed(index).with_tag(Tag::Rating, TagValue::Integer(rating)));
        }

        let paths = file.tag_paths();
        let readings = read_readings(ctx.port, &paths, Tag::Rating)?;
        let overruling = self.settings.overruling_extension.as_deref();

        Ok(match resolve_tag_consensus(&readings, overruling) {
            Consensus::Absent => TransitionTask::skipped(index, "no rating found"),
            Consensus::Agreed(value) => {
                let uniform = readings.iter().all(|r| r.value.as_ref() == Some(&value));
                if paths.len() > 1 || !uniform {
                    TransitionTask::proceed(index).with_tag(Tag::Rating, value)
                } else {
                    TransitionTask::proceed(index)
                }
            }
            Consensus::Conflict(values) => {
                TransitionTask::skipped(index, format!("conflicting ratings: {}", ConflictList(&values)))
            }
        })
    }
}
