use chrono::Duration;

use crate::config::LocalizeSettings;
use crate::date;
use crate::engine::{StageContext, TaskEvaluator};
use crate::error::{ConfigError, StageResult};
use crate::gps::{CaptureTime, GpsInterpolator};
use crate::media::MediaFile;
use crate::metadata::{Tag, TagValue};
use crate::task::TransitionTask;

/// Writes a position from the loaded tracks into every file that has none.
pub struct LocalizeEvaluator {
    interpolator: GpsInterpolator,
    offset: Duration,
    tolerance: Duration,
    transition_without_fix: bool,
}

impl LocalizeEvaluator {
    pub fn new(interpolator: GpsInterpolator, settings: &LocalizeSettings) -> Self {
        Self {
            interpolator,
            offset: Duration::seconds(settings.time_offset_seconds),
            tolerance: Duration::seconds(settings.tolerance_seconds),
            transition_without_fix: settings.transition_without_fix,
        }
    }

    /// Load the configured tracks.
    pub fn from_settings(settings: &LocalizeSettings) -> StageResult<Self> {
        if settings.tracks.is_empty() {
            return Err(ConfigError::MissingRequired("localize.tracks".to_string()).into());
        }
        let interpolator = GpsInterpolator::from_files(&settings.tracks)?.with_camera_zone(settings.camera_offset()?);
        tracing::info!(
            "{} track points from {} files",
            interpolator.len(),
            settings.tracks.len()
        );
        Ok(Self::new(interpolator, settings))
    }
}

impl TaskEvaluator for LocalizeEvaluator {
    fn name(&self) -> &str {
        "localize"
    }

    fn classify(&mut self, index: usize, file: &MediaFile, ctx: &StageContext<'_>) -> StageResult<TransitionTask> {
        let existing = ctx
            .port
            .read(&file.tag_paths(), &[Tag::GpsLatitude, Tag::GpsLongitude])?;
        if existing.contains_key(&Tag::GpsLatitude) && existing.contains_key(&Tag::GpsLongitude) {
            return Ok(TransitionTask::proceed(index));
        }

        let capture = match date::zoned_capture_time(file, ctx.port) {
            Some(zoned) => CaptureTime::Zoned(zoned),
            None => match file.kind().and_then(|k| k.read_capture_time(file, ctx.port)) {
                Some(found) => CaptureTime::Naive(found.date),
                None => return Ok(TransitionTask::skipped(index, "no capture time found")),
            },
        };
        let Some(fix) = self.interpolator.fix_for(capture, self.offset, self.tolerance) else {
            if self.transition_without_fix {
                return Ok(TransitionTask::proceed(index));
            }
            return Ok(TransitionTask::skipped(
                index,
                format!(
                    "no GPS fix within {}s of {}",
                    self.tolerance.num_seconds(),
                    describe(&capture)
                ),
            ));
        };

        let mut task = TransitionTask::proceed(index)
            .with_tag(Tag::GpsLatitude, TagValue::Decimal(fix.latitude))
            .with_tag(Tag::GpsLongitude, TagValue::Decimal(fix.longitude));
        if let Some(elevation) = fix.elevation {
            task = task.with_tag(Tag::GpsElevation, TagValue::Decimal(elevation));
        }
        Ok(task)
    }
}

fn describe(capture: &CaptureTime) -> String {
    match capture {
        CaptureTime::Naive(t) => date::format_timestamp(t),
        CaptureTime::Zoned(t) => format!("{}{}", date::format_timestamp(&t.naive_local()), t.offset()),
    }
}
