use crate::date;
use crate::engine::{StageContext, TaskEvaluator};
use crate::error::StageResult;
use crate::media::MediaFile;
use crate::metadata::{Tag, TagValue};
use crate::task::TransitionTask;

/// Prefixes every file with its capture time: `YYYY-MM-DD@HHMMSS_<stem>`.
///
/// The capture time is also written as the Date tag and the original file
/// name as Source, so later stages never have to guess again.
#[derive(Debug, Default)]
pub struct RenameEvaluator;

impl TaskEvaluator for RenameEvaluator {
    fn name(&self) -> &str {
        "rename"
    }

    fn classify(&mut self, index: usize, file: &MediaFile, ctx: &StageContext<'_>) -> StageResult<TransitionTask> {
        let Some(kind) = file.kind() else {
            return Ok(TransitionTask::skipped(index, "unknown media kind"));
        };
        let Some(found) = kind.read_capture_time(file, ctx.port) else {
            return Ok(TransitionTask::skipped(index, "no capture time found"));
        };

        let stem = file.stem();
        let original = file
            .primary_path()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| stem.clone());

        let mut task = TransitionTask::proceed(index).with_tag(Tag::Date, TagValue::date(found.date));
        if date::timestamp_prefix(&stem).is_some() {
            // Renamed earlier: the original name is only known from the tag.
            let existing = ctx.port.read(&file.tag_paths(), &[Tag::Source])?;
            if !existing.contains_key(&Tag::Source) {
                task = task.with_tag(Tag::Source, TagValue::text(original));
            }
            return Ok(task);
        }

        tracing::debug!("{} dated {} (accuracy {})", file, found.date, found.accuracy);
        Ok(task
            .renamed(format!("{}_{}", date::format_timestamp(&found.date), stem))
            .with_tag(Tag::Source, TagValue::text(original)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineOptions, StageEngine};
    use crate::metadata::{MemoryMetadata, MetadataPort, TagMap};
    use std::fs::{self, File};
    use std::path::Path;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap();
    }

    #[test]
    fn prefixes_pairs_and_tags_origin() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        touch(&src.path().join("trip/IMG_20190509_154733.jpg"));
        touch(&src.path().join("trip/IMG_20190509_154733.NEF"));
        touch(&src.path().join("trip/unknown.jpg"));

        let port = MemoryMetadata::new();
        let engine = StageEngine::new(src.path(), dst.path(), EngineOptions::default(), &port);
        let report = engine.run(&mut RenameEvaluator).unwrap();

        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.skipped[0].reason, "no capture time found");
        let renamed = dst.path().join("trip/2019-05-09@154733_IMG_20190509_154733");
        assert!(renamed.with_extension("jpg").is_file());
        assert!(renamed.with_extension("NEF").is_file());

        let tags = port
            .read(&[renamed.with_extension("NEF")], &[Tag::Date, Tag::Source])
            .unwrap();
        assert_eq!(tags.get(&Tag::Date), Some(&TagValue::text("2019:05:09 15:47:33")));
        assert_eq!(tags.get(&Tag::Source), Some(&TagValue::text("IMG_20190509_154733.jpg")));
    }

    #[test]
    fn already_prefixed_keeps_name_and_source() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let path = src.path().join("2022-12-12@121212_test.jpg");
        touch(&path);

        let port = MemoryMetadata::new();
        port.write(&path, &TagMap::from([(Tag::Source, TagValue::text("P1.JPG"))]), true)
            .unwrap();
        let engine = StageEngine::new(src.path(), dst.path(), EngineOptions::default(), &port);
        let report = engine.run(&mut RenameEvaluator).unwrap();

        assert_eq!(report.succeeded.len(), 1);
        assert!(!report.succeeded[0].tags.contains_key(&Tag::Source));
        assert!(dst.path().join("2022-12-12@121212_test.jpg").is_file());
    }
}
