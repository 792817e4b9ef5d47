use crate::engine::{StageContext, TaskEvaluator};
use crate::error::StageResult;
use crate::media::MediaFile;
use crate::metadata::Tag;
use crate::rating::{read_readings, resolve_tag_consensus, Consensus, ConflictList};
use crate::task::TransitionTask;

/// Tags every item must carry, identically on every physical file, before it
/// leaves the workflow.
pub const REQUIRED_TAGS: [Tag; 4] = [Tag::Rating, Tag::Date, Tag::Source, Tag::Description];

/// Final gate: nothing is rewritten, incomplete or inconsistent items stay.
#[derive(Debug, Default)]
pub struct AggregateEvaluator;

impl TaskEvaluator for AggregateEvaluator {
    fn name(&self) -> &str {
        "aggregate"
    }

    fn classify(&mut self, index: usize, file: &MediaFile, ctx: &StageContext<'_>) -> StageResult<TransitionTask> {
        let paths = file.tag_paths();
        for tag in REQUIRED_TAGS {
            let readings = read_readings(ctx.port, &paths, tag)?;
            if let Some(missing) = readings.iter().find(|r| r.value.is_none()) {
                return Ok(TransitionTask::skipped(
                    index,
                    format!("missing {} in {}", tag.label(), missing.file),
                ));
            }
            if let Consensus::Conflict(values) = resolve_tag_consensus(&readings, None) {
                return Ok(TransitionTask::skipped(
                    index,
                    format!("conflicting {}: {}", tag.label(), ConflictList(&values)),
                ));
            }
        }
        Ok(TransitionTask::proceed(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MemoryMetadata, MetadataPort, TagMap, TagValue};
    use std::path::{Path, PathBuf};

    fn complete_tags(rating: i64) -> TagMap {
        TagMap::from([
            (Tag::Rating, TagValue::Integer(rating)),
            (Tag::Date, TagValue::text("2022:12:12 12:12:12")),
            (Tag::Source, TagValue::text("P1010001.ORF")),
            (Tag::Description, TagValue::text("2022-12-12@121212_TEST")),
        ])
    }

    fn evaluate(file: &MediaFile, port: &MemoryMetadata) -> TransitionTask {
        let root = Path::new("/stage");
        let ctx = StageContext {
            source_root: root,
            destination_root: root,
            dry_run: true,
            port,
        };
        AggregateEvaluator.classify(0, file, &ctx).unwrap()
    }

    fn pair() -> MediaFile {
        MediaFile::from_siblings(PathBuf::from("/stage/x"), &[".jpg".to_string(), ".ORF".to_string()])
    }

    #[test]
    fn complete_and_identical_passes() {
        let port = MemoryMetadata::new();
        let file = pair();
        for path in file.paths() {
            port.write(&path, &complete_tags(5), true).unwrap();
        }
        let task = evaluate(&file, &port);
        assert!(!task.skip, "{}", task.skip_reason);
        assert!(task.meta_tags.is_empty());
    }

    #[test]
    fn tag_missing_on_one_file_is_named() {
        let port = MemoryMetadata::new();
        let file = pair();
        port.write(&file.path_for(".jpg"), &complete_tags(5), true).unwrap();
        let mut partial = complete_tags(5);
        partial.remove(&Tag::Rating);
        port.write(&file.path_for(".ORF"), &partial, true).unwrap();

        let task = evaluate(&file, &port);
        assert!(task.skip);
        assert_eq!(task.skip_reason, "missing rating in x.ORF");
    }

    #[test]
    fn differing_values_are_listed() {
        let port = MemoryMetadata::new();
        let file = pair();
        port.write(&file.path_for(".jpg"), &complete_tags(5), true).unwrap();
        port.write(&file.path_for(".ORF"), &complete_tags(4), true).unwrap();

        let task = evaluate(&file, &port);
        assert_eq!(task.skip_reason, "conflicting rating: {x.jpg: 5, x.ORF: 4}");
    }
}
