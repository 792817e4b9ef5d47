pub mod aggregate;
pub mod config;
pub mod convert;
pub mod date;
pub mod engine;
pub mod error;
pub mod gps;
pub mod group_name;
pub mod grouping;
pub mod localize;
pub mod media;
pub mod metadata;
pub mod progress;
pub mod rating;
pub mod rename;
pub mod status;
pub mod task;

use std::fmt;

use serde::Serialize;

pub use config::{Settings, StageKind};
pub use engine::{EngineOptions, StageEngine, StageReport, TaskEvaluator};
pub use error::{ConfigError, MetadataError, StageError, StageResult};
pub use grouping::{GroupMode, SequenceReport};
pub use media::MediaFile;
pub use metadata::{ExifTool, MetadataPort, Tag, TagMap, TagValue};
pub use progress::{ProgressCallback, ThrottledProgress};
pub use task::TransitionTask;

/// One stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRun {
    Rename,
    Convert,
    Group(GroupMode),
    Rate,
    Aggregate,
    Localize,
}

impl StageRun {
    pub fn kind(&self) -> StageKind {
        match self {
            StageRun::Rename => StageKind::Rename,
            StageRun::Convert => StageKind::Convert,
            StageRun::Group(_) => StageKind::Group,
            StageRun::Rate => StageKind::Rate,
            StageRun::Aggregate => StageKind::Aggregate,
            StageRun::Localize => StageKind::Localize,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RunOutput {
    Report(StageReport),
    Sequence(SequenceReport),
}

impl RunOutput {
    pub fn summary(&self) -> String {
        match self {
            RunOutput::Report(r) => r.summary(),
            RunOutput::Sequence(s) => s.summary(),
        }
    }

    /// Whether anything failed or, for the sequence check, any issue was found.
    pub fn has_problems(&self) -> bool {
        match self {
            RunOutput::Report(r) => !r.failed.is_empty(),
            RunOutput::Sequence(s) => !s.is_clean(),
        }
    }
}

impl fmt::Display for RunOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutput::Report(r) => fmt::Display::fmt(r, f),
            RunOutput::Sequence(s) => fmt::Display::fmt(s, f),
        }
    }
}

/// Run one stage as configured in `settings`.
///
/// Configuration problems (missing stage directories, converter, tracks) are
/// raised before any file is touched; per-file problems end up in the report.
pub fn run_stage(
    run: StageRun,
    settings: &Settings,
    port: &dyn MetadataPort,
    dry_run: bool,
    progress: Option<&ProgressCallback>,
) -> StageResult<RunOutput> {
    settings.validate()?;
    let dirs = settings.stage(run.kind())?;
    let options = EngineOptions::from_settings(settings, dry_run)?;

    let engine_for = |options: EngineOptions, same_root: bool| {
        let destination = if same_root { &dirs.source } else { &dirs.destination };
        let engine = StageEngine::new(&dirs.source, destination, options, port);
        match progress {
            Some(cb) => engine.with_progress(cb),
            None => engine,
        }
    };

    let report = match run {
        StageRun::Rename => engine_for(options, false).run(&mut rename::RenameEvaluator)?,
        StageRun::Convert => {
            let backend = convert::CommandConverter::new(&settings.convert)?;
            let flatten = options.flatten;
            let mut evaluator = convert::ConvertEvaluator::new(&backend, &settings.convert, flatten);
            engine_for(options, false).run(&mut evaluator)?
        }
        StageRun::Group(GroupMode::Transition) => {
            let mut evaluator = grouping::GroupedTransition::new(settings.grouping.description_tag);
            engine_for(options, false).run(&mut evaluator)?
        }
        StageRun::Group(GroupMode::Cluster) => {
            let options = EngineOptions {
                recursive: false,
                flatten: false,
                ..options
            };
            let separation = grouping::separation_from_hours(settings.grouping.separation_hours);
            engine_for(options, true).run(&mut grouping::Clusterer::new(separation))?
        }
        StageRun::Group(GroupMode::Undo) => {
            let options = EngineOptions {
                recursive: true,
                flatten: false,
                remove_empty_dirs: true,
                ..options
            };
            engine_for(options, true).run(&mut grouping::Unclusterer)?
        }
        StageRun::Group(GroupMode::Backfill) => grouping::backfill_folder_names(&dirs.source, port, dry_run)?,
        StageRun::Group(GroupMode::Check) => {
            return Ok(RunOutput::Sequence(grouping::check_sequence(&dirs.source, port)?));
        }
        StageRun::Rate => {
            let mut evaluator = rating::RatingEvaluator::new(settings.rating.clone());
            engine_for(options, false).run(&mut evaluator)?
        }
        StageRun::Aggregate => engine_for(options, false).run(&mut aggregate::AggregateEvaluator)?,
        StageRun::Localize => {
            let mut evaluator = localize::LocalizeEvaluator::from_settings(&settings.localize)?;
            engine_for(options, false).run(&mut evaluator)?
        }
    };
    Ok(RunOutput::Report(report))
}
