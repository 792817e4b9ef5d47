//! Collect -> evaluate -> execute loop shared by every stage.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::{RelocationMode, Settings};
use crate::error::{ConfigError, StageError, StageResult};
use crate::media::{self, MediaFile};
use crate::metadata::{MetadataPort, Tag, TagMap, TagValue, SIDECAR_EXTENSION};
use crate::progress::{ProgressCallback, ThrottledProgress};
use crate::task::TransitionTask;

/// Read-only view of the running stage handed to evaluators.
pub struct StageContext<'a> {
    pub source_root: &'a Path,
    pub destination_root: &'a Path,
    pub dry_run: bool,
    pub port: &'a dyn MetadataPort,
}

/// Stage-specific classification of collected files.
pub trait TaskEvaluator {
    fn name(&self) -> &str;

    /// Runs once over the whole collection before any [`classify`](Self::classify).
    /// An error here aborts the run before anything is touched.
    fn prepare(&mut self, _files: &[MediaFile], _ctx: &StageContext<'_>) -> StageResult<()> {
        Ok(())
    }

    fn classify(&mut self, index: usize, file: &MediaFile, ctx: &StageContext<'_>) -> StageResult<TransitionTask>;
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub recursive: bool,
    pub relocation: RelocationMode,
    pub flatten: bool,
    pub remove_empty_dirs: bool,
    pub stamp_history: bool,
    pub path_filter: Option<Regex>,
    pub overwrite_original: bool,
    pub dry_run: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            relocation: RelocationMode::Move,
            flatten: false,
            remove_empty_dirs: true,
            stamp_history: false,
            path_filter: None,
            overwrite_original: true,
            dry_run: false,
        }
    }
}

impl EngineOptions {
    pub fn from_settings(settings: &Settings, dry_run: bool) -> Result<Self, ConfigError> {
        let engine = &settings.engine;
        let path_filter = engine
            .path_filter
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| ConfigError::invalid("engine.path_filter", e.to_string()))?;
        Ok(Self {
            recursive: engine.recursive,
            relocation: engine.relocation,
            flatten: engine.flatten,
            remove_empty_dirs: engine.remove_empty_dirs,
            stamp_history: engine.stamp_history,
            path_filter,
            overwrite_original: settings.metadata.overwrite_original,
            dry_run,
        })
    }
}

/// A completed (or, in dry-run, planned) transition.
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub from: Vec<PathBuf>,
    pub to: Vec<PathBuf>,
    pub tags: TagMap,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileIssue {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one stage run.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub dry_run: bool,
    pub succeeded: Vec<Transition>,
    pub skipped: Vec<FileIssue>,
    pub failed: Vec<FileIssue>,
}

impl StageReport {
    pub fn new(stage: impl Into<String>, dry_run: bool) -> Self {
        Self {
            stage: stage.into(),
            dry_run,
            succeeded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn skip(&mut self, path: impl Into<PathBuf>, reason: impl Into<String>) {
        self.skipped.push(FileIssue {
            path: path.into(),
            reason: reason.into(),
        });
    }

    pub fn fail(&mut self, path: impl Into<PathBuf>, reason: impl Into<String>) {
        self.failed.push(FileIssue {
            path: path.into(),
            reason: reason.into(),
        });
    }

    pub fn summary(&self) -> String {
        format!(
            "{}{}: {} succeeded, {} skipped, {} failed",
            self.stage,
            if self.dry_run { " (dry run)" } else { "" },
            self.succeeded.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.dry_run { "would move" } else { "moved" };
        for t in &self.succeeded {
            let from = t.from.first().map(|p| p.display().to_string()).unwrap_or_default();
            let to = t.to.first().map(|p| p.display().to_string()).unwrap_or_default();
            writeln!(f, "{} {} -> {} ({} file(s))", verb, from, to, t.from.len())?;
            for (tag, value) in &t.tags {
                writeln!(f, "    {} = {}", tag, value)?;
            }
        }
        for issue in &self.skipped {
            writeln!(f, "skipped {}: {}", issue.path.display(), issue.reason)?;
        }
        for issue in &self.failed {
            writeln!(f, "FAILED {}: {}", issue.path.display(), issue.reason)?;
        }
        write!(f, "{}", self.summary())
    }
}

enum Rejection {
    Skip(String),
    Fail(String),
}

pub struct StageEngine<'a> {
    source_root: PathBuf,
    destination_root: PathBuf,
    options: EngineOptions,
    port: &'a dyn MetadataPort,
    progress: ThrottledProgress<'a>,
}

impl<'a> StageEngine<'a> {
    pub fn new(
        source_root: impl Into<PathBuf>,
        destination_root: impl Into<PathBuf>,
        options: EngineOptions,
        port: &'a dyn MetadataPort,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            destination_root: destination_root.into(),
            options,
            port,
            progress: ThrottledProgress::silent(),
        }
    }

    pub fn with_progress(mut self, callback: &'a ProgressCallback) -> Self {
        self.progress = ThrottledProgress::new(callback);
        self
    }

    fn context(&self) -> StageContext<'_> {
        StageContext {
            source_root: &self.source_root,
            destination_root: &self.destination_root,
            dry_run: self.options.dry_run,
            port: self.port,
        }
    }

    /// Full run: collect, evaluate, execute, then tidy the source tree.
    pub fn run(&self, evaluator: &mut dyn TaskEvaluator) -> StageResult<StageReport> {
        tracing::info!(
            "{}: {} -> {}{}",
            evaluator.name(),
            self.source_root.display(),
            self.destination_root.display(),
            if self.options.dry_run { " (dry run)" } else { "" }
        );
        let files = self.collect()?;
        let tasks = self.evaluate(evaluator, &files)?;
        let report = self.execute(evaluator.name(), &tasks, &files)?;
        tracing::info!("{}", report.summary());
        Ok(report)
    }

    /// Walk the source root and build one media file per base path, in walk order.
    pub fn collect(&self) -> StageResult<Vec<MediaFile>> {
        if !self.source_root.is_dir() {
            return Err(StageError::io(
                &self.source_root,
                io::Error::new(io::ErrorKind::NotFound, "source directory does not exist"),
            ));
        }

        let max_depth = if self.options.recursive { usize::MAX } else { 1 };
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.source_root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            match entry {
                Ok(entry) if entry.file_type().is_file() => paths.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => tracing::warn!("cannot read entry under {}: {}", self.source_root.display(), e),
            }
        }

        let total = paths.len();
        let mut files = Vec::new();
        for file in media::group_paths(paths) {
            if !file.is_valid() {
                tracing::debug!("rejecting {}", file.base().display());
                continue;
            }
            if let Some(filter) = &self.options.path_filter {
                let relative = self.relative_path(&file);
                if !filter.is_match(&relative) {
                    tracing::trace!("filtered out {}", relative);
                    continue;
                }
            }
            files.push(file);
        }
        self.progress
            .report("collect", 0, 1, &format!("{} media items from {} files", files.len(), total));
        tracing::debug!("collected {} media items from {} files", files.len(), total);
        Ok(files)
    }

    /// Classify every file; evaluator errors become skips.
    pub fn evaluate(
        &self,
        evaluator: &mut dyn TaskEvaluator,
        files: &[MediaFile],
    ) -> StageResult<Vec<TransitionTask>> {
        let ctx = self.context();
        evaluator.prepare(files, &ctx)?;

        let total = files.len() as u64;
        let mut tasks = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            self.progress.report("evaluate", index as u64, total, &file.stem());
            let mut task = match evaluator.classify(index, file, &ctx) {
                Ok(task) => task,
                Err(e) => TransitionTask::skipped(index, e.to_string()),
            };
            task.index = index;
            if task.skip {
                tracing::debug!("{}: skip {}: {}", evaluator.name(), file, task.skip_reason);
            } else {
                tracing::debug!("{}: proceed {}", evaluator.name(), file);
            }
            tasks.push(task);
        }
        Ok(tasks)
    }

    /// Apply every non-skipped task. Per-file problems are reported, never raised.
    pub fn execute(
        &self,
        stage: &str,
        tasks: &[TransitionTask],
        files: &[MediaFile],
    ) -> StageResult<StageReport> {
        let mut report = StageReport::new(stage, self.options.dry_run);

        if !self.options.dry_run {
            fs::create_dir_all(&self.destination_root)
                .map_err(|e| StageError::io(&self.destination_root, e))?;
        }

        let total = tasks.len() as u64;
        for (n, task) in tasks.iter().enumerate() {
            self.progress.report("execute", n as u64, total, "");
            let Some(file) = files.get(task.index) else {
                report.fail(
                    PathBuf::new(),
                    format!("task index {} outside collected files", task.index),
                );
                continue;
            };
            let label = file.primary_path().unwrap_or_else(|| file.base().to_path_buf());
            if task.skip {
                report.skip(label, task.skip_reason.clone());
                continue;
            }
            match self.transition(stage, task, file) {
                Ok(done) => report.succeeded.push(done),
                Err(Rejection::Skip(reason)) => report.skip(label, reason),
                Err(Rejection::Fail(reason)) => {
                    tracing::warn!("{}: {}: {}", stage, label.display(), reason);
                    report.fail(label, reason)
                }
            }
        }

        if self.options.remove_empty_dirs && !self.options.dry_run {
            let removed = remove_empty_dirs(&self.source_root)?;
            if removed > 0 {
                tracing::debug!("removed {} empty directories", removed);
            }
        }
        Ok(report)
    }

    fn relative_path(&self, file: &MediaFile) -> String {
        let path = file.primary_path().unwrap_or_else(|| file.base().to_path_buf());
        path.strip_prefix(&self.source_root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn target_dir(&self, task: &TransitionTask, file: &MediaFile) -> PathBuf {
        if let Some(dir) = &task.target_dir {
            return self.destination_root.join(dir);
        }
        if self.options.flatten {
            return self.destination_root.clone();
        }
        let relative = pathdiff::diff_paths(file.parent(), &self.source_root).unwrap_or_default();
        self.destination_root.join(relative)
    }

    fn transition(&self, stage: &str, task: &TransitionTask, file: &MediaFile) -> Result<Transition, Rejection> {
        let target_dir = self.target_dir(task, file);
        let stem = task.new_name.clone().unwrap_or_else(|| file.stem());
        let relocated = file.relocated(target_dir.join(&stem));

        let pairs: Vec<(PathBuf, PathBuf)> = file.paths().into_iter().zip(relocated.paths()).collect();
        for (src, dst) in &pairs {
            if src != dst && dst.exists() {
                return Err(Rejection::Skip(format!("already exists: {}", dst.display())));
            }
        }

        let mut tags = task.meta_tags.clone();
        if self.options.stamp_history {
            let mut history = self
                .port
                .read(&file.paths(), &[Tag::Contributor])
                .map_err(|e| Rejection::Fail(format!("cannot read stage history: {}", e)))?
                .remove(&Tag::Contributor)
                .map(|v| v.as_list())
                .unwrap_or_default();
            history.push(stage.to_string());
            tags.insert(Tag::Contributor, TagValue::List(history));
        }

        let from: Vec<PathBuf> = pairs.iter().map(|(s, _)| s.clone()).collect();
        let mut to: Vec<PathBuf> = pairs.iter().map(|(_, d)| d.clone()).collect();

        if self.options.dry_run {
            if !tags.is_empty() && relocated.uses_sidecar() && !relocated.has_extension(SIDECAR_EXTENSION) {
                to.push(relocated.sidecar_path());
            }
            return Ok(Transition { from, to, tags });
        }

        fs::create_dir_all(&target_dir)
            .map_err(|e| Rejection::Fail(format!("cannot create {}: {}", target_dir.display(), e)))?;

        let mut done: Vec<&(PathBuf, PathBuf)> = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            let (src, dst) = pair;
            if src == dst {
                continue;
            }
            if let Err(e) = relocate_file(src, dst, self.options.relocation) {
                if self.options.relocation == RelocationMode::Move {
                    for (back_src, back_dst) in done.iter().rev() {
                        if let Err(e) = fs::rename(back_dst, back_src) {
                            tracing::error!("cannot restore {}: {}", back_src.display(), e);
                        }
                    }
                }
                return Err(Rejection::Fail(format!("cannot relocate {}: {}", src.display(), e)));
            }
            done.push(pair);
        }

        if !tags.is_empty() {
            let written = self.write_tags(&relocated, &tags)?;
            if written.has_extension(SIDECAR_EXTENSION) && !relocated.has_extension(SIDECAR_EXTENSION) {
                to.push(written.sidecar_path());
            }
        }

        Ok(Transition { from, to, tags })
    }

    /// Write `tags` to every physical file, or to the sidecar when the
    /// primary format cannot hold them. Returns the resulting media value.
    fn write_tags(&self, file: &MediaFile, tags: &TagMap) -> Result<MediaFile, Rejection> {
        let (target, paths) = if file.uses_sidecar() {
            let with_sidecar = file.with_extension(SIDECAR_EXTENSION);
            let sidecar = with_sidecar.sidecar_path();
            (with_sidecar, vec![sidecar])
        } else {
            (file.clone(), file.paths())
        };
        for path in &paths {
            self.port
                .write(path, tags, self.options.overwrite_original)
                .map_err(|e| Rejection::Fail(format!("tag write failed for {}: {}", path.display(), e)))?;
        }
        Ok(target)
    }
}

/// Move or copy one physical file. Copies keep the source modification time.
pub fn relocate_file(src: &Path, dst: &Path, mode: RelocationMode) -> io::Result<()> {
    match mode {
        RelocationMode::Move => {
            if fs::rename(src, dst).is_ok() {
                return Ok(());
            }
            // rename fails across filesystems
            copy_preserving_mtime(src, dst)?;
            fs::remove_file(src)
        }
        RelocationMode::Copy => copy_preserving_mtime(src, dst),
    }
}

fn copy_preserving_mtime(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst)?;
    let meta = fs::metadata(src)?;
    filetime::set_file_mtime(dst, filetime::FileTime::from_last_modification_time(&meta))
}

/// Remove empty directories below `root`, deepest first. `root` itself stays.
pub fn remove_empty_dirs(root: &Path) -> StageResult<usize> {
    let mut removed = 0;
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("cannot inspect {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path();
        let is_empty = fs::read_dir(path)
            .map(|mut it| it.next().is_none())
            .unwrap_or(false);
        if is_empty {
            fs::remove_dir(path).map_err(|e| StageError::io(path, e))?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MemoryMetadata;
    use std::fs::File;
    use tempfile::tempdir;

    /// Proceeds with everything whose stem does not contain "skip";
    /// errors on stems containing "boom".
    struct Picky {
        tag: Option<(Tag, TagValue)>,
    }

    impl TaskEvaluator for Picky {
        fn name(&self) -> &str {
            "picky"
        }

        fn classify(&mut self, index: usize, file: &MediaFile, _ctx: &StageContext<'_>) -> StageResult<TransitionTask> {
            let stem = file.stem();
            if stem.contains("boom") {
                return Err(StageError::Evaluation("exploded".to_string()));
            }
            if stem.contains("skip") {
                return Ok(TransitionTask::skipped(index, "not wanted"));
            }
            let mut task = TransitionTask::proceed(index);
            if let Some((tag, value)) = &self.tag {
                task = task.with_tag(*tag, value.clone());
            }
            Ok(task)
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap();
    }

    #[test]
    fn moves_pairs_and_mirrors_subdirs() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        touch(&src.path().join("g/a.jpg"));
        touch(&src.path().join("g/a.ORF"));
        touch(&src.path().join("g/skip.jpg"));
        touch(&src.path().join("notes.txt"));

        let port = MemoryMetadata::new();
        let engine = StageEngine::new(src.path(), dst.path(), EngineOptions::default(), &port);
        let report = engine.run(&mut Picky { tag: None }).unwrap();

        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.failed.is_empty());
        assert!(dst.path().join("g/a.jpg").is_file());
        assert!(dst.path().join("g/a.ORF").is_file());
        assert!(!src.path().join("g/a.jpg").exists());
        assert!(src.path().join("g/skip.jpg").exists());
    }

    /// Deletes the raw companion of every item it lets through, so the
    /// second move of the pair fails after the first succeeded.
    struct LosesRaw;

    impl TaskEvaluator for LosesRaw {
        fn name(&self) -> &str {
            "loses-raw"
        }

        fn classify(&mut self, index: usize, file: &MediaFile, _ctx: &StageContext<'_>) -> StageResult<TransitionTask> {
            fs::remove_file(file.path_for(".ORF")).unwrap();
            Ok(TransitionTask::proceed(index))
        }
    }

    #[test]
    fn live_photo_clip_moves_with_its_still() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        touch(&src.path().join("g/IMG_0001.JPG"));
        touch(&src.path().join("g/IMG_0001.MOV"));

        let port = MemoryMetadata::new();
        let engine = StageEngine::new(src.path(), dst.path(), EngineOptions::default(), &port);
        let report = engine.run(&mut Picky { tag: None }).unwrap();

        assert_eq!(report.succeeded.len(), 2);
        assert!(dst.path().join("g/IMG_0001.JPG").is_file());
        assert!(dst.path().join("g/IMG_0001.MOV").is_file());
        assert!(!src.path().join("g").exists());
    }

    #[test]
    fn failed_pair_move_is_rolled_back() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        touch(&src.path().join("a.jpg"));
        touch(&src.path().join("a.ORF"));

        let port = MemoryMetadata::new();
        let engine = StageEngine::new(src.path(), dst.path(), EngineOptions::default(), &port);
        let report = engine.run(&mut LosesRaw).unwrap();

        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].reason.starts_with("cannot relocate"));
        assert!(src.path().join("a.jpg").is_file());
        assert!(!dst.path().join("a.jpg").exists());
    }

    #[test]
    fn evaluation_error_becomes_skip() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        touch(&src.path().join("boom.jpg"));
        touch(&src.path().join("fine.jpg"));

        let port = MemoryMetadata::new();
        let engine = StageEngine::new(src.path(), dst.path(), EngineOptions::default(), &port);
        let report = engine.run(&mut Picky { tag: None }).unwrap();

        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, "exploded");
    }

    #[test]
    fn existing_destination_is_skipped_not_overwritten() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        touch(&src.path().join("a.jpg"));
        fs::write(dst.path().join("a.jpg"), b"keep").unwrap();

        let port = MemoryMetadata::new();
        let engine = StageEngine::new(src.path(), dst.path(), EngineOptions::default(), &port);
        let report = engine.run(&mut Picky { tag: None }).unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].reason.starts_with("already exists"));
        assert_eq!(fs::read(dst.path().join("a.jpg")).unwrap(), b"keep");
        assert!(src.path().join("a.jpg").exists());
    }

    #[test]
    fn dry_run_touches_nothing() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        touch(&src.path().join("sub/a.jpg"));

        let port = MemoryMetadata::new();
        let options = EngineOptions {
            dry_run: true,
            ..EngineOptions::default()
        };
        let engine = StageEngine::new(src.path(), dst.path().join("out"), options, &port);
        let report = engine
            .run(&mut Picky {
                tag: Some((Tag::Rating, TagValue::Integer(3))),
            })
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.succeeded[0].to, vec![dst.path().join("out/sub/a.jpg")]);
        assert!(src.path().join("sub/a.jpg").exists());
        assert!(!dst.path().join("out").exists());
        assert!(port.record(&dst.path().join("out/sub/a.jpg")).is_none());
    }

    #[test]
    fn copy_mode_tags_only_the_copy() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        touch(&src.path().join("a.jpg"));

        let port = MemoryMetadata::new();
        let options = EngineOptions {
            relocation: RelocationMode::Copy,
            ..EngineOptions::default()
        };
        let engine = StageEngine::new(src.path(), dst.path(), options, &port);
        engine
            .run(&mut Picky {
                tag: Some((Tag::Description, TagValue::text("trip"))),
            })
            .unwrap();

        assert!(src.path().join("a.jpg").exists());
        assert!(port.record(&src.path().join("a.jpg")).is_none());
        let copied = port.read(&[dst.path().join("a.jpg")], &[Tag::Description]).unwrap();
        assert_eq!(copied.get(&Tag::Description), Some(&TagValue::text("trip")));
    }

    #[test]
    fn history_stamp_appends_stage() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        touch(&src.path().join("a.mp4"));

        let port = MemoryMetadata::new();
        port.write(
            &src.path().join("a.mp4"),
            &TagMap::from([(Tag::Contributor, TagValue::List(vec!["rename".into()]))]),
            true,
        )
        .unwrap();
        let options = EngineOptions {
            stamp_history: true,
            ..EngineOptions::default()
        };
        let engine = StageEngine::new(src.path(), dst.path(), options, &port);
        engine.run(&mut Picky { tag: None }).unwrap();

        let tags = port.read(&[dst.path().join("a.mp4")], &[Tag::Contributor]).unwrap();
        assert_eq!(
            tags.get(&Tag::Contributor),
            Some(&TagValue::List(vec!["rename".into(), "picky".into()]))
        );
    }

    #[test]
    fn wav_tags_land_in_sidecar() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        touch(&src.path().join("memo.wav"));

        let port = MemoryMetadata::new();
        let engine = StageEngine::new(src.path(), dst.path(), EngineOptions::default(), &port);
        let report = engine
            .run(&mut Picky {
                tag: Some((Tag::Label, TagValue::text("voice"))),
            })
            .unwrap();

        assert!(port.record(&dst.path().join("memo.wav")).is_none());
        assert!(port.record(&dst.path().join("memo.xmp")).is_some());
        assert_eq!(report.succeeded[0].to.last(), Some(&dst.path().join("memo.xmp")));
    }

    #[test]
    fn path_filter_and_flatten() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        touch(&src.path().join("keep/a.jpg"));
        touch(&src.path().join("other/b.jpg"));

        let port = MemoryMetadata::new();
        let options = EngineOptions {
            flatten: true,
            path_filter: Some(Regex::new("^keep/").unwrap()),
            ..EngineOptions::default()
        };
        let engine = StageEngine::new(src.path(), dst.path(), options, &port);
        let report = engine.run(&mut Picky { tag: None }).unwrap();

        assert_eq!(report.succeeded.len(), 1);
        assert!(dst.path().join("a.jpg").is_file());
        assert!(src.path().join("other/b.jpg").is_file());
        assert!(!src.path().join("keep").exists());
    }

    #[test]
    fn non_recursive_collect_stays_at_top() {
        let src = tempdir().unwrap();
        touch(&src.path().join("top.jpg"));
        touch(&src.path().join("deep/below.jpg"));

        let port = MemoryMetadata::new();
        let options = EngineOptions {
            recursive: false,
            ..EngineOptions::default()
        };
        let engine = StageEngine::new(src.path(), src.path(), options, &port);
        let files = engine.collect().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].stem(), "top");
    }

    #[test]
    fn missing_source_is_fatal() {
        let port = MemoryMetadata::new();
        let engine = StageEngine::new("/nonexistent/src", "/nonexistent/dst", EngineOptions::default(), &port);
        assert!(matches!(engine.collect(), Err(StageError::Io { .. })));
    }

    #[test]
    fn empty_dirs_removed_bottom_up_but_not_root() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join("a/b/c")).unwrap();
        touch(&root.path().join("d/keep.jpg"));
        assert_eq!(remove_empty_dirs(root.path()).unwrap(), 3);
        assert!(root.path().exists());
        assert!(root.path().join("d/keep.jpg").exists());
    }
}
