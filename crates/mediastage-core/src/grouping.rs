//! Time-based group folders: transition of grouped files, automatic
//! clustering and its undo, folder-name backfill and the sequence check.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use walkdir::WalkDir;

use crate::date;
use crate::engine::{StageContext, StageReport, TaskEvaluator, Transition};
use crate::error::{StageError, StageResult};
use crate::group_name::{self, dir_name};
use crate::media::{self, MediaFile};
use crate::metadata::{MetadataPort, Tag, TagMap, TagValue};
use crate::task::TransitionTask;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum GroupMode {
    /// Move correctly grouped files on to the next stage.
    #[default]
    Transition,
    /// Put loose files at the stage root into `TODO_<timestamp>` folders.
    Cluster,
    /// Dissolve `TODO_<timestamp>` folders back into the stage root.
    Undo,
    /// Prefix undated folders with the earliest timestamp of their children.
    Backfill,
    /// Report overlapping groups and wrong group timestamps.
    Check,
}

pub(crate) fn capture(file: &MediaFile, port: &dyn MetadataPort) -> Option<NaiveDateTime> {
    file.kind()?.read_capture_time(file, port).map(|r| r.date)
}

/// Valid media files directly inside `dir`.
fn media_in(dir: &Path) -> StageResult<Vec<MediaFile>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }
    Ok(media::group_paths(paths)
        .into_iter()
        .filter(MediaFile::is_valid)
        .collect())
}

/// Every directory below `root`, deepest first.
fn subdirs(root: &Path) -> StageResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}

fn require_dir(root: &Path) -> StageResult<()> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(StageError::io(
            root,
            io::Error::new(io::ErrorKind::NotFound, "stage directory does not exist"),
        ))
    }
}

// ---------------------------------------------------------------------------
// Grouped-file transition
// ---------------------------------------------------------------------------

/// Lets a file through only when every folder between it and the stage root
/// is a correct group name.
#[derive(Debug, Default)]
pub struct GroupedTransition {
    description_tag: bool,
    accepted: HashSet<PathBuf>,
    rejected: HashSet<PathBuf>,
}

impl GroupedTransition {
    pub fn new(description_tag: bool) -> Self {
        Self {
            description_tag,
            ..Self::default()
        }
    }

    /// Validate the folder chain from `dir` up to (excluding) `root`.
    ///
    /// Every folder visited is remembered, so siblings and nested files under
    /// a known folder never walk the chain again.
    fn check_chain(&mut self, dir: &Path, root: &Path) -> Result<(), String> {
        if !dir.starts_with(root) {
            return Err(format!("{} is outside the stage root", dir.display()));
        }

        let mut visited: Vec<PathBuf> = Vec::new();
        let mut current = dir;
        let outcome = loop {
            if current == root || self.accepted.contains(current) {
                break Ok(());
            }
            if self.rejected.contains(current) {
                break Err("inherits a previously-rejected ancestor".to_string());
            }
            visited.push(current.to_path_buf());
            let name = dir_name(current);
            if let Err(e) = group_name::check_group_name(&name) {
                break Err(format!("group folder name fails grammar: '{}': {}", name, e));
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break Ok(()),
            }
        };

        match &outcome {
            Ok(()) => self.accepted.extend(visited),
            Err(_) => self.rejected.extend(visited),
        }
        outcome
    }
}

impl TaskEvaluator for GroupedTransition {
    fn name(&self) -> &str {
        "group"
    }

    fn classify(&mut self, index: usize, file: &MediaFile, ctx: &StageContext<'_>) -> StageResult<TransitionTask> {
        let parent = file.parent();
        if parent == ctx.source_root {
            return Ok(TransitionTask::skipped(index, "not in a group folder"));
        }
        if let Err(reason) = self.check_chain(parent, ctx.source_root) {
            return Ok(TransitionTask::skipped(index, reason));
        }

        let mut task = TransitionTask::proceed(index);
        if self.description_tag {
            task = task.with_tag(Tag::Description, TagValue::text(dir_name(parent)));
        }
        Ok(task)
    }
}

// ---------------------------------------------------------------------------
// Automatic clustering
// ---------------------------------------------------------------------------

/// Greedy single pass over `(index, time)` pairs sorted by time. A gap of at
/// least `separation` to the previous item starts a new group. Returns the
/// anchor of each item's group.
pub fn cluster(items: &[(usize, NaiveDateTime)], separation: Duration) -> Vec<(usize, NaiveDateTime)> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut out = Vec::with_capacity(sorted.len());
    let mut anchor: Option<NaiveDateTime> = None;
    let mut previous: Option<NaiveDateTime> = None;
    for (index, time) in sorted {
        let starts_group = match previous {
            None => true,
            Some(prev) => time - prev >= separation,
        };
        if starts_group {
            anchor = Some(time);
        }
        previous = Some(time);
        if let Some(anchor) = anchor {
            out.push((index, anchor));
        }
    }
    out
}

/// Converts a threshold in hours; sub-second precision is dropped.
pub fn separation_from_hours(hours: f64) -> Duration {
    Duration::seconds((hours * 3600.0).round() as i64)
}

/// Sorts loose files at the stage root into `TODO_<anchor>` folders.
pub struct Clusterer {
    separation: Duration,
    anchors: Vec<Result<NaiveDateTime, String>>,
}

impl Clusterer {
    pub fn new(separation: Duration) -> Self {
        Self {
            separation,
            anchors: Vec::new(),
        }
    }
}

impl TaskEvaluator for Clusterer {
    fn name(&self) -> &str {
        "group --auto"
    }

    fn prepare(&mut self, files: &[MediaFile], ctx: &StageContext<'_>) -> StageResult<()> {
        self.anchors = vec![Err("not clustered".to_string()); files.len()];

        let mut timed = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            if file.parent() != ctx.source_root {
                self.anchors[index] = Err("already inside a folder".to_string());
                continue;
            }
            match capture(file, ctx.port) {
                Some(time) => timed.push((index, time)),
                None => self.anchors[index] = Err("no capture time found".to_string()),
            }
        }

        let assigned = cluster(&timed, self.separation);
        let groups: HashSet<NaiveDateTime> = assigned.iter().map(|(_, a)| *a).collect();
        tracing::info!("{} files form {} clusters", assigned.len(), groups.len());
        for (index, anchor) in assigned {
            self.anchors[index] = Ok(anchor);
        }
        Ok(())
    }

    fn classify(&mut self, index: usize, _file: &MediaFile, _ctx: &StageContext<'_>) -> StageResult<TransitionTask> {
        Ok(match self.anchors.get(index) {
            Some(Ok(anchor)) => TransitionTask::proceed(index).into_dir(group_name::cluster_name(anchor)),
            Some(Err(reason)) => TransitionTask::skipped(index, reason.clone()),
            None => TransitionTask::skipped(index, "not clustered"),
        })
    }
}

/// Moves files out of `TODO_<timestamp>` folders back to the stage root.
#[derive(Debug, Default)]
pub struct Unclusterer;

impl TaskEvaluator for Unclusterer {
    fn name(&self) -> &str {
        "group --undo"
    }

    fn classify(&mut self, index: usize, file: &MediaFile, ctx: &StageContext<'_>) -> StageResult<TransitionTask> {
        let parent = file.parent();
        let in_cluster = parent.parent() == Some(ctx.source_root)
            && group_name::parse_cluster_name(&dir_name(parent)).is_some();
        Ok(if in_cluster {
            TransitionTask::proceed(index).into_dir(PathBuf::new())
        } else {
            TransitionTask::skipped(index, "not inside a TODO_ cluster folder")
        })
    }
}

// ---------------------------------------------------------------------------
// Folder-name backfill
// ---------------------------------------------------------------------------

fn earliest_child(
    dir: &Path,
    port: &dyn MetadataPort,
    planned: &HashMap<PathBuf, NaiveDateTime>,
) -> StageResult<Option<NaiveDateTime>> {
    let mut times: Vec<NaiveDateTime> = media_in(dir)?
        .iter()
        .filter_map(|f| capture(f, port))
        .collect();

    for entry in fs::read_dir(dir).map_err(|e| StageError::io(dir, e))? {
        let entry = entry.map_err(|e| StageError::io(dir, e))?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        // In a dry run renamed children still carry their old names.
        let time = planned
            .get(&path)
            .copied()
            .or_else(|| date::timestamp_prefix(&dir_name(&path)));
        times.extend(time);
    }
    Ok(times.into_iter().min())
}

/// Rename every undated folder below `root` to `<earliest child timestamp>_<name>`.
///
/// Folders are handled deepest first so that a parent sees the timestamps of
/// freshly renamed children.
pub fn backfill_folder_names(root: &Path, port: &dyn MetadataPort, dry_run: bool) -> StageResult<StageReport> {
    require_dir(root)?;
    let mut report = StageReport::new("group --backfill", dry_run);
    let mut planned: HashMap<PathBuf, NaiveDateTime> = HashMap::new();

    for dir in subdirs(root)? {
        let name = dir_name(&dir);
        if name.contains('@') || group_name::looks_date_like(&name) {
            tracing::trace!("already dated: {}", dir.display());
            continue;
        }
        let Some(earliest) = earliest_child(&dir, port, &planned)? else {
            report.skip(&dir, "no timestamp among its children");
            continue;
        };
        let target = dir.with_file_name(format!("{}_{}", date::format_timestamp(&earliest), name));
        if target.exists() {
            report.skip(&dir, format!("already exists: {}", target.display()));
            continue;
        }
        if !dry_run {
            if let Err(e) = fs::rename(&dir, &target) {
                tracing::warn!("cannot rename {}: {}", dir.display(), e);
                report.fail(&dir, format!("cannot rename: {}", e));
                continue;
            }
        }
        tracing::debug!("{} -> {}", dir.display(), target.display());
        planned.insert(dir.clone(), earliest);
        report.succeeded.push(Transition {
            from: vec![dir],
            to: vec![target],
            tags: TagMap::new(),
        });
    }

    tracing::info!("{}", report.summary());
    Ok(report)
}

// ---------------------------------------------------------------------------
// Sequence check
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct GroupIssue {
    pub group: PathBuf,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SequenceReport {
    pub groups_checked: usize,
    pub overlapping: Vec<GroupIssue>,
    pub wrong_timestamp: Vec<GroupIssue>,
}

impl SequenceReport {
    pub fn is_clean(&self) -> bool {
        self.overlapping.is_empty() && self.wrong_timestamp.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "group --check: {} groups, {} overlapping, {} wrong group timestamp",
            self.groups_checked,
            self.overlapping.len(),
            self.wrong_timestamp.len()
        )
    }
}

impl fmt::Display for SequenceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in &self.overlapping {
            writeln!(f, "overlapping {}: {}", issue.group.display(), issue.detail)?;
        }
        for issue in &self.wrong_timestamp {
            writeln!(f, "wrong group timestamp {}: {}", issue.group.display(), issue.detail)?;
        }
        write!(f, "{}", self.summary())
    }
}

/// Anchor of `dir` when it and every folder above it up to `root` are
/// correct group names.
fn grouped_anchor(dir: &Path, root: &Path) -> Option<NaiveDateTime> {
    let relative = dir.strip_prefix(root).ok()?;
    let mut anchor = None;
    for component in relative.components() {
        let name = component.as_os_str().to_string_lossy();
        anchor = Some(group_name::check_group_name(&name).ok()?);
    }
    anchor
}

struct Group {
    dir: PathBuf,
    anchor: NaiveDateTime,
    files: Vec<(String, NaiveDateTime)>,
}

/// Check correctly grouped folders against each other. Nothing is modified.
pub fn check_sequence(root: &Path, port: &dyn MetadataPort) -> StageResult<SequenceReport> {
    require_dir(root)?;

    let mut groups = Vec::new();
    for dir in subdirs(root)? {
        let Some(anchor) = grouped_anchor(&dir, root) else {
            continue;
        };
        let files = media_in(&dir)?
            .iter()
            .filter_map(|f| capture(f, port).map(|t| (f.stem(), t)))
            .collect();
        groups.push(Group { dir, anchor, files });
    }
    groups.sort_by(|a, b| a.anchor.cmp(&b.anchor).then_with(|| a.dir.cmp(&b.dir)));

    let mut report = SequenceReport {
        groups_checked: groups.len(),
        ..SequenceReport::default()
    };
    for (i, group) in groups.iter().enumerate() {
        if let Some(next) = groups.get(i + 1) {
            for (stem, time) in &group.files {
                if *time > next.anchor {
                    report.overlapping.push(GroupIssue {
                        group: group.dir.clone(),
                        detail: format!(
                            "{} ({}) is later than {}",
                            stem,
                            date::format_timestamp(time),
                            dir_name(&next.dir)
                        ),
                    });
                }
            }
        }
        if let Some(earliest) = group.files.iter().map(|(_, t)| *t).min() {
            if earliest != group.anchor {
                report.wrong_timestamp.push(GroupIssue {
                    group: group.dir.clone(),
                    detail: format!(
                        "named {} but earliest file is {}",
                        date::format_timestamp(&group.anchor),
                        date::format_timestamp(&earliest)
                    ),
                });
            }
        }
    }

    tracing::info!("{}", report.summary());
    Ok(report)
}
