use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::config::{Settings, StageKind};
use crate::error::StageResult;
use crate::media;

/// What is waiting in one stage's source directory.
#[derive(Debug, Clone, Serialize)]
pub struct StageStatus {
    pub stage: StageKind,
    pub source: PathBuf,
    pub exists: bool,
    pub media_items: usize,
    pub physical_files: usize,
    /// Files no media item accounts for.
    pub rejected: Vec<PathBuf>,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.exists {
            return write!(f, "{:<10} {} (missing)", self.stage, self.source.display());
        }
        write!(
            f,
            "{:<10} {:>6} items {:>6} files {:>4} rejected  {}",
            self.stage,
            self.media_items,
            self.physical_files,
            self.rejected.len(),
            self.source.display()
        )
    }
}

pub fn stage_status(stage: StageKind, source: &Path, recursive: bool) -> StageResult<StageStatus> {
    let mut status = StageStatus {
        stage,
        source: source.to_path_buf(),
        exists: source.is_dir(),
        media_items: 0,
        physical_files: 0,
        rejected: Vec::new(),
    };
    if !status.exists {
        return Ok(status);
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut paths = Vec::new();
    for entry in WalkDir::new(source).min_depth(1).max_depth(max_depth).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }

    let mut accounted: HashSet<PathBuf> = HashSet::new();
    for file in media::group_paths(paths.iter().cloned()) {
        if file.is_valid() {
            status.media_items += 1;
            accounted.extend(file.paths());
        }
    }
    status.physical_files = paths.len();
    status.rejected = paths.into_iter().filter(|p| !accounted.contains(p)).collect();
    Ok(status)
}

/// Status of every configured stage, in workflow order.
pub fn status(settings: &Settings) -> StageResult<Vec<StageStatus>> {
    StageKind::ALL
        .iter()
        .filter_map(|kind| settings.stages.get(kind).map(|dirs| (*kind, dirs)))
        .map(|(kind, dirs)| stage_status(kind, &dirs.source, settings.engine.recursive))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageDirs;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn counts_items_and_rejects() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        for name in ["a.jpg", "a.ORF", "b.mp4", "notes.txt", "sub/c.wav", "sub/c.xmp"] {
            File::create(dir.path().join(name)).unwrap();
        }

        let s = stage_status(StageKind::Rate, dir.path(), true).unwrap();
        assert_eq!(s.media_items, 3);
        assert_eq!(s.physical_files, 6);
        assert_eq!(s.rejected, vec![dir.path().join("notes.txt")]);

        let top = stage_status(StageKind::Rate, dir.path(), false).unwrap();
        assert_eq!(top.media_items, 2);
    }

    #[test]
    fn missing_stage_dirs_are_reported() {
        let mut settings = Settings::default();
        settings.stages.insert(
            StageKind::Group,
            StageDirs {
                source: PathBuf::from("/nonexistent/group"),
                destination: PathBuf::from("/nonexistent/rate"),
            },
        );
        let all = status(&settings).unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].exists);
        assert!(all[0].to_string().contains("(missing)"));
    }
}
