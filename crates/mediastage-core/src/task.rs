use std::path::PathBuf;

use crate::metadata::{Tag, TagMap, TagValue};

/// Decision for one collected media file.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionTask {
    /// Position in the collected file list.
    pub index: usize,
    /// Basename at the destination; `None` keeps the current one.
    pub new_name: Option<String>,
    /// Directory relative to the destination root, replacing the one
    /// mirrored from the source tree.
    pub target_dir: Option<PathBuf>,
    pub skip: bool,
    pub skip_reason: String,
    /// Written after relocation.
    pub meta_tags: TagMap,
}

impl TransitionTask {
    pub fn proceed(index: usize) -> Self {
        Self {
            index,
            new_name: None,
            target_dir: None,
            skip: false,
            skip_reason: String::new(),
            meta_tags: TagMap::new(),
        }
    }

    /// A skip must always say why; an empty reason is replaced.
    pub fn skipped(index: usize, reason: impl Into<String>) -> Self {
        let mut reason = reason.into();
        if reason.trim().is_empty() {
            reason = "skipped without reason".to_string();
        }
        Self {
            skip: true,
            skip_reason: reason,
            ..Self::proceed(index)
        }
    }

    pub fn renamed(mut self, new_name: impl Into<String>) -> Self {
        self.new_name = Some(new_name.into());
        self
    }

    pub fn into_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_dir = Some(dir.into());
        self
    }

    pub fn with_tag(mut self, tag: Tag, value: TagValue) -> Self {
        self.meta_tags.insert(tag, value);
        self
    }

    pub fn with_tags(mut self, tags: TagMap) -> Self {
        self.meta_tags.extend(tags);
        self
    }
}
