use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::date::{self, DateResult};
use crate::metadata::{MetadataPort, SIDECAR_EXTENSION};

/// Capabilities that differ between images, videos and audio.
pub trait MediaKind: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Extensions (lowercase, dot included) that may carry the media itself,
    /// in primary-first order.
    fn media_extensions(&self) -> &'static [&'static str];

    /// Whether tags for a file with this extension go into a sidecar instead.
    fn needs_sidecar(&self, _extension: &str) -> bool {
        false
    }

    fn read_capture_time(&self, file: &MediaFile, port: &dyn MetadataPort) -> Option<DateResult>;

    fn accepts(&self, extension: &str) -> bool {
        let lower = extension.to_lowercase();
        self.media_extensions().iter().any(|e| *e == lower)
    }
}

#[derive(Debug)]
pub struct ImageKind;

#[derive(Debug)]
pub struct VideoKind;

#[derive(Debug)]
pub struct AudioKind;

pub static IMAGE: ImageKind = ImageKind;
pub static VIDEO: VideoKind = VideoKind;
pub static AUDIO: AudioKind = AudioKind;

/// Raw companions that may accompany a processed image.
pub const RAW_EXTENSIONS: &[&str] = &[".orf", ".nef", ".dng"];

impl MediaKind for ImageKind {
    fn name(&self) -> &'static str {
        "image"
    }

    fn media_extensions(&self) -> &'static [&'static str] {
        &[".jpg", ".jpeg", ".orf", ".nef", ".dng"]
    }

    fn read_capture_time(&self, file: &MediaFile, port: &dyn MetadataPort) -> Option<DateResult> {
        date::capture_time(file, port, true)
    }
}

impl MediaKind for VideoKind {
    fn name(&self) -> &'static str {
        "video"
    }

    fn media_extensions(&self) -> &'static [&'static str] {
        &[".mp4", ".mov", ".3gp", ".m4v"]
    }

    fn read_capture_time(&self, file: &MediaFile, port: &dyn MetadataPort) -> Option<DateResult> {
        date::capture_time(file, port, false)
    }
}

impl MediaKind for AudioKind {
    fn name(&self) -> &'static str {
        "audio"
    }

    fn media_extensions(&self) -> &'static [&'static str] {
        &[".mp3", ".wav"]
    }

    fn needs_sidecar(&self, extension: &str) -> bool {
        extension.eq_ignore_ascii_case(".wav")
    }

    fn read_capture_time(&self, file: &MediaFile, port: &dyn MetadataPort) -> Option<DateResult> {
        date::capture_time(file, port, false)
    }
}

static KINDS: [&'static dyn MediaKind; 3] = [&IMAGE, &VIDEO, &AUDIO];

/// Look up the media kind that accepts `extension`.
pub fn kind_for_extension(extension: &str) -> Option<&'static dyn MediaKind> {
    KINDS.iter().copied().find(|k| k.accepts(extension))
}

pub fn is_raw_extension(extension: &str) -> bool {
    let lower = extension.to_lowercase();
    RAW_EXTENSIONS.contains(&lower.as_str())
}

/// Split a path into (path without extension, ".ext").
pub fn split_extension(path: &Path) -> Option<(PathBuf, String)> {
    let ext = path.extension()?.to_str()?;
    Some((path.with_extension(""), format!(".{}", ext)))
}

/// One logical media item: every physical file sharing a base path.
#[derive(Debug, Clone)]
pub struct MediaFile {
    base: PathBuf,
    extensions: Vec<String>,
    kind: Option<&'static dyn MediaKind>,
}

impl MediaFile {
    /// Build the primary media item from the extensions found next to `base`.
    ///
    /// Files of other kinds sharing the base name are not part of it; see
    /// [`split_siblings`](Self::split_siblings).
    pub fn from_siblings(base: PathBuf, found: &[String]) -> Self {
        Self::split_siblings(base.clone(), found)
            .into_iter()
            .next()
            .unwrap_or_else(|| Self::of_kind(base, found, None))
    }

    /// One media item per kind present among `found`, in image, video, audio
    /// order. A sidecar belongs to the item that cannot embed tags, otherwise
    /// to the first item. Unknown extensions are left out.
    ///
    /// With no known extension the single returned item has no kind and is invalid.
    pub fn split_siblings(base: PathBuf, found: &[String]) -> Vec<Self> {
        for ext in found {
            if kind_for_extension(ext).is_none() && !ext.eq_ignore_ascii_case(SIDECAR_EXTENSION) {
                tracing::debug!("ignoring {}{}", base.display(), ext);
            }
        }

        let mut items: Vec<Self> = KINDS
            .iter()
            .copied()
            .filter(|kind| found.iter().any(|ext| kind.accepts(ext)))
            .map(|kind| Self::of_kind(base.clone(), found, Some(kind)))
            .collect();
        if items.is_empty() {
            return vec![Self::of_kind(base, found, None)];
        }

        let sidecars: Vec<String> = found
            .iter()
            .filter(|ext| ext.eq_ignore_ascii_case(SIDECAR_EXTENSION))
            .cloned()
            .collect();
        let owner = items.iter().position(MediaFile::uses_sidecar).unwrap_or(0);
        items[owner].extensions.extend(sidecars);
        items
    }

    fn of_kind(base: PathBuf, found: &[String], kind: Option<&'static dyn MediaKind>) -> Self {
        let mut extensions = Vec::new();
        if let Some(kind) = kind {
            for wanted in kind.media_extensions() {
                extensions.extend(
                    found
                        .iter()
                        .filter(|ext| ext.to_lowercase() == *wanted)
                        .cloned(),
                );
            }
        }
        Self {
            base,
            extensions,
            kind,
        }
    }

    /// Scan the directory of `path` for every physical file sharing its base
    /// name and return the item `path` belongs to.
    pub fn scan(path: &Path) -> std::io::Result<Self> {
        let (base, _) = split_extension(path).unwrap_or_else(|| (path.to_path_buf(), String::new()));
        let dir = base.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = base.file_name().map(|s| s.to_os_string()).unwrap_or_default();

        let mut found = Vec::new();
        let dir = if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir
        };
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some((entry_base, ext)) = split_extension(&entry.path()) {
                if entry_base.file_name() == Some(stem.as_os_str()) {
                    found.push(ext);
                }
            }
        }
        found.sort();
        let own_kind = split_extension(path).and_then(|(_, ext)| kind_for_extension(&ext));
        let mut items = Self::split_siblings(base, &found);
        let at = items
            .iter()
            .position(|m| match (m.kind, own_kind) {
                (Some(a), Some(b)) => a.name() == b.name(),
                _ => false,
            })
            .unwrap_or(0);
        Ok(items.swap_remove(at))
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn kind(&self) -> Option<&'static dyn MediaKind> {
        self.kind
    }

    /// Base name without directory or extension.
    pub fn stem(&self) -> String {
        self.base
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn parent(&self) -> &Path {
        self.base.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn primary_extension(&self) -> Option<&str> {
        self.extensions
            .iter()
            .find(|e| !e.eq_ignore_ascii_case(SIDECAR_EXTENSION))
            .map(String::as_str)
    }

    pub fn primary_path(&self) -> Option<PathBuf> {
        self.primary_extension().map(|ext| self.path_for(ext))
    }

    pub fn path_for(&self, extension: &str) -> PathBuf {
        let mut s: OsString = self.base.as_os_str().to_owned();
        s.push(extension);
        PathBuf::from(s)
    }

    /// Every physical file, primary first.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.extensions.iter().map(|e| self.path_for(e)).collect()
    }

    pub fn is_valid(&self) -> bool {
        self.kind.is_some() && self.primary_path().map_or(false, |p| p.is_file())
    }

    pub fn has_extension(&self, extension: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(extension))
    }

    pub fn sidecar_path(&self) -> PathBuf {
        self.path_for(SIDECAR_EXTENSION)
    }

    /// Whether tags have to go into the sidecar rather than the media files.
    pub fn uses_sidecar(&self) -> bool {
        match (self.kind, self.primary_extension()) {
            (Some(kind), Some(ext)) => kind.needs_sidecar(ext),
            _ => false,
        }
    }

    /// Physical files that carry tags: the sidecar for formats that cannot
    /// embed them, otherwise every media file.
    pub fn tag_paths(&self) -> Vec<PathBuf> {
        if self.uses_sidecar() {
            return vec![self.sidecar_path()];
        }
        self.extensions
            .iter()
            .filter(|e| !e.eq_ignore_ascii_case(SIDECAR_EXTENSION))
            .map(|e| self.path_for(e))
            .collect()
    }

    /// The same item at a new base path.
    pub fn relocated(&self, base: PathBuf) -> Self {
        Self {
            base,
            extensions: self.extensions.clone(),
            kind: self.kind,
        }
    }

    pub fn with_extension(&self, extension: &str) -> Self {
        let mut next = self.clone();
        if !next.has_extension(extension) {
            next.extensions.push(extension.to_string());
        }
        next
    }

    pub fn without_extension(&self, extension: &str) -> Self {
        let mut next = self.clone();
        next.extensions.retain(|e| !e.eq_ignore_ascii_case(extension));
        next
    }
}

impl fmt::Display for MediaFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{{}}}", self.base.display(), self.extensions.join(","))
    }
}

/// Group file paths into media items by base path and kind, keeping
/// first-seen order of base paths.
pub fn group_paths(paths: impl IntoIterator<Item = PathBuf>) -> Vec<MediaFile> {
    let mut order: Vec<PathBuf> = Vec::new();
    let mut found: HashMap<PathBuf, Vec<String>> = HashMap::new();

    for path in paths {
        let Some((base, ext)) = split_extension(&path) else {
            tracing::debug!("ignoring {} (no extension)", path.display());
            continue;
        };
        let entry = found.entry(base.clone()).or_insert_with(|| {
            order.push(base);
            Vec::new()
        });
        entry.push(ext);
    }

    order
        .into_iter()
        .flat_map(|base| {
            let exts = found.remove(&base).unwrap_or_default();
            MediaFile::split_siblings(base, &exts)
        })
        .collect()
}
