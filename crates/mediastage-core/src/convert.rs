//! Raw-to-preview conversion and video transcoding on a bounded worker pool.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;

use crate::config::ConvertSettings;
use crate::engine::{StageContext, TaskEvaluator};
use crate::error::{ConfigError, StageError, StageResult};
use crate::media::{self, MediaFile, MediaKind, IMAGE, VIDEO};
use crate::task::TransitionTask;

/// Extension videos are transcoded to.
pub const VIDEO_TARGET_EXTENSION: &str = ".mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Raw,
    Video,
}

/// One unit of pool work. Jobs share nothing; the output directory exists
/// before the job is submitted.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub index: usize,
    pub kind: JobKind,
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub index: usize,
    pub original: PathBuf,
    pub converted: Result<PathBuf, String>,
}

/// External converter for raw images and videos.
pub trait ConversionBackend: Send + Sync {
    fn convert(&self, job: &ConversionJob) -> Result<PathBuf, String>;
}

/// Runs the configured raw converter and video transcoder as subprocesses.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    raw_converter: PathBuf,
    raw_args: Vec<String>,
    transcoder: PathBuf,
    codec: String,
    quality: u8,
}

impl CommandConverter {
    pub fn new(settings: &ConvertSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            raw_converter: settings.require_raw_converter()?.to_path_buf(),
            raw_args: settings.raw_converter_args.clone(),
            transcoder: settings.video_transcoder.clone(),
            codec: settings.video_codec.clone(),
            quality: settings.video_quality,
        })
    }

    fn command(&self, job: &ConversionJob) -> Command {
        match job.kind {
            JobKind::Raw => {
                let mut cmd = Command::new(&self.raw_converter);
                cmd.args(substitute(&self.raw_args, &job.input, &job.output));
                cmd
            }
            JobKind::Video => {
                let mut cmd = Command::new(&self.transcoder);
                cmd.arg("-n")
                    .arg("-i")
                    .arg(&job.input)
                    .args(["-c:v", &self.codec, "-crf", &self.quality.to_string()])
                    .args(["-c:a", "aac", "-map_metadata", "0"])
                    .arg(&job.output);
                cmd
            }
        }
    }
}

/// Replace `{input}` and `{output}` in each argument.
fn substitute(args: &[String], input: &Path, output: &Path) -> Vec<OsString> {
    args.iter()
        .map(|arg| match arg.as_str() {
            "{input}" => input.as_os_str().to_owned(),
            "{output}" => output.as_os_str().to_owned(),
            other => OsString::from(
                other
                    .replace("{input}", &input.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy()),
            ),
        })
        .collect()
}

impl ConversionBackend for CommandConverter {
    fn convert(&self, job: &ConversionJob) -> Result<PathBuf, String> {
        let mut cmd = self.command(job);
        tracing::debug!("running {:?}", cmd);
        let output = cmd
            .output()
            .map_err(|e| format!("cannot run {}: {}", cmd.get_program().to_string_lossy(), e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
            return Err(format!(
                "{} exited with {}: {}",
                cmd.get_program().to_string_lossy(),
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            ));
        }
        if !job.output.is_file() {
            return Err(format!("converter produced no {}", job.output.display()));
        }
        Ok(job.output.clone())
    }
}

/// Run every job on a pool of `workers` threads. Results come back tagged with
/// their job index; their order carries no meaning.
pub fn run_jobs(
    backend: &dyn ConversionBackend,
    jobs: &[ConversionJob],
    workers: usize,
) -> StageResult<Vec<ConversionOutcome>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| StageError::Conversion(format!("cannot start worker pool: {}", e)))?;

    let total = jobs.len();
    let counter = AtomicU64::new(0);
    Ok(pool.install(|| {
        jobs.par_iter()
            .map(|job| {
                let converted = backend.convert(job);
                let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
                match &converted {
                    Ok(out) => tracing::info!("[{}/{}] {}", done, total, out.display()),
                    Err(e) => tracing::warn!("[{}/{}] {}: {}", done, total, job.input.display(), e),
                }
                ConversionOutcome {
                    index: job.index,
                    original: job.input.clone(),
                    converted,
                }
            })
            .collect()
    }))
}

/// Converts what needs converting, then moves originals next to the result.
pub struct ConvertEvaluator<'b> {
    backend: &'b dyn ConversionBackend,
    raw_target_extension: String,
    workers: usize,
    flatten: bool,
    planned: HashMap<usize, ConversionJob>,
    results: HashMap<usize, Result<PathBuf, String>>,
}

impl<'b> ConvertEvaluator<'b> {
    pub fn new(backend: &'b dyn ConversionBackend, settings: &ConvertSettings, flatten: bool) -> Self {
        Self {
            backend,
            raw_target_extension: settings.raw_target_extension.clone(),
            workers: settings.worker_count(),
            flatten,
            planned: HashMap::new(),
            results: HashMap::new(),
        }
    }

    fn relative_dir(&self, file: &MediaFile, root: &Path) -> PathBuf {
        if self.flatten {
            return PathBuf::new();
        }
        pathdiff::diff_paths(file.parent(), root).unwrap_or_default()
    }

    fn job_for(&self, index: usize, file: &MediaFile, ctx: &StageContext<'_>) -> Option<ConversionJob> {
        let kind = file.kind()?;
        let primary = file.primary_extension()?;
        let (job_kind, extension) = if kind.name() == IMAGE.name() && media::is_raw_extension(primary) {
            (JobKind::Raw, self.raw_target_extension.as_str())
        } else if kind.name() == VIDEO.name() && !primary.eq_ignore_ascii_case(VIDEO_TARGET_EXTENSION) {
            (JobKind::Video, VIDEO_TARGET_EXTENSION)
        } else {
            return None;
        };
        let dir = ctx.destination_root.join(self.relative_dir(file, ctx.source_root));
        let mut name = OsString::from(file.stem());
        name.push(extension);
        Some(ConversionJob {
            index,
            kind: job_kind,
            input: file.path_for(primary),
            output: dir.join(name),
        })
    }
}

impl TaskEvaluator for ConvertEvaluator<'_> {
    fn name(&self) -> &str {
        "convert"
    }

    fn prepare(&mut self, files: &[MediaFile], ctx: &StageContext<'_>) -> StageResult<()> {
        self.planned = files
            .iter()
            .enumerate()
            .filter_map(|(i, f)| self.job_for(i, f, ctx).map(|job| (i, job)))
            .collect();
        self.results.clear();

        if ctx.dry_run || self.planned.is_empty() {
            return Ok(());
        }

        let mut jobs: Vec<ConversionJob> = Vec::with_capacity(self.planned.len());
        for job in self.planned.values() {
            if job.output.exists() {
                self.results
                    .insert(job.index, Err(format!("already exists: {}", job.output.display())));
                continue;
            }
            if let Some(dir) = job.output.parent() {
                fs::create_dir_all(dir).map_err(|e| StageError::io(dir, e))?;
            }
            jobs.push(job.clone());
        }
        jobs.sort_by_key(|j| j.index);

        tracing::info!("converting {} files on {} workers", jobs.len(), self.workers);
        for outcome in run_jobs(self.backend, &jobs, self.workers)? {
            self.results.insert(outcome.index, outcome.converted);
        }
        Ok(())
    }

    fn classify(&mut self, index: usize, file: &MediaFile, ctx: &StageContext<'_>) -> StageResult<TransitionTask> {
        let task = TransitionTask::proceed(index).into_dir(self.relative_dir(file, ctx.source_root));
        let Some(job) = self.planned.get(&index) else {
            return Ok(task);
        };
        if ctx.dry_run {
            tracing::info!("would convert {} -> {}", job.input.display(), job.output.display());
            return Ok(task);
        }
        Ok(match self.results.get(&index) {
            Some(Ok(_)) => task,
            Some(Err(reason)) => TransitionTask::skipped(index, format!("conversion failed: {}", reason)),
            None => TransitionTask::skipped(index, "conversion did not run"),
        })
    }
}
