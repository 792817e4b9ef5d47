use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::{Map, Value};

use super::{codec, MetadataPort, Tag, TagMap};
use crate::error::MetadataError;

/// [`MetadataPort`] backed by the `exiftool` command line program.
#[derive(Debug, Clone)]
pub struct ExifTool {
    executable: PathBuf,
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new("exiftool")
    }
}

impl ExifTool {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Check that the executable runs at all.
    pub fn available(&self) -> bool {
        Command::new(&self.executable)
            .arg("-ver")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn run(&self, args: &[String]) -> Result<Vec<u8>, MetadataError> {
        tracing::trace!("{} {}", self.executable.display(), args.join(" "));
        let output = Command::new(&self.executable)
            .args(args)
            .output()
            .map_err(|source| MetadataError::Spawn {
                tool: self.executable.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(MetadataError::ToolFailed {
                tool: self.executable.display().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

impl MetadataPort for ExifTool {
    fn read_each(&self, files: &[PathBuf], tags: &[Tag]) -> Result<Vec<TagMap>, MetadataError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec!["-j".to_string(), "-n".to_string()];
        args.extend(codec::request(tags).iter().map(|e| format!("-{}", e.write_name)));
        args.extend(files.iter().map(|f| f.to_string_lossy().into_owned()));

        let stdout = self.run(&args)?;
        let records: Vec<Map<String, Value>> = serde_json::from_slice(&stdout)
            .map_err(|e| MetadataError::Parse(format!("exiftool JSON: {}", e)))?;

        files
            .iter()
            .enumerate()
            .map(|(i, file)| {
                let wanted = file.to_string_lossy();
                records
                    .iter()
                    .find(|r| r.get("SourceFile").and_then(Value::as_str) == Some(wanted.as_ref()))
                    .or_else(|| records.get(i))
                    .map(|r| codec::decode(r, tags))
                    .ok_or_else(|| {
                        MetadataError::Parse(format!("no exiftool record for {}", file.display()))
                    })
            })
            .collect()
    }

    fn write(&self, file: &Path, tags: &TagMap, overwrite_original: bool) -> Result<(), MetadataError> {
        if tags.is_empty() {
            return Ok(());
        }

        let mut args = vec!["-n".to_string()];
        if overwrite_original {
            args.push("-overwrite_original".to_string());
        }
        args.extend(assignments(&codec::encode(tags)?));
        args.push(file.to_string_lossy().into_owned());

        self.run(&args).map(|_| ())
    }
}

/// `-Name=value` arguments; list values repeat the assignment per item.
fn assignments(encoded: &[(codec::ExternalTag, Value)]) -> Vec<String> {
    let mut args = Vec::new();
    for (tag, value) in encoded {
        match value {
            Value::Array(items) if items.is_empty() => args.push(format!("-{}=", tag.write_name)),
            Value::Array(items) => {
                for item in items {
                    args.push(format!("-{}={}", tag.write_name, plain(item)));
                }
            }
            other => args.push(format!("-{}={}", tag.write_name, plain(other))),
        }
    }
    args
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
