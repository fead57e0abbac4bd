//! Checkpoint persistence (one file per run identifier)
//!
//! The checkpoint file holds exactly one wire-format timestamp. Writes go to a
//! temp file in the same directory which is synced and then renamed over the
//! target, so a reader sees either the old or the new value, never a torn one.

use super::checkpoint::Checkpoint;
use crate::identifier::RunIdentifier;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Maximum checkpoint file size; anything larger is not a checkpoint
pub const MAX_CHECKPOINT_FILE_SIZE: u64 = 1024;

/// Durable single-value watermark keyed by run identifier
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Store for `identifier` inside `dir`
    pub fn new(dir: impl AsRef<Path>, identifier: &RunIdentifier) -> Self {
        Self {
            path: dir.as_ref().join(identifier.checkpoint_file_name()),
        }
    }

    /// Path of the checkpoint file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored checkpoint.
    ///
    /// A missing file is the "no checkpoint yet" case and returns `Ok(None)`.
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeError::IoError`] on unexpected filesystem errors,
    /// [`ResumeError::StateTooLarge`] if the file is implausibly big and
    /// [`ResumeError::Corrupt`] if the content is not a timestamp.
    pub fn read(&self) -> Result<Option<Checkpoint>, ResumeError> {
        debug!(path = %self.path.display(), "Reading checkpoint");

        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No checkpoint found");
                return Ok(None);
            }
            Err(e) => {
                return Err(ResumeError::IoError(format!(
                    "Failed to stat {}: {e}",
                    self.path.display()
                )))
            }
        };

        if metadata.len() > MAX_CHECKPOINT_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size: metadata.len(),
                max: MAX_CHECKPOINT_FILE_SIZE,
            });
        }

        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ResumeError::IoError(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };

        let value = contents.trim();
        let checkpoint = value.parse::<Checkpoint>().map_err(|reason| {
            warn!(path = %self.path.display(), %reason, "Checkpoint file is corrupt");
            ResumeError::Corrupt {
                path: self.path.clone(),
                content: value.to_string(),
            }
        })?;

        debug!(path = %self.path.display(), checkpoint = %checkpoint, "Checkpoint loaded");
        Ok(Some(checkpoint))
    }

    /// Atomically replace the stored checkpoint
    ///
    /// # Errors
    ///
    /// Returns [`ResumeError::IoError`] if any step of the temp-file write,
    /// sync or rename fails. The previous checkpoint is then left in place.
    pub fn write(&self, checkpoint: &Checkpoint) -> Result<(), ResumeError> {
        let parent_dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;

        temp_file
            .write_all(checkpoint.to_string().as_bytes())
            .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;

        temp_file
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;

        temp_file
            .persist(&self.path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        // Make the rename itself durable
        if let Ok(dir) = std::fs::File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        info!(
            path = %self.path.display(),
            checkpoint = %checkpoint,
            "Updated checkpoint"
        );
        Ok(())
    }
}

/// Errors related to checkpoint persistence
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Checkpoint file content is not a timestamp
    #[error("corrupt checkpoint {path:?}: {content:?} is not a timestamp")]
    Corrupt {
        /// Checkpoint file path
        path: PathBuf,
        /// Offending content
        content: String,
    },

    /// Checkpoint file too large
    #[error("checkpoint file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },
}
