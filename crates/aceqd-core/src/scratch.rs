//! Tag-partitioned scratch files.
//!
//! Every concurrent solver job owns its parameter, output and (optional)
//! pulse file exclusively. Ownership is partitioned by construction: file
//! names are a pure function of the job tag, so two jobs with distinct tags
//! can never collide and no locking is needed. [`ScratchFile`] guards a
//! single owned path and removes it on every exit path, including early
//! returns from a failed solver run.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Scratch file path for a tagged job: `<dir>/<stem><tag>.<ext>`.
pub fn tagged_path(dir: &Path, stem: &str, tag: &str, ext: &str) -> PathBuf {
    dir.join(format!("{}{}.{}", stem, tag, ext))
}

/// Owns a scratch file and removes it when dropped.
///
/// A file that is already gone at release time is not an error; shared
/// artifacts (process tensor, shared pulse file) are never wrapped in a
/// guard and therefore never touched by cleanup.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("scratch file {} already gone", self.path.display());
            }
            Err(e) => {
                log::warn!("failed to remove scratch file {}: {}", self.path.display(), e);
            }
        }
    }
}
