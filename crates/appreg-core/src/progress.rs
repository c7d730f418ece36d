//! Resumable progress of a registration run.
//!
//! Answers collected so far are stored per working directory, so a run that
//! fails or is interrupted can continue where it stopped.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::repo::RepoDetails;

/// Answers collected by the interactive phases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Organization slug; `Some("")` means the personal account.
    pub account: Option<String>,
    pub public: Option<bool>,
    pub repo: Option<RepoDetails>,
    pub private_key_path: Option<PathBuf>,
    pub pipeline_config_path: Option<PathBuf>,
    pub stack: Option<String>,
    pub add_webhook: Option<bool>,
}

/// JSON file holding the [`Progress`] of one working directory.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store under the user data dir, keyed by a hash of `work_dir`.
    pub fn for_work_dir(work_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
            .join("appreg");
        Ok(Self::in_dir(&data_dir, work_dir))
    }

    pub fn in_dir(state_dir: &Path, work_dir: &Path) -> Self {
        let hash = blake3::hash(work_dir.to_string_lossy().as_bytes()).to_hex();
        Self::new(state_dir.join(format!("{}-progress.json", hash)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<Progress> {
        if !self.path.exists() {
            return Ok(Progress::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read progress file: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse progress file: {}", self.path.display()))
    }

    pub fn store(&self, progress: &Progress) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create progress directory: {}", parent.display())
            })?;
        }
        let content =
            serde_json::to_string_pretty(progress).context("Failed to serialize progress")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write progress file: {}", self.path.display()))
    }

    /// Remove the progress file after a successful run.
    pub fn destroy(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| {
                format!("Failed to remove progress file: {}", self.path.display())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::UrlParts;
    use tempfile::TempDir;

    #[test]
    fn load_without_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::in_dir(temp.path(), Path::new("/work/app"));
        assert_eq!(store.load().unwrap(), Progress::default());
    }

    #[test]
    fn store_then_load_resumes_answers() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::in_dir(&temp.path().join("state"), Path::new("/work/app"));
        let parts = UrlParts::parse("git@github.com:acme/app.git").unwrap();
        let progress = Progress {
            account: Some(String::new()),
            public: Some(false),
            repo: Some(RepoDetails::from_parts(&parts)),
            stack: Some("linux-docker-android-20.04".to_string()),
            ..Default::default()
        };

        store.store(&progress).unwrap();

        assert_eq!(store.load().unwrap(), progress);
    }

    #[test]
    fn destroy_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::in_dir(temp.path(), Path::new("/work/app"));
        store.store(&Progress::default()).unwrap();

        store.destroy().unwrap();
        assert!(!store.path().exists());
        store.destroy().unwrap();
    }

    #[test]
    fn work_dirs_get_separate_files() {
        let state = Path::new("/tmp/appreg");
        let a = ProgressStore::in_dir(state, Path::new("/work/a"));
        let b = ProgressStore::in_dir(state, Path::new("/work/b"));
        assert_ne!(a.path(), b.path());
        assert!(a.path().to_string_lossy().ends_with("-progress.json"));
    }
}
