//! Local working copy inspection.

use std::path::Path;

use anyhow::Context;
use git2::{Branch, Repository};
use tracing::debug;

use super::error::RepoError;

const ORIGIN: &str = "origin";

/// Reads remote configuration from a local git working copy.
pub trait LocalGitInspector {
    /// First configured URL of the `origin` remote.
    fn origin_url(&self, search_dir: &Path) -> Result<String, RepoError>;
}

/// [`LocalGitInspector`] backed by libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Inspector;

impl LocalGitInspector for Git2Inspector {
    fn origin_url(&self, search_dir: &Path) -> Result<String, RepoError> {
        let repo = Repository::discover(search_dir).map_err(|source| RepoError::OpenRepository {
            path: search_dir.to_path_buf(),
            source,
        })?;
        debug!(path = %search_dir.display(), "Found git repository");

        let origin = repo
            .find_remote(ORIGIN)
            .map_err(|source| RepoError::NoOrigin {
                path: search_dir.to_path_buf(),
                source,
            })?;

        origin
            .url()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RepoError::NoOriginUrl {
                path: search_dir.to_path_buf(),
            })
    }
}

/// Checked-out branch and its upstream tracking branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub local: String,
    /// Upstream shorthand such as `origin/main`.
    pub upstream: Option<String>,
}

impl BranchInfo {
    /// Branch name on the remote, falling back to the local name.
    pub fn remote_branch(&self) -> &str {
        self.upstream
            .as_deref()
            .and_then(|upstream| upstream.split_once('/'))
            .map(|(_, branch)| branch)
            .unwrap_or(&self.local)
    }
}

pub fn current_branch(search_dir: &Path) -> anyhow::Result<BranchInfo> {
    let repo = Repository::discover(search_dir)
        .with_context(|| format!("Failed to open git repository ({})", search_dir.display()))?;
    let head = repo.head().context("Failed to read HEAD")?;
    if !head.is_branch() {
        anyhow::bail!(
            "HEAD is detached in {}; check out a branch first",
            search_dir.display()
        );
    }

    let local = head
        .shorthand()
        .ok_or_else(|| anyhow::anyhow!("Branch name is not valid UTF-8"))?
        .to_string();

    let upstream = Branch::wrap(head)
        .upstream()
        .ok()
        .and_then(|upstream| upstream.name().ok().flatten().map(str::to_string));

    Ok(BranchInfo { local, upstream })
}
