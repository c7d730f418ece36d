//! Resolved repository description handed to the registration phases.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::remote_url::UrlParts;

/// Transport protocol of a clone URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoScheme {
    Https,
    Ssh,
}

impl RepoScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Https => "https",
            Self::Ssh => "ssh",
        }
    }
}

impl fmt::Display for RepoScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Git hosting provider, as the platform API names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "gitlab")]
    GitLab,
    #[serde(rename = "bitbucket")]
    Bitbucket,
    #[serde(rename = "other")]
    Other,
}

impl Provider {
    /// Classify a hostname by suffix. Unknown hosts are [`Provider::Other`].
    pub fn from_host(host: &str) -> Self {
        // Hosts of scp-style and ssh:// URLs keep their original case.
        let host = host.to_ascii_lowercase();
        if host.ends_with("github.com") {
            Self::GitHub
        } else if host.ends_with("gitlab.com") {
            Self::GitLab
        } else if host.ends_with("bitbucket.org") {
            Self::Bitbucket
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Bitbucket => "bitbucket",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository data needed by the registration requests.
///
/// Produced once per run by the resolver and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDetails {
    url: String,
    provider: Provider,
    owner: String,
    slug: String,
    scheme: RepoScheme,
    ssh_username: String,
}

impl RepoDetails {
    pub fn from_parts(parts: &UrlParts) -> Self {
        Self {
            url: parts.url.to_string(),
            provider: parts.provider(),
            owner: parts.owner.clone(),
            slug: parts.slug.clone(),
            scheme: parts.scheme,
            ssh_username: parts.ssh_username.clone(),
        }
    }

    /// Canonical clone URL (`https://...` or `ssh://git@...`).
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name without the `.git` suffix.
    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn scheme(&self) -> RepoScheme {
        self.scheme
    }

    /// SSH login user; empty for https.
    pub fn ssh_username(&self) -> &str {
        &self.ssh_username
    }
}
