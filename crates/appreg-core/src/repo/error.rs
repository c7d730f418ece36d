//! Error types for repository resolution.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn a raw git remote string into a supported clone URL.
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Malformed repository URL '{url}': {source}")]
    Malformed {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unsupported URL scheme '{scheme}' in repository URL '{url}' (expected https or ssh)")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("Repository URL '{url}' has no host")]
    MissingHost { url: String },

    #[error("Repository URL '{url}' must contain at least an owner and a repository name in its path")]
    TooFewPathSegments { url: String },
}

/// Failure of the repository resolution phase.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Failed to open git repository ({path})")]
    OpenRepository {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("No remote 'origin' found in repository ({path})")]
    NoOrigin {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("No URLs found for remote 'origin' in repository ({path})")]
    NoOriginUrl { path: PathBuf },

    #[error(transparent)]
    Parse(#[from] UrlError),

    #[error("A public app must use a git repository reachable without authentication: {url}")]
    PublicAppRequiresUnauthenticated { url: String },

    #[error("Failed to read repository URL choice")]
    Choice(#[source] anyhow::Error),
}
