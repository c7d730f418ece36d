//! Git remote URL normalization.
//!
//! Remotes come in three shapes:
//! - `git@host:owner/slug.git` (scp-like)
//! - `ssh://git@host/owner/slug.git`
//! - `https://host/owner/slug.git`, possibly with embedded userinfo
//!
//! Everything is normalized into a [`Url`] with an explicit `https` or `ssh`
//! scheme before it is split into owner and slug.

use tracing::{debug, info};
use url::Url;

use super::details::{Provider, RepoScheme};
use super::error::UrlError;

const PATH_SEPARATOR: char = '/';
const SCP_PREFIX: &str = "git@";
const GIT_SUFFIX: &str = ".git";
const DEFAULT_SSH_USER: &str = "git";

/// Structured view of a normalized remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    pub host: String,
    pub owner: String,
    pub slug: String,
    pub scheme: RepoScheme,
    /// SSH login user; empty for https.
    pub ssh_username: String,
    pub url: Url,
}

impl UrlParts {
    /// Normalize and split a raw remote URL as stored in git config.
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        Self::from_url(normalize(raw)?)
    }

    /// Split an already normalized URL.
    pub fn from_url(url: Url) -> Result<Self, UrlError> {
        let scheme = match url.scheme() {
            "https" => RepoScheme::Https,
            "ssh" => RepoScheme::Ssh,
            other => {
                return Err(UrlError::UnsupportedScheme {
                    url: url.to_string(),
                    scheme: other.to_string(),
                });
            }
        };

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| UrlError::MissingHost {
                url: url.to_string(),
            })?
            .to_string();

        let segments: Vec<&str> = url
            .path()
            .trim_start_matches(PATH_SEPARATOR)
            .split(PATH_SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .collect();
        debug!(?segments, "URL path parts");

        let (owner, last) = match segments.as_slice() {
            [owner, .., last] => (*owner, *last),
            _ => {
                return Err(UrlError::TooFewPathSegments {
                    url: url.to_string(),
                });
            }
        };
        let slug = last.strip_suffix(GIT_SUFFIX).unwrap_or(last);
        if slug.is_empty() {
            return Err(UrlError::TooFewPathSegments {
                url: url.to_string(),
            });
        }

        let ssh_username = match scheme {
            RepoScheme::Ssh => url.username().to_string(),
            RepoScheme::Https => String::new(),
        };

        Ok(Self {
            host,
            owner: owner.to_string(),
            slug: slug.to_string(),
            scheme,
            ssh_username,
            url,
        })
    }

    pub fn provider(&self) -> Provider {
        Provider::from_host(&self.host)
    }
}

/// Rewrite scp-like remotes to `ssh://` and drop credentials from https URLs.
pub fn normalize(raw: &str) -> Result<Url, UrlError> {
    let trimmed = raw.trim();

    let candidate = if trimmed.starts_with(SCP_PREFIX) {
        format!("ssh://{}", trimmed.replacen(':', "/", 1))
    } else {
        trimmed.to_string()
    };

    let mut url = Url::parse(&candidate).map_err(|source| UrlError::Malformed {
        url: trimmed.to_string(),
        source,
    })?;

    if url.scheme() == "https" && (!url.username().is_empty() || url.password().is_some()) {
        info!("Username or access token embedded in the https repository URL was discarded");
        if url.set_username("").is_err() || url.set_password(None).is_err() {
            return Err(UrlError::MissingHost {
                url: url.to_string(),
            });
        }
    }

    Ok(url)
}

/// Same repository over https, without userinfo.
pub fn to_https(url: &Url) -> Result<Url, UrlError> {
    rebuild(url, "https", None)
}

/// Same repository over ssh, logging in as `git`.
pub fn to_ssh(url: &Url) -> Result<Url, UrlError> {
    rebuild(url, "ssh", Some(DEFAULT_SSH_USER))
}

// `Url::set_scheme` refuses to move between special (https) and non-special
// (ssh) schemes, so the alternate is rendered from host and path instead.
// Ports are transport specific and are not carried over.
fn rebuild(url: &Url, scheme: &str, user: Option<&str>) -> Result<Url, UrlError> {
    let host = url.host_str().ok_or_else(|| UrlError::MissingHost {
        url: url.to_string(),
    })?;
    let userinfo = user.map(|user| format!("{user}@")).unwrap_or_default();
    let rendered = format!("{scheme}://{userinfo}{host}{}", url.path());

    Url::parse(&rendered).map_err(|source| UrlError::Malformed {
        url: rendered,
        source,
    })
}
