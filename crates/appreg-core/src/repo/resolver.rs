//! Clone URL and authentication scheme resolution.

use std::path::Path;

use tracing::{debug, info, warn};

use super::details::{RepoDetails, RepoScheme};
use super::error::RepoError;
use super::inspector::LocalGitInspector;
use super::probe::ReachabilityProbe;
use super::remote_url::{UrlParts, to_https, to_ssh};

const CHOOSE_URL_PROMPT: &str = "Select repository URL";

/// Asks a human to pick one of several strings.
pub trait UserChooser {
    fn choose_one(&self, prompt: &str, options: &[String]) -> anyhow::Result<String>;
}

/// How the origin remote can be cloned.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RepoAuth {
    /// https origin, reachable without credentials.
    HttpsPublic,
    /// https origin behind authentication; the ssh form is the alternate.
    HttpsAuth { ssh_alternate: RepoDetails },
    /// ssh origin whose https form is reachable without credentials.
    SshWithPublicAlternate { public_alternate: RepoDetails },
    /// ssh origin, no public https form.
    Ssh,
}

/// Reconciles the origin URL, the requested app visibility and remote
/// reachability into a single [`RepoDetails`].
pub struct RepoResolver<'a> {
    inspector: &'a dyn LocalGitInspector,
    probe: &'a dyn ReachabilityProbe,
    chooser: &'a dyn UserChooser,
}

impl<'a> RepoResolver<'a> {
    pub fn new(
        inspector: &'a dyn LocalGitInspector,
        probe: &'a dyn ReachabilityProbe,
        chooser: &'a dyn UserChooser,
    ) -> Self {
        Self {
            inspector,
            probe,
            chooser,
        }
    }

    /// Resolve the repository whose working copy contains `search_dir`.
    pub fn resolve(
        &self,
        search_dir: &Path,
        is_public_app: bool,
    ) -> Result<RepoDetails, RepoError> {
        info!("Scanning git repository");
        let remote_url = self.inspector.origin_url(search_dir)?;
        info!(remote_url = %remote_url, "Remote URL");

        self.resolve_url(&remote_url, is_public_app)
    }

    /// Resolve a remote URL given directly instead of read from a working copy.
    pub fn resolve_url(
        &self,
        remote_url: &str,
        is_public_app: bool,
    ) -> Result<RepoDetails, RepoError> {
        let parts = UrlParts::parse(remote_url)?;
        let primary = RepoDetails::from_parts(&parts);
        let auth = self.classify(&parts)?;
        debug!(?auth, is_public_app, "Repository access classified");

        if is_public_app {
            return match auth {
                RepoAuth::HttpsPublic => Ok(primary),
                RepoAuth::SshWithPublicAlternate { public_alternate } => {
                    info!(url = public_alternate.url(), "Using alternate public URL");
                    Ok(public_alternate)
                }
                RepoAuth::HttpsAuth { .. } | RepoAuth::Ssh => {
                    Err(RepoError::PublicAppRequiresUnauthenticated {
                        url: primary.url().to_string(),
                    })
                }
            };
        }

        match auth {
            RepoAuth::HttpsPublic | RepoAuth::Ssh => Ok(primary),
            RepoAuth::HttpsAuth { ssh_alternate } => {
                info!(url = ssh_alternate.url(), "Using ssh URL for private repository");
                Ok(ssh_alternate)
            }
            RepoAuth::SshWithPublicAlternate { public_alternate } => {
                self.choose_between(primary, public_alternate)
            }
        }
    }

    fn classify(&self, parts: &UrlParts) -> Result<RepoAuth, RepoError> {
        match parts.scheme {
            RepoScheme::Https => match self.probe.probe_public(parts.url.as_str()) {
                Ok(()) => Ok(RepoAuth::HttpsPublic),
                Err(err) => {
                    warn!(url = %parts.url, "Repository is not public");
                    debug!(error = %format!("{:#}", err), "Public probe failed");

                    // ssh reachability depends on a key that does not exist yet
                    let alternate = UrlParts::from_url(to_ssh(&parts.url)?)?;
                    Ok(RepoAuth::HttpsAuth {
                        ssh_alternate: RepoDetails::from_parts(&alternate),
                    })
                }
            },
            RepoScheme::Ssh => {
                let public_url = to_https(&parts.url)?;
                debug!(url = %public_url, "Checking if repository is public");

                match self.probe.probe_public(public_url.as_str()) {
                    Ok(()) => {
                        let alternate = UrlParts::from_url(public_url)?;
                        Ok(RepoAuth::SshWithPublicAlternate {
                            public_alternate: RepoDetails::from_parts(&alternate),
                        })
                    }
                    Err(err) => {
                        warn!(url = %public_url, "Alternate public URL is not available");
                        debug!(error = %format!("{:#}", err), "Public probe failed");
                        Ok(RepoAuth::Ssh)
                    }
                }
            }
        }
    }

    fn choose_between(
        &self,
        primary: RepoDetails,
        public_alternate: RepoDetails,
    ) -> Result<RepoDetails, RepoError> {
        let options = vec![
            public_alternate.url().to_string(),
            primary.url().to_string(),
        ];
        let selected = self
            .chooser
            .choose_one(CHOOSE_URL_PROMPT, &options)
            .map_err(RepoError::Choice)?;

        if selected == primary.url() {
            Ok(primary)
        } else if selected == public_alternate.url() {
            Ok(public_alternate)
        } else {
            Err(RepoError::Choice(anyhow::anyhow!(
                "'{}' is not one of the offered repository URLs",
                selected
            )))
        }
    }
}
