//! Remote reachability probing.
//!
//! A probe connects to the remote and lists its refs, which is the same
//! handshake a clone starts with. No objects are fetched and nothing is
//! written to disk.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use anyhow::Context;
use git2::{Cred, Direction, Remote, RemoteCallbacks};
use tracing::debug;

/// Checks whether a URL is clonable right now.
pub trait ReachabilityProbe {
    /// `Ok(())` if `url` can be listed without any credential.
    fn probe_public(&self, url: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
struct SshKeyCredential {
    username: String,
    private_key: String,
}

/// [`ReachabilityProbe`] backed by libgit2.
#[derive(Debug, Clone, Default)]
pub struct Git2Probe {
    deadline: Option<Duration>,
}

impl Git2Probe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up on a probe that has not finished after `deadline`.
    ///
    /// Without a deadline only the transport's own timeouts apply.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Probe `url` authenticating with an in-memory SSH private key.
    pub fn probe_with_ssh_key(
        &self,
        url: &str,
        username: &str,
        private_key: &str,
    ) -> anyhow::Result<()> {
        let url = url.to_string();
        let credential = SshKeyCredential {
            username: username.to_string(),
            private_key: private_key.to_string(),
        };
        self.run_bounded(move || list_refs(&url, Some(credential)))
    }

    fn run_bounded<F>(&self, job: F) -> anyhow::Result<()>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let Some(deadline) = self.deadline else {
            return job();
        };

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(job());
        });

        match rx.recv_timeout(deadline) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => anyhow::bail!(
                "Probe did not finish within {}s",
                deadline.as_secs_f32()
            ),
            Err(RecvTimeoutError::Disconnected) => {
                anyhow::bail!("Probe thread exited without a result")
            }
        }
    }
}

impl ReachabilityProbe for Git2Probe {
    fn probe_public(&self, url: &str) -> anyhow::Result<()> {
        let url = url.to_string();
        self.run_bounded(move || list_refs(&url, None))
    }
}

fn list_refs(url: &str, credential: Option<SshKeyCredential>) -> anyhow::Result<()> {
    let mut remote =
        Remote::create_detached(url).with_context(|| format!("Invalid remote URL: {}", url))?;

    // Without a credentials callback libgit2 fails as soon as the server
    // asks for authentication.
    let mut callbacks = RemoteCallbacks::new();
    if let Some(credential) = credential {
        let mut attempted = false;
        callbacks.credentials(move |_url, username_from_url, _allowed| {
            if attempted {
                return Err(git2::Error::from_str("SSH key was rejected by the remote"));
            }
            attempted = true;
            Cred::ssh_key_from_memory(
                username_from_url.unwrap_or(&credential.username),
                None,
                &credential.private_key,
                None,
            )
        });
    }

    let connection = remote
        .connect_auth(Direction::Fetch, Some(callbacks), None)
        .with_context(|| format!("Failed to connect to {}", url))?;
    let refs = connection
        .list()
        .with_context(|| format!("Failed to list refs of {}", url))?
        .len();
    debug!(url, refs, "Remote is reachable");

    Ok(())
}
