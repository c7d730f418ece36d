//! Repository resolution.
//!
//! Turns the `origin` remote of a local working copy into the clone URL,
//! provider, owner and slug that get registered on the platform:
//! - Parsing heterogeneous remote URL formats
//! - Classifying the hosting provider
//! - Reconciling the app visibility with what is reachable without credentials

mod details;
mod error;
mod inspector;
mod probe;
mod remote_url;
mod resolver;

pub use details::{Provider, RepoDetails, RepoScheme};
pub use error::{RepoError, UrlError};
pub use inspector::{BranchInfo, Git2Inspector, LocalGitInspector, current_branch};
pub use probe::{Git2Probe, ReachabilityProbe};
pub use remote_url::{UrlParts, normalize, to_https, to_ssh};
pub use resolver::{RepoResolver, UserChooser};

#[cfg(test)]
mod tests;
