//! Appreg Core Library
//!
//! Registers a local git repository as an app on the Bitrise CI platform:
//! resolves the repository URL and its auth scheme, collects the pipeline,
//! stack and key material, and drives the platform API.

pub mod api;
pub mod config;
pub mod pipeline;
pub mod progress;
pub mod register;
pub mod repo;
pub mod ssh_key;
pub mod stack;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::AppregConfig;
    pub use crate::progress::{Progress, ProgressStore};

    // Repository
    pub use crate::repo::{
        Git2Inspector, Git2Probe, Provider, RepoDetails, RepoError, RepoResolver, RepoScheme,
        UserChooser,
    };

    // Platform API
    pub use crate::api::{ApiError, Client, RetryPolicy};

    // Registration
    pub use crate::pipeline::PipelineConfig;
    pub use crate::register::{
        Keystore, PlatformApi, Registration, RegistrationPrompts, RegistrationReport,
        SshKeyVerifier, register,
    };
    pub use crate::ssh_key::SshKeyPair;
}
