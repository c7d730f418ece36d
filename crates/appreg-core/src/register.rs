//! The registration workflow.
//!
//! Once every answer is collected, the app is created on the platform by a
//! fixed sequence of API calls. The sequence stops at the first failing step.

use std::path::PathBuf;

use anyhow::Context;
use tracing::{info, warn};

use crate::api::{
    ApiError, BuildParams, Client, FinishParams, FinishResponse, KeystoreParams,
    RegisterAppParams, RegisterSshKeyParams,
};
use crate::pipeline::PipelineConfig;
use crate::repo::{Git2Probe, Provider, RepoDetails, RepoScheme};
use crate::ssh_key::SshKeyPair;

const MANUAL_KEY_ATTEMPTS: u32 = 3;

/// Platform operations the workflow depends on.
#[allow(async_fn_in_trait)]
pub trait PlatformApi {
    async fn register_app(&self, params: &RegisterAppParams) -> Result<String, ApiError>;

    async fn register_ssh_key(
        &self,
        app_slug: &str,
        params: &RegisterSshKeyParams,
    ) -> Result<(), ApiError>;

    async fn finish(&self, app_slug: &str, params: &FinishParams)
    -> Result<FinishResponse, ApiError>;

    async fn upload_pipeline_config(&self, app_slug: &str, yaml: &str) -> Result<(), ApiError>;

    async fn register_webhook(&self, app_slug: &str) -> Result<(), ApiError>;

    async fn upload_keystore(&self, app_slug: &str, keystore: &Keystore) -> Result<(), ApiError>;

    async fn trigger_build(&self, app_slug: &str, params: &BuildParams) -> Result<(), ApiError>;
}

impl PlatformApi for Client {
    async fn register_app(&self, params: &RegisterAppParams) -> Result<String, ApiError> {
        Client::register_app(self, params).await
    }

    async fn register_ssh_key(
        &self,
        app_slug: &str,
        params: &RegisterSshKeyParams,
    ) -> Result<(), ApiError> {
        Client::register_ssh_key(self, app_slug, params).await
    }

    async fn finish(
        &self,
        app_slug: &str,
        params: &FinishParams,
    ) -> Result<FinishResponse, ApiError> {
        Client::finish(self, app_slug, params).await
    }

    async fn upload_pipeline_config(&self, app_slug: &str, yaml: &str) -> Result<(), ApiError> {
        Client::upload_pipeline_config(self, app_slug, yaml).await
    }

    async fn register_webhook(&self, app_slug: &str) -> Result<(), ApiError> {
        Client::register_webhook(self, app_slug).await
    }

    async fn upload_keystore(&self, app_slug: &str, keystore: &Keystore) -> Result<(), ApiError> {
        Client::upload_keystore(self, app_slug, &keystore.path, &keystore.params).await
    }

    async fn trigger_build(&self, app_slug: &str, params: &BuildParams) -> Result<(), ApiError> {
        Client::trigger_build(self, app_slug, params).await
    }
}

/// Human decisions needed while the workflow runs.
pub trait RegistrationPrompts {
    /// Show `public_key` and ask whether it was added to the repository
    /// host by hand.
    fn confirm_manual_ssh_key(&self, public_key: &str) -> anyhow::Result<bool>;

    /// Webhook registration was rejected; ask whether to try again.
    fn retry_webhook(&self) -> anyhow::Result<bool>;
}

/// Checks that an SSH key can clone the repository.
pub trait SshKeyVerifier {
    fn verify(&self, repo: &RepoDetails, key: &SshKeyPair) -> anyhow::Result<()>;
}

impl SshKeyVerifier for Git2Probe {
    fn verify(&self, repo: &RepoDetails, key: &SshKeyPair) -> anyhow::Result<()> {
        self.probe_with_ssh_key(repo.url(), repo.ssh_username(), &key.private_key)
    }
}

/// Android keystore to upload alongside the app.
#[derive(Debug, Clone)]
pub struct Keystore {
    pub path: PathBuf,
    pub params: KeystoreParams,
}

/// Everything the workflow sends to the platform.
#[derive(Debug, Clone)]
pub struct Registration {
    pub repo: RepoDetails,
    pub is_public: bool,
    /// `None` registers under the personal account.
    pub organization_slug: Option<String>,
    /// Required when the repository is cloned over SSH.
    pub ssh_key: Option<SshKeyPair>,
    /// Let the platform add `ssh_key` to the repository host. Only set for
    /// generated keys; a key supplied by the user already has access.
    pub register_key_into_provider: bool,
    pub pipeline: PipelineConfig,
    pub stack_id: String,
    pub add_webhook: bool,
    pub keystore: Option<Keystore>,
    pub build: BuildParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    RegisterApp,
    RegisterSshKey,
    Finish,
    UploadPipelineConfig,
    RegisterWebhook,
    UploadKeystore,
    TriggerBuild,
}

impl Step {
    fn describe(&self) -> &'static str {
        match self {
            Self::RegisterApp => "register app",
            Self::RegisterSshKey => "register SSH key",
            Self::Finish => "finish app setup",
            Self::UploadPipelineConfig => "upload pipeline config",
            Self::RegisterWebhook => "register webhook",
            Self::UploadKeystore => "upload keystore",
            Self::TriggerBuild => "trigger first build",
        }
    }
}

impl Registration {
    /// Steps this registration runs, in order.
    pub fn steps(&self) -> Vec<Step> {
        let mut steps = vec![Step::RegisterApp];
        if self.repo.scheme() == RepoScheme::Ssh {
            steps.push(Step::RegisterSshKey);
        }
        steps.push(Step::Finish);
        steps.push(Step::UploadPipelineConfig);
        if self.add_webhook {
            steps.push(Step::RegisterWebhook);
        }
        if self.keystore.is_some() {
            steps.push(Step::UploadKeystore);
        }
        steps.push(Step::TriggerBuild);
        steps
    }
}

/// Outcome of a completed registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    pub app_slug: String,
    pub build_trigger_token: String,
    pub webhook_registered: bool,
    pub build_triggered: bool,
}

/// Run every step of `registration` against `api`.
pub async fn register<A, P, V>(
    api: &A,
    prompts: &P,
    verifier: &V,
    registration: &Registration,
) -> anyhow::Result<RegistrationReport>
where
    A: PlatformApi,
    P: RegistrationPrompts + ?Sized,
    V: SshKeyVerifier + ?Sized,
{
    let mut report = RegistrationReport::default();

    for step in registration.steps() {
        info!(step = step.describe(), "Running registration step");
        run_step(api, prompts, verifier, registration, step, &mut report)
            .await
            .with_context(|| format!("Failed to {}", step.describe()))?;
    }

    Ok(report)
}

async fn run_step<A, P, V>(
    api: &A,
    prompts: &P,
    verifier: &V,
    registration: &Registration,
    step: Step,
    report: &mut RegistrationReport,
) -> anyhow::Result<()>
where
    A: PlatformApi,
    P: RegistrationPrompts + ?Sized,
    V: SshKeyVerifier + ?Sized,
{
    let app_slug = report.app_slug.clone();
    match step {
        Step::RegisterApp => {
            let params = RegisterAppParams::from_repo(&registration.repo, registration.is_public);
            report.app_slug = api.register_app(&params).await?;
        }
        Step::RegisterSshKey => {
            let key = registration
                .ssh_key
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("An SSH key is required for an SSH repository"))?;
            register_ssh_key(api, prompts, verifier, &app_slug, registration, key).await?;
        }
        Step::Finish => {
            let params = FinishParams::manual(
                registration.stack_id.as_str(),
                registration.pipeline.project_type(),
                registration.organization_slug.as_deref(),
            );
            let response = api.finish(&app_slug, &params).await?;
            report.build_trigger_token = response.build_trigger_token;
        }
        Step::UploadPipelineConfig => {
            api.upload_pipeline_config(&app_slug, registration.pipeline.content())
                .await?;
        }
        Step::RegisterWebhook => {
            report.webhook_registered = register_webhook(api, prompts, &app_slug).await?;
        }
        Step::UploadKeystore => {
            if let Some(keystore) = &registration.keystore {
                api.upload_keystore(&app_slug, keystore).await?;
            }
        }
        Step::TriggerBuild => {
            api.trigger_build(&app_slug, &registration.build).await?;
            report.build_triggered = true;
        }
    }
    Ok(())
}

async fn register_ssh_key<A, P, V>(
    api: &A,
    prompts: &P,
    verifier: &V,
    app_slug: &str,
    registration: &Registration,
    key: &SshKeyPair,
) -> anyhow::Result<()>
where
    A: PlatformApi,
    P: RegistrationPrompts + ?Sized,
    V: SshKeyVerifier + ?Sized,
{
    let repo = &registration.repo;
    let mut params = RegisterSshKeyParams {
        auth_ssh_private_key: key.private_key.clone(),
        auth_ssh_public_key: key.public_key.clone(),
        is_register_key_into_provider_service: false,
    };

    if !registration.register_key_into_provider {
        api.register_ssh_key(app_slug, &params).await?;
        return Ok(());
    }

    if repo.provider() != Provider::Other {
        params.is_register_key_into_provider_service = true;
        match api.register_ssh_key(app_slug, &params).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                warn!(error = %err, "Automatic SSH key registration failed");
            }
        }
        params.is_register_key_into_provider_service = false;
    }

    confirm_manual_ssh_key(prompts, verifier, repo, key)?;
    api.register_ssh_key(app_slug, &params).await?;
    Ok(())
}

/// Ask the user to add `key` by hand until the repository accepts it.
fn confirm_manual_ssh_key<P, V>(
    prompts: &P,
    verifier: &V,
    repo: &RepoDetails,
    key: &SshKeyPair,
) -> anyhow::Result<()>
where
    P: RegistrationPrompts + ?Sized,
    V: SshKeyVerifier + ?Sized,
{
    for attempt in 1..=MANUAL_KEY_ATTEMPTS {
        if !prompts.confirm_manual_ssh_key(&key.public_key)? {
            anyhow::bail!("SSH key was not added to the repository host");
        }
        match verifier.verify(repo, key) {
            Ok(()) => return Ok(()),
            Err(err) => {
                warn!(attempt, error = %err, "Repository is not readable with the SSH key");
            }
        }
    }
    anyhow::bail!(
        "SSH key still has no access to {} after {} attempts",
        repo.url(),
        MANUAL_KEY_ATTEMPTS
    )
}

/// Returns whether the webhook ended up registered.
async fn register_webhook<A, P>(api: &A, prompts: &P, app_slug: &str) -> anyhow::Result<bool>
where
    A: PlatformApi,
    P: RegistrationPrompts + ?Sized,
{
    loop {
        match api.register_webhook(app_slug).await {
            Ok(()) => return Ok(true),
            Err(err) if err.is_bad_request() => {
                warn!(error = %err, "Webhook registration rejected");
                if !prompts.retry_webhook()? {
                    warn!("Skipping webhook registration; builds will not start on push");
                    return Ok(false);
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}
