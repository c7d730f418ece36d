//! appreg - register a git repository as a Bitrise app
//!
//! Usage:
//!   appreg                       # Interactive registration of the current directory
//!   appreg --dir ../app --yes    # Take defaults where no flag or saved answer exists
//!   appreg --repo <url> --public # Register a URL instead of the local origin

mod wizard;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use appreg_core::api::{BuildParams, Client};
use appreg_core::config::AppregConfig;
use appreg_core::pipeline::PipelineConfig;
use appreg_core::progress::{Progress, ProgressStore};
use appreg_core::register::{Registration, RegistrationReport, register};
use appreg_core::repo::{
    Git2Inspector, Git2Probe, RepoDetails, RepoResolver, RepoScheme, current_branch,
};
use appreg_core::ssh_key::SshKeyPair;

use crate::wizard::{KeySource, KeystoreArgs, PrefilledOptions, Summary, Wizard};

#[derive(Parser, Debug)]
#[command(name = "appreg")]
#[command(about = "Register a git repository as an app on Bitrise", long_about = None)]
struct Cli {
    /// Working copy to register
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Organization slug to register under ("personal" for your own account)
    #[arg(long)]
    account: Option<String>,

    /// Make the app public
    #[arg(long, conflicts_with = "private")]
    public: bool,

    /// Make the app private
    #[arg(long)]
    private: bool,

    /// Repository URL; defaults to the origin remote of --dir
    #[arg(long)]
    repo: Option<String>,

    /// SSH private key used to clone an SSH repository
    #[arg(long)]
    private_key: Option<PathBuf>,

    /// Pipeline config to upload; defaults to <dir>/bitrise.yml
    #[arg(long = "bitrise-yml")]
    bitrise_yml: Option<PathBuf>,

    /// Build stack id
    #[arg(long)]
    stack: Option<String>,

    /// Register a webhook on the repository host
    #[arg(long)]
    add_webhook: bool,

    /// Android keystore to upload
    #[arg(long)]
    keystore: Option<PathBuf>,

    #[arg(long, requires = "keystore")]
    keystore_alias: Option<String>,

    #[arg(long, requires = "keystore")]
    keystore_password: Option<String>,

    #[arg(long, requires = "keystore")]
    keystore_key_password: Option<String>,

    /// Workflow of the first build
    #[arg(long)]
    workflow: Option<String>,

    /// Branch of the first build; defaults to the checked-out branch
    #[arg(long)]
    branch: Option<String>,

    /// Personal access token (or APPREG_API_TOKEN)
    #[arg(long)]
    api_token: Option<String>,

    /// API base URL (or APPREG_API_BASE_URL)
    #[arg(long)]
    api_base_url: Option<String>,

    /// Accept defaults and skip the final confirmation
    #[arg(short, long)]
    yes: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn public(&self) -> Option<bool> {
        match (self.public, self.private) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    fn prefilled(&self) -> PrefilledOptions {
        PrefilledOptions {
            account: self.account.clone(),
            public: self.public(),
            private_key: self.private_key.clone(),
            pipeline_config: self.bitrise_yml.clone(),
            stack: self.stack.clone(),
            add_webhook: self.add_webhook.then_some(true),
            keystore: self.keystore.clone().map(|path| KeystoreArgs {
                path,
                alias: self.keystore_alias.clone(),
                password: self.keystore_password.clone(),
                key_password: self.keystore_key_password.clone(),
            }),
            yes: self.yes,
        }
    }

    fn config(&self) -> Result<AppregConfig> {
        let mut config = AppregConfig::load(&AppregConfig::default_path()?)?.with_env_overrides();
        if let Some(token) = &self.api_token {
            config.api_token = Some(token.clone());
        }
        if let Some(base_url) = &self.api_base_url {
            config.api_base_url = base_url.clone();
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "appreg=debug,appreg_core=debug,info"
    } else {
        "appreg=info,appreg_core=info,warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    run_register(cli)
}

fn run_register(cli: Cli) -> Result<()> {
    let work_dir = cli
        .dir
        .canonicalize()
        .with_context(|| format!("Directory not found: {}", cli.dir.display()))?;
    let config = cli.config()?;

    let token = config
        .api_token
        .clone()
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!("No API token; pass --api-token or set APPREG_API_TOKEN")
        })?;
    let mut client =
        Client::new(config.api_base_url()?, token)?.with_retry(config.retry_policy());
    if let Some(timeout) = config.request_timeout() {
        client = client.with_timeout(timeout);
    }
    let runtime = Runtime::new().context("Failed to create async runtime")?;

    let store = ProgressStore::for_work_dir(&work_dir)?;
    let mut progress = store.load()?;
    if progress != Progress::default() {
        info!(path = %store.path().display(), "Resuming from saved progress");
    }

    let wizard = Wizard::new(cli.prefilled());
    let session = Session {
        cli: &cli,
        config: &config,
        client: &client,
        runtime: &runtime,
        wizard: &wizard,
        work_dir: &work_dir,
    };

    match session.run(&mut progress) {
        Ok(Some(report)) => {
            store.destroy()?;
            wizard.print_report(&report)?;
            Ok(())
        }
        Ok(None) => {
            store.store(&progress)?;
            println!("Cancelled");
            Ok(())
        }
        Err(err) => {
            if let Err(store_err) = store.store(&progress) {
                warn!(error = %format!("{:#}", store_err), "Failed to save progress");
            }
            Err(err)
        }
    }
}

struct Session<'a> {
    cli: &'a Cli,
    config: &'a AppregConfig,
    client: &'a Client,
    runtime: &'a Runtime,
    wizard: &'a Wizard,
    work_dir: &'a Path,
}

impl Session<'_> {
    /// Collect the answers into `progress`, then register.
    /// `None` if the user cancelled at the summary.
    fn run(&self, progress: &mut Progress) -> Result<Option<RegistrationReport>> {
        self.wizard.print_header()?;

        let account = self
            .wizard
            .account(progress.account.as_deref(), || {
                self.runtime.block_on(async {
                    Ok::<_, anyhow::Error>((
                        self.client.me().await?,
                        self.client.organizations().await?,
                    ))
                })
            })?;
        progress.account = Some(account.clone());

        let public = self.wizard.public(progress.public)?;
        if progress.public != Some(public) {
            progress.repo = None;
        }
        progress.public = Some(public);

        let repo = match (&self.cli.repo, &progress.repo) {
            (None, Some(saved)) => saved.clone(),
            (remote_url, _) => self.resolve_repo(remote_url.as_deref(), public)?,
        };
        progress.repo = Some(repo.clone());

        let mut register_key_into_provider = false;
        let ssh_key = if repo.scheme() == RepoScheme::Ssh {
            let source = self.wizard.key_source(progress.private_key_path.as_deref())?;
            let key = self.load_ssh_key(&repo, &source)?;
            match source {
                KeySource::Generate => register_key_into_provider = true,
                KeySource::File(path) => progress.private_key_path = Some(path),
            }
            Some(key)
        } else {
            None
        };

        let pipeline = self
            .wizard
            .pipeline(progress.pipeline_config_path.as_deref(), self.work_dir)?;
        progress.pipeline_config_path = Some(pipeline.path().to_path_buf());

        let organization_slug = Some(account.clone()).filter(|slug| !slug.is_empty());
        let stack = self.wizard.stack(
            progress.stack.as_deref(),
            pipeline.project_type(),
            || {
                self.runtime
                    .block_on(self.client.available_stacks(organization_slug.as_deref()))
                    .map_err(Into::into)
            },
        )?;
        progress.stack = Some(stack.clone());

        let add_webhook = self.wizard.add_webhook(progress.add_webhook)?;
        progress.add_webhook = Some(add_webhook);

        let keystore = self.wizard.keystore()?;
        let build = self.build_params(&pipeline);

        let confirmed = self.wizard.show_summary_and_confirm(&Summary {
            account: &account,
            public,
            repo: &repo,
            pipeline: pipeline.path(),
            stack: &stack,
            add_webhook,
            branch: &build.branch,
            workflow: &build.workflow_id,
        })?;
        if !confirmed {
            return Ok(None);
        }

        let registration = Registration {
            repo,
            is_public: public,
            organization_slug,
            ssh_key,
            register_key_into_provider,
            pipeline,
            stack_id: stack,
            add_webhook,
            keystore,
            build,
        };
        let report = self
            .runtime
            .block_on(register(self.client, self.wizard, &self.probe(), &registration))?;
        Ok(Some(report))
    }

    fn probe(&self) -> Git2Probe {
        match self.config.probe_timeout() {
            Some(deadline) => Git2Probe::new().with_deadline(deadline),
            None => Git2Probe::new(),
        }
    }

    fn resolve_repo(&self, remote_url: Option<&str>, public: bool) -> Result<RepoDetails> {
        let inspector = Git2Inspector;
        let probe = self.probe();
        let resolver = RepoResolver::new(&inspector, &probe, self.wizard);

        let repo = match remote_url {
            Some(url) => resolver.resolve_url(url, public),
            None => resolver.resolve(self.work_dir, public),
        }
        .context("Failed to resolve repository")?;

        info!(
            url = repo.url(),
            provider = %repo.provider(),
            owner = repo.owner(),
            slug = repo.slug(),
            "Repository resolved"
        );
        Ok(repo)
    }

    fn load_ssh_key(&self, repo: &RepoDetails, source: &KeySource) -> Result<SshKeyPair> {
        match source {
            KeySource::Generate => SshKeyPair::generate(),
            KeySource::File(path) => {
                let key = SshKeyPair::from_private_key_file(path)?;
                self.probe()
                    .probe_with_ssh_key(repo.url(), repo.ssh_username(), &key.private_key)
                    .with_context(|| {
                        format!(
                            "SSH key {} cannot access {}",
                            path.display(),
                            repo.url()
                        )
                    })?;
                debug!(path = %path.display(), "SSH key has repository access");
                Ok(key)
            }
        }
    }

    fn build_params(&self, pipeline: &PipelineConfig) -> BuildParams {
        let branch = match &self.cli.branch {
            Some(branch) => branch.clone(),
            None => match current_branch(self.work_dir) {
                Ok(info) => info.remote_branch().to_string(),
                Err(err) => {
                    debug!(error = %format!("{:#}", err), "No current branch; using the platform default");
                    String::new()
                }
            },
        };
        let workflow_id = self
            .cli
            .workflow
            .clone()
            .unwrap_or_else(|| pipeline.default_workflow().to_string());

        BuildParams {
            branch,
            workflow_id,
        }
    }
}
