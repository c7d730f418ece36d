//! Interactive wizard for the register command.
//!
//! Every answer comes from a CLI flag, then saved progress, then a prompt.
//! Uses dialoguer for terminal UI prompts.

use std::cell::{RefCell, RefMut};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Password, Select, theme::ColorfulTheme};

use appreg_core::api::{KeystoreParams, Organization, User};
use appreg_core::pipeline::PipelineConfig;
use appreg_core::register::{Keystore, RegistrationPrompts, RegistrationReport};
use appreg_core::repo::{RepoDetails, UserChooser};
use appreg_core::stack::{default_stack, system_report_url};

/// `--account` value that selects the personal account.
pub const PERSONAL_ACCOUNT: &str = "personal";

/// Pre-filled values from CLI args that skip prompts.
#[derive(Debug, Clone, Default)]
pub struct PrefilledOptions {
    /// Organization slug, or [`PERSONAL_ACCOUNT`]
    pub account: Option<String>,
    pub public: Option<bool>,
    pub private_key: Option<PathBuf>,
    pub pipeline_config: Option<PathBuf>,
    pub stack: Option<String>,
    pub add_webhook: Option<bool>,
    pub keystore: Option<KeystoreArgs>,
    /// Take defaults instead of asking
    pub yes: bool,
}

/// Keystore flags; missing secrets are prompted for.
#[derive(Debug, Clone, Default)]
pub struct KeystoreArgs {
    pub path: PathBuf,
    pub alias: Option<String>,
    pub password: Option<String>,
    pub key_password: Option<String>,
}

/// Where the SSH key of a private repository comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Generate,
    File(PathBuf),
}

/// What gets registered, shown before anything is sent.
#[derive(Debug)]
pub struct Summary<'a> {
    pub account: &'a str,
    pub public: bool,
    pub repo: &'a RepoDetails,
    pub pipeline: &'a Path,
    pub stack: &'a str,
    pub add_webhook: bool,
    pub branch: &'a str,
    pub workflow: &'a str,
}

pub struct Wizard<W: Write = io::Stdout> {
    prefilled: PrefilledOptions,
    /// Output writer (for testing)
    writer: RefCell<W>,
    theme: ColorfulTheme,
}

impl Wizard<io::Stdout> {
    pub fn new(prefilled: PrefilledOptions) -> Self {
        Self {
            prefilled,
            writer: RefCell::new(io::stdout()),
            theme: ColorfulTheme::default(),
        }
    }
}

impl<W: Write> Wizard<W> {
    /// Create a wizard with a custom writer (for testing).
    #[cfg(test)]
    pub fn with_writer(prefilled: PrefilledOptions, writer: W) -> Self {
        Self {
            prefilled,
            writer: RefCell::new(writer),
            theme: ColorfulTheme::default(),
        }
    }

    fn out(&self) -> RefMut<'_, W> {
        self.writer.borrow_mut()
    }

    pub fn print_header(&self) -> Result<()> {
        let mut out = self.out();
        writeln!(out)?;
        writeln!(out, "{}", style("  Bitrise App Registration").bold().cyan())?;
        writeln!(out)?;
        Ok(())
    }

    fn print_phase(&self, title: &str) -> Result<()> {
        writeln!(self.out(), "{}", style(title).bold())?;
        Ok(())
    }

    /// Organization slug to register under; empty for the personal account.
    pub fn account(
        &self,
        saved: Option<&str>,
        load: impl FnOnce() -> Result<(User, Vec<Organization>)>,
    ) -> Result<String> {
        if let Some(account) = &self.prefilled.account {
            return Ok(normalize_account(account));
        }
        if let Some(saved) = saved {
            return Ok(saved.to_string());
        }

        self.print_phase("Account")?;
        let (user, organizations) = load().context("Failed to list accounts")?;
        if organizations.is_empty() || self.prefilled.yes {
            return Ok(String::new());
        }

        let mut options = vec![format!("{} (personal)", user.username)];
        options.extend(organizations.iter().map(|org| org.name.clone()));
        let selection = Select::with_theme(&self.theme)
            .with_prompt("Register the app under")
            .items(&options)
            .default(0)
            .interact()?;

        Ok(match selection {
            0 => String::new(),
            i => organizations[i - 1].slug.clone(),
        })
    }

    pub fn public(&self, saved: Option<bool>) -> Result<bool> {
        if let Some(public) = self.prefilled.public.or(saved) {
            return Ok(public);
        }
        if self.prefilled.yes {
            return Ok(false);
        }

        let public = Confirm::with_theme(&self.theme)
            .with_prompt("Make the app public? (build logs visible to anyone)")
            .default(false)
            .interact()?;
        Ok(public)
    }

    pub fn key_source(&self, saved: Option<&Path>) -> Result<KeySource> {
        if let Some(path) = self.prefilled.private_key.as_deref().or(saved) {
            return Ok(KeySource::File(path.to_path_buf()));
        }
        if self.prefilled.yes {
            return Ok(KeySource::Generate);
        }

        self.print_phase("SSH key")?;
        let options = vec![
            "Generate a new SSH key pair",
            "Use my own private key",
        ];
        let selection = Select::with_theme(&self.theme)
            .with_prompt("The repository is cloned over SSH")
            .items(&options)
            .default(0)
            .interact()?;
        if selection == 0 {
            return Ok(KeySource::Generate);
        }

        let path: String = Input::with_theme(&self.theme)
            .with_prompt("Private key path")
            .interact_text()?;
        Ok(KeySource::File(PathBuf::from(path.trim())))
    }

    pub fn pipeline(&self, saved: Option<&Path>, work_dir: &Path) -> Result<PipelineConfig> {
        if let Some(path) = self.prefilled.pipeline_config.as_deref().or(saved) {
            return PipelineConfig::load(path);
        }

        match PipelineConfig::discover(work_dir) {
            Ok(config) => Ok(config),
            Err(err) if self.prefilled.yes => Err(err),
            Err(err) => {
                writeln!(self.out(), "{} {:#}", style("!").yellow(), err)?;
                let path: String = Input::with_theme(&self.theme)
                    .with_prompt("Pipeline config path")
                    .interact_text()?;
                PipelineConfig::load(Path::new(path.trim()))
            }
        }
    }

    pub fn stack(
        &self,
        saved: Option<&str>,
        project_type: Option<&str>,
        load_available: impl FnOnce() -> Result<Vec<String>>,
    ) -> Result<String> {
        if let Some(stack) = self.prefilled.stack.as_deref().or(saved) {
            return Ok(stack.to_string());
        }

        if let Some(stack) = project_type.and_then(default_stack) {
            writeln!(
                self.out(),
                "  Stack: {} ({})",
                style(stack).green(),
                system_report_url(stack)
            )?;
            return Ok(stack.to_string());
        }

        self.print_phase("Stack")?;
        let stacks = load_available().context("Failed to list available stacks")?;
        if stacks.is_empty() {
            anyhow::bail!("No stacks available for this account");
        }
        if self.prefilled.yes {
            return Ok(stacks[0].clone());
        }

        let selection = Select::with_theme(&self.theme)
            .with_prompt("Build stack")
            .items(&stacks)
            .default(0)
            .interact()?;
        Ok(stacks[selection].clone())
    }

    pub fn add_webhook(&self, saved: Option<bool>) -> Result<bool> {
        if let Some(add) = self.prefilled.add_webhook.or(saved) {
            return Ok(add);
        }
        if self.prefilled.yes {
            return Ok(true);
        }

        let add = Confirm::with_theme(&self.theme)
            .with_prompt("Register a webhook so pushes start builds?")
            .default(true)
            .interact()?;
        Ok(add)
    }

    pub fn keystore(&self) -> Result<Option<Keystore>> {
        let Some(args) = &self.prefilled.keystore else {
            return Ok(None);
        };

        let alias = match &args.alias {
            Some(alias) => alias.clone(),
            None => Input::with_theme(&self.theme)
                .with_prompt("Keystore alias")
                .interact_text()?,
        };
        let password = match &args.password {
            Some(password) => password.clone(),
            None => Password::with_theme(&self.theme)
                .with_prompt("Keystore password")
                .interact()?,
        };
        let key_password = match &args.key_password {
            Some(password) => password.clone(),
            None => Password::with_theme(&self.theme)
                .with_prompt("Key password")
                .interact()?,
        };

        Ok(Some(Keystore {
            path: args.path.clone(),
            params: KeystoreParams {
                alias,
                password,
                key_password,
            },
        }))
    }

    pub fn show_summary_and_confirm(&self, summary: &Summary<'_>) -> Result<bool> {
        {
            let mut out = self.out();
            writeln!(out)?;
            writeln!(out, "{}", style("  Summary").bold())?;
            writeln!(out, "  ───────────────────────────")?;
            let account = if summary.account.is_empty() {
                "personal"
            } else {
                summary.account
            };
            let visibility = if summary.public { "public" } else { "private" };
            writeln!(out, "  Account:    {}", style(account).green())?;
            writeln!(out, "  Visibility: {}", style(visibility).green())?;
            writeln!(out, "  Repository: {}", style(summary.repo.url()).green())?;
            writeln!(
                out,
                "  Provider:   {} ({}/{})",
                style(summary.repo.provider()).green(),
                summary.repo.owner(),
                summary.repo.slug()
            )?;
            writeln!(
                out,
                "  Pipeline:   {}",
                style(summary.pipeline.display()).green()
            )?;
            writeln!(out, "  Stack:      {}", style(summary.stack).green())?;
            writeln!(out, "  Webhook:    {}", style(summary.add_webhook).green())?;
            if !summary.branch.is_empty() {
                writeln!(out, "  Branch:     {}", style(summary.branch).green())?;
            }
            writeln!(out, "  Workflow:   {}", style(summary.workflow).green())?;
            writeln!(out)?;
        }

        if self.prefilled.yes {
            return Ok(true);
        }

        let confirmed = Confirm::with_theme(&self.theme)
            .with_prompt("Register the app?")
            .default(true)
            .interact()?;
        Ok(confirmed)
    }

    pub fn print_report(&self, report: &RegistrationReport) -> Result<()> {
        let mut out = self.out();
        writeln!(out)?;
        writeln!(
            out,
            "{} App registered: {}",
            style("✓").green(),
            style(format!("https://app.bitrise.io/app/{}", report.app_slug)).cyan()
        )?;
        if !report.build_trigger_token.is_empty() {
            writeln!(out, "  Build trigger token: {}", report.build_trigger_token)?;
        }
        if !report.webhook_registered {
            writeln!(
                out,
                "  {} No webhook registered; pushes will not start builds",
                style("!").yellow()
            )?;
        }
        if report.build_triggered {
            writeln!(out, "  First build started")?;
        }
        Ok(())
    }
}

impl<W: Write> UserChooser for Wizard<W> {
    fn choose_one(&self, prompt: &str, options: &[String]) -> Result<String> {
        let selection = Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(options)
            .default(0)
            .interact()?;
        options
            .get(selection)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No option selected"))
    }
}

impl<W: Write> RegistrationPrompts for Wizard<W> {
    fn confirm_manual_ssh_key(&self, public_key: &str) -> Result<bool> {
        {
            let mut out = self.out();
            writeln!(out)?;
            writeln!(
                out,
                "Add this public key to the repository host (deploy key or user SSH key):"
            )?;
            writeln!(out)?;
            writeln!(out, "{}", public_key)?;
            writeln!(out)?;
        }

        let added = Confirm::with_theme(&self.theme)
            .with_prompt("Have you added the key?")
            .default(false)
            .interact()?;
        Ok(added)
    }

    fn retry_webhook(&self) -> Result<bool> {
        writeln!(
            self.out(),
            "{} Webhook registration was rejected. Check that the repository host integration is connected.",
            style("!").yellow()
        )?;
        let retry = Confirm::with_theme(&self.theme)
            .with_prompt("Retry webhook registration?")
            .default(true)
            .interact()?;
        Ok(retry)
    }
}

fn normalize_account(account: &str) -> String {
    let account = account.trim();
    if account.eq_ignore_ascii_case(PERSONAL_ACCOUNT) {
        String::new()
    } else {
        account.to_string()
    }
}

#[cfg(test)]
impl Wizard<Vec<u8>> {
    fn output(&self) -> String {
        String::from_utf8_lossy(&self.writer.borrow()).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appreg_core::repo::UrlParts;
    use tempfile::TempDir;

    const PIPELINE: &str = "format_version: \"11\"\nproject_type: ios\nworkflows:\n  primary: {}\n";

    fn wizard(prefilled: PrefilledOptions) -> Wizard<Vec<u8>> {
        Wizard::with_writer(prefilled, Vec::new())
    }

    fn no_accounts() -> Result<(User, Vec<Organization>)> {
        panic!("accounts should not be listed")
    }

    fn no_stacks() -> Result<Vec<String>> {
        panic!("stacks should not be listed")
    }

    #[test]
    fn test_prefilled_options_default() {
        let prefilled = PrefilledOptions::default();

        assert!(prefilled.account.is_none());
        assert!(prefilled.public.is_none());
        assert!(prefilled.private_key.is_none());
        assert!(prefilled.keystore.is_none());
        assert!(!prefilled.yes);
    }

    #[test]
    fn test_personal_account_flag_maps_to_empty_slug() {
        let wizard = wizard(PrefilledOptions {
            account: Some("Personal".to_string()),
            ..Default::default()
        });

        assert_eq!(wizard.account(Some("org-1"), no_accounts).unwrap(), "");
    }

    #[test]
    fn test_flag_wins_over_saved_progress() {
        let wizard = wizard(PrefilledOptions {
            account: Some("org-2".to_string()),
            public: Some(true),
            add_webhook: Some(false),
            stack: Some("linux-docker-android-22.04".to_string()),
            ..Default::default()
        });

        assert_eq!(wizard.account(Some("org-1"), no_accounts).unwrap(), "org-2");
        assert!(wizard.public(Some(false)).unwrap());
        assert!(!wizard.add_webhook(Some(true)).unwrap());
        assert_eq!(
            wizard
                .stack(Some("osx-xcode-13.1.x"), Some("ios"), no_stacks)
                .unwrap(),
            "linux-docker-android-22.04"
        );
    }

    #[test]
    fn test_saved_progress_skips_prompts() {
        let wizard = wizard(PrefilledOptions::default());

        assert_eq!(wizard.account(Some(""), no_accounts).unwrap(), "");
        assert!(!wizard.public(Some(false)).unwrap());
        assert!(wizard.add_webhook(Some(true)).unwrap());
        assert_eq!(
            wizard.key_source(Some(Path::new("/keys/id_rsa"))).unwrap(),
            KeySource::File(PathBuf::from("/keys/id_rsa"))
        );
        assert_eq!(
            wizard.stack(Some("custom-stack"), None, no_stacks).unwrap(),
            "custom-stack"
        );
    }

    #[test]
    fn test_yes_flag_takes_defaults() {
        let wizard = wizard(PrefilledOptions {
            yes: true,
            ..Default::default()
        });

        assert!(!wizard.public(None).unwrap());
        assert!(wizard.add_webhook(None).unwrap());
        assert_eq!(wizard.key_source(None).unwrap(), KeySource::Generate);
    }

    #[test]
    fn test_yes_flag_picks_personal_account() {
        let wizard = wizard(PrefilledOptions {
            yes: true,
            ..Default::default()
        });

        let account = wizard
            .account(None, || {
                Ok((
                    User {
                        username: "octo".to_string(),
                        slug: "user-1".to_string(),
                    },
                    vec![Organization {
                        slug: "org-1".to_string(),
                        name: "Mobile".to_string(),
                    }],
                ))
            })
            .unwrap();

        assert_eq!(account, "");
    }

    #[test]
    fn test_stack_defaults_from_project_type() {
        let wizard = wizard(PrefilledOptions::default());

        let stack = wizard.stack(None, Some("ios"), no_stacks).unwrap();

        assert_eq!(stack, "osx-xcode-13.1.x");
        assert!(wizard.output().contains("system_reports/osx-xcode-13.1.x.log"));
    }

    #[test]
    fn test_unknown_project_type_lists_stacks() {
        let wizard = wizard(PrefilledOptions {
            yes: true,
            ..Default::default()
        });

        let stack = wizard
            .stack(None, Some("xamarin"), || {
                Ok(vec!["linux-docker-android-20.04".to_string()])
            })
            .unwrap();

        assert_eq!(stack, "linux-docker-android-20.04");
    }

    #[test]
    fn test_pipeline_discovered_in_work_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("bitrise.yml"), PIPELINE).unwrap();
        let wizard = wizard(PrefilledOptions::default());

        let pipeline = wizard.pipeline(None, temp.path()).unwrap();

        assert_eq!(pipeline.project_type(), Some("ios"));
    }

    #[test]
    fn test_missing_pipeline_with_yes_fails() {
        let temp = TempDir::new().unwrap();
        let wizard = wizard(PrefilledOptions {
            yes: true,
            ..Default::default()
        });

        assert!(wizard.pipeline(None, temp.path()).is_err());
    }

    #[test]
    fn test_keystore_from_flags() {
        let wizard = wizard(PrefilledOptions {
            keystore: Some(KeystoreArgs {
                path: PathBuf::from("release.keystore"),
                alias: Some("upload".to_string()),
                password: Some("store".to_string()),
                key_password: Some("key".to_string()),
            }),
            ..Default::default()
        });

        let keystore = wizard.keystore().unwrap().unwrap();

        assert_eq!(keystore.path, PathBuf::from("release.keystore"));
        assert_eq!(keystore.params.alias, "upload");
        assert_eq!(keystore.params.key_password, "key");
    }

    #[test]
    fn test_no_keystore_without_flag() {
        assert!(wizard(PrefilledOptions::default()).keystore().unwrap().is_none());
    }

    #[test]
    fn test_summary_output_format() {
        let parts = UrlParts::parse("git@github.com:bitrise-io/go-utils.git").unwrap();
        let repo = RepoDetails::from_parts(&parts);
        let wizard = wizard(PrefilledOptions {
            yes: true,
            ..Default::default()
        });

        let confirmed = wizard
            .show_summary_and_confirm(&Summary {
                account: "",
                public: false,
                repo: &repo,
                pipeline: Path::new("bitrise.yml"),
                stack: "osx-xcode-13.1.x",
                add_webhook: true,
                branch: "main",
                workflow: "primary",
            })
            .unwrap();

        assert!(confirmed);
        let output = wizard.output();
        assert!(output.contains("Summary"));
        assert!(output.contains("personal"));
        assert!(output.contains("ssh://git@github.com/bitrise-io/go-utils.git"));
        assert!(output.contains("bitrise-io/go-utils)"));
        assert!(output.contains("primary"));
    }

    #[test]
    fn test_report_warns_about_missing_webhook() {
        let wizard = wizard(PrefilledOptions::default());

        wizard
            .print_report(&RegistrationReport {
                app_slug: "app-1".to_string(),
                build_trigger_token: "token".to_string(),
                webhook_registered: false,
                build_triggered: true,
            })
            .unwrap();

        let output = wizard.output();
        assert!(output.contains("app-1"));
        assert!(output.contains("No webhook registered"));
        assert!(output.contains("First build started"));
    }
}
