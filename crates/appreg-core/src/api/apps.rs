//! App registration endpoints.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::client::{ApiError, Client};
use crate::repo::{Provider, RepoDetails};

/// Body of `POST apps/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterAppParams {
    pub git_owner: String,
    pub git_repo_slug: String,
    pub is_public: bool,
    pub provider: Provider,
    pub repo_url: String,
    pub r#type: String,
}

impl RegisterAppParams {
    pub fn from_repo(repo: &RepoDetails, is_public: bool) -> Self {
        Self {
            git_owner: repo.owner().to_string(),
            git_repo_slug: repo.slug().to_string(),
            is_public,
            provider: repo.provider(),
            repo_url: repo.url().to_string(),
            r#type: "git".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegisterAppResponse {
    slug: String,
}

/// Body of `POST apps/{app}/register-ssh-key`.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct RegisterSshKeyParams {
    pub auth_ssh_private_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub auth_ssh_public_key: String,
    pub is_register_key_into_provider_service: bool,
}

impl std::fmt::Debug for RegisterSshKeyParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterSshKeyParams")
            .field("auth_ssh_private_key", &"<redacted>")
            .field("auth_ssh_public_key", &self.auth_ssh_public_key)
            .field(
                "is_register_key_into_provider_service",
                &self.is_register_key_into_provider_service,
            )
            .finish()
    }
}

/// Body of `POST apps/{app}/finish`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinishParams {
    pub config: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub envs: BTreeMap<String, String>,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    pub stack_id: String,
}

impl FinishParams {
    /// Manual-mode finish; the pipeline config is uploaded separately.
    pub fn manual(
        stack_id: impl Into<String>,
        project_type: Option<&str>,
        organization_slug: Option<&str>,
    ) -> Self {
        Self {
            config: format!("default-{}-config", project_type.unwrap_or("other")),
            envs: BTreeMap::new(),
            mode: "manual".to_string(),
            organization_slug: organization_slug
                .filter(|slug| !slug.is_empty())
                .map(str::to_string),
            project_type: project_type.map(str::to_string),
            stack_id: stack_id.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FinishResponse {
    pub status: String,
    pub build_trigger_token: String,
    pub branch_name: String,
    pub is_webhook_auto_reg_supported: bool,
}

#[derive(Debug, Serialize)]
struct PipelineConfigParams<'a> {
    app_config_datastore_yaml: &'a str,
}

/// Android keystore metadata sent with the upload.
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeystoreParams {
    pub alias: String,
    pub password: String,
    #[serde(rename = "private_key_password")]
    pub key_password: String,
}

impl std::fmt::Debug for KeystoreParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoreParams")
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct KeystoreUploadParams<'a> {
    #[serde(flatten)]
    keystore: &'a KeystoreParams,
    upload_file_name: String,
    upload_file_size: u64,
}

#[derive(Debug, Deserialize)]
struct KeystoreUploadResponse {
    data: KeystoreUpload,
}

#[derive(Debug, Deserialize)]
struct KeystoreUpload {
    upload_url: String,
    slug: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildParams {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub branch: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub workflow_id: String,
}

#[derive(Debug, Serialize)]
struct HookInfo {
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct TriggerBuildParams<'a> {
    hook_info: HookInfo,
    build_params: &'a BuildParams,
}

impl Client {
    /// Create the app; returns its slug.
    pub async fn register_app(&self, params: &RegisterAppParams) -> Result<String, ApiError> {
        let response: RegisterAppResponse = self.post_for("apps/register", Some(params)).await?;
        info!(app = %response.slug, "App created");
        Ok(response.slug)
    }

    pub async fn register_ssh_key(
        &self,
        app_slug: &str,
        params: &RegisterSshKeyParams,
    ) -> Result<(), ApiError> {
        self.post(&format!("apps/{}/register-ssh-key", app_slug), Some(params))
            .await
    }

    pub async fn register_webhook(&self, app_slug: &str) -> Result<(), ApiError> {
        self.post::<()>(&format!("apps/{}/register-webhook", app_slug), None)
            .await
    }

    pub async fn finish(
        &self,
        app_slug: &str,
        params: &FinishParams,
    ) -> Result<FinishResponse, ApiError> {
        self.post_for(&format!("apps/{}/finish", app_slug), Some(params))
            .await
    }

    pub async fn upload_pipeline_config(&self, app_slug: &str, yaml: &str) -> Result<(), ApiError> {
        let params = PipelineConfigParams {
            app_config_datastore_yaml: yaml,
        };
        self.post(&format!("apps/{}/bitrise.yml", app_slug), Some(&params))
            .await
    }

    /// Register, upload and confirm an Android keystore file.
    pub async fn upload_keystore(
        &self,
        app_slug: &str,
        path: &Path,
        params: &KeystoreParams,
    ) -> Result<(), ApiError> {
        let content = std::fs::read(path).map_err(|source| ApiError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let upload_file_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let files_path = format!("apps/{}/android-keystore-files", app_slug);
        let request = KeystoreUploadParams {
            keystore: params,
            upload_file_name,
            upload_file_size: content.len() as u64,
        };
        let upload: KeystoreUploadResponse = self.post_for(&files_path, Some(&request)).await?;

        self.put_bytes(&upload.data.upload_url, content).await?;

        self.post::<()>(
            &format!("{}/{}/uploaded", files_path, upload.data.slug),
            None,
        )
        .await
    }

    pub async fn trigger_build(&self, app_slug: &str, params: &BuildParams) -> Result<(), ApiError> {
        let body = TriggerBuildParams {
            hook_info: HookInfo { r#type: "bitrise" },
            build_params: params,
        };
        self.post(&format!("apps/{}/builds", app_slug), Some(&body))
            .await
    }
}
