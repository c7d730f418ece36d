//! Build pipeline definition (`bitrise.yml`) loading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

pub const PIPELINE_FILE_NAME: &str = "bitrise.yml";

const PREFERRED_WORKFLOW: &str = "primary";

#[derive(Debug, Deserialize)]
struct PipelineDocument {
    format_version: Option<serde_yaml::Value>,
    project_type: Option<String>,
    #[serde(default)]
    workflows: BTreeMap<String, serde_yaml::Value>,
}

/// A validated pipeline definition, kept verbatim for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    path: PathBuf,
    content: String,
    project_type: Option<String>,
    workflows: Vec<String>,
}

impl PipelineConfig {
    /// Load `bitrise.yml` from the root of `search_dir`.
    pub fn discover(search_dir: &Path) -> anyhow::Result<Self> {
        let path = search_dir.join(PIPELINE_FILE_NAME);
        if !path.exists() {
            anyhow::bail!(
                "No {} found in {}; pass the path of the pipeline file explicitly",
                PIPELINE_FILE_NAME,
                search_dir.display()
            );
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;
        Self::parse(path, content)
    }

    pub fn parse(path: &Path, content: String) -> anyhow::Result<Self> {
        let document: PipelineDocument = serde_yaml::from_str(&content)
            .with_context(|| format!("Pipeline file is not valid YAML: {}", path.display()))?;

        match &document.format_version {
            None | Some(serde_yaml::Value::Null) => anyhow::bail!(
                "Pipeline file {} is missing format_version",
                path.display()
            ),
            Some(_) => {}
        }
        if document.workflows.is_empty() {
            anyhow::bail!("Pipeline file {} defines no workflows", path.display());
        }

        let workflows: Vec<String> = document.workflows.into_keys().collect();
        debug!(path = %path.display(), ?workflows, "Loaded pipeline file");

        Ok(Self {
            path: path.to_path_buf(),
            content,
            project_type: document.project_type.filter(|t| !t.trim().is_empty()),
            workflows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw YAML as read from disk.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn project_type(&self) -> Option<&str> {
        self.project_type.as_deref()
    }

    /// Workflow ids in lexical order.
    pub fn workflows(&self) -> &[String] {
        &self.workflows
    }

    /// Workflow used for the first build: `primary` if defined, else the first one.
    pub fn default_workflow(&self) -> &str {
        self.workflows
            .iter()
            .find(|w| w.as_str() == PREFERRED_WORKFLOW)
            .or_else(|| self.workflows.first())
            .map(String::as_str)
            .unwrap_or(PREFERRED_WORKFLOW)
    }
}
