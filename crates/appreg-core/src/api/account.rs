//! Account and organization lookups.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::client::{ApiError, Client};

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// The user owning the API token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Organization {
    pub slug: String,
    pub name: String,
}

impl Client {
    pub async fn me(&self) -> Result<User, ApiError> {
        let envelope: DataEnvelope<User> = self.get("me").await?;
        Ok(envelope.data)
    }

    pub async fn organizations(&self) -> Result<Vec<Organization>, ApiError> {
        let envelope: DataEnvelope<Vec<Organization>> = self.get("organizations").await?;
        Ok(envelope.data)
    }

    /// Stack ids usable by the personal account or by `org_slug`, sorted.
    pub async fn available_stacks(&self, org_slug: Option<&str>) -> Result<Vec<String>, ApiError> {
        let path = match org_slug.filter(|slug| !slug.is_empty()) {
            Some(slug) => format!("organizations/{}/available-stacks", slug),
            None => "me/available-stacks".to_string(),
        };
        let stacks: BTreeMap<String, serde_json::Value> = self.get(&path).await?;
        Ok(stacks.into_keys().collect())
    }
}
