//! Publication of feature-collection documents.
//!
//! [`GitHubDocumentStore`] commits each document to a repository through
//! the contents API (update when the path exists, create otherwise) and
//! returns its browsable URL. [`ObjectDocumentStore`] is the fallback when
//! no repository credential is configured.

use super::ObjectStore;
use crate::config::Namespaces;
use crate::error::GeoRefError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Default GitHub REST endpoint.
pub const GITHUB_API: &str = "https://api.github.com";

/// Repository used when none is configured.
pub const DEFAULT_REPOSITORY: &str = "water_resources_geojson";

/// Upserts named JSON documents and reports where they can be read.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or overwrite `name`, returning a stable URL for it.
    async fn upsert(&self, name: &str, content: &str, message: &str) -> Result<String, GeoRefError>;
}

/// Settings for [`GitHubDocumentStore`].
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub token: String,
    pub repository: String,
    /// Repository owner; the token's own login when unset.
    pub owner: Option<String>,
    pub branch: String,
    pub api_base: String,
}

impl GitHubConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            repository: DEFAULT_REPOSITORY.to_string(),
            owner: None,
            branch: "main".to_string(),
            api_base: GITHUB_API.to_string(),
        }
    }
}

/// GitHub contents-API client.
pub struct GitHubDocumentStore {
    client: reqwest::Client,
    config: GitHubConfig,
    owner: OnceCell<String>,
}

#[derive(Deserialize)]
struct User {
    login: String,
}

#[derive(Deserialize)]
struct ContentEntry {
    sha: String,
}

impl GitHubDocumentStore {
    pub fn new(config: GitHubConfig) -> Result<Self, GeoRefError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("georef-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GeoRefError::Internal(format!("HTTP client: {e}")))?;
        let owner = OnceCell::new_with(config.owner.clone());
        Ok(Self {
            client,
            config,
            owner,
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.config.token)
            .header("Accept", "application/vnd.github+json")
    }

    async fn owner(&self, name: &str) -> Result<&str, GeoRefError> {
        let owner = self
            .owner
            .get_or_try_init(|| async {
                let url = format!("{}/user", self.config.api_base);
                let response = self
                    .request(reqwest::Method::GET, &url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| publish_failed(name, format!("resolving repository owner: {e}")))?;
                let user: User = response
                    .json()
                    .await
                    .map_err(|e| publish_failed(name, format!("resolving repository owner: {e}")))?;
                debug!("Repository owner resolved to {}", user.login);
                Ok::<_, GeoRefError>(user.login)
            })
            .await?;
        Ok(owner.as_str())
    }

    /// SHA of the existing file at `path`, or `None` when it does not exist.
    async fn existing_sha(&self, url: &str, name: &str) -> Result<Option<String>, GeoRefError> {
        let response = self
            .request(reqwest::Method::GET, url)
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await
            .map_err(|e| publish_failed(name, e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| publish_failed(name, e.to_string()))?;
        let entry: ContentEntry = response
            .json()
            .await
            .map_err(|e| publish_failed(name, e.to_string()))?;
        Ok(Some(entry.sha))
    }
}

fn publish_failed(name: &str, detail: String) -> GeoRefError {
    GeoRefError::PublishFailed {
        name: name.to_string(),
        detail,
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl DocumentStore for GitHubDocumentStore {
    async fn upsert(&self, name: &str, content: &str, message: &str) -> Result<String, GeoRefError> {
        let owner = self.owner(name).await?;
        let path = encode_path(name);
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_base, owner, self.config.repository, path
        );

        let sha = self.existing_sha(&url, name).await?;
        let mut body = json!({
            "message": message,
            "content": STANDARD.encode(content.as_bytes()),
            "branch": self.config.branch,
        });
        if let Some(sha) = &sha {
            body["sha"] = json!(sha);
        }

        self.request(reqwest::Method::PUT, &url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| publish_failed(name, e.to_string()))?;

        let html_url = format!(
            "https://github.com/{}/{}/blob/{}/{}",
            owner, self.config.repository, self.config.branch, path
        );
        info!(
            "{} {} in {}/{}",
            if sha.is_some() { "Updated" } else { "Created" },
            name,
            owner,
            self.config.repository
        );
        Ok(html_url)
    }
}

/// Writes documents into a namespace of the object store.
#[derive(Debug, Clone)]
pub struct ObjectDocumentStore {
    store: ObjectStore,
    namespace: String,
}

impl ObjectDocumentStore {
    pub fn new(store: ObjectStore, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl DocumentStore for ObjectDocumentStore {
    async fn upsert(&self, name: &str, content: &str, message: &str) -> Result<String, GeoRefError> {
        let key = Namespaces::key(&self.namespace, name);
        self.store
            .put(&key, content.as_bytes().to_vec())
            .await
            .map_err(|e| publish_failed(name, e.to_string()))?;
        debug!("{}: {}", message, key);
        Ok(self.store.location(&key))
    }
}
