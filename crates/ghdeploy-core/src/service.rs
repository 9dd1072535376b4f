//! Pulumi Cloud client for deployment settings.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::deployment::{DeploymentDescriptor, DeploymentService};
use crate::error::{DeployError, Result};

pub const DEFAULT_API_URL: &str = "https://api.pulumi.com";
const API_MEDIA_TYPE: &str = "application/vnd.pulumi+8";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsRequest {
    git_hub: GitHubSettings,
    source_context: SourceContext,
}

#[derive(Debug, Serialize)]
struct GitHubSettings {
    repository: String,
}

#[derive(Debug, Serialize)]
struct SourceContext {
    git: GitSource,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GitSource {
    branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    repo_dir: Option<String>,
}

impl From<&DeploymentDescriptor> for SettingsRequest {
    fn from(descriptor: &DeploymentDescriptor) -> Self {
        let repo_dir = (!descriptor.repo_dir.is_empty()).then(|| descriptor.repo_dir.to_string());
        Self {
            git_hub: GitHubSettings {
                repository: descriptor.repo.to_string(),
            },
            source_context: SourceContext {
                git: GitSource {
                    branch: descriptor.branch.clone(),
                    repo_dir,
                },
            },
        }
    }
}

/// JSON body sent for `descriptor`.
pub fn settings_body(descriptor: &DeploymentDescriptor) -> serde_json::Value {
    // SettingsRequest only holds strings, so this cannot fail.
    serde_json::to_value(SettingsRequest::from(descriptor)).unwrap_or_default()
}

/// Identifier of the settings object, which is keyed by stack.
pub fn settings_id(descriptor: &DeploymentDescriptor) -> String {
    format!(
        "{}/{}/{}",
        descriptor.organization, descriptor.project, descriptor.stack
    )
}

/// Creates deployment settings through the Pulumi Cloud REST API.
#[derive(Clone)]
pub struct PulumiServiceClient {
    client: reqwest::Client,
    api_url: Url,
    access_token: String,
}

impl std::fmt::Debug for PulumiServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulumiServiceClient")
            .field("api_url", &self.api_url.as_str())
            .finish_non_exhaustive()
    }
}

impl PulumiServiceClient {
    pub fn new(api_url: Url, access_token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ghdeploy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeployError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, api_url, access_token))
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(
        client: reqwest::Client,
        api_url: Url,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url,
            access_token: access_token.into(),
        }
    }

    pub fn settings_url(&self, descriptor: &DeploymentDescriptor) -> Result<Url> {
        let raw = format!(
            "{}/api/stacks/{}/{}/{}/deployments/settings",
            self.api_url.as_str().trim_end_matches('/'),
            descriptor.organization,
            descriptor.project,
            descriptor.stack
        );
        Url::parse(&raw)
            .map_err(|e| DeployError::config(format!("invalid settings URL {raw}: {e}")))
    }
}

#[async_trait]
impl DeploymentService for PulumiServiceClient {
    async fn create_deployment_settings(
        &self,
        cancel: &CancellationToken,
        descriptor: DeploymentDescriptor,
    ) -> Result<String> {
        let url = self.settings_url(&descriptor)?;
        debug!(%url, "posting deployment settings");

        let request = self
            .client
            .post(url.clone())
            .header(AUTHORIZATION, format!("token {}", self.access_token))
            .header(ACCEPT, API_MEDIA_TYPE)
            .json(&SettingsRequest::from(&descriptor))
            .send();

        let response = tokio::select! {
            response = request => response.map_err(|e| DeployError::Service {
                status: None,
                message: format!("request to {url} failed: {e}"),
            })?,
            _ = cancel.cancelled() => return Err(DeployError::Cancelled),
        };

        let status = response.status();
        if !status.is_success() {
            let body = tokio::select! {
                body = response.text() => match body {
                    Ok(body) => body.trim().to_string(),
                    Err(e) => format!("<failed to read response body: {e}>"),
                },
                _ = cancel.cancelled() => return Err(DeployError::Cancelled),
            };
            return Err(DeployError::Service {
                status: Some(status.as_u16()),
                message: format!("{status} from {url}: {body}"),
            });
        }

        Ok(settings_id(&descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::{ResolvedSource, StackRef};
    use crate::git::RepositoryRef;
    use crate::repo_dir::RepoRelativePath;

    fn descriptor(repo_dir: Vec<String>) -> DeploymentDescriptor {
        DeploymentDescriptor::new(
            StackRef::new("acme-org", "widget", "prod"),
            ResolvedSource {
                repo: RepositoryRef::parse_slug("acme/widget").unwrap(),
                branch: "develop".to_string(),
                repo_dir: RepoRelativePath::new(repo_dir),
            },
        )
    }

    #[test]
    fn body_carries_repository_branch_and_dir() {
        let body = settings_body(&descriptor(vec!["api".into()]));
        assert_eq!(
            body,
            serde_json::json!({
                "gitHub": {"repository": "acme/widget"},
                "sourceContext": {"git": {"branch": "develop", "repoDir": "api"}}
            })
        );
    }

    #[test]
    fn empty_repo_dir_is_omitted() {
        let body = settings_body(&descriptor(vec![]));
        assert!(body["sourceContext"]["git"].get("repoDir").is_none());
    }

    #[test]
    fn settings_url_tolerates_trailing_slash() {
        let client = PulumiServiceClient::new(
            Url::parse("https://api.example.com/").unwrap(),
            "token",
        )
        .unwrap();
        let url = client.settings_url(&descriptor(vec![])).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/api/stacks/acme-org/widget/prod/deployments/settings"
        );
    }

    #[test]
    fn id_is_stack_path() {
        assert_eq!(settings_id(&descriptor(vec![])), "acme-org/widget/prod");
    }

    #[test]
    fn debug_hides_token() {
        let client =
            PulumiServiceClient::new(Url::parse(DEFAULT_API_URL).unwrap(), "pul-secret").unwrap();
        assert!(!format!("{client:?}").contains("pul-secret"));
    }
}
