//! Assembly of the deployment-registration request.
//!
//! The assembler runs the three resolvers and submits one
//! [`DeploymentDescriptor`] to a [`DeploymentService`]. Any resolver failure
//! aborts before the service is contacted.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{DeployError, Result};
use crate::exec::CommandExecutor;
use crate::git::{RepositoryRef, RepositoryResolver};
use crate::github::{BranchName, DefaultBranchResolver};
use crate::repo_dir::{self, Filesystem, RepoRelativePath, resolve_repo_dir};

/// Organization, project and stack that a deployment is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackRef {
    pub organization: String,
    pub project: String,
    pub stack: String,
}

impl StackRef {
    pub fn new(
        organization: impl Into<String>,
        project: impl Into<String>,
        stack: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            stack: stack.into(),
        }
    }
}

impl std::fmt::Display for StackRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.organization, self.project, self.stack)
    }
}

/// The three facts read from the local checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSource {
    pub repo: RepositoryRef,
    pub branch: BranchName,
    pub repo_dir: RepoRelativePath,
}

/// Payload submitted to the deployment service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDescriptor {
    pub organization: String,
    pub project: String,
    pub stack: String,
    pub repo: RepositoryRef,
    pub branch: BranchName,
    pub repo_dir: RepoRelativePath,
}

impl DeploymentDescriptor {
    pub fn new(stack: StackRef, source: ResolvedSource) -> Self {
        Self {
            organization: stack.organization,
            project: stack.project,
            stack: stack.stack,
            repo: source.repo,
            branch: source.branch,
            repo_dir: source.repo_dir,
        }
    }
}

/// Remote side that stores deployment settings.
#[async_trait]
pub trait DeploymentService: Send + Sync {
    /// Create the settings object and return its identifier.
    async fn create_deployment_settings(
        &self,
        cancel: &CancellationToken,
        descriptor: DeploymentDescriptor,
    ) -> Result<String>;
}

/// Combines repository, branch and repo-dir resolution into one registration.
#[derive(Clone)]
pub struct DeploymentAssembler {
    repository: RepositoryResolver,
    branch: DefaultBranchResolver,
    fs: Arc<dyn Filesystem>,
    service: Arc<dyn DeploymentService>,
    start_dir: Option<PathBuf>,
}

impl DeploymentAssembler {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        fs: Arc<dyn Filesystem>,
        service: Arc<dyn DeploymentService>,
    ) -> Self {
        Self {
            repository: RepositoryResolver::new(Arc::clone(&executor)),
            branch: DefaultBranchResolver::new(executor),
            fs,
            service,
            start_dir: None,
        }
    }

    pub fn with_git_program(mut self, program: impl Into<String>) -> Self {
        self.repository = self.repository.with_program(program);
        self
    }

    pub fn with_gh_program(mut self, program: impl Into<String>) -> Self {
        self.branch = self.branch.with_program(program);
        self
    }

    /// Walk from `dir` instead of the process working directory.
    pub fn with_start_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.start_dir = Some(dir.into());
        self
    }

    /// Resolve repository, default branch and repo dir.
    ///
    /// The directory walk runs on the blocking pool alongside the
    /// repository/branch chain; the first error wins and stops the other.
    pub async fn resolve(&self, cancel: &CancellationToken) -> Result<ResolvedSource> {
        let start = match &self.start_dir {
            Some(dir) => dir.clone(),
            None => repo_dir::current_dir()?,
        };

        let walk_cancel = cancel.child_token();
        let _stop_walk = walk_cancel.clone().drop_guard();
        let fs = Arc::clone(&self.fs);
        let walk = async move {
            let walk_start = start.clone();
            tokio::task::spawn_blocking(move || {
                resolve_repo_dir(fs.as_ref(), &walk_cancel, &walk_start)
            })
            .await
            .map_err(|err| DeployError::Io {
                path: start,
                source: std::io::Error::other(err),
            })?
        };

        let chain = async {
            let repo = self.repository.resolve(cancel).await?;
            let branch = self.branch.resolve(cancel, &repo).await?;
            Ok::<_, DeployError>((repo, branch))
        };

        let ((repo, branch), repo_dir) = tokio::try_join!(chain, walk)?;
        debug!(%repo, %branch, %repo_dir, "resolved deployment source");
        Ok(ResolvedSource {
            repo,
            branch,
            repo_dir,
        })
    }

    /// Submit an already resolved source to the deployment service.
    pub async fn submit(
        &self,
        cancel: &CancellationToken,
        stack: &StackRef,
        source: ResolvedSource,
    ) -> Result<String> {
        let descriptor = DeploymentDescriptor::new(stack.clone(), source);
        debug!(?descriptor, "submitting deployment settings");
        let id = self
            .service
            .create_deployment_settings(cancel, descriptor)
            .await?;
        info!(%stack, %id, "created deployment settings");
        Ok(id)
    }

    /// Resolve all facts and register one deployment; returns the service id.
    pub async fn construct(&self, cancel: &CancellationToken, stack: &StackRef) -> Result<String> {
        let source = self.resolve(cancel).await?;
        self.submit(cancel, stack, source).await
    }
}
