//! ghdeploy Core Library
//!
//! Registers a Pulumi Cloud deployment for the GitHub repository that hosts
//! the current project. Three facts are read from the local checkout:
//!
//! - the `owner/name` of the `origin` remote ([`git`])
//! - the repository's default branch as reported by `gh` ([`github`])
//! - the working directory relative to the git root ([`repo_dir`])
//!
//! [`deployment::DeploymentAssembler`] combines them into one
//! [`deployment::DeploymentDescriptor`] and hands it to a
//! [`deployment::DeploymentService`].

pub mod config;
pub mod deployment;
pub mod error;
pub mod exec;
pub mod git;
pub mod github;
pub mod provider;
pub mod repo_dir;
pub mod service;

/// Re-exports of commonly used types
pub mod prelude {
    pub use crate::config::DeployConfig;
    pub use crate::deployment::{
        DeploymentAssembler, DeploymentDescriptor, DeploymentService, ResolvedSource, StackRef,
    };
    pub use crate::error::{DeployError, ExecFailure, Expected, Result};
    pub use crate::exec::{CommandExecutor, SystemExecutor};
    pub use crate::git::{RepositoryRef, RepositoryResolver};
    pub use crate::github::{BranchName, DefaultBranchResolver};
    pub use crate::provider::{
        ComponentHandle, ComponentRegistry, GitHubArgs, GitHubComponent, GitHubOutputs,
        LocalRegistry, RegistrationOrder,
    };
    pub use crate::repo_dir::{Filesystem, LocalFs, RepoRelativePath};
    pub use crate::service::PulumiServiceClient;
}
