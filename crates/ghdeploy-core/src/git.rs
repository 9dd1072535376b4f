//! Repository identity from the local checkout's `origin` remote.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{DeployError, Expected, Result};
use crate::exec::{self, CommandExecutor};

pub const GITHUB_PREFIX: &str = "https://github.com/";
pub const GIT_SUFFIX: &str = ".git";

/// A GitHub repository identified as `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryRef {
    owner: String,
    name: String,
}

impl RepositoryRef {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parse the canonical `owner/name` form.
    pub fn parse_slug(slug: &str) -> Option<Self> {
        let (owner, name) = slug.split_once('/')?;
        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl From<RepositoryRef> for String {
    fn from(repo: RepositoryRef) -> Self {
        repo.to_string()
    }
}

impl TryFrom<String> for RepositoryRef {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse_slug(&value).ok_or_else(|| format!("expected \"owner/name\", got {value:?}"))
    }
}

/// Extract `owner/name` from `https://github.com/<owner>/<name>.git`.
///
/// Only the HTTPS clone form is accepted; SSH remotes and URLs without the
/// `.git` suffix are rejected.
pub fn parse_remote_url(raw: &str) -> Result<RepositoryRef> {
    let rest = raw
        .strip_prefix(GITHUB_PREFIX)
        .ok_or_else(|| DeployError::Parse {
            expected: Expected::Prefix,
            got: raw.to_string(),
        })?;
    let slug = rest
        .strip_suffix(GIT_SUFFIX)
        .ok_or_else(|| DeployError::Parse {
            expected: Expected::Suffix,
            got: raw.to_string(),
        })?;
    RepositoryRef::parse_slug(slug).ok_or_else(|| DeployError::Parse {
        expected: Expected::OwnerName,
        got: raw.to_string(),
    })
}

/// Reads `remote.origin.url` through `git config`.
#[derive(Clone)]
pub struct RepositoryResolver {
    executor: Arc<dyn CommandExecutor>,
    program: String,
}

impl RepositoryResolver {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            program: "git".to_string(),
        }
    }

    /// Use a different `git` binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub async fn resolve(&self, cancel: &CancellationToken) -> Result<RepositoryRef> {
        let url = exec::run_text(
            self.executor.as_ref(),
            cancel,
            &self.program,
            &["config", "--get", "remote.origin.url"],
        )
        .await?;
        debug!(%url, "read origin remote");
        parse_remote_url(&url)
    }
}
