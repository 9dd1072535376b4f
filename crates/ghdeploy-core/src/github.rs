//! Default branch lookup through the GitHub CLI.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::exec::CommandExecutor;
use crate::git::RepositoryRef;

/// Branch name as reported by GitHub. Empty when the metadata omits it.
pub type BranchName = String;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoView {
    #[serde(default)]
    default_branch_ref: Option<BranchRef>,
}

#[derive(Debug, Deserialize)]
struct BranchRef {
    #[serde(default)]
    name: Option<String>,
}

/// Decode the output of `gh repo view --json defaultBranchRef`.
///
/// An absent or null `defaultBranchRef`, or one without a `name`, yields an
/// empty branch. GitHub reports a null ref for empty repositories.
pub fn decode_default_branch(stdout: &[u8]) -> Result<BranchName> {
    let view: RepoView = serde_json::from_slice(stdout)?;
    Ok(view
        .default_branch_ref
        .and_then(|branch| branch.name)
        .unwrap_or_default())
}

#[derive(Clone)]
pub struct DefaultBranchResolver {
    executor: Arc<dyn CommandExecutor>,
    program: String,
}

impl DefaultBranchResolver {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            program: "gh".to_string(),
        }
    }

    /// Use a different `gh` binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub async fn resolve(
        &self,
        cancel: &CancellationToken,
        repo: &RepositoryRef,
    ) -> Result<BranchName> {
        let slug = repo.to_string();
        let stdout = self
            .executor
            .run(
                cancel,
                &self.program,
                &["repo", "view", &slug, "--json", "defaultBranchRef"],
            )
            .await?;
        let branch = decode_default_branch(&stdout)?;
        if branch.is_empty() {
            warn!(repo = %slug, "repository metadata has no default branch name");
        } else {
            debug!(repo = %slug, %branch, "resolved default branch");
        }
        Ok(branch)
    }
}
