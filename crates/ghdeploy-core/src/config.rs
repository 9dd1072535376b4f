//! Configuration loading: `ghdeploy.toml` plus environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{DeployError, Result};
use crate::provider::RegistrationOrder;
use crate::service::DEFAULT_API_URL;

pub const CONFIG_FILE_NAME: &str = "ghdeploy.toml";

pub const ENV_API_URL: &str = "PULUMI_API_URL";
pub const ENV_ACCESS_TOKEN: &str = "PULUMI_ACCESS_TOKEN";
pub const ENV_GIT: &str = "GHDEPLOY_GIT";
pub const ENV_GH: &str = "GHDEPLOY_GH";
pub const ENV_COMMAND_TIMEOUT: &str = "GHDEPLOY_COMMAND_TIMEOUT";
pub const ENV_REGISTRATION: &str = "GHDEPLOY_REGISTRATION";

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    pub api_url: String,
    pub access_token: Option<String>,
    pub git_program: String,
    pub gh_program: String,
    pub command_timeout_secs: u64,
    pub registration: RegistrationOrder,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            access_token: None,
            git_program: "git".to_string(),
            gh_program: "gh".to_string(),
            command_timeout_secs: 30,
            registration: RegistrationOrder::default(),
        }
    }
}

impl std::fmt::Debug for DeployConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployConfig")
            .field("api_url", &self.api_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("git_program", &self.git_program)
            .field("gh_program", &self.gh_program)
            .field("command_timeout_secs", &self.command_timeout_secs)
            .field("registration", &self.registration)
            .finish()
    }
}

impl DeployConfig {
    /// Parsed API base URL.
    pub fn api_url(&self) -> Result<Url> {
        Url::parse(&self.api_url)
            .map_err(|e| DeployError::config(format!("invalid api_url {:?}: {e}", self.api_url)))
    }

    /// Timeout applied to each `git`/`gh` invocation; zero disables it.
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }

    /// Access token, or a configuration error naming how to supply it.
    pub fn require_access_token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                DeployError::config(format!(
                    "no Pulumi access token; set {ENV_ACCESS_TOKEN} or `access_token` in {CONFIG_FILE_NAME}"
                ))
            })
    }

    /// Load from `explicit`, else the first existing default location,
    /// then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => parse_config_file(path)?,
            None => match default_config_paths().into_iter().find(|p| p.is_file()) {
                Some(path) => parse_config_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup(ENV_API_URL) {
            Url::parse(&raw)
                .map_err(|e| DeployError::config(format!("{ENV_API_URL}={raw:?}: {e}")))?;
            self.api_url = raw;
        }
        if let Some(token) = lookup(ENV_ACCESS_TOKEN) {
            self.access_token = Some(token);
        }
        if let Some(program) = lookup(ENV_GIT) {
            self.git_program = program;
        }
        if let Some(program) = lookup(ENV_GH) {
            self.gh_program = program;
        }
        if let Some(raw) = lookup(ENV_COMMAND_TIMEOUT) {
            self.command_timeout_secs = raw.trim().parse().map_err(|_| {
                DeployError::config(format!(
                    "{ENV_COMMAND_TIMEOUT}={raw:?} is not a number of seconds"
                ))
            })?;
        }
        if let Some(raw) = lookup(ENV_REGISTRATION) {
            self.registration = raw.trim().parse()?;
        }
        Ok(())
    }
}

/// `./ghdeploy.toml`, then `<config dir>/ghdeploy/config.toml`.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("ghdeploy").join("config.toml"));
    }
    paths
}

pub fn parse_config_file(path: &Path) -> Result<DeployConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DeployError::config(format!("failed to read {}: {e}", path.display()))
    })?;
    parse_config_str(&content)
        .map_err(|e| DeployError::config(format!("{}: {e}", path.display())))
}

pub fn parse_config_str(content: &str) -> Result<DeployConfig> {
    let config: DeployConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;
    config.api_url()?;
    Ok(config)
}

/// Attach the offending line and its neighbours to a TOML error.
fn enhance_toml_error(error: toml::de::Error, content: &str) -> DeployError {
    let message = error.message().to_string();
    let Some(span) = error.span() else {
        return DeployError::config(format!("TOML parsing error: {message}"));
    };

    let line_num = content[..span.start.min(content.len())].matches('\n').count() + 1;
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());
    let context: Vec<String> = (start..end)
        .map(|i| {
            let marker = if i + 1 == line_num { ">" } else { " " };
            format!("{marker} {:4} | {}", i + 1, lines[i])
        })
        .collect();

    DeployError::config(format!(
        "TOML parsing error at line {line_num}:\n{}\n\nError: {message}",
        context.join("\n")
    ))
}
