//! The `GitHub` deployment component exposed to the host framework.
//!
//! The component takes no inputs and has a single output, `DeploymentID`.
//! [`RegistrationOrder`] decides whether the component is registered before
//! or after the resolvers run.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::deployment::{DeploymentAssembler, ResolvedSource, StackRef};
use crate::error::{DeployError, Result};

pub const TYPE_TOKEN: &str = "deployment:index:GitHub";
pub const DISPLAY_NAME: &str = "Pulumi Service Deployment";
pub const PUBLISHER: &str = "ghdeploy";
pub const DEPLOYMENT_ID_OUTPUT: &str = "DeploymentID";
pub const DEPLOYMENT_ID_DESCRIPTION: &str = "The ID of the resulting deployment";
/// Type and name of the deployment-settings child resource.
pub const SETTINGS_TYPE_TOKEN: &str = "pulumiservice:index:DeploymentSettings";
pub const CHILD_NAME: &str = "deployment";

pub const DESCRIPTION: &str = "A [deployment](https://www.pulumi.com/docs/pulumi-cloud/deployments/) \
in the Pulumi service with all the defaults.\n\n\
The deployment is set to trigger on the main branch of the project this resource is in.\n\n\
This resource must be used from a GitHub Repo.";

/// Handle returned by the host for a registered component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentHandle {
    pub kind: String,
    pub name: String,
    pub parent: Option<String>,
}

impl ComponentHandle {
    /// `parent$kind::name`, or `kind::name` at top level.
    pub fn urn_suffix(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{parent}${}::{}", self.kind, self.name),
            None => format!("{}::{}", self.kind, self.name),
        }
    }
}

/// Host-side resource registration.
pub trait ComponentRegistry: Send + Sync {
    fn register_component(
        &self,
        kind: &str,
        name: &str,
        parent: Option<&ComponentHandle>,
    ) -> Result<ComponentHandle>;
}

/// Registry that only records what was registered.
#[derive(Debug, Default)]
pub struct LocalRegistry {
    registered: Mutex<Vec<ComponentHandle>>,
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registered(&self) -> Vec<ComponentHandle> {
        self.registered
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }
}

impl ComponentRegistry for LocalRegistry {
    fn register_component(
        &self,
        kind: &str,
        name: &str,
        parent: Option<&ComponentHandle>,
    ) -> Result<ComponentHandle> {
        let handle = ComponentHandle {
            kind: kind.to_string(),
            name: name.to_string(),
            parent: parent.map(ComponentHandle::urn_suffix),
        };
        let mut list = self
            .registered
            .lock()
            .map_err(|_| DeployError::config("component registry lock poisoned"))?;
        list.push(handle.clone());
        Ok(handle)
    }
}

/// When the component is registered relative to resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationOrder {
    /// Before any resolver runs; a resolver failure leaves the component
    /// registered without a deployment.
    Early,
    /// Only once all three facts are resolved.
    #[default]
    AfterResolution,
}

impl FromStr for RegistrationOrder {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "early" => Ok(Self::Early),
            "after-resolution" => Ok(Self::AfterResolution),
            other => Err(DeployError::config(format!(
                "unknown registration order {other:?} (expected \"early\" or \"after-resolution\")"
            ))),
        }
    }
}

/// Inputs of the component. There are none.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitHubArgs {}

/// Outputs of the component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitHubOutputs {
    #[serde(rename = "DeploymentID")]
    pub deployment_id: String,
    #[serde(skip)]
    pub handle: ComponentHandle,
    #[serde(skip)]
    pub source: ResolvedSource,
}

/// Constructs `deployment:index:GitHub` components.
pub struct GitHubComponent {
    assembler: DeploymentAssembler,
    registry: Arc<dyn ComponentRegistry>,
    order: RegistrationOrder,
}

impl GitHubComponent {
    pub fn new(assembler: DeploymentAssembler, registry: Arc<dyn ComponentRegistry>) -> Self {
        Self {
            assembler,
            registry,
            order: RegistrationOrder::default(),
        }
    }

    pub fn with_registration_order(mut self, order: RegistrationOrder) -> Self {
        self.order = order;
        self
    }

    pub async fn construct(
        &self,
        cancel: &CancellationToken,
        name: &str,
        stack: &StackRef,
        _args: GitHubArgs,
    ) -> Result<GitHubOutputs> {
        let early = match self.order {
            RegistrationOrder::Early => Some(self.register(name)?),
            RegistrationOrder::AfterResolution => None,
        };

        let source = self.assembler.resolve(cancel).await?;

        let handle = match early {
            Some(handle) => handle,
            None => self.register(name)?,
        };

        // The child is registered before the settings object exists remotely.
        self.registry
            .register_component(SETTINGS_TYPE_TOKEN, CHILD_NAME, Some(&handle))?;
        let deployment_id = self
            .assembler
            .submit(cancel, stack, source.clone())
            .await?;

        Ok(GitHubOutputs {
            deployment_id,
            handle,
            source,
        })
    }

    fn register(&self, name: &str) -> Result<ComponentHandle> {
        debug!(kind = TYPE_TOKEN, name, "registering component");
        self.registry.register_component(TYPE_TOKEN, name, None)
    }
}
