//! Cluster controller
//!
//! A [`ClusterController`] owns one cluster's specification and, once launched,
//! its provider-assigned handle. It performs exactly one local transition
//! (unlaunched to launched); everything after that is the provider's state,
//! observed on demand through [`ClusterController::get_state`].
//!
//! Each operation awaits at most one provisioning call. Mutating operations
//! take `&mut self`, so one instance cannot be driven from two places at once.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::client::{
    ClientFactory, ClusterStatus, LaunchRequest, LaunchResult, ProvisioningClient, SubmissionAck,
};
use crate::config::{ClusterPolicy, ControllerConfig};
use crate::credentials::CredentialProvider;
use crate::spec::{ClusterIdentity, ClusterSpecBuilder, LaunchSpecification};
use crate::step::WorkStep;
use crate::error::UNKNOWN_CONTEXT;
use crate::{Error, Result};

/// Local lifecycle state of a controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControllerState {
    /// No launch attempted yet
    Unlaunched,
    /// The provider accepted the launch; the specification is frozen
    Launched {
        /// Provider response, including the cluster handle
        result: LaunchResult,
        /// The specification that was submitted
        spec: LaunchSpecification,
    },
    /// The last launch attempt failed; launching again is allowed
    LaunchFailed {
        /// Provider's description of the failure
        reason: String,
    },
}

impl ControllerState {
    /// Short name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unlaunched => "Unlaunched",
            Self::Launched { .. } => "Launched",
            Self::LaunchFailed { .. } => "LaunchFailed",
        }
    }
}

/// Builds, launches, feeds, and inspects a single cluster
pub struct ClusterController {
    builder: ClusterSpecBuilder,
    policy: ClusterPolicy,
    client: Arc<dyn ProvisioningClient>,
    state: ControllerState,
}

impl std::fmt::Debug for ClusterController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterController")
            .field("identity", self.builder.identity())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ClusterController {
    /// Create a controller around an existing client
    pub fn new(identity: ClusterIdentity, client: Arc<dyn ProvisioningClient>) -> Self {
        Self {
            builder: ClusterSpecBuilder::for_identity(identity),
            policy: ClusterPolicy::default(),
            client,
            state: ControllerState::Unlaunched,
        }
    }

    /// Resolve credentials for `profile` and build a client for the identity's region
    ///
    /// Fails with [`Error::Credential`] or [`Error::ClientInit`].
    pub async fn connect(
        identity: ClusterIdentity,
        profile: &str,
        credentials: &dyn CredentialProvider,
        factory: &dyn ClientFactory,
    ) -> Result<Self> {
        let creds = credentials.resolve(profile).await?;
        let client = factory.connect(&creds, &identity.region)?;
        debug!(cluster = %identity.name, region = %identity.region, profile = %profile, "Provisioning client ready");
        Ok(Self::new(identity, client))
    }

    /// [`connect`](Self::connect) using the profile and policy from `config`
    pub async fn from_config(
        identity: ClusterIdentity,
        config: &ControllerConfig,
        credentials: &dyn CredentialProvider,
        factory: &dyn ClientFactory,
    ) -> Result<Self> {
        let controller =
            Self::connect(identity, &config.credentials_profile, credentials, factory).await?;
        Ok(controller.with_policy(config.policy.clone()))
    }

    /// Replace the policy fields attached to the launch
    pub fn with_policy(mut self, policy: ClusterPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cluster name and region
    pub fn identity(&self) -> &ClusterIdentity {
        self.builder.identity()
    }

    /// Cluster name
    pub fn name(&self) -> &str {
        &self.identity().name
    }

    /// Cluster region
    pub fn region(&self) -> &str {
        &self.identity().region
    }

    /// Current local state
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Whether a launch has been accepted
    pub fn is_launched(&self) -> bool {
        matches!(self.state, ControllerState::Launched { .. })
    }

    /// Launch result, once launched
    pub fn launch_result(&self) -> Option<&LaunchResult> {
        match &self.state {
            ControllerState::Launched { result, .. } => Some(result),
            _ => None,
        }
    }

    /// The frozen specification, once launched
    pub fn launch_specification(&self) -> Option<&LaunchSpecification> {
        match &self.state {
            ControllerState::Launched { spec, .. } => Some(spec),
            _ => None,
        }
    }

    // =========================================================================
    // Specification
    // =========================================================================

    fn spec_mut(&mut self) -> Result<&mut ClusterSpecBuilder> {
        if let ControllerState::Launched { result, .. } = &self.state {
            return Err(Error::state(
                self.builder.identity().name.clone(),
                format!(
                    "specification is frozen; cluster already launched as {}",
                    result.cluster_handle
                ),
            ));
        }
        Ok(&mut self.builder)
    }

    /// Replace the software profile
    pub fn set_software_profile<I, S>(
        &mut self,
        release_label: impl Into<String>,
        applications: I,
    ) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec_mut()?
            .set_software_profile(release_label, applications);
        Ok(self)
    }

    /// Replace the bootstrap action
    pub fn set_bootstrap_action(&mut self, script_location: impl Into<String>) -> Result<&mut Self> {
        self.spec_mut()?.set_bootstrap_action(script_location);
        Ok(self)
    }

    /// Append a MASTER group; a second MASTER group fails the launch
    pub fn add_master_node(&mut self, instance_type: impl Into<String>) -> Result<&mut Self> {
        self.spec_mut()?.add_master_node(instance_type);
        Ok(self)
    }

    /// Append a CORE group
    pub fn add_core_node(
        &mut self,
        instance_type: impl Into<String>,
        instance_count: u32,
    ) -> Result<&mut Self> {
        self.spec_mut()?.add_core_node(instance_type, instance_count);
        Ok(self)
    }

    // =========================================================================
    // Launch
    // =========================================================================

    /// Submit the create-cluster request
    ///
    /// With `enable_diagnostics_step`, the diagnostics step is the first step of
    /// the request and terminates the cluster if it fails. A rejected launch
    /// leaves the controller launchable again; a second launch after success is
    /// an [`Error::State`].
    pub async fn launch(&mut self, enable_diagnostics_step: bool) -> Result<LaunchResult> {
        if let ControllerState::Launched { result, .. } = &self.state {
            return Err(Error::state(
                self.name(),
                format!("cluster already launched as {}", result.cluster_handle),
            ));
        }

        let spec = self.builder.build(self.policy.clone())?;
        let steps = if enable_diagnostics_step {
            vec![WorkStep::diagnostics()]
        } else {
            Vec::new()
        };
        let request = LaunchRequest { spec, steps };

        let identity = self.identity().clone();
        info!(cluster = %identity, "Starting cluster");
        debug!(cluster = %identity.name, request = %request.to_api_json(), "create-cluster request");

        match self.client.create_cluster(&request).await {
            Ok(result) => {
                info!(
                    cluster = %identity,
                    handle = %result.cluster_handle,
                    request_id = %result.metadata.request_id().unwrap_or(UNKNOWN_CONTEXT),
                    metadata = %result.metadata,
                    "Cluster launch accepted"
                );
                self.state = ControllerState::Launched {
                    result: result.clone(),
                    spec: request.spec,
                };
                Ok(result)
            }
            Err(source) => {
                warn!(cluster = %identity.name, region = %identity.region, error = %source, "Cluster launch failed");
                self.state = ControllerState::LaunchFailed {
                    reason: source.to_string(),
                };
                Err(Error::LaunchFailed {
                    cluster: identity.name,
                    region: identity.region,
                    source,
                })
            }
        }
    }

    fn require_handle(&self, operation: &str) -> Result<&str> {
        match &self.state {
            ControllerState::Launched { result, .. } => Ok(&result.cluster_handle),
            other => Err(Error::validation_for(
                self.name(),
                format!(
                    "cannot {} before the cluster is launched (state: {})",
                    operation,
                    other.name()
                ),
            )),
        }
    }

    // =========================================================================
    // Steps
    // =========================================================================

    /// Submit one job step running `payload_location` via the script-runner
    ///
    /// The step continues the cluster on failure.
    pub async fn submit_step(
        &self,
        job_name: &str,
        payload_location: &str,
    ) -> Result<SubmissionAck> {
        let handle = self.require_handle("submit a step")?;
        let step = WorkStep::job(job_name, self.region(), payload_location);

        info!(cluster = %self.name(), handle = %handle, step = %job_name, "Adding job to cluster");

        let ack = self
            .client
            .add_steps(handle, std::slice::from_ref(&step))
            .await
            .map_err(|source| {
                warn!(cluster = %self.name(), step = %job_name, error = %source, "Step submission failed");
                Error::SubmissionFailed {
                    cluster: self.name().to_string(),
                    step: job_name.to_string(),
                    source,
                }
            })?;

        info!(
            cluster = %self.name(),
            step = %job_name,
            step_ids = ?ack.step_ids,
            metadata = %ack.metadata,
            "Job submitted"
        );
        Ok(ack)
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Current provider status, freshly described
    pub async fn cluster_status(&self) -> Result<ClusterStatus> {
        let handle = self.require_handle("query cluster state")?;

        self.client
            .describe_cluster(handle)
            .await
            .map_err(|source| {
                warn!(cluster = %self.name(), handle = %handle, error = %source, "Unable to retrieve cluster status");
                Error::StatusUnavailable {
                    cluster: self.name().to_string(),
                    source,
                }
            })
    }

    /// Current provider status rendered as the provider's status string
    pub async fn get_state(&self) -> Result<String> {
        let status = self.cluster_status().await?;
        debug!(cluster = %self.name(), state = %status.state, "Described cluster");
        Ok(status.to_string())
    }

    /// Release the provisioning client
    pub async fn close(&self) {
        self.client.close().await;
    }
}
