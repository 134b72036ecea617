//! Provisioning client interface
//!
//! The controller never talks to the provisioning service directly. It goes
//! through [`ProvisioningClient`], which tests replace with a mock and
//! production wires to the real API. A client is bound to one region and one
//! identity; [`ClientFactory`] builds such a client on demand.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::credentials::Credentials;
use crate::spec::LaunchSpecification;
use crate::step::WorkStep;
use crate::Result;

// =============================================================================
// Provider errors
// =============================================================================

/// Category of a provider-side failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The referenced cluster does not exist (or is no longer visible)
    NotFound,
    /// The provider throttled the request
    Throttled,
    /// The provider rejected the request as invalid
    Rejected,
    /// The request did not reach the provider or the response was lost
    Transport,
    /// Anything else
    Other,
}

/// Failure reported by the provisioning client
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ProviderError {
    /// Failure category
    pub kind: ProviderErrorKind,
    /// Provider's description
    pub message: String,
    /// Request ID, when the provider returned one
    pub request_id: Option<String>,
}

impl ProviderError {
    /// Create a provider error of the given kind
    pub fn new(kind: ProviderErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            request_id: None,
        }
    }

    /// The cluster handle is unknown to the provider
    pub fn not_found(handle: &str) -> Self {
        Self::new(
            ProviderErrorKind::NotFound,
            format!("cluster {} not found", handle),
        )
    }

    /// Attach the provider request ID
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

// =============================================================================
// Requests and responses
// =============================================================================

/// Raw response metadata returned with every provider response
///
/// Opaque to the controller; only logged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata(pub BTreeMap<String, String>);

impl ResponseMetadata {
    /// Metadata carrying only a request ID
    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert("AWS_REQUEST_ID".to_string(), request_id.into());
        Self(map)
    }

    /// The request ID, if present
    pub fn request_id(&self) -> Option<&str> {
        self.0.get("AWS_REQUEST_ID").map(String::as_str)
    }
}

impl std::fmt::Display for ResponseMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", entries.join(", "))
    }
}

/// A complete create-cluster request: the frozen specification plus initial steps
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchRequest {
    /// What to launch
    pub spec: LaunchSpecification,
    /// Steps the cluster runs as soon as it is up
    pub steps: Vec<WorkStep>,
}

impl LaunchRequest {
    /// Provider API representation of this request
    pub fn to_api_json(&self) -> serde_json::Value {
        let spec = &self.spec;
        let policy = &spec.policy;

        let applications: Vec<serde_json::Value> = spec
            .software
            .applications
            .iter()
            .map(|name| serde_json::json!({ "Name": name }))
            .collect();

        let instance_groups: Vec<serde_json::Value> = spec
            .node_groups
            .iter()
            .map(|group| {
                serde_json::json!({
                    "InstanceRole": group.role.as_str(),
                    "InstanceType": group.instance_type,
                    "InstanceCount": group.instance_count,
                    "Market": group.market.as_str(),
                })
            })
            .collect();

        let mut request = serde_json::json!({
            "Name": spec.identity.name,
            "ReleaseLabel": spec.software.release_label,
            "LogUri": policy.log_uri,
            "Applications": applications,
            "ServiceRole": policy.service_role,
            "JobFlowRole": policy.job_flow_role,
            "Instances": {
                "InstanceGroups": instance_groups,
                "Ec2KeyName": policy.ec2_key_name,
                "KeepJobFlowAliveWhenNoSteps": policy.keep_alive_when_no_steps,
            },
            "Tags": [{ "Key": policy.tag_key, "Value": policy.tag_value }],
        });

        if let Some(ref bootstrap) = spec.bootstrap {
            request["BootstrapActions"] = serde_json::json!([{
                "Name": bootstrap.name,
                "ScriptBootstrapAction": { "Path": bootstrap.script_location },
            }]);
        }

        if !self.steps.is_empty() {
            let steps: Vec<serde_json::Value> =
                self.steps.iter().map(WorkStep::to_api_json).collect();
            request["Steps"] = serde_json::json!(steps);
        }

        request
    }
}

/// Outcome of a successful create-cluster call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchResult {
    /// Provider-assigned cluster handle; the only identifier valid for later calls
    pub cluster_handle: String,
    /// Raw response metadata
    pub metadata: ResponseMetadata,
}

/// Outcome of a successful add-steps call
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionAck {
    /// Provider-assigned step IDs, in submission order
    pub step_ids: Vec<String>,
    /// Raw response metadata
    pub metadata: ResponseMetadata,
}

/// Provider-defined cluster state
///
/// The provider owns every transition; unknown values are kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterState {
    /// Instances are being provisioned
    Starting,
    /// Bootstrap actions are running
    Bootstrapping,
    /// A step is running
    Running,
    /// Up and idle, ready for steps
    Waiting,
    /// Shutting down
    Terminating,
    /// Shut down
    Terminated,
    /// Shut down after a failure
    TerminatedWithErrors,
    /// A state this crate does not know about
    Other(String),
}

impl ClusterState {
    /// Provider wire name
    pub fn as_str(&self) -> &str {
        match self {
            Self::Starting => "STARTING",
            Self::Bootstrapping => "BOOTSTRAPPING",
            Self::Running => "RUNNING",
            Self::Waiting => "WAITING",
            Self::Terminating => "TERMINATING",
            Self::Terminated => "TERMINATED",
            Self::TerminatedWithErrors => "TERMINATED_WITH_ERRORS",
            Self::Other(s) => s,
        }
    }

    /// Whether the cluster has stopped or is stopping
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Terminating | Self::Terminated | Self::TerminatedWithErrors
        )
    }
}

impl From<&str> for ClusterState {
    fn from(value: &str) -> Self {
        match value {
            "STARTING" => Self::Starting,
            "BOOTSTRAPPING" => Self::Bootstrapping,
            "RUNNING" => Self::Running,
            "WAITING" => Self::Waiting,
            "TERMINATING" => Self::Terminating,
            "TERMINATED" => Self::Terminated,
            "TERMINATED_WITH_ERRORS" => Self::TerminatedWithErrors,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster status as reported by the provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterStatus {
    /// Current state
    pub state: ClusterState,
    /// Provider's explanation of the last state change
    pub state_change_reason: Option<String>,
}

impl ClusterStatus {
    /// Status with no state-change reason
    pub fn new(state: ClusterState) -> Self {
        Self {
            state,
            state_change_reason: None,
        }
    }

    /// Attach a state-change reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.state_change_reason = Some(reason.into());
        self
    }
}

/// Renders in the provider's status notation, e.g. `{State: WAITING,StateChangeReason: {Message: ...},}`
impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{State: {},", self.state)?;
        if let Some(ref reason) = self.state_change_reason {
            write!(f, "StateChangeReason: {{Message: {}}},", reason)?;
        }
        f.write_str("}")
    }
}

/// One entry of a list-clusters response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterSummary {
    /// Cluster handle
    pub id: String,
    /// Human-facing cluster name
    pub name: String,
    /// Current status
    pub status: ClusterStatus,
}

// =============================================================================
// Client traits
// =============================================================================

/// Remote provisioning API surface
///
/// Implementations are bound to a single region and identity. Every method is
/// one remote call; retries and timeouts, if any, are the implementation's
/// concern.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    /// Create a cluster from a launch request
    async fn create_cluster(
        &self,
        request: &LaunchRequest,
    ) -> std::result::Result<LaunchResult, ProviderError>;

    /// Append steps to an existing cluster
    async fn add_steps(
        &self,
        cluster_handle: &str,
        steps: &[WorkStep],
    ) -> std::result::Result<SubmissionAck, ProviderError>;

    /// Describe a cluster's current status
    async fn describe_cluster(
        &self,
        cluster_handle: &str,
    ) -> std::result::Result<ClusterStatus, ProviderError>;

    /// List every cluster visible to this client's identity in its region
    async fn list_clusters(&self) -> std::result::Result<Vec<ClusterSummary>, ProviderError>;

    /// Release held connections. Idempotent.
    async fn close(&self);
}

/// Builds provisioning clients bound to credentials and a region
#[cfg_attr(test, automock)]
pub trait ClientFactory: Send + Sync {
    /// Build a client; failures are [`crate::Error::ClientInit`]
    fn connect(
        &self,
        credentials: &Credentials,
        region: &str,
    ) -> Result<Arc<dyn ProvisioningClient>>;
}
