//! Fleet-wide cluster queries
//!
//! These answer "is some cluster called X up and idle?" for a whole region,
//! independent of any [`ClusterController`](crate::ClusterController).
//!
//! The default [`MatchPolicy::Substring`] matches cluster names by substring
//! and status by the literal `State: WAITING` token in the rendered status.
//! Overlapping names (`prod` vs `prod-canary`) can therefore match each other;
//! [`MatchPolicy::Exact`] avoids that.

use tracing::{debug, info};

use crate::client::{ClientFactory, ClusterState, ClusterSummary, ProvisioningClient};
use crate::credentials::CredentialProvider;
use crate::{Error, Result};

/// Status token a ready, idle cluster renders with
pub const WAITING_STATUS_TOKEN: &str = "State: WAITING";

/// How cluster summaries are matched against a name
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Name contains the query; rendered status contains `State: WAITING`
    #[default]
    Substring,
    /// Name equals the query; state is exactly WAITING
    Exact,
}

impl MatchPolicy {
    /// Whether `summary` counts as a running cluster called `name`
    pub fn matches(&self, summary: &ClusterSummary, name: &str) -> bool {
        match self {
            Self::Substring => {
                summary.name.contains(name)
                    && summary.status.to_string().contains(WAITING_STATUS_TOKEN)
            }
            Self::Exact => summary.name == name && summary.status.state == ClusterState::Waiting,
        }
    }
}

/// Whether any cluster visible to `client` matches `name` and is waiting for work
///
/// Issues exactly one list call.
pub async fn any_cluster_waiting(
    client: &dyn ProvisioningClient,
    name: &str,
    policy: MatchPolicy,
) -> Result<bool> {
    let clusters = client
        .list_clusters()
        .await
        .map_err(|source| Error::StatusUnavailable {
            cluster: name.to_string(),
            source,
        })?;

    let found = clusters.iter().find(|c| policy.matches(c, name));
    if let Some(cluster) = found {
        debug!(query = %name, cluster = %cluster.name, id = %cluster.id, "Found waiting cluster");
    }
    Ok(found.is_some())
}

/// Whether a cluster called `name` is up and waiting in `region`
///
/// Resolves credentials and builds a fresh client for the region, lists once
/// with [`MatchPolicy::Substring`], and closes the client again.
pub async fn is_cluster_running(
    name: &str,
    region: &str,
    profile: &str,
    credentials: &dyn CredentialProvider,
    factory: &dyn ClientFactory,
) -> Result<bool> {
    let creds = credentials.resolve(profile).await?;
    let client = factory.connect(&creds, region)?;

    let result = any_cluster_waiting(client.as_ref(), name, MatchPolicy::Substring).await;
    client.close().await;

    if let Ok(running) = result {
        info!(cluster = %name, region = %region, running, "Checked cluster readiness");
    }
    result
}
