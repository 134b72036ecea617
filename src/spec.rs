//! Cluster specification
//!
//! [`ClusterSpecBuilder`] accumulates software, bootstrap, and node-group
//! configuration without validating it. [`ClusterSpecBuilder::build`] checks
//! everything at once and returns an immutable [`LaunchSpecification`].
//!
//! Calling [`ClusterSpecBuilder::add_master_node`] twice records two MASTER
//! groups. That is not merged away here; `build` rejects it.

use serde::{Deserialize, Serialize};

use crate::config::ClusterPolicy;
use crate::{Error, Result, BOOTSTRAP_ACTION_NAME};

/// Human-facing label of a cluster
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterIdentity {
    /// Cluster name
    pub name: String,
    /// Region the cluster lives in
    pub region: String,
}

impl ClusterIdentity {
    /// Create an identity
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
        }
    }
}

impl std::fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.region)
    }
}

/// Software stack installed on the cluster
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareProfile {
    /// Provider release label (e.g., "emr-5.20.0")
    pub release_label: String,
    /// Application names, in first-declared order without duplicates
    pub applications: Vec<String>,
}

/// Script run on every node before the software stack starts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapAction {
    /// Action name
    pub name: String,
    /// Remote storage path of the script
    pub script_location: String,
}

/// Role of a node group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeRole {
    /// Coordinates the cluster; exactly one group, one instance
    Master,
    /// Runs tasks and stores data
    Core,
}

impl NodeRole {
    /// Provider wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "MASTER",
            Self::Core => "CORE",
        }
    }
}

/// Purchasing option for instances
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Market {
    /// On-demand instances
    #[default]
    OnDemand,
}

impl Market {
    /// Provider wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnDemand => "ON_DEMAND",
        }
    }
}

/// A set of identically configured instances sharing one role
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroup {
    /// Group role
    pub role: NodeRole,
    /// Instance type (e.g., "m5.xlarge")
    pub instance_type: String,
    /// Number of instances
    pub instance_count: u32,
    /// Purchasing option
    pub market: Market,
}

/// Everything needed to launch a cluster
///
/// Only produced by [`ClusterSpecBuilder::build`], so every instance has passed
/// validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpecification {
    /// Name and region
    pub identity: ClusterIdentity,
    /// Software stack
    pub software: SoftwareProfile,
    /// Optional bootstrap action
    pub bootstrap: Option<BootstrapAction>,
    /// Node groups in declaration order
    pub node_groups: Vec<NodeGroup>,
    /// Fixed policy fields
    pub policy: ClusterPolicy,
}

impl LaunchSpecification {
    /// The single MASTER group
    pub fn master(&self) -> Option<&NodeGroup> {
        self.node_groups.iter().find(|g| g.role == NodeRole::Master)
    }

    /// CORE groups in declaration order
    pub fn core_groups(&self) -> impl Iterator<Item = &NodeGroup> {
        self.node_groups.iter().filter(|g| g.role == NodeRole::Core)
    }

    /// Total instance count across all groups
    pub fn total_instances(&self) -> u64 {
        self.node_groups
            .iter()
            .map(|g| u64::from(g.instance_count))
            .sum()
    }
}

/// Accumulates launch configuration; validation happens in [`build`](Self::build)
#[derive(Clone, Debug)]
pub struct ClusterSpecBuilder {
    identity: ClusterIdentity,
    software: Option<SoftwareProfile>,
    bootstrap: Option<BootstrapAction>,
    node_groups: Vec<NodeGroup>,
}

impl ClusterSpecBuilder {
    /// Start an empty specification for `name` in `region`
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self::for_identity(ClusterIdentity::new(name, region))
    }

    /// Start an empty specification for an identity
    pub fn for_identity(identity: ClusterIdentity) -> Self {
        Self {
            identity,
            software: None,
            bootstrap: None,
            node_groups: Vec::new(),
        }
    }

    /// The identity this specification is for
    pub fn identity(&self) -> &ClusterIdentity {
        &self.identity
    }

    /// Replace the software profile
    ///
    /// Duplicate application names are dropped, keeping the first occurrence.
    pub fn set_software_profile<I, S>(
        &mut self,
        release_label: impl Into<String>,
        applications: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut apps: Vec<String> = Vec::new();
        for app in applications {
            let app = app.into();
            if !apps.contains(&app) {
                apps.push(app);
            }
        }
        self.software = Some(SoftwareProfile {
            release_label: release_label.into(),
            applications: apps,
        });
        self
    }

    /// Replace the bootstrap action
    ///
    /// The location is not checked for reachability.
    pub fn set_bootstrap_action(&mut self, script_location: impl Into<String>) -> &mut Self {
        self.bootstrap = Some(BootstrapAction {
            name: BOOTSTRAP_ACTION_NAME.to_string(),
            script_location: script_location.into(),
        });
        self
    }

    /// Append a MASTER group of one instance
    ///
    /// A second call appends a second MASTER group, which `build` rejects.
    pub fn add_master_node(&mut self, instance_type: impl Into<String>) -> &mut Self {
        self.node_groups.push(NodeGroup {
            role: NodeRole::Master,
            instance_type: instance_type.into(),
            instance_count: 1,
            market: Market::OnDemand,
        });
        self
    }

    /// Append a CORE group
    ///
    /// Groups with the same instance type are kept separate.
    pub fn add_core_node(
        &mut self,
        instance_type: impl Into<String>,
        instance_count: u32,
    ) -> &mut Self {
        self.node_groups.push(NodeGroup {
            role: NodeRole::Core,
            instance_type: instance_type.into(),
            instance_count,
            market: Market::OnDemand,
        });
        self
    }

    /// Validate and produce an immutable launch specification
    pub fn build(&self, policy: ClusterPolicy) -> Result<LaunchSpecification> {
        let cluster = &self.identity.name;

        let software = self.software.clone().ok_or_else(|| {
            Error::validation_for_field(cluster, "software", "software profile is not set")
        })?;
        if software.release_label.trim().is_empty() {
            return Err(Error::validation_for_field(
                cluster,
                "software.release_label",
                "release label must not be empty",
            ));
        }
        if software.applications.is_empty() {
            return Err(Error::validation_for_field(
                cluster,
                "software.applications",
                "at least one application is required",
            ));
        }
        if software.applications.iter().any(|a| a.trim().is_empty()) {
            return Err(Error::validation_for_field(
                cluster,
                "software.applications",
                "application names must not be empty",
            ));
        }

        if let Some(ref bootstrap) = self.bootstrap {
            if bootstrap.script_location.trim().is_empty() {
                return Err(Error::validation_for_field(
                    cluster,
                    "bootstrap.script_location",
                    "bootstrap script location must not be empty",
                ));
            }
        }

        self.validate_node_groups()?;

        Ok(LaunchSpecification {
            identity: self.identity.clone(),
            software,
            bootstrap: self.bootstrap.clone(),
            node_groups: self.node_groups.clone(),
            policy,
        })
    }

    fn validate_node_groups(&self) -> Result<()> {
        let cluster = &self.identity.name;

        if self.node_groups.is_empty() {
            return Err(Error::validation_for_field(
                cluster,
                "node_groups",
                "no node groups declared; a MASTER node group is required",
            ));
        }

        let masters = self
            .node_groups
            .iter()
            .filter(|g| g.role == NodeRole::Master)
            .count();
        if masters != 1 {
            return Err(Error::validation_for_field(
                cluster,
                "node_groups",
                format!("exactly one MASTER node group is required, found {}", masters),
            ));
        }

        for (index, group) in self.node_groups.iter().enumerate() {
            if group.instance_type.trim().is_empty() {
                return Err(Error::validation_for_field(
                    cluster,
                    format!("node_groups[{}].instance_type", index),
                    "instance type must not be empty",
                ));
            }
            if group.instance_count == 0 {
                return Err(Error::validation_for_field(
                    cluster,
                    format!("node_groups[{}].instance_count", index),
                    format!("{} group instance count must be at least 1", group.role.as_str()),
                ));
            }
        }

        Ok(())
    }
}
