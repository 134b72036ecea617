//! Controller configuration
//!
//! Policy fields that every launch carries (log destination, IAM roles, EC2 key,
//! keep-alive, tag) live in [`ClusterPolicy`]. Defaults reproduce the values
//! the ingestion clusters have always been launched with; a YAML file and a
//! few environment variables can override them.
//!
//! Resolution order (highest priority first):
//! 1. Environment variables (`EMR_CLUSTER_PROFILE`, `EMR_CLUSTER_LOG_URI`, `EMR_CLUSTER_EC2_KEY`)
//! 2. YAML file passed to [`ControllerConfig::from_file`]
//! 3. Built-in defaults

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, DEFAULT_CREDENTIALS_PROFILE};

const PROFILE_ENV: &str = "EMR_CLUSTER_PROFILE";
const LOG_URI_ENV: &str = "EMR_CLUSTER_LOG_URI";
const EC2_KEY_ENV: &str = "EMR_CLUSTER_EC2_KEY";

/// Fixed policy fields attached to every launch request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterPolicy {
    /// Remote location the provider writes cluster logs to
    pub log_uri: String,
    /// IAM role the provisioning service assumes
    pub service_role: String,
    /// IAM instance profile attached to every node
    pub job_flow_role: String,
    /// EC2 key pair name for SSH access to nodes
    pub ec2_key_name: String,
    /// Keep the cluster alive once its step list is drained
    pub keep_alive_when_no_steps: bool,
    /// Tag key applied to the cluster
    pub tag_key: String,
    /// Tag value applied to the cluster
    pub tag_value: String,
}

impl Default for ClusterPolicy {
    fn default() -> Self {
        Self {
            log_uri: "s3://batchdataingestion/log".to_string(),
            service_role: "EMR_DefaultRole".to_string(),
            job_flow_role: "EMR_EC2_DefaultRole".to_string(),
            ec2_key_name: "MyFrankfurtKey".to_string(),
            keep_alive_when_no_steps: true,
            tag_key: "EMR".to_string(),
            tag_value: "DataIngestion".to_string(),
        }
    }
}

/// Top-level controller configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Credentials profile resolved when connecting
    pub credentials_profile: String,
    /// Policy applied to launches
    pub policy: ClusterPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            credentials_profile: DEFAULT_CREDENTIALS_PROFILE.to_string(),
            policy: ClusterPolicy::default(),
        }
    }
}

impl ControllerConfig {
    /// Parse configuration from YAML; missing fields take their defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("failed to parse configuration: {}", e)))
    }

    /// Load configuration from a YAML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        let mut config = Self::from_yaml_str(&data)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Override fields from environment variables that are set and non-empty
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(profile) = get(PROFILE_ENV) {
            self.credentials_profile = profile;
        }
        if let Some(log_uri) = get(LOG_URI_ENV) {
            self.policy.log_uri = log_uri;
        }
        if let Some(key) = get(EC2_KEY_ENV) {
            self.policy.ec2_key_name = key;
        }
    }
}
