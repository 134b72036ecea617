//! Work steps submitted to a cluster
//!
//! A step is a named jar invocation plus a failure policy. Job steps run through
//! the provider's per-region script-runner and are allowed to fail without
//! taking the cluster down; the diagnostics step runs at launch and terminates
//! the cluster if it fails.

use serde::{Deserialize, Serialize};

use crate::{COMMAND_RUNNER_JAR, PROVIDER_LIBS_DOMAIN, SCRIPT_RUNNER_PATH};

/// Name of the diagnostics step added at launch
pub const DIAGNOSTICS_STEP_NAME: &str = "Setup Hadoop Debugging";

/// Command the diagnostics step passes to the command-runner
pub const DIAGNOSTICS_COMMAND: &str = "state-pusher-script";

/// What the provider does with the cluster when a step fails
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionOnFailure {
    /// Keep the cluster running and move on to the next step
    Continue,
    /// Shut the whole cluster down
    TerminateCluster,
}

impl ActionOnFailure {
    /// Provider wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "CONTINUE",
            Self::TerminateCluster => "TERMINATE_CLUSTER",
        }
    }
}

impl std::fmt::Display for ActionOnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Jar invocation executed by a step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarStep {
    /// Jar location (remote path or a name the provider resolves on-node)
    pub jar: String,
    /// Arguments passed to the jar's main class
    pub args: Vec<String>,
}

/// A single named unit of work
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkStep {
    /// Step name as shown by the provider
    pub name: String,
    /// What to run
    pub jar_step: JarStep,
    /// Cluster behavior if the step fails
    pub action_on_failure: ActionOnFailure,
}

impl WorkStep {
    /// Job step running `payload_location` through the region's script-runner
    ///
    /// Job failures leave the cluster running.
    pub fn job(
        name: impl Into<String>,
        region: &str,
        payload_location: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            jar_step: JarStep {
                jar: script_runner_jar(region),
                args: vec![payload_location.into()],
            },
            action_on_failure: ActionOnFailure::Continue,
        }
    }

    /// Diagnostics step prepended to the launch request
    ///
    /// A diagnostics failure terminates the cluster.
    pub fn diagnostics() -> Self {
        Self {
            name: DIAGNOSTICS_STEP_NAME.to_string(),
            jar_step: JarStep {
                jar: COMMAND_RUNNER_JAR.to_string(),
                args: vec![DIAGNOSTICS_COMMAND.to_string()],
            },
            action_on_failure: ActionOnFailure::TerminateCluster,
        }
    }

    /// Provider API representation of this step
    pub fn to_api_json(&self) -> serde_json::Value {
        serde_json::json!({
            "Name": self.name,
            "ActionOnFailure": self.action_on_failure.as_str(),
            "HadoopJarStep": {
                "Jar": self.jar_step.jar,
                "Args": self.jar_step.args,
            }
        })
    }
}

/// Location of the provider's script-runner jar for a region
pub fn script_runner_jar(region: &str) -> String {
    format!("s3://{}.{}/{}", region, PROVIDER_LIBS_DOMAIN, SCRIPT_RUNNER_PATH)
}
