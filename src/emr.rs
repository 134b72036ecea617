//! Provisioning client backed by the EMR API
//!
//! [`EmrClientFactory`] builds one SDK client per region from resolved
//! [`Credentials`]. [`EmrProvisioningClient`] maps the crate's request types
//! onto `RunJobFlow`, `AddJobFlowSteps`, `DescribeCluster` and `ListClusters`.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_emr::config::{BehaviorVersion, Credentials as SdkCredentials, Region};
use aws_sdk_emr::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_emr::operation::RequestId;
use aws_sdk_emr::types::{
    ActionOnFailure as SdkActionOnFailure, Application, BootstrapActionConfig,
    ClusterStatus as SdkClusterStatus, HadoopJarStepConfig, InstanceGroupConfig,
    InstanceRoleType, JobFlowInstancesConfig, MarketType, ScriptBootstrapActionConfig,
    StepConfig, Tag,
};
use aws_sdk_emr::Client;
use tracing::debug;

use crate::client::{
    ClientFactory, ClusterState, ClusterStatus, ClusterSummary, LaunchRequest, LaunchResult,
    ProviderError, ProviderErrorKind, ProvisioningClient, ResponseMetadata, SubmissionAck,
};
use crate::credentials::Credentials;
use crate::spec::NodeGroup;
use crate::step::WorkStep;
use crate::{Error, Result};

/// Name the SDK reports for credentials handed over by this crate
const CREDENTIALS_SOURCE: &str = "emr-cluster";

/// Builds [`EmrProvisioningClient`]s
#[derive(Clone, Debug, Default)]
pub struct EmrClientFactory;

impl ClientFactory for EmrClientFactory {
    fn connect(
        &self,
        credentials: &Credentials,
        region: &str,
    ) -> Result<Arc<dyn ProvisioningClient>> {
        if region.trim().is_empty() {
            return Err(Error::client_init(region, "region must not be empty"));
        }

        let sdk_credentials = SdkCredentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            credentials.session_token.clone(),
            None,
            CREDENTIALS_SOURCE,
        );
        let config = aws_sdk_emr::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(sdk_credentials)
            .build();

        debug!(region = %region, "Created EMR client");
        Ok(Arc::new(EmrProvisioningClient {
            client: Client::from_conf(config),
            region: region.to_string(),
        }))
    }
}

/// EMR API client bound to one region
#[derive(Clone, Debug)]
pub struct EmrProvisioningClient {
    client: Client,
    region: String,
}

impl EmrProvisioningClient {
    /// Wrap an SDK client built elsewhere
    pub fn new(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    /// Region this client talks to
    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl ProvisioningClient for EmrProvisioningClient {
    async fn create_cluster(
        &self,
        request: &LaunchRequest,
    ) -> std::result::Result<LaunchResult, ProviderError> {
        let spec = &request.spec;
        let policy = &spec.policy;

        let applications = spec
            .software
            .applications
            .iter()
            .map(|name| Application::builder().name(name).build())
            .collect();
        let instance_groups = spec
            .node_groups
            .iter()
            .map(instance_group)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let instances = JobFlowInstancesConfig::builder()
            .set_instance_groups(Some(instance_groups))
            .ec2_key_name(&policy.ec2_key_name)
            .keep_job_flow_alive_when_no_steps(policy.keep_alive_when_no_steps)
            .build();
        let bootstrap_actions = spec
            .bootstrap
            .as_ref()
            .map(|bootstrap| {
                let script = ScriptBootstrapActionConfig::builder()
                    .path(&bootstrap.script_location)
                    .build();
                Ok::<_, ProviderError>(
                    BootstrapActionConfig::builder()
                        .name(&bootstrap.name)
                        .script_bootstrap_action(script)
                        .build(),
                )
            })
            .transpose()?
            .map(|action| vec![action]);
        let steps = request
            .steps
            .iter()
            .map(step_config)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let output = self
            .client
            .run_job_flow()
            .name(&spec.identity.name)
            .release_label(&spec.software.release_label)
            .log_uri(&policy.log_uri)
            .service_role(&policy.service_role)
            .job_flow_role(&policy.job_flow_role)
            .set_applications(Some(applications))
            .instances(instances)
            .tags(Tag::builder().key(&policy.tag_key).value(&policy.tag_value).build())
            .set_bootstrap_actions(bootstrap_actions)
            .set_steps(Some(steps))
            .send()
            .await
            .map_err(provider_error)?;

        let cluster_handle = output.job_flow_id().map(str::to_string).ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::Other, "RunJobFlow returned no job flow id")
        })?;
        Ok(LaunchResult {
            cluster_handle,
            metadata: response_metadata(output.request_id()),
        })
    }

    async fn add_steps(
        &self,
        cluster_handle: &str,
        steps: &[WorkStep],
    ) -> std::result::Result<SubmissionAck, ProviderError> {
        let steps = steps
            .iter()
            .map(step_config)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let output = self
            .client
            .add_job_flow_steps()
            .job_flow_id(cluster_handle)
            .set_steps(Some(steps))
            .send()
            .await
            .map_err(provider_error)?;

        Ok(SubmissionAck {
            step_ids: output.step_ids().to_vec(),
            metadata: response_metadata(output.request_id()),
        })
    }

    async fn describe_cluster(
        &self,
        cluster_handle: &str,
    ) -> std::result::Result<ClusterStatus, ProviderError> {
        let output = self
            .client
            .describe_cluster()
            .cluster_id(cluster_handle)
            .send()
            .await
            .map_err(provider_error)?;

        output
            .cluster()
            .and_then(|cluster| cluster.status())
            .map(cluster_status)
            .ok_or_else(|| ProviderError::not_found(cluster_handle))
    }

    async fn list_clusters(&self) -> std::result::Result<Vec<ClusterSummary>, ProviderError> {
        let mut summaries = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_clusters()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(provider_error)?;

            summaries.extend(output.clusters().iter().map(|cluster| ClusterSummary {
                id: cluster.id().unwrap_or_default().to_string(),
                name: cluster.name().unwrap_or_default().to_string(),
                status: cluster
                    .status()
                    .map(cluster_status)
                    .unwrap_or_else(|| ClusterStatus::new(ClusterState::Other(String::new()))),
            }));

            match output.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(summaries)
    }

    async fn close(&self) {
        // The SDK client holds no connections that need explicit release.
        debug!(region = %self.region, "Closed EMR client");
    }
}

fn instance_group(group: &NodeGroup) -> std::result::Result<InstanceGroupConfig, ProviderError> {
    let instance_count = i32::try_from(group.instance_count).map_err(|_| {
        ProviderError::new(
            ProviderErrorKind::Rejected,
            format!("instance count {} exceeds the API limit", group.instance_count),
        )
    })?;

    Ok(InstanceGroupConfig::builder()
        .instance_role(InstanceRoleType::from(group.role.as_str()))
        .instance_type(&group.instance_type)
        .instance_count(instance_count)
        .market(MarketType::from(group.market.as_str()))
        .build())
}

fn step_config(step: &WorkStep) -> std::result::Result<StepConfig, ProviderError> {
    let jar_step = HadoopJarStepConfig::builder()
        .jar(&step.jar_step.jar)
        .set_args(Some(step.jar_step.args.clone()))
        .build();

    Ok(StepConfig::builder()
        .name(&step.name)
        .action_on_failure(SdkActionOnFailure::from(step.action_on_failure.as_str()))
        .hadoop_jar_step(jar_step)
        .build())
}

fn cluster_status(status: &SdkClusterStatus) -> ClusterStatus {
    let state = status
        .state()
        .map(|s| ClusterState::from(s.as_str()))
        .unwrap_or_else(|| ClusterState::Other(String::new()));
    let reason = status
        .state_change_reason()
        .and_then(|r| r.message())
        .map(str::to_string);

    ClusterStatus {
        state,
        state_change_reason: reason,
    }
}

fn response_metadata(request_id: Option<&str>) -> ResponseMetadata {
    request_id
        .map(ResponseMetadata::with_request_id)
        .unwrap_or_default()
}

fn invalid_request(err: impl std::fmt::Display) -> ProviderError {
    ProviderError::new(ProviderErrorKind::Rejected, format!("invalid request: {}", err))
}

fn provider_error<E>(err: SdkError<E>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let kind = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => ProviderErrorKind::Transport,
        SdkError::ServiceError(_) | SdkError::ResponseError(_) => classify(err.code()),
        _ => ProviderErrorKind::Other,
    };
    let request_id = err.meta().request_id().map(str::to_string);

    let error = ProviderError::new(kind, DisplayErrorContext(&err).to_string());
    match request_id {
        Some(id) => error.with_request_id(id),
        None => error,
    }
}

/// Map a service error code to an error kind
fn classify(code: Option<&str>) -> ProviderErrorKind {
    match code {
        Some("ThrottlingException") | Some("Throttling") | Some("TooManyRequestsException") => {
            ProviderErrorKind::Throttled
        }
        Some("InternalServerError") | Some("InternalServerException") => ProviderErrorKind::Other,
        Some(_) => ProviderErrorKind::Rejected,
        None => ProviderErrorKind::Other,
    }
}
