//! End-to-end lifecycle tests against an in-memory provisioning service
//!
//! The fake below behaves like a tiny provider: it assigns handles, keeps
//! step lists per cluster, and lets tests move clusters between states.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use emr_cluster::{
    any_cluster_waiting, is_cluster_running, ActionOnFailure, ClientFactory, ClusterController,
    ClusterIdentity, ClusterSpecBuilder, ClusterState, ClusterStatus, ClusterSummary,
    ControllerConfig, Credentials, Error, LaunchRequest, LaunchResult, MatchPolicy,
    ProviderError, ProviderErrorKind, ProvisioningClient, ResponseMetadata,
    StaticCredentialProvider, SubmissionAck, WorkStep,
};

#[derive(Debug)]
struct FakeCluster {
    name: String,
    status: ClusterStatus,
    steps: Vec<WorkStep>,
}

#[derive(Default)]
struct ProviderState {
    clusters: BTreeMap<String, FakeCluster>,
    create_requests: Vec<LaunchRequest>,
    calls: usize,
    reject_next_launch: Option<String>,
    closed: usize,
}

#[derive(Clone, Default)]
struct FakeProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl FakeProvider {
    fn with<T>(&self, f: impl FnOnce(&mut ProviderState) -> T) -> T {
        f(&mut self.state.lock().expect("mutex should not be poisoned"))
    }

    fn calls(&self) -> usize {
        self.with(|s| s.calls)
    }

    fn set_state(&self, handle: &str, state: ClusterState) {
        self.with(|s| {
            if let Some(cluster) = s.clusters.get_mut(handle) {
                cluster.status = ClusterStatus::new(state);
            }
        })
    }

    fn add_existing(&self, handle: &str, name: &str, state: ClusterState) {
        self.with(|s| {
            s.clusters.insert(
                handle.to_string(),
                FakeCluster {
                    name: name.to_string(),
                    status: ClusterStatus::new(state),
                    steps: Vec::new(),
                },
            );
        })
    }

    fn steps_of(&self, handle: &str) -> Vec<WorkStep> {
        self.with(|s| {
            s.clusters
                .get(handle)
                .map(|c| c.steps.clone())
                .unwrap_or_default()
        })
    }
}

#[async_trait]
impl ProvisioningClient for FakeProvider {
    async fn create_cluster(&self, request: &LaunchRequest) -> Result<LaunchResult, ProviderError> {
        self.with(|s| {
            s.calls += 1;
            if let Some(reason) = s.reject_next_launch.take() {
                return Err(ProviderError::new(ProviderErrorKind::Rejected, reason));
            }
            s.create_requests.push(request.clone());

            let handle = format!("j-{:04}", s.clusters.len() + 1);
            s.clusters.insert(
                handle.clone(),
                FakeCluster {
                    name: request.spec.identity.name.clone(),
                    status: ClusterStatus::new(ClusterState::Starting),
                    steps: request.steps.clone(),
                },
            );
            Ok(LaunchResult {
                cluster_handle: handle,
                metadata: ResponseMetadata::with_request_id(format!("req-{}", s.calls)),
            })
        })
    }

    async fn add_steps(
        &self,
        cluster_handle: &str,
        steps: &[WorkStep],
    ) -> Result<SubmissionAck, ProviderError> {
        self.with(|s| {
            s.calls += 1;
            let cluster = s
                .clusters
                .get_mut(cluster_handle)
                .ok_or_else(|| ProviderError::not_found(cluster_handle))?;
            let first = cluster.steps.len();
            cluster.steps.extend_from_slice(steps);
            Ok(SubmissionAck {
                step_ids: (first..cluster.steps.len())
                    .map(|i| format!("s-{}", i))
                    .collect(),
                metadata: ResponseMetadata::default(),
            })
        })
    }

    async fn describe_cluster(&self, cluster_handle: &str) -> Result<ClusterStatus, ProviderError> {
        self.with(|s| {
            s.calls += 1;
            s.clusters
                .get(cluster_handle)
                .map(|c| c.status.clone())
                .ok_or_else(|| ProviderError::not_found(cluster_handle))
        })
    }

    async fn list_clusters(&self) -> Result<Vec<ClusterSummary>, ProviderError> {
        self.with(|s| {
            s.calls += 1;
            Ok(s.clusters
                .iter()
                .map(|(id, c)| ClusterSummary {
                    id: id.clone(),
                    name: c.name.clone(),
                    status: c.status.clone(),
                })
                .collect())
        })
    }

    async fn close(&self) {
        self.with(|s| s.closed += 1);
    }
}

/// Hands out the same fake provider for every region
struct FakeFactory {
    provider: FakeProvider,
}

impl ClientFactory for FakeFactory {
    fn connect(
        &self,
        _credentials: &Credentials,
        region: &str,
    ) -> emr_cluster::Result<Arc<dyn ProvisioningClient>> {
        if region.is_empty() {
            return Err(Error::client_init(region, "region must not be empty"));
        }
        Ok(Arc::new(self.provider.clone()))
    }
}

fn static_credentials() -> StaticCredentialProvider {
    StaticCredentialProvider::new(Credentials::new("AKID", "SECRET"))
}

fn ingest_controller(provider: &FakeProvider) -> ClusterController {
    let mut controller = ClusterController::new(
        ClusterIdentity::new("ingest", "eu-central-1"),
        Arc::new(provider.clone()),
    );
    controller
        .set_software_profile("emr-5.20.0", ["Hadoop", "Spark", "Hive"])
        .unwrap()
        .set_bootstrap_action("s3://batchdataingestion/bootstrap/install.sh")
        .unwrap()
        .add_master_node("m5.xlarge")
        .unwrap()
        .add_core_node("m5.2xlarge", 2)
        .unwrap()
        .add_core_node("r5.2xlarge", 4)
        .unwrap();
    controller
}

#[tokio::test]
async fn launch_submit_and_observe() {
    let provider = FakeProvider::default();
    let mut controller = ingest_controller(&provider);

    let handle = controller.launch(true).await.unwrap().cluster_handle.clone();
    assert_eq!(handle, "j-0001");

    let state = controller.get_state().await.unwrap();
    assert!(state.contains("State: STARTING"));

    provider.set_state(&handle, ClusterState::Waiting);
    controller.submit_step("load-orders", "s3://jobs/orders.sh").await.unwrap();
    controller.submit_step("load-users", "s3://jobs/users.sh").await.unwrap();

    let steps = provider.steps_of(&handle);
    let names: Vec<&str> = steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Setup Hadoop Debugging", "load-orders", "load-users"]
    );
    assert_eq!(steps[0].action_on_failure, ActionOnFailure::TerminateCluster);
    assert!(steps[1..]
        .iter()
        .all(|s| s.action_on_failure == ActionOnFailure::Continue));

    let state = controller.get_state().await.unwrap();
    assert!(state.contains("State: WAITING"));

    controller.close().await;
    assert_eq!(provider.with(|s| s.closed), 1);
}

#[tokio::test]
async fn create_request_reproduces_specification() {
    let provider = FakeProvider::default();
    let mut controller = ingest_controller(&provider);
    controller.launch(false).await.unwrap();

    let request = provider.with(|s| s.create_requests[0].clone());
    assert_eq!(request.spec.core_groups().count(), 2);
    assert_eq!(request.spec.software.applications.len(), 3);
    assert_eq!(
        request.spec.bootstrap.as_ref().map(|b| b.script_location.as_str()),
        Some("s3://batchdataingestion/bootstrap/install.sh")
    );

    let json = request.to_api_json();
    assert_eq!(json["Instances"]["InstanceGroups"].as_array().unwrap().len(), 3);
    assert_eq!(json["Applications"].as_array().unwrap().len(), 3);
    assert_eq!(
        json["BootstrapActions"][0]["ScriptBootstrapAction"]["Path"],
        "s3://batchdataingestion/bootstrap/install.sh"
    );
}

#[tokio::test]
async fn operations_before_launch_make_no_remote_calls() {
    let provider = FakeProvider::default();
    let controller = ingest_controller(&provider);

    let err = controller.submit_step("job1", "s3://x/y").await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    let err = controller.get_state().await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn rejected_launch_then_corrected_retry() {
    let provider = FakeProvider::default();
    provider.with(|s| s.reject_next_launch = Some("quota exceeded".to_string()));
    let mut controller = ingest_controller(&provider);

    let err = controller.launch(false).await.unwrap_err();
    assert!(matches!(err, Error::LaunchFailed { .. }));
    assert!(controller.get_state().await.is_err());

    controller.add_core_node("m5.large", 1).unwrap();
    controller.launch(false).await.unwrap();
    assert_eq!(
        controller.launch_specification().map(|s| s.node_groups.len()),
        Some(4)
    );
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn terminated_cluster_is_reported_not_hidden() {
    let provider = FakeProvider::default();
    let mut controller = ingest_controller(&provider);
    let handle = controller.launch(false).await.unwrap().cluster_handle.clone();

    provider.set_state(&handle, ClusterState::TerminatedWithErrors);
    let status = controller.cluster_status().await.unwrap();
    assert!(status.state.is_terminal());

    provider.with(|s| s.clusters.clear());
    let err = controller.get_state().await.unwrap_err();
    assert!(matches!(err, Error::StatusUnavailable { .. }));
}

#[tokio::test]
async fn controller_from_config_launches_with_configured_policy() {
    let provider = FakeProvider::default();
    let factory = FakeFactory {
        provider: provider.clone(),
    };
    let config = ControllerConfig::from_yaml_str("policy:\n  ec2KeyName: ops-key\n").unwrap();

    let mut controller = ClusterController::from_config(
        ClusterIdentity::new("ingest", "eu-central-1"),
        &config,
        &static_credentials(),
        &factory,
    )
    .await
    .unwrap();
    controller
        .set_software_profile("emr-5.20.0", ["Spark"])
        .unwrap()
        .add_master_node("m5.xlarge")
        .unwrap();
    controller.launch(false).await.unwrap();

    let request = provider.with(|s| s.create_requests[0].clone());
    assert_eq!(request.to_api_json()["Instances"]["Ec2KeyName"], "ops-key");
}

#[tokio::test]
async fn fleet_query_sees_waiting_clusters_by_name() {
    let provider = FakeProvider::default();
    provider.add_existing("j-A", "prod-cluster", ClusterState::Running);
    let factory = FakeFactory {
        provider: provider.clone(),
    };
    let creds = static_credentials();

    assert!(
        !is_cluster_running("prod-cluster", "eu-west-1", "default", &creds, &factory)
            .await
            .unwrap()
    );

    provider.set_state("j-A", ClusterState::Waiting);
    assert!(
        is_cluster_running("prod-cluster", "eu-west-1", "default", &creds, &factory)
            .await
            .unwrap()
    );
    assert_eq!(provider.with(|s| s.closed), 2);
}

#[tokio::test]
async fn fleet_query_on_empty_region_is_false() {
    let provider = FakeProvider::default();
    assert!(!any_cluster_waiting(&provider, "prod-cluster", MatchPolicy::Substring)
        .await
        .unwrap());
}

#[tokio::test]
async fn fleet_query_rejects_empty_region_at_client_init() {
    let factory = FakeFactory {
        provider: FakeProvider::default(),
    };
    let err = is_cluster_running("prod-cluster", "", "default", &static_credentials(), &factory)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ClientInit { .. }));
}

#[test]
fn standalone_builder_matches_controller_validation() {
    let mut builder = ClusterSpecBuilder::new("ingest", "eu-central-1");
    builder
        .set_software_profile("emr-5.20.0", ["Spark"])
        .add_master_node("m5.xlarge")
        .add_master_node("m5.xlarge");

    let err = builder
        .build(emr_cluster::ClusterPolicy::default())
        .unwrap_err();
    assert!(err.to_string().contains("exactly one MASTER"));
}
