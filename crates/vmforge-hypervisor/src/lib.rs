//! # vmforge-hypervisor: the VMware vCenter port
//!
//! The provisioning orchestrator drives a VM clone through
//! [`HypervisorPort`] without knowing anything about vCenter's actual
//! SOAP/REST surface. [`SimulatedHypervisor`] is a test double that
//! walks the same stage sequence a real implementation would, with
//! injectable failure points for exercising the orchestrator's error
//! paths without a real vCenter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vmforge_types::{Stage, VmSize};

/// Connection settings for one tenant's vCenter, as configured by
/// `vmforge-projections::VmwareConfigurationStore`.
#[derive(Debug, Clone)]
pub struct VmwareConnectionConfig {
    pub vcenter_url: String,
    pub username: String,
    pub password: String,
    pub cluster: String,
    pub datastore: String,
    pub network: String,
    pub template: String,
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub vcenter_version: String,
    pub cluster_name: String,
    pub cluster_hosts: u32,
    pub datastore_free_gb: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("network error reaching vcenter")]
    NetworkError,
    #[error("tls/ssl handshake failed")]
    SslError,
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("datacenter not found")]
    DatacenterNotFound,
    #[error("cluster not found")]
    ClusterNotFound,
    #[error("datastore not found")]
    DatastoreNotFound,
    #[error("network not found")]
    NetworkNotFound,
    #[error("template not found")]
    TemplateNotFound,
    #[error("vcenter api error: {0}")]
    ApiError(String),
}

/// Everything needed to clone one VM. `effective_name` is already the
/// project-prefixed name the orchestrator computed; this port never
/// derives naming on its own.
#[derive(Debug, Clone)]
pub struct VmSpec {
    pub effective_name: String,
    pub size: VmSize,
    pub cluster: String,
    pub datastore: String,
    pub network: String,
    pub template: String,
}

#[derive(Debug, Clone)]
pub struct ProvisionedVm {
    pub vmware_vm_id: String,
    pub ip_address: Option<String>,
    pub hostname: String,
    pub power_state: String,
    pub guest_os: Option<String>,
    pub warning: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("timed out waiting for the clone to complete")]
    Timeout,
    #[error("vcenter api error: {0}")]
    ApiError(String),
    #[error("referenced cluster, datastore, network, or template not found")]
    NotFound,
    #[error("provisioning was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct VmRuntime {
    pub power_state: String,
    pub ip_address: Option<String>,
    pub hostname: String,
    pub guest_os: Option<String>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeQueryError {
    #[error("vm not found")]
    NotFound,
    #[error("vcenter api error: {0}")]
    ApiError(String),
}

/// Receives stage transitions as `create_vm` walks them, in order,
/// never skipping one. Implementations (the orchestrator's own) merge
/// the stage into the provisioning-progress projection and emit
/// `VmProvisioningProgressUpdated`; failures there are the
/// implementation's problem to swallow or log, not the hypervisor
/// call's to fail over.
#[async_trait]
pub trait ProvisioningProgressSink: Send + Sync {
    async fn on_stage(&self, stage: Stage);
}

/// The external VMware vCenter interface the orchestrator consumes.
/// Implementations talk to a real vCenter; this crate ships only
/// [`SimulatedHypervisor`], a deterministic stand-in for tests.
#[async_trait]
pub trait HypervisorPort: Send + Sync {
    async fn test_connection(&self, config: &VmwareConnectionConfig) -> Result<ConnectionInfo, ConnectionError>;

    async fn create_vm(
        &self,
        spec: &VmSpec,
        progress: &dyn ProvisioningProgressSink,
    ) -> Result<ProvisionedVm, ProvisionError>;

    async fn get_vm_runtime(&self, vmware_vm_id: &str) -> Result<VmRuntime, RuntimeQueryError>;
}

/// Where a [`SimulatedHypervisor`] should inject a failure, if at all.
#[derive(Debug, Clone, Copy, Default)]
pub enum SimulatedFault {
    #[default]
    None,
    /// Fails with [`ProvisionError::Timeout`] immediately after
    /// reporting `after`, without reaching later stages.
    TimeoutAfter(Stage),
    /// Fails with [`ProvisionError::ApiError`] immediately after
    /// reporting `after`.
    ApiErrorAfter(Stage),
}

/// Deterministic, in-memory hypervisor double. Walks every [`Stage`]
/// in order, reporting each to the progress sink, then either succeeds
/// or fails at the point [`SimulatedFault`] specifies.
#[derive(Debug, Clone)]
pub struct SimulatedHypervisor {
    fault: SimulatedFault,
}

impl Default for SimulatedHypervisor {
    fn default() -> Self {
        Self::new(SimulatedFault::None)
    }
}

impl SimulatedHypervisor {
    pub fn new(fault: SimulatedFault) -> Self {
        Self { fault }
    }
}

#[async_trait]
impl HypervisorPort for SimulatedHypervisor {
    async fn test_connection(&self, config: &VmwareConnectionConfig) -> Result<ConnectionInfo, ConnectionError> {
        if config.vcenter_url.is_empty() {
            return Err(ConnectionError::NetworkError);
        }
        Ok(ConnectionInfo {
            vcenter_version: "8.0.2".into(),
            cluster_name: config.cluster.clone(),
            cluster_hosts: 3,
            datastore_free_gb: 4096,
        })
    }

    async fn create_vm(
        &self,
        spec: &VmSpec,
        progress: &dyn ProvisioningProgressSink,
    ) -> Result<ProvisionedVm, ProvisionError> {
        for stage in Stage::ORDERED {
            progress.on_stage(stage).await;
            let fails_here = match self.fault {
                SimulatedFault::None => false,
                SimulatedFault::TimeoutAfter(fault_stage) | SimulatedFault::ApiErrorAfter(fault_stage) => {
                    fault_stage == stage
                }
            };
            if fails_here {
                return match self.fault {
                    SimulatedFault::TimeoutAfter(_) => Err(ProvisionError::Timeout),
                    SimulatedFault::ApiErrorAfter(_) => Err(ProvisionError::ApiError("simulated api failure".into())),
                    SimulatedFault::None => unreachable!(),
                };
            }
        }

        Ok(ProvisionedVm {
            vmware_vm_id: format!("vm-{}", uuid_like_suffix(&spec.effective_name)),
            ip_address: Some("192.168.1.100".into()),
            hostname: spec.effective_name.clone(),
            power_state: "poweredOn".into(),
            guest_os: Some("ubuntu64Guest".into()),
            warning: None,
        })
    }

    async fn get_vm_runtime(&self, vmware_vm_id: &str) -> Result<VmRuntime, RuntimeQueryError> {
        if vmware_vm_id.is_empty() {
            return Err(RuntimeQueryError::NotFound);
        }
        Ok(VmRuntime {
            power_state: "poweredOn".into(),
            ip_address: Some("192.168.1.100".into()),
            hostname: vmware_vm_id.to_string(),
            guest_os: Some("ubuntu64Guest".into()),
            observed_at: Utc::now(),
        })
    }
}

fn uuid_like_suffix(name: &str) -> String {
    format!("{:x}", name.bytes().fold(0u64, |acc, b| acc.wrapping_mul(131).wrapping_add(u64::from(b))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        seen: Mutex<Vec<Stage>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self { seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ProvisioningProgressSink for RecordingSink {
        async fn on_stage(&self, stage: Stage) {
            self.seen.lock().unwrap().push(stage);
        }
    }

    fn spec() -> VmSpec {
        VmSpec {
            effective_name: "ALPH-web-01".into(),
            size: VmSize::M,
            cluster: "prod-cluster".into(),
            datastore: "prod-ds".into(),
            network: "vlan-100".into(),
            template: "ubuntu-22.04".into(),
        }
    }

    #[tokio::test]
    async fn successful_create_reports_every_stage_in_order() {
        let hv = SimulatedHypervisor::default();
        let sink = RecordingSink::new();
        let result = hv.create_vm(&spec(), &sink).await.unwrap();
        assert_eq!(result.hostname, "ALPH-web-01");
        assert_eq!(*sink.seen.lock().unwrap(), Stage::ORDERED.to_vec());
    }

    #[tokio::test]
    async fn timeout_after_cloning_stops_before_later_stages() {
        let hv = SimulatedHypervisor::new(SimulatedFault::TimeoutAfter(Stage::Cloning));
        let sink = RecordingSink::new();
        let err = hv.create_vm(&spec(), &sink).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Timeout));
        assert_eq!(*sink.seen.lock().unwrap(), vec![Stage::Cloning]);
    }

    #[tokio::test]
    async fn api_error_after_configuring_is_reported() {
        let hv = SimulatedHypervisor::new(SimulatedFault::ApiErrorAfter(Stage::Configuring));
        let sink = RecordingSink::new();
        let err = hv.create_vm(&spec(), &sink).await.unwrap_err();
        assert!(matches!(err, ProvisionError::ApiError(_)));
        assert_eq!(*sink.seen.lock().unwrap(), vec![Stage::Cloning, Stage::Configuring]);
    }

    #[tokio::test]
    async fn runtime_query_rejects_an_empty_id() {
        let hv = SimulatedHypervisor::default();
        assert!(matches!(hv.get_vm_runtime("").await, Err(RuntimeQueryError::NotFound)));
    }
}
