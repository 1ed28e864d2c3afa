//! The `Vm` aggregate (C6): the hypervisor-side state of a
//! provisioned machine, created by the orchestrator once a request is
//! approved and picked up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vmforge_codec::{DomainEvent, VmEvent};
use vmforge_types::{Stage, TenantId, VmRequestId, VmSize};

use crate::error::DomainError;
use crate::runtime::Aggregate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmStatus {
    Provisioning,
    Provisioned,
    Failed,
}

impl std::fmt::Display for VmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VmStatus::Provisioning => "PROVISIONING",
            VmStatus::Provisioned => "PROVISIONED",
            VmStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vm {
    pub created: Option<VmCore>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmCore {
    pub tenant_id: TenantId,
    pub request_id: VmRequestId,
    pub name: String,
    pub size: VmSize,
    pub status: VmStatus,
    pub stage: Option<Stage>,
    pub vmware_vm_id: Option<String>,
    pub ip_address: Option<String>,
    pub hostname: Option<String>,
    pub power_state: Option<String>,
    pub guest_os: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub enum VmCommand {
    StartProvisioning { request_id: VmRequestId, tenant_id: TenantId, name: String, size: VmSize },
    ReportProgress { stage: Stage },
    CompleteProvisioning {
        vmware_vm_id: String,
        ip_address: Option<String>,
        hostname: String,
        power_state: String,
        guest_os: Option<String>,
    },
    FailProvisioning { reason: String },
    SyncStatus {
        power_state: String,
        ip_address: Option<String>,
        hostname: String,
        guest_os: Option<String>,
        observed_at: DateTime<Utc>,
    },
}

impl Vm {
    pub fn status(&self) -> Option<VmStatus> {
        self.created.as_ref().map(|c| c.status)
    }
}

impl Aggregate for Vm {
    type Command = VmCommand;
    type Event = VmEvent;
    type Error = DomainError;
    const AGGREGATE_TYPE: &'static str = "Vm";

    fn apply(mut self, event: &Self::Event) -> Self {
        match (&mut self.created, event) {
            (None, VmEvent::Created { request_id, tenant_id, name, size }) => {
                self.created = Some(VmCore {
                    tenant_id: *tenant_id,
                    request_id: *request_id,
                    name: name.clone(),
                    size: *size,
                    status: VmStatus::Provisioning,
                    stage: None,
                    vmware_vm_id: None,
                    ip_address: None,
                    hostname: None,
                    power_state: None,
                    guest_os: None,
                    last_synced_at: None,
                    failure_reason: None,
                });
            }
            (Some(core), VmEvent::ProvisioningProgressUpdated { stage }) => {
                core.stage = Some(*stage);
            }
            (Some(core), VmEvent::Provisioned { vmware_vm_id, ip_address, hostname, power_state, guest_os }) => {
                core.status = VmStatus::Provisioned;
                core.vmware_vm_id = Some(vmware_vm_id.clone());
                core.ip_address = ip_address.clone();
                core.hostname = Some(hostname.clone());
                core.power_state = Some(power_state.clone());
                core.guest_os = guest_os.clone();
            }
            (Some(core), VmEvent::ProvisioningFailed { reason }) => {
                core.status = VmStatus::Failed;
                core.failure_reason = Some(reason.clone());
            }
            (Some(core), VmEvent::StatusSynced { power_state, ip_address, hostname, guest_os, observed_at }) => {
                core.power_state = Some(power_state.clone());
                core.ip_address = ip_address.clone();
                core.hostname = Some(hostname.clone());
                core.guest_os = guest_os.clone();
                core.last_synced_at = Some(*observed_at);
            }
            (None, _) => {
                tracing::error!("event applied to a Vm that has not been created yet");
            }
        }
        self
    }

    fn decide(&self, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match (&self.created, command) {
            (None, VmCommand::StartProvisioning { request_id, tenant_id, name, size }) => {
                Ok(vec![VmEvent::Created { request_id, tenant_id, name, size }])
            }
            (None, _) => Err(DomainError::InvalidState {
                current: "NONE".into(),
                message: "vm has not started provisioning yet".into(),
            }),

            (Some(core), VmCommand::ReportProgress { stage }) => {
                if core.status != VmStatus::Provisioning {
                    return Err(invalid_state(core.status, "can only report progress while provisioning"));
                }
                Ok(vec![VmEvent::ProvisioningProgressUpdated { stage }])
            }

            (Some(core), VmCommand::CompleteProvisioning { vmware_vm_id, ip_address, hostname, power_state, guest_os }) => {
                if core.status != VmStatus::Provisioning {
                    return Err(invalid_state(core.status, "can only complete an in-flight provisioning"));
                }
                Ok(vec![VmEvent::Provisioned { vmware_vm_id, ip_address, hostname, power_state, guest_os }])
            }

            (Some(core), VmCommand::FailProvisioning { reason }) => {
                if core.status != VmStatus::Provisioning {
                    return Err(invalid_state(core.status, "can only fail an in-flight provisioning"));
                }
                Ok(vec![VmEvent::ProvisioningFailed { reason }])
            }

            (Some(core), VmCommand::SyncStatus { power_state, ip_address, hostname, guest_os, observed_at }) => {
                if core.status != VmStatus::Provisioned {
                    return Err(invalid_state(core.status, "can only sync status on a provisioned vm"));
                }
                Ok(vec![VmEvent::StatusSynced { power_state, ip_address, hostname, guest_os, observed_at }])
            }
        }
    }

    fn narrow(event: DomainEvent) -> Option<Self::Event> {
        match event {
            DomainEvent::Vm(e) => Some(e),
            DomainEvent::VmRequest(_) => None,
        }
    }
}

fn invalid_state(current: VmStatus, message: &str) -> DomainError {
    DomainError::InvalidState { current: current.to_string(), message: message.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> Vm {
        let vm = Vm::default();
        let events = vm
            .decide(VmCommand::StartProvisioning {
                request_id: VmRequestId::new_v4(),
                tenant_id: TenantId::new_v4(),
                name: "ALPH-web-01".into(),
                size: VmSize::M,
            })
            .unwrap();
        events.iter().fold(vm, |v, e| v.apply(e))
    }

    #[test]
    fn starting_provisioning_transitions_from_nothing_to_provisioning() {
        let vm = started();
        assert_eq!(vm.status(), Some(VmStatus::Provisioning));
    }

    #[test]
    fn progress_updates_require_provisioning_status() {
        let vm = started();
        let events = vm
            .decide(VmCommand::CompleteProvisioning {
                vmware_vm_id: "vm-123".into(),
                ip_address: Some("10.0.0.5".into()),
                hostname: "ALPH-web-01".into(),
                power_state: "poweredOn".into(),
                guest_os: Some("ubuntuGuest".into()),
            })
            .unwrap();
        let vm = events.iter().fold(vm, |v, e| v.apply(e));

        let err = vm.decide(VmCommand::ReportProgress { stage: Stage::Cloning }).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));
    }

    #[test]
    fn completing_provisioning_transitions_to_provisioned() {
        let vm = started();
        let events = vm
            .decide(VmCommand::CompleteProvisioning {
                vmware_vm_id: "vm-123".into(),
                ip_address: Some("10.0.0.5".into()),
                hostname: "ALPH-web-01".into(),
                power_state: "poweredOn".into(),
                guest_os: Some("ubuntuGuest".into()),
            })
            .unwrap();
        let vm = events.iter().fold(vm, |v, e| v.apply(e));
        assert_eq!(vm.status(), Some(VmStatus::Provisioned));
    }

    #[test]
    fn sync_status_requires_provisioned() {
        let vm = started();
        let err = vm
            .decide(VmCommand::SyncStatus {
                power_state: "poweredOn".into(),
                ip_address: Some("10.0.0.5".into()),
                hostname: "ALPH-web-01".into(),
                guest_os: None,
                observed_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));
    }

    #[test]
    fn failing_provisioning_transitions_to_failed() {
        let vm = started();
        let events = vm.decide(VmCommand::FailProvisioning { reason: "hypervisor timeout".into() }).unwrap();
        let vm = events.iter().fold(vm, |v, e| v.apply(e));
        assert_eq!(vm.status(), Some(VmStatus::Failed));
    }
}
