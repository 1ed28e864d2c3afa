//! Event payloads. These are the structured shapes the registry in
//! [`crate::registry`] encodes and decodes; aggregates never see
//! anything but these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vmforge_types::{ProjectId, Stage, TenantId, UserId, VmRequestId, VmSize};

/// Every event a `VmRequest` aggregate can emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VmRequestEvent {
    Created {
        tenant_id: TenantId,
        project_id: ProjectId,
        project_name: String,
        requester_id: UserId,
        requester_email: String,
        vm_name: String,
        size: VmSize,
        justification: String,
    },
    Approved {
        decided_by: UserId,
        decided_at: DateTime<Utc>,
    },
    Rejected {
        decided_by: UserId,
        decided_at: DateTime<Utc>,
        reason: String,
    },
    Cancelled {
        cancelled_at: DateTime<Utc>,
    },
    ProvisioningStarted,
    Ready {
        vmware_vm_id: String,
        ip_address: Option<String>,
        hostname: String,
    },
    Failed {
        reason: String,
    },
}

impl VmRequestEvent {
    /// The `event_type` string this variant is stored and looked up
    /// under. Stable across versions; never renamed once shipped.
    pub fn event_type(&self) -> &'static str {
        match self {
            VmRequestEvent::Created { .. } => "VmRequestCreated",
            VmRequestEvent::Approved { .. } => "VmRequestApproved",
            VmRequestEvent::Rejected { .. } => "VmRequestRejected",
            VmRequestEvent::Cancelled { .. } => "VmRequestCancelled",
            VmRequestEvent::ProvisioningStarted => "VmRequestProvisioningStarted",
            VmRequestEvent::Ready { .. } => "VmRequestReady",
            VmRequestEvent::Failed { .. } => "VmRequestFailed",
        }
    }
}

/// Every event a `Vm` aggregate can emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VmEvent {
    Created {
        request_id: VmRequestId,
        tenant_id: TenantId,
        name: String,
        size: VmSize,
    },
    ProvisioningProgressUpdated {
        stage: Stage,
    },
    Provisioned {
        vmware_vm_id: String,
        ip_address: Option<String>,
        hostname: String,
        power_state: String,
        guest_os: Option<String>,
    },
    ProvisioningFailed {
        reason: String,
    },
    StatusSynced {
        power_state: String,
        ip_address: Option<String>,
        hostname: String,
        guest_os: Option<String>,
        observed_at: DateTime<Utc>,
    },
}

impl VmEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            VmEvent::Created { .. } => "VmCreated",
            VmEvent::ProvisioningProgressUpdated { .. } => "VmProvisioningProgressUpdated",
            VmEvent::Provisioned { .. } => "VmProvisioned",
            VmEvent::ProvisioningFailed { .. } => "VmProvisioningFailed",
            VmEvent::StatusSynced { .. } => "VmStatusSynced",
        }
    }
}

/// The aggregate-type-tagged union the codec registry actually
/// encodes and decodes. Command handlers and the runtime work in
/// terms of [`VmRequestEvent`]/[`VmEvent`] directly; this wrapper only
/// exists at the store boundary: the store itself treats payloads as
/// opaque bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    VmRequest(VmRequestEvent),
    Vm(VmEvent),
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::VmRequest(e) => e.event_type(),
            DomainEvent::Vm(e) => e.event_type(),
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        match self {
            DomainEvent::VmRequest(_) => "VmRequest",
            DomainEvent::Vm(_) => "Vm",
        }
    }
}

impl From<VmRequestEvent> for DomainEvent {
    fn from(event: VmRequestEvent) -> Self {
        DomainEvent::VmRequest(event)
    }
}

impl From<VmEvent> for DomainEvent {
    fn from(event: VmEvent) -> Self {
        DomainEvent::Vm(event)
    }
}
