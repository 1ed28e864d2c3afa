use uuid::Uuid;
use vmforge_types::{VmId, VmRequestId};

/// The first 4 characters of a project name, stripped of anything
/// that isn't alphanumeric and uppercased — "Alpha Project" becomes
/// "ALPH".
pub fn project_prefix(project_name: &str) -> String {
    project_name.chars().filter(char::is_ascii_alphanumeric).take(4).collect::<String>().to_uppercase()
}

/// The name actually sent to the hypervisor: the project prefix joined
/// to the user-chosen VM name.
pub fn effective_vm_name(project_name: &str, vm_name: &str) -> String {
    format!("{}-{}", project_prefix(project_name), vm_name)
}

/// Deterministically derives the `Vm` aggregate's id from its owning
/// request's id. The two aggregates never share a stream (the event
/// log's uniqueness is per `aggregate_id`, not per `aggregate_type`),
/// so this can't collide with `request_id` itself, and it means the
/// orchestrator never needs a side table to find "the Vm for this
/// request" — it recomputes the id instead.
pub fn derive_vm_id(request_id: VmRequestId) -> VmId {
    VmId::from_uuid(Uuid::new_v5(&Uuid::NAMESPACE_OID, request_id.as_uuid().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_prefix_takes_first_four_alphanumeric_chars_uppercased() {
        assert_eq!(project_prefix("Alpha Project"), "ALPH");
    }

    #[test]
    fn project_prefix_strips_non_alphanumeric_before_taking_the_first_four_chars() {
        assert_eq!(project_prefix("A-B-C-D"), "ABCD");
    }

    #[test]
    fn effective_name_joins_prefix_and_vm_name() {
        assert_eq!(effective_vm_name("Alpha Project", "web-01"), "ALPH-web-01");
    }

    #[test]
    fn vm_id_derivation_is_deterministic_and_distinct_from_the_request_id() {
        let request_id = VmRequestId::new_v4();
        let a = derive_vm_id(request_id);
        let b = derive_vm_id(request_id);
        assert_eq!(a, b);
        assert_ne!(a.as_uuid(), request_id.as_uuid());
    }
}
