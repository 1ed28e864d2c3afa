//! Opaque 128-bit entity identifiers.
//!
//! Every identity in the system is a `Uuid` wrapped in a distinct newtype
//! so the compiler rejects passing a `VmId` where a `VmRequestId` is
//! expected. Equality is bitwise on the wrapped `Uuid`, so values survive
//! round-tripping through JSON or Postgres `uuid` columns unchanged.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID (e.g. one read back from storage).
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::from_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(TenantId, "Identifies the tenant (organization) a request belongs to.");
uuid_id!(UserId, "Identifies a human user — requester, approver, or canceller.");
uuid_id!(ProjectId, "Identifies the project a VM request is scoped to.");
uuid_id!(VmRequestId, "Identifies a `VmRequest` aggregate instance.");
uuid_id!(VmId, "Identifies a `Vm` aggregate instance.");
uuid_id!(
    CorrelationId,
    "Ties together every event and log line produced while handling one logical operation."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types_with_equal_underlying_representation() {
        let raw = Uuid::new_v4();
        let tenant = TenantId::from_uuid(raw);
        let project = ProjectId::from_uuid(raw);
        assert_eq!(tenant.as_uuid(), project.as_uuid());
        // Not directly comparable: `tenant == project` would not compile.
    }

    #[test]
    fn roundtrips_through_json() {
        let id = VmRequestId::new_v4();
        let json = serde_json::to_string(&id).unwrap();
        let decoded: VmRequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, decoded);
    }

    #[test]
    fn roundtrips_through_display_and_from_str() {
        let id = VmId::new_v4();
        let text = id.to_string();
        let decoded: VmId = text.parse().unwrap();
        assert_eq!(id, decoded);
    }
}
