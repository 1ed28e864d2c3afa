//! Codec registry: maps `event_type` strings to encoders/decoders for
//! the opaque `payload` bytes stored alongside them. One string key
//! per event variant, registered once at startup and read-only
//! thereafter.

use std::collections::HashSet;

use crate::events::{DomainEvent, VmEvent, VmRequestEvent};

/// Errors raised while encoding or decoding an event payload.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unknown event type {0:?}")]
    UnknownEventType(String),
    #[error("failed to decode payload for event type {event_type:?}: {source}")]
    Decode {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode payload for event type {event_type:?}: {source}")]
    Encode {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Every `event_type` string this build knows how to encode and
/// decode. Kept as one flat list so "is this type registered" is a
/// single lookup, independent of which aggregate it belongs to.
const KNOWN_EVENT_TYPES: &[&str] = &[
    "VmRequestCreated",
    "VmRequestApproved",
    "VmRequestRejected",
    "VmRequestCancelled",
    "VmRequestProvisioningStarted",
    "VmRequestReady",
    "VmRequestFailed",
    "VmCreated",
    "VmProvisioningProgressUpdated",
    "VmProvisioned",
    "VmProvisioningFailed",
    "VmStatusSynced",
];

/// Registry of known event types. Registration happens once, in
/// [`CodecRegistry::new`]; after that it is immutable and `Sync`, so
/// one instance is shared across every command handler and projection
/// subscriber.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    known: HashSet<&'static str>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self { known: KNOWN_EVENT_TYPES.iter().copied().collect() }
    }

    /// Whether `event_type` is registered. Storage layers can use this
    /// to fail fast on a type they've never seen.
    pub fn is_known(&self, event_type: &str) -> bool {
        self.known.contains(event_type)
    }

    /// Encodes a [`DomainEvent`] to its `(event_type, payload)` pair
    /// for storage. Encoding is deterministic: the same event value
    /// always produces the same bytes, since `serde_json`'s
    /// struct-field order follows declaration order. This matters for
    /// replay-equality assertions in tests.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails, which
    /// does not happen for any event shape this crate defines but is
    /// surfaced rather than unwrapped so callers stay consistent with
    /// [`decode`](Self::decode).
    pub fn encode(&self, event: &DomainEvent) -> Result<(&'static str, Vec<u8>), CodecError> {
        let event_type = event.event_type();
        let payload = match event {
            DomainEvent::VmRequest(e) => serde_json::to_vec(e),
            DomainEvent::Vm(e) => serde_json::to_vec(e),
        }
        .map_err(|source| CodecError::Encode { event_type, source })?;
        Ok((event_type, payload))
    }

    /// Decodes `payload` into a [`DomainEvent`] given its stored
    /// `event_type`. Unknown fields in `payload` are ignored by
    /// `serde_json`'s default behavior, so a reader on an older
    /// version of a payload shape still decodes a newer one.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownEventType`] if `event_type` was
    /// never registered, or [`CodecError::Decode`] if the payload does
    /// not match the shape that type expects.
    pub fn decode(&self, event_type: &str, payload: &[u8]) -> Result<DomainEvent, CodecError> {
        if !self.known.contains(event_type) {
            return Err(CodecError::UnknownEventType(event_type.to_string()));
        }
        let decode_err = |source| CodecError::Decode { event_type: event_type.to_string(), source };

        let is_vm_request = event_type.starts_with("VmRequest");
        if is_vm_request {
            let event: VmRequestEvent =
                serde_json::from_slice(payload).map_err(decode_err)?;
            Ok(DomainEvent::VmRequest(event))
        } else {
            let event: VmEvent = serde_json::from_slice(payload).map_err(decode_err)?;
            Ok(DomainEvent::Vm(event))
        }
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vmforge_types::{TenantId, UserId};

    #[test]
    fn round_trips_every_known_event_type() {
        let registry = CodecRegistry::new();
        let events = vec![
            DomainEvent::VmRequest(VmRequestEvent::Approved {
                decided_by: UserId::new_v4(),
                decided_at: Utc::now(),
            }),
            DomainEvent::VmRequest(VmRequestEvent::ProvisioningStarted),
            DomainEvent::Vm(VmEvent::ProvisioningProgressUpdated {
                stage: vmforge_types::Stage::Cloning,
            }),
        ];

        for event in events {
            let (event_type, payload) = registry.encode(&event).unwrap();
            let decoded = registry.decode(event_type, &payload).unwrap();
            assert_eq!(decoded, event);
        }
    }

    #[test]
    fn encoding_the_same_event_twice_is_byte_identical() {
        let registry = CodecRegistry::new();
        let event = DomainEvent::VmRequest(VmRequestEvent::Cancelled { cancelled_at: Utc::now() });
        let (_, a) = registry.encode(&event).unwrap();
        let (_, b) = registry.encode(&event).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn decoding_an_unregistered_event_type_fails_fast() {
        let registry = CodecRegistry::new();
        let err = registry.decode("SomethingMadeUp", b"{}").unwrap_err();
        assert!(matches!(err, CodecError::UnknownEventType(ref t) if t == "SomethingMadeUp"));
    }

    #[test]
    fn decoding_a_malformed_payload_for_a_known_type_fails() {
        let registry = CodecRegistry::new();
        let err = registry.decode("VmRequestApproved", b"not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }

    #[test]
    fn unknown_fields_in_the_payload_are_tolerated() {
        let registry = CodecRegistry::new();
        let payload = br#"{"ProvisioningProgressUpdated":{"stage":"CLONING","a_field_from_the_future":42}}"#;
        let decoded = registry.decode("VmProvisioningProgressUpdated", payload).unwrap();
        assert_eq!(
            decoded,
            DomainEvent::Vm(VmEvent::ProvisioningProgressUpdated { stage: vmforge_types::Stage::Cloning })
        );
    }

    #[test]
    fn every_known_event_type_is_reported_known() {
        let registry = CodecRegistry::new();
        for event_type in KNOWN_EVENT_TYPES {
            assert!(registry.is_known(event_type));
        }
        assert!(!registry.is_known("NotARealEvent"));
    }
}
