//! The sealed event row and the chain head.
//!
//! `AuditEvent` mirrors one row of `audit_events` exactly as stored.  The
//! `event_type` and `event_payload` are kept as the stored text so a
//! verifier hashes what is actually on disk, not a re-serialization of it.

use serde::{Deserialize, Serialize};

use sealbook_contracts::{
    error::SealResult,
    event::{EventPayload, EventType},
};

/// A single entry in the SHA-256 hash chain.
///
/// Each event commits to the previous one via `previous_hash`.  Modifying any
/// field invalidates `current_hash` and every later link, which the chain
/// verifier detects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Storage sequence, strictly increasing in append order.
    pub id: i64,

    /// `current_hash` of the preceding event, or `GENESIS_HASH`.
    pub previous_hash: String,

    /// SHA-256 (hex) over the six sealed fields, see `chain::hash_event`.
    pub current_hash: String,

    /// Wire name of the `EventType`.
    pub event_type: String,

    /// Canonical payload text, see `EventPayload::canonical`.
    pub event_payload: String,

    pub actor_id: String,

    /// RFC 3339 UTC, millisecond precision.  Never decreases along the chain.
    pub timestamp: String,

    /// 16 random bytes, hex.
    pub nonce: String,
}

impl AuditEvent {
    /// The sentinel `previous_hash` of the first event in every chain.
    ///
    /// 64 hex zeros, a value no real SHA-256 output is expected to take.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";

    pub fn kind(&self) -> SealResult<EventType> {
        self.event_type.parse()
    }

    /// Decode the stored payload into its typed shape.
    pub fn payload(&self) -> SealResult<EventPayload> {
        EventPayload::decode(self.kind()?, &self.event_payload)
    }
}

/// The most recently appended event, or genesis for an empty chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub hash: String,
    pub event_id: Option<i64>,
    pub timestamp: Option<String>,
}

impl ChainHead {
    pub fn genesis() -> Self {
        Self {
            hash: AuditEvent::GENESIS_HASH.to_string(),
            event_id: None,
            timestamp: None,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.event_id.is_none()
    }
}
