//! Hash-chain primitives: sealing and chain integrity verification.
//!
//! Seal input layout (each field length-prefixed, see `FieldHasher`):
//!   1. previous_hash  (64 ASCII hex chars)
//!   2. event_type     (wire name)
//!   3. event_payload  (canonical JSON text)
//!   4. timestamp      (RFC 3339, millisecond precision)
//!   5. actor_id
//!   6. nonce          (32 ASCII hex chars)

use serde::{Deserialize, Serialize};

use sealbook_contracts::error::{SealError, SealResult};
use sealbook_core::crypto::FieldHasher;

use crate::event::AuditEvent;

/// Compute the seal for one event's fields.
///
/// Returns a lowercase 64-character hex string.
pub fn hash_event(
    previous_hash: &str,
    event_type: &str,
    event_payload: &str,
    timestamp: &str,
    actor_id: &str,
    nonce: &str,
) -> String {
    FieldHasher::new()
        .field(previous_hash)
        .field(event_type)
        .field(event_payload)
        .field(timestamp)
        .field(actor_id)
        .field(nonce)
        .finish()
}

/// Recompute the seal of a stored event from its own fields.
pub fn reseal(event: &AuditEvent) -> String {
    hash_event(
        &event.previous_hash,
        &event.event_type,
        &event.event_payload,
        &event.timestamp,
        &event.actor_id,
        &event.nonce,
    )
}

/// Why verification stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ChainFault {
    /// `previous_hash` does not equal the predecessor's `current_hash`: an
    /// event was removed, reordered, or spliced in.
    BrokenLink { expected: String, found: String },
    /// The stored content no longer produces the stored seal.
    Tamper { stored: String, recomputed: String },
}

/// Result of walking a chain segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub valid: bool,
    /// Events examined, including the faulty one.
    pub events_checked: u64,
    /// Id of the first faulty event.
    pub broken_at: Option<i64>,
    pub fault: Option<ChainFault>,
    /// Events after the fault.  They cannot be trusted once a predecessor
    /// has failed.
    pub unverified: u64,
    /// `current_hash` of the last event that verified, or the anchor.
    pub verified_head: String,
}

impl ChainReport {
    /// Turn a failed report into the matching integrity error.
    pub fn into_result(self) -> SealResult<Self> {
        match (&self.fault, self.broken_at) {
            (None, _) => Ok(self),
            (Some(ChainFault::BrokenLink { expected, found }), Some(event_id)) => {
                Err(SealError::BrokenLink {
                    event_id,
                    expected: expected.clone(),
                    found: found.clone(),
                })
            }
            (Some(ChainFault::Tamper { .. }), Some(event_id)) => {
                Err(SealError::TamperDetected { event_id })
            }
            (Some(fault), None) => Err(SealError::IntegrityViolation {
                reason: format!("chain fault without position: {fault:?}"),
            }),
        }
    }
}

/// Verify a chain that starts at genesis.  An empty chain is valid.
pub fn verify_chain(events: &[AuditEvent]) -> ChainReport {
    verify_segment(events, AuditEvent::GENESIS_HASH)
}

/// Verify a contiguous segment whose first event must link to `anchor`.
///
/// Two rules per event, in order:
///
/// 1. **Link** — `previous_hash` equals the expected predecessor hash.
/// 2. **Seal** — `current_hash` equals the hash recomputed from the event's
///    own fields.
///
/// Stops at the first failure.  The expected pointer advances to the
/// *stored* `current_hash`, so rewriting one event's seal still breaks the
/// link of the next one unless every later seal is rewritten too.
pub fn verify_segment(events: &[AuditEvent], anchor: &str) -> ChainReport {
    let total = events.len() as u64;
    let mut expected = anchor.to_string();

    for (idx, event) in events.iter().enumerate() {
        let checked = idx as u64 + 1;

        let fault = if event.previous_hash != expected {
            Some(ChainFault::BrokenLink {
                expected: expected.clone(),
                found: event.previous_hash.clone(),
            })
        } else {
            let recomputed = reseal(event);
            if recomputed != event.current_hash {
                Some(ChainFault::Tamper {
                    stored: event.current_hash.clone(),
                    recomputed,
                })
            } else {
                None
            }
        };

        if let Some(fault) = fault {
            return ChainReport {
                valid: false,
                events_checked: checked,
                broken_at: Some(event.id),
                fault: Some(fault),
                unverified: total - checked,
                verified_head: expected,
            };
        }

        expected = event.current_hash.clone();
    }

    ChainReport {
        valid: true,
        events_checked: total,
        broken_at: None,
        fault: None,
        unverified: 0,
        verified_head: expected,
    }
}
