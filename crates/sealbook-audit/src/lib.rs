//! # sealbook-audit
//!
//! Immutable, append-only, SHA-256 hash-chained ledger for Sealbook.
//!
//! ## Overview
//!
//! Every accounting event (journal posting, recorded tax, persisted report,
//! backup, verification run) is sealed into an `AuditEvent` that links to its
//! predecessor by hash.  Changing any stored byte of any event breaks the
//! chain from that point on, and `verify_chain` reports where.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sealbook_audit::{ledger, Ledger, VerifyScope};
//!
//! // Inside another component's write transaction:
//! store.write(|tx| {
//!     insert_business_rows(tx)?;
//!     ledger::append(tx, &payload, "operator")?;
//!     Ok(())
//! })?;
//!
//! let report = Ledger::new(store).verify(&VerifyScope::Full)?;
//! assert!(report.valid);
//! ```

pub mod chain;
pub mod event;
pub mod ledger;

pub use chain::{hash_event, reseal, verify_chain, verify_segment, ChainFault, ChainReport};
pub use event::{AuditEvent, ChainHead};
pub use ledger::{Ledger, VerifyScope};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use sealbook_contracts::{
        error::SealError,
        event::{EntryPosted, EventPayload, EventType},
    };
    use sealbook_core::{schema, StorageResultExt, Store};

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// A distinguishable payload for event `n`.
    fn payload(n: usize) -> EventPayload {
        EventPayload::EntryPosted(EntryPosted {
            entry_number: format!("JE-{n:06}"),
            data_hash: format!("{n:064x}"),
            transaction_date: "2024-03-01T09:00:00.000Z".to_string(),
        })
    }

    fn ledger_with(n: usize) -> (Arc<Store>, Ledger) {
        let store = Arc::new(Store::in_memory().unwrap());
        let ledger = Ledger::new(store.clone());
        for i in 0..n {
            ledger.append(&payload(i), "tester").unwrap();
        }
        (store, ledger)
    }

    /// Rewrite one column of one stored event, as an attacker with raw file
    /// access would.
    fn tamper_stored(store: &Store, id: i64, column: &str, value: &str) {
        store
            .write(|tx| {
                schema::drop_guards(tx)?;
                tx.execute(
                    &format!("UPDATE audit_events SET {column} = ?1 WHERE id = ?2"),
                    rusqlite::params![value, id],
                )
                .storage()?;
                schema::install_guards(tx)
            })
            .unwrap();
    }

    // ── Chain construction ────────────────────────────────────────────────────

    /// Appending three events and verifying produces a valid chain.
    #[test]
    fn test_hash_chain_integrity() {
        let (_, ledger) = ledger_with(3);
        let report = ledger.verify(&VerifyScope::Full).unwrap();
        assert!(report.valid, "chain must be valid after sequential appends");
        assert_eq!(report.events_checked, 3);
        assert_eq!(report.verified_head, ledger.head().unwrap().hash);
    }

    /// The first event's `previous_hash` must equal `GENESIS_HASH`.
    #[test]
    fn test_genesis_hash() {
        let (_, ledger) = ledger_with(1);
        let events = ledger.events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].previous_hash,
            AuditEvent::GENESIS_HASH,
            "first event must link to the genesis sentinel hash"
        );
    }

    /// Each event links to its predecessor, and timestamps never go back.
    #[test]
    fn test_links_and_monotonic_timestamps() {
        let (_, ledger) = ledger_with(5);
        let events = ledger.events().unwrap();
        for pair in events.windows(2) {
            assert_eq!(pair[1].previous_hash, pair[0].current_hash);
            assert!(pair[1].timestamp >= pair[0].timestamp);
            assert!(pair[1].id > pair[0].id);
        }
    }

    /// Nonces are fresh per event even for identical payloads.
    #[test]
    fn test_identical_payloads_get_distinct_seals() {
        let store = Arc::new(Store::in_memory().unwrap());
        let ledger = Ledger::new(store);
        let a = ledger.append(&payload(7), "tester").unwrap();
        let b = ledger.append(&payload(7), "tester").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.current_hash, b.current_hash);
    }

    #[test]
    fn test_stored_payload_decodes_to_typed_shape() {
        let (_, ledger) = ledger_with(1);
        let event = &ledger.events().unwrap()[0];
        assert_eq!(event.kind().unwrap(), EventType::EntryPosted);
        assert_eq!(event.payload().unwrap(), payload(0));
    }

    /// An empty chain is trivially valid.
    #[test]
    fn test_verify_empty() {
        let (_, ledger) = ledger_with(0);
        assert!(ledger.verify(&VerifyScope::Full).unwrap().valid);
        assert!(ledger.head().unwrap().is_genesis());
        assert!(verify_chain(&[]).valid, "verify_chain on empty slice must be valid");
    }

    // ── Suffix verification ───────────────────────────────────────────────────

    /// A suffix verified from a captured mid-chain hash passes on its own.
    #[test]
    fn test_verify_since_anchor() {
        let (_, ledger) = ledger_with(3);
        let anchor = ledger.head().unwrap().hash;
        for i in 3..6 {
            ledger.append(&payload(i), "tester").unwrap();
        }

        let report = ledger
            .verify(&VerifyScope::Since {
                anchor_hash: anchor.clone(),
            })
            .unwrap();
        assert!(report.valid);
        assert_eq!(report.events_checked, 3);

        // The same suffix does not verify from genesis.
        let events = ledger.events().unwrap();
        assert!(!verify_chain(&events[3..]).valid);
        assert!(verify_segment(&events[3..], &anchor).valid);
    }

    #[test]
    fn test_verify_since_unknown_anchor_is_not_found() {
        let (_, ledger) = ledger_with(2);
        let err = ledger
            .verify(&VerifyScope::Since {
                anchor_hash: "f".repeat(64),
            })
            .unwrap_err();
        assert!(matches!(err, SealError::NotFound { .. }));
    }

    // ── Tamper detection ──────────────────────────────────────────────────────

    /// Changing any sealed field of a stored event is reported as tamper at
    /// that event; every later event is unverified.
    #[test]
    fn test_tamper_each_field_detected() {
        for column in ["event_payload", "timestamp", "actor_id", "nonce", "event_type"] {
            let (store, ledger) = ledger_with(5);
            let target = ledger.events().unwrap()[1].id;
            tamper_stored(&store, target, column, "TAMPERED");

            let report = ledger.verify(&VerifyScope::Full).unwrap();
            assert!(!report.valid, "tampered {column} must be detected");
            assert_eq!(report.broken_at, Some(target), "column {column}");
            assert!(matches!(report.fault, Some(ChainFault::Tamper { .. })));
            assert_eq!(report.unverified, 3);
        }
    }

    /// Removing an event from the middle breaks the next link.
    #[test]
    fn test_deleted_event_breaks_link() {
        let (_, ledger) = ledger_with(4);
        let mut events = ledger.events().unwrap();
        let removed = events.remove(1);

        let report = verify_chain(&events);
        assert!(!report.valid);
        assert_eq!(report.broken_at, Some(events[1].id));
        match report.fault {
            Some(ChainFault::BrokenLink { found, .. }) => assert_eq!(found, removed.current_hash),
            other => panic!("expected BrokenLink, got {:?}", other),
        }
    }

    /// Resealing an edited event hides it locally but breaks the successor.
    #[test]
    fn test_consistent_rewrite_breaks_successor() {
        let (_, ledger) = ledger_with(4);
        let mut events = ledger.events().unwrap();
        events[1].actor_id = "mallory".to_string();
        events[1].current_hash = reseal(&events[1]);

        let report = verify_chain(&events);
        assert_eq!(report.broken_at, Some(events[2].id));
        assert!(matches!(report.fault, Some(ChainFault::BrokenLink { .. })));
        assert_eq!(report.unverified, 1);
    }

    #[test]
    fn test_report_into_result_maps_faults() {
        let (_, ledger) = ledger_with(3);
        let mut events = ledger.events().unwrap();
        events[0].event_payload.push(' ');
        let err = verify_chain(&events).into_result().unwrap_err();
        assert!(matches!(err, SealError::TamperDetected { event_id } if event_id == events[0].id));

        events.remove(0);
        let err = verify_chain(&events).into_result().unwrap_err();
        assert!(matches!(err, SealError::BrokenLink { .. }));
    }

    // ── Audit runs ────────────────────────────────────────────────────────────

    /// `audit` seals its own outcome onto the chain.
    #[test]
    fn test_audit_records_verification_run() {
        let (_, ledger) = ledger_with(2);
        let report = ledger.audit(&VerifyScope::Full, "auditor").unwrap();
        assert!(report.valid);

        let events = ledger.events().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.kind().unwrap(), EventType::VerificationRun);
        assert_eq!(last.actor_id, "auditor");
        assert!(ledger.verify(&VerifyScope::Full).unwrap().valid);
    }

    // ── Properties ────────────────────────────────────────────────────────────

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// For any N ≥ 0 appended events the full chain verifies, and so
        /// does every suffix anchored at a captured mid-chain hash.
        #[test]
        fn prop_any_chain_and_suffix_verifies(n in 0usize..24, cut in 0usize..24) {
            let (_, ledger) = ledger_with(n);
            let events = ledger.events().unwrap();
            prop_assert!(verify_chain(&events).valid);

            if n > 0 {
                let cut = cut % n;
                let anchor = events[cut].current_hash.clone();
                prop_assert!(verify_segment(&events[cut + 1..], &anchor).valid);
            }
        }

        /// Mutating one field of one event pins the fault to that event.
        #[test]
        fn prop_single_mutation_is_located(n in 1usize..16, pick in 0usize..16, field in 0u8..4) {
            let (_, ledger) = ledger_with(n);
            let mut events = ledger.events().unwrap();
            let idx = pick % n;
            match field {
                0 => events[idx].event_payload.push('x'),
                1 => events[idx].timestamp.push('x'),
                2 => events[idx].actor_id.push('x'),
                _ => events[idx].nonce.push('x'),
            }

            let report = verify_chain(&events);
            prop_assert!(!report.valid);
            prop_assert_eq!(report.broken_at, Some(events[idx].id));
            prop_assert_eq!(report.unverified, (n - idx - 1) as u64);
        }
    }
}
