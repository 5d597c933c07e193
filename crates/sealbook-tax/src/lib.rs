//! # sealbook-tax
//!
//! Deterministic tax computation over configured jurisdictions, sealed
//! recording of computed tax against business documents, and period
//! reports with a reproducible checksum.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sealbook_tax::TaxEngine;
//!
//! let engine = TaxEngine::new(store);
//! let computation = engine.compute(Cents(155), "ca-on", as_of)?;
//! let recorded = engine.record(&TaxTransactionDraft { .. }, "clerk")?;
//! let report = engine.generate_period_report(&TaxPeriod::new(start, end)?)?;
//! println!("{}", sealbook_tax::report::to_csv(&report)?);
//! ```

pub mod config;
pub mod engine;
pub mod report;

pub use config::JurisdictionTable;
pub use engine::{tax_for, verification_hash, TaxEngine};
pub use report::{to_csv, to_json, verify_report};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use proptest::prelude::*;

    use sealbook_audit::Ledger;
    use sealbook_contracts::{
        error::SealError,
        event::{EventPayload, EventType},
        money::Cents,
        tax::{TaxJurisdiction, TaxPeriod, TaxTransaction, TaxTransactionDraft},
    };
    use sealbook_core::{crypto::sha256_hex, StorageResultExt, Store};

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn jurisdiction(code: &str, base: u32, surtax: u32) -> TaxJurisdiction {
        TaxJurisdiction {
            code: code.to_string(),
            display_name: format!("{code} sales tax"),
            base_rate_bps: base,
            surtax_rate_bps: surtax,
            effective_date: date(2024, 1, 1),
            expiry_date: Some(date(2024, 12, 31)),
            active: true,
        }
    }

    fn engine() -> (Arc<Store>, TaxEngine) {
        let store = Arc::new(Store::in_memory().unwrap());
        let engine = TaxEngine::new(store.clone());
        engine
            .seed(&[jurisdiction("CA-ON", 500, 200), jurisdiction("US-NY", 400, 0)])
            .unwrap();
        (store, engine)
    }

    fn count(store: &Store, table: &str) -> i64 {
        store
            .read(|conn| {
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                    .storage()
            })
            .unwrap()
    }

    fn record_at(
        engine: &TaxEngine,
        amount: i64,
        code: &str,
        document: &str,
        at: DateTime<Utc>,
    ) -> TaxTransaction {
        let computation = engine
            .compute(Cents(amount), code, at.date_naive())
            .unwrap();
        engine
            .record(
                &TaxTransactionDraft {
                    linked_document_id: document.to_string(),
                    computation,
                    transaction_date: at,
                },
                "clerk",
            )
            .unwrap()
    }

    fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    // ── Computation ───────────────────────────────────────────────────────────

    /// Half-up rounding on whole cents: 10.85 → 11, 7.00 → 7.
    #[test]
    fn test_rounding_reference_values() {
        let (_, engine) = engine();
        let as_of = date(2024, 3, 15);

        let c = engine.compute(Cents(155), "CA-ON", as_of).unwrap();
        assert_eq!(c.total_rate_bps, 700);
        assert_eq!(c.tax_amount, Cents(11));

        let c = engine.compute(Cents(100), "CA-ON", as_of).unwrap();
        assert_eq!(c.tax_amount, Cents(7));

        let c = engine.compute(Cents(0), "CA-ON", as_of).unwrap();
        assert_eq!(c.tax_amount, Cents::ZERO);
    }

    #[test]
    fn test_verification_hash_layout() {
        let (_, engine) = engine();
        let c = engine.compute(Cents(155), "CA-ON", date(2024, 3, 15)).unwrap();
        assert_eq!(c.verification_hash, sha256_hex(b"155|11|700|CA-ON|2024-03-15"));
        assert_eq!(
            c.verification_hash,
            verification_hash(Cents(155), Cents(11), 700, "CA-ON", date(2024, 3, 15))
        );
    }

    #[test]
    fn test_code_is_normalized() {
        let (_, engine) = engine();
        let c = engine.compute(Cents(1_000), "  ca-on ", date(2024, 3, 15)).unwrap();
        assert_eq!(c.jurisdiction_code, "CA-ON");
        assert_eq!(c.jurisdiction_name, "CA-ON sales tax");
    }

    /// Unknown and inactive codes are both "not found", and nothing is
    /// written.
    #[test]
    fn test_unknown_or_inactive_jurisdiction() {
        let (store, engine) = engine();
        let err = engine.compute(Cents(100), "XX-ZZ", date(2024, 3, 15)).unwrap_err();
        assert!(matches!(err, SealError::JurisdictionNotFound { ref code } if code == "XX-ZZ"));

        let mut closed = jurisdiction("US-NY", 400, 0);
        closed.active = false;
        engine.upsert_jurisdiction(closed).unwrap();
        let err = engine.compute(Cents(100), "US-NY", date(2024, 3, 15)).unwrap_err();
        assert!(matches!(err, SealError::JurisdictionNotFound { .. }));

        assert_eq!(count(&store, "tax_transactions"), 0);
        assert_eq!(count(&store, "audit_events"), 0);
    }

    /// Outside the rate window the current rates still apply, with a warning.
    #[test]
    fn test_out_of_window_date_warns() {
        let (_, engine) = engine();
        let c = engine.compute(Cents(100), "CA-ON", date(2025, 2, 1)).unwrap();
        assert_eq!(c.tax_amount, Cents(7));
        let warning = c.warning.unwrap();
        assert_eq!(warning.as_of_date, date(2025, 2, 1));
        assert_eq!(warning.expiry_date, Some(date(2024, 12, 31)));

        let c = engine.compute(Cents(100), "CA-ON", date(2024, 12, 31)).unwrap();
        assert!(c.warning.is_none());
    }

    #[test]
    fn test_negative_amount_rejected() {
        let (_, engine) = engine();
        let err = engine.compute(Cents(-1), "CA-ON", date(2024, 3, 15)).unwrap_err();
        assert!(matches!(err, SealError::InvalidAmount { .. }));
    }

    #[test]
    fn test_upsert_replaces_rates() {
        let (_, engine) = engine();
        engine.upsert_jurisdiction(jurisdiction("ca-on", 500, 800)).unwrap();
        let j = engine.jurisdiction("CA-ON").unwrap();
        assert_eq!(j.total_rate_bps(), 1_300);
        assert!(engine.jurisdiction("nowhere").is_err());
    }

    // ── Recording ─────────────────────────────────────────────────────────────

    #[test]
    fn test_record_persists_and_seals() {
        let (store, engine) = engine();
        let tx = record_at(&engine, 155, "CA-ON", "INV-1001", noon(2024, 3, 15));

        assert_eq!(tx.id, 1);
        assert_eq!(tx.tax_amount_cents, Cents(11));
        assert_eq!(tx.effective_rate_bps, 700);
        assert_eq!(count(&store, "tax_transactions"), 1);

        let events = Ledger::new(store).events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, tx.audit_event_id);
        match events[0].payload().unwrap() {
            EventPayload::TaxComputed(p) => {
                assert_eq!(p.transaction_id, tx.id);
                assert_eq!(p.linked_document_id, "INV-1001");
                assert_eq!(p.verification_hash, tx.verification_hash);
            }
            other => panic!("expected TaxComputed, got {:?}", other),
        }
    }

    /// An edited computation is refused before anything is written.
    #[test]
    fn test_record_rejects_altered_computation() {
        let (store, engine) = engine();
        let mut computation = engine.compute(Cents(155), "CA-ON", date(2024, 3, 15)).unwrap();
        computation.tax_amount = Cents(10);

        let err = engine
            .record(
                &TaxTransactionDraft {
                    linked_document_id: "INV-1".to_string(),
                    computation,
                    transaction_date: noon(2024, 3, 15),
                },
                "clerk",
            )
            .unwrap_err();
        assert!(matches!(err, SealError::IntegrityViolation { .. }));
        assert_eq!(count(&store, "tax_transactions"), 0);
        assert_eq!(count(&store, "audit_events"), 0);
    }

    /// A self-consistent computation is still checked against the stored
    /// jurisdiction: a made-up rate or an unknown code writes nothing.
    #[test]
    fn test_record_rejects_forged_rates_and_unknown_codes() {
        let (store, engine) = engine();
        let as_of = date(2024, 3, 15);
        let mut computation = engine.compute(Cents(15_500), "CA-ON", as_of).unwrap();
        computation.base_rate_bps = 0;
        computation.surtax_rate_bps = 0;
        computation.total_rate_bps = 0;
        computation.tax_amount = Cents(0);
        computation.verification_hash = verification_hash(Cents(15_500), Cents(0), 0, "CA-ON", as_of);

        let draft = |computation| TaxTransactionDraft {
            linked_document_id: "INV-1".to_string(),
            computation,
            transaction_date: noon(2024, 3, 15),
        };

        let err = engine.record(&draft(computation.clone()), "clerk").unwrap_err();
        assert!(matches!(err, SealError::IntegrityViolation { .. }), "{err:?}");

        computation.jurisdiction_code = "ZZ-NOPE".to_string();
        computation.verification_hash = verification_hash(Cents(15_500), Cents(0), 0, "ZZ-NOPE", as_of);
        let err = engine.record(&draft(computation), "clerk").unwrap_err();
        assert!(matches!(err, SealError::JurisdictionNotFound { .. }), "{err:?}");

        assert_eq!(count(&store, "tax_transactions"), 0);
        assert_eq!(count(&store, "audit_events"), 0);
    }

    #[test]
    fn test_recorded_transactions_are_immutable() {
        let (store, engine) = engine();
        record_at(&engine, 155, "CA-ON", "INV-1", noon(2024, 3, 15));
        let err = store
            .write(|tx| {
                tx.execute("UPDATE tax_transactions SET tax_amount_cents = 0", [])
                    .storage()
            })
            .unwrap_err();
        assert!(matches!(err, SealError::AppendOnly { .. }));
    }

    // ── Reports ───────────────────────────────────────────────────────────────

    /// The last millisecond of the period is in; the first of the next is out.
    #[test]
    fn test_period_boundaries() {
        let (_, engine) = engine();
        let last_ms = Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap()
            + chrono::Duration::milliseconds(999);
        let first_ms = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let opening = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        record_at(&engine, 1_000, "CA-ON", "INV-open", opening);
        record_at(&engine, 1_000, "CA-ON", "INV-last", last_ms);
        record_at(&engine, 1_000, "CA-ON", "INV-next", first_ms);

        let q1 = TaxPeriod::new(date(2024, 1, 1), date(2024, 3, 31)).unwrap();
        let report = engine.generate_period_report(&q1).unwrap();
        let documents: Vec<&str> = report
            .transactions
            .iter()
            .map(|t| t.linked_document_id.as_str())
            .collect();
        assert_eq!(documents, vec!["INV-open", "INV-last"]);

        let q2 = TaxPeriod::new(date(2024, 4, 1), date(2024, 6, 30)).unwrap();
        let report = engine.generate_period_report(&q2).unwrap();
        assert_eq!(report.totals.transaction_count, 1);
        assert_eq!(report.transactions[0].linked_document_id, "INV-next");
    }

    #[test]
    fn test_report_breakdown_and_totals() {
        let (_, engine) = engine();
        record_at(&engine, 155, "US-NY", "INV-1", noon(2024, 2, 1));
        record_at(&engine, 155, "CA-ON", "INV-2", noon(2024, 2, 2));
        record_at(&engine, 100, "CA-ON", "INV-3", noon(2024, 2, 3));

        let period = TaxPeriod::new(date(2024, 2, 1), date(2024, 2, 29)).unwrap();
        let report = engine.generate_period_report(&period).unwrap();

        let codes: Vec<&str> = report
            .breakdown
            .iter()
            .map(|b| b.jurisdiction_code.as_str())
            .collect();
        assert_eq!(codes, vec!["CA-ON", "US-NY"], "breakdown sorted by code");

        assert_eq!(report.breakdown[0].transaction_count, 2);
        assert_eq!(report.breakdown[0].taxable_amount, Cents(255));
        assert_eq!(report.breakdown[0].tax_amount, Cents(18));
        assert_eq!(report.breakdown[1].tax_amount, Cents(6));

        assert_eq!(report.totals.transaction_count, 3);
        assert_eq!(report.totals.taxable_amount, Cents(410));
        assert_eq!(report.totals.tax_amount, Cents(24));
    }

    /// Two runs over the same data share a checksum; editing a figure breaks
    /// it.
    #[test]
    fn test_report_checksum_is_reproducible() {
        let (_, engine) = engine();
        record_at(&engine, 155, "CA-ON", "INV-1", noon(2024, 2, 1));
        let period = TaxPeriod::new(date(2024, 2, 1), date(2024, 2, 29)).unwrap();

        let a = engine.generate_period_report(&period).unwrap();
        let b = engine.generate_period_report(&period).unwrap();
        assert_ne!(a.report_id, b.report_id);
        assert_eq!(a.checksum, b.checksum);
        assert!(verify_report(&a).unwrap());

        let mut edited = a.clone();
        edited.totals.tax_amount = Cents(1);
        assert!(!verify_report(&edited).unwrap());
    }

    /// The exported transaction lines are covered by the checksum too.
    #[test]
    fn test_report_checksum_covers_transaction_lines() {
        let (_, engine) = engine();
        record_at(&engine, 155, "CA-ON", "INV-1", noon(2024, 2, 1));
        let period = TaxPeriod::new(date(2024, 2, 1), date(2024, 2, 29)).unwrap();
        let report = engine.generate_period_report(&period).unwrap();

        let mut edited = report.clone();
        edited.transactions[0].tax_amount = Cents(0);
        assert!(!verify_report(&edited).unwrap());

        let mut edited = report.clone();
        edited.transactions[0].linked_document_id = "INV-FAKE".to_string();
        assert!(!verify_report(&edited).unwrap());

        let mut edited = report;
        edited.transactions[0].transaction_date = "2024-02-02T12:00:00.000Z".to_string();
        assert!(!verify_report(&edited).unwrap());
    }

    #[test]
    fn test_exports_embed_checksum_and_hashes() {
        let (_, engine) = engine();
        let t1 = record_at(&engine, 155, "CA-ON", "INV-1", noon(2024, 2, 1));
        let t2 = record_at(&engine, 999, "US-NY", "INV-2", noon(2024, 2, 2));
        let period = TaxPeriod::new(date(2024, 2, 1), date(2024, 2, 29)).unwrap();
        let report = engine.generate_period_report(&period).unwrap();

        let json = to_json(&report).unwrap();
        assert!(json.contains(&report.checksum));
        assert!(json.contains(&t1.verification_hash));

        let csv = to_csv(&report).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert!(lines[0].starts_with("kind,period,transaction_id"));
        assert_eq!(lines.len(), 1 + 2 + 2 + 1);
        assert!(csv.contains(&t1.verification_hash));
        assert!(csv.contains(&t2.verification_hash));
        assert!(lines[5].starts_with("total,2024-02-01..2024-02-29"));
        assert!(lines[5].ends_with(&report.checksum));

        assert_eq!(to_csv(&report).unwrap(), csv, "csv export is stable");
    }

    #[test]
    fn test_persist_and_load_report() {
        let (store, engine) = engine();
        record_at(&engine, 155, "CA-ON", "INV-1", noon(2024, 2, 1));
        let period = TaxPeriod::new(date(2024, 2, 1), date(2024, 2, 29)).unwrap();
        let report = engine.generate_period_report(&period).unwrap();

        let event_id = engine.persist_report(&report, "controller").unwrap();
        let events = Ledger::new(store).events().unwrap();
        let sealed = events.iter().find(|e| e.id == event_id).unwrap();
        assert_eq!(sealed.kind().unwrap(), EventType::ReportGenerated);
        assert!(sealed.event_payload.contains(&report.checksum));

        assert_eq!(engine.load_report(report.report_id).unwrap(), report);

        // Persisting the same report id twice is refused.
        assert!(engine.persist_report(&report, "controller").is_err());
    }

    #[test]
    fn test_persist_refuses_inconsistent_report() {
        let (store, engine) = engine();
        let period = TaxPeriod::new(date(2024, 2, 1), date(2024, 2, 29)).unwrap();
        let mut report = engine.generate_period_report(&period).unwrap();
        report.totals.transaction_count = 7;

        let err = engine.persist_report(&report, "controller").unwrap_err();
        assert!(matches!(err, SealError::IntegrityViolation { .. }));
        assert_eq!(count(&store, "tax_reports"), 0);
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    #[test]
    fn test_jurisdiction_table_from_toml() {
        let table = JurisdictionTable::from_toml_str(
            r#"
            [[jurisdictions]]
            code = "ca-on"
            display_name = "Ontario HST"
            base_rate_bps = 500
            surtax_rate_bps = 800
            effective_date = "2024-01-01"

            [[jurisdictions]]
            code = "US-NY"
            display_name = "New York"
            base_rate_bps = 400
            effective_date = "2024-01-01"
            expiry_date = "2024-12-31"
            active = false
            "#,
        )
        .unwrap();

        assert_eq!(table.jurisdictions.len(), 2);
        assert_eq!(table.jurisdictions[0].code, "CA-ON");
        assert!(table.jurisdictions[0].active);
        assert_eq!(table.jurisdictions[1].surtax_rate_bps, 0);
        assert!(!table.jurisdictions[1].active);
    }

    #[test]
    fn test_jurisdiction_table_rejects_bad_rows() {
        let negative = r#"
            [[jurisdictions]]
            code = "X"
            display_name = "X"
            base_rate_bps = -5
            effective_date = "2024-01-01"
        "#;
        assert!(matches!(
            JurisdictionTable::from_toml_str(negative).unwrap_err(),
            SealError::ConfigError { .. }
        ));

        let inverted = r#"
            [[jurisdictions]]
            code = "X"
            display_name = "X"
            base_rate_bps = 5
            effective_date = "2024-06-01"
            expiry_date = "2024-01-01"
        "#;
        assert!(matches!(
            JurisdictionTable::from_toml_str(inverted).unwrap_err(),
            SealError::ConfigError { .. }
        ));

        let duplicate = r#"
            [[jurisdictions]]
            code = "X"
            display_name = "X"
            base_rate_bps = 5
            effective_date = "2024-01-01"

            [[jurisdictions]]
            code = "x"
            display_name = "Again"
            base_rate_bps = 6
            effective_date = "2024-01-01"
        "#;
        assert!(matches!(
            JurisdictionTable::from_toml_str(duplicate).unwrap_err(),
            SealError::ConfigError { .. }
        ));
    }

    // ── Properties ────────────────────────────────────────────────────────────

    proptest! {
        /// Matches the reference formula, and rounding moves the result by at
        /// most half a cent.
        #[test]
        fn prop_tax_matches_reference(amount in 0i64..1_000_000_000_000_000, rate in 0u32..100_000) {
            let tax = tax_for(Cents(amount), rate).unwrap();
            let exact = i128::from(amount) * i128::from(rate);
            let reference = (exact + 5_000) / 10_000;
            prop_assert_eq!(i128::from(tax.value()), reference);

            let diff = i128::from(tax.value()) * 10_000 - exact;
            prop_assert!(diff > -5_000 && diff <= 5_000);
        }
    }
}
