//! Tax computation and recording.
//!
//! `compute` is pure arithmetic over a looked-up jurisdiction.  `record`
//! persists a computation and seals it, in one transaction.
//!
//! Rounding is half-up on whole cents:
//!
//! ```text
//! tax = floor((amount × rate_bps + 5000) / 10000)
//! ```
//!
//! evaluated in `i128`, so no `i64` amount and `u32` rate can overflow.

use std::sync::Arc;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use sealbook_audit::ledger;
use sealbook_contracts::{
    error::{SealError, SealResult},
    event::{EventPayload, TaxComputed},
    money::Cents,
    tax::{
        RateWindowWarning, TaxComputation, TaxJurisdiction, TaxPeriod, TaxReport, TaxTransaction,
        TaxTransactionDraft,
    },
    time::{format_date, format_timestamp, parse_date, parse_timestamp},
};
use sealbook_core::{crypto::sha256_hex, StorageResultExt, Store};
use uuid::Uuid;

use crate::{
    config::{normalize_code, validate_jurisdiction},
    report,
};

const BPS_DENOMINATOR: i128 = 10_000;
const HALF_UP: i128 = 5_000;

// ── Arithmetic ────────────────────────────────────────────────────────────────

/// Tax on `amount` at `rate_bps`, rounded half-up to the cent.
pub fn tax_for(amount: Cents, rate_bps: u32) -> SealResult<Cents> {
    if amount.is_negative() {
        return Err(SealError::InvalidAmount {
            reason: format!("taxable amount must not be negative, got {amount}"),
        });
    }
    let tax = (i128::from(amount.value()) * i128::from(rate_bps) + HALF_UP) / BPS_DENOMINATOR;
    i64::try_from(tax)
        .map(Cents)
        .map_err(|_| SealError::InvalidAmount {
            reason: format!("tax on {amount} at {rate_bps} bps exceeds the representable range"),
        })
}

/// `SHA256("amount|tax|rate|CODE|YYYY-MM-DD")`, amounts in cents.
pub fn verification_hash(
    amount: Cents,
    tax: Cents,
    rate_bps: u32,
    code: &str,
    as_of_date: NaiveDate,
) -> String {
    let input = format!(
        "{}|{}|{}|{}|{}",
        amount.value(),
        tax.value(),
        rate_bps,
        code,
        format_date(&as_of_date)
    );
    sha256_hex(input.as_bytes())
}

// ── Row mapping ───────────────────────────────────────────────────────────────

const JURISDICTION_COLUMNS: &str =
    "code, display_name, base_rate_bps, surtax_rate_bps, effective_date, expiry_date, active";

struct JurisdictionRow {
    code: String,
    display_name: String,
    base_rate_bps: u32,
    surtax_rate_bps: u32,
    effective_date: String,
    expiry_date: Option<String>,
    active: bool,
}

impl JurisdictionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            code: row.get(0)?,
            display_name: row.get(1)?,
            base_rate_bps: row.get(2)?,
            surtax_rate_bps: row.get(3)?,
            effective_date: row.get(4)?,
            expiry_date: row.get(5)?,
            active: row.get(6)?,
        })
    }

    fn into_jurisdiction(self) -> SealResult<TaxJurisdiction> {
        Ok(TaxJurisdiction {
            effective_date: parse_date(&self.effective_date)?,
            expiry_date: self.expiry_date.as_deref().map(parse_date).transpose()?,
            code: self.code,
            display_name: self.display_name,
            base_rate_bps: self.base_rate_bps,
            surtax_rate_bps: self.surtax_rate_bps,
            active: self.active,
        })
    }
}

pub fn find_jurisdiction(conn: &Connection, code: &str) -> SealResult<Option<TaxJurisdiction>> {
    conn.query_row(
        &format!("SELECT {JURISDICTION_COLUMNS} FROM tax_jurisdictions WHERE code = ?1"),
        params![normalize_code(code)],
        JurisdictionRow::from_row,
    )
    .optional()
    .storage()?
    .map(JurisdictionRow::into_jurisdiction)
    .transpose()
}

pub fn upsert_in(conn: &Connection, jurisdiction: &TaxJurisdiction) -> SealResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO tax_jurisdictions ({JURISDICTION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(code) DO UPDATE SET
                display_name = excluded.display_name,
                base_rate_bps = excluded.base_rate_bps,
                surtax_rate_bps = excluded.surtax_rate_bps,
                effective_date = excluded.effective_date,
                expiry_date = excluded.expiry_date,
                active = excluded.active"
        ),
        params![
            jurisdiction.code,
            jurisdiction.display_name,
            jurisdiction.base_rate_bps,
            jurisdiction.surtax_rate_bps,
            format_date(&jurisdiction.effective_date),
            jurisdiction.expiry_date.as_ref().map(format_date),
            jurisdiction.active
        ],
    )
    .storage()?;
    Ok(())
}

const TRANSACTION_COLUMNS: &str = "id, linked_document_id, jurisdiction_code, \
     taxable_amount_cents, tax_amount_cents, effective_rate_bps, as_of_date, \
     transaction_date, verification_hash, audit_event_id";

/// Transactions whose `transaction_date` lies inside `period`, both ends
/// inclusive, in date order.
pub fn transactions_in(conn: &Connection, period: &TaxPeriod) -> SealResult<Vec<TaxTransaction>> {
    let (start, end) = period.bounds();
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM tax_transactions
             WHERE transaction_date >= ?1 AND transaction_date <= ?2
             ORDER BY transaction_date, id"
        ))
        .storage()?;
    let rows = stmt
        .query_map(
            params![format_timestamp(&start), format_timestamp(&end)],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, u32>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, i64>(9)?,
                ))
            },
        )
        .storage()?
        .collect::<Result<Vec<_>, _>>()
        .storage()?;

    rows.into_iter()
        .map(
            |(id, document, code, taxable, tax, rate, as_of, date, hash, event_id)| {
                Ok(TaxTransaction {
                    id,
                    linked_document_id: document,
                    jurisdiction_code: code,
                    taxable_amount_cents: Cents(taxable),
                    tax_amount_cents: Cents(tax),
                    effective_rate_bps: rate,
                    as_of_date: parse_date(&as_of)?,
                    transaction_date: parse_timestamp(&date)?,
                    verification_hash: hash,
                    audit_event_id: event_id,
                })
            },
        )
        .collect()
}

// ── Operations bound to a connection ──────────────────────────────────────────

pub fn compute_in(
    conn: &Connection,
    amount: Cents,
    jurisdiction_code: &str,
    as_of_date: NaiveDate,
) -> SealResult<TaxComputation> {
    let code = normalize_code(jurisdiction_code);
    let jurisdiction = find_jurisdiction(conn, &code)?
        .filter(|j| j.active)
        .ok_or_else(|| SealError::JurisdictionNotFound { code: code.clone() })?;

    let warning = (!jurisdiction.in_effect_on(as_of_date)).then(|| {
        let window = match jurisdiction.expiry_date {
            Some(expiry) => format!("{} to {expiry}", jurisdiction.effective_date),
            None => format!("from {}", jurisdiction.effective_date),
        };
        warn!(
            jurisdiction = %code,
            as_of_date = %as_of_date,
            window = %window,
            "tax date outside the jurisdiction's rate window; applying current rates"
        );
        RateWindowWarning {
            as_of_date,
            effective_date: jurisdiction.effective_date,
            expiry_date: jurisdiction.expiry_date,
            message: format!(
                "{as_of_date} is outside the {code} rate window ({window}); current rates applied"
            ),
        }
    });

    let total_rate_bps = jurisdiction.total_rate_bps();
    let tax_amount = tax_for(amount, total_rate_bps)?;

    Ok(TaxComputation {
        taxable_amount: amount,
        tax_amount,
        base_rate_bps: jurisdiction.base_rate_bps,
        surtax_rate_bps: jurisdiction.surtax_rate_bps,
        total_rate_bps,
        verification_hash: verification_hash(amount, tax_amount, total_rate_bps, &code, as_of_date),
        jurisdiction_code: code,
        jurisdiction_name: jurisdiction.display_name,
        as_of_date,
        warning,
    })
}

/// Recompute against the stored jurisdiction and reject the computation if
/// any rate, amount, or hash differs.
fn check_computation(conn: &Connection, computation: &TaxComputation) -> SealResult<()> {
    let expected = compute_in(
        conn,
        computation.taxable_amount,
        &computation.jurisdiction_code,
        computation.as_of_date,
    )?;

    if expected.jurisdiction_code != computation.jurisdiction_code
        || expected.base_rate_bps != computation.base_rate_bps
        || expected.surtax_rate_bps != computation.surtax_rate_bps
        || expected.total_rate_bps != computation.total_rate_bps
        || expected.tax_amount != computation.tax_amount
        || expected.verification_hash != computation.verification_hash
    {
        return Err(SealError::IntegrityViolation {
            reason: format!(
                "tax computation for {} does not match the stored jurisdiction rates",
                computation.jurisdiction_code
            ),
        });
    }
    Ok(())
}

pub fn record_in(
    conn: &Connection,
    draft: &TaxTransactionDraft,
    actor_id: &str,
) -> SealResult<TaxTransaction> {
    if draft.linked_document_id.trim().is_empty() {
        return Err(SealError::InvalidInput {
            reason: "tax transaction needs a linked document id".to_string(),
        });
    }
    let computation = &draft.computation;
    check_computation(conn, computation)?;

    let id: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(id), 0) + 1 FROM tax_transactions",
            [],
            |row| row.get(0),
        )
        .storage()?;

    let event = ledger::append(
        conn,
        &EventPayload::TaxComputed(TaxComputed {
            transaction_id: id,
            linked_document_id: draft.linked_document_id.clone(),
            jurisdiction_code: computation.jurisdiction_code.clone(),
            tax_amount_cents: computation.tax_amount,
            verification_hash: computation.verification_hash.clone(),
        }),
        actor_id,
    )?;

    let transaction_date = format_timestamp(&draft.transaction_date);
    conn.execute(
        &format!(
            "INSERT INTO tax_transactions ({TRANSACTION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ),
        params![
            id,
            draft.linked_document_id,
            computation.jurisdiction_code,
            computation.taxable_amount.value(),
            computation.tax_amount.value(),
            computation.total_rate_bps,
            format_date(&computation.as_of_date),
            transaction_date,
            computation.verification_hash,
            event.id
        ],
    )
    .storage()?;

    Ok(TaxTransaction {
        id,
        linked_document_id: draft.linked_document_id.clone(),
        jurisdiction_code: computation.jurisdiction_code.clone(),
        taxable_amount_cents: computation.taxable_amount,
        tax_amount_cents: computation.tax_amount,
        effective_rate_bps: computation.total_rate_bps,
        as_of_date: computation.as_of_date,
        transaction_date: parse_timestamp(&transaction_date)?,
        verification_hash: computation.verification_hash.clone(),
        audit_event_id: event.id,
    })
}

// ── Service ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct TaxEngine {
    store: Arc<Store>,
}

impl TaxEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Insert or replace a jurisdiction.
    pub fn upsert_jurisdiction(&self, jurisdiction: TaxJurisdiction) -> SealResult<TaxJurisdiction> {
        let jurisdiction = validate_jurisdiction(jurisdiction)?;
        self.store.write(|tx| upsert_in(tx, &jurisdiction))?;
        info!(
            code = %jurisdiction.code,
            total_rate_bps = jurisdiction.total_rate_bps(),
            active = jurisdiction.active,
            "jurisdiction upserted"
        );
        Ok(jurisdiction)
    }

    /// Upsert every row in one transaction.
    pub fn seed(&self, jurisdictions: &[TaxJurisdiction]) -> SealResult<usize> {
        let rows = jurisdictions
            .iter()
            .cloned()
            .map(validate_jurisdiction)
            .collect::<SealResult<Vec<_>>>()?;
        self.store.write(|tx| {
            for row in &rows {
                upsert_in(tx, row)?;
            }
            Ok(())
        })?;
        debug!(count = rows.len(), "jurisdictions seeded");
        Ok(rows.len())
    }

    pub fn jurisdiction(&self, code: &str) -> SealResult<TaxJurisdiction> {
        self.store
            .read(|conn| find_jurisdiction(conn, code))?
            .ok_or_else(|| SealError::JurisdictionNotFound {
                code: normalize_code(code),
            })
    }

    /// Compute without persisting anything.
    pub fn compute(
        &self,
        amount: Cents,
        jurisdiction_code: &str,
        as_of_date: NaiveDate,
    ) -> SealResult<TaxComputation> {
        let computation = self
            .store
            .read(|conn| compute_in(conn, amount, jurisdiction_code, as_of_date))?;
        debug!(
            jurisdiction = %computation.jurisdiction_code,
            amount = %computation.taxable_amount,
            tax = %computation.tax_amount,
            rate_bps = computation.total_rate_bps,
            "tax computed"
        );
        Ok(computation)
    }

    /// Persist a computation against a business document and seal it.
    pub fn record(&self, draft: &TaxTransactionDraft, actor_id: &str) -> SealResult<TaxTransaction> {
        let transaction = self.store.write(|tx| record_in(tx, draft, actor_id))?;
        info!(
            transaction_id = transaction.id,
            document = %transaction.linked_document_id,
            jurisdiction = %transaction.jurisdiction_code,
            tax = %transaction.tax_amount_cents,
            "tax transaction recorded"
        );
        Ok(transaction)
    }

    pub fn transactions(&self, period: &TaxPeriod) -> SealResult<Vec<TaxTransaction>> {
        self.store.read(|conn| transactions_in(conn, period))
    }

    pub fn generate_period_report(&self, period: &TaxPeriod) -> SealResult<TaxReport> {
        let transactions = self.transactions(period)?;
        let report = report::build_report(period, &transactions)?;
        info!(
            report_id = %report.report_id,
            period_start = %period.start,
            period_end = %period.end,
            transactions = report.totals.transaction_count,
            checksum = %report.checksum,
            "tax report generated"
        );
        Ok(report)
    }

    /// Store a generated report and seal its checksum.  Returns the ledger
    /// event id.
    pub fn persist_report(&self, report: &TaxReport, actor_id: &str) -> SealResult<i64> {
        let event_id = self
            .store
            .write(|tx| report::persist_in(tx, report, actor_id))?;
        info!(report_id = %report.report_id, event_id, "tax report persisted");
        Ok(event_id)
    }

    /// Load a persisted report and confirm it still matches its sealed
    /// checksum.
    pub fn load_report(&self, report_id: Uuid) -> SealResult<TaxReport> {
        self.store.read(|conn| report::load_in(conn, report_id))
    }
}
