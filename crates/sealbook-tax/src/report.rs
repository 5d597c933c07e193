//! Period tax reports: aggregation, checksum, persistence, and exports.
//!
//! The checksum is the SHA-256 of the compact JSON of
//! `{period, breakdown, totals, transactions}`.  `report_id` and
//! `generated_at` are left out so two runs over the same data agree.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use sealbook_audit::ledger;
use sealbook_contracts::{
    error::{SealError, SealResult},
    event::{EventPayload, ReportGenerated},
    money::Cents,
    tax::{JurisdictionBreakdown, TaxPeriod, TaxReport, TaxReportLine, TaxTotals, TaxTransaction},
    time::{format_date, format_timestamp, now_millis},
};
use sealbook_core::{crypto::sha256_hex, StorageResultExt};

#[derive(Serialize)]
struct ChecksumInput<'a> {
    period: &'a TaxPeriod,
    breakdown: &'a [JurisdictionBreakdown],
    totals: &'a TaxTotals,
    transactions: &'a [TaxReportLine],
}

pub fn report_checksum(
    period: &TaxPeriod,
    breakdown: &[JurisdictionBreakdown],
    totals: &TaxTotals,
    transactions: &[TaxReportLine],
) -> SealResult<String> {
    let canonical = serde_json::to_vec(&ChecksumInput {
        period,
        breakdown,
        totals,
        transactions,
    })?;
    Ok(sha256_hex(&canonical))
}

/// True when the report's checksum matches its own figures.
pub fn verify_report(report: &TaxReport) -> SealResult<bool> {
    let expected = report_checksum(
        &report.period,
        &report.breakdown,
        &report.totals,
        &report.transactions,
    )?;
    Ok(expected == report.checksum)
}

fn add(a: Cents, b: Cents) -> SealResult<Cents> {
    a.checked_add(b).ok_or_else(|| SealError::InvalidAmount {
        reason: "report total exceeds the representable range".to_string(),
    })
}

/// Aggregate `transactions` into a report for `period`.
pub fn build_report(period: &TaxPeriod, transactions: &[TaxTransaction]) -> SealResult<TaxReport> {
    let mut by_code: BTreeMap<&str, JurisdictionBreakdown> = BTreeMap::new();
    let mut totals = TaxTotals::default();

    for tx in transactions {
        let entry = by_code
            .entry(tx.jurisdiction_code.as_str())
            .or_insert_with(|| JurisdictionBreakdown {
                jurisdiction_code: tx.jurisdiction_code.clone(),
                transaction_count: 0,
                taxable_amount: Cents::ZERO,
                tax_amount: Cents::ZERO,
            });
        entry.transaction_count += 1;
        entry.taxable_amount = add(entry.taxable_amount, tx.taxable_amount_cents)?;
        entry.tax_amount = add(entry.tax_amount, tx.tax_amount_cents)?;

        totals.transaction_count += 1;
        totals.taxable_amount = add(totals.taxable_amount, tx.taxable_amount_cents)?;
        totals.tax_amount = add(totals.tax_amount, tx.tax_amount_cents)?;
    }

    let breakdown: Vec<JurisdictionBreakdown> = by_code.into_values().collect();
    let lines: Vec<TaxReportLine> = transactions
        .iter()
        .map(|tx| TaxReportLine {
            transaction_id: tx.id,
            linked_document_id: tx.linked_document_id.clone(),
            jurisdiction_code: tx.jurisdiction_code.clone(),
            transaction_date: format_timestamp(&tx.transaction_date),
            taxable_amount: tx.taxable_amount_cents,
            tax_amount: tx.tax_amount_cents,
            effective_rate_bps: tx.effective_rate_bps,
            verification_hash: tx.verification_hash.clone(),
        })
        .collect();
    let checksum = report_checksum(period, &breakdown, &totals, &lines)?;

    Ok(TaxReport {
        report_id: Uuid::new_v4(),
        period: *period,
        generated_at: now_millis(),
        breakdown,
        totals,
        transactions: lines,
        checksum,
    })
}

// ── Persistence ───────────────────────────────────────────────────────────────

/// Store `report` and seal its checksum.  Returns the ledger event id.
pub fn persist_in(conn: &Connection, report: &TaxReport, actor_id: &str) -> SealResult<i64> {
    if !verify_report(report)? {
        return Err(SealError::IntegrityViolation {
            reason: format!(
                "report {} does not match its own checksum; refusing to persist",
                report.report_id
            ),
        });
    }

    let event = ledger::append(
        conn,
        &EventPayload::ReportGenerated(ReportGenerated {
            report_id: report.report_id.to_string(),
            period_start: report.period.start,
            period_end: report.period.end,
            checksum: report.checksum.clone(),
        }),
        actor_id,
    )?;

    conn.execute(
        "INSERT INTO tax_reports
         (report_id, period_start, period_end, generated_at, checksum, report_json, audit_event_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            report.report_id.to_string(),
            format_date(&report.period.start),
            format_date(&report.period.end),
            format_timestamp(&report.generated_at),
            report.checksum,
            to_json(report)?,
            event.id
        ],
    )
    .storage()?;

    Ok(event.id)
}

/// Load a persisted report.  Fails with `IntegrityViolation` when the stored
/// document no longer matches the checksum recorded beside it.
pub fn load_in(conn: &Connection, report_id: Uuid) -> SealResult<TaxReport> {
    let (checksum, json): (String, String) = conn
        .query_row(
            "SELECT checksum, report_json FROM tax_reports WHERE report_id = ?1",
            params![report_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .storage()?
        .ok_or_else(|| SealError::NotFound {
            kind: "tax report",
            id: report_id.to_string(),
        })?;

    let report: TaxReport = serde_json::from_str(&json)?;
    if report.checksum != checksum || !verify_report(&report)? {
        return Err(SealError::IntegrityViolation {
            reason: format!("persisted report {report_id} fails its checksum"),
        });
    }
    Ok(report)
}

// ── Exports ───────────────────────────────────────────────────────────────────

/// Pretty JSON.  Field order follows the struct, so output is stable.
pub fn to_json(report: &TaxReport) -> SealResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// One CSV row.  `kind` is `transaction`, `jurisdiction`, or `total`; fields
/// that do not apply to a kind are left empty.
#[derive(Serialize)]
struct CsvRow<'a> {
    kind: &'static str,
    period: Option<String>,
    transaction_id: Option<i64>,
    linked_document_id: Option<&'a str>,
    jurisdiction_code: Option<&'a str>,
    transaction_date: Option<&'a str>,
    transaction_count: Option<u64>,
    taxable_amount_cents: Cents,
    tax_amount_cents: Cents,
    effective_rate_bps: Option<u32>,
    hash: Option<&'a str>,
}

/// Tabular export.  Transaction rows carry their `verification_hash`; the
/// closing `total` row carries the report checksum.
pub fn to_csv(report: &TaxReport) -> SealResult<String> {
    let csv_error = |e: csv::Error| SealError::Serialization {
        reason: format!("csv export failed: {e}"),
    };
    let mut writer = csv::Writer::from_writer(Vec::new());

    for line in &report.transactions {
        writer
            .serialize(CsvRow {
                kind: "transaction",
                period: None,
                transaction_id: Some(line.transaction_id),
                linked_document_id: Some(&line.linked_document_id),
                jurisdiction_code: Some(&line.jurisdiction_code),
                transaction_date: Some(&line.transaction_date),
                transaction_count: None,
                taxable_amount_cents: line.taxable_amount,
                tax_amount_cents: line.tax_amount,
                effective_rate_bps: Some(line.effective_rate_bps),
                hash: Some(&line.verification_hash),
            })
            .map_err(csv_error)?;
    }

    for row in &report.breakdown {
        writer
            .serialize(CsvRow {
                kind: "jurisdiction",
                period: None,
                transaction_id: None,
                linked_document_id: None,
                jurisdiction_code: Some(&row.jurisdiction_code),
                transaction_date: None,
                transaction_count: Some(row.transaction_count),
                taxable_amount_cents: row.taxable_amount,
                tax_amount_cents: row.tax_amount,
                effective_rate_bps: None,
                hash: None,
            })
            .map_err(csv_error)?;
    }

    writer
        .serialize(CsvRow {
            kind: "total",
            period: Some(format!(
                "{}..{}",
                format_date(&report.period.start),
                format_date(&report.period.end)
            )),
            transaction_id: None,
            linked_document_id: None,
            jurisdiction_code: None,
            transaction_date: None,
            transaction_count: Some(report.totals.transaction_count),
            taxable_amount_cents: report.totals.taxable_amount,
            tax_amount_cents: report.totals.tax_amount,
            effective_rate_bps: None,
            hash: Some(&report.checksum),
        })
        .map_err(csv_error)?;

    let bytes = writer.into_inner().map_err(|e| SealError::Serialization {
        reason: format!("csv export failed: {e}"),
    })?;
    String::from_utf8(bytes).map_err(|e| SealError::Serialization {
        reason: format!("csv export is not UTF-8: {e}"),
    })
}
