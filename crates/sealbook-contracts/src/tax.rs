//! Tax jurisdictions, computations, transactions, and period reports.
//!
//! Rates are basis points (1 bp = 0.01 %) held as unsigned integers, so a
//! negative or fractional rate cannot be represented at all.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{SealError, SealResult},
    money::Cents,
    time::{day_end, day_start},
};

/// A taxing authority and its current rates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxJurisdiction {
    /// Upper-case lookup key, e.g. `"CA-ON"`.
    pub code: String,
    pub display_name: String,
    pub base_rate_bps: u32,
    #[serde(default)]
    pub surtax_rate_bps: u32,
    pub effective_date: NaiveDate,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl TaxJurisdiction {
    pub fn total_rate_bps(&self) -> u32 {
        self.base_rate_bps.saturating_add(self.surtax_rate_bps)
    }

    /// True when `date` lies inside `[effective_date, expiry_date]`.
    pub fn in_effect_on(&self, date: NaiveDate) -> bool {
        date >= self.effective_date && self.expiry_date.map_or(true, |expiry| date <= expiry)
    }
}

/// Raised when a computation is requested for a date outside the
/// jurisdiction's rate window.  Current rates are still applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindowWarning {
    pub as_of_date: NaiveDate,
    pub effective_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub message: String,
}

/// The pure result of a tax computation.  Nothing is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxComputation {
    pub taxable_amount: Cents,
    pub tax_amount: Cents,
    pub base_rate_bps: u32,
    pub surtax_rate_bps: u32,
    pub total_rate_bps: u32,
    pub jurisdiction_code: String,
    pub jurisdiction_name: String,
    pub as_of_date: NaiveDate,
    pub verification_hash: String,
    pub warning: Option<RateWindowWarning>,
}

/// A computation the caller wants recorded against a business document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxTransactionDraft {
    pub linked_document_id: String,
    pub computation: TaxComputation,
    pub transaction_date: DateTime<Utc>,
}

/// A recorded, sealed tax transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxTransaction {
    pub id: i64,
    pub linked_document_id: String,
    pub jurisdiction_code: String,
    pub taxable_amount_cents: Cents,
    pub tax_amount_cents: Cents,
    pub effective_rate_bps: u32,
    pub as_of_date: NaiveDate,
    pub transaction_date: DateTime<Utc>,
    pub verification_hash: String,
    pub audit_event_id: i64,
}

/// An inclusive reporting period, whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TaxPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> SealResult<Self> {
        if end < start {
            return Err(SealError::InvalidInput {
                reason: format!("period end {end} is before period start {start}"),
            });
        }
        Ok(Self { start, end })
    }

    /// First and last instant covered: `start 00:00:00.000` to
    /// `end 23:59:59.999`, both inclusive.
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (day_start(self.start), day_end(self.end))
    }
}

/// Aggregate for one jurisdiction within a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionBreakdown {
    pub jurisdiction_code: String,
    pub transaction_count: u64,
    pub taxable_amount: Cents,
    pub tax_amount: Cents,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxTotals {
    pub transaction_count: u64,
    pub taxable_amount: Cents,
    pub tax_amount: Cents,
}

/// One transaction as it appears in a report, with its own verification hash
/// so downstream consumers can check individual figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxReportLine {
    pub transaction_id: i64,
    pub linked_document_id: String,
    pub jurisdiction_code: String,
    pub transaction_date: String,
    pub taxable_amount: Cents,
    pub tax_amount: Cents,
    pub effective_rate_bps: u32,
    pub verification_hash: String,
}

/// A period tax report.  `checksum` covers the period, breakdown, totals,
/// and every transaction line; only `report_id` and `generated_at` are
/// outside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxReport {
    pub report_id: Uuid,
    pub period: TaxPeriod,
    pub generated_at: DateTime<Utc>,
    pub breakdown: Vec<JurisdictionBreakdown>,
    pub totals: TaxTotals,
    pub transactions: Vec<TaxReportLine>,
    pub checksum: String,
}
