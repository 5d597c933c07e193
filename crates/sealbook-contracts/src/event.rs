//! Ledger event types and their typed payloads.
//!
//! Every event on the chain has a fixed `EventType` and a payload whose
//! shape depends on that type.  `EventPayload` is the tagged union of those
//! shapes.  Its `canonical()` text is what gets stored in the
//! `event_payload` column and what gets fed into the seal, so the same bytes
//! are used for hashing and persistence.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    error::{SealError, SealResult},
    money::Cents,
};

/// The closed set of ledger event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    EntryPosted,
    EntryUpdatedAttemptBlocked,
    TaxComputed,
    ReportGenerated,
    BackupCreated,
    BackupRestored,
    VerificationRun,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::EntryPosted,
        EventType::EntryUpdatedAttemptBlocked,
        EventType::TaxComputed,
        EventType::ReportGenerated,
        EventType::BackupCreated,
        EventType::BackupRestored,
        EventType::VerificationRun,
    ];

    /// The stable wire name stored in `audit_events.event_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::EntryPosted => "entry-posted",
            EventType::EntryUpdatedAttemptBlocked => "entry-updated-attempt-blocked",
            EventType::TaxComputed => "tax-computed",
            EventType::ReportGenerated => "report-generated",
            EventType::BackupCreated => "backup-created",
            EventType::BackupRestored => "backup-restored",
            EventType::VerificationRun => "verification-run",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = SealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SealError::Serialization {
                reason: format!("unknown event type '{s}'"),
            })
    }
}

// ── Payload shapes ────────────────────────────────────────────────────────────

/// Seals one journal entry.  `transaction_date` is part of the seal so a
/// back-dated posting date breaks verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPosted {
    pub entry_number: String,
    pub data_hash: String,
    pub transaction_date: String,
}

/// Records a rejected attempt to change or remove a posted entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUpdateBlocked {
    pub entry_number: String,
    pub attempted_change: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxComputed {
    pub transaction_id: i64,
    pub linked_document_id: String,
    pub jurisdiction_code: String,
    pub tax_amount_cents: Cents,
    pub verification_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportGenerated {
    pub report_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub checksum: String,
}

/// Shared by `backup-created` and `backup-restored`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupProvenance {
    pub backup_id: String,
    pub artifact_checksum: String,
    pub provenance_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRun {
    pub scope: String,
    pub valid: bool,
    pub events_checked: u64,
    pub broken_at: Option<i64>,
}

/// The payload of a ledger event, tagged by its `EventType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    EntryPosted(EntryPosted),
    EntryUpdatedAttemptBlocked(EntryUpdateBlocked),
    TaxComputed(TaxComputed),
    ReportGenerated(ReportGenerated),
    BackupCreated(BackupProvenance),
    BackupRestored(BackupProvenance),
    VerificationRun(VerificationRun),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::EntryPosted(_) => EventType::EntryPosted,
            EventPayload::EntryUpdatedAttemptBlocked(_) => EventType::EntryUpdatedAttemptBlocked,
            EventPayload::TaxComputed(_) => EventType::TaxComputed,
            EventPayload::ReportGenerated(_) => EventType::ReportGenerated,
            EventPayload::BackupCreated(_) => EventType::BackupCreated,
            EventPayload::BackupRestored(_) => EventType::BackupRestored,
            EventPayload::VerificationRun(_) => EventType::VerificationRun,
        }
    }

    /// Canonical text of the payload body.
    ///
    /// Compact `serde_json` over a struct serializes fields in declaration
    /// order, so the output is deterministic for a given value.
    pub fn canonical(&self) -> SealResult<String> {
        let text = match self {
            EventPayload::EntryPosted(p) => serde_json::to_string(p)?,
            EventPayload::EntryUpdatedAttemptBlocked(p) => serde_json::to_string(p)?,
            EventPayload::TaxComputed(p) => serde_json::to_string(p)?,
            EventPayload::ReportGenerated(p) => serde_json::to_string(p)?,
            EventPayload::BackupCreated(p) | EventPayload::BackupRestored(p) => {
                serde_json::to_string(p)?
            }
            EventPayload::VerificationRun(p) => serde_json::to_string(p)?,
        };
        Ok(text)
    }

    /// Parse a stored payload back into its typed shape.
    pub fn decode(event_type: EventType, text: &str) -> SealResult<Self> {
        let payload = match event_type {
            EventType::EntryPosted => EventPayload::EntryPosted(serde_json::from_str(text)?),
            EventType::EntryUpdatedAttemptBlocked => {
                EventPayload::EntryUpdatedAttemptBlocked(serde_json::from_str(text)?)
            }
            EventType::TaxComputed => EventPayload::TaxComputed(serde_json::from_str(text)?),
            EventType::ReportGenerated => {
                EventPayload::ReportGenerated(serde_json::from_str(text)?)
            }
            EventType::BackupCreated => EventPayload::BackupCreated(serde_json::from_str(text)?),
            EventType::BackupRestored => {
                EventPayload::BackupRestored(serde_json::from_str(text)?)
            }
            EventType::VerificationRun => {
                EventPayload::VerificationRun(serde_json::from_str(text)?)
            }
        };
        Ok(payload)
    }
}
