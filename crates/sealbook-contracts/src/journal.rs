//! Double-entry journal records.
//!
//! A `JournalDraft` is what a caller submits.  A `JournalEntry` is what the
//! journal hands back once the draft has been validated, persisted, and
//! sealed into the ledger.  Entries are never modified after that point.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{SealError, SealResult},
    money::Cents,
};

/// One debit or credit line of a journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account_code: String,
    #[serde(default)]
    pub debit: Cents,
    #[serde(default)]
    pub credit: Cents,
    #[serde(default)]
    pub line_description: String,
}

impl JournalLine {
    pub fn debit(account_code: impl Into<String>, amount: Cents) -> Self {
        Self {
            account_code: account_code.into(),
            debit: amount,
            credit: Cents::ZERO,
            line_description: String::new(),
        }
    }

    pub fn credit(account_code: impl Into<String>, amount: Cents) -> Self {
        Self {
            account_code: account_code.into(),
            debit: Cents::ZERO,
            credit: amount,
            line_description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.line_description = description.into();
        self
    }
}

/// A journal entry as submitted for posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalDraft {
    pub description: String,
    /// Defaults to the posting time when absent.
    #[serde(default)]
    pub transaction_date: Option<DateTime<Utc>>,
    pub lines: Vec<JournalLine>,
}

impl JournalDraft {
    pub fn new(description: impl Into<String>, lines: Vec<JournalLine>) -> Self {
        Self {
            description: description.into(),
            transaction_date: None,
            lines,
        }
    }

    pub fn dated(mut self, transaction_date: DateTime<Utc>) -> Self {
        self.transaction_date = Some(transaction_date);
        self
    }
}

/// The serialization layout that produced an entry's `data_hash`.
///
/// Strategies are tried in `ALL` order during verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CanonicalForm {
    /// Compact JSON of the header and ordered lines (schema v2).
    Current,
    /// Pipe-delimited text written by the v1 schema, kept for migrated entries.
    Legacy,
}

impl CanonicalForm {
    pub const ALL: [CanonicalForm; 2] = [CanonicalForm::Current, CanonicalForm::Legacy];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalForm::Current => "current",
            CanonicalForm::Legacy => "legacy",
        }
    }
}

impl fmt::Display for CanonicalForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalForm {
    type Err = SealError;

    fn from_str(s: &str) -> SealResult<Self> {
        CanonicalForm::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| SealError::Serialization {
                reason: format!("unknown canonical form '{s}'"),
            })
    }
}

/// A posted, sealed journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub entry_number: String,
    pub description: String,
    pub transaction_date: DateTime<Utc>,
    pub total_debit: Cents,
    pub total_credit: Cents,
    pub created_by: String,
    pub data_hash: String,
    pub audit_event_id: i64,
    pub canonical_form: CanonicalForm,
    pub lines: Vec<JournalLine>,
}

/// Outcome of re-checking one entry against its seal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryVerification {
    pub entry_number: String,
    pub valid: bool,
    /// The canonicalization strategy whose hash matched, if any.
    pub matched_form: Option<CanonicalForm>,
    pub reason: Option<String>,
}
